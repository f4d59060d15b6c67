//! `EmailTemplate` resource: deduplicated text, `put` returns the existing
//! row if an identical `template` already exists.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use flux_persistence::{EmailTemplate, Store};

use super::common::{ApiError, ErrorResponse};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PutEmailTemplateRequest {
    pub name: String,
    pub template: String,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/flux/1.0/email-templates", post(put_email_template))
        .route("/flux/1.0/email-templates/:template_id", get(get_email_template))
        .with_state(state)
}

#[utoipa::path(
    post,
    path = "/flux/1.0/email-templates",
    request_body = PutEmailTemplateRequest,
    responses((status = 200, description = "Template (existing or newly created)", body = EmailTemplate)),
    tag = "email-templates"
)]
pub async fn put_email_template(
    State(state): State<AppState>,
    Json(req): Json<PutEmailTemplateRequest>,
) -> Result<Json<EmailTemplate>, ApiError> {
    let template = state.store.put_email_template(req.name, req.template).await?;
    Ok(Json(template))
}

#[utoipa::path(
    get,
    path = "/flux/1.0/email-templates/{template_id}",
    params(("template_id" = Uuid, Path, description = "Template id")),
    responses(
        (status = 200, description = "Template found", body = EmailTemplate),
        (status = 404, description = "Template not found", body = ErrorResponse),
    ),
    tag = "email-templates"
)]
pub async fn get_email_template(
    State(state): State<AppState>,
    Path(template_id): Path<Uuid>,
) -> Result<Json<EmailTemplate>, ApiError> {
    let template = state.store.get_email_template(template_id).await?;
    Ok(Json(template))
}
