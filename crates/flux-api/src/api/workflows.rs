//! `Workflow` resource: `create, get, query, update, delete, put, generate`.
//!
//! Grounded on `everruns-control-plane::api::agents`'s per-resource module
//! shape (`AppState`, `routes(state) -> Router`, one `#[utoipa::path]`
//! handler per verb).

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use flux_persistence::{Store, Workflow, WorkflowKind};
use flux_spec::{GenerateStep, WorkflowSpec};

use super::common::{ApiError, ErrorResponse, ListResponse};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateWorkflowRequest {
    pub name: String,
    #[serde(default)]
    pub designation: Option<String>,
    #[serde(default)]
    pub is_service: bool,
    #[serde(default = "default_kind")]
    pub kind: WorkflowKind,
    #[serde(default)]
    pub specification: Option<String>,
}

fn default_kind() -> WorkflowKind {
    WorkflowKind::Yaml
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateWorkflowRequest {
    #[serde(default)]
    pub designation: Option<String>,
    #[serde(default)]
    pub is_service: Option<bool>,
    #[serde(default)]
    pub specification: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct GenerateWorkflowRequest {
    pub name: String,
    pub operations: Vec<GenerateOperation>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct GenerateOperation {
    pub operation: String,
    #[serde(default)]
    pub run_params: serde_json::Value,
    #[serde(default)]
    pub step_params: serde_json::Value,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WorkflowQuery {
    pub name: Option<String>,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/flux/1.0/workflows", post(create_workflow).get(query_workflows))
        .route("/flux/1.0/workflows/generate", post(generate_workflow))
        .route(
            "/flux/1.0/workflows/:workflow_id",
            get(get_workflow).patch(update_workflow).delete(delete_workflow),
        )
        .route("/flux/1.0/workflows/:workflow_id/put", post(put_workflow))
        .with_state(state)
}

fn verify_specification(specification: &Option<String>) -> Result<(), ApiError> {
    let Some(text) = specification else { return Ok(()) };
    let spec = WorkflowSpec::parse(text)?;
    spec.verify().map_err(|errors| {
        let first = errors.into_iter().next().expect("verify() only errs with a non-empty Vec");
        ApiError::from(first)
    })?;
    Ok(())
}

#[utoipa::path(
    post,
    path = "/flux/1.0/workflows",
    request_body = CreateWorkflowRequest,
    responses(
        (status = 201, description = "Workflow created", body = Workflow),
        (status = 422, description = "Invalid specification", body = ErrorResponse),
    ),
    tag = "workflows"
)]
pub async fn create_workflow(
    State(state): State<AppState>,
    Json(req): Json<CreateWorkflowRequest>,
) -> Result<(StatusCode, Json<Workflow>), ApiError> {
    verify_specification(&req.specification)?;
    let workflow = Workflow {
        id: Uuid::now_v7(),
        name: req.name,
        designation: req.designation,
        is_service: req.is_service,
        kind: req.kind,
        specification: req.specification,
        modified: Utc::now(),
    };
    let workflow = state.store.create_workflow(workflow).await.map_err(ApiError::from)?;
    Ok((StatusCode::CREATED, Json(workflow)))
}

#[utoipa::path(
    get,
    path = "/flux/1.0/workflows/{workflow_id}",
    params(("workflow_id" = Uuid, Path, description = "Workflow id")),
    responses(
        (status = 200, description = "Workflow found", body = Workflow),
        (status = 404, description = "Workflow not found", body = ErrorResponse),
    ),
    tag = "workflows"
)]
pub async fn get_workflow(
    State(state): State<AppState>,
    Path(workflow_id): Path<Uuid>,
) -> Result<Json<Workflow>, ApiError> {
    let workflow = state.store.get_workflow(workflow_id).await?;
    Ok(Json(workflow))
}

#[utoipa::path(
    get,
    path = "/flux/1.0/workflows",
    params(("name" = Option<String>, Query, description = "Exact name lookup")),
    responses((status = 200, description = "Workflows", body = ListResponse<Workflow>)),
    tag = "workflows"
)]
pub async fn query_workflows(
    State(state): State<AppState>,
    Query(query): Query<WorkflowQuery>,
) -> Result<Json<ListResponse<Workflow>>, ApiError> {
    let workflows = match query.name {
        Some(name) => vec![state.store.get_workflow_by_name(&name).await?],
        None => state.store.list_workflows().await?,
    };
    Ok(Json(workflows.into()))
}

#[utoipa::path(
    patch,
    path = "/flux/1.0/workflows/{workflow_id}",
    params(("workflow_id" = Uuid, Path, description = "Workflow id")),
    request_body = UpdateWorkflowRequest,
    responses(
        (status = 200, description = "Workflow updated", body = Workflow),
        (status = 404, description = "Workflow not found", body = ErrorResponse),
        (status = 422, description = "Invalid specification", body = ErrorResponse),
    ),
    tag = "workflows"
)]
pub async fn update_workflow(
    State(state): State<AppState>,
    Path(workflow_id): Path<Uuid>,
    Json(req): Json<UpdateWorkflowRequest>,
) -> Result<Json<Workflow>, ApiError> {
    if let Some(specification) = &req.specification {
        verify_specification(&Some(specification.clone()))?;
    }
    let mut workflow = state.store.get_workflow(workflow_id).await?;
    if let Some(designation) = req.designation {
        workflow.designation = Some(designation);
    }
    if let Some(is_service) = req.is_service {
        workflow.is_service = is_service;
    }
    if let Some(specification) = req.specification {
        workflow.specification = Some(specification);
    }
    workflow.modified = Utc::now();
    let workflow = state.store.update_workflow(workflow).await?;
    Ok(Json(workflow))
}

/// Idempotent upsert-by-id: creates the row if absent, otherwise behaves
/// like `update` — the `put` verb shared across resources.
#[utoipa::path(
    post,
    path = "/flux/1.0/workflows/{workflow_id}/put",
    params(("workflow_id" = Uuid, Path, description = "Workflow id")),
    request_body = CreateWorkflowRequest,
    responses((status = 200, description = "Workflow upserted", body = Workflow)),
    tag = "workflows"
)]
pub async fn put_workflow(
    State(state): State<AppState>,
    Path(workflow_id): Path<Uuid>,
    Json(req): Json<CreateWorkflowRequest>,
) -> Result<Json<Workflow>, ApiError> {
    verify_specification(&req.specification)?;
    let workflow = match state.store.get_workflow(workflow_id).await {
        Ok(mut existing) => {
            existing.name = req.name;
            existing.designation = req.designation;
            existing.is_service = req.is_service;
            existing.kind = req.kind;
            existing.specification = req.specification;
            existing.modified = Utc::now();
            state.store.update_workflow(existing).await?
        }
        Err(_) => {
            let workflow = Workflow {
                id: workflow_id,
                name: req.name,
                designation: req.designation,
                is_service: req.is_service,
                kind: req.kind,
                specification: req.specification,
                modified: Utc::now(),
            };
            state.store.create_workflow(workflow).await?
        }
    };
    Ok(Json(workflow))
}

#[utoipa::path(
    delete,
    path = "/flux/1.0/workflows/{workflow_id}",
    params(("workflow_id" = Uuid, Path, description = "Workflow id")),
    responses(
        (status = 204, description = "Workflow deleted"),
        (status = 422, description = "Workflow has active runs", body = ErrorResponse),
    ),
    tag = "workflows"
)]
pub async fn delete_workflow(
    State(state): State<AppState>,
    Path(workflow_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.store.has_active_runs(workflow_id).await? {
        return Err(ApiError(
            StatusCode::UNPROCESSABLE_ENTITY,
            ErrorResponse::new("cannot-delete-uncompleted-workflow"),
        ));
    }
    state.store.delete_workflow(workflow_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/flux/1.0/workflows/generate",
    request_body = GenerateWorkflowRequest,
    responses((status = 201, description = "Workflow generated", body = Workflow)),
    tag = "workflows"
)]
pub async fn generate_workflow(
    State(state): State<AppState>,
    Json(req): Json<GenerateWorkflowRequest>,
) -> Result<(StatusCode, Json<Workflow>), ApiError> {
    let chain: Vec<GenerateStep> = req
        .operations
        .iter()
        .enumerate()
        .map(|(index, op)| GenerateStep {
            name: format!("s{index}"),
            operation: op.operation.clone(),
            run_params: op.run_params.clone(),
            step_params: op.step_params.clone(),
        })
        .collect();
    let spec = WorkflowSpec::generate(req.name.clone(), &chain);
    let text = spec.to_yaml()?;

    let workflow = Workflow {
        id: Uuid::now_v7(),
        name: req.name,
        designation: None,
        is_service: false,
        kind: WorkflowKind::Yaml,
        specification: Some(text),
        modified: Utc::now(),
    };
    let workflow = state.store.create_workflow(workflow).await?;
    Ok((StatusCode::CREATED, Json(workflow)))
}
