//! `Request` / `Message` resource: CRUD plus `task`.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use flux_coordinator::Coordinator;
use flux_persistence::{Request, RequestSlot, RequestStatus, Store};
use flux_requests::ProposedMessage;

use super::common::{ApiError, ErrorResponse, ListResponse};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub coordinator: Arc<Coordinator>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateRequestRequest {
    pub name: String,
    pub originator: Uuid,
    pub creator: Uuid,
    #[serde(default)]
    pub assignee: Option<Uuid>,
    #[serde(default)]
    pub template_id: Option<Uuid>,
    #[serde(default)]
    pub slot_order: Option<Vec<String>>,
    #[serde(default)]
    pub slots: BTreeMap<String, RequestSlot>,
    #[serde(default)]
    pub start_pending: bool,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateRequestRequest {
    pub status: RequestStatus,
    #[serde(default)]
    pub message: Option<MessageBody>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct MessageBody {
    pub author: Uuid,
    #[serde(default)]
    pub text: Option<String>,
}

impl From<MessageBody> for ProposedMessage {
    fn from(body: MessageBody) -> Self {
        ProposedMessage { author: body.author, text: body.text }
    }
}

#[derive(Debug, Deserialize)]
pub struct RequestQuery {
    pub assignee: Uuid,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RequestTaskRequest {
    pub task: RequestTaskName,
}

#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum RequestTaskName {
    InitiateRequest,
    CancelRequest,
    DeclineRequest,
    CompleteRequestOperation,
    ReassignRequestAssignee,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/flux/1.0/requests", post(create_request).get(query_requests))
        .route("/flux/1.0/requests/:request_id", get(get_request).patch(update_request))
        .route("/flux/1.0/requests/:request_id/task", post(task_request))
        .with_state(state)
}

#[utoipa::path(
    post,
    path = "/flux/1.0/requests",
    request_body = CreateRequestRequest,
    responses((status = 201, description = "Request created", body = Request)),
    tag = "requests"
)]
pub async fn create_request(
    State(state): State<AppState>,
    Json(req): Json<CreateRequestRequest>,
) -> Result<(StatusCode, Json<Request>), ApiError> {
    let request = Request {
        id: Uuid::nil(),
        name: req.name,
        status: RequestStatus::Prepared,
        originator: req.originator,
        assignee: req.assignee,
        creator: req.creator,
        template_id: req.template_id,
        slot_order: req.slot_order,
        claimed: None,
        completed: None,
        attachments: Vec::new(),
        slots: req.slots,
        products: BTreeMap::new(),
        messages: Vec::new(),
    };
    let request = state.coordinator.create_request(request, req.start_pending).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

#[utoipa::path(
    get,
    path = "/flux/1.0/requests/{request_id}",
    params(("request_id" = Uuid, Path, description = "Request id")),
    responses(
        (status = 200, description = "Request found", body = Request),
        (status = 404, description = "Request not found", body = ErrorResponse),
    ),
    tag = "requests"
)]
pub async fn get_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> Result<Json<Request>, ApiError> {
    let request = state.store.get_request(request_id).await?;
    Ok(Json(request))
}

#[utoipa::path(
    get,
    path = "/flux/1.0/requests",
    params(("assignee" = Uuid, Query, description = "Assignee id")),
    responses((status = 200, description = "Requests", body = ListResponse<Request>)),
    tag = "requests"
)]
pub async fn query_requests(
    State(state): State<AppState>,
    Query(query): Query<RequestQuery>,
) -> Result<Json<ListResponse<Request>>, ApiError> {
    let requests = state.store.list_requests_for_assignee(query.assignee).await?;
    Ok(Json(requests.into()))
}

#[utoipa::path(
    patch,
    path = "/flux/1.0/requests/{request_id}",
    params(("request_id" = Uuid, Path, description = "Request id")),
    request_body = UpdateRequestRequest,
    responses(
        (status = 200, description = "Request updated", body = Request),
        (status = 422, description = "Invalid transition", body = ErrorResponse),
    ),
    tag = "requests"
)]
pub async fn update_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Json(req): Json<UpdateRequestRequest>,
) -> Result<Json<Request>, ApiError> {
    let request = state
        .coordinator
        .update_request(request_id, req.status, req.message.map(Into::into))
        .await?;
    Ok(Json(request))
}

#[utoipa::path(
    post,
    path = "/flux/1.0/requests/{request_id}/task",
    params(("request_id" = Uuid, Path, description = "Request id")),
    request_body = RequestTaskRequest,
    responses((status = 202, description = "Task accepted")),
    tag = "requests"
)]
pub async fn task_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Json(req): Json<RequestTaskRequest>,
) -> Result<StatusCode, ApiError> {
    match req.task {
        RequestTaskName::InitiateRequest => state.coordinator.task_initiate_request(request_id).await?,
        RequestTaskName::CancelRequest => state.coordinator.task_cancel_request(request_id).await?,
        RequestTaskName::DeclineRequest => state.coordinator.task_decline_request(request_id).await?,
        RequestTaskName::CompleteRequestOperation => {
            state.coordinator.task_complete_request_operation(request_id).await?
        }
        RequestTaskName::ReassignRequestAssignee => {
            state.coordinator.task_reassign_request_assignee(request_id).await?
        }
    }
    Ok(StatusCode::ACCEPTED)
}
