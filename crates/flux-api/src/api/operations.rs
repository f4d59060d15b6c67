//! `Operation` resource: `create, put, update, process, operation, task`.
//!
//! `create`/`put`/`update` all resolve to the same registration step
//! (`OperationRegistry::put`: persist, then publish the matching queue to
//! the scheduler) — the original system does not distinguish them either,
//! since registering an operation is idempotent by `id`.
//!
//! `operation` (a generic synchronous entry point for inline operations)
//! has no remote-dispatch counterpart in this model: every registered
//! operation is scheduler-backed and asynchronous by construction. This
//! crate exposes it as a read-only descriptor fetch rather than inventing
//! in-process execution for operations whose whole point is running
//! out-of-process.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use utoipa::ToSchema;

use flux_coordinator::{Coordinator, ProcessCallback};
use flux_engine::Engine;
use flux_persistence::{Operation, OperationPhase, Outcome, Store};

use super::common::{ApiError, ErrorResponse, ListResponse};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub engine: Arc<Engine>,
    pub coordinator: Arc<Coordinator>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PutOperationRequest {
    pub id: String,
    pub name: String,
    pub phase: OperationPhase,
    #[serde(default)]
    pub description: Option<String>,
    pub input_schema: flux_core::FieldKind,
    #[serde(default)]
    pub parameters: Value,
    #[serde(default)]
    pub outcomes: std::collections::BTreeMap<String, Outcome>,
}

impl From<PutOperationRequest> for Operation {
    fn from(req: PutOperationRequest) -> Self {
        Operation {
            id: req.id,
            name: req.name,
            phase: req.phase,
            description: req.description,
            input_schema: req.input_schema,
            parameters: req.parameters,
            outcomes: req.outcomes,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct OperationTaskRequest {
    pub task: String,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/flux/1.0/operations", post(create_operation).get(list_operations))
        .route(
            "/flux/1.0/operations/:operation_id",
            get(get_operation).put(put_operation).patch(put_operation),
        )
        .route("/flux/1.0/operations/:operation_id/process", post(process_callback))
        .route("/flux/1.0/operations/:operation_id/task", post(task_operation))
        .with_state(state)
}

#[utoipa::path(
    post,
    path = "/flux/1.0/operations",
    request_body = PutOperationRequest,
    responses((status = 201, description = "Operation registered", body = Operation)),
    tag = "operations"
)]
pub async fn create_operation(
    State(state): State<AppState>,
    Json(req): Json<PutOperationRequest>,
) -> Result<(StatusCode, Json<Operation>), ApiError> {
    let operation = state.engine.registry().put(req.into()).await?;
    Ok((StatusCode::CREATED, Json(operation)))
}

#[utoipa::path(
    put,
    path = "/flux/1.0/operations/{operation_id}",
    params(("operation_id" = String, Path, description = "Operation id (`ns:name`)")),
    request_body = PutOperationRequest,
    responses((status = 200, description = "Operation registered", body = Operation)),
    tag = "operations"
)]
pub async fn put_operation(
    State(state): State<AppState>,
    Path(_operation_id): Path<String>,
    Json(req): Json<PutOperationRequest>,
) -> Result<Json<Operation>, ApiError> {
    let operation = state.engine.registry().put(req.into()).await?;
    Ok(Json(operation))
}

#[utoipa::path(
    get,
    path = "/flux/1.0/operations/{operation_id}",
    params(("operation_id" = String, Path, description = "Operation id (`ns:name`)")),
    responses(
        (status = 200, description = "Operation descriptor", body = Operation),
        (status = 404, description = "Operation not found", body = ErrorResponse),
    ),
    tag = "operations"
)]
pub async fn get_operation(
    State(state): State<AppState>,
    Path(operation_id): Path<String>,
) -> Result<Json<Operation>, ApiError> {
    let operation = state.store.get_operation(&operation_id).await?;
    Ok(Json(operation))
}

#[utoipa::path(
    get,
    path = "/flux/1.0/operations",
    responses((status = 200, description = "Registered operations", body = ListResponse<Operation>)),
    tag = "operations"
)]
pub async fn list_operations(State(state): State<AppState>) -> Result<Json<ListResponse<Operation>>, ApiError> {
    let operations = state.store.list_operations().await?;
    Ok(Json(operations.into()))
}

/// The scheduler's `process` callback.
#[utoipa::path(
    post,
    path = "/flux/1.0/operations/{operation_id}/process",
    params(("operation_id" = String, Path, description = "Operation id (`ns:name`)")),
    request_body = ProcessCallback,
    responses((status = 202, description = "Callback accepted")),
    tag = "operations"
)]
pub async fn process_callback(
    State(state): State<AppState>,
    Path(operation_id): Path<String>,
    Json(callback): Json<ProcessCallback>,
) -> StatusCode {
    // Callbacks never propagate exceptions back to the scheduler — a 5xx
    // here would trigger a retry storm. Logged and accepted regardless.
    if let Err(error) = state.coordinator.process_operation_callback(callback).await {
        tracing::warn!(%operation_id, ?error, "operation callback failed");
    }
    StatusCode::ACCEPTED
}

#[utoipa::path(
    post,
    path = "/flux/1.0/operations/{operation_id}/task",
    params(("operation_id" = String, Path, description = "Operation id (`ns:name`)")),
    request_body = OperationTaskRequest,
    responses((status = 202, description = "Task accepted")),
    tag = "operations"
)]
pub async fn task_operation(
    Path(operation_id): Path<String>,
    Json(req): Json<OperationTaskRequest>,
) -> StatusCode {
    tracing::info!(%operation_id, task = %req.task, "operation housekeeping task");
    StatusCode::ACCEPTED
}
