//! `Execution` resource: `get, query, update, task`.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use flux_coordinator::Coordinator;
use flux_persistence::{Store, WorkflowExecution};

use super::common::{ApiError, ErrorResponse, ListResponse};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub coordinator: Arc<Coordinator>,
}

#[derive(Debug, Deserialize)]
pub struct ExecutionQuery {
    pub run_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateExecutionRequest {
    pub status: ExecutionTransition,
}

#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionTransition {
    Aborting,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ExecutionTaskRequest {
    pub task: ExecutionTaskName,
}

#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionTaskName {
    AbortRun,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/flux/1.0/executions", get(query_executions))
        .route("/flux/1.0/executions/:execution_id", get(get_execution).patch(update_execution))
        .route("/flux/1.0/executions/:execution_id/task", axum::routing::post(task_execution))
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/flux/1.0/executions/{execution_id}",
    params(("execution_id" = Uuid, Path, description = "Execution id")),
    responses(
        (status = 200, description = "Execution found", body = WorkflowExecution),
        (status = 404, description = "Execution not found", body = ErrorResponse),
    ),
    tag = "executions"
)]
pub async fn get_execution(
    State(state): State<AppState>,
    Path(execution_id): Path<Uuid>,
) -> Result<Json<WorkflowExecution>, ApiError> {
    let execution = state.store.get_execution(execution_id).await?;
    Ok(Json(execution))
}

#[utoipa::path(
    get,
    path = "/flux/1.0/executions",
    params(("run_id" = Uuid, Query, description = "Owning run")),
    responses((status = 200, description = "Executions", body = ListResponse<WorkflowExecution>)),
    tag = "executions"
)]
pub async fn query_executions(
    State(state): State<AppState>,
    Query(query): Query<ExecutionQuery>,
) -> Result<Json<ListResponse<WorkflowExecution>>, ApiError> {
    let executions = state.store.list_executions_for_run(query.run_id).await?;
    Ok(Json(executions.into()))
}

/// `update{status=aborting}` triggers the run-level abort cascade rather
/// than mutating this execution directly — the execution itself only
/// leaves `active` from inside `Engine::abort_executions`'s own sweep.
#[utoipa::path(
    patch,
    path = "/flux/1.0/executions/{execution_id}",
    params(("execution_id" = Uuid, Path, description = "Execution id")),
    request_body = UpdateExecutionRequest,
    responses((status = 202, description = "Abort cascade triggered")),
    tag = "executions"
)]
pub async fn update_execution(
    State(state): State<AppState>,
    Path(execution_id): Path<Uuid>,
    Json(_req): Json<UpdateExecutionRequest>,
) -> Result<StatusCode, ApiError> {
    state.coordinator.update_execution_aborting(execution_id).await?;
    Ok(StatusCode::ACCEPTED)
}

#[utoipa::path(
    post,
    path = "/flux/1.0/executions/{execution_id}/task",
    params(("execution_id" = Uuid, Path, description = "Execution id")),
    request_body = ExecutionTaskRequest,
    responses((status = 202, description = "Task accepted")),
    tag = "executions"
)]
pub async fn task_execution(
    State(state): State<AppState>,
    Path(execution_id): Path<Uuid>,
    Json(req): Json<ExecutionTaskRequest>,
) -> Result<StatusCode, ApiError> {
    match req.task {
        ExecutionTaskName::AbortRun => state.coordinator.update_execution_aborting(execution_id).await?,
    }
    Ok(StatusCode::ACCEPTED)
}
