//! `Run` resource: `create, get, query, update, task`.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use flux_coordinator::{Coordinator, InitialRunStatus};
use flux_persistence::{Run, RunStatus, Store};

use super::common::{ApiError, ErrorResponse, ListResponse};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub coordinator: Arc<Coordinator>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateRunRequest {
    pub workflow_id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub parameters: Value,
    #[serde(default = "default_status")]
    pub status: RunStatusParam,
}

fn default_status() -> RunStatusParam {
    RunStatusParam::Pending
}

#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunStatusParam {
    Prepared,
    Pending,
}

impl From<RunStatusParam> for InitialRunStatus {
    fn from(value: RunStatusParam) -> Self {
        match value {
            RunStatusParam::Prepared => InitialRunStatus::Prepared,
            RunStatusParam::Pending => InitialRunStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateRunRequest {
    pub status: RunTransition,
}

#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunTransition {
    Pending,
    Aborting,
}

#[derive(Debug, Deserialize)]
pub struct RunQuery {
    pub workflow_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RunTaskRequest {
    pub task: RunTaskName,
}

#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum RunTaskName {
    InitiateRun,
    AbortExecutions,
    RunCompletion,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/flux/1.0/runs", post(create_run).get(query_runs))
        .route("/flux/1.0/runs/:run_id", get(get_run).patch(update_run))
        .route("/flux/1.0/runs/:run_id/task", post(task_run))
        .with_state(state)
}

#[utoipa::path(
    post,
    path = "/flux/1.0/runs",
    request_body = CreateRunRequest,
    responses((status = 201, description = "Run created", body = Run)),
    tag = "runs"
)]
pub async fn create_run(
    State(state): State<AppState>,
    Json(req): Json<CreateRunRequest>,
) -> Result<(StatusCode, Json<Run>), ApiError> {
    let name = req.name.unwrap_or_else(|| Uuid::now_v7().to_string());
    let run = state
        .coordinator
        .create_run(req.workflow_id, name, req.parameters, req.status.into())
        .await?;
    Ok((StatusCode::CREATED, Json(run)))
}

#[utoipa::path(
    get,
    path = "/flux/1.0/runs/{run_id}",
    params(("run_id" = Uuid, Path, description = "Run id")),
    responses(
        (status = 200, description = "Run found", body = Run),
        (status = 404, description = "Run not found", body = ErrorResponse),
    ),
    tag = "runs"
)]
pub async fn get_run(State(state): State<AppState>, Path(run_id): Path<Uuid>) -> Result<Json<Run>, ApiError> {
    let run = state.store.get_run(run_id).await?;
    Ok(Json(run))
}

#[utoipa::path(
    get,
    path = "/flux/1.0/runs",
    params(("workflow_id" = Uuid, Query, description = "Owning workflow")),
    responses((status = 200, description = "Runs", body = ListResponse<Run>)),
    tag = "runs"
)]
pub async fn query_runs(
    State(state): State<AppState>,
    Query(query): Query<RunQuery>,
) -> Result<Json<ListResponse<Run>>, ApiError> {
    let runs = state.store.list_runs_for_workflow(query.workflow_id).await?;
    Ok(Json(runs.into()))
}

#[utoipa::path(
    patch,
    path = "/flux/1.0/runs/{run_id}",
    params(("run_id" = Uuid, Path, description = "Run id")),
    request_body = UpdateRunRequest,
    responses(
        (status = 200, description = "Run updated", body = Run),
        (status = 422, description = "Invalid transition", body = ErrorResponse),
    ),
    tag = "runs"
)]
pub async fn update_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
    Json(req): Json<UpdateRunRequest>,
) -> Result<Json<Run>, ApiError> {
    let status = match req.status {
        RunTransition::Pending => RunStatus::Pending,
        RunTransition::Aborting => RunStatus::Aborting,
    };
    let run = state.coordinator.update_run(run_id, status).await?;
    Ok(Json(run))
}

#[utoipa::path(
    post,
    path = "/flux/1.0/runs/{run_id}/task",
    params(("run_id" = Uuid, Path, description = "Run id")),
    request_body = RunTaskRequest,
    responses((status = 202, description = "Task accepted")),
    tag = "runs"
)]
pub async fn task_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
    Json(req): Json<RunTaskRequest>,
) -> StatusCode {
    // Tasks never propagate exceptions back to the scheduler — a 5xx here
    // would trigger a retry storm. Logged and accepted regardless.
    let result = match req.task {
        RunTaskName::InitiateRun => state.coordinator.task_initiate_run(run_id).await,
        RunTaskName::AbortExecutions => state.coordinator.task_abort_executions(run_id).await,
        RunTaskName::RunCompletion => state.coordinator.task_run_completion(run_id).await,
    };
    if let Err(error) = result {
        tracing::warn!(%run_id, task = ?req.task, ?error, "run task failed");
    }
    StatusCode::ACCEPTED
}
