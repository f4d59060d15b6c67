//! Aggregated OpenAPI document, mirroring
//! `everruns-control-plane::main`'s `#[derive(OpenApi)]` block.

use utoipa::OpenApi;

use crate::api::common::{ErrorResponse, ListResponse};
use crate::api::{email_templates, executions, operations, requests, runs, workflows};

use flux_core::FieldKind;
use flux_coordinator::{ProcessCallback, RemoteStatus};
use flux_persistence::{
    EmailTemplate, Operation, OperationPhase, Outcome, OutcomeKind, Product, Request, RequestSlot,
    RequestStatus, Run, RunStatus, Surrogate, Workflow, WorkflowExecution, WorkflowKind,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        workflows::create_workflow,
        workflows::get_workflow,
        workflows::query_workflows,
        workflows::update_workflow,
        workflows::put_workflow,
        workflows::delete_workflow,
        workflows::generate_workflow,
        runs::create_run,
        runs::get_run,
        runs::query_runs,
        runs::update_run,
        runs::task_run,
        executions::get_execution,
        executions::query_executions,
        executions::update_execution,
        executions::task_execution,
        operations::create_operation,
        operations::put_operation,
        operations::get_operation,
        operations::list_operations,
        operations::process_callback,
        operations::task_operation,
        requests::create_request,
        requests::get_request,
        requests::query_requests,
        requests::update_request,
        requests::task_request,
        email_templates::put_email_template,
        email_templates::get_email_template,
    ),
    components(schemas(
        ErrorResponse,
        FieldKind,
        Workflow, WorkflowKind,
        workflows::CreateWorkflowRequest, workflows::UpdateWorkflowRequest,
        workflows::GenerateWorkflowRequest, workflows::GenerateOperation,
        Run, RunStatus, Product, Surrogate,
        runs::CreateRunRequest, runs::RunStatusParam, runs::UpdateRunRequest,
        runs::RunTransition, runs::RunTaskRequest, runs::RunTaskName,
        WorkflowExecution,
        executions::UpdateExecutionRequest, executions::ExecutionTransition,
        executions::ExecutionTaskRequest, executions::ExecutionTaskName,
        Operation, OperationPhase, Outcome, OutcomeKind,
        operations::PutOperationRequest, operations::OperationTaskRequest,
        ProcessCallback, RemoteStatus,
        Request, RequestStatus, RequestSlot,
        requests::CreateRequestRequest, requests::UpdateRequestRequest,
        requests::MessageBody, requests::RequestTaskRequest, requests::RequestTaskName,
        EmailTemplate, email_templates::PutEmailTemplateRequest,
        ListResponse<Workflow>, ListResponse<Run>, ListResponse<WorkflowExecution>,
        ListResponse<Operation>, ListResponse<Request>,
    )),
    tags(
        (name = "workflows", description = "Workflow specification CRUD and generation"),
        (name = "runs", description = "Run lifecycle endpoints"),
        (name = "executions", description = "Per-step execution endpoints"),
        (name = "operations", description = "Remote operation registry and scheduler callback"),
        (name = "requests", description = "Human-in-the-loop request endpoints"),
        (name = "email-templates", description = "Deduplicated email templates"),
    ),
    info(
        title = "Flux Workflow Orchestration API",
        version = "1.0.0",
        description = "RPC surface for the flux workflow orchestration engine",
    )
)]
pub struct ApiDoc;
