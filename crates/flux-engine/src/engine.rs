//! The workflow engine: rule/action evaluation and the Run/WorkflowExecution
//! state machines.
//!
//! Grounded on `durable::engine::executor`'s control-flow shape (one
//! `match action { ... }` dispatch block per evaluated rule list, explicit
//! `Result` propagation instead of exceptions-for-control-flow) and on
//! `original_source/flux/engine/{rule,action,step}.py` for the exact
//! algorithm this file ports.
//!
//! Locking discipline: unlike the original's single DB session per request,
//! each method here only holds a row lock for the statement that needs it,
//! then releases it before recursing (`execute-step`/`execute-operation` can
//! re-enter this engine for the same run) or performing outbound HTTP calls.
//! The row lock still serializes every *write* to a given run/execution;
//! what's given up is holding it across an entire rule-list evaluation, which
//! the in-memory store's single mutex-per-id cannot do without deadlocking on
//! self-recursion anyway.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use flux_core::{merge_values, Context};
use flux_dispatch::{CallbackSpec, Dispatcher, PostCommitEffect};
use flux_persistence::{OutcomeKind, Run, RunStatus, Store, Surrogate, WorkflowExecution};
use flux_spec::{Action, RuleList};

use crate::cache::ElementCache;
use crate::error::EngineError;
use crate::registry::OperationRegistry;

/// The scheduler callback's reported terminal status for one execution
/// (`Step.process`'s `status` parameter).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackStatus {
    Completed,
    Failed,
    Timedout,
}

/// Per-rule-list-evaluation scratch state (`Environment`, stripped of
/// `workflow`/`run`/`ancestor` — those are threaded as explicit arguments
/// here rather than carried on the struct, since this file's methods are
/// free functions over `Store`/`Dispatcher` rather than methods on a domain
/// object).
struct Environment {
    ctx: Context,
    output: Option<Value>,
    failure: bool,
}

fn run_context(run: &Run) -> Value {
    json!({
        "run": {
            "id": run.id,
            "name": run.name,
            "started": run.started,
            "env": run.parameters,
        }
    })
}

fn execution_context(execution: &WorkflowExecution) -> Value {
    json!({
        "step": {
            "serial": execution.execution_id,
            "id": execution.id,
            "step": execution.step,
            "status": execution.status,
            "outcome": execution.outcome,
            "started": execution.started,
            "ended": execution.ended,
        }
    })
}

fn is_empty(value: &Value) -> bool {
    matches!(value, Value::Null) || matches!(value, Value::Object(m) if m.is_empty())
}

pub struct Engine {
    cache: ElementCache,
    registry: OperationRegistry,
}

impl Engine {
    pub fn new(store: Arc<dyn Store>, dispatcher: Arc<dyn Dispatcher>, callback_base_url: impl Into<String>) -> Self {
        Self {
            cache: ElementCache::new(),
            registry: OperationRegistry::new(store, dispatcher, callback_base_url),
        }
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    fn store(&self) -> &dyn Store {
        self.registry.store()
    }

    /// The savepoint-rollback boundary: a business-logic failure raised by
    /// operation lookup or rule evaluation rolls the run back to `failed`
    /// instead of leaving it stuck `active` forever, mirroring the
    /// `completed/invalid` branch below that converts a terminal condition
    /// into `end_run`'s own `Ok` result rather than propagating. Errors that
    /// are not business-logic failures (infrastructure faults) still
    /// propagate unchanged.
    async fn end_run_on_failure(
        &self,
        run_id: Uuid,
        error: EngineError,
    ) -> Result<Vec<PostCommitEffect>, EngineError> {
        if !error.fails_run() {
            return Err(error);
        }
        tracing::warn!(%run_id, %error, "run failed during rule evaluation");
        self.end_run(run_id, RunStatus::Failed).await
    }

    /// `Step.initiate`, numbered exactly as the algorithm it implements.
    pub async fn initiate_step(
        &self,
        run_id: Uuid,
        step_name: &str,
        ancestor: Option<Uuid>,
        parameters: Option<Value>,
        values: Option<Value>,
    ) -> Result<Vec<PostCommitEffect>, EngineError> {
        // 1. race with abort.
        let run = self.store().get_run(run_id).await?;
        if !run.is_active() {
            return Ok(Vec::new());
        }

        // 2. lookup the operation by token via the step's declared binding.
        let workflow = self.store().get_workflow(run.workflow_id).await?;
        let spec_text = workflow.specification.clone().unwrap_or_default();
        let spec = self.cache.acquire(workflow.id, workflow.modified, &spec_text)?;
        let step = match spec.steps.get(step_name) {
            Some(step) => step,
            None => {
                return self
                    .end_run_on_failure(run_id, EngineError::UnknownStep(step_name.to_string()))
                    .await;
            }
        };
        let operation = match self.store().get_operation(&step.operation).await {
            Ok(operation) => operation,
            Err(_) => {
                return self
                    .end_run_on_failure(run_id, EngineError::UnknownOperation(step.operation.clone()))
                    .await;
            }
        };

        // 3. params = operation-defaults ⊕ step-defaults ⊕ caller-parameters.
        let params = merge_values(
            &merge_values(&operation.parameters, &step.parameters),
            &parameters.unwrap_or(Value::Null),
        );

        // 4. allocate execution_id under the run's row lock, then create the row.
        let execution_id = {
            let (_run, mut guard) = self.store().load_run_for_update(run_id).await?;
            let id = self.store().allocate_execution_id(&mut guard, run_id).await?;
            guard.commit().await?;
            id
        };
        let execution = WorkflowExecution {
            id: Uuid::now_v7(),
            run_id,
            execution_id,
            ancestor_id: ancestor,
            step: step_name.to_string(),
            name: None,
            status: RunStatus::Pending,
            outcome: None,
            started: None,
            ended: None,
            parameters: params.clone(),
        };
        let execution = self.store().create_execution(execution).await?;

        // 5. construct interpolator; interpolate params against the input schema.
        let ctx = Context::assemble([
            run_context(&run),
            execution_context(&execution),
            values.unwrap_or(Value::Null),
        ]);
        let interpolated_params = if is_empty(&params) {
            params
        } else {
            operation.input_schema.interpolate(&params, &ctx)?
        };

        // 6. evaluate preoperation; a raised error ends the run as failed
        // before this method returns (the savepoint-rollback boundary).
        let mut env = Environment { ctx, output: None, failure: false };
        let effects = match self
            .evaluate_rules(&step.preoperation, run_id, Some(execution.id), &mut env)
            .await
        {
            Ok(effects) => effects,
            Err(error) => return self.end_run_on_failure(run_id, error).await,
        };

        // 7. mark the execution started and commit.
        let (mut execution, mut guard) = self.store().load_execution_for_update(execution.id).await?;
        execution.status = RunStatus::Active;
        execution.started = Some(Utc::now());
        self.store().save_execution(&mut guard, &execution).await?;
        guard.commit().await?;

        // 8. ask the operation registry to create the remote process.
        self.registry
            .initiate(&operation, execution.id, step_name, interpolated_params, step.timeout)
            .await?;

        Ok(effects)
    }

    /// The `execute-operation` extension (flux-spec's `Action::ExecuteOperation`):
    /// spawns a bare operation invocation with no declared `StepSpec` — no
    /// preoperation/postoperation rule list and no step-level parameter
    /// layer or timeout, otherwise identical to `initiate_step`. Not named
    /// in the action semantics list; included because the `Action`
    /// enum already carries the variant (see DESIGN.md).
    async fn initiate_operation(
        &self,
        run_id: Uuid,
        operation_id: &str,
        ancestor: Option<Uuid>,
        parameters: Value,
    ) -> Result<Vec<PostCommitEffect>, EngineError> {
        let run = self.store().get_run(run_id).await?;
        if !run.is_active() {
            return Ok(Vec::new());
        }

        let operation = self
            .store()
            .get_operation(operation_id)
            .await
            .map_err(|_| EngineError::UnknownOperation(operation_id.to_string()))?;
        let params = merge_values(&operation.parameters, &parameters);

        let execution_id = {
            let (_run, mut guard) = self.store().load_run_for_update(run_id).await?;
            let id = self.store().allocate_execution_id(&mut guard, run_id).await?;
            guard.commit().await?;
            id
        };
        let execution = WorkflowExecution {
            id: Uuid::now_v7(),
            run_id,
            execution_id,
            ancestor_id: ancestor,
            step: operation_id.to_string(),
            name: None,
            status: RunStatus::Pending,
            outcome: None,
            started: None,
            ended: None,
            parameters: params.clone(),
        };
        let execution = self.store().create_execution(execution).await?;

        let ctx = Context::assemble([run_context(&run), execution_context(&execution)]);
        let interpolated_params = if is_empty(&params) {
            params
        } else {
            operation.input_schema.interpolate(&params, &ctx)?
        };

        let (mut execution, mut guard) = self.store().load_execution_for_update(execution.id).await?;
        execution.status = RunStatus::Active;
        execution.started = Some(Utc::now());
        self.store().save_execution(&mut guard, &execution).await?;
        guard.commit().await?;

        self.registry
            .initiate(&operation, execution.id, operation_id, interpolated_params, None)
            .await?;

        Ok(Vec::new())
    }

    /// `Run.initiate`, called by the coordinator's `initiate-run` task
    /// handler (coordinator `task("initiate-run")` -> engine `initiate` ->
    /// for entry step: engine `step.initiate`). Races with a concurrent
    /// abort the same way `initiate_step` does: a
    /// run no longer `pending` is left untouched.
    pub async fn initiate_run(&self, run_id: Uuid) -> Result<Vec<PostCommitEffect>, EngineError> {
        let (mut run, mut guard) = self.store().load_run_for_update(run_id).await?;
        if run.status != RunStatus::Pending {
            guard.commit().await?;
            return Ok(Vec::new());
        }
        run.status = RunStatus::Active;
        run.started = Some(Utc::now());
        self.store().save_run(&mut guard, &run).await?;
        guard.commit().await?;

        let workflow = self.store().get_workflow(run.workflow_id).await?;
        let spec_text = workflow.specification.clone().unwrap_or_default();
        let spec = self.cache.acquire(workflow.id, workflow.modified, &spec_text)?;
        let entry = spec.entry.clone();

        self.initiate_step(run_id, &entry, None, None, None).await
    }

    /// `RuleList.evaluate`: iterate `rules.select_actions` (condition-matching
    /// and `terminal`-stop already applied by `flux-spec`) and dispatch each
    /// action, mirroring `durable::engine::executor::process_actions_internal`'s
    /// match block.
    async fn evaluate_rules(
        &self,
        rules: &RuleList,
        run_id: Uuid,
        ancestor: Option<Uuid>,
        env: &mut Environment,
    ) -> Result<Vec<PostCommitEffect>, EngineError> {
        let mut effects = Vec::new();
        let actions: Vec<Action> = rules.select_actions(&env.ctx).into_iter().cloned().collect();

        for action in actions {
            match action {
                Action::ExecuteOperation { operation, parameters } => {
                    if env.failure {
                        continue;
                    }
                    let params = flux_core::interpolate_value(&parameters, &env.ctx)?;
                    effects.extend(self.initiate_operation(run_id, &operation, ancestor, params).await?);
                }
                Action::ExecuteStep { step, parameters } => {
                    if env.failure {
                        continue;
                    }
                    let params = flux_core::interpolate_value(&parameters, &env.ctx)?;
                    let values = json!({"step": {"out": env.output}});
                    effects.extend(
                        self.initiate_step(run_id, &step, ancestor, Some(params), Some(values)).await?,
                    );
                }
                Action::IgnoreStepFailure {} => {
                    env.failure = false;
                }
                Action::PromoteProducts { products } => {
                    let resolved = flux_core::interpolate_value(&products, &env.ctx)?;
                    self.promote_products(run_id, resolved).await?;
                }
                Action::UpdateEnvironment { parameters } => {
                    let resolved = flux_core::interpolate_value(&parameters, &env.ctx)?;
                    self.update_environment(run_id, resolved).await?;
                }
            }
        }

        Ok(effects)
    }

    async fn promote_products(&self, run_id: Uuid, products: Value) -> Result<(), EngineError> {
        let (mut run, mut guard) = self.store().load_run_for_update(run_id).await?;
        if let Value::Object(map) = products {
            for (token, surrogate_value) in map {
                let surrogate: Surrogate = serde_json::from_value(surrogate_value)
                    .map_err(|e| EngineError::Fatal(format!("invalid surrogate for product '{token}': {e}")))?;
                run.associate_product(token, surrogate);
            }
        }
        self.store().save_run(&mut guard, &run).await?;
        guard.commit().await?;
        Ok(())
    }

    async fn update_environment(&self, run_id: Uuid, parameters: Value) -> Result<(), EngineError> {
        let (mut run, mut guard) = self.store().load_run_for_update(run_id).await?;
        run.parameters = merge_values(&run.parameters, &parameters);
        self.store().save_run(&mut guard, &run).await?;
        guard.commit().await?;
        Ok(())
    }

    /// `Step.process`, called by the coordinator on a scheduler callback.
    pub async fn process_step(
        &self,
        execution_id: Uuid,
        status: CallbackStatus,
        output: Value,
    ) -> Result<Vec<PostCommitEffect>, EngineError> {
        // 1/2. stamp ended, bail silently if the run already moved on.
        let (mut execution, mut guard) = self.store().load_execution_for_update(execution_id).await?;
        let run_id = execution.run_id;
        let run = self.store().get_run(run_id).await?;
        if !run.is_active() {
            guard.commit().await?;
            return Ok(Vec::new());
        }
        execution.ended = Some(Utc::now());

        let workflow = self.store().get_workflow(run.workflow_id).await?;
        let spec_text = workflow.specification.clone().unwrap_or_default();
        let spec = self.cache.acquire(workflow.id, workflow.modified, &spec_text)?;
        let step = match spec.steps.get(&execution.step) {
            Some(step) => step,
            None => {
                return self
                    .end_run_on_failure(run_id, EngineError::UnknownStep(execution.step.clone()))
                    .await;
            }
        };
        let operation = match self.store().get_operation(&step.operation).await {
            Ok(operation) => operation,
            Err(_) => {
                return self
                    .end_run_on_failure(run_id, EngineError::UnknownOperation(step.operation.clone()))
                    .await;
            }
        };

        // 3. switch on status.
        let mut out_values: Option<Value> = None;

        match status {
            CallbackStatus::Completed => {
                let valid = output.get("status").and_then(Value::as_str) == Some("valid");
                if valid {
                    let outcome_name = output
                        .get("outcome")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    let succeeded = operation
                        .outcomes
                        .get(&outcome_name)
                        .map(|o| o.kind == OutcomeKind::Success)
                        .unwrap_or(false);
                    execution.status = if succeeded { RunStatus::Completed } else { RunStatus::Failed };
                    execution.outcome = Some(outcome_name);
                    out_values = output.get("values").cloned();
                } else {
                    // completed/invalid: invalidate the execution and the run, no postoperation.
                    execution.status = RunStatus::Invalidated;
                    self.store().save_execution(&mut guard, &execution).await?;
                    guard.commit().await?;
                    return self.end_run(run_id, RunStatus::Invalidated).await;
                }
            }
            CallbackStatus::Failed => execution.status = RunStatus::Failed,
            CallbackStatus::Timedout => execution.status = RunStatus::Timedout,
        }
        // Any execution settling into failed/timedout — whether the scheduler
        // reported that status directly or it fell out of an outcome lookup —
        // starts postoperation with `failure` set (the rule-evaluation step
        // checks `execution.status` itself, which only makes sense if this
        // is true).
        let failure = matches!(execution.status, RunStatus::Failed | RunStatus::Timedout);

        self.store().save_execution(&mut guard, &execution).await?;
        guard.commit().await?;

        // 4. build the rule environment, step.out populated if values arrived.
        let mut parts = vec![run_context(&run), execution_context(&execution)];
        if let Some(values) = &out_values {
            parts.push(json!({"step": {"out": values}}));
        }
        let ctx = Context::assemble(parts);
        let mut env = Environment { ctx, output: out_values, failure };

        // 5. evaluate postoperation; a raised error ends the run as failed
        // before this method returns (the savepoint-rollback boundary).
        let mut effects = match self
            .evaluate_rules(&step.postoperation, run_id, Some(execution.id), &mut env)
            .await
        {
            Ok(effects) => effects,
            Err(error) => return self.end_run_on_failure(run_id, error).await,
        };

        // 6. a failure surviving postoperation ends the run immediately.
        if env.failure {
            let terminal = match execution.status {
                RunStatus::Timedout => RunStatus::Timedout,
                _ => RunStatus::Failed,
            };
            effects.extend(self.end_run(run_id, terminal).await?);
            return Ok(effects);
        }

        // 7. otherwise, end the run once no execution remains active.
        let remaining = self.store().list_executions_for_run(run_id).await?;
        if !remaining.iter().any(WorkflowExecution::is_active) {
            let final_status = if remaining.iter().any(|e| e.status == RunStatus::Failed) {
                RunStatus::Failed
            } else if remaining.iter().any(|e| e.status == RunStatus::Timedout) {
                RunStatus::Timedout
            } else {
                RunStatus::Completed
            };
            effects.extend(self.end_run(run_id, final_status).await?);
        }

        Ok(effects)
    }

    /// `Run._end_run`: the single idempotent terminal sink.
    pub async fn end_run(&self, run_id: Uuid, status: RunStatus) -> Result<Vec<PostCommitEffect>, EngineError> {
        let (mut run, mut guard) = self.store().load_run_for_update(run_id).await?;
        if run.status.is_terminal() {
            guard.commit().await?;
            return Ok(Vec::new());
        }
        run.status = status;
        run.ended = Some(Utc::now());
        self.store().save_run(&mut guard, &run).await?;
        guard.commit().await?;

        let mut effects = vec![
            PostCommitEffect::event("run:changed", json!({"run_id": run_id, "status": status})),
            PostCommitEffect::event("run:ended", json!({"run_id": run_id, "status": status})),
        ];

        if status == RunStatus::Invalidated {
            effects.extend(self.abort_executions(run_id).await?);
        }

        Ok(effects)
    }

    /// `Run.abort_request`: flips the run to `aborting` and
    /// hands the coordinator a deferred task to sweep active executions.
    pub async fn abort_request(&self, run_id: Uuid) -> Result<Vec<PostCommitEffect>, EngineError> {
        let (mut run, mut guard) = self.store().load_run_for_update(run_id).await?;
        if !matches!(run.status, RunStatus::Active | RunStatus::Pending | RunStatus::Waiting) {
            guard.commit().await?;
            return Ok(Vec::new());
        }
        run.status = RunStatus::Aborting;
        self.store().save_run(&mut guard, &run).await?;
        guard.commit().await?;

        let callback = CallbackSpec::post(
            format!("{}/runs/{run_id}/abort-executions", self.registry.callback_base_url()),
            json!({"run_id": run_id}),
        );
        Ok(vec![PostCommitEffect::task("abort-executions", callback)])
    }

    /// `Run.abort_executions`: re-queries the active-execution set until
    /// it is empty rather than
    /// enumerating once, so executions created concurrently with the abort
    /// (e.g. by an in-flight `execute-step`) are still swept. Dispatches the
    /// scheduler cancel call directly rather than deferring it through a
    /// `PostCommitEffect` — each execution's abort is its own independently
    /// committed row transition, not one atomic unit the coordinator can
    /// defer effects behind (the coordinator's `call_after_commit`
    /// discipline applies per-handler-transaction; this loop spans many).
    pub async fn abort_executions(&self, run_id: Uuid) -> Result<Vec<PostCommitEffect>, EngineError> {
        loop {
            let executions = self.store().list_executions_for_run(run_id).await?;
            let active: Vec<_> = executions.into_iter().filter(WorkflowExecution::is_active).collect();
            if active.is_empty() {
                break;
            }

            for candidate in active {
                let (mut execution, mut guard) = self.store().load_execution_for_update(candidate.id).await?;
                if !execution.is_active() {
                    guard.commit().await?;
                    continue;
                }
                // The external process is canceled and the execution settles
                // straight to the terminal `aborted` status — this model has
                // no separate scheduler callback confirming the cancellation,
                // so there is no intermediate `aborting` execution state to
                // wait on (unlike the run-level `aborting` status, which waits
                // on this very sweep).
                execution.status = RunStatus::Aborted;
                execution.ended = Some(Utc::now());
                self.store().save_execution(&mut guard, &execution).await?;
                guard.commit().await?;

                self.registry.request_abort(execution.id).await?;
            }
        }

        self.end_run(run_id, RunStatus::Aborted).await
    }
}
