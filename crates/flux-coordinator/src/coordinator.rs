//! Locked entry points: one function per RPC/task/callback endpoint,
//! each following the same four-step discipline (open session, load
//! `FOR UPDATE`, transition inside a savepoint, commit then
//! `call_after_commit`). The run/step-advancing handlers additionally
//! savepoint the engine call itself: an error that survives the engine's
//! own rollback still ends the run as `failed` here (`fail_run_after_error`)
//! rather than leaving it stuck `active`.
//!
//! Grounded on `durable::engine::executor::WorkflowExecutor`'s public
//! methods (`start_workflow`, `process_workflow`, `on_activity_completed`,
//! `on_activity_failed`), generalized to this system's task/callback
//! vocabulary, and on `durable::worker::pool`'s "claim, execute, ack"
//! discipline applied to HTTP callback handling rather than in-process
//! activity execution.

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use flux_dispatch::{Dispatcher, PostCommitEffect};
use flux_engine::Engine;
use flux_persistence::{Request, RequestStatus, Run, RunStatus, Store};
use flux_requests::{reassign_assignee, update_status, ProposedMessage, RequestNotifier};

use crate::callback::ProcessCallback;
use crate::error::CoordinatorError;

/// `Run.create`'s `status` parameter: `prepared` or `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitialRunStatus {
    Prepared,
    Pending,
}

pub struct Coordinator {
    store: Arc<dyn Store>,
    dispatcher: Arc<dyn Dispatcher>,
    engine: Arc<Engine>,
    notifier: Arc<dyn RequestNotifier>,
    callback_base_url: String,
    /// Replaces the original's hardcoded fallback-admin UUID (see
    /// `flux_requests::reassign_assignee`'s doc comment and DESIGN.md).
    fallback_assignee: Uuid,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn Store>,
        dispatcher: Arc<dyn Dispatcher>,
        engine: Arc<Engine>,
        notifier: Arc<dyn RequestNotifier>,
        callback_base_url: impl Into<String>,
        fallback_assignee: Uuid,
    ) -> Self {
        Self {
            store,
            dispatcher,
            engine,
            notifier,
            callback_base_url: callback_base_url.into(),
            fallback_assignee,
        }
    }

    fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Last-resort savepoint: if the engine still raised past its own
    /// business-logic rollback (an infrastructure fault during
    /// `initiate_run`/`process_step`), the run is swept into `failed` here
    /// too, rather than trusting every caller to have handled it — the
    /// Termination invariant holds regardless of where the fault
    /// originated.
    async fn fail_run_after_error(&self, run_id: Uuid, error: flux_engine::EngineError) {
        tracing::warn!(%run_id, %error, "ending run as failed after coordinator-level error");
        match self.engine.end_run(run_id, RunStatus::Failed).await {
            Ok(effects) => self.dispatch(effects).await,
            Err(fail_error) => tracing::warn!(%run_id, %fail_error, "failed to end run after coordinator-level error"),
        }
    }

    /// Drains deferred effects through the real dispatcher. Infrastructure
    /// failures here are logged and swallowed — they are best-effort
    /// notifications, not primary mutations.
    async fn dispatch(&self, effects: Vec<PostCommitEffect>) {
        for effect in effects {
            if let Err(error) = effect.dispatch(self.dispatcher.as_ref()).await {
                tracing::warn!(?error, "post-commit dispatch failed");
            }
        }
    }

    fn initiate_run_task(&self, run_id: Uuid) -> PostCommitEffect {
        PostCommitEffect::task(
            "initiate-run",
            flux_dispatch::CallbackSpec::post(
                format!("{}/runs/{run_id}/initiate-run", self.callback_base_url),
                json!({"run_id": run_id}),
            ),
        )
    }

    // =========================================================================
    // Run — RPC handlers
    // =========================================================================

    /// `Run.create`: schedules `initiate-run` only when the caller asks
    /// for `status=pending` (the default) rather than `prepared`.
    pub async fn create_run(
        &self,
        workflow_id: Uuid,
        name: String,
        parameters: serde_json::Value,
        status: InitialRunStatus,
    ) -> Result<Run, CoordinatorError> {
        let run = Run {
            id: Uuid::now_v7(),
            workflow_id,
            name,
            status: match status {
                InitialRunStatus::Prepared => RunStatus::Prepared,
                InitialRunStatus::Pending => RunStatus::Pending,
            },
            parameters,
            started: None,
            ended: None,
            products: Default::default(),
        };
        let run = self.store().create_run(run).await?;

        if run.status == RunStatus::Pending {
            self.dispatch(vec![self.initiate_run_task(run.id)]).await;
        }
        Ok(run)
    }

    // =========================================================================
    // Run — task handlers
    // =========================================================================

    /// `task("initiate-run")`. An engine error that survives its own
    /// savepoint rollback (an infrastructure fault, not a business-logic
    /// failure) still ends the run as `failed` here rather than leaving
    /// it stuck `active`.
    pub async fn task_initiate_run(&self, run_id: Uuid) -> Result<(), CoordinatorError> {
        match self.engine.initiate_run(run_id).await {
            Ok(effects) => self.dispatch(effects).await,
            Err(error) => self.fail_run_after_error(run_id, error).await,
        }
        Ok(())
    }

    /// `task("abort-executions")`.
    pub async fn task_abort_executions(&self, run_id: Uuid) -> Result<(), CoordinatorError> {
        let effects = self.engine.abort_executions(run_id).await?;
        self.dispatch(effects).await;
        Ok(())
    }

    /// `task("run-completion")`: optional email notify on `run:completed`.
    /// No `EmailTemplate` is linked to a `Run` in this data model (only
    /// `Request` carries `template_id`), so this is a logging stub rather
    /// than a dead letter — a future run-level notification config would
    /// hang off this handler.
    pub async fn task_run_completion(&self, run_id: Uuid) -> Result<(), CoordinatorError> {
        tracing::info!(%run_id, "run completion notification");
        Ok(())
    }

    /// `Run.update`: `pending` from `prepared`, or `aborting`.
    pub async fn update_run(&self, run_id: Uuid, new_status: RunStatus) -> Result<Run, CoordinatorError> {
        match new_status {
            RunStatus::Pending => {
                let (mut run, mut guard) = self.store().load_run_for_update(run_id).await?;
                if run.status != RunStatus::Prepared {
                    guard.commit().await?;
                    return Ok(run);
                }
                run.status = RunStatus::Pending;
                self.store().save_run(&mut guard, &run).await?;
                guard.commit().await?;
                self.dispatch(vec![self.initiate_run_task(run.id)]).await;
                Ok(run)
            }
            RunStatus::Aborting => {
                let effects = self.engine.abort_request(run_id).await?;
                self.dispatch(effects).await;
                self.store().get_run(run_id).await.map_err(Into::into)
            }
            _ => Err(CoordinatorError::Operation("invalid-transition")),
        }
    }

    /// `Execution.update{status=aborting}`: triggers the run-level
    /// abort cascade rather than mutating the execution row directly — the
    /// execution itself only ever flips to `aborting`/`aborted` from inside
    /// `Engine::abort_executions`'s own sweep.
    pub async fn update_execution_aborting(&self, execution_id: Uuid) -> Result<(), CoordinatorError> {
        let execution = match self.store().get_execution(execution_id).await {
            Ok(e) => e,
            Err(_) => return Ok(()),
        };
        let effects = self.engine.abort_request(execution.run_id).await?;
        self.dispatch(effects).await;
        Ok(())
    }

    // =========================================================================
    // Operation — scheduler callback
    // =========================================================================

    /// The scheduler's `process` POST. Idempotent: a callback for an
    /// execution that is already terminal is a silent no-op — this is the
    /// very first thing checked, inside the locked section, before any
    /// other work.
    ///
    /// The terminal check is released before calling into
    /// `Engine::process_step`, which re-acquires its own lock on the same
    /// row — holding it across that call would self-deadlock against the
    /// in-memory store's per-id mutex (see `flux-engine::engine`'s locking
    /// discipline note).
    pub async fn process_operation_callback(&self, callback: ProcessCallback) -> Result<(), CoordinatorError> {
        let (execution, guard) = match self.store().load_execution_for_update(callback.id).await {
            Ok(pair) => pair,
            Err(_) => return Ok(()),
        };
        if execution.status.is_terminal() {
            guard.commit().await?;
            return Ok(());
        }
        guard.commit().await?;

        match self
            .engine
            .process_step(callback.id, callback.status.into(), callback.output)
            .await
        {
            Ok(effects) => self.dispatch(effects).await,
            Err(error) => self.fail_run_after_error(execution.run_id, error).await,
        }
        Ok(())
    }

    // =========================================================================
    // Request — task handlers
    // =========================================================================

    /// `task("initiate-request")`: emails the assignee via the request's
    /// linked template. Best-effort — a missing template or unreachable
    /// subject directory is logged, never surfaced to the scheduler.
    pub async fn task_initiate_request(&self, request_id: Uuid) -> Result<(), CoordinatorError> {
        let request = match self.store().get_request(request_id).await {
            Ok(r) => r,
            Err(_) => return Ok(()),
        };
        if let Err(error) = self.notifier.notify_pending(&request).await {
            tracing::warn!(%request_id, ?error, "initiate-request notification failed");
        }
        Ok(())
    }

    /// `task("cancel-request")`.
    pub async fn task_cancel_request(&self, request_id: Uuid) -> Result<(), CoordinatorError> {
        let request = match self.store().get_request(request_id).await {
            Ok(r) => r,
            Err(_) => return Ok(()),
        };
        if let Err(error) = self.notifier.notify_canceled(&request).await {
            tracing::warn!(%request_id, ?error, "cancel-request notification failed");
        }
        self.publish_request_completed(request_id).await;
        Ok(())
    }

    /// `task("decline-request")`.
    pub async fn task_decline_request(&self, request_id: Uuid) -> Result<(), CoordinatorError> {
        let request = match self.store().get_request(request_id).await {
            Ok(r) => r,
            Err(_) => return Ok(()),
        };
        if let Err(error) = self.notifier.notify_declined(&request).await {
            tracing::warn!(%request_id, ?error, "decline-request notification failed");
        }
        self.publish_request_completed(request_id).await;
        Ok(())
    }

    /// `task("complete-request-operation")`: there is no email for the
    /// completed case (only init/cancel/decline carry bodies), so this
    /// handler's only job is the `request:completed` event.
    pub async fn task_complete_request_operation(&self, request_id: Uuid) -> Result<(), CoordinatorError> {
        self.publish_request_completed(request_id).await;
        Ok(())
    }

    async fn publish_request_completed(&self, request_id: Uuid) {
        self.dispatch(vec![PostCommitEffect::event(
            "request:completed",
            json!({"request_id": request_id}),
        )])
        .await;
    }

    /// `task("reassign-request-assignee")`: bulk-reassigns every request
    /// owned by `departing` to the configured fallback.
    pub async fn task_reassign_request_assignee(&self, departing: Uuid) -> Result<(), CoordinatorError> {
        let (_reassigned, effects) = reassign_assignee(self.store(), departing, self.fallback_assignee).await?;
        self.dispatch(effects).await;
        Ok(())
    }

    // =========================================================================
    // Request — RPC handlers
    // =========================================================================

    /// `Request.create`. Schedules `initiate-request` when the request
    /// is created directly into `pending` (mirroring `Run.create`'s
    /// status-gated scheduling).
    pub async fn create_request(&self, mut request: Request, start_pending: bool) -> Result<Request, CoordinatorError> {
        request.id = Uuid::now_v7();
        if start_pending {
            update_status(&mut request, RequestStatus::Pending, None)?;
        }
        let request = self.store().create_request(request).await?;
        if request.status == RequestStatus::Pending {
            self.schedule_request_task("initiate-request", request.id).await;
        }
        Ok(request)
    }

    /// `Request.update`: drives the status transition table, scheduling
    /// the matching task once the transition commits.
    pub async fn update_request(
        &self,
        request_id: Uuid,
        new_status: RequestStatus,
        message: Option<ProposedMessage>,
    ) -> Result<Request, CoordinatorError> {
        let (mut request, mut guard) = self.store().load_request_for_update(request_id).await?;
        update_status(&mut request, new_status, message.as_ref())?;
        self.store().save_request(&mut guard, &request).await?;
        guard.commit().await?;

        let task_name = match request.status {
            RequestStatus::Pending => Some("initiate-request"),
            RequestStatus::Canceled => Some("cancel-request"),
            RequestStatus::Declined => Some("decline-request"),
            RequestStatus::Completed => Some("complete-request-operation"),
            _ => None,
        };
        if let Some(name) = task_name {
            self.schedule_request_task(name, request.id).await;
        }
        Ok(request)
    }

    async fn schedule_request_task(&self, name: &str, request_id: Uuid) {
        let callback = flux_dispatch::CallbackSpec::post(
            format!("{}/requests/{request_id}/{name}", self.callback_base_url),
            json!({"request_id": request_id}),
        );
        self.dispatch(vec![PostCommitEffect::task(name, callback)]).await;
    }
}
