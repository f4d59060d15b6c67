//! Operation registry: the authoritative description of every remote work
//! type, and the seam that tells the external scheduler how to reach it.
//!
//! Grounded on `durable::engine::registry`'s `ActivityRegistry` (persist,
//! then publish a queue/task-list binding to the scheduler so remote
//! workers know where to pick work up).

use std::sync::Arc;

use flux_dispatch::Dispatcher;
use flux_persistence::{Operation, Store};
use serde_json::Value;
use uuid::Uuid;

use crate::error::EngineError;

pub struct OperationRegistry {
    store: Arc<dyn Store>,
    dispatcher: Arc<dyn Dispatcher>,
    /// Base URL the coordinator's `process` callback endpoint is mounted
    /// under, used to build each operation's queue `endpoint`.
    callback_base_url: String,
}

impl OperationRegistry {
    pub fn new(
        store: Arc<dyn Store>,
        dispatcher: Arc<dyn Dispatcher>,
        callback_base_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            callback_base_url: callback_base_url.into(),
        }
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn dispatcher(&self) -> &dyn Dispatcher {
        self.dispatcher.as_ref()
    }

    pub fn callback_base_url(&self) -> &str {
        &self.callback_base_url
    }

    /// Persists `operation`, then publishes a matching queue to the
    /// scheduler.
    pub async fn put(&self, operation: Operation) -> Result<Operation, EngineError> {
        let endpoint = format!("{}/operations/{}/process", self.callback_base_url, operation.id);
        let operation = self.store.put_operation(operation).await?;
        self.dispatcher
            .create_queue(&operation.queue_id(), &operation.id, &operation.name, &endpoint)
            .await?;
        Ok(operation)
    }

    /// Asks the scheduler to create the remote process for one execution.
    /// `execution_id` here is the `WorkflowExecution`'s own globally-unique
    /// id (the remote process is created with `{queue_id, id=execution.id,
    /// ...}`) — the scheduler's `process` callback later echoes this same
    /// id back, which is what lets the coordinator look the execution up
    /// directly instead of disambiguating by run.
    pub async fn initiate(
        &self,
        operation: &Operation,
        execution_id: Uuid,
        tag: &str,
        input: Value,
        timeout: Option<u64>,
    ) -> Result<(), EngineError> {
        self.dispatcher
            .create_process(&operation.queue_id(), &execution_id.to_string(), tag, input, timeout)
            .await?;
        Ok(())
    }

    /// Used by `abort_executions`, which dispatches outside any deferred
    /// `PostCommitEffect` (see `Engine::abort_executions`).
    pub async fn request_abort(&self, execution_id: Uuid) -> Result<(), EngineError> {
        match self.dispatcher.update_process(&execution_id.to_string(), "aborted").await {
            Ok(()) => Ok(()),
            Err(flux_dispatch::DispatchError::Gone) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
