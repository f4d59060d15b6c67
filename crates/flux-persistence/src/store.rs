//! The `Store` trait: row-level CRUD plus pessimistic locking for every
//! entity this system persists.
//!
//! Grounded on `durable::persistence::store::WorkflowEventStore`'s shape
//! (one trait, banner-commented sections, an in-memory and a Postgres
//! implementor) generalized from one event-sourced aggregate to the full
//! entity set this system persists. `load_*_for_update` / `save_*` pairs
//! model the "open a transaction ... load(lockmode=update) ... commit"
//! discipline: the lock is represented by a [`RowGuard`] the caller must
//! hold across the read-modify-write and then explicitly
//! [`RowGuard::commit`].

use async_trait::async_trait;
use uuid::Uuid;

use crate::entities::*;
use crate::error::StoreError;

/// Holds whatever lock/transaction state a `load_*_for_update` call
/// acquired. Must be committed (or simply dropped, to roll back/release)
/// by the caller once the guarded write is ready.
pub enum RowGuard {
    /// In-memory backend: an owned mutex permit. Dropping releases it.
    Memory(tokio::sync::OwnedMutexGuard<()>),
    /// Postgres backend: an open transaction holding the row lock via
    /// `SELECT ... FOR UPDATE`. Dropping without `commit` rolls back.
    Postgres(sqlx::Transaction<'static, sqlx::Postgres>),
}

impl RowGuard {
    pub async fn commit(self) -> Result<(), StoreError> {
        match self {
            RowGuard::Memory(_guard) => Ok(()),
            RowGuard::Postgres(tx) => tx.commit().await.map_err(Into::into),
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync + 'static {
    // =====================================================================
    // Workflow
    // =====================================================================
    async fn create_workflow(&self, workflow: Workflow) -> Result<Workflow, StoreError>;
    async fn get_workflow(&self, id: Uuid) -> Result<Workflow, StoreError>;
    async fn get_workflow_by_name(&self, name: &str) -> Result<Workflow, StoreError>;
    async fn list_workflows(&self) -> Result<Vec<Workflow>, StoreError>;
    async fn update_workflow(&self, workflow: Workflow) -> Result<Workflow, StoreError>;
    async fn delete_workflow(&self, id: Uuid) -> Result<(), StoreError>;
    /// True if any non-terminal run references this workflow (delete guard
    /// for `cannot-delete-uncompleted-workflow`).
    async fn has_active_runs(&self, workflow_id: Uuid) -> Result<bool, StoreError>;

    // =====================================================================
    // Run
    // =====================================================================
    async fn create_run(&self, run: Run) -> Result<Run, StoreError>;
    async fn get_run(&self, id: Uuid) -> Result<Run, StoreError>;
    async fn get_run_by_name(&self, name: &str) -> Result<Run, StoreError>;
    async fn list_runs_for_workflow(&self, workflow_id: Uuid) -> Result<Vec<Run>, StoreError>;
    async fn load_run_for_update(&self, id: Uuid) -> Result<(Run, RowGuard), StoreError>;
    async fn save_run(&self, guard: &mut RowGuard, run: &Run) -> Result<(), StoreError>;

    /// Allocates the next `execution_id` for a run. Must be called while
    /// holding that run's [`RowGuard`] — the allocator reads
    /// `len(executions)+1` under the run's row lock.
    async fn allocate_execution_id(
        &self,
        guard: &mut RowGuard,
        run_id: Uuid,
    ) -> Result<i64, StoreError>;

    // =====================================================================
    // WorkflowExecution
    // =====================================================================
    async fn create_execution(
        &self,
        execution: WorkflowExecution,
    ) -> Result<WorkflowExecution, StoreError>;
    async fn get_execution(&self, id: Uuid) -> Result<WorkflowExecution, StoreError>;
    async fn load_execution_for_update(
        &self,
        id: Uuid,
    ) -> Result<(WorkflowExecution, RowGuard), StoreError>;
    async fn save_execution(
        &self,
        guard: &mut RowGuard,
        execution: &WorkflowExecution,
    ) -> Result<(), StoreError>;
    async fn list_executions_for_run(
        &self,
        run_id: Uuid,
    ) -> Result<Vec<WorkflowExecution>, StoreError>;

    // =====================================================================
    // Operation
    // =====================================================================
    async fn put_operation(&self, operation: Operation) -> Result<Operation, StoreError>;
    async fn get_operation(&self, id: &str) -> Result<Operation, StoreError>;
    async fn list_operations(&self) -> Result<Vec<Operation>, StoreError>;

    // =====================================================================
    // Request
    // =====================================================================
    async fn create_request(&self, request: Request) -> Result<Request, StoreError>;
    async fn get_request(&self, id: Uuid) -> Result<Request, StoreError>;
    async fn load_request_for_update(&self, id: Uuid) -> Result<(Request, RowGuard), StoreError>;
    /// Persists `request` in full, replacing its child collections
    /// wholesale (attachments/slots/products/messages) — the original
    /// system's `update()` clears and reinserts rather than diffing.
    async fn save_request(&self, guard: &mut RowGuard, request: &Request) -> Result<(), StoreError>;
    async fn list_requests_for_assignee(&self, assignee: Uuid) -> Result<Vec<Request>, StoreError>;

    // =====================================================================
    // EmailTemplate
    // =====================================================================
    /// Deduplicating put: returns the existing row if an identical
    /// `template` text is already stored.
    async fn put_email_template(
        &self,
        name: String,
        template: String,
    ) -> Result<EmailTemplate, StoreError>;
    async fn get_email_template(&self, id: Uuid) -> Result<EmailTemplate, StoreError>;
}
