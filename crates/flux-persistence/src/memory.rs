//! In-memory `Store`, used by the crate's own tests and by
//! flux-engine/-coordinator/-requests test suites.
//!
//! Grounded on `durable::persistence::memory::InMemoryWorkflowEventStore`
//! (parking_lot-guarded maps as the default test backend), with row
//! locking modeled explicitly via a `tokio::sync::Mutex<()>` per id so
//! concurrent `load_*_for_update` calls serialize the same way
//! `SELECT ... FOR UPDATE` would, using a locked-until-dropped guard type.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::entities::*;
use crate::error::{EntityKind, StoreError};
use crate::store::{RowGuard, Store};

fn locked(guard: &RowGuard) -> bool {
    matches!(guard, RowGuard::Memory(_))
}

/// A row-keyed mutex registry, lazily populated, shared by every entity
/// table below.
#[derive(Default)]
struct LockTable(DashMap<Uuid, Arc<AsyncMutex<()>>>);

impl LockTable {
    async fn acquire(&self, id: Uuid) -> RowGuard {
        let mutex = self.0.entry(id).or_default().clone();
        RowGuard::Memory(mutex.lock_owned().await)
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    workflows: RwLock<HashMap<Uuid, Workflow>>,
    runs: RwLock<HashMap<Uuid, Run>>,
    executions: RwLock<HashMap<Uuid, WorkflowExecution>>,
    operations: RwLock<HashMap<String, Operation>>,
    requests: RwLock<HashMap<Uuid, Request>>,
    email_templates: RwLock<HashMap<Uuid, EmailTemplate>>,

    run_locks: LockTable,
    execution_locks: LockTable,
    request_locks: LockTable,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_workflow(&self, workflow: Workflow) -> Result<Workflow, StoreError> {
        let mut workflows = self.workflows.write();
        if workflows.values().any(|w| w.name == workflow.name) {
            return Err(StoreError::Duplicate {
                kind: EntityKind::Workflow,
                id: workflow.name.clone(),
            });
        }
        workflows.insert(workflow.id, workflow.clone());
        Ok(workflow)
    }

    async fn get_workflow(&self, id: Uuid) -> Result<Workflow, StoreError> {
        self.workflows
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(EntityKind::Workflow, id))
    }

    async fn get_workflow_by_name(&self, name: &str) -> Result<Workflow, StoreError> {
        self.workflows
            .read()
            .values()
            .find(|w| w.name == name)
            .cloned()
            .ok_or_else(|| StoreError::not_found(EntityKind::Workflow, name))
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>, StoreError> {
        Ok(self.workflows.read().values().cloned().collect())
    }

    async fn update_workflow(&self, workflow: Workflow) -> Result<Workflow, StoreError> {
        let mut workflows = self.workflows.write();
        if !workflows.contains_key(&workflow.id) {
            return Err(StoreError::not_found(EntityKind::Workflow, workflow.id));
        }
        workflows.insert(workflow.id, workflow.clone());
        Ok(workflow)
    }

    async fn delete_workflow(&self, id: Uuid) -> Result<(), StoreError> {
        self.workflows
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(EntityKind::Workflow, id))
    }

    async fn has_active_runs(&self, workflow_id: Uuid) -> Result<bool, StoreError> {
        Ok(self
            .runs
            .read()
            .values()
            .any(|r| r.workflow_id == workflow_id && r.is_active()))
    }

    async fn create_run(&self, run: Run) -> Result<Run, StoreError> {
        let mut runs = self.runs.write();
        if runs.values().any(|r| r.name == run.name) {
            return Err(StoreError::Duplicate {
                kind: EntityKind::Run,
                id: run.name.clone(),
            });
        }
        runs.insert(run.id, run.clone());
        Ok(run)
    }

    async fn get_run(&self, id: Uuid) -> Result<Run, StoreError> {
        self.runs
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(EntityKind::Run, id))
    }

    async fn get_run_by_name(&self, name: &str) -> Result<Run, StoreError> {
        self.runs
            .read()
            .values()
            .find(|r| r.name == name)
            .cloned()
            .ok_or_else(|| StoreError::not_found(EntityKind::Run, name))
    }

    async fn list_runs_for_workflow(&self, workflow_id: Uuid) -> Result<Vec<Run>, StoreError> {
        Ok(self
            .runs
            .read()
            .values()
            .filter(|r| r.workflow_id == workflow_id)
            .cloned()
            .collect())
    }

    async fn load_run_for_update(&self, id: Uuid) -> Result<(Run, RowGuard), StoreError> {
        let guard = self.run_locks.acquire(id).await;
        let run = self
            .runs
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(EntityKind::Run, id))?;
        Ok((run, guard))
    }

    async fn save_run(&self, guard: &mut RowGuard, run: &Run) -> Result<(), StoreError> {
        debug_assert!(locked(guard));
        self.runs.write().insert(run.id, run.clone());
        Ok(())
    }

    async fn allocate_execution_id(
        &self,
        guard: &mut RowGuard,
        run_id: Uuid,
    ) -> Result<i64, StoreError> {
        debug_assert!(locked(guard));
        let count = self
            .executions
            .read()
            .values()
            .filter(|e| e.run_id == run_id)
            .count();
        Ok(count as i64 + 1)
    }

    async fn create_execution(
        &self,
        execution: WorkflowExecution,
    ) -> Result<WorkflowExecution, StoreError> {
        self.executions
            .write()
            .insert(execution.id, execution.clone());
        Ok(execution)
    }

    async fn get_execution(&self, id: Uuid) -> Result<WorkflowExecution, StoreError> {
        self.executions
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(EntityKind::WorkflowExecution, id))
    }

    async fn load_execution_for_update(
        &self,
        id: Uuid,
    ) -> Result<(WorkflowExecution, RowGuard), StoreError> {
        let guard = self.execution_locks.acquire(id).await;
        let execution = self
            .executions
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(EntityKind::WorkflowExecution, id))?;
        Ok((execution, guard))
    }

    async fn save_execution(
        &self,
        guard: &mut RowGuard,
        execution: &WorkflowExecution,
    ) -> Result<(), StoreError> {
        debug_assert!(locked(guard));
        self.executions
            .write()
            .insert(execution.id, execution.clone());
        Ok(())
    }

    async fn list_executions_for_run(
        &self,
        run_id: Uuid,
    ) -> Result<Vec<WorkflowExecution>, StoreError> {
        let mut list: Vec<_> = self
            .executions
            .read()
            .values()
            .filter(|e| e.run_id == run_id)
            .cloned()
            .collect();
        list.sort_by_key(|e| e.execution_id);
        Ok(list)
    }

    async fn put_operation(&self, operation: Operation) -> Result<Operation, StoreError> {
        self.operations
            .write()
            .insert(operation.id.clone(), operation.clone());
        Ok(operation)
    }

    async fn get_operation(&self, id: &str) -> Result<Operation, StoreError> {
        self.operations
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(EntityKind::Operation, id))
    }

    async fn list_operations(&self) -> Result<Vec<Operation>, StoreError> {
        Ok(self.operations.read().values().cloned().collect())
    }

    async fn create_request(&self, request: Request) -> Result<Request, StoreError> {
        let mut requests = self.requests.write();
        if requests.values().any(|r| r.name == request.name) {
            return Err(StoreError::Duplicate {
                kind: EntityKind::Request,
                id: request.name.clone(),
            });
        }
        requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn get_request(&self, id: Uuid) -> Result<Request, StoreError> {
        self.requests
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(EntityKind::Request, id))
    }

    async fn load_request_for_update(&self, id: Uuid) -> Result<(Request, RowGuard), StoreError> {
        let guard = self.request_locks.acquire(id).await;
        let request = self
            .requests
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(EntityKind::Request, id))?;
        Ok((request, guard))
    }

    async fn save_request(
        &self,
        guard: &mut RowGuard,
        request: &Request,
    ) -> Result<(), StoreError> {
        debug_assert!(locked(guard));
        self.requests.write().insert(request.id, request.clone());
        Ok(())
    }

    async fn list_requests_for_assignee(&self, assignee: Uuid) -> Result<Vec<Request>, StoreError> {
        Ok(self
            .requests
            .read()
            .values()
            .filter(|r| r.assignee == Some(assignee))
            .cloned()
            .collect())
    }

    async fn put_email_template(
        &self,
        name: String,
        template: String,
    ) -> Result<EmailTemplate, StoreError> {
        let mut templates = self.email_templates.write();
        if let Some(existing) = templates.values().find(|t| t.template == template) {
            return Ok(existing.clone());
        }
        let row = EmailTemplate {
            id: Uuid::now_v7(),
            name,
            template,
        };
        templates.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_email_template(&self, id: Uuid) -> Result<EmailTemplate, StoreError> {
        self.email_templates
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(EntityKind::EmailTemplate, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_run(name: &str) -> Run {
        Run {
            id: Uuid::now_v7(),
            workflow_id: Uuid::now_v7(),
            name: name.to_string(),
            status: RunStatus::Pending,
            parameters: json!({}),
            started: None,
            ended: None,
            products: Default::default(),
        }
    }

    #[tokio::test]
    async fn load_for_update_serializes_concurrent_callers() {
        let store = Arc::new(InMemoryStore::new());
        let run = store.create_run(sample_run("r1")).await.unwrap();

        let store_a = store.clone();
        let id = run.id;
        let handle = tokio::spawn(async move {
            let (mut run, mut guard) = store_a.load_run_for_update(id).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            run.status = RunStatus::Active;
            store_a.save_run(&mut guard, &run).await.unwrap();
            guard.commit().await.unwrap();
        });

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let (run_b, guard_b) = store.load_run_for_update(id).await.unwrap();
        // By the time the second caller gets the lock, the first writer's
        // update must already be visible.
        assert_eq!(run_b.status, RunStatus::Active);
        guard_b.commit().await.unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn execution_id_allocation_is_monotonic_under_lock() {
        let store = Arc::new(InMemoryStore::new());
        let run = store.create_run(sample_run("r2")).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = store.clone();
            let run_id = run.id;
            handles.push(tokio::spawn(async move {
                let (_run, mut guard) = store.load_run_for_update(run_id).await.unwrap();
                let id = store.allocate_execution_id(&mut guard, run_id).await.unwrap();
                store
                    .create_execution(WorkflowExecution {
                        id: Uuid::now_v7(),
                        run_id,
                        execution_id: id,
                        ancestor_id: None,
                        step: "s".to_string(),
                        name: None,
                        status: RunStatus::Active,
                        outcome: None,
                        started: None,
                        ended: None,
                        parameters: json!({}),
                    })
                    .await
                    .unwrap();
                guard.commit().await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let mut ids: Vec<i64> = store
            .list_executions_for_run(run.id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.execution_id)
            .collect();
        ids.sort();
        assert_eq!(ids, (1..=10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn email_template_put_is_idempotent_on_identical_text() {
        let store = InMemoryStore::new();
        let a = store
            .put_email_template("init".to_string(), "hello ${x}".to_string())
            .await
            .unwrap();
        let b = store
            .put_email_template("init-v2".to_string(), "hello ${x}".to_string())
            .await
            .unwrap();
        assert_eq!(a.id, b.id);
    }
}
