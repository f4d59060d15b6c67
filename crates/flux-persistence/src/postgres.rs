//! PostgreSQL `Store` implementation.
//!
//! Grounded on `durable::persistence::postgres::PostgresWorkflowEventStore`:
//! plain `sqlx::query` (not the compile-time-checked macro, since this
//! workspace is built without a live database), manual `Row` extraction,
//! `#[instrument]` on every entry point. Row locking follows the same
//! `SELECT ... FOR UPDATE` + held-transaction pattern
//! `append_events` uses for optimistic-then-pessimistic writes, generalized
//! here to genuinely pessimistic locks held across the caller's
//! read-modify-write.

use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use crate::entities::*;
use crate::error::{EntityKind, StoreError};
use crate::store::{RowGuard, Store};

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn row_to_workflow(row: &sqlx::postgres::PgRow) -> Result<Workflow, StoreError> {
    let kind: String = row.try_get("kind").map_err(|e| StoreError::Database(e.to_string()))?;
    Ok(Workflow {
        id: row.try_get("id").map_err(|e| StoreError::Database(e.to_string()))?,
        name: row.try_get("name").map_err(|e| StoreError::Database(e.to_string()))?,
        designation: row
            .try_get("designation")
            .map_err(|e| StoreError::Database(e.to_string()))?,
        is_service: row
            .try_get("is_service")
            .map_err(|e| StoreError::Database(e.to_string()))?,
        kind: if kind == "yaml" {
            WorkflowKind::Yaml
        } else {
            WorkflowKind::Plugin
        },
        specification: row
            .try_get("specification")
            .map_err(|e| StoreError::Database(e.to_string()))?,
        modified: row
            .try_get("modified")
            .map_err(|e| StoreError::Database(e.to_string()))?,
    })
}

fn run_status_str(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Pending => "pending",
        RunStatus::Prepared => "prepared",
        RunStatus::Active => "active",
        RunStatus::Waiting => "waiting",
        RunStatus::Suspended => "suspended",
        RunStatus::Aborting => "aborting",
        RunStatus::Aborted => "aborted",
        RunStatus::Completed => "completed",
        RunStatus::Failed => "failed",
        RunStatus::Timedout => "timedout",
        RunStatus::Invalidated => "invalidated",
    }
}

fn parse_run_status(s: &str) -> RunStatus {
    match s {
        "pending" => RunStatus::Pending,
        "prepared" => RunStatus::Prepared,
        "active" => RunStatus::Active,
        "waiting" => RunStatus::Waiting,
        "suspended" => RunStatus::Suspended,
        "aborting" => RunStatus::Aborting,
        "aborted" => RunStatus::Aborted,
        "completed" => RunStatus::Completed,
        "failed" => RunStatus::Failed,
        "timedout" => RunStatus::Timedout,
        _ => RunStatus::Invalidated,
    }
}

fn row_to_run(row: &sqlx::postgres::PgRow) -> Result<Run, StoreError> {
    let status: String = row.try_get("status").map_err(|e| StoreError::Database(e.to_string()))?;
    let products: serde_json::Value = row
        .try_get("products")
        .map_err(|e| StoreError::Database(e.to_string()))?;
    Ok(Run {
        id: row.try_get("id").map_err(|e| StoreError::Database(e.to_string()))?,
        workflow_id: row
            .try_get("workflow_id")
            .map_err(|e| StoreError::Database(e.to_string()))?,
        name: row.try_get("name").map_err(|e| StoreError::Database(e.to_string()))?,
        status: parse_run_status(&status),
        parameters: row
            .try_get("parameters")
            .map_err(|e| StoreError::Database(e.to_string()))?,
        started: row.try_get("started").map_err(|e| StoreError::Database(e.to_string()))?,
        ended: row.try_get("ended").map_err(|e| StoreError::Database(e.to_string()))?,
        products: serde_json::from_value(products).unwrap_or_default(),
    })
}

fn row_to_execution(row: &sqlx::postgres::PgRow) -> Result<WorkflowExecution, StoreError> {
    let status: String = row.try_get("status").map_err(|e| StoreError::Database(e.to_string()))?;
    Ok(WorkflowExecution {
        id: row.try_get("id").map_err(|e| StoreError::Database(e.to_string()))?,
        run_id: row.try_get("run_id").map_err(|e| StoreError::Database(e.to_string()))?,
        execution_id: row
            .try_get("execution_id")
            .map_err(|e| StoreError::Database(e.to_string()))?,
        ancestor_id: row
            .try_get("ancestor_id")
            .map_err(|e| StoreError::Database(e.to_string()))?,
        step: row.try_get("step").map_err(|e| StoreError::Database(e.to_string()))?,
        name: row.try_get("name").map_err(|e| StoreError::Database(e.to_string()))?,
        status: parse_run_status(&status),
        outcome: row.try_get("outcome").map_err(|e| StoreError::Database(e.to_string()))?,
        started: row.try_get("started").map_err(|e| StoreError::Database(e.to_string()))?,
        ended: row.try_get("ended").map_err(|e| StoreError::Database(e.to_string()))?,
        parameters: row
            .try_get("parameters")
            .map_err(|e| StoreError::Database(e.to_string()))?,
    })
}

fn row_to_operation(row: &sqlx::postgres::PgRow) -> Result<Operation, StoreError> {
    let phase: String = row.try_get("phase").map_err(|e| StoreError::Database(e.to_string()))?;
    let input_schema: serde_json::Value = row
        .try_get("input_schema")
        .map_err(|e| StoreError::Database(e.to_string()))?;
    let outcomes: serde_json::Value = row
        .try_get("outcomes")
        .map_err(|e| StoreError::Database(e.to_string()))?;
    Ok(Operation {
        id: row.try_get("id").map_err(|e| StoreError::Database(e.to_string()))?,
        name: row.try_get("name").map_err(|e| StoreError::Database(e.to_string()))?,
        phase: match phase.as_str() {
            "preoperation" => OperationPhase::Preoperation,
            "postoperation" => OperationPhase::Postoperation,
            "prerun" => OperationPhase::Prerun,
            "postrun" => OperationPhase::Postrun,
            _ => OperationPhase::Operation,
        },
        description: row
            .try_get("description")
            .map_err(|e| StoreError::Database(e.to_string()))?,
        input_schema: serde_json::from_value(input_schema)
            .map_err(|e| StoreError::Database(e.to_string()))?,
        parameters: row
            .try_get("parameters")
            .map_err(|e| StoreError::Database(e.to_string()))?,
        outcomes: serde_json::from_value(outcomes).unwrap_or_default(),
    })
}

fn request_status_str(status: RequestStatus) -> &'static str {
    match status {
        RequestStatus::Prepared => "prepared",
        RequestStatus::Pending => "pending",
        RequestStatus::Claimed => "claimed",
        RequestStatus::Completed => "completed",
        RequestStatus::Canceled => "canceled",
        RequestStatus::Declined => "declined",
        RequestStatus::Failed => "failed",
        RequestStatus::Reopened => "reopened",
        RequestStatus::Done => "done",
    }
}

fn parse_request_status(s: &str) -> RequestStatus {
    match s {
        "prepared" => RequestStatus::Prepared,
        "pending" => RequestStatus::Pending,
        "claimed" => RequestStatus::Claimed,
        "completed" => RequestStatus::Completed,
        "canceled" => RequestStatus::Canceled,
        "declined" => RequestStatus::Declined,
        "failed" => RequestStatus::Failed,
        "reopened" => RequestStatus::Reopened,
        _ => RequestStatus::Done,
    }
}

fn row_to_request(row: &sqlx::postgres::PgRow) -> Result<Request, StoreError> {
    let status: String = row.try_get("status").map_err(|e| StoreError::Database(e.to_string()))?;
    let slot_order: Option<serde_json::Value> = row
        .try_get("slot_order")
        .map_err(|e| StoreError::Database(e.to_string()))?;
    let attachments: serde_json::Value = row
        .try_get("attachments")
        .map_err(|e| StoreError::Database(e.to_string()))?;
    let slots: serde_json::Value = row.try_get("slots").map_err(|e| StoreError::Database(e.to_string()))?;
    let products: serde_json::Value = row
        .try_get("products")
        .map_err(|e| StoreError::Database(e.to_string()))?;
    let messages: serde_json::Value = row
        .try_get("messages")
        .map_err(|e| StoreError::Database(e.to_string()))?;
    Ok(Request {
        id: row.try_get("id").map_err(|e| StoreError::Database(e.to_string()))?,
        name: row.try_get("name").map_err(|e| StoreError::Database(e.to_string()))?,
        status: parse_request_status(&status),
        originator: row
            .try_get("originator")
            .map_err(|e| StoreError::Database(e.to_string()))?,
        assignee: row.try_get("assignee").map_err(|e| StoreError::Database(e.to_string()))?,
        creator: row.try_get("creator").map_err(|e| StoreError::Database(e.to_string()))?,
        template_id: row
            .try_get("template_id")
            .map_err(|e| StoreError::Database(e.to_string()))?,
        slot_order: slot_order.and_then(|v| serde_json::from_value(v).ok()),
        claimed: row.try_get("claimed").map_err(|e| StoreError::Database(e.to_string()))?,
        completed: row.try_get("completed").map_err(|e| StoreError::Database(e.to_string()))?,
        attachments: serde_json::from_value(attachments).unwrap_or_default(),
        slots: serde_json::from_value(slots).unwrap_or_default(),
        products: serde_json::from_value(products).unwrap_or_default(),
        messages: serde_json::from_value(messages).unwrap_or_default(),
    })
}

#[async_trait::async_trait]
impl Store for PostgresStore {
    #[instrument(skip(self, workflow))]
    async fn create_workflow(&self, workflow: Workflow) -> Result<Workflow, StoreError> {
        let kind = if workflow.kind == WorkflowKind::Yaml { "yaml" } else { "plugin" };
        sqlx::query(
            r#"
            INSERT INTO flux_workflow (id, name, designation, is_service, kind, specification, modified)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(workflow.id)
        .bind(&workflow.name)
        .bind(&workflow.designation)
        .bind(workflow.is_service)
        .bind(kind)
        .bind(&workflow.specification)
        .bind(workflow.modified)
        .execute(&self.pool)
        .await?;
        Ok(workflow)
    }

    #[instrument(skip(self))]
    async fn get_workflow(&self, id: Uuid) -> Result<Workflow, StoreError> {
        let row = sqlx::query("SELECT * FROM flux_workflow WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found(EntityKind::Workflow, id))?;
        row_to_workflow(&row)
    }

    #[instrument(skip(self))]
    async fn get_workflow_by_name(&self, name: &str) -> Result<Workflow, StoreError> {
        let row = sqlx::query("SELECT * FROM flux_workflow WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found(EntityKind::Workflow, name))?;
        row_to_workflow(&row)
    }

    #[instrument(skip(self))]
    async fn list_workflows(&self) -> Result<Vec<Workflow>, StoreError> {
        let rows = sqlx::query("SELECT * FROM flux_workflow ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_workflow).collect()
    }

    #[instrument(skip(self, workflow))]
    async fn update_workflow(&self, workflow: Workflow) -> Result<Workflow, StoreError> {
        let kind = if workflow.kind == WorkflowKind::Yaml { "yaml" } else { "plugin" };
        let result = sqlx::query(
            r#"
            UPDATE flux_workflow
            SET name = $2, designation = $3, is_service = $4, kind = $5,
                specification = $6, modified = $7
            WHERE id = $1
            "#,
        )
        .bind(workflow.id)
        .bind(&workflow.name)
        .bind(&workflow.designation)
        .bind(workflow.is_service)
        .bind(kind)
        .bind(&workflow.specification)
        .bind(workflow.modified)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(EntityKind::Workflow, workflow.id));
        }
        Ok(workflow)
    }

    #[instrument(skip(self))]
    async fn delete_workflow(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM flux_workflow WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(EntityKind::Workflow, id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn has_active_runs(&self, workflow_id: Uuid) -> Result<bool, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM flux_run
                WHERE workflow_id = $1
                  AND status NOT IN ('aborted', 'completed', 'failed', 'timedout', 'invalidated')
            ) AS present
            "#,
        )
        .bind(workflow_id)
        .fetch_one(&self.pool)
        .await?;
        row.try_get("present").map_err(|e| StoreError::Database(e.to_string()))
    }

    #[instrument(skip(self, run))]
    async fn create_run(&self, run: Run) -> Result<Run, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO flux_run (id, workflow_id, name, status, parameters, started, ended, products)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(run.id)
        .bind(run.workflow_id)
        .bind(&run.name)
        .bind(run_status_str(run.status))
        .bind(&run.parameters)
        .bind(run.started)
        .bind(run.ended)
        .bind(serde_json::to_value(&run.products).unwrap_or_default())
        .execute(&self.pool)
        .await?;
        Ok(run)
    }

    #[instrument(skip(self))]
    async fn get_run(&self, id: Uuid) -> Result<Run, StoreError> {
        let row = sqlx::query("SELECT * FROM flux_run WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found(EntityKind::Run, id))?;
        row_to_run(&row)
    }

    #[instrument(skip(self))]
    async fn get_run_by_name(&self, name: &str) -> Result<Run, StoreError> {
        let row = sqlx::query("SELECT * FROM flux_run WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found(EntityKind::Run, name))?;
        row_to_run(&row)
    }

    #[instrument(skip(self))]
    async fn list_runs_for_workflow(&self, workflow_id: Uuid) -> Result<Vec<Run>, StoreError> {
        let rows = sqlx::query("SELECT * FROM flux_run WHERE workflow_id = $1 ORDER BY started")
            .bind(workflow_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_run).collect()
    }

    #[instrument(skip(self))]
    async fn load_run_for_update(&self, id: Uuid) -> Result<(Run, RowGuard), StoreError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT * FROM flux_run WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::not_found(EntityKind::Run, id))?;
        let run = row_to_run(&row)?;
        Ok((run, RowGuard::Postgres(tx)))
    }

    #[instrument(skip(self, guard, run))]
    async fn save_run(&self, guard: &mut RowGuard, run: &Run) -> Result<(), StoreError> {
        let RowGuard::Postgres(tx) = guard else {
            return Err(StoreError::Database("save_run called without a postgres guard".into()));
        };
        sqlx::query(
            r#"
            UPDATE flux_run
            SET status = $2, parameters = $3, started = $4, ended = $5, products = $6
            WHERE id = $1
            "#,
        )
        .bind(run.id)
        .bind(run_status_str(run.status))
        .bind(&run.parameters)
        .bind(run.started)
        .bind(run.ended)
        .bind(serde_json::to_value(&run.products).unwrap_or_default())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    #[instrument(skip(self, guard))]
    async fn allocate_execution_id(
        &self,
        guard: &mut RowGuard,
        run_id: Uuid,
    ) -> Result<i64, StoreError> {
        let RowGuard::Postgres(tx) = guard else {
            return Err(StoreError::Database(
                "allocate_execution_id called without a postgres guard".into(),
            ));
        };
        let row = sqlx::query("SELECT COUNT(*) AS n FROM flux_execution WHERE run_id = $1")
            .bind(run_id)
            .fetch_one(&mut **tx)
            .await?;
        let count: i64 = row.try_get("n").map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(count + 1)
    }

    #[instrument(skip(self, execution))]
    async fn create_execution(
        &self,
        execution: WorkflowExecution,
    ) -> Result<WorkflowExecution, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO flux_execution
                (id, run_id, execution_id, ancestor_id, step, name, status, outcome, started, ended, parameters)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(execution.id)
        .bind(execution.run_id)
        .bind(execution.execution_id)
        .bind(execution.ancestor_id)
        .bind(&execution.step)
        .bind(&execution.name)
        .bind(run_status_str(execution.status))
        .bind(&execution.outcome)
        .bind(execution.started)
        .bind(execution.ended)
        .bind(&execution.parameters)
        .execute(&self.pool)
        .await?;
        Ok(execution)
    }

    #[instrument(skip(self))]
    async fn get_execution(&self, id: Uuid) -> Result<WorkflowExecution, StoreError> {
        let row = sqlx::query("SELECT * FROM flux_execution WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found(EntityKind::WorkflowExecution, id))?;
        row_to_execution(&row)
    }

    #[instrument(skip(self))]
    async fn load_execution_for_update(
        &self,
        id: Uuid,
    ) -> Result<(WorkflowExecution, RowGuard), StoreError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT * FROM flux_execution WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::not_found(EntityKind::WorkflowExecution, id))?;
        let execution = row_to_execution(&row)?;
        Ok((execution, RowGuard::Postgres(tx)))
    }

    #[instrument(skip(self, guard, execution))]
    async fn save_execution(
        &self,
        guard: &mut RowGuard,
        execution: &WorkflowExecution,
    ) -> Result<(), StoreError> {
        let RowGuard::Postgres(tx) = guard else {
            return Err(StoreError::Database("save_execution called without a postgres guard".into()));
        };
        sqlx::query(
            r#"
            UPDATE flux_execution
            SET status = $2, outcome = $3, started = $4, ended = $5, parameters = $6
            WHERE id = $1
            "#,
        )
        .bind(execution.id)
        .bind(run_status_str(execution.status))
        .bind(&execution.outcome)
        .bind(execution.started)
        .bind(execution.ended)
        .bind(&execution.parameters)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_executions_for_run(
        &self,
        run_id: Uuid,
    ) -> Result<Vec<WorkflowExecution>, StoreError> {
        let rows = sqlx::query("SELECT * FROM flux_execution WHERE run_id = $1 ORDER BY execution_id")
            .bind(run_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_execution).collect()
    }

    #[instrument(skip(self, operation))]
    async fn put_operation(&self, operation: Operation) -> Result<Operation, StoreError> {
        let phase = match operation.phase {
            OperationPhase::Preoperation => "preoperation",
            OperationPhase::Operation => "operation",
            OperationPhase::Postoperation => "postoperation",
            OperationPhase::Prerun => "prerun",
            OperationPhase::Postrun => "postrun",
        };
        sqlx::query(
            r#"
            INSERT INTO flux_operation (id, name, phase, description, input_schema, parameters, outcomes)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name, phase = EXCLUDED.phase, description = EXCLUDED.description,
                input_schema = EXCLUDED.input_schema, parameters = EXCLUDED.parameters,
                outcomes = EXCLUDED.outcomes
            "#,
        )
        .bind(&operation.id)
        .bind(&operation.name)
        .bind(phase)
        .bind(&operation.description)
        .bind(serde_json::to_value(&operation.input_schema).unwrap_or_default())
        .bind(&operation.parameters)
        .bind(serde_json::to_value(&operation.outcomes).unwrap_or_default())
        .execute(&self.pool)
        .await?;
        Ok(operation)
    }

    #[instrument(skip(self))]
    async fn get_operation(&self, id: &str) -> Result<Operation, StoreError> {
        let row = sqlx::query("SELECT * FROM flux_operation WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found(EntityKind::Operation, id))?;
        row_to_operation(&row)
    }

    #[instrument(skip(self))]
    async fn list_operations(&self) -> Result<Vec<Operation>, StoreError> {
        let rows = sqlx::query("SELECT * FROM flux_operation ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_operation).collect()
    }

    #[instrument(skip(self, request))]
    async fn create_request(&self, request: Request) -> Result<Request, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO flux_request
                (id, name, status, originator, assignee, creator, template_id, slot_order,
                 claimed, completed, attachments, slots, products, messages)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(request.id)
        .bind(&request.name)
        .bind(request_status_str(request.status))
        .bind(request.originator)
        .bind(request.assignee)
        .bind(request.creator)
        .bind(request.template_id)
        .bind(serde_json::to_value(&request.slot_order).unwrap_or_default())
        .bind(request.claimed)
        .bind(request.completed)
        .bind(serde_json::to_value(&request.attachments).unwrap_or_default())
        .bind(serde_json::to_value(&request.slots).unwrap_or_default())
        .bind(serde_json::to_value(&request.products).unwrap_or_default())
        .bind(serde_json::to_value(&request.messages).unwrap_or_default())
        .execute(&self.pool)
        .await?;
        Ok(request)
    }

    #[instrument(skip(self))]
    async fn get_request(&self, id: Uuid) -> Result<Request, StoreError> {
        let row = sqlx::query("SELECT * FROM flux_request WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found(EntityKind::Request, id))?;
        row_to_request(&row)
    }

    #[instrument(skip(self))]
    async fn load_request_for_update(&self, id: Uuid) -> Result<(Request, RowGuard), StoreError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT * FROM flux_request WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::not_found(EntityKind::Request, id))?;
        let request = row_to_request(&row)?;
        Ok((request, RowGuard::Postgres(tx)))
    }

    #[instrument(skip(self, guard, request))]
    async fn save_request(&self, guard: &mut RowGuard, request: &Request) -> Result<(), StoreError> {
        let RowGuard::Postgres(tx) = guard else {
            return Err(StoreError::Database("save_request called without a postgres guard".into()));
        };
        sqlx::query(
            r#"
            UPDATE flux_request
            SET status = $2, assignee = $3, slot_order = $4, claimed = $5, completed = $6,
                attachments = $7, slots = $8, products = $9, messages = $10
            WHERE id = $1
            "#,
        )
        .bind(request.id)
        .bind(request_status_str(request.status))
        .bind(request.assignee)
        .bind(serde_json::to_value(&request.slot_order).unwrap_or_default())
        .bind(request.claimed)
        .bind(request.completed)
        .bind(serde_json::to_value(&request.attachments).unwrap_or_default())
        .bind(serde_json::to_value(&request.slots).unwrap_or_default())
        .bind(serde_json::to_value(&request.products).unwrap_or_default())
        .bind(serde_json::to_value(&request.messages).unwrap_or_default())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_requests_for_assignee(&self, assignee: Uuid) -> Result<Vec<Request>, StoreError> {
        let rows = sqlx::query("SELECT * FROM flux_request WHERE assignee = $1")
            .bind(assignee)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_request).collect()
    }

    #[instrument(skip(self, template))]
    async fn put_email_template(
        &self,
        name: String,
        template: String,
    ) -> Result<EmailTemplate, StoreError> {
        if let Some(row) = sqlx::query("SELECT * FROM flux_email_template WHERE template = $1")
            .bind(&template)
            .fetch_optional(&self.pool)
            .await?
        {
            return Ok(EmailTemplate {
                id: row.try_get("id").map_err(|e| StoreError::Database(e.to_string()))?,
                name: row.try_get("name").map_err(|e| StoreError::Database(e.to_string()))?,
                template: row.try_get("template").map_err(|e| StoreError::Database(e.to_string()))?,
            });
        }
        let id = Uuid::now_v7();
        sqlx::query("INSERT INTO flux_email_template (id, name, template) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(&name)
            .bind(&template)
            .execute(&self.pool)
            .await?;
        Ok(EmailTemplate { id, name, template })
    }

    #[instrument(skip(self))]
    async fn get_email_template(&self, id: Uuid) -> Result<EmailTemplate, StoreError> {
        let row = sqlx::query("SELECT * FROM flux_email_template WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found(EntityKind::EmailTemplate, id))?;
        Ok(EmailTemplate {
            id: row.try_get("id").map_err(|e| StoreError::Database(e.to_string()))?,
            name: row.try_get("name").map_err(|e| StoreError::Database(e.to_string()))?,
            template: row.try_get("template").map_err(|e| StoreError::Database(e.to_string()))?,
        })
    }
}
