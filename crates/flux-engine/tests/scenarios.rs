//! End-to-end run scenarios against the in-memory store and a
//! `MockDispatcher`, matching `durable::engine::executor`'s own
//! fixture-once/exercise-across-several-tests module style.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use flux_dispatch::MockDispatcher;
use flux_engine::{CallbackStatus, Engine};
use flux_persistence::{
    InMemoryStore, Operation, OperationPhase, Outcome, OutcomeKind, Run, RunStatus, Store, Workflow, WorkflowKind,
};

fn engine(store: Arc<InMemoryStore>) -> Engine {
    Engine::new(store, Arc::new(MockDispatcher::new()), "https://flux.test")
}

fn operation(id: &str, outcomes: &[(&str, OutcomeKind)]) -> Operation {
    Operation {
        id: id.to_string(),
        name: id.to_string(),
        phase: OperationPhase::Operation,
        description: None,
        input_schema: flux_core::FieldKind::Field,
        parameters: json!({}),
        outcomes: outcomes
            .iter()
            .map(|(name, kind)| {
                (
                    name.to_string(),
                    Outcome {
                        name: name.to_string(),
                        kind: *kind,
                        description: None,
                        schema: None,
                    },
                )
            })
            .collect(),
    }
}

async fn setup_workflow(store: &InMemoryStore, yaml: &str) -> Workflow {
    store
        .create_workflow(Workflow {
            id: Uuid::now_v7(),
            name: format!("wf-{}", Uuid::now_v7()),
            designation: None,
            is_service: false,
            kind: WorkflowKind::Yaml,
            specification: Some(yaml.to_string()),
            modified: Utc::now(),
        })
        .await
        .unwrap()
}

async fn setup_run(store: &InMemoryStore, workflow_id: Uuid) -> Run {
    store
        .create_run(Run {
            id: Uuid::now_v7(),
            workflow_id,
            name: format!("run-{}", Uuid::now_v7()),
            status: RunStatus::Pending,
            parameters: json!({}),
            started: None,
            ended: None,
            products: BTreeMap::new(),
        })
        .await
        .unwrap()
}

async fn complete(engine: &Engine, store: &InMemoryStore, run_id: Uuid, step: &str, outcome: &str) -> Uuid {
    let executions = store.list_executions_for_run(run_id).await.unwrap();
    let execution = executions
        .into_iter()
        .filter(|e| e.step == step && e.status == RunStatus::Active)
        .max_by_key(|e| e.execution_id)
        .unwrap();
    engine
        .process_step(
            execution.id,
            CallbackStatus::Completed,
            json!({"status": "valid", "outcome": outcome}),
        )
        .await
        .unwrap();
    execution.id
}

#[tokio::test]
async fn single_step_success() {
    let store = Arc::new(InMemoryStore::new());
    store.put_operation(operation("test-op", &[("completed", OutcomeKind::Success)])).await.unwrap();
    let workflow = setup_workflow(&store, "name: demo\nentry: s0\nsteps:\n  s0:\n    operation: test-op\n").await;
    let run = setup_run(&store, workflow.id).await;
    let engine = engine(store.clone());

    engine.initiate_step(run.id, "s0", None, None, None).await.unwrap();
    complete(&engine, &store, run.id, "s0", "completed").await;

    let run = store.get_run(run.id).await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);

    let executions = store.list_executions_for_run(run.id).await.unwrap();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].execution_id, 1);
    assert_eq!(executions[0].ancestor_id, None);
    assert_eq!(executions[0].status, RunStatus::Completed);
}

#[tokio::test]
async fn three_step_chain() {
    let store = Arc::new(InMemoryStore::new());
    store.put_operation(operation("test-op", &[("completed", OutcomeKind::Success)])).await.unwrap();
    let yaml = r#"
name: demo
entry: s0
steps:
  s0:
    operation: test-op
    postoperation:
      - actions:
          - action: execute-step
            step: s1
  s1:
    operation: test-op
    postoperation:
      - actions:
          - action: execute-step
            step: s2
  s2:
    operation: test-op
"#;
    let workflow = setup_workflow(&store, yaml).await;
    let run = setup_run(&store, workflow.id).await;
    let engine = engine(store.clone());

    engine.initiate_step(run.id, "s0", None, None, None).await.unwrap();
    complete(&engine, &store, run.id, "s0", "completed").await;
    complete(&engine, &store, run.id, "s1", "completed").await;
    complete(&engine, &store, run.id, "s2", "completed").await;

    let run = store.get_run(run.id).await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);

    let mut executions = store.list_executions_for_run(run.id).await.unwrap();
    executions.sort_by_key(|e| e.execution_id);
    assert_eq!(executions.len(), 3);
    assert_eq!(executions.iter().map(|e| e.execution_id).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(executions[1].ancestor_id, Some(executions[0].id));
    assert_eq!(executions[2].ancestor_id, Some(executions[1].id));
}

#[tokio::test]
async fn failure_without_ignore_stops_the_chain() {
    let store = Arc::new(InMemoryStore::new());
    store
        .put_operation(operation(
            "test-op",
            &[("completed", OutcomeKind::Success), ("failed", OutcomeKind::Failure)],
        ))
        .await
        .unwrap();
    let yaml = r#"
name: demo
entry: s0
steps:
  s0:
    operation: test-op
    postoperation:
      - actions:
          - action: execute-step
            step: s1
  s1:
    operation: test-op
"#;
    let workflow = setup_workflow(&store, yaml).await;
    let run = setup_run(&store, workflow.id).await;
    let engine = engine(store.clone());

    engine.initiate_step(run.id, "s0", None, None, None).await.unwrap();
    complete(&engine, &store, run.id, "s0", "failed").await;

    let run = store.get_run(run.id).await.unwrap();
    assert_eq!(run.status, RunStatus::Failed);

    let executions = store.list_executions_for_run(run.id).await.unwrap();
    assert_eq!(executions.len(), 1, "s1 must never have been created");
}

#[tokio::test]
async fn ignore_step_failure_clears_failure_before_the_child_launch() {
    let store = Arc::new(InMemoryStore::new());
    store
        .put_operation(operation(
            "test-op",
            &[("completed", OutcomeKind::Success), ("failed", OutcomeKind::Failure)],
        ))
        .await
        .unwrap();
    let yaml = r#"
name: demo
entry: s0
steps:
  s0:
    operation: test-op
    postoperation:
      - actions:
          - action: ignore-step-failure
          - action: execute-step
            step: s1
  s1:
    operation: test-op
"#;
    let workflow = setup_workflow(&store, yaml).await;
    let run = setup_run(&store, workflow.id).await;
    let engine = engine(store.clone());

    engine.initiate_step(run.id, "s0", None, None, None).await.unwrap();
    complete(&engine, &store, run.id, "s0", "failed").await;
    complete(&engine, &store, run.id, "s1", "completed").await;

    let run = store.get_run(run.id).await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);
}

#[tokio::test]
async fn abort_during_execution_settles_as_aborted() {
    let store = Arc::new(InMemoryStore::new());
    store.put_operation(operation("test-op", &[("completed", OutcomeKind::Success)])).await.unwrap();
    let yaml = r#"
name: demo
entry: s0
steps:
  s0:
    operation: test-op
    postoperation:
      - actions:
          - action: execute-step
            step: s1
  s1:
    operation: test-op
"#;
    let workflow = setup_workflow(&store, yaml).await;
    let mut run = setup_run(&store, workflow.id).await;
    run.status = RunStatus::Active;
    {
        let (_r, mut guard) = store.load_run_for_update(run.id).await.unwrap();
        store.save_run(&mut guard, &run).await.unwrap();
        guard.commit().await.unwrap();
    }
    let engine = engine(store.clone());

    engine.initiate_step(run.id, "s0", None, None, None).await.unwrap();
    complete(&engine, &store, run.id, "s0", "completed").await;

    let effects = engine.abort_request(run.id).await.unwrap();
    assert_eq!(effects.len(), 1, "abort-executions task must be enqueued");

    let aborting = store.get_run(run.id).await.unwrap();
    assert_eq!(aborting.status, RunStatus::Aborting);

    engine.abort_executions(run.id).await.unwrap();

    let executions = store.list_executions_for_run(run.id).await.unwrap();
    let s1 = executions.iter().find(|e| e.step == "s1").unwrap();
    assert_eq!(s1.status, RunStatus::Aborted);

    let settled = store.get_run(run.id).await.unwrap();
    assert_eq!(settled.status, RunStatus::Aborted);
}

#[tokio::test]
async fn initiating_a_step_with_an_unregistered_operation_fails_the_run() {
    let store = Arc::new(InMemoryStore::new());
    let workflow = setup_workflow(&store, "name: demo\nentry: s0\nsteps:\n  s0:\n    operation: missing-op\n").await;
    let run = setup_run(&store, workflow.id).await;
    let engine = engine(store.clone());

    let effects = engine.initiate_step(run.id, "s0", None, None, None).await.unwrap();
    assert!(!effects.is_empty(), "run:changed/run:ended events still fire on a savepoint rollback");

    let run = store.get_run(run.id).await.unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.ended.is_some());

    let executions = store.list_executions_for_run(run.id).await.unwrap();
    assert!(executions.is_empty(), "no execution row survives an operation-lookup failure");
}

#[tokio::test]
async fn a_postoperation_action_referencing_an_unregistered_operation_fails_the_run() {
    let store = Arc::new(InMemoryStore::new());
    store.put_operation(operation("test-op", &[("completed", OutcomeKind::Success)])).await.unwrap();
    let yaml = r#"
name: demo
entry: s0
steps:
  s0:
    operation: test-op
    postoperation:
      - actions:
          - action: execute-step
            step: s1
  s1:
    operation: missing-op
"#;
    let workflow = setup_workflow(&store, yaml).await;
    let run = setup_run(&store, workflow.id).await;
    let engine = engine(store.clone());

    engine.initiate_step(run.id, "s0", None, None, None).await.unwrap();
    complete(&engine, &store, run.id, "s0", "completed").await;

    let run = store.get_run(run.id).await.unwrap();
    assert_eq!(run.status, RunStatus::Failed, "s1's lookup failure must roll the whole run back");
}

#[tokio::test]
async fn idempotent_callback_on_a_terminal_execution_is_a_noop() {
    let store = Arc::new(InMemoryStore::new());
    store.put_operation(operation("test-op", &[("completed", OutcomeKind::Success)])).await.unwrap();
    let workflow = setup_workflow(&store, "name: demo\nentry: s0\nsteps:\n  s0:\n    operation: test-op\n").await;
    let run = setup_run(&store, workflow.id).await;
    let engine = engine(store.clone());

    engine.initiate_step(run.id, "s0", None, None, None).await.unwrap();
    let execution_id = complete(&engine, &store, run.id, "s0", "completed").await;

    let effects = engine
        .process_step(execution_id, CallbackStatus::Completed, json!({"status": "valid", "outcome": "completed"}))
        .await
        .unwrap();
    assert!(effects.is_empty());

    let run = store.get_run(run.id).await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);
}
