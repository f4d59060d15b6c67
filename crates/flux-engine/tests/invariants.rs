//! Execution serial monotonicity, ancestor containment, and terminal
//! immutability, exercised over randomized-length step chains rather than
//! a single fixed-size fixture — table-driven cases over a sweep of chain
//! lengths rather than pulling in `proptest`.

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

fn chain_yaml(len: usize) -> String {
    let mut out = String::from("name: demo\nentry: s0\nsteps:\n");
    for i in 0..len {
        out.push_str(&format!("  s{i}:\n    operation: test-op\n"));
        if i + 1 < len {
            out.push_str(&format!(
                "    postoperation:\n      - actions:\n          - action: execute-step\n            step: s{}\n",
                i + 1
            ));
        }
    }
    out
}

async fn drive_chain(len: usize) -> (Arc<InMemoryStore>, Uuid) {
    let store = Arc::new(InMemoryStore::new());
    store
        .put_operation(Operation {
            id: "test-op".to_string(),
            name: "test-op".to_string(),
            phase: OperationPhase::Operation,
            description: None,
            input_schema: flux_core::FieldKind::Field,
            parameters: json!({}),
            outcomes: BTreeMap::from([(
                "completed".to_string(),
                Outcome {
                    name: "completed".to_string(),
                    kind: OutcomeKind::Success,
                    description: None,
                    schema: None,
                },
            )]),
        })
        .await
        .unwrap();

    let workflow = store
        .create_workflow(Workflow {
            id: Uuid::now_v7(),
            name: format!("wf-{}", Uuid::now_v7()),
            designation: None,
            is_service: false,
            kind: WorkflowKind::Yaml,
            specification: Some(chain_yaml(len)),
            modified: Utc::now(),
        })
        .await
        .unwrap();

    let run = store
        .create_run(Run {
            id: Uuid::now_v7(),
            workflow_id: workflow.id,
            name: format!("run-{}", Uuid::now_v7()),
            status: RunStatus::Pending,
            parameters: json!({}),
            started: None,
            ended: None,
            products: BTreeMap::new(),
        })
        .await
        .unwrap();

    let engine = Engine::new(store.clone(), Arc::new(MockDispatcher::new()), "https://flux.test");
    engine.initiate_step(run.id, "s0", None, None, None).await.unwrap();

    for step in 0..len {
        let step_name = format!("s{step}");
        let executions = store.list_executions_for_run(run.id).await.unwrap();
        let execution = executions
            .into_iter()
            .filter(|e| e.step == step_name && e.status == RunStatus::Active)
            .max_by_key(|e| e.execution_id)
            .unwrap();
        engine
            .process_step(
                execution.id,
                CallbackStatus::Completed,
                json!({"status": "valid", "outcome": "completed"}),
            )
            .await
            .unwrap();
    }

    (store, run.id)
}

#[tokio::test]
async fn execution_serials_are_gapless_and_monotonic_across_chain_lengths() {
    for len in [1usize, 2, 3, 5, 8] {
        let (store, run_id) = drive_chain(len).await;
        let mut ids: Vec<i64> = store
            .list_executions_for_run(run_id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.execution_id)
            .collect();
        ids.sort();
        assert_eq!(ids, (1..=len as i64).collect::<Vec<_>>(), "chain length {len}");
    }
}

#[tokio::test]
async fn ancestor_ids_stay_within_the_same_run_and_chain_linearly() {
    for len in [2usize, 4, 6] {
        let (store, run_id) = drive_chain(len).await;
        let mut executions = store.list_executions_for_run(run_id).await.unwrap();
        executions.sort_by_key(|e| e.execution_id);

        assert_eq!(executions[0].ancestor_id, None);
        for window in executions.windows(2) {
            let [parent, child] = window else { unreachable!() };
            assert_eq!(child.ancestor_id, Some(parent.id), "chain length {len}");
            assert!(
                executions.iter().any(|e| Some(e.id) == child.ancestor_id && e.run_id == run_id),
                "ancestor must reference an execution of the same run"
            );
        }
    }
}

#[tokio::test]
async fn terminal_run_status_never_advances_again() {
    for len in [1usize, 3] {
        let (store, run_id) = drive_chain(len).await;
        let run = store.get_run(run_id).await.unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.ended.is_some());

        let engine = Engine::new(store.clone(), Arc::new(MockDispatcher::new()), "https://flux.test");
        let effects = engine.end_run(run_id, RunStatus::Failed).await.unwrap();
        assert!(effects.is_empty(), "re-entry on a terminal run must be a no-op");

        let run_after = store.get_run(run_id).await.unwrap();
        assert_eq!(run_after.status, RunStatus::Completed, "terminal status must not move to Failed");
    }
}
