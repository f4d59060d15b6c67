//! Drives a single-step success run end-to-end through HTTP, in-process
//! against an `InMemoryStore` and a `MockDispatcher` — `control-plane::main`'s
//! own `#[cfg(test)] mod tests` `tower::oneshot` style, applied across the
//! whole merged router instead of one test route.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use flux_coordinator::Coordinator;
use flux_dispatch::MockDispatcher;
use flux_engine::Engine;
use flux_persistence::InMemoryStore;
use flux_requests::{EmailNotifier, NoopEmailSender, NullUrlMinter, StaticSubjectDirectory};

use flux_api::api;

const CALLBACK_BASE: &str = "https://flux.test";

fn app() -> Router {
    let store = Arc::new(InMemoryStore::new());
    let dispatcher = Arc::new(MockDispatcher::new());
    let engine = Arc::new(Engine::new(store.clone(), dispatcher.clone(), CALLBACK_BASE));

    let subjects = Arc::new(StaticSubjectDirectory {
        subjects: Default::default(),
    });
    let notifier = Arc::new(EmailNotifier::new(
        store.clone(),
        subjects,
        Arc::new(NoopEmailSender),
        Arc::new(NullUrlMinter {
            base: CALLBACK_BASE.to_string(),
        }),
    ));
    let coordinator = Arc::new(Coordinator::new(
        store.clone(),
        dispatcher.clone(),
        engine.clone(),
        notifier,
        CALLBACK_BASE,
        Uuid::now_v7(),
    ));

    Router::new()
        .merge(api::workflows::routes(api::workflows::AppState { store: store.clone() }))
        .merge(api::runs::routes(api::runs::AppState {
            store: store.clone(),
            coordinator: coordinator.clone(),
        }))
        .merge(api::executions::routes(api::executions::AppState {
            store: store.clone(),
            coordinator: coordinator.clone(),
        }))
        .merge(api::operations::routes(api::operations::AppState {
            store: store.clone(),
            engine: engine.clone(),
            coordinator: coordinator.clone(),
        }))
        .merge(api::requests::routes(api::requests::AppState { store, coordinator }))
}

async fn request(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let body = match body {
        Some(v) => Body::from(serde_json::to_vec(&v).unwrap()),
        None => Body::empty(),
    };
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn single_step_success_completes_the_run() {
    let app = app();

    let (status, _) = request(
        &app,
        "POST",
        "/flux/1.0/operations",
        Some(json!({
            "id": "test-op",
            "name": "test-op",
            "phase": "operation",
            "input_schema": {"type": "field"},
            "outcomes": {
                "completed": {"name": "completed", "kind": "success", "description": null, "schema": null}
            }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let spec_yaml = "name: single-step\nentry: s0\nsteps:\n  s0:\n    operation: test-op\n";
    let (status, workflow) = request(
        &app,
        "POST",
        "/flux/1.0/workflows",
        Some(json!({
            "name": "single-step",
            "specification": spec_yaml,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let workflow_id = workflow["id"].as_str().unwrap();

    let (status, run) = request(
        &app,
        "POST",
        "/flux/1.0/runs",
        Some(json!({
            "workflow_id": workflow_id,
            "status": "pending",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let run_id = run["id"].as_str().unwrap().to_string();
    assert_eq!(run["status"], "pending");

    let (status, _) = request(
        &app,
        "POST",
        &format!("/flux/1.0/runs/{run_id}/task"),
        Some(json!({"task": "initiate-run"})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, executions) = request(&app, "GET", &format!("/flux/1.0/executions?run_id={run_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let executions = executions["data"].as_array().unwrap();
    assert_eq!(executions.len(), 1);
    let execution = &executions[0];
    assert_eq!(execution["execution_id"], 1);
    assert!(execution["ancestor_id"].is_null());
    assert_eq!(execution["status"], "active");
    let execution_id = execution["id"].as_str().unwrap().to_string();

    let (status, _) = request(
        &app,
        "POST",
        "/flux/1.0/operations/test-op/process",
        Some(json!({
            "id": execution_id,
            "status": "completed",
            "output": {"status": "valid", "outcome": "completed"},
        })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, run) = request(&app, "GET", &format!("/flux/1.0/runs/{run_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(run["status"], "completed");
    assert!(!run["ended"].is_null());

    let (status, executions) = request(&app, "GET", &format!("/flux/1.0/executions?run_id={run_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let executions = executions["data"].as_array().unwrap();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0]["status"], "completed");
}

/// A workflow whose entry step references an operation that was never
/// registered fails the run instead of hanging — and the task callback
/// that drives it still returns 202, never a 5xx the scheduler would retry.
#[tokio::test]
async fn initiate_run_task_returns_202_and_fails_the_run_on_unknown_operation() {
    let app = app();

    let spec_yaml = "name: broken\nentry: s0\nsteps:\n  s0:\n    operation: missing-op\n";
    let (status, workflow) = request(
        &app,
        "POST",
        "/flux/1.0/workflows",
        Some(json!({
            "name": "broken",
            "specification": spec_yaml,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let workflow_id = workflow["id"].as_str().unwrap();

    let (status, run) = request(
        &app,
        "POST",
        "/flux/1.0/runs",
        Some(json!({
            "workflow_id": workflow_id,
            "status": "pending",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let run_id = run["id"].as_str().unwrap().to_string();

    let (status, _) = request(
        &app,
        "POST",
        &format!("/flux/1.0/runs/{run_id}/task"),
        Some(json!({"task": "initiate-run"})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, run) = request(&app, "GET", &format!("/flux/1.0/runs/{run_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(run["status"], "failed");
    assert!(!run["ended"].is_null());
}

#[tokio::test]
async fn request_decline_requires_a_matching_message() {
    let app = app();

    let originator = Uuid::now_v7();
    let assignee = Uuid::now_v7();
    let (status, created) = request(
        &app,
        "POST",
        "/flux/1.0/requests",
        Some(json!({
            "name": "approve-expense",
            "originator": originator,
            "creator": originator,
            "assignee": assignee,
            "start_pending": true,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let request_id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["status"], "pending");

    let (status, body) = request(
        &app,
        "PATCH",
        &format!("/flux/1.0/requests/{request_id}"),
        Some(json!({"status": "declined"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["token"], "message-required-for-status");

    let (status, body) = request(
        &app,
        "PATCH",
        &format!("/flux/1.0/requests/{request_id}"),
        Some(json!({
            "status": "declined",
            "message": {"author": originator},
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["token"], "invalid-message-author");

    let (status, updated) = request(
        &app,
        "PATCH",
        &format!("/flux/1.0/requests/{request_id}"),
        Some(json!({
            "status": "declined",
            "message": {"author": assignee},
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "declined");
    assert!(!updated["completed"].is_null());
}
