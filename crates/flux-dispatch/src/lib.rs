//! Thin HTTP client for the external task scheduler.
//!
//! Grounded on the request/response client shape used by
//! `everruns-openai`/`everruns-anthropic`'s provider clients (a
//! `Client { http: reqwest::Client, base_url: String }`, one method per
//! remote call) and on `original_source/flux/engine/queue.py` for the
//! exact calls needed.

mod error;
mod mock;

pub use error::DispatchError;
pub use mock::{MockDispatcher, RecordedCall};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// A one-shot or event-subscribed HTTP callback descriptor, handed to the
/// scheduler so it knows what to invoke later.
#[derive(Debug, Clone, Serialize)]
pub struct CallbackSpec {
    pub method: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl CallbackSpec {
    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: "POST".to_string(),
            url: url.into(),
            body: Some(body),
        }
    }
}

/// A side effect deferred until after a transaction commits, never
/// dispatched inline. Collected by engine/request/coordinator code and
/// drained by whichever caller owns the enclosing transaction.
#[derive(Debug, Clone)]
pub enum PostCommitEffect {
    Event {
        topic: String,
        aspects: Value,
    },
    Task {
        name: String,
        callback: CallbackSpec,
    },
    TaskForEvent {
        name: String,
        callback: CallbackSpec,
        topic: String,
        aspects: Value,
    },
}

impl PostCommitEffect {
    pub fn event(topic: impl Into<String>, aspects: Value) -> Self {
        PostCommitEffect::Event {
            topic: topic.into(),
            aspects,
        }
    }

    pub fn task(name: impl Into<String>, callback: CallbackSpec) -> Self {
        PostCommitEffect::Task {
            name: name.into(),
            callback,
        }
    }

    /// Dispatches the effect. Infrastructure failures here are logged and
    /// swallowed by the caller as best-effort notifications; this method
    /// surfaces the error and leaves that policy decision to the caller,
    /// exactly as the scheduler client itself does.
    pub async fn dispatch(&self, dispatcher: &dyn Dispatcher) -> Result<(), DispatchError> {
        match self {
            PostCommitEffect::Event { topic, aspects } => {
                dispatcher.create_event(topic, aspects.clone()).await
            }
            PostCommitEffect::Task { name, callback } => {
                dispatcher.queue_http_task(name, callback.clone()).await
            }
            PostCommitEffect::TaskForEvent {
                name,
                callback,
                topic,
                aspects,
            } => {
                dispatcher
                    .queue_http_task_for_event(name, callback.clone(), topic, aspects.clone())
                    .await
            }
        }
    }
}

/// The five scheduler operations, behind a trait so flux-engine/-requests
/// depend on the trait rather than a concrete `reqwest`-backed type —
/// isolated behind a small interface so tests can inject a fake.
#[async_trait]
pub trait Dispatcher: Send + Sync + 'static {
    async fn create_process(
        &self,
        queue_id: &str,
        id: &str,
        tag: &str,
        input: Value,
        timeout: Option<u64>,
    ) -> Result<(), DispatchError>;

    /// Signals abort to a running process. A 410 response is mapped to
    /// `DispatchError::Gone` rather than propagated as a hard failure.
    async fn update_process(&self, id: &str, status: &str) -> Result<(), DispatchError>;

    async fn queue_http_task(&self, name: &str, callback: CallbackSpec) -> Result<(), DispatchError>;

    async fn queue_http_task_for_event(
        &self,
        name: &str,
        callback: CallbackSpec,
        topic: &str,
        aspects: Value,
    ) -> Result<(), DispatchError>;

    async fn create_queue(
        &self,
        id: &str,
        subject: &str,
        name: &str,
        endpoint: &str,
    ) -> Result<(), DispatchError>;

    async fn create_event(&self, topic: &str, aspects: Value) -> Result<(), DispatchError>;
}

/// Production `Dispatcher`: a `reqwest::Client` pointed at the scheduler's
/// base URL.
pub struct HttpDispatcher {
    http: reqwest::Client,
    base_url: String,
}

impl HttpDispatcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<(), DispatchError> {
        let response = builder.send().await?;
        if response.status().as_u16() == 410 {
            return Err(DispatchError::Gone);
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Scheduler { status, body });
        }
        Ok(())
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn create_process(
        &self,
        queue_id: &str,
        id: &str,
        tag: &str,
        input: Value,
        timeout: Option<u64>,
    ) -> Result<(), DispatchError> {
        let body = serde_json::json!({
            "queue_id": queue_id,
            "id": id,
            "tag": tag,
            "input": input,
            "timeout": timeout,
        });
        self.send(self.http.post(self.url("/processes")).json(&body)).await
    }

    async fn update_process(&self, id: &str, status: &str) -> Result<(), DispatchError> {
        let body = serde_json::json!({"status": status});
        self.send(
            self.http
                .patch(self.url(&format!("/processes/{id}")))
                .json(&body),
        )
        .await
    }

    async fn queue_http_task(&self, name: &str, callback: CallbackSpec) -> Result<(), DispatchError> {
        let body = serde_json::json!({"name": name, "callback": callback});
        self.send(self.http.post(self.url("/tasks")).json(&body)).await
    }

    async fn queue_http_task_for_event(
        &self,
        name: &str,
        callback: CallbackSpec,
        topic: &str,
        aspects: Value,
    ) -> Result<(), DispatchError> {
        let body = serde_json::json!({
            "name": name,
            "callback": callback,
            "topic": topic,
            "aspects": aspects,
        });
        self.send(self.http.post(self.url("/tasks/subscriptions")).json(&body))
            .await
    }

    async fn create_queue(
        &self,
        id: &str,
        subject: &str,
        name: &str,
        endpoint: &str,
    ) -> Result<(), DispatchError> {
        let body = serde_json::json!({
            "id": id,
            "subject": subject,
            "name": name,
            "endpoint": endpoint,
        });
        self.send(self.http.post(self.url("/queues")).json(&body)).await
    }

    async fn create_event(&self, topic: &str, aspects: Value) -> Result<(), DispatchError> {
        let body = serde_json::json!({"topic": topic, "aspects": aspects});
        self.send(self.http.post(self.url("/events")).json(&body)).await
    }
}
