use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::{CallbackSpec, Dispatcher, DispatchError};

/// A call recorded by [`MockDispatcher`], for test assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    CreateProcess {
        queue_id: String,
        id: String,
        tag: String,
        input: Value,
        timeout: Option<u64>,
    },
    UpdateProcess {
        id: String,
        status: String,
    },
    QueueHttpTask {
        name: String,
    },
    QueueHttpTaskForEvent {
        name: String,
        topic: String,
    },
    CreateQueue {
        id: String,
        subject: String,
        name: String,
        endpoint: String,
    },
    CreateEvent {
        topic: String,
        aspects: Value,
    },
}

/// Records every call instead of performing it, in place of a
/// `wiremock`-backed stub, since no real HTTP surface needs stubbing for
/// engine/requests unit tests.
#[derive(Default)]
pub struct MockDispatcher {
    calls: Mutex<Vec<RecordedCall>>,
    gone_process_ids: Mutex<Vec<String>>,
}

impl MockDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `update_process` return `DispatchError::Gone` for this id,
    /// simulating a process the scheduler already forgot about.
    pub fn mark_gone(&self, process_id: impl Into<String>) {
        self.gone_process_ids.lock().push(process_id.into());
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Dispatcher for MockDispatcher {
    async fn create_process(
        &self,
        queue_id: &str,
        id: &str,
        tag: &str,
        input: Value,
        timeout: Option<u64>,
    ) -> Result<(), DispatchError> {
        self.calls.lock().push(RecordedCall::CreateProcess {
            queue_id: queue_id.to_string(),
            id: id.to_string(),
            tag: tag.to_string(),
            input,
            timeout,
        });
        Ok(())
    }

    async fn update_process(&self, id: &str, status: &str) -> Result<(), DispatchError> {
        if self.gone_process_ids.lock().iter().any(|g| g == id) {
            return Err(DispatchError::Gone);
        }
        self.calls.lock().push(RecordedCall::UpdateProcess {
            id: id.to_string(),
            status: status.to_string(),
        });
        Ok(())
    }

    async fn queue_http_task(&self, name: &str, _callback: CallbackSpec) -> Result<(), DispatchError> {
        self.calls.lock().push(RecordedCall::QueueHttpTask {
            name: name.to_string(),
        });
        Ok(())
    }

    async fn queue_http_task_for_event(
        &self,
        name: &str,
        _callback: CallbackSpec,
        topic: &str,
        _aspects: Value,
    ) -> Result<(), DispatchError> {
        self.calls.lock().push(RecordedCall::QueueHttpTaskForEvent {
            name: name.to_string(),
            topic: topic.to_string(),
        });
        Ok(())
    }

    async fn create_queue(
        &self,
        id: &str,
        subject: &str,
        name: &str,
        endpoint: &str,
    ) -> Result<(), DispatchError> {
        self.calls.lock().push(RecordedCall::CreateQueue {
            id: id.to_string(),
            subject: subject.to_string(),
            name: name.to_string(),
            endpoint: endpoint.to_string(),
        });
        Ok(())
    }

    async fn create_event(&self, topic: &str, aspects: Value) -> Result<(), DispatchError> {
        self.calls.lock().push(RecordedCall::CreateEvent {
            topic: topic.to_string(),
            aspects,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_create_process_calls() {
        let dispatcher = MockDispatcher::new();
        dispatcher
            .create_process("flux-operation:demo:op", "1", "s0", serde_json::json!({}), Some(30))
            .await
            .unwrap();
        assert_eq!(dispatcher.calls().len(), 1);
    }

    #[tokio::test]
    async fn marked_gone_process_returns_gone() {
        let dispatcher = MockDispatcher::new();
        dispatcher.mark_gone("42");
        let err = dispatcher.update_process("42", "aborting").await.unwrap_err();
        assert!(matches!(err, DispatchError::Gone));
    }
}
