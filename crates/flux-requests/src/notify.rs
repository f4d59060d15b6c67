//! Email notifications fired by the request lifecycle.
//!
//! Grounded on `original_source/flux/models/request.py`'s
//! `_send_init_email`/`_send_cancel_email`/`_send_decline_email`, including
//! the cancel/decline bodies alongside the pending-case email.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use flux_core::Context;
use serde_json::{json, Value};
use uuid::Uuid;

use flux_persistence::{EmailTemplate, Request, Store};

use crate::error::OperationError;
use crate::subject::{Subject, SubjectDirectory};

/// Email transport, isolated behind a trait so tests can inject a fake
/// in place of a real ad-hoc HTTP call.
#[async_trait]
pub trait EmailSender: Send + Sync + 'static {
    async fn send(
        &self,
        sender: &str,
        recipients: &[String],
        subject: &str,
        body: &str,
    ) -> Result<(), OperationError>;
}

/// Mints externally-reachable URLs. External URL minting is out of scope
/// for the engine's hard core; this trait is the seam a deployment plugs
/// a real minter into.
#[async_trait]
pub trait ExternalUrlMinter: Send + Sync + 'static {
    async fn mint(&self, path: &str) -> String;
}

fn subject_context(subject: &Subject) -> Value {
    json!({
        "id": subject.id,
        "name": subject.name,
        "firstname": subject.firstname,
        "lastname": subject.lastname,
        "email": subject.email,
    })
}

fn evaluate_template(template: &EmailTemplate, params: Value) -> Result<String, OperationError> {
    let ctx = Context::from_value(params);
    match flux_core::interpolate_value(&Value::String(template.template.clone()), &ctx) {
        Ok(Value::String(body)) => Ok(body),
        Ok(other) => Ok(other.to_string()),
        Err(_) => Ok(template.template.clone()),
    }
}

#[async_trait]
pub trait RequestNotifier: Send + Sync + 'static {
    /// `Request.initiate`: emails the assignee using the request's linked
    /// email template. Returns whether the assignee had an email address
    /// to send to, mirroring the original's boolean return.
    async fn notify_pending(&self, request: &Request) -> Result<bool, OperationError>;

    /// `Request.decline`.
    async fn notify_declined(&self, request: &Request) -> Result<(), OperationError>;

    /// `Request.cancel`.
    async fn notify_canceled(&self, request: &Request) -> Result<(), OperationError>;
}

pub struct EmailNotifier {
    store: Arc<dyn Store>,
    subjects: Arc<dyn SubjectDirectory>,
    sender: Arc<dyn EmailSender>,
    urls: Arc<dyn ExternalUrlMinter>,
}

impl EmailNotifier {
    pub fn new(
        store: Arc<dyn Store>,
        subjects: Arc<dyn SubjectDirectory>,
        sender: Arc<dyn EmailSender>,
        urls: Arc<dyn ExternalUrlMinter>,
    ) -> Self {
        Self { store, subjects, sender, urls }
    }

    async fn participants(&self, request: &Request) -> Option<(Subject, Subject)> {
        let assignee_id = request.assignee?;
        let assignee = self.subjects.get(assignee_id).await?;
        let originator = self.subjects.get(request.originator).await?;
        Some((assignee, originator))
    }

    fn attachments_by_token(&self, request: &Request) -> Value {
        let mut grouped: BTreeMap<String, Vec<Value>> = BTreeMap::new();
        for attachment in &request.attachments {
            grouped
                .entry(attachment.filename.clone())
                .or_default()
                .push(json!({
                    "id": attachment.id,
                    "filename": attachment.filename,
                    "url": attachment.url,
                }));
        }
        json!(grouped)
    }

    fn slots_value(&self, request: &Request) -> Value {
        json!(request
            .slots
            .iter()
            .map(|(token, slot)| (token.clone(), json!({"title": slot.title, "slot_type": slot.slot_type})))
            .collect::<BTreeMap<_, _>>())
    }
}

#[async_trait]
impl RequestNotifier for EmailNotifier {
    async fn notify_pending(&self, request: &Request) -> Result<bool, OperationError> {
        let Some((assignee, originator)) = self.participants(request).await else {
            return Ok(false);
        };
        let Some(email) = &assignee.email else {
            return Ok(false);
        };

        let template_id = request
            .template_id
            .ok_or_else(|| OperationError::InvalidSubject("request has no email template".to_string()))?;
        let template = self.store.get_email_template(template_id).await?;

        let url = self.urls.mint(&format!("/complete-request/{}", request.id)).await;
        let mut request_value = json!({
            "id": request.id,
            "name": request.name,
            "status": request.status,
            "originator": request.originator,
            "assignee": request.assignee,
        });
        request_value["url"] = json!(url);

        let params = json!({
            "request": request_value,
            "originator": subject_context(&originator),
            "assignee": subject_context(&assignee),
            "attachments": self.attachments_by_token(request),
            "slots": self.slots_value(request),
        });
        let body = evaluate_template(&template, params)?;
        let subject_line = format!("New request from {} {}", originator.firstname, originator.lastname);
        self.sender
            .send(&originator.email.clone().unwrap_or_default(), &[email.clone()], &subject_line, &body)
            .await?;
        Ok(true)
    }

    async fn notify_declined(&self, request: &Request) -> Result<(), OperationError> {
        let Some((assignee, originator)) = self.participants(request).await else {
            return Ok(());
        };
        let Some(originator_email) = &originator.email else {
            return Ok(());
        };
        let message_text = request.messages.last().and_then(|m| m.text.clone()).unwrap_or_default();

        let subject_line = format!("Request to {} {} is declined", assignee.firstname, assignee.lastname);
        let body = format!(
            "The request \"{}\" assigned to {} {} has been declined with the following fulfillment note: \n{}",
            request.name, assignee.firstname, assignee.lastname, message_text
        );
        let assignee_email = assignee.email.clone().unwrap_or_default();
        self.sender
            .send(&assignee_email, &[originator_email.clone()], &subject_line, &body)
            .await
    }

    async fn notify_canceled(&self, request: &Request) -> Result<(), OperationError> {
        let Some((assignee, originator)) = self.participants(request).await else {
            return Ok(());
        };
        let Some(assignee_email) = &assignee.email else {
            return Ok(());
        };
        let subject_line = format!("Request from {} {} is canceled", originator.firstname, originator.lastname);
        let body = format!(
            "The request \"{}\" originated from {} {} has been canceled.",
            request.name, originator.firstname, originator.lastname
        );
        self.sender
            .send(assignee_email, &[assignee_email.clone()], &subject_line, &body)
            .await
    }
}

/// Test double: records nothing, sends nothing, mints a deterministic path.
pub struct NullUrlMinter {
    pub base: String,
}

#[async_trait]
impl ExternalUrlMinter for NullUrlMinter {
    async fn mint(&self, path: &str) -> String {
        format!("{}{}", self.base.trim_end_matches('/'), path)
    }
}

pub struct NoopEmailSender;

#[async_trait]
impl EmailSender for NoopEmailSender {
    async fn send(&self, _sender: &str, _recipients: &[String], _subject: &str, _body: &str) -> Result<(), OperationError> {
        Ok(())
    }
}

pub struct StaticSubjectDirectory {
    pub subjects: std::collections::HashMap<Uuid, Subject>,
}

#[async_trait]
impl SubjectDirectory for StaticSubjectDirectory {
    async fn get(&self, id: Uuid) -> Option<Subject> {
        self.subjects.get(&id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flux_persistence::InMemoryStore;
    use std::collections::HashMap;

    fn subject(id: Uuid, email: &str) -> Subject {
        Subject {
            id,
            name: "Jane Doe".to_string(),
            firstname: "Jane".to_string(),
            lastname: "Doe".to_string(),
            email: Some(email.to_string()),
        }
    }

    fn sample_request(assignee: Uuid, originator: Uuid, template_id: Uuid) -> Request {
        Request {
            id: Uuid::now_v7(),
            name: "demo".to_string(),
            status: flux_persistence::RequestStatus::Pending,
            originator,
            assignee: Some(assignee),
            creator: originator,
            template_id: Some(template_id),
            slot_order: None,
            claimed: None,
            completed: None,
            attachments: vec![],
            slots: Default::default(),
            products: Default::default(),
            messages: vec![],
        }
    }

    #[tokio::test]
    async fn notify_pending_sends_when_assignee_has_email() {
        let store = Arc::new(InMemoryStore::new());
        let template = store
            .put_email_template("init".to_string(), "Hello ${assignee.firstname}, see ${request.url}".to_string())
            .await
            .unwrap();

        let assignee_id = Uuid::now_v7();
        let originator_id = Uuid::now_v7();
        let subjects = Arc::new(StaticSubjectDirectory {
            subjects: HashMap::from([
                (assignee_id, subject(assignee_id, "assignee@example.com")),
                (originator_id, subject(originator_id, "originator@example.com")),
            ]),
        });
        let notifier = EmailNotifier::new(
            store,
            subjects,
            Arc::new(NoopEmailSender),
            Arc::new(NullUrlMinter { base: "https://flux.example".to_string() }),
        );

        let request = sample_request(assignee_id, originator_id, template.id);
        let sent = notifier.notify_pending(&request).await.unwrap();
        assert!(sent);
    }

    #[tokio::test]
    async fn notify_pending_is_false_without_assignee_email() {
        let store = Arc::new(InMemoryStore::new());
        let template = store.put_email_template("init".to_string(), "hi".to_string()).await.unwrap();
        let assignee_id = Uuid::now_v7();
        let originator_id = Uuid::now_v7();
        let mut assignee_subj = subject(assignee_id, "x");
        assignee_subj.email = None;
        let subjects = Arc::new(StaticSubjectDirectory {
            subjects: HashMap::from([
                (assignee_id, assignee_subj),
                (originator_id, subject(originator_id, "o@example.com")),
            ]),
        });
        let notifier = EmailNotifier::new(
            store,
            subjects,
            Arc::new(NoopEmailSender),
            Arc::new(NullUrlMinter { base: "https://flux.example".to_string() }),
        );
        let request = sample_request(assignee_id, originator_id, template.id);
        let sent = notifier.notify_pending(&request).await.unwrap();
        assert!(!sent);
    }
}
