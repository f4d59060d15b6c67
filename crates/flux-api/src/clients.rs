//! Thin `reqwest`-backed production adapters for the two external
//! interfaces left unspecified beyond their trait shape (`SubjectDirectory`,
//! `EmailSender`) — grounded directly on `flux_dispatch::HttpDispatcher`'s
//! `reqwest::Client` + base-url-join pattern, the same shape applied to a
//! different remote.

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use flux_requests::{EmailSender, ExternalUrlMinter, OperationError, Subject, SubjectDirectory};

pub struct HttpSubjectDirectory {
    http: reqwest::Client,
    base_url: String,
}

impl HttpSubjectDirectory {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into() }
    }
}

#[derive(Debug, Deserialize)]
struct SubjectPayload {
    id: Uuid,
    name: String,
    firstname: String,
    lastname: String,
    email: Option<String>,
}

impl From<SubjectPayload> for Subject {
    fn from(payload: SubjectPayload) -> Self {
        Subject {
            id: payload.id,
            name: payload.name,
            firstname: payload.firstname,
            lastname: payload.lastname,
            email: payload.email,
        }
    }
}

#[async_trait]
impl SubjectDirectory for HttpSubjectDirectory {
    async fn get(&self, id: Uuid) -> Option<Subject> {
        let url = format!("{}/security/1.0/subject/{id}", self.base_url.trim_end_matches('/'));
        let response = self.http.get(url).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        response.json::<SubjectPayload>().await.ok().map(Into::into)
    }
}

pub struct HttpEmailSender {
    http: reqwest::Client,
    base_url: String,
}

impl HttpEmailSender {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into() }
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send(
        &self,
        sender: &str,
        recipients: &[String],
        subject: &str,
        body: &str,
    ) -> Result<(), OperationError> {
        let url = format!("{}/email/1.0/message", self.base_url.trim_end_matches('/'));
        let payload = serde_json::json!({
            "sender": sender,
            "recipients": recipients,
            "subject": subject,
            "body": body,
        });
        self.http
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| OperationError::EmailSendFailed(e.to_string()))?;
        Ok(())
    }
}

/// Mints a URL under the API's own public base. External URL minting is
/// out of scope for the engine's hard core; this is the deployment-supplied
/// default — same base used for attachment links.
pub struct ApiUrlMinter {
    pub base: String,
}

#[async_trait]
impl ExternalUrlMinter for ApiUrlMinter {
    async fn mint(&self, path: &str) -> String {
        format!("{}{}", self.base.trim_end_matches('/'), path)
    }
}
