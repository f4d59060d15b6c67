//! The scheduler's `process` callback payload shape.

use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use flux_engine::CallbackStatus;

/// `{id, tag, subject, status, output, progress, state}` — only `id` and
/// `status`/`output` drive engine transitions here; `tag`/`subject`/
/// `progress`/`state` are accepted for wire compatibility but unused, since
/// `flux-engine::Engine::process_step` re-derives the step from the
/// execution row rather than trusting the callback's own `tag`.
#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ProcessCallback {
    pub id: Uuid,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    pub status: RemoteStatus,
    #[serde(default)]
    pub output: Value,
    #[serde(default)]
    pub progress: Option<Value>,
    #[serde(default)]
    pub state: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum RemoteStatus {
    Completed,
    Failed,
    Timedout,
}

impl From<RemoteStatus> for CallbackStatus {
    fn from(status: RemoteStatus) -> Self {
        match status {
            RemoteStatus::Completed => CallbackStatus::Completed,
            RemoteStatus::Failed => CallbackStatus::Failed,
            RemoteStatus::Timedout => CallbackStatus::Timedout,
        }
    }
}
