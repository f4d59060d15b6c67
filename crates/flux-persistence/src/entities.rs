//! Entity structs for the persistence layer.
//!
//! Status enums follow
//! `durable::persistence::store::WorkflowStatus`'s shape (a plain
//! `#[serde(rename_all = "snake_case")]` C-like enum).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use flux_core::FieldKind;

/// Status shared by `Run` and `WorkflowExecution` (the same enum serves
/// both).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Prepared,
    Active,
    Waiting,
    Suspended,
    Aborting,
    Aborted,
    Completed,
    Failed,
    Timedout,
    Invalidated,
}

impl RunStatus {
    pub const TERMINAL: [RunStatus; 5] = [
        RunStatus::Aborted,
        RunStatus::Completed,
        RunStatus::Failed,
        RunStatus::Timedout,
        RunStatus::Invalidated,
    ];

    pub fn is_terminal(self) -> bool {
        Self::TERMINAL.contains(&self)
    }

    /// Whether a run/execution in this status can still be raced with
    /// a concurrent callback.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            RunStatus::Pending
                | RunStatus::Prepared
                | RunStatus::Active
                | RunStatus::Waiting
                | RunStatus::Suspended
                | RunStatus::Aborting
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_value(self).unwrap_or_default();
        write!(f, "{}", s.as_str().unwrap_or("unknown"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Prepared,
    Pending,
    Claimed,
    Completed,
    Canceled,
    Declined,
    Failed,
    Reopened,
    Done,
}

impl RequestStatus {
    pub const TERMINAL: [RequestStatus; 3] = [
        RequestStatus::Canceled,
        RequestStatus::Completed,
        RequestStatus::Declined,
    ];

    pub fn is_terminal(self) -> bool {
        Self::TERMINAL.contains(&self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    Yaml,
    Plugin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    pub designation: Option<String>,
    pub is_service: bool,
    pub kind: WorkflowKind,
    pub specification: Option<String>,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum OperationPhase {
    Preoperation,
    Operation,
    Postoperation,
    Prerun,
    Postrun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Outcome {
    pub name: String,
    pub kind: OutcomeKind,
    pub description: Option<String>,
    pub schema: Option<FieldKind>,
}

/// A registered remote work type.
///
/// `id` is the two-segment token `ns:name`; `queue_id` is derived, never
/// stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Operation {
    pub id: String,
    pub name: String,
    pub phase: OperationPhase,
    pub description: Option<String>,
    pub input_schema: FieldKind,
    pub parameters: Value,
    pub outcomes: BTreeMap<String, Outcome>,
}

impl Operation {
    pub fn queue_id(&self) -> String {
        format!("flux-operation:{}", self.id)
    }
}

/// An opaque reference to an external entity, carrying its type and id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Surrogate {
    pub entity_type: String,
    pub entity_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Product {
    pub token: String,
    pub surrogate: Surrogate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Run {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub name: String,
    pub status: RunStatus,
    pub parameters: Value,
    pub started: Option<DateTime<Utc>>,
    pub ended: Option<DateTime<Utc>>,
    pub products: BTreeMap<String, Product>,
}

impl Run {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn associate_product(&mut self, token: String, surrogate: Surrogate) {
        self.products.insert(token.clone(), Product { token, surrogate });
    }
}

/// One invocation of one step within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct WorkflowExecution {
    pub id: Uuid,
    pub run_id: Uuid,
    pub execution_id: i64,
    pub ancestor_id: Option<Uuid>,
    pub step: String,
    pub name: Option<String>,
    pub status: RunStatus,
    pub outcome: Option<String>,
    pub started: Option<DateTime<Utc>>,
    pub ended: Option<DateTime<Utc>>,
    pub parameters: Value,
}

impl WorkflowExecution {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RequestSlot {
    pub title: String,
    pub slot_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RequestAttachment {
    pub id: Uuid,
    pub filename: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Message {
    pub id: Uuid,
    pub author: Uuid,
    pub text: Option<String>,
    pub created: DateTime<Utc>,
}

/// A human-completed form task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Request {
    pub id: Uuid,
    pub name: String,
    pub status: RequestStatus,
    pub originator: Uuid,
    pub assignee: Option<Uuid>,
    pub creator: Uuid,
    pub template_id: Option<Uuid>,
    pub slot_order: Option<Vec<String>>,
    pub claimed: Option<DateTime<Utc>>,
    pub completed: Option<DateTime<Utc>>,
    pub attachments: Vec<RequestAttachment>,
    pub slots: BTreeMap<String, RequestSlot>,
    pub products: BTreeMap<String, Product>,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct EmailTemplate {
    pub id: Uuid,
    pub name: String,
    pub template: String,
}
