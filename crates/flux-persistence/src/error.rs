use thiserror::Error;
use uuid::Uuid;

/// Grounded on `durable::persistence::store::StoreError`'s shape
/// (one variant per failure category, `Database(String)` as the catch-all
/// for the SQL backend).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    /// Row was found but is currently held by another caller's
    /// `load_for_update` (only the in-memory store can observe this;
    /// Postgres blocks on `SELECT ... FOR UPDATE` instead).
    #[error("row locked")]
    Locked,

    #[error("concurrency conflict: expected {expected}, got {actual}")]
    Conflict { expected: i64, actual: i64 },

    #[error("duplicate {kind}: {id}")]
    Duplicate { kind: EntityKind, id: String },

    #[error("database error: {0}")]
    Database(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Workflow,
    Operation,
    Run,
    WorkflowExecution,
    Request,
    EmailTemplate,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntityKind::Workflow => "workflow",
            EntityKind::Operation => "operation",
            EntityKind::Run => "run",
            EntityKind::WorkflowExecution => "execution",
            EntityKind::Request => "request",
            EntityKind::EmailTemplate => "email template",
        };
        write!(f, "{s}")
    }
}

impl StoreError {
    pub fn not_found(kind: EntityKind, id: impl std::fmt::Display) -> Self {
        StoreError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

pub type Uid = Uuid;
