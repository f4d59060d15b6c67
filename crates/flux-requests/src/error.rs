use thiserror::Error;

pub use flux_spec::ValidationError;

/// Business-rule rejections carrying a machine-readable token. Grounded on
/// the original's `OperationError(token=...)` raises scattered through
/// `models/request.py` (`invalid-slot`, `invalid-product`,
/// `cannot-acquire-product`, `cannot-update-with-status`, `invalid-subject`).
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("cannot-update-with-status")]
    CannotUpdateWithStatus,

    #[error("invalid-slot-order")]
    InvalidSlotOrder,

    #[error("invalid-slot: {0}")]
    InvalidSlot(String),

    #[error("invalid-product")]
    InvalidProduct,

    #[error("cannot-acquire-product")]
    CannotAcquireProduct,

    #[error("invalid-subject: {0}")]
    InvalidSubject(String),

    #[error("email-send-failed: {0}")]
    EmailSendFailed(String),

    #[error(transparent)]
    Store(#[from] flux_persistence::StoreError),
}
