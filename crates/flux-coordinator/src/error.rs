use thiserror::Error;

use flux_engine::EngineError;
use flux_persistence::StoreError;
use flux_spec::ValidationError;

/// `ValidationError` and `OperationError(token)` pass through to the API
/// layer untouched (controller-initiated mutations), while `NotFound`/`Gone`
/// racing a scheduler callback are swallowed by the handler itself and
/// never reach this enum at all.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("{0}")]
    Operation(&'static str),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Request(#[from] flux_requests::OperationError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
