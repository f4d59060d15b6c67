use thiserror::Error;

use flux_core::InterpolationError;
use flux_dispatch::DispatchError;
use flux_persistence::StoreError;
use flux_spec::{SpecError, ValidationError};

/// Grounded on `durable`'s per-crate `thiserror::Error` convention
/// (`ExecutorError`, `RegistryError`): exceptions-for-control-flow become an
/// explicit `Result` type here — only `Fatal`/`UnknownOperation`/
/// `UnknownStep` cross the coordinator's savepoint-rollback boundary,
/// everything else is represented as data (`env.failure`).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("unknown step: {0}")]
    UnknownStep(String),

    #[error("invalid workflow specification: {0:?}")]
    Invalid(Vec<ValidationError>),

    #[error("fatal engine error: {0}")]
    Fatal(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error(transparent)]
    Interpolation(#[from] InterpolationError),
}

impl EngineError {
    /// Whether this error is a business-logic failure raised by operation
    /// lookup or rule evaluation, as opposed to an infrastructure fault —
    /// the boundary `initiate_step`/`process_step` roll the run back to
    /// `failed` at, rather than leaving it stuck `active`.
    pub fn fails_run(&self) -> bool {
        matches!(
            self,
            EngineError::UnknownOperation(_)
                | EngineError::UnknownStep(_)
                | EngineError::Fatal(_)
                | EngineError::Interpolation(_)
        )
    }
}
