//! Shared DTOs and error-to-HTTP-status mapping.
//!
//! Grounded on `everruns-control-plane::api::common`'s `ErrorResponse`/
//! `ListResponse<T>` shapes, reused verbatim, plus a single `ApiError`
//! wrapper so every resource module maps this workspace's error enums into
//! the right status code in one place instead of repeating a `match` per
//! handler.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into(), token: None }
    }

    pub fn with_token(error: impl Into<String>, token: impl Into<String>) -> Self {
        Self { error: error.into(), token: Some(token.into()) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(data: Vec<T>) -> Self {
        Self { data }
    }
}

/// One error type per handler return, translated to the right HTTP status
/// by `IntoResponse` below (teacher precedent: `control-plane`'s handlers
/// map service errors to `StatusCode` inline; this crate centralizes the
/// mapping once per error source instead of once per handler).
pub struct ApiError(pub StatusCode, pub ErrorResponse);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(self.1)).into_response()
    }
}

impl From<flux_persistence::StoreError> for ApiError {
    fn from(err: flux_persistence::StoreError) -> Self {
        use flux_persistence::StoreError::*;
        match err {
            NotFound { .. } => ApiError(StatusCode::NOT_FOUND, ErrorResponse::new(err.to_string())),
            Duplicate { .. } => ApiError(StatusCode::CONFLICT, ErrorResponse::new(err.to_string())),
            Locked | Conflict { .. } => ApiError(StatusCode::CONFLICT, ErrorResponse::new(err.to_string())),
            Database(_) => {
                tracing::error!(error = %err, "store error");
                ApiError(StatusCode::INTERNAL_SERVER_ERROR, ErrorResponse::new("internal error"))
            }
        }
    }
}

impl From<flux_spec::ValidationError> for ApiError {
    fn from(err: flux_spec::ValidationError) -> Self {
        ApiError(StatusCode::UNPROCESSABLE_ENTITY, ErrorResponse::with_token(err.to_string(), err.token))
    }
}

impl From<flux_spec::SpecError> for ApiError {
    fn from(err: flux_spec::SpecError) -> Self {
        ApiError(StatusCode::BAD_REQUEST, ErrorResponse::new(err.to_string()))
    }
}

impl From<flux_requests::OperationError> for ApiError {
    fn from(err: flux_requests::OperationError) -> Self {
        use flux_requests::OperationError::*;
        match err {
            Store(inner) => inner.into(),
            other => ApiError(StatusCode::UNPROCESSABLE_ENTITY, ErrorResponse::new(other.to_string())),
        }
    }
}

impl From<flux_engine::EngineError> for ApiError {
    fn from(err: flux_engine::EngineError) -> Self {
        use flux_engine::EngineError::*;
        match err {
            Store(inner) => inner.into(),
            Spec(inner) => inner.into(),
            UnknownOperation(_) | UnknownStep(_) | Invalid(_) => {
                ApiError(StatusCode::UNPROCESSABLE_ENTITY, ErrorResponse::new(err.to_string()))
            }
            Dispatch(_) | Fatal(_) | Interpolation(_) => {
                tracing::error!(error = %err, "engine error");
                ApiError(StatusCode::INTERNAL_SERVER_ERROR, ErrorResponse::new("internal error"))
            }
        }
    }
}

impl From<flux_coordinator::CoordinatorError> for ApiError {
    fn from(err: flux_coordinator::CoordinatorError) -> Self {
        use flux_coordinator::CoordinatorError::*;
        match err {
            Validation(inner) => inner.into(),
            Request(inner) => inner.into(),
            Engine(inner) => inner.into(),
            Store(inner) => inner.into(),
            Operation(token) => ApiError(StatusCode::UNPROCESSABLE_ENTITY, ErrorResponse::new(token)),
        }
    }
}
