//! API errors and their HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use agentrun_core::CoreError;
use agentrun_store::StoreError;

use crate::http::responses::ErrorResponse;
use crate::service::ServiceError;
use crate::webhook::DispatchError;

/// API errors with HTTP status codes.
#[derive(Debug)]
pub enum ApiError {
    // Client errors (4xx)
    /// Malformed or invalid request.
    BadRequest { message: String },
    /// Missing caller identity.
    Unauthorized,
    /// Resource missing or owned by someone else.
    NotFound { message: String },
    /// Resource in the wrong state for the request.
    Conflict { message: String },

    // Server errors (5xx)
    /// Queue or store unreachable.
    Unavailable { message: String },
    /// Internal server error.
    Internal { message: String },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest { message } => (StatusCode::BAD_REQUEST, message),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Missing X-User-Id header".to_string(),
            ),
            ApiError::NotFound { message } => (StatusCode::NOT_FOUND, message),
            ApiError::Conflict { message } => (StatusCode::CONFLICT, message),
            ApiError::Unavailable { message } => (StatusCode::SERVICE_UNAVAILABLE, message),
            ApiError::Internal { message } => {
                error!(error = %message, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        if e.is_not_found() {
            return ApiError::not_found(e.to_string());
        }
        match e {
            StoreError::Unavailable(message) => ApiError::Unavailable { message },
            StoreError::Core(CoreError::InvalidInput(message)) => ApiError::BadRequest { message },
            StoreError::Core(core) => ApiError::Conflict {
                message: core.to_string(),
            },
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::NotFound(_) => ApiError::not_found(e.to_string()),
            ServiceError::Conflict(message) => ApiError::Conflict { message },
            ServiceError::Broker(e) if e.is_transient() => ApiError::Unavailable {
                message: e.to_string(),
            },
            ServiceError::Broker(e) => ApiError::Internal {
                message: e.to_string(),
            },
            ServiceError::Store(e) => e.into(),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::Store(e) => e.into(),
            other => ApiError::Internal {
                message: other.to_string(),
            },
        }
    }
}
