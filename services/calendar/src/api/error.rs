//! API error types and helpers.
//!
//! # Purpose and responsibility
//! Keeps error bodies uniform across calendar endpoints and translates ledger
//! failures into HTTP responses.
//!
//! # Key invariants and assumptions
//! - Error responses carry a stable `code` and a human-readable `message`.
//! - Store failures are logged server-side and answered with a generic message.
use crate::api::types::ErrorResponse;
use crate::ledger::LedgerError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;

/// Structured API error returned by handlers.
///
/// # Example
/// ```rust
/// use axum::http::StatusCode;
/// use calendar::api::error::ApiError;
/// use calendar::api::types::ErrorResponse;
///
/// let err = ApiError {
///     status: StatusCode::NOT_FOUND,
///     body: ErrorResponse {
///         code: "not_found".to_string(),
///         message: "missing".to_string(),
///         request_id: None,
///     },
/// };
/// ```
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn api_error(status: StatusCode, code: &str, message: &str) -> ApiError {
    ApiError {
        status,
        body: ErrorResponse {
            code: code.to_string(),
            message: message.to_string(),
            request_id: None,
        },
    }
}

pub fn api_not_found(message: &str) -> ApiError {
    api_error(StatusCode::NOT_FOUND, "not_found", message)
}

pub fn api_validation_error(message: &str) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, "validation_error", message)
}

/// 500 without an underlying error to log.
pub fn api_internal_message(message: &str) -> ApiError {
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

/// Maps a ledger failure onto a status code.
///
/// `message` is only used for store failures, whose details stay in the log.
pub fn api_ledger(message: &str, err: LedgerError) -> ApiError {
    match err {
        LedgerError::NotFound(_) => api_not_found(&err.to_string()),
        LedgerError::Validation(reason) => api_validation_error(&reason),
        LedgerError::EventVanished(id) => {
            tracing::warn!(event_id = id, "update targeted unknown event");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "event_not_found",
                &err.to_string(),
            )
        }
        LedgerError::Store(store) => {
            tracing::error!(error = ?store, "calendar storage error");
            api_internal_message(message)
        }
    }
}
