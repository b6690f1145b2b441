//! HTTP error types.
//!
//! Maps domain errors onto JSON error responses. Validation failures carry
//! the full list of violation descriptions in the `detail` field.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

use aegis_core::{CompileError, PolicyError};
use aegis_storage::StorageError;

/// Application-level error returned from HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// Client sent a body that is not valid JSON or not valid data.
    BadRequest(String),
    /// The body failed schema validation; one entry per violation.
    SchemaViolation(Vec<String>),
    /// Requested principal not found.
    NotFound,
    /// Internal server error. The detail is logged, not returned.
    Internal(String),
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    status: &'static str,
    code: u16,
    detail: Vec<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, text, detail) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "Bad Request", vec![msg]),
            Self::SchemaViolation(violations) => {
                (StatusCode::BAD_REQUEST, "Bad Request", violations)
            }
            Self::NotFound => (StatusCode::NOT_FOUND, "Not Found", Vec::new()),
            Self::Internal(msg) => {
                error!(detail = %msg, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error",
                    Vec::new(),
                )
            }
        };

        let body = ErrorBody {
            status: text,
            code: status.as_u16(),
            detail,
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<CompileError> for AppError {
    fn from(err: CompileError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<PolicyError> for AppError {
    fn from(err: PolicyError) -> Self {
        Self::BadRequest(err.to_string())
    }
}
