//! The typed error value recognized by the request pipeline.
//!
//! Application handlers signal expected failures by returning an [`ApiError`];
//! the pipeline maps its [`ErrorKind`] to an HTTP status through a fixed
//! table and renders the `{error, message, details?}` envelope. Anything the
//! pipeline cannot recognize (a panic) is collapsed to
//! `INTERNAL_SERVER_ERROR` at the transport boundary.

use axum::response::{IntoResponse, Json, Response};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed set of failure kinds with a fixed status mapping.
///
/// `InvalidData` is reserved for the pipeline itself: it marks a handler
/// return value that failed the resource's declared response schema. That is
/// a bug in the consuming application, not client input, but it is still
/// surfaced as 400 so the two stay distinguishable from `INVALID_INPUT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    Unauthorized,
    Forbidden,
    Conflict,
    InternalServerError,
    InvalidData,
}

impl ErrorKind {
    pub fn status_code(self) -> StatusCode {
        match self {
            ErrorKind::InvalidInput | ErrorKind::InvalidData => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A recognized failure: kind, human-readable message, optional structured
/// details (e.g. a validation issue list). The status code is always derived
/// from the kind and is never independently settable.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    kind: ErrorKind,
    message: String,
    details: Option<Value>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalServerError, message)
    }

    /// Attach a structured details payload.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    pub fn status_code(&self) -> StatusCode {
        self.kind.status_code()
    }
}

/// Wire envelope for failures. `details` is omitted entirely when absent,
/// never serialized as `null`.
#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorKind,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ErrorBody {
            error: self.kind,
            message: &self.message,
            details: self.details.as_ref(),
        });
        (status, body).into_response()
    }
}
