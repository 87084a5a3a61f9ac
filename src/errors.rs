use crate::services::upload_service::{ErrorKind, UploadError};
use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for request errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub kind: ErrorKind,
    pub message: String,
    /// Underlying error text, only populated when detail exposure is on.
    pub detail: Option<String>,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: msg.into(),
            detail: None,
        }
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, ErrorKind::NotFound, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorKind::InvalidArgument, msg)
    }

    /// Convert a service error, attaching its detail only when `expose_detail` is set.
    pub fn from_upload(err: UploadError, expose_detail: bool) -> Self {
        let kind = err.kind();
        let status = match kind {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorKind::UpstreamError => StatusCode::BAD_GATEWAY,
            ErrorKind::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Internal faults keep their text out of the message.
        let message = match kind {
            ErrorKind::InternalError => "internal error".to_string(),
            _ => err.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(kind = kind.as_str(), error = %err, detail = ?err.detail(), "request failed");
        }

        Self {
            status,
            kind,
            message,
            detail: if expose_detail { err.detail() } else { None },
        }
    }
}

/// Body extraction failures are client errors.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::invalid_argument(rejection.body_text())
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": self.message,
            "kind": self.kind.as_str(),
            "status": self.status.as_u16()
        });
        if let Some(detail) = self.detail {
            body["detail"] = json!(detail);
        }

        (self.status, Json(body)).into_response()
    }
}
