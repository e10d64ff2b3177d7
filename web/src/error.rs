//! Error types for web handlers.
//!
//! [`AppError`] bridges [`QueueError`] and HTTP responses through Axum's
//! `IntoResponse`. Storage details stay in the logs; clients only see the
//! stable `code` and a message.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use encore_core::error::{QueueError, StoreError};
use serde::Serialize;
use std::fmt;

/// Application error type for web handlers.
///
/// ```ignore
/// async fn promote(State(state): State<AppState>, ..) -> Result<Json<Vec<QueueEntry>>, AppError> {
///     Ok(Json(state.engine.promote(entry_id).await?))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    /// Shown to the client as-is
    message: String,
    code: &'static str,
    /// Logged, never serialized
    source: Option<StoreError>,
}

impl AppError {
    const fn new(status: StatusCode, message: String, code: &'static str) -> Self {
        Self {
            status,
            message,
            code,
            source: None,
        }
    }

    /// 404 for an entry that does not exist at the addressed venue.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            format!("{resource} with id {id} not found"),
            "NOT_FOUND",
        )
    }

    /// 422 for malformed input.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            message.into(),
            "VALIDATION_ERROR",
        )
    }

    /// 503, returned by the readiness probe.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            message.into(),
            "SERVICE_UNAVAILABLE",
        )
    }

    /// Storage failure with a generic message.
    fn storage(source: StoreError) -> Self {
        Self {
            source: Some(source),
            ..Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "An internal error occurred".to_string(),
                "INTERNAL_SERVER_ERROR",
            )
        }
    }

    /// HTTP status this error responds with.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse<'a> {
    code: &'a str,
    message: &'a str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    error = %source,
                    "Queue storage failed"
                ),
                None => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    "Internal server error"
                ),
            }
        }

        let body = Json(ErrorResponse {
            code: self.code,
            message: &self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        let code = err.code();
        match err {
            QueueError::InvalidTransition { .. }
            | QueueError::InvariantViolation { .. }
            | QueueError::Conflict { .. } => {
                Self::new(StatusCode::CONFLICT, err.to_string(), code)
            }
            QueueError::SubmissionPaused { .. } => {
                Self::new(StatusCode::LOCKED, err.to_string(), code)
            }
            QueueError::EntryNotFound(id) => Self::not_found("Entry", id),
            QueueError::Validation(reason) => Self::validation(reason),
            QueueError::Storage(source) => Self::storage(source),
        }
    }
}
