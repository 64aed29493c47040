// src/error.rs
use crate::llm_client::LlmError;
use crate::relay::RelayError;
use crate::storage::StorageError;
use crate::transcript::TranscriptError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Errors surfaced by HTTP handlers. Every variant renders as
/// `{"error": "<message>"}` with the matching status code.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A required field is missing or malformed.
    #[error("{0}")]
    Validation(String),

    /// Character, chat or message index does not exist.
    #[error("{0}")]
    NotFound(String),

    /// A character with the same id already exists.
    #[error("{0}")]
    Conflict(String),

    /// The completion endpoint was unreachable, failed or answered nonsense.
    #[error("{0}")]
    Upstream(String),

    /// Reading, writing or decoding a file failed.
    #[error("{0}")]
    Persistence(String),

    #[error("{0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Maps a storage failure, naming the missing thing with `not_found`.
    pub fn from_storage(err: StorageError, not_found: &str) -> Self {
        match err {
            StorageError::NotFound(_) => AppError::NotFound(not_found.to_string()),
            other => AppError::Persistence(other.to_string()),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Upstream(_) | AppError::Persistence(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Unparseable, mistyped or non-JSON bodies are validation failures.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<TranscriptError> for AppError {
    fn from(err: TranscriptError) -> Self {
        AppError::NotFound(err.to_string())
    }
}

impl From<LlmError> for AppError {
    fn from(err: LlmError) -> Self {
        AppError::Upstream(err.to_string())
    }
}

impl From<RelayError> for AppError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::Upstream(e) => e.into(),
            RelayError::Commit(e) => AppError::Persistence(format!("Failed to save chat history: {}", e)),
            e @ RelayError::InvalidTransition { .. } => AppError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }

        (status, axum::Json(json!({ "error": self.to_string() }))).into_response()
    }
}
