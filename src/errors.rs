use crate::services::{
    checksum_relay::RelayError, document_store::DocumentStoreError, object_store::ObjectStoreError,
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Outcomes the feed services report to their callers.
#[derive(Debug, Error)]
pub enum FeedError {
    /// A uniqueness rule rejected the write (e.g. username taken).
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("validation failed: {0}")]
    ValidationFailed(String),
    /// The client or server aborted an in-flight upload.
    #[error("upload cancelled after {bytes} bytes")]
    Cancelled { bytes: u64 },
    /// Something assumed impossible was observed.
    #[error("data integrity violation: {0}")]
    DataIntegrityViolation(String),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type FeedResult<T> = Result<T, FeedError>;

impl From<DocumentStoreError> for FeedError {
    fn from(err: DocumentStoreError) -> Self {
        match err {
            DocumentStoreError::Conflict { .. } => FeedError::Conflict(err.to_string()),
            DocumentStoreError::NotFound { id, .. } => FeedError::NotFound(format!("document `{id}`")),
            // Retries already happened in the gateway.
            DocumentStoreError::Transient { .. } => FeedError::Internal(err.to_string()),
            DocumentStoreError::Malformed(_)
            | DocumentStoreError::Json(_)
            | DocumentStoreError::Sqlx(_) => FeedError::Internal(err.to_string()),
        }
    }
}

impl From<ObjectStoreError> for FeedError {
    fn from(err: ObjectStoreError) -> Self {
        match err {
            ObjectStoreError::NotFound(name) => FeedError::NotFound(format!("object `{name}`")),
            ObjectStoreError::InvalidName(_) => FeedError::ValidationFailed(err.to_string()),
            ObjectStoreError::Io(_) => FeedError::Internal(err.to_string()),
        }
    }
}

impl From<RelayError> for FeedError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::Cancelled { bytes } => FeedError::Cancelled { bytes },
            // The body stream only fails when the client goes away mid-upload.
            RelayError::Source { bytes, .. } => FeedError::Cancelled { bytes },
            RelayError::Sink { .. } => FeedError::Internal(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::Internal(err.to_string())
    }
}

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
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
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<FeedError> for AppError {
    fn from(err: FeedError) -> Self {
        let status = match &err {
            FeedError::Conflict(_) => StatusCode::CONFLICT,
            FeedError::NotFound(_) => StatusCode::NOT_FOUND,
            FeedError::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            // 499: client closed request.
            FeedError::Cancelled { .. } => {
                StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST)
            }
            FeedError::DataIntegrityViolation(_) | FeedError::Internal(_) => {
                tracing::error!(error = %err, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        AppError::new(status, err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = %err, "request failed");
        AppError::new(StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
    }
}
