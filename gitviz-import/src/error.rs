//! Error types for gitviz-import
//!
//! `BulkImportError` is the import taxonomy. Owner- and repository-level
//! variants are absorbed and recorded on the job; only input, credential and
//! catastrophic listing errors fail a job as a whole.
//!
//! `ApiError` maps failures onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Bulk import error taxonomy
#[derive(Debug, Error)]
pub enum BulkImportError {
    /// Malformed owner input; aborts the job before any work starts
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No listing credential configured; aborts before any network call
    #[error("GitHub API token is required for bulk imports")]
    MissingCredential,

    /// Owner is neither an organization nor a user; recorded per owner
    #[error("User not found")]
    OwnerNotFound(String),

    /// Owner exists but its repositories could not be listed; recorded per owner
    #[error("{message}")]
    OwnerListing { owner: String, message: String },

    /// Every clone strategy failed for one repository; recorded on the task
    #[error("Clone failed for {repository}: {message}")]
    CloneFailure { repository: String, message: String },

    /// The concurrent batch of a chunk failed as a whole
    #[error("Chunk {chunk} failed: {message}")]
    ChunkBatch { chunk: usize, message: String },

    /// Remote API failure not attributable to one owner
    #[error("Remote API error: {0}")]
    Remote(String),

    /// Repository store failure
    #[error("Store error: {0}")]
    Store(#[from] gitviz_common::Error),
}

impl BulkImportError {
    /// Whether this error fails the whole job
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BulkImportError::InvalidInput(_)
                | BulkImportError::MissingCredential
                | BulkImportError::Remote(_)
                | BulkImportError::Store(_)
        )
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),

    /// gitviz-common error
    #[error("Common error: {0}")]
    Common(#[from] gitviz_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Other(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                err.to_string(),
            ),
            ApiError::Common(gitviz_common::Error::NotFound(msg)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", msg)
            }
            ApiError::Common(gitviz_common::Error::InvalidInput(msg)) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg)
            }
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
