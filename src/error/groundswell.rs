use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error as ThisError;

use super::IsRetryable;
use super::forum::ForumError;
use super::llm::LlmError;

/// Top-level service error.
#[derive(Debug, ThisError)]
pub enum GroundswellError {
    #[error(transparent)]
    Forum(#[from] ForumError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ractor error: {0}")]
    Ractor(String),

    /// Every credential in the pool is cooling and none became usable.
    #[error("No available credential")]
    NoAvailableCredential,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Pipeline failed for post {post_id}: {message}")]
    PipelineFailed { post_id: String, message: String },

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl IntoResponse for GroundswellError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match &self {
            GroundswellError::InvalidRequest(message) => (
                StatusCode::BAD_REQUEST,
                ApiErrorObject {
                    error: "INVALID_REQUEST".to_string(),
                    message: message.clone(),
                    details: None,
                },
            ),

            GroundswellError::PipelineFailed { post_id, message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorObject {
                    error: "PIPELINE_FAILED".to_string(),
                    message: message.clone(),
                    details: Some(serde_json::json!({ "postId": post_id })),
                },
            ),

            GroundswellError::NoAvailableCredential => (
                StatusCode::SERVICE_UNAVAILABLE,
                ApiErrorObject {
                    error: "NO_CREDENTIAL".to_string(),
                    message: "No available credentials to process the request.".to_string(),
                    details: None,
                },
            ),

            GroundswellError::Forum(_) | GroundswellError::Llm(_) => (
                StatusCode::BAD_GATEWAY,
                ApiErrorObject {
                    error: "UPSTREAM_ERROR".to_string(),
                    message: "Upstream service error.".to_string(),
                    details: None,
                },
            ),

            GroundswellError::Database(_)
            | GroundswellError::Json(_)
            | GroundswellError::Io(_)
            | GroundswellError::Ractor(_)
            | GroundswellError::Unexpected(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorObject {
                    error: "INTERNAL_ERROR".to_string(),
                    message: "An internal server error occurred.".to_string(),
                    details: None,
                },
            ),
        };
        (status, Json(body)).into_response()
    }
}

impl IsRetryable for GroundswellError {
    fn is_retryable(&self) -> bool {
        match self {
            GroundswellError::Forum(e) => e.is_retryable(),
            GroundswellError::Llm(e) => e.is_retryable(),
            GroundswellError::Database(_) | GroundswellError::Io(_) => true,
            GroundswellError::PipelineFailed { .. } => true,
            GroundswellError::Json(_)
            | GroundswellError::Ractor(_)
            | GroundswellError::NoAvailableCredential
            | GroundswellError::InvalidRequest(_)
            | GroundswellError::Unexpected(_) => false,
        }
    }
}

/// Standardized API error response payload (`{"error", "message", "details"?}`).
#[derive(Serialize)]
pub struct ApiErrorObject {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}
