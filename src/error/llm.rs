use super::IsRetryable;
use reqwest::StatusCode;
use thiserror::Error as ThisError;

/// Errors from the chat/embeddings provider.
///
/// Parse failures of model *output* are deliberately absent: stages treat
/// malformed verdicts as stage-level defaults, never as transport errors.
#[derive(Debug, ThisError)]
pub enum LlmError {
    #[error("LLM upstream status: {0}")]
    UpstreamStatus(StatusCode),

    #[error("LLM returned an empty response")]
    EmptyResponse,

    #[error("Embedding dimension mismatch: expected {expected}, got {got}")]
    EmbeddingDimension { expected: usize, got: usize },

    #[error("Invalid LLM configuration: {0}")]
    Config(String),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IsRetryable for LlmError {
    fn is_retryable(&self) -> bool {
        match self {
            LlmError::Reqwest(_) => true,
            LlmError::UpstreamStatus(status) => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            LlmError::EmptyResponse => true,
            LlmError::Config(_) | LlmError::EmbeddingDimension { .. } | LlmError::Json(_) => false,
        }
    }
}
