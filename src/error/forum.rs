use super::IsRetryable;
use reqwest::StatusCode;
use thiserror::Error as ThisError;

/// Errors from the forum listing API.
#[derive(Debug, ThisError)]
pub enum ForumError {
    /// HTTP 429 or an explicit "ratelimit" marker in the response body.
    /// The harvester reacts by cooling the offending credential.
    #[error("Forum rate limit hit")]
    RateLimited,

    /// Token fetch rejected (bad client id/secret or account password).
    #[error("Forum authentication failed: {0}")]
    AuthRejected(String),

    #[error("Forum upstream status: {0}")]
    UpstreamStatus(StatusCode),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
}

impl ForumError {
    /// Whether this error should cool the credential that produced it.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ForumError::RateLimited)
            || matches!(
                self,
                ForumError::UpstreamStatus(status) if *status == StatusCode::TOO_MANY_REQUESTS
            )
    }
}

impl IsRetryable for ForumError {
    fn is_retryable(&self) -> bool {
        match self {
            ForumError::Reqwest(_) => true,
            ForumError::UpstreamStatus(status) => status.is_server_error(),
            // Rate limits are handled by credential rotation, not blind retry.
            ForumError::RateLimited => false,
            ForumError::AuthRejected(_) | ForumError::Json(_) | ForumError::Url(_) => false,
        }
    }
}
