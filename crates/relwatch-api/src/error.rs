use thiserror::Error;

/// Everything that can go wrong talking to an upstream
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Kept apart from `RequestFailed` so callers can log when the quota comes back
    #[error("API rate limit exceeded. Resets at: {reset_at}")]
    RateLimitExceeded { reset_at: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication required")]
    AuthRequired,

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    ParseError(#[from] serde_json::Error),
}

impl ApiError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ApiError::RateLimitExceeded { .. })
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
