use thiserror::Error;

/// Errors that make it out of the crate
///
/// Upstream failures are recovered inside the fetchers and never show up
/// here. What's left is bad configuration and local I/O.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid repo filter: {0}")]
    InvalidFilter(String),

    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Cache operation failed: {0}")]
    CacheError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<relwatch_api::ApiError> for Error {
    fn from(err: relwatch_api::ApiError) -> Self {
        Error::ApiError(err.to_string())
    }
}

impl From<relwatch_cache::CacheError> for Error {
    fn from(err: relwatch_cache::CacheError) -> Self {
        Error::CacheError(err.to_string())
    }
}

impl Error {
    /// True for the failures a user fixes by editing their config
    pub fn is_config(&self) -> bool {
        matches!(self, Error::ConfigError(_) | Error::InvalidFilter(_))
    }
}
