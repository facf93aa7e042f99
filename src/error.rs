//! Error types for the Burstgate service.

use thiserror::Error;

/// Main error type for Burstgate operations.
#[derive(Error, Debug)]
pub enum BurstgateError {
    /// Configuration could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration was parsed but violates a limiter invariant
    #[error("Invalid rate limiter configuration: {0}")]
    InvalidConfig(String),

    /// Rate limiting errors
    #[error("Rate limit error: {0}")]
    RateLimit(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<::config::ConfigError> for BurstgateError {
    fn from(err: ::config::ConfigError) -> Self {
        BurstgateError::Config(err.to_string())
    }
}

/// Result type alias for Burstgate operations.
pub type Result<T> = std::result::Result<T, BurstgateError>;
