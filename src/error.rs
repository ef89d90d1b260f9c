//! Error types for turnstile.

use thiserror::Error;

/// Main error type for turnstile operations.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// Limiter parameters that cannot produce a meaningful limiter
    #[error("Invalid limiter parameters: {0}")]
    InvalidLimiter(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Report serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
