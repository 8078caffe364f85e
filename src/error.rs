//! Error types for the signup guard.

use thiserror::Error;

/// Main error type for signup guard operations.
#[derive(Error, Debug)]
pub enum GuardError {
    /// A policy row has a non-positive limit or window. Fatal at startup.
    #[error("Policy misconfigured: {0}")]
    PolicyMisconfigured(String),

    /// The counter store could not be reached, timed out, or answered with
    /// something we could not interpret.
    #[error("Counter store unavailable: {0}")]
    StoreUnavailable(String),

    /// An empty source address or identity was handed to the guard.
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GuardError {
    /// Whether this error should be resolved by failing open.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, GuardError::StoreUnavailable(_))
    }
}

impl From<redis::RedisError> for GuardError {
    fn from(err: redis::RedisError) -> Self {
        GuardError::StoreUnavailable(err.to_string())
    }
}

impl From<config::ConfigError> for GuardError {
    fn from(err: config::ConfigError) -> Self {
        GuardError::Config(err.to_string())
    }
}

/// Result type alias for signup guard operations.
pub type Result<T> = std::result::Result<T, GuardError>;
