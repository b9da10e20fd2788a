//! Error types for the discovery engine
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for discovery operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the discovery engine
#[derive(Error, Debug)]
pub enum Error {
    /// Service browser errors (lookup could not be performed)
    #[error("Service browser error: {0}")]
    Browser(String),

    /// Output writer errors (commit failed)
    #[error("Output error: {0}")]
    Output(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Encoding an aggregate into its wire format failed
    #[error("Encode error: {0}")]
    Encode(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The surrounding cancellation token fired
    #[error("Operation cancelled")]
    Cancelled,

    /// The scheduler was started twice
    #[error("Discovery engine is already running")]
    AlreadyRunning,
}

impl Error {
    /// Create a service browser error
    pub fn browser(msg: impl Into<String>) -> Self {
        Self::Browser(msg.into())
    }

    /// Create an output error
    pub fn output(msg: impl Into<String>) -> Self {
        Self::Output(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an encode error
    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    /// Whether this error is the cancellation signal rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
