//! Error types for a3s-metasafe

use thiserror::Error;

/// Errors that can occur while intercepting and sanitizing files
#[derive(Debug, Error)]
pub enum MetaSafeError {
    /// MIME type is not in the allow-list
    #[error("Unsupported file type '{mime_type}' for '{name}'")]
    UnsupportedType {
        name: String,
        mime_type: String,
    },

    /// File bytes could not be read
    #[error("Failed to read file '{name}': {reason}")]
    ReadFailure {
        name: String,
        reason: String,
    },

    /// Metadata stripper rejected the content
    #[error("Failed to strip metadata: {0}")]
    StripFailure(String),

    /// Metadata stripper did not finish in time
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Element does not exist in the host document
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// Element exists but does not accept files
    #[error("Element {0} is not a file input")]
    NotFileInput(String),

    /// Host document rejected an operation
    #[error("Host document error: {0}")]
    Host(String),

    /// No async runtime available to run substitutions
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for metasafe operations
pub type Result<T> = std::result::Result<T, MetaSafeError>;
