//! Error types for Veritag

use thiserror::Error;

/// Result type alias for Veritag operations
pub type Result<T> = std::result::Result<T, VeritagError>;

/// Main error type for Veritag
#[derive(Error, Debug)]
pub enum VeritagError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}
