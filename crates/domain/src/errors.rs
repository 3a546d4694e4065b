//! Error types used throughout the application

use thiserror::Error;

/// Main error type for CalBridge
#[derive(Error, Debug)]
pub enum CalBridgeError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for CalBridge operations
pub type Result<T> = std::result::Result<T, CalBridgeError>;
