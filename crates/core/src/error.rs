//! Error types for the installed apps bridge
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// Main error type for the bridge
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Package error: {0}")]
    Package(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Context is null")]
    Detached,
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

impl BridgeError {
    /// Wire code reported to the caller of the method channel
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::Extraction(_) => "EXTRACTION_ERROR",
            BridgeError::NotFound(_) => "NOT_FOUND",
            BridgeError::InvalidArguments(_) | BridgeError::Json(_) => "INVALID_ARGUMENTS",
            _ => "ERROR",
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            BridgeError::Io(e) => format!("File operation failed: {}", e),
            BridgeError::Config(msg) => format!("Configuration error: {}", msg),
            BridgeError::NotFound(msg) => format!("Not found: {}", msg),
            BridgeError::Extraction(msg) => format!("Failed to extract APK: {}", msg),
            _ => self.to_string(),
        }
    }
}
