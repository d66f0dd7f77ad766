//! Error types for persevere
//!
//! The retry loop never produces errors of its own: it hands back whatever
//! the operation returned. These errors only come out of policy loading.

use thiserror::Error;

/// Result type alias using persevere's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Policy configuration errors
#[derive(Error, Debug)]
pub enum Error {
    /// Policy file not found
    #[error("Retry policy file not found: {path}")]
    ConfigNotFound { path: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml_ng::Error),

    /// A policy that cannot be turned into a working limiter or timer
    #[error("Invalid retry policy: {message}")]
    InvalidPolicy { message: String },
}

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    /// Create an invalid policy error
    pub fn invalid_policy(message: impl Into<String>) -> Self {
        Self::InvalidPolicy {
            message: message.into(),
        }
    }
}
