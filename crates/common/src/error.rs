//! Error types for the PiCanvas harness

use thiserror::Error;

/// Result type alias using the harness Error
pub type Result<T> = std::result::Result<T, Error>;

/// Harness error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config write error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown tenant '{0}'")]
    UnknownTenant(String),

    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Timed out after {seconds}s waiting for {what}")]
    Timeout { what: String, seconds: u64 },

    #[error("Cannot proceed waiting for {what}: {reason}")]
    Unrecoverable { what: String, reason: String },
}
