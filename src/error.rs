use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for kbflow
#[derive(Error, Debug)]
pub enum KbError {
    /// Missing or malformed caller input (strategy params, names, ranges)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Lookup miss on an operation that requires the entity to exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Project lifecycle rule violation
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    /// Vector store or relational store unreachable
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Caller-imposed deadline exceeded while waiting on an upstream
    #[error("Timed out after {millis}ms waiting for {operation}")]
    Timeout { operation: String, millis: u64 },

    /// Unexpected failure inside the core
    #[error("Internal error: {0}")]
    Internal(String),

    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection pool errors
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

impl KbError {
    /// Shorthand for a missing project
    pub fn project_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "Project",
            id: id.into(),
        }
    }

    /// Collapse the error onto the user-facing taxonomy
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidInput(_)
            | Self::ConfigValidation { .. }
            | Self::InvalidConfigValue { .. } => ErrorCode::InvalidInput,
            Self::NotFound { .. } | Self::ConfigNotFound { .. } => ErrorCode::NotFound,
            Self::InvalidStateTransition { .. } => ErrorCode::InvalidStateTransition,
            Self::UpstreamUnavailable(_)
            | Self::Timeout { .. }
            | Self::Database(_)
            | Self::Pool(_) => ErrorCode::UpstreamUnavailable,
            Self::Internal(_)
            | Self::Config(_)
            | Self::Io { .. }
            | Self::Toml(_)
            | Self::TomlSerialization(_)
            | Self::Json { .. } => ErrorCode::InternalError,
        }
    }
}

/// Error taxonomy surfaced to callers of the tool operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidInput,
    NotFound,
    InvalidStateTransition,
    UpstreamUnavailable,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::NotFound => "not_found",
            Self::InvalidStateTransition => "invalid_state_transition",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for kbflow operations
pub type Result<T> = std::result::Result<T, KbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            KbError::InvalidInput("x".into()).code(),
            ErrorCode::InvalidInput
        );
        assert_eq!(
            KbError::project_not_found("abc").code(),
            ErrorCode::NotFound
        );
        assert_eq!(
            KbError::Timeout {
                operation: "vector search".into(),
                millis: 10
            }
            .code(),
            ErrorCode::UpstreamUnavailable
        );
        assert_eq!(
            KbError::Database(rusqlite::Error::QueryReturnedNoRows).code(),
            ErrorCode::UpstreamUnavailable
        );
    }

    #[test]
    fn test_error_code_serialization() {
        let json = serde_json::to_string(&ErrorCode::InvalidStateTransition).unwrap();
        assert_eq!(json, "\"invalid_state_transition\"");
        assert_eq!(ErrorCode::InternalError.to_string(), "internal_error");
    }

    #[test]
    fn test_not_found_message() {
        let err = KbError::project_not_found("p-1");
        assert_eq!(err.to_string(), "Project not found: p-1");
    }
}
