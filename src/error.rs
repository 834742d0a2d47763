//! Error types and handling for Hestia
//!
//! This module defines the error types used throughout the crate,
//! providing consistent error handling and reporting. Missing sensor
//! readings are deliberately not errors: they travel as `Option::None`
//! through the estimation pipeline and degrade single outputs instead
//! of failing a pass.

use thiserror::Error;

/// Result type alias for Hestia operations
pub type Result<T> = std::result::Result<T, HestiaError>;

/// Outcome of a device command issued through an actuator.
///
/// These are logged and recorded per device; they never abort the
/// remaining devices in a pass, and a failed command is not retried
/// until the next pass.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    /// Command did not complete within the configured timeout
    #[error("command timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// The target entity is unknown to the actuator
    #[error("entity not found: {entity}")]
    NotFound { entity: String },

    /// The actuator refused the command
    #[error("command rejected: {message}")]
    Rejected { message: String },
}

impl CommandError {
    /// Create a new timeout outcome
    pub fn timeout(seconds: u64) -> Self {
        CommandError::Timeout { seconds }
    }

    /// Create a new not-found outcome
    pub fn not_found<S: Into<String>>(entity: S) -> Self {
        CommandError::NotFound {
            entity: entity.into(),
        }
    }

    /// Create a new rejected outcome
    pub fn rejected<S: Into<String>>(message: S) -> Self {
        CommandError::Rejected {
            message: message.into(),
        }
    }
}

/// Main error type for Hestia
#[derive(Debug, Error)]
pub enum HestiaError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Timer-state persistence errors
    #[error("Persistence error: {message}")]
    Persistence { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Device command errors
    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl HestiaError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        HestiaError::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        HestiaError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new persistence error
    pub fn persistence<S: Into<String>>(message: S) -> Self {
        HestiaError::Persistence {
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        HestiaError::Io {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        HestiaError::Generic {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for HestiaError {
    fn from(err: std::io::Error) -> Self {
        HestiaError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for HestiaError {
    fn from(err: serde_yaml::Error) -> Self {
        HestiaError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for HestiaError {
    fn from(err: serde_json::Error) -> Self {
        HestiaError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<chrono::ParseError> for HestiaError {
    fn from(err: chrono::ParseError) -> Self {
        HestiaError::validation("datetime", &err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = HestiaError::config("test config error");
        assert!(matches!(err, HestiaError::Config { .. }));

        let err = HestiaError::persistence("test persistence error");
        assert!(matches!(err, HestiaError::Persistence { .. }));

        let err = HestiaError::validation("field", "test validation error");
        assert!(matches!(err, HestiaError::Validation { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = HestiaError::config("test error");
        let error_string = format!("{}", err);
        assert_eq!(error_string, "Configuration error: test error");

        let err = HestiaError::validation("devices", "no water device");
        let error_string = format!("{}", err);
        assert_eq!(error_string, "Validation error: devices - no water device");
    }

    #[test]
    fn test_command_error_display() {
        assert_eq!(
            CommandError::timeout(5).to_string(),
            "command timed out after 5s"
        );
        assert_eq!(
            CommandError::not_found("climate.hp1").to_string(),
            "entity not found: climate.hp1"
        );
        assert_eq!(
            CommandError::rejected("unsupported mode").to_string(),
            "command rejected: unsupported mode"
        );
    }

    #[test]
    fn test_command_error_converts() {
        let err: HestiaError = CommandError::timeout(5).into();
        assert!(matches!(err, HestiaError::Command(_)));
        assert_eq!(err.to_string(), "Command error: command timed out after 5s");
    }
}
