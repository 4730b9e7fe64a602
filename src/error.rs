//! Error types and handling for Ladning
//!
//! This module defines the error taxonomy used throughout the application.
//! The control loop reacts to the class of an error rather than to its
//! message: `Transient` errors are retried with backoff, `AuthExpired`
//! triggers one forced refresh, `ReauthRequired` skips the cycle and
//! `Permanent` fails it.

use thiserror::Error;

/// Result type alias for Ladning operations
pub type Result<T> = std::result::Result<T, LadningError>;

/// Main error type for Ladning
#[derive(Debug, Error)]
pub enum LadningError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Token cache unreadable, malformed or not writable
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// No valid or refreshable credential; an operator has to authenticate
    #[error("Re-authentication required for {provider}: {message}")]
    ReauthRequired { provider: String, message: String },

    /// Credential rejected by the vendor in the middle of a call
    #[error("Credential rejected: {message}")]
    AuthExpired { message: String },

    /// Network failure, timeout, 5xx or rate limit
    #[error("Transient error: {message}")]
    Transient { message: String },

    /// Vendor rejected the request on logical grounds
    #[error("Permanent error: {message}")]
    Permanent { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Status server could not bind or stopped serving
    #[error("Web server error: {message}")]
    Web { message: String },

    /// Work aborted by a shutdown request
    #[error("Cancelled: {message}")]
    Cancelled { message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl LadningError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        LadningError::Config {
            message: message.into(),
        }
    }

    /// Create a new storage error
    pub fn storage<S: Into<String>>(message: S) -> Self {
        LadningError::Storage {
            message: message.into(),
        }
    }

    /// Create a new re-authentication error for a provider
    pub fn reauth_required<P: Into<String>, S: Into<String>>(provider: P, message: S) -> Self {
        LadningError::ReauthRequired {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a new expired/rejected credential error
    pub fn auth_expired<S: Into<String>>(message: S) -> Self {
        LadningError::AuthExpired {
            message: message.into(),
        }
    }

    /// Create a new transient error
    pub fn transient<S: Into<String>>(message: S) -> Self {
        LadningError::Transient {
            message: message.into(),
        }
    }

    /// Create a new permanent error
    pub fn permanent<S: Into<String>>(message: S) -> Self {
        LadningError::Permanent {
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        LadningError::Io {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        LadningError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new web error
    pub fn web<S: Into<String>>(message: S) -> Self {
        LadningError::Web {
            message: message.into(),
        }
    }

    /// Create a new cancellation error
    pub fn cancelled<S: Into<String>>(message: S) -> Self {
        LadningError::Cancelled {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        LadningError::Generic {
            message: message.into(),
        }
    }

    /// Eligible for backoff retry
    pub fn is_transient(&self) -> bool {
        matches!(self, LadningError::Transient { .. })
    }

    /// Credential was rejected mid-call
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, LadningError::AuthExpired { .. })
    }

    /// Operator action needed before the provider can be used again
    pub fn is_reauth_required(&self) -> bool {
        matches!(self, LadningError::ReauthRequired { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, LadningError::Cancelled { .. })
    }
}

impl From<std::io::Error> for LadningError {
    fn from(err: std::io::Error) -> Self {
        LadningError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for LadningError {
    fn from(err: serde_yaml::Error) -> Self {
        LadningError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for LadningError {
    fn from(err: serde_json::Error) -> Self {
        LadningError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<chrono::ParseError> for LadningError {
    fn from(err: chrono::ParseError) -> Self {
        LadningError::validation("datetime".to_string(), err.to_string())
    }
}

impl From<reqwest::Error> for LadningError {
    fn from(err: reqwest::Error) -> Self {
        // Timeouts, connect and body errors never produced a usable response
        if err.is_decode() {
            LadningError::permanent(format!("Unexpected response body: {}", err))
        } else {
            LadningError::transient(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = LadningError::config("test config error");
        assert!(matches!(err, LadningError::Config { .. }));

        let err = LadningError::storage("bad cache");
        assert!(matches!(err, LadningError::Storage { .. }));

        let err = LadningError::validation("field", "test validation error");
        assert!(matches!(err, LadningError::Validation { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = LadningError::reauth_required("tesla", "no cached token");
        assert_eq!(
            err.to_string(),
            "Re-authentication required for tesla: no cached token"
        );

        let err = LadningError::validation("test_field", "invalid value");
        assert_eq!(err.to_string(), "Validation error: test_field - invalid value");
    }

    #[test]
    fn test_classification() {
        assert!(LadningError::transient("429").is_transient());
        assert!(!LadningError::permanent("404").is_transient());
        assert!(LadningError::auth_expired("401").is_auth_expired());
        assert!(LadningError::reauth_required("easee", "x").is_reauth_required());
        assert!(LadningError::cancelled("shutdown").is_cancelled());
    }
}
