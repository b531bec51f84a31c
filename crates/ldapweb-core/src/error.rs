//! Error types for directory account operations.
//!
//! Every failure the library can report is one of a small set of kinds so the embedding HTTP
//! layer can render it without inspecting directory protocol details. Messages never carry
//! passwords.

use serde::Serialize;
use thiserror::Error;

/// Message surfaced for every rejected bind.
pub const WRONG_CREDENTIALS: &str = "wrong username or password";

/// Main error type for directory account operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The directory server could not be reached or the transport failed
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The directory server rejected the bind
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// Client-supplied input failed a local precondition
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The directory server rejected a search, modify or password change
    #[error("Directory operation `{operation}` failed: {message}")]
    DirectoryOperationError {
        /// Operation that failed
        operation: String,
        /// Reason reported by the server
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Specialized result type for directory account operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Structured error response for serialization.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorResponse {
    /// Error details
    pub error: ErrorDetail,
    /// Optional request ID for tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Error detail structure.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorDetail {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Additional error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl Error {
    /// Builds the error reported for any rejected bind.
    #[must_use]
    pub fn wrong_credentials() -> Self {
        Self::AuthenticationError(WRONG_CREDENTIALS.to_string())
    }

    /// Builds a [`Error::DirectoryOperationError`] for the named operation.
    #[must_use]
    pub fn operation(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DirectoryOperationError {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ConnectionError(_) => "CONNECTION_ERROR",
            Self::AuthenticationError(_) => "AUTHENTICATION_ERROR",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::DirectoryOperationError { .. } => "DIRECTORY_OPERATION_ERROR",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns true if the caller may retry the same request.
    ///
    /// Only transport failures qualify. Retrying a rejected bind with the same credentials
    /// only moves the account closer to a lockout.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectionError(_))
    }

    /// Converts the error into an `ErrorResponse`.
    #[must_use]
    pub fn into_error_response(self) -> ErrorResponse {
        self.into_error_response_with_id(None)
    }

    /// Converts the error into an `ErrorResponse` with a request ID.
    #[must_use]
    pub fn into_error_response_with_id(self, request_id: Option<String>) -> ErrorResponse {
        let details = match &self {
            Self::DirectoryOperationError { operation, .. } => {
                Some(serde_json::json!({ "operation": operation }))
            }
            _ => None,
        };

        ErrorResponse {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.to_string(),
                details,
            },
            request_id,
        }
    }

    /// Returns true if this error should be logged as a serious error.
    #[must_use]
    pub const fn should_log(&self) -> bool {
        matches!(
            self,
            Self::InternalError(_) | Self::ConfigError(_) | Self::ConnectionError(_)
        )
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::ConfigError(format!("invalid directory URL: {err}"))
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ConfigError(err.to_string())
    }
}
