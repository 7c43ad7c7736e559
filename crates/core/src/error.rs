//! Common error handling utilities and conventions

use serde::{Deserialize, Serialize};

/// Standard result type for core operations
pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Core error types that can be shared across crates
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum CoreError {
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Invalid token: {message}")]
    InvalidToken { message: String },
}

impl CoreError {
    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an invalid token error
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

/// How a failure should be presented to the user.
///
/// Nothing is fatal: every category degrades to an inline message, a
/// re-login prompt, a cool-down banner or a dismissible toast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Bad input, shown next to the offending field
    Validation,
    /// Credentials missing, expired or rejected; leads back to login
    Authentication,
    /// HTTP 429; automatic fetches pause for a cool-down window
    RateLimit,
    /// Transport failure (connect, timeout, TLS)
    Network,
    /// Anything else the server reported
    Server,
}

impl ErrorCategory {
    /// Whether the user has to sign in again to recover
    pub fn requires_login(self) -> bool {
        matches!(self, Self::Authentication)
    }

    /// Whether retrying the same call later may succeed
    pub fn is_transient(self) -> bool {
        matches!(self, Self::RateLimit | Self::Network)
    }
}
