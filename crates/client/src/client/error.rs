//! Client error types

use crate::session::storage::StorageError;
use safawinet_core::{ErrorCategory, ValidationErrors};
use std::time::Duration;
use thiserror::Error;

/// Client error types
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or request error
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Server returned an error status
    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// The server rejected the credentials
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Token refresh failed and the session was cleared
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// No session is present for an authenticated call
    #[error("Not signed in")]
    NotAuthenticated,

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Field-level validation failures, local or reported by the server
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    /// HTTP 429
    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    /// The envelope said `success: false` on a 2xx response
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// The envelope carried no `data` where some was expected
    #[error("Response is missing data")]
    MissingData,

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Session persistence failed
    #[error("Session storage error: {0}")]
    Storage(#[from] StorageError),

    /// Real-time channel failure
    #[error("WebSocket error: {0}")]
    WebSocket(String),
}

impl ClientError {
    /// Create error from HTTP status code
    pub fn from_status(
        status: reqwest::StatusCode,
        message: String,
        retry_after: Option<Duration>,
    ) -> Self {
        match status.as_u16() {
            400 => Self::BadRequest(message),
            401 => Self::AuthenticationFailed(message),
            403 => Self::Forbidden(message),
            404 => Self::NotFound(message),
            429 => Self::RateLimited {
                message,
                retry_after,
            },
            _ => Self::ServerError {
                status: status.as_u16(),
                message,
            },
        }
    }

    /// Whether the access token was rejected (HTTP 401)
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthenticationFailed(_))
    }

    /// How the failure should be presented
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) | Self::BadRequest(_) => ErrorCategory::Validation,
            Self::AuthenticationFailed(_) | Self::SessionExpired(_) | Self::NotAuthenticated => {
                ErrorCategory::Authentication
            }
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::Request(_) | Self::WebSocket(_) => ErrorCategory::Network,
            Self::ServerError { .. }
            | Self::NotFound(_)
            | Self::Forbidden(_)
            | Self::Rejected(_)
            | Self::MissingData
            | Self::Serialization(_)
            | Self::Configuration(_)
            | Self::Storage(_) => ErrorCategory::Server,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_mapping() {
        let err = ClientError::from_status(StatusCode::UNAUTHORIZED, "expired".into(), None);
        assert!(err.is_auth_expired());
        assert_eq!(err.category(), ErrorCategory::Authentication);

        let err = ClientError::from_status(
            StatusCode::TOO_MANY_REQUESTS,
            "slow down".into(),
            Some(Duration::from_secs(30)),
        );
        match &err {
            ClientError::RateLimited { retry_after, .. } => {
                assert_eq!(*retry_after, Some(Duration::from_secs(30)));
            }
            other => panic!("Expected RateLimited, got {other:?}"),
        }
        assert_eq!(err.category(), ErrorCategory::RateLimit);

        let err = ClientError::from_status(StatusCode::BAD_GATEWAY, "upstream".into(), None);
        assert!(matches!(err, ClientError::ServerError { status: 502, .. }));
    }

    #[test]
    fn test_session_expired_requires_login() {
        let err = ClientError::SessionExpired("refresh rejected".into());
        assert!(err.category().requires_login());
        assert!(!err.is_auth_expired());
    }
}
