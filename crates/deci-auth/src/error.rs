//! Engine error types.
//!
//! Every failure the authorization engine can surface is an [`AuthError`].
//! Each variant maps to a standard OIDC error code via
//! [`AuthError::oauth_error_code`] and to a coarse [`ErrorCategory`] used for
//! logging and operator alerting.

use std::fmt;

/// Errors that can occur while driving the authorization code flow.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The request is missing a parameter or carries a malformed one.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of why the request is invalid.
        message: String,
    },

    /// Client authentication failed, or the client/redirect pair is unknown.
    ///
    /// The message never distinguishes an unknown client from a bad secret
    /// or an unregistered redirect URI.
    #[error("Invalid client: {message}")]
    InvalidClient {
        /// Description of the failure (uniform for all causes).
        message: String,
    },

    /// The client is not allowed to use the requested grant type.
    #[error("Unauthorized client: {message}")]
    UnauthorizedClient {
        /// Description of why the client is not authorized.
        message: String,
    },

    /// The authorization code or refresh token is unknown, used, expired,
    /// or failed a binding check (redirect URI, PKCE, client).
    #[error("Invalid grant: {message}")]
    InvalidGrant {
        /// Public description of the failure.
        message: String,
    },

    /// The requested scope is invalid, unknown, or malformed.
    #[error("Invalid scope: {message}")]
    InvalidScope {
        /// Description of why the scope is invalid.
        message: String,
    },

    /// The resource owner or a policy refused the request.
    #[error("Access denied: {message}")]
    AccessDenied {
        /// Description of why access was denied.
        message: String,
    },

    /// The authorization server does not support the requested response type.
    #[error("Unsupported response type: {response_type}")]
    UnsupportedResponseType {
        /// The unsupported response type.
        response_type: String,
    },

    /// The authorization server does not support the requested grant type.
    #[error("Unsupported grant type: {grant_type}")]
    UnsupportedGrantType {
        /// The unsupported grant type.
        grant_type: String,
    },

    /// The authorization request outlived its validity window.
    #[error("Authorization request expired")]
    RequestExpired,

    /// The authorization request already reached a terminal state.
    #[error("Authorization request already finalized: {message}")]
    RequestAlreadyFinalized {
        /// Description of the terminal state encountered.
        message: String,
    },

    /// A storage adapter call failed or timed out. Safe to retry.
    #[error("Storage unavailable: {message}")]
    StorageUnavailable {
        /// Description of the storage failure.
        message: String,
    },

    /// No usable signing key. Fatal to the request.
    #[error("Signing key unavailable: {message}")]
    KeyUnavailable {
        /// Description of the key failure.
        message: String,
    },

    /// The engine configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidClient` error.
    #[must_use]
    pub fn invalid_client(message: impl Into<String>) -> Self {
        Self::InvalidClient {
            message: message.into(),
        }
    }

    /// Creates a new `UnauthorizedClient` error.
    #[must_use]
    pub fn unauthorized_client(message: impl Into<String>) -> Self {
        Self::UnauthorizedClient {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidGrant` error.
    #[must_use]
    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::InvalidGrant {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidScope` error.
    #[must_use]
    pub fn invalid_scope(message: impl Into<String>) -> Self {
        Self::InvalidScope {
            message: message.into(),
        }
    }

    /// Creates a new `AccessDenied` error.
    #[must_use]
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::AccessDenied {
            message: message.into(),
        }
    }

    /// Creates a new `UnsupportedResponseType` error.
    #[must_use]
    pub fn unsupported_response_type(response_type: impl Into<String>) -> Self {
        Self::UnsupportedResponseType {
            response_type: response_type.into(),
        }
    }

    /// Creates a new `UnsupportedGrantType` error.
    #[must_use]
    pub fn unsupported_grant_type(grant_type: impl Into<String>) -> Self {
        Self::UnsupportedGrantType {
            grant_type: grant_type.into(),
        }
    }

    /// Creates a new `RequestAlreadyFinalized` error.
    #[must_use]
    pub fn already_finalized(message: impl Into<String>) -> Self {
        Self::RequestAlreadyFinalized {
            message: message.into(),
        }
    }

    /// Creates a new `StorageUnavailable` error.
    #[must_use]
    pub fn storage_unavailable(message: impl Into<String>) -> Self {
        Self::StorageUnavailable {
            message: message.into(),
        }
    }

    /// Creates a new `KeyUnavailable` error.
    #[must_use]
    pub fn key_unavailable(message: impl Into<String>) -> Self {
        Self::KeyUnavailable {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a client error (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRequest { .. }
                | Self::InvalidClient { .. }
                | Self::UnauthorizedClient { .. }
                | Self::InvalidGrant { .. }
                | Self::InvalidScope { .. }
                | Self::AccessDenied { .. }
                | Self::UnsupportedResponseType { .. }
                | Self::UnsupportedGrantType { .. }
                | Self::RequestExpired
                | Self::RequestAlreadyFinalized { .. }
        )
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable { .. }
                | Self::KeyUnavailable { .. }
                | Self::Configuration { .. }
                | Self::Internal { .. }
        )
    }

    /// Returns `true` if the caller may retry the same request with backoff.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable { .. })
    }

    /// Returns `true` if this error came from parameter validation.
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        self.category() == ErrorCategory::Validation
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidRequest { .. }
            | Self::InvalidClient { .. }
            | Self::UnauthorizedClient { .. }
            | Self::InvalidScope { .. }
            | Self::UnsupportedResponseType { .. }
            | Self::UnsupportedGrantType { .. } => ErrorCategory::Validation,
            Self::InvalidGrant { .. } => ErrorCategory::Grant,
            Self::AccessDenied { .. } => ErrorCategory::Authorization,
            Self::RequestExpired | Self::RequestAlreadyFinalized { .. } => {
                ErrorCategory::StateConflict
            }
            Self::StorageUnavailable { .. } => ErrorCategory::Infrastructure,
            Self::KeyUnavailable { .. } => ErrorCategory::KeyManagement,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the OAuth 2.0 / OIDC error code for this error.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "invalid_request",
            Self::InvalidClient { .. } => "invalid_client",
            Self::UnauthorizedClient { .. } => "unauthorized_client",
            Self::InvalidGrant { .. } => "invalid_grant",
            Self::InvalidScope { .. } => "invalid_scope",
            Self::AccessDenied { .. } => "access_denied",
            Self::UnsupportedResponseType { .. } => "unsupported_response_type",
            Self::UnsupportedGrantType { .. } => "unsupported_grant_type",
            Self::RequestExpired | Self::RequestAlreadyFinalized { .. } => "invalid_request",
            Self::StorageUnavailable { .. } => "temporarily_unavailable",
            Self::KeyUnavailable { .. } | Self::Configuration { .. } | Self::Internal { .. } => {
                "server_error"
            }
        }
    }
}

/// Categories of engine errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Malformed or disallowed request parameters.
    Validation,
    /// Expired, used, or unknown codes and refresh tokens.
    Grant,
    /// Explicit refusal by the user or policy.
    Authorization,
    /// Authorization request lifecycle conflicts.
    StateConflict,
    /// Transient storage failures.
    Infrastructure,
    /// Missing or misconfigured signing keys.
    KeyManagement,
    /// Configuration errors.
    Configuration,
    /// Internal server errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Grant => write!(f, "grant"),
            Self::Authorization => write!(f, "authorization"),
            Self::StateConflict => write!(f, "state_conflict"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::KeyManagement => write!(f, "key_management"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthError::invalid_client("client authentication failed");
        assert_eq!(err.to_string(), "Invalid client: client authentication failed");

        let err = AuthError::invalid_grant("invalid authorization code");
        assert_eq!(err.to_string(), "Invalid grant: invalid authorization code");

        assert_eq!(
            AuthError::RequestExpired.to_string(),
            "Authorization request expired"
        );
    }

    #[test]
    fn test_error_predicates() {
        let err = AuthError::invalid_grant("test");
        assert!(err.is_client_error());
        assert!(!err.is_server_error());
        assert!(!err.is_retryable());

        let err = AuthError::storage_unavailable("timeout");
        assert!(!err.is_client_error());
        assert!(err.is_server_error());
        assert!(err.is_retryable());

        let err = AuthError::key_unavailable("no active key");
        assert!(err.is_server_error());
        assert!(!err.is_retryable());

        assert!(AuthError::invalid_scope("x").is_validation_error());
        assert!(!AuthError::invalid_grant("x").is_validation_error());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            AuthError::invalid_client("test").category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            AuthError::invalid_grant("test").category(),
            ErrorCategory::Grant
        );
        assert_eq!(
            AuthError::RequestExpired.category(),
            ErrorCategory::StateConflict
        );
        assert_eq!(
            AuthError::storage_unavailable("test").category(),
            ErrorCategory::Infrastructure
        );
        assert_eq!(
            AuthError::key_unavailable("test").category(),
            ErrorCategory::KeyManagement
        );
    }

    #[test]
    fn test_oauth_error_code() {
        assert_eq!(
            AuthError::invalid_client("test").oauth_error_code(),
            "invalid_client"
        );
        assert_eq!(
            AuthError::unauthorized_client("test").oauth_error_code(),
            "unauthorized_client"
        );
        assert_eq!(
            AuthError::invalid_grant("test").oauth_error_code(),
            "invalid_grant"
        );
        assert_eq!(
            AuthError::unsupported_grant_type("password").oauth_error_code(),
            "unsupported_grant_type"
        );
        assert_eq!(
            AuthError::storage_unavailable("test").oauth_error_code(),
            "temporarily_unavailable"
        );
        assert_eq!(
            AuthError::key_unavailable("test").oauth_error_code(),
            "server_error"
        );
    }

    #[test]
    fn test_error_category_display() {
        assert_eq!(ErrorCategory::Validation.to_string(), "validation");
        assert_eq!(ErrorCategory::StateConflict.to_string(), "state_conflict");
        assert_eq!(ErrorCategory::KeyManagement.to_string(), "key_management");
    }
}
