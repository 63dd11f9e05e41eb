//! Authorization endpoint wire types.
//!
//! An [`AuthorizationRequest`] arrives as query parameters; the outcome goes
//! back to the client as a redirect carrying either an
//! [`AuthorizationResponse`] (`code` + `state`) or an
//! [`AuthorizationError`] (`error` + `error_description` + `state`).
//!
//! `state` is opaque to the provider. It is echoed in redirects and never
//! stored in a token.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::AuthError;

/// Authorization request parameters.
///
/// ```text
/// GET /auth?
///   response_type=code
///   &client_id=acme
///   &redirect_uri=https://acme.example/cb
///   &scope=openid profile
///   &state=xyz
///   &code_challenge=E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM
///   &code_challenge_method=S256
/// ```
///
/// Missing parameters deserialize as empty and are rejected by
/// [`AuthorizationService::start`](super::AuthorizationService::start), so
/// the caller gets an OAuth error rather than a query-parse failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizationRequest {
    #[serde(default)]
    pub response_type: String,

    #[serde(default)]
    pub client_id: String,

    /// Must exactly match one of the client's registered redirect URIs.
    #[serde(default)]
    pub redirect_uri: String,

    /// Space-separated scopes. Must include `openid`.
    #[serde(default)]
    pub scope: String,

    #[serde(default)]
    pub state: Option<String>,

    #[serde(default)]
    pub nonce: Option<String>,

    #[serde(default)]
    pub code_challenge: Option<String>,

    /// `S256` or `plain`; `plain` when omitted.
    #[serde(default)]
    pub code_challenge_method: Option<String>,
}

/// Successful authorization redirect parameters.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AuthorizationResponse {
    pub code: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl AuthorizationResponse {
    #[must_use]
    pub fn new(code: String, state: Option<String>) -> Self {
        Self { code, state }
    }

    /// Appends `code` and `state` to `redirect_uri`.
    ///
    /// # Errors
    ///
    /// Returns an error if `redirect_uri` does not parse.
    pub fn to_redirect_url(&self, redirect_uri: &str) -> Result<String, url::ParseError> {
        let mut url = url::Url::parse(redirect_uri)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("code", &self.code);
            if let Some(state) = &self.state {
                pairs.append_pair("state", state);
            }
        }
        Ok(url.to_string())
    }
}

/// Error delivered to the client through its redirect URI.
///
/// Only used once the client and redirect URI are known to be valid;
/// anything else is reported to the user agent directly.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AuthorizationError {
    pub error: AuthorizationErrorCode,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl AuthorizationError {
    #[must_use]
    pub fn new(error: AuthorizationErrorCode, state: Option<String>) -> Self {
        Self {
            error,
            error_description: None,
            state,
        }
    }

    #[must_use]
    pub fn with_description(
        error: AuthorizationErrorCode,
        description: impl Into<String>,
        state: Option<String>,
    ) -> Self {
        Self {
            error,
            error_description: Some(description.into()),
            state,
        }
    }

    /// Builds the redirect error for an engine failure.
    #[must_use]
    pub fn from_auth_error(error: &AuthError, state: Option<String>) -> Self {
        let code = AuthorizationErrorCode::from_auth_error(error);
        let description = match code {
            AuthorizationErrorCode::ServerError => "internal error".to_string(),
            _ => error.to_string(),
        };
        Self::with_description(code, description, state)
    }

    /// Appends `error`, `error_description` and `state` to `redirect_uri`.
    ///
    /// # Errors
    ///
    /// Returns an error if `redirect_uri` does not parse.
    pub fn to_redirect_url(&self, redirect_uri: &str) -> Result<String, url::ParseError> {
        let mut url = url::Url::parse(redirect_uri)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("error", self.error.as_str());
            if let Some(desc) = &self.error_description {
                pairs.append_pair("error_description", desc);
            }
            if let Some(state) = &self.state {
                pairs.append_pair("state", state);
            }
        }
        Ok(url.to_string())
    }
}

/// Error codes an authorization redirect may carry (RFC 6749 §4.1.2.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationErrorCode {
    InvalidRequest,
    UnauthorizedClient,
    AccessDenied,
    UnsupportedResponseType,
    InvalidScope,
    ServerError,
    TemporarilyUnavailable,
}

impl AuthorizationErrorCode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::AccessDenied => "access_denied",
            Self::UnsupportedResponseType => "unsupported_response_type",
            Self::InvalidScope => "invalid_scope",
            Self::ServerError => "server_error",
            Self::TemporarilyUnavailable => "temporarily_unavailable",
        }
    }

    /// Maps an engine error onto the redirectable code set.
    #[must_use]
    pub fn from_auth_error(error: &AuthError) -> Self {
        match error {
            AuthError::UnauthorizedClient { .. } => Self::UnauthorizedClient,
            AuthError::AccessDenied { .. } => Self::AccessDenied,
            AuthError::UnsupportedResponseType { .. } => Self::UnsupportedResponseType,
            AuthError::InvalidScope { .. } => Self::InvalidScope,
            AuthError::StorageUnavailable { .. } => Self::TemporarilyUnavailable,
            AuthError::KeyUnavailable { .. }
            | AuthError::Configuration { .. }
            | AuthError::Internal { .. } => Self::ServerError,
            _ => Self::InvalidRequest,
        }
    }
}

impl fmt::Display for AuthorizationErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
