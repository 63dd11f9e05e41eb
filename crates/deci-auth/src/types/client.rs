//! Relying-party client registrations.

use serde::{Deserialize, Serialize};

// =============================================================================
// Grant Type
// =============================================================================

/// Token endpoint grant types a client may be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    /// Authorization code flow.
    AuthorizationCode,
    /// Refresh token flow.
    RefreshToken,
}

impl GrantType {
    /// Parses the `grant_type` parameter value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "authorization_code" => Some(Self::AuthorizationCode),
            "refresh_token" => Some(Self::RefreshToken),
            _ => None,
        }
    }

    /// Returns the OAuth 2.0 grant_type parameter value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
        }
    }
}

impl std::fmt::Display for GrantType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn default_grant_types() -> Vec<GrantType> {
    vec![GrantType::AuthorizationCode, GrantType::RefreshToken]
}

fn default_active() -> bool {
    true
}

// =============================================================================
// Client
// =============================================================================

/// A registered relying party.
///
/// Immutable for the duration of a request; changes happen only in the
/// backing registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Client {
    /// Unique client identifier.
    #[serde(alias = "id")]
    pub client_id: String,

    /// Shared secret. `None` marks a public client.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "secret")]
    pub client_secret: Option<String>,

    /// Human-readable display name.
    pub name: String,

    /// Exact-match set of redirect URIs.
    #[serde(default)]
    pub redirect_uris: Vec<String>,

    /// Grant types this client may use at the token endpoint.
    #[serde(default = "default_grant_types")]
    pub grant_types: Vec<GrantType>,

    /// Scopes this client may request. Empty means any supported scope.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Overrides the provider-wide PKCE requirement for this client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pkce_required: Option<bool>,

    /// Inactive clients fail lookup.
    #[serde(default = "default_active")]
    pub active: bool,
}

impl Client {
    /// Creates an active client allowed both grant types.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        client_secret: Option<String>,
        name: impl Into<String>,
        redirect_uris: Vec<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret,
            name: name.into(),
            redirect_uris,
            grant_types: default_grant_types(),
            scopes: Vec::new(),
            pkce_required: None,
            active: true,
        }
    }

    /// Validates the registration.
    ///
    /// # Errors
    ///
    /// Returns an error if the registration is inconsistent.
    pub fn validate(&self) -> Result<(), ClientValidationError> {
        if self.client_id.is_empty() {
            return Err(ClientValidationError::EmptyClientId);
        }

        if self.name.is_empty() {
            return Err(ClientValidationError::EmptyName);
        }

        if self.grant_types.is_empty() {
            return Err(ClientValidationError::NoGrantTypes);
        }

        if matches!(&self.client_secret, Some(secret) if secret.is_empty()) {
            return Err(ClientValidationError::EmptySecret);
        }

        if self.grant_types.contains(&GrantType::AuthorizationCode) && self.redirect_uris.is_empty()
        {
            return Err(ClientValidationError::NoRedirectUris);
        }

        if let Some(uri) = self
            .redirect_uris
            .iter()
            .find(|uri| url::Url::parse(uri).is_err())
        {
            return Err(ClientValidationError::InvalidRedirectUri(uri.clone()));
        }

        Ok(())
    }

    /// Returns `true` for clients registered without a secret.
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.client_secret.is_none()
    }

    /// Exact string comparison against the registered set.
    #[must_use]
    pub fn is_redirect_uri_allowed(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|allowed| allowed == uri)
    }

    /// Checks if the given scope is allowed for this client.
    ///
    /// An empty scopes list means all scopes are allowed.
    #[must_use]
    pub fn is_scope_allowed(&self, scope: &str) -> bool {
        self.scopes.is_empty() || self.scopes.iter().any(|allowed| allowed == scope)
    }

    /// Checks if the given grant type is allowed for this client.
    #[must_use]
    pub fn is_grant_type_allowed(&self, grant_type: GrantType) -> bool {
        self.grant_types.contains(&grant_type)
    }

    /// Returns whether PKCE is mandatory for this client.
    ///
    /// The per-client override wins; otherwise public clients follow the
    /// provider default and confidential clients are exempt.
    #[must_use]
    pub fn requires_pkce(&self, public_client_default: bool) -> bool {
        match self.pkce_required {
            Some(required) => required,
            None => self.is_public() && public_client_default,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Errors that can occur during client validation.
#[derive(Debug, thiserror::Error)]
pub enum ClientValidationError {
    /// Client ID cannot be empty.
    #[error("Client ID cannot be empty")]
    EmptyClientId,

    /// Client name cannot be empty.
    #[error("Client name cannot be empty")]
    EmptyName,

    /// At least one grant type is required.
    #[error("At least one grant type is required")]
    NoGrantTypes,

    /// A present secret must not be empty.
    #[error("Client secret cannot be empty; omit it for public clients")]
    EmptySecret,

    /// Authorization code flow requires redirect URIs.
    #[error("Authorization code flow requires redirect URIs")]
    NoRedirectUris,

    /// A redirect URI is not an absolute URL.
    #[error("Invalid redirect URI: {0}")]
    InvalidRedirectUri(String),
}
