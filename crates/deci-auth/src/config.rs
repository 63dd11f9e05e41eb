//! Engine configuration.
//!
//! Validity windows, signing settings and storage timeouts for the
//! authorization engine. All durations are written in humantime form
//! (`"5m"`, `"1h"`, `"30d"`).

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::token::jwt::SigningAlgorithm;

/// Scopes the engine knows how to map to claims.
pub const STANDARD_SCOPES: &[&str] = &[
    "openid",
    "profile",
    "email",
    "address",
    "phone",
    "groups",
    "offline_access",
];

/// Root engine configuration.
///
/// # Example (TOML)
///
/// ```toml
/// [auth]
/// issuer = "http://localhost:5556"
///
/// [auth.oauth]
/// auth_validity_time = "5m"
/// code_validity_time = "5m"
///
/// [auth.signing]
/// algorithm = "RS256"
/// rotation_interval = "24h"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Issuer URL placed in the `iss` claim and discovery document.
    pub issuer: String,

    /// Authorization flow settings.
    pub oauth: OAuthConfig,

    /// Token signing settings.
    pub signing: SigningConfig,

    /// Storage adapter settings.
    pub storage: StorageConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:5556".to_string(),
            oauth: OAuthConfig::default(),
            signing: SigningConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

/// Authorization flow configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// How long a pending authorization request waits for the user.
    #[serde(with = "humantime_serde")]
    pub auth_validity_time: Duration,

    /// How long an issued authorization code stays redeemable.
    #[serde(with = "humantime_serde")]
    pub code_validity_time: Duration,

    /// Access and ID token lifetime.
    /// Also the grace period a retired signing key stays published.
    #[serde(with = "humantime_serde")]
    pub token_validity_time: Duration,

    /// Refresh token lifetime.
    #[serde(with = "humantime_serde")]
    pub refresh_token_validity_time: Duration,

    /// Require PKCE for clients registered without a secret.
    pub require_pkce_for_public_clients: bool,

    /// Scopes this provider grants. Anything else is dropped.
    pub supported_scopes: Vec<String>,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            auth_validity_time: Duration::from_secs(5 * 60),
            code_validity_time: Duration::from_secs(5 * 60),
            token_validity_time: Duration::from_secs(3600),
            refresh_token_validity_time: Duration::from_secs(30 * 24 * 3600),
            require_pkce_for_public_clients: true,
            supported_scopes: STANDARD_SCOPES.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

/// Token signing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Signing algorithm.
    /// Supported: "RS256", "RS384", "ES384"
    pub algorithm: String,

    /// Age at which the active key is replaced by a fresh one.
    #[serde(with = "humantime_serde")]
    pub rotation_interval: Duration,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            algorithm: "RS256".to_string(),
            rotation_interval: Duration::from_secs(24 * 3600),
        }
    }
}

impl SigningConfig {
    /// Parses the configured algorithm name.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for anything other than
    /// RS256, RS384 or ES384.
    pub fn signing_algorithm(&self) -> Result<SigningAlgorithm, ConfigError> {
        SigningAlgorithm::parse(&self.algorithm).ok_or_else(|| {
            ConfigError::InvalidValue(format!(
                "Invalid signing algorithm: '{}'. Must be RS256, RS384, or ES384",
                self.algorithm
            ))
        })
    }
}

/// Storage adapter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Upper bound for any single storage adapter call.
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,

    /// Interval between expired-record sweeps.
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_secs(5),
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The issuer is empty or not an absolute URL
    /// - The signing algorithm is not supported
    /// - Any validity window or timeout is zero
    /// - Codes outlive the authorization request they belong to
    /// - `supported_scopes` lacks `openid` or names a scope with no claim mapping
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.is_empty() {
            return Err(ConfigError::Missing("issuer".to_string()));
        }
        if url::Url::parse(&self.issuer).is_err() {
            return Err(ConfigError::InvalidValue(format!(
                "issuer must be an absolute URL, got '{}'",
                self.issuer
            )));
        }

        self.signing.signing_algorithm()?;

        let windows = [
            ("oauth.auth_validity_time", self.oauth.auth_validity_time),
            ("oauth.code_validity_time", self.oauth.code_validity_time),
            ("oauth.token_validity_time", self.oauth.token_validity_time),
            (
                "oauth.refresh_token_validity_time",
                self.oauth.refresh_token_validity_time,
            ),
            ("signing.rotation_interval", self.signing.rotation_interval),
            ("storage.operation_timeout", self.storage.operation_timeout),
            ("storage.cleanup_interval", self.storage.cleanup_interval),
        ];
        for (name, value) in windows {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue(format!("{name} must be > 0")));
            }
        }

        if self.oauth.code_validity_time > self.oauth.auth_validity_time {
            return Err(ConfigError::InvalidValue(
                "oauth.code_validity_time must not exceed oauth.auth_validity_time".to_string(),
            ));
        }

        if !self.oauth.supported_scopes.iter().any(|s| s == "openid") {
            return Err(ConfigError::InvalidValue(
                "oauth.supported_scopes must include 'openid'".to_string(),
            ));
        }
        if let Some(unknown) = self
            .oauth
            .supported_scopes
            .iter()
            .find(|s| !STANDARD_SCOPES.contains(&s.as_str()))
        {
            return Err(ConfigError::InvalidValue(format!(
                "Unknown scope in oauth.supported_scopes: '{unknown}'"
            )));
        }

        Ok(())
    }
}

/// Converts a configured duration for `OffsetDateTime` arithmetic.
pub(crate) fn to_time_duration(value: Duration) -> crate::AuthResult<time::Duration> {
    time::Duration::try_from(value).map_err(|e| crate::AuthError::configuration(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AuthConfig::default();
        assert_eq!(config.issuer, "http://localhost:5556");
        assert_eq!(config.oauth.auth_validity_time, Duration::from_secs(300));
        assert_eq!(config.oauth.code_validity_time, Duration::from_secs(300));
        assert!(config.oauth.require_pkce_for_public_clients);
        assert_eq!(config.signing.algorithm, "RS256");
    }

    #[test]
    fn test_default_config_validates() {
        let config = AuthConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_issuer_fails_validation() {
        let mut config = AuthConfig::default();
        config.issuer = String::new();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn test_relative_issuer_fails_validation() {
        let mut config = AuthConfig::default();
        config.issuer = "localhost".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("absolute URL"));
    }

    #[test]
    fn test_invalid_algorithm_fails_validation() {
        let mut config = AuthConfig::default();
        config.signing.algorithm = "HS256".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
        assert!(err.to_string().contains("signing algorithm"));
    }

    #[test]
    fn test_valid_algorithms() {
        for alg in ["RS256", "RS384", "ES384"] {
            let mut config = AuthConfig::default();
            config.signing.algorithm = alg.to_string();
            assert!(config.validate().is_ok(), "Algorithm {} should be valid", alg);
        }
    }

    #[test]
    fn test_zero_window_fails_validation() {
        let mut config = AuthConfig::default();
        config.oauth.token_validity_time = Duration::ZERO;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("token_validity_time"));
    }

    #[test]
    fn test_code_outliving_request_fails_validation() {
        let mut config = AuthConfig::default();
        config.oauth.code_validity_time = Duration::from_secs(600);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("code_validity_time"));
    }

    #[test]
    fn test_scopes_require_openid() {
        let mut config = AuthConfig::default();
        config.oauth.supported_scopes = vec!["profile".to_string()];
        assert!(config.validate().is_err());

        config.oauth.supported_scopes = vec!["openid".to_string(), "launch".to_string()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("launch"));
    }

    #[test]
    fn test_humantime_durations_from_toml_like_json() {
        let json = r#"{
            "issuer": "https://id.example.com",
            "oauth": { "auth_validity_time": "10m", "code_validity_time": "30s" },
            "signing": { "rotation_interval": "6h" }
        }"#;
        let config: AuthConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.oauth.auth_validity_time, Duration::from_secs(600));
        assert_eq!(config.oauth.code_validity_time, Duration::from_secs(30));
        assert_eq!(config.signing.rotation_interval, Duration::from_secs(6 * 3600));
        // Unspecified fields keep defaults
        assert_eq!(config.storage.operation_timeout, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_serde_roundtrip() {
        let config = AuthConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: AuthConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.issuer, parsed.issuer);
        assert_eq!(config.signing.algorithm, parsed.signing.algorithm);
        assert_eq!(config.oauth.supported_scopes, parsed.oauth.supported_scopes);
    }
}
