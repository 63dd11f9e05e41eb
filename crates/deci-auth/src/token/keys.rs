//! Signing key lifecycle.
//!
//! The [`KeyManager`] owns every signing key the provider has published.
//! Its state is one immutable [`KeySet`] snapshot behind an `ArcSwap`:
//! signers and verifiers `load()` it without locking, and rotation installs a
//! whole new snapshot, so a signer observes either the old or the new active
//! key and never a mix.
//!
//! # Lifecycle
//!
//! 1. [`KeyManager::rotate`] generates a key and makes it `active`
//! 2. The previous active key becomes `retiring` with
//!    `not_after = now + token_validity_time`, so every token it signed stays
//!    verifiable until that token expires
//! 3. [`KeyManager::prune`] drops retiring keys past `not_after`; they are
//!    `retired` and no longer published

use std::sync::Arc;

use arc_swap::ArcSwap;
use jsonwebtoken::TokenData;
use serde::Serialize;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use tracing::{error, info};

use super::jwt::{JwtError, Jwks, SigningAlgorithm, SigningKeyPair, peek_kid};
use crate::config::{AuthConfig, to_time_duration};
use crate::{AuthError, AuthResult};

/// Where a key is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyStatus {
    /// Signs new tokens.
    Active,
    /// Verification only, until `not_after`.
    Retiring,
    /// Removed from publication.
    Retired,
}

/// A signing key and its validity window.
#[derive(Debug, Clone)]
pub struct SigningKey {
    pub kid: String,
    pub algorithm: SigningAlgorithm,
    pub not_before: OffsetDateTime,
    /// `None` while active.
    pub not_after: Option<OffsetDateTime>,
    pub status: KeyStatus,
    material: Arc<SigningKeyPair>,
}

impl SigningKey {
    fn new(material: SigningKeyPair, now: OffsetDateTime) -> Self {
        Self {
            kid: material.kid().to_string(),
            algorithm: material.algorithm(),
            not_before: now,
            not_after: None,
            status: KeyStatus::Active,
            material: Arc::new(material),
        }
    }

    fn demote(&self, not_after: OffsetDateTime) -> Self {
        Self {
            not_after: Some(not_after),
            status: KeyStatus::Retiring,
            ..self.clone()
        }
    }

    /// Whether the key may still verify tokens at `now`.
    #[must_use]
    pub fn is_published_at(&self, now: OffsetDateTime) -> bool {
        match self.not_after {
            Some(not_after) => now <= not_after,
            None => true,
        }
    }

    /// The underlying key pair.
    #[must_use]
    pub fn material(&self) -> &SigningKeyPair {
        &self.material
    }

    /// Signs `claims` with this key.
    ///
    /// # Errors
    ///
    /// Returns `KeyUnavailable` if signing fails.
    pub fn sign<T: Serialize>(&self, claims: &T) -> AuthResult<String> {
        self.material.sign(claims).map_err(|e| {
            error!(kid = %self.kid, error = %e, "Token signing failed");
            AuthError::key_unavailable(e.to_string())
        })
    }
}

/// Immutable snapshot of the key state.
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    /// At most one active key.
    pub active: Option<SigningKey>,
    /// Newest first.
    pub retiring: Vec<SigningKey>,
}

impl KeySet {
    fn find(&self, kid: &str, now: OffsetDateTime) -> Option<&SigningKey> {
        self.active
            .iter()
            .chain(self.retiring.iter())
            .find(|key| key.kid == kid && key.is_published_at(now))
    }
}

/// Owns signing keys, rotation and public-key publication.
pub struct KeyManager {
    keys: ArcSwap<KeySet>,
    algorithm: SigningAlgorithm,
    issuer: String,
    /// Longest lifetime of a token signed by the active key.
    grace_period: time::Duration,
    rotation_interval: time::Duration,
}

impl KeyManager {
    /// Creates a manager holding no keys. Signing fails until [`rotate`](Self::rotate).
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the configured algorithm is unknown or a
    /// duration does not fit.
    pub fn empty(config: &AuthConfig) -> AuthResult<Self> {
        let algorithm = config
            .signing
            .signing_algorithm()
            .map_err(|e| AuthError::configuration(e.to_string()))?;

        Ok(Self {
            keys: ArcSwap::from_pointee(KeySet::default()),
            algorithm,
            issuer: config.issuer.clone(),
            grace_period: to_time_duration(config.oauth.token_validity_time)?,
            rotation_interval: to_time_duration(config.signing.rotation_interval)?,
        })
    }

    /// Creates a manager with a freshly generated active key.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or key generation fails.
    pub fn new(config: &AuthConfig, now: OffsetDateTime) -> AuthResult<Self> {
        let manager = Self::empty(config)?;
        manager.rotate(now)?;
        Ok(manager)
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<KeySet> {
        self.keys.load_full()
    }

    /// The key new tokens are signed with.
    ///
    /// # Errors
    ///
    /// Returns `KeyUnavailable` if no key is active.
    pub fn active_key(&self) -> AuthResult<SigningKey> {
        self.keys.load().active.clone().ok_or_else(|| {
            error!("No active signing key; tokens cannot be issued");
            AuthError::key_unavailable("no active signing key")
        })
    }

    /// Keys relying parties should accept at `now`: active first, then
    /// retiring keys newest first.
    #[must_use]
    pub fn public_key_set(&self, now: OffsetDateTime) -> Jwks {
        let keys = self.keys.load();
        Jwks {
            keys: keys
                .active
                .iter()
                .chain(keys.retiring.iter())
                .filter(|key| key.is_published_at(now))
                .map(|key| key.material.to_jwk())
                .collect(),
        }
    }

    /// Generates a new active key and demotes the current one.
    ///
    /// Key generation happens before the swap; the swap itself is a
    /// read-copy-update, so concurrent rotations each keep their key.
    ///
    /// # Errors
    ///
    /// Returns `KeyUnavailable` if key generation fails. The previous
    /// snapshot stays in place.
    pub fn rotate(&self, now: OffsetDateTime) -> AuthResult<SigningKey> {
        let material = SigningKeyPair::generate(self.algorithm).map_err(|e| {
            error!(error = %e, "Signing key generation failed");
            AuthError::key_unavailable(e.to_string())
        })?;
        let fresh = SigningKey::new(material, now);
        let not_after = now + self.grace_period;

        let previous = self.keys.rcu(|current| {
            let mut retiring = Vec::with_capacity(current.retiring.len() + 1);
            if let Some(active) = &current.active {
                retiring.push(active.demote(not_after));
            }
            retiring.extend(
                current
                    .retiring
                    .iter()
                    .filter(|key| key.is_published_at(now))
                    .cloned(),
            );
            KeySet {
                active: Some(fresh.clone()),
                retiring,
            }
        });

        info!(
            target: "deci::audit",
            kid = %fresh.kid,
            algorithm = %fresh.algorithm,
            retired_kid = previous.active.as_ref().map(|k| k.kid.as_str()).unwrap_or("none"),
            "Signing key rotated"
        );
        Ok(fresh)
    }

    /// Rotates when there is no active key or it is older than the
    /// rotation interval.
    ///
    /// # Errors
    ///
    /// Propagates [`rotate`](Self::rotate) failures.
    pub fn rotate_if_due(&self, now: OffsetDateTime) -> AuthResult<Option<SigningKey>> {
        let due = match &self.keys.load().active {
            Some(active) => now - active.not_before >= self.rotation_interval,
            None => true,
        };
        if due { self.rotate(now).map(Some) } else { Ok(None) }
    }

    /// Drops retiring keys past `not_after` and returns them as retired.
    pub fn prune(&self, now: OffsetDateTime) -> Vec<SigningKey> {
        let mut removed = Vec::new();
        self.keys.rcu(|current| {
            removed = current
                .retiring
                .iter()
                .filter(|key| !key.is_published_at(now))
                .map(|key| SigningKey {
                    status: KeyStatus::Retired,
                    ..key.clone()
                })
                .collect();
            KeySet {
                active: current.active.clone(),
                retiring: current
                    .retiring
                    .iter()
                    .filter(|key| key.is_published_at(now))
                    .cloned()
                    .collect(),
            }
        });
        for key in &removed {
            info!(target: "deci::audit", kid = %key.kid, "Signing key retired");
        }
        removed
    }

    /// Verifies a token against whichever published key its `kid` names.
    ///
    /// # Errors
    ///
    /// Returns `KeyNotFound` when the `kid` is unknown or no longer published,
    /// or the signature/claims error from the key.
    pub fn verify<T: DeserializeOwned>(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<TokenData<T>, JwtError> {
        let kid = peek_kid(token)?;
        let keys = self.keys.load();
        let key = keys
            .find(&kid, now)
            .ok_or_else(|| JwtError::KeyNotFound { kid: kid.clone() })?;
        key.material.verify(token, &self.issuer)
    }

    /// Issuer expected in verified tokens.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Algorithm used for new keys.
    #[must_use]
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::jwt::AccessTokenClaims;
    use std::time::Duration as StdDuration;
    use time::Duration;

    fn config() -> AuthConfig {
        let mut config = AuthConfig::default();
        config.issuer = "https://id.example.com".to_string();
        config.oauth.token_validity_time = StdDuration::from_secs(3600);
        config.signing.rotation_interval = StdDuration::from_secs(24 * 3600);
        config
    }

    fn claims(now: OffsetDateTime) -> AccessTokenClaims {
        AccessTokenClaims {
            iss: "https://id.example.com".to_string(),
            sub: "alice".to_string(),
            aud: "acme".to_string(),
            exp: (now + Duration::hours(1)).unix_timestamp(),
            iat: now.unix_timestamp(),
            jti: "jti-1".to_string(),
            scope: "openid".to_string(),
            client_id: "acme".to_string(),
        }
    }

    #[test]
    fn test_empty_manager_has_no_active_key() {
        let manager = KeyManager::empty(&config()).unwrap();
        let err = manager.active_key().unwrap_err();
        assert!(matches!(err, AuthError::KeyUnavailable { .. }));
        assert!(
            manager
                .public_key_set(OffsetDateTime::now_utc())
                .keys
                .is_empty()
        );
    }

    #[test]
    fn test_rotation_demotes_previous_key() {
        let now = OffsetDateTime::now_utc();
        let manager = KeyManager::new(&config(), now).unwrap();
        let first = manager.active_key().unwrap();

        let second = manager.rotate(now + Duration::minutes(1)).unwrap();
        assert_ne!(first.kid, second.kid);
        assert_eq!(manager.active_key().unwrap().kid, second.kid);

        let snapshot = manager.snapshot();
        assert_eq!(snapshot.retiring.len(), 1);
        let retiring = &snapshot.retiring[0];
        assert_eq!(retiring.kid, first.kid);
        assert_eq!(retiring.status, KeyStatus::Retiring);
        assert_eq!(
            retiring.not_after,
            Some(now + Duration::minutes(1) + Duration::hours(1))
        );
    }

    #[test]
    fn test_public_key_set_orders_active_first() {
        let now = OffsetDateTime::now_utc();
        let manager = KeyManager::new(&config(), now).unwrap();
        let first = manager.active_key().unwrap();
        let second = manager.rotate(now).unwrap();
        let third = manager.rotate(now).unwrap();

        let kids: Vec<String> = manager
            .public_key_set(now)
            .keys
            .into_iter()
            .map(|k| k.kid)
            .collect();
        assert_eq!(kids, vec![third.kid, second.kid, first.kid]);
    }

    #[test]
    fn test_token_signed_before_rotation_still_verifies() {
        let now = OffsetDateTime::now_utc();
        let manager = KeyManager::new(&config(), now).unwrap();
        let key = manager.active_key().unwrap();
        let token = key.sign(&claims(now)).unwrap();
        let kid = key.kid;

        manager.rotate(now).unwrap();
        assert_ne!(manager.active_key().unwrap().kid, kid);

        let decoded = manager.verify::<AccessTokenClaims>(&token, now).unwrap();
        assert_eq!(decoded.claims.sub, "alice");
        assert!(manager.public_key_set(now).keys.iter().any(|k| k.kid == kid));
    }

    #[test]
    fn test_prune_retires_expired_keys() {
        let now = OffsetDateTime::now_utc();
        let manager = KeyManager::new(&config(), now).unwrap();
        let first = manager.active_key().unwrap();
        manager.rotate(now).unwrap();

        assert!(manager.prune(now + Duration::minutes(59)).is_empty());

        let later = now + Duration::hours(1) + Duration::seconds(1);
        let removed = manager.prune(later);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].kid, first.kid);
        assert_eq!(removed[0].status, KeyStatus::Retired);
        assert_eq!(manager.public_key_set(later).keys.len(), 1);
    }

    #[test]
    fn test_verify_rejects_unpublished_kid() {
        let now = OffsetDateTime::now_utc();
        let manager = KeyManager::new(&config(), now).unwrap();
        let token = manager.active_key().unwrap().sign(&claims(now)).unwrap();
        manager.rotate(now).unwrap();

        let result = manager.verify::<AccessTokenClaims>(&token, now + Duration::hours(2));
        assert!(matches!(result, Err(JwtError::KeyNotFound { .. })));
    }

    #[test]
    fn test_rotate_if_due() {
        let now = OffsetDateTime::now_utc();
        let manager = KeyManager::empty(&config()).unwrap();
        assert!(manager.rotate_if_due(now).unwrap().is_some());
        assert!(manager.rotate_if_due(now + Duration::hours(1)).unwrap().is_none());
        assert!(manager.rotate_if_due(now + Duration::hours(24)).unwrap().is_some());
    }

    #[test]
    fn test_concurrent_rotation_keeps_every_key() {
        let now = OffsetDateTime::now_utc();
        let manager = Arc::new(KeyManager::new(&config(), now).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let manager = manager.clone();
                std::thread::spawn(move || manager.rotate(now).unwrap().kid)
            })
            .collect();
        let rotated: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let published: Vec<String> = manager
            .public_key_set(now)
            .keys
            .into_iter()
            .map(|k| k.kid)
            .collect();
        assert_eq!(published.len(), 5);
        for kid in rotated {
            assert!(published.contains(&kid));
        }
    }
}
