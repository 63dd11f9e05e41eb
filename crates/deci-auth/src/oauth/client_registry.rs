//! Client registry adapter.
//!
//! Validates client identity, redirect URIs and secrets on top of a
//! [`ClientStorage`]. Every failure a requester can observe is the same
//! `invalid_client` error, so an unknown client, an inactive one, a bad secret
//! and an unregistered redirect URI are indistinguishable from outside.

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::storage::{ClientStorage, with_timeout};
use crate::types::Client;
use crate::{AuthError, AuthResult};

const CLIENT_AUTH_FAILED: &str = "client authentication failed";
const UNKNOWN_CLIENT_OR_REDIRECT: &str = "unknown client or unregistered redirect_uri";

/// Read-only view of the client registry.
#[derive(Clone)]
pub struct ClientRegistry {
    storage: Arc<dyn ClientStorage>,
    timeout: Duration,
}

impl ClientRegistry {
    /// Wraps `storage`, bounding each lookup by `timeout`.
    pub fn new(storage: Arc<dyn ClientStorage>, timeout: Duration) -> Self {
        Self { storage, timeout }
    }

    /// Looks up an active client.
    ///
    /// Inactive registrations are reported as `None`.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the lookup fails or times out.
    pub async fn lookup(&self, client_id: &str) -> AuthResult<Option<Client>> {
        let client = with_timeout(
            self.timeout,
            "get_client",
            self.storage.get_client(client_id),
        )
        .await?;
        Ok(client.filter(|c| c.active))
    }

    /// Exact string match against the client's registered redirect URIs.
    #[must_use]
    pub fn validate_redirect_uri(&self, client: &Client, uri: &str) -> bool {
        client.is_redirect_uri_allowed(uri)
    }

    /// Checks a presented secret in constant time.
    ///
    /// Public clients pass only when no secret is presented. Both sides are
    /// hashed first so the comparison does not leak the secret's length.
    #[must_use]
    pub fn validate_secret(&self, client: &Client, presented: Option<&str>) -> bool {
        match (&client.client_secret, presented) {
            (None, None) => true,
            (Some(expected), Some(presented)) => {
                let expected = Sha256::digest(expected.as_bytes());
                let presented = Sha256::digest(presented.as_bytes());
                expected.ct_eq(&presented).into()
            }
            _ => false,
        }
    }

    /// Resolves the client for an authorization request.
    ///
    /// # Errors
    ///
    /// Returns a uniform `InvalidClient` if the client is unknown or the
    /// redirect URI is not registered for it.
    pub async fn resolve_for_redirect(&self, client_id: &str, redirect_uri: &str) -> AuthResult<Client> {
        match self.lookup(client_id).await? {
            Some(client) if self.validate_redirect_uri(&client, redirect_uri) => Ok(client),
            Some(_) => {
                warn!(client_id, "Redirect URI not registered for client");
                Err(AuthError::invalid_client(UNKNOWN_CLIENT_OR_REDIRECT))
            }
            None => {
                warn!(client_id, "Authorization request for unknown client");
                Err(AuthError::invalid_client(UNKNOWN_CLIENT_OR_REDIRECT))
            }
        }
    }

    /// Authenticates a client at the token endpoint.
    ///
    /// # Errors
    ///
    /// Returns a uniform `InvalidClient` for unknown clients and bad or
    /// missing secrets, or `StorageUnavailable`.
    pub async fn authenticate(&self, client_id: &str, secret: Option<&str>) -> AuthResult<Client> {
        let Some(client) = self.lookup(client_id).await? else {
            warn!(target: "deci::audit", client_id, "Client authentication failed: unknown client");
            return Err(AuthError::invalid_client(CLIENT_AUTH_FAILED));
        };
        if !self.validate_secret(&client, secret) {
            warn!(target: "deci::audit", client_id, "Client authentication failed: bad credentials");
            return Err(AuthError::invalid_client(CLIENT_AUTH_FAILED));
        }
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct MockClientStorage {
        clients: HashMap<String, Client>,
    }

    #[async_trait]
    impl ClientStorage for MockClientStorage {
        async fn get_client(&self, client_id: &str) -> AuthResult<Option<Client>> {
            Ok(self.clients.get(client_id).cloned())
        }
    }

    struct HangingClientStorage;

    #[async_trait]
    impl ClientStorage for HangingClientStorage {
        async fn get_client(&self, _client_id: &str) -> AuthResult<Option<Client>> {
            std::future::pending().await
        }
    }

    fn registry() -> ClientRegistry {
        let acme = Client::new(
            "acme",
            Some("acme-secret".to_string()),
            "Acme",
            vec!["https://acme.example/cb".to_string()],
        );
        let spa = Client::new("spa", None, "SPA", vec!["http://127.0.0.1:5555/callback".to_string()]);
        let mut retired = Client::new("retired", None, "Retired", vec!["https://r.example/cb".to_string()]);
        retired.active = false;

        let clients = [acme, spa, retired]
            .into_iter()
            .map(|c| (c.client_id.clone(), c))
            .collect();
        ClientRegistry::new(
            Arc::new(MockClientStorage { clients }),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn test_lookup_hides_inactive_clients() {
        let registry = registry();
        assert!(registry.lookup("acme").await.unwrap().is_some());
        assert!(registry.lookup("retired").await.unwrap().is_none());
        assert!(registry.lookup("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_validate_secret() {
        let registry = registry();
        let acme = registry.lookup("acme").await.unwrap().unwrap();
        assert!(registry.validate_secret(&acme, Some("acme-secret")));
        assert!(!registry.validate_secret(&acme, Some("acme-secret ")));
        assert!(!registry.validate_secret(&acme, Some("")));
        assert!(!registry.validate_secret(&acme, None));

        let spa = registry.lookup("spa").await.unwrap().unwrap();
        assert!(registry.validate_secret(&spa, None));
        assert!(!registry.validate_secret(&spa, Some("anything")));
    }

    #[tokio::test]
    async fn test_resolve_for_redirect_uniform_errors() {
        let registry = registry();
        assert!(
            registry
                .resolve_for_redirect("acme", "https://acme.example/cb")
                .await
                .is_ok()
        );

        let unknown = registry
            .resolve_for_redirect("nobody", "https://acme.example/cb")
            .await
            .unwrap_err();
        let bad_redirect = registry
            .resolve_for_redirect("acme", "https://evil.example/cb")
            .await
            .unwrap_err();
        assert_eq!(unknown.to_string(), bad_redirect.to_string());
        assert!(unknown.is_validation_error());
    }

    #[tokio::test]
    async fn test_authenticate_uniform_errors() {
        let registry = registry();
        assert_eq!(
            registry.authenticate("acme", Some("acme-secret")).await.unwrap().client_id,
            "acme"
        );

        let unknown = registry.authenticate("nobody", Some("x")).await.unwrap_err();
        let bad_secret = registry.authenticate("acme", Some("wrong")).await.unwrap_err();
        let missing = registry.authenticate("acme", None).await.unwrap_err();
        assert_eq!(unknown.to_string(), bad_secret.to_string());
        assert_eq!(bad_secret.to_string(), missing.to_string());
        assert_eq!(unknown.oauth_error_code(), "invalid_client");
    }

    #[tokio::test]
    async fn test_lookup_timeout_is_storage_unavailable() {
        let registry = ClientRegistry::new(Arc::new(HangingClientStorage), Duration::from_millis(20));
        let err = registry.lookup("acme").await.unwrap_err();
        assert!(matches!(err, AuthError::StorageUnavailable { .. }));
    }
}
