//! Storage stalls and client authentication failures as callers see them.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::*;
use deci_auth::AuthResult;
use deci_auth::oauth::{AuthorizationConfig, AuthorizationService, ClientRegistry};
use deci_auth::storage::{ClientStorage, AuthRequestStorage};
use deci_auth::types::Client;
use deci_auth_memory::MemoryStorage;
use time::OffsetDateTime;

/// A client store that never answers.
struct StalledClients;

#[async_trait]
impl ClientStorage for StalledClients {
    async fn get_client(&self, _client_id: &str) -> AuthResult<Option<Client>> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn stalled_storage_is_storage_unavailable() {
    let storage = Arc::new(MemoryStorage::new());
    let config = AuthorizationConfig {
        operation_timeout: Duration::from_millis(50),
        ..AuthorizationConfig::default()
    };
    let service = AuthorizationService::new(
        ClientRegistry::new(Arc::new(StalledClients), Duration::from_millis(50)),
        storage.clone() as Arc<dyn AuthRequestStorage>,
        storage,
        config,
    );

    let err = service
        .start(&acme_request("openid"), OffsetDateTime::now_utc())
        .await
        .unwrap_err();
    assert!(err.error.is_retryable());
    assert_eq!(err.error.oauth_error_code(), "temporarily_unavailable");
}

#[tokio::test]
async fn unknown_client_and_bad_secret_are_indistinguishable() {
    let provider = Provider::new();
    let unknown = provider
        .clients
        .authenticate("nobody", Some("secret"))
        .await
        .unwrap_err();
    let bad_secret = provider
        .clients
        .authenticate("acme", Some("wrong"))
        .await
        .unwrap_err();
    let missing_secret = provider
        .clients
        .authenticate("acme", None)
        .await
        .unwrap_err();

    assert_eq!(unknown.to_string(), bad_secret.to_string());
    assert_eq!(unknown.to_string(), missing_secret.to_string());
    assert_eq!(unknown.oauth_error_code(), "invalid_client");
}
