//! Shared fixture: the engine wired to `deci-auth-memory`.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration as StdDuration;

use deci_auth::config::AuthConfig;
use deci_auth::oauth::{
    AuthenticationResult, AuthorizationConfig, AuthorizationRequest, AuthorizationService,
    ClientRegistry, UserInfo,
};
use deci_auth::token::{ClaimsAssembler, KeyManager, TokenConfig, TokenIssuer};
use deci_auth::types::Client;
use deci_auth_memory::MemoryStorage;
use time::OffsetDateTime;
use uuid::Uuid;

pub const ACME_CB: &str = "https://acme.example/cb";
pub const SPA_CB: &str = "http://127.0.0.1:5555/callback";

pub struct Provider {
    pub config: AuthConfig,
    pub storage: Arc<MemoryStorage>,
    pub clients: ClientRegistry,
    pub authorization: AuthorizationService,
    pub issuer: TokenIssuer,
}

pub fn config() -> AuthConfig {
    let mut config = AuthConfig::default();
    config.issuer = "https://id.example.com".to_string();
    config.storage.operation_timeout = StdDuration::from_secs(2);
    config
}

pub fn acme() -> Client {
    Client::new(
        "acme",
        Some("acme-secret".to_string()),
        "Acme",
        vec![ACME_CB.to_string()],
    )
}

pub fn spa() -> Client {
    Client::new("spa", None, "Single-page app", vec![SPA_CB.to_string()])
}

impl Provider {
    pub fn new() -> Self {
        Self::with_config(config())
    }

    pub fn with_config(config: AuthConfig) -> Self {
        let storage = Arc::new(MemoryStorage::with_clients([acme(), spa()]));
        let clients = ClientRegistry::new(storage.clone(), config.storage.operation_timeout);
        let keys = Arc::new(KeyManager::new(&config, OffsetDateTime::now_utc()).unwrap());

        let authorization = AuthorizationService::new(
            clients.clone(),
            storage.clone(),
            storage.clone(),
            AuthorizationConfig::from_auth_config(&config).unwrap(),
        );
        let issuer = TokenIssuer::new(
            keys,
            ClaimsAssembler::new(config.oauth.supported_scopes.clone()),
            storage.clone(),
            storage.clone(),
            storage.clone(),
            TokenConfig::from_auth_config(&config).unwrap(),
        );

        Self {
            config,
            storage,
            clients,
            authorization,
            issuer,
        }
    }

    /// Starts a request for acme and completes it as alice.
    /// Returns the request id and the issued code.
    pub async fn authorize_acme(
        &self,
        scope: &str,
        granted: &[&str],
        now: OffsetDateTime,
    ) -> (Uuid, String) {
        let request = self
            .authorization
            .start(&acme_request(scope), now)
            .await
            .unwrap();
        let redirect = self
            .authorization
            .complete_authentication(alice(request.id, granted, now), now)
            .await
            .unwrap();
        (request.id, query_param(&redirect, "code").unwrap())
    }
}

pub fn acme_request(scope: &str) -> AuthorizationRequest {
    AuthorizationRequest {
        response_type: "code".to_string(),
        client_id: "acme".to_string(),
        redirect_uri: ACME_CB.to_string(),
        scope: scope.to_string(),
        state: Some("xyz".to_string()),
        nonce: Some("n-0S6_WzA2Mj".to_string()),
        ..Default::default()
    }
}

pub fn alice(request_id: Uuid, granted: &[&str], now: OffsetDateTime) -> AuthenticationResult {
    AuthenticationResult {
        request_id,
        subject: "alice".to_string(),
        granted_scopes: granted.iter().map(|s| s.to_string()).collect(),
        authenticated_at: now,
        user_info: UserInfo {
            name: Some("Alice Liddell".to_string()),
            email: Some("alice@example.com".to_string()),
            email_verified: Some(true),
            ..Default::default()
        },
    }
}

pub fn query_param(url: &str, name: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}
