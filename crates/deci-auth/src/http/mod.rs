//! HTTP handlers for the protocol surface.
//!
//! # Available Handlers
//!
//! - [`authorize`] - authorization endpoint and login UI callbacks
//! - [`token`] - token endpoint (RFC 6749 §3.2)
//! - [`jwks`] - published signing keys
//! - [`discovery`] - OpenID Provider metadata
//!
//! All handlers share one [`AuthState`]. [`router`] mounts them at their
//! conventional paths.

pub mod authorize;
pub mod discovery;
pub mod jwks;
pub mod token;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

pub use authorize::{LoginEndpoint, authorize_handler, complete_handler, deny_handler};
pub use discovery::{ProviderMetadata, openid_configuration_handler};
pub use jwks::jwks_handler;
pub use token::token_handler;

use crate::oauth::{AuthorizationService, ClientRegistry};
use crate::token::TokenIssuer;

/// Shared state for every protocol endpoint.
#[derive(Clone)]
pub struct AuthState {
    pub authorization: Arc<AuthorizationService>,
    pub issuer: Arc<TokenIssuer>,
    pub clients: ClientRegistry,
    pub login: Arc<LoginEndpoint>,
    pub metadata: Arc<ProviderMetadata>,
}

impl AuthState {
    #[must_use]
    pub fn new(
        authorization: Arc<AuthorizationService>,
        issuer: Arc<TokenIssuer>,
        clients: ClientRegistry,
        login: LoginEndpoint,
        metadata: ProviderMetadata,
    ) -> Self {
        Self {
            authorization,
            issuer,
            clients,
            login: Arc::new(login),
            metadata: Arc::new(metadata),
        }
    }
}

/// Builds the protocol router.
///
/// | Method | Path | Handler |
/// |--------|------|---------|
/// | GET | `/auth` | [`authorize_handler`] |
/// | POST | `/auth/complete` | [`complete_handler`] |
/// | POST | `/auth/deny` | [`deny_handler`] |
/// | POST | `/token` | [`token_handler`] |
/// | GET | `/jwks.json` | [`jwks_handler`] |
/// | GET | `/.well-known/openid-configuration` | [`openid_configuration_handler`] |
/// | GET | `/healthz` | liveness probe |
pub fn router(state: AuthState) -> Router {
    Router::new()
        .route("/auth", get(authorize_handler))
        .route("/auth/complete", post(complete_handler))
        .route("/auth/deny", post(deny_handler))
        .route("/token", post(token_handler))
        .route("/jwks.json", get(jwks_handler))
        .route(
            "/.well-known/openid-configuration",
            get(openid_configuration_handler),
        )
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

#[cfg(test)]
pub(crate) mod testing {
    //! Router fixture over [`MockStorage`](crate::storage::testing::MockStorage).

    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, Response};
    use time::OffsetDateTime;
    use tower::ServiceExt;

    use super::*;
    use crate::config::AuthConfig;
    use crate::oauth::AuthorizationConfig;
    use crate::storage::testing::MockStorage;
    use crate::token::{ClaimsAssembler, KeyManager, TokenConfig};
    use crate::types::Client;

    pub const ACME_CB: &str = "https://acme.example/cb";
    pub const LOGIN_URL: &str = "https://login.example.com/login";
    pub const SHARED_SECRET: &str = "login-ui-secret";

    pub fn acme() -> Client {
        Client::new(
            "acme",
            Some("acme-secret".to_string()),
            "Acme",
            vec![ACME_CB.to_string()],
        )
    }

    pub fn state() -> (AuthState, Arc<MockStorage>) {
        let mut config = AuthConfig::default();
        config.issuer = "https://id.example.com".to_string();

        let storage = Arc::new(MockStorage::with_clients([acme()]));
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

        let state = AuthState::new(
            Arc::new(authorization),
            Arc::new(issuer),
            clients,
            LoginEndpoint::new(LOGIN_URL, SHARED_SECRET),
            ProviderMetadata::from_config(&config),
        );
        (state, storage)
    }

    pub async fn send(state: &AuthState, request: Request<Body>) -> Response<Body> {
        router(state.clone()).oneshot(request).await.unwrap()
    }

    pub async fn json_body(response: Response<Body>) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}
