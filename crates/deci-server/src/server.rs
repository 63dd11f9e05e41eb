use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use deci_auth::http::{AuthState, LoginEndpoint, ProviderMetadata, router};
use deci_auth::oauth::{AuthorizationConfig, AuthorizationService, ClientRegistry};
use deci_auth::token::{ClaimsAssembler, KeyManager, TokenConfig, TokenIssuer};
use deci_auth_memory::{MemoryStorage, StaticClients};
use time::OffsetDateTime;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::maintenance::Maintenance;

/// The engine wired to in-memory storage, as configured.
pub struct Services {
    pub storage: Arc<MemoryStorage>,
    pub clients: ClientRegistry,
    pub authorization: Arc<AuthorizationService>,
    pub issuer: Arc<TokenIssuer>,
    login: LoginEndpoint,
    metadata: ProviderMetadata,
    cleanup_interval: std::time::Duration,
}

impl Services {
    /// Builds every service and generates the first signing key.
    pub fn from_config(cfg: &AppConfig, now: OffsetDateTime) -> anyhow::Result<Self> {
        let auth = &cfg.auth;
        let timeout = auth.storage.operation_timeout;

        let storage = Arc::new(MemoryStorage::new());
        let static_clients = StaticClients::new(cfg.clients.iter().cloned(), storage.clone());
        let clients = ClientRegistry::new(Arc::new(static_clients), timeout);

        let keys = Arc::new(KeyManager::new(auth, now)?);
        let authorization = Arc::new(AuthorizationService::new(
            clients.clone(),
            storage.clone(),
            storage.clone(),
            AuthorizationConfig::from_auth_config(auth)?,
        ));
        let issuer = Arc::new(TokenIssuer::new(
            keys,
            ClaimsAssembler::new(auth.oauth.supported_scopes.clone()),
            storage.clone(),
            storage.clone(),
            storage.clone(),
            TokenConfig::from_auth_config(auth)?,
        ));

        tracing::info!(
            issuer = %auth.issuer,
            clients = cfg.clients.len(),
            algorithm = %auth.signing.algorithm,
            "Authorization engine initialized"
        );

        Ok(Self {
            storage,
            clients,
            authorization,
            issuer,
            login: LoginEndpoint::new(cfg.login.url.clone(), cfg.login.shared_secret.clone()),
            metadata: ProviderMetadata::from_config(auth),
            cleanup_interval: auth.storage.cleanup_interval,
        })
    }

    pub fn auth_state(&self) -> AuthState {
        AuthState::new(
            self.authorization.clone(),
            self.issuer.clone(),
            self.clients.clone(),
            self.login.clone(),
            self.metadata.clone(),
        )
    }

    pub fn maintenance(&self) -> Maintenance {
        Maintenance::new(
            self.authorization.clone(),
            self.issuer.clone(),
            self.cleanup_interval,
        )
    }
}

pub fn build_app(services: &Services) -> Router {
    router(services.auth_state()).layer(
        TraceLayer::new_for_http()
            .make_span_with(|req: &axum::http::Request<_>| {
                use tracing::field::Empty;
                // Query strings carry state and codes; only the path is logged
                tracing::info_span!(
                    "http.request",
                    http.method = %req.method(),
                    http.target = %req.uri().path(),
                    http.status_code = Empty,
                )
            })
            .on_response(
                |res: &axum::http::Response<_>, latency: std::time::Duration, span: &tracing::Span| {
                    span.record("http.status_code", tracing::field::display(res.status().as_u16()));
                    tracing::info!(
                        http.status = %res.status().as_u16(),
                        elapsed_ms = %latency.as_millis(),
                        "request handled"
                    );
                },
            ),
    )
}

pub struct DeciServer {
    addr: SocketAddr,
    app: Router,
    maintenance: Maintenance,
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    pub fn build(self) -> anyhow::Result<DeciServer> {
        let services = Services::from_config(&self.config, OffsetDateTime::now_utc())?;
        Ok(DeciServer {
            addr: self.addr,
            app: build_app(&services),
            maintenance: services.maintenance(),
        })
    }
}

impl DeciServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);

        let (maintenance_tx, maintenance) = self.maintenance.start();
        let served = axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        let _ = maintenance_tx.send(true);
        let _ = maintenance.await;
        served?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
