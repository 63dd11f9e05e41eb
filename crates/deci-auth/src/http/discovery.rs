//! OpenID Provider discovery.
//!
//! Serves `/.well-known/openid-configuration` (OpenID Connect Discovery 1.0
//! §3). The document is built once from configuration; nothing in it changes
//! at runtime.

use axum::Json;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use super::AuthState;
use crate::config::AuthConfig;
use crate::token::claims_for_scope;

/// Claims every ID token carries regardless of scope.
const BASE_CLAIMS: &[&str] = &["iss", "sub", "aud", "exp", "iat", "auth_time", "nonce", "azp"];

/// OpenID Provider metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
    pub scopes_supported: Vec<String>,
    pub claims_supported: Vec<String>,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
}

impl ProviderMetadata {
    /// Builds the document for `config.issuer`.
    ///
    /// An unparseable algorithm falls back to the configured string;
    /// [`AuthConfig::validate`] rejects that case at startup.
    #[must_use]
    pub fn from_config(config: &AuthConfig) -> Self {
        let base = config.issuer.trim_end_matches('/');

        let mut claims_supported: Vec<String> =
            BASE_CLAIMS.iter().map(|c| (*c).to_string()).collect();
        for scope in &config.oauth.supported_scopes {
            for claim in claims_for_scope(scope) {
                if !claims_supported.iter().any(|c| c == claim) {
                    claims_supported.push((*claim).to_string());
                }
            }
        }

        let algorithm = config
            .signing
            .signing_algorithm()
            .map(|alg| alg.as_str().to_string())
            .unwrap_or_else(|_| config.signing.algorithm.clone());

        Self {
            issuer: config.issuer.clone(),
            authorization_endpoint: format!("{base}/auth"),
            token_endpoint: format!("{base}/token"),
            jwks_uri: format!("{base}/jwks.json"),
            scopes_supported: config.oauth.supported_scopes.clone(),
            claims_supported,
            response_types_supported: vec!["code".to_string()],
            grant_types_supported: vec![
                "authorization_code".to_string(),
                "refresh_token".to_string(),
            ],
            subject_types_supported: vec!["public".to_string()],
            id_token_signing_alg_values_supported: vec![algorithm],
            token_endpoint_auth_methods_supported: vec![
                "client_secret_basic".to_string(),
                "client_secret_post".to_string(),
                "none".to_string(),
            ],
            code_challenge_methods_supported: vec!["S256".to_string(), "plain".to_string()],
        }
    }
}

/// Handler for `GET /.well-known/openid-configuration`.
pub async fn openid_configuration_handler(State(state): State<AuthState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/json")],
        Json(state.metadata.as_ref().clone()),
    )
}
