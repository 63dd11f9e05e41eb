//! # deci-auth
//!
//! OpenID Connect authorization and token issuance engine.
//!
//! This crate provides:
//! - The authorization code flow state machine, with PKCE
//! - Token issuance (access, ID and rotating refresh tokens)
//! - Signing key lifecycle with rotation and JWKS publication
//! - Storage capability traits for clients, requests, codes and refresh tokens
//! - Axum handlers for the protocol endpoints, discovery and JWKS
//!
//! ## Modules
//!
//! - [`config`] - Engine configuration
//! - [`error`] - The [`AuthError`] taxonomy
//! - [`oauth`] - Authorization requests, codes, PKCE and the state machine
//! - [`token`] - Signing keys, claims assembly and the token issuer
//! - [`storage`] - Storage traits the engine runs against
//! - [`types`] - Client registrations and refresh token records
//! - [`http`] - Axum HTTP handlers
//!
//! Storage is pluggable; `deci-auth-memory` provides an in-process adapter.

pub mod config;
pub mod error;
pub mod http;
pub mod oauth;
pub mod storage;
pub mod token;
pub mod types;

pub use config::{AuthConfig, ConfigError};
pub use error::{AuthError, ErrorCategory};
pub use http::{AuthState, LoginEndpoint, ProviderMetadata, router};
pub use oauth::{
    AuthCode, AuthRequest, AuthRequestStatus, AuthenticationResult, AuthorizationConfig,
    AuthorizationRequest, AuthorizationService, AuthorizeError, ClientRegistry, UserInfo,
};
pub use storage::{
    AuthCodeStorage, AuthRequestStorage, ClientStorage, CodeClaim, RefreshClaim,
    RefreshTokenStorage,
};
pub use token::{ClaimsAssembler, IssuedToken, KeyManager, TokenConfig, TokenIssuer};
pub use types::{Client, ClientValidationError, GrantType, RefreshToken};

/// Type alias for engine results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use deci_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::config::{AuthConfig, ConfigError};
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::http::{AuthState, LoginEndpoint, ProviderMetadata, router};
    pub use crate::oauth::{
        AuthRequest, AuthRequestStatus, AuthenticationResult, AuthorizationConfig,
        AuthorizationRequest, AuthorizationService, ClientRegistry, UserInfo,
    };
    pub use crate::storage::{
        AuthCodeStorage, AuthRequestStorage, ClientStorage, RefreshTokenStorage,
    };
    pub use crate::token::{ClaimsAssembler, IssuedToken, KeyManager, TokenConfig, TokenIssuer};
    pub use crate::types::{Client, GrantType, RefreshToken};
}
