//! Authorization code flow.
//!
//! - [`authorize`] - authorization endpoint request/response types
//! - [`client_registry`] - client identity, redirect URI and secret checks
//! - [`request`] - the [`AuthRequest`] record and its status machine
//! - [`code`] - one-time authorization codes
//! - [`pkce`] - PKCE challenge/verifier (RFC 7636)
//! - [`service`] - the [`AuthorizationService`] state machine
//! - [`token`] - token endpoint request/response types
//!
//! # Example
//!
//! ```ignore
//! let request = authorization.start(&params, now).await?;
//! // the login UI authenticates the user and posts back an AuthenticationResult
//! let redirect = authorization.complete_authentication(result, now).await?;
//! // the client exchanges the code
//! let issued = issuer.exchange_code(&client, &code, Some(redirect_uri), verifier, now).await?;
//! ```

pub mod authorize;
pub mod client_registry;
pub mod code;
pub mod pkce;
pub mod request;
pub mod service;
pub mod token;

pub use authorize::{
    AuthorizationError, AuthorizationErrorCode, AuthorizationRequest, AuthorizationResponse,
};
pub use client_registry::ClientRegistry;
pub use code::AuthCode;
pub use pkce::{PkceChallenge, PkceChallengeMethod, PkceError, PkceVerifier};
pub use request::{
    AuthRequest, AuthRequestStatus, Authentication, AuthenticationResult, UserInfo,
};
pub use service::{AuthorizationConfig, AuthorizationService, AuthorizeError, CleanupReport};
pub use token::{TokenError, TokenErrorCode, TokenRequest, TokenResponse};
