//! Token signing and issuance.
//!
//! - [`keys`] - signing key lifecycle and the published key set
//! - [`jwt`] - key material, JWT claims and JWKS types
//! - [`claims`] - scope-to-claims assembly
//! - [`service`] - the [`TokenIssuer`]

pub mod claims;
pub mod jwt;
pub mod keys;
pub mod service;

pub use claims::{AssembledClaims, ClaimsAssembler, claims_for_scope};
pub use jwt::{
    AccessTokenClaims, IdTokenClaims, Jwk, Jwks, JwtError, SigningAlgorithm, SigningKeyPair,
};
pub use keys::{KeyManager, KeySet, KeyStatus, SigningKey};
pub use service::{IssuedToken, TokenConfig, TokenIssuer};
