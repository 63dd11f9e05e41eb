//! Domain types shared by the engine and storage adapters.
//!
//! - [`Client`] - relying-party registration
//! - [`GrantType`] - grants a client may use
//! - [`RefreshToken`] - persisted refresh token record

pub mod client;
pub mod refresh_token;

pub use client::{Client, ClientValidationError, GrantType};
pub use refresh_token::RefreshToken;
