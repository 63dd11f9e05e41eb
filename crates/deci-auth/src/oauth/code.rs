//! Authorization codes.
//!
//! A code is bound 1:1 to an [`AuthRequest`](super::AuthRequest) and flips
//! `used: false -> true` exactly once, inside the storage adapter's atomic
//! [`consume`](crate::storage::AuthCodeStorage::consume).

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// 256 bits of OS randomness, base64url without padding (43 characters).
pub(crate) fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// An issued authorization code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthCode {
    /// Opaque code value returned to the client.
    pub code: String,

    /// Request this code was minted for.
    pub request_id: Uuid,

    /// Client the request belongs to.
    pub client_id: String,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// `created_at + code_validity_time`.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// Set exactly once by a successful exchange.
    pub used: bool,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub used_at: Option<OffsetDateTime>,
}

impl AuthCode {
    /// Creates an unused code expiring after `validity`.
    #[must_use]
    pub fn new(
        code: String,
        request_id: Uuid,
        client_id: impl Into<String>,
        now: OffsetDateTime,
        validity: time::Duration,
    ) -> Self {
        Self {
            code,
            request_id,
            client_id: client_id.into(),
            created_at: now,
            expires_at: now + validity,
            used: false,
            used_at: None,
        }
    }

    /// Generates a new code value.
    #[must_use]
    pub fn generate_code() -> String {
        random_token()
    }

    /// Returns `true` if `now` is past the code's expiry.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now > self.expires_at
    }
}
