//! Refresh token records.
//!
//! Refresh tokens are single-use. Each successful refresh retires the
//! presented record and inserts a successor in the same family; a family is
//! every token descended from one authorization request. Presenting a retired
//! token is treated as theft and revokes the whole family.
//!
//! Only a SHA-256 hash of the token is ever persisted.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Refresh token stored via [`RefreshTokenStorage`](crate::storage::RefreshTokenStorage).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefreshToken {
    /// Unique identifier for this record.
    pub id: Uuid,

    /// SHA-256 hash (hex) of the token value handed to the client.
    pub token_hash: String,

    /// Authorization request the family descends from.
    pub family_id: Uuid,

    /// Client the token was issued to.
    pub client_id: String,

    /// Authenticated end user.
    pub subject: String,

    /// Scopes granted at the original exchange; refresh can only narrow them.
    pub scopes: Vec<String>,

    /// When the user authenticated.
    #[serde(with = "time::serde::rfc3339")]
    pub auth_time: OffsetDateTime,

    /// When this token was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When this token stops being redeemable.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// Set when the token was exchanged for a successor.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub rotated_at: Option<OffsetDateTime>,

    /// Set when the family was revoked.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub revoked_at: Option<OffsetDateTime>,
}

impl RefreshToken {
    /// Returns `true` if the token is past its expiry at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now > self.expires_at
    }

    /// Returns `true` once the token has been exchanged.
    #[must_use]
    pub fn is_rotated(&self) -> bool {
        self.rotated_at.is_some()
    }

    /// Returns `true` if this token has been revoked.
    #[must_use]
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    /// Hash a token value using SHA-256.
    #[must_use]
    pub fn hash_token(token: &str) -> String {
        use sha2::{Digest, Sha256};
        hex::encode(Sha256::digest(token.as_bytes()))
    }

    /// Generate a 256-bit random token, base64url encoded (43 characters).
    #[must_use]
    pub fn generate_token() -> String {
        crate::oauth::code::random_token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn make_token(expires_at: OffsetDateTime) -> RefreshToken {
        let now = OffsetDateTime::now_utc();
        RefreshToken {
            id: Uuid::new_v4(),
            token_hash: RefreshToken::hash_token("value"),
            family_id: Uuid::new_v4(),
            client_id: "acme".to_string(),
            subject: "alice".to_string(),
            scopes: vec!["openid".to_string(), "offline_access".to_string()],
            auth_time: now,
            created_at: now,
            expires_at,
            rotated_at: None,
            revoked_at: None,
        }
    }

    #[test]
    fn test_hash_token() {
        let hash = RefreshToken::hash_token("test-token-value");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, RefreshToken::hash_token("test-token-value"));
        assert_ne!(hash, RefreshToken::hash_token("different-token"));
    }

    #[test]
    fn test_generate_token() {
        let token = RefreshToken::generate_token();
        assert_eq!(token.len(), 43);
        assert_ne!(token, RefreshToken::generate_token());
    }

    #[test]
    fn test_expiry_and_flags() {
        let now = OffsetDateTime::now_utc();
        let mut token = make_token(now + Duration::hours(1));
        assert!(!token.is_expired_at(now));
        assert!(token.is_expired_at(now + Duration::hours(2)));

        assert!(!token.is_rotated());
        token.rotated_at = Some(now);
        assert!(token.is_rotated());

        assert!(!token.is_revoked());
        token.revoked_at = Some(now);
        assert!(token.is_revoked());
    }

    #[test]
    fn test_serde_omits_unset_timestamps() {
        let token = make_token(OffsetDateTime::now_utc());
        let json = serde_json::to_string(&token).unwrap();
        assert!(!json.contains("rotated_at"));
        let parsed: RefreshToken = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, token);
    }
}
