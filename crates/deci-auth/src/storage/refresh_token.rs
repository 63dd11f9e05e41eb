//! Refresh token storage trait.

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::types::RefreshToken;

/// Outcome of an atomic refresh-token rotation.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshClaim {
    /// The presented token was live; it is now rotated and the replacement stored.
    Rotated(RefreshToken),
    /// No token with that hash.
    NotFound,
    /// The presented token was already rotated. Possible theft.
    Reused(RefreshToken),
    /// The presented token is past `expires_at`.
    Expired(RefreshToken),
    /// The token's family was revoked.
    Revoked(RefreshToken),
}

/// Storage for refresh tokens. Tokens are looked up by SHA-256 hash.
#[async_trait]
pub trait RefreshTokenStorage: Send + Sync {
    /// Stores a new refresh token.
    ///
    /// Returns `false` without storing anything when the token's family has
    /// already been revoked, even if the family had no tokens at the time.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn create(&self, token: &RefreshToken) -> AuthResult<bool>;

    /// Finds a token by hash.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_hash(&self, token_hash: &str) -> AuthResult<Option<RefreshToken>>;

    /// Atomically retires the token with `token_hash` and stores `replacement`.
    ///
    /// The replacement is written only when the outcome is
    /// [`RefreshClaim::Rotated`]. Checks run in the order revoked, expired,
    /// already rotated.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn consume_or_rotate(
        &self,
        token_hash: &str,
        replacement: &RefreshToken,
        now: OffsetDateTime,
    ) -> AuthResult<RefreshClaim>;

    /// Revokes every token in a family. Returns how many were revoked.
    ///
    /// The revocation outlives the call: tokens later created into the
    /// family are refused and rotation within it reports `Revoked`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn revoke_family(&self, family_id: Uuid, now: OffsetDateTime) -> AuthResult<u64>;

    /// Deletes tokens that expired before `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn cleanup_expired(&self, now: OffsetDateTime) -> AuthResult<u64>;
}
