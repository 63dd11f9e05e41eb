//! Authorization code storage trait.

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::oauth::AuthCode;

/// Outcome of an atomic code claim.
#[derive(Debug, Clone, PartialEq)]
pub enum CodeClaim {
    /// The code was unused and unexpired; it is now marked used.
    Claimed(AuthCode),
    /// No such code.
    NotFound,
    /// The code was already used. Carries the stored record.
    AlreadyUsed(AuthCode),
    /// The code is past `expires_at`, whether or not it was used.
    Expired(AuthCode),
}

/// Storage for authorization codes.
#[async_trait]
pub trait AuthCodeStorage: Send + Sync {
    /// Stores a new code.
    ///
    /// Returns `false` without writing if the code value already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn create(&self, code: &AuthCode) -> AuthResult<bool>;

    /// Finds a code without claiming it.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get(&self, code: &str) -> AuthResult<Option<AuthCode>>;

    /// Atomically reads the code and marks it used.
    ///
    /// Expiry is checked before the used flag, so an expired code reports
    /// [`CodeClaim::Expired`] even if it was never used. Under concurrent
    /// calls for the same code at most one returns [`CodeClaim::Claimed`].
    ///
    /// # Atomicity
    ///
    /// ```sql
    /// UPDATE auth_codes SET used = TRUE, used_at = $2
    /// WHERE code = $1 AND used = FALSE AND expires_at >= $2
    /// RETURNING *
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn consume(&self, code: &str, now: OffsetDateTime) -> AuthResult<CodeClaim>;

    /// Deletes codes that expired before `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn cleanup_expired(&self, now: OffsetDateTime) -> AuthResult<u64>;
}
