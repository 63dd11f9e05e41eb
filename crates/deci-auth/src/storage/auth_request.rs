//! Authorization request storage trait.

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::oauth::{AuthRequest, AuthRequestStatus};

/// Storage for in-flight authorization requests.
///
/// Requests are persisted so a flow survives a process restart and so
/// several server instances can share one store.
#[async_trait]
pub trait AuthRequestStorage: Send + Sync {
    /// Stores a new request.
    ///
    /// # Errors
    ///
    /// Returns an error if a request with the same ID exists or the storage
    /// operation fails.
    async fn create(&self, request: &AuthRequest) -> AuthResult<()>;

    /// Finds a request by ID regardless of status.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get(&self, id: Uuid) -> AuthResult<Option<AuthRequest>>;

    /// Replaces the stored request if its status still equals `expected`.
    ///
    /// Returns `true` if the write happened, `false` if the stored status
    /// differs or the request no longer exists. The caller re-reads and
    /// re-evaluates on `false`.
    ///
    /// # Atomicity
    ///
    /// The comparison and the write must be one atomic step, e.g.
    ///
    /// ```sql
    /// UPDATE auth_requests SET data = $2, status = $3
    /// WHERE id = $1 AND status = $4
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn update(&self, request: &AuthRequest, expected: AuthRequestStatus) -> AuthResult<bool>;

    /// Moves every `pending`/`authenticated` request whose `expires_at` is
    /// before `now` to `expired`. Returns how many moved.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn expire_stale(&self, now: OffsetDateTime) -> AuthResult<u64>;

    /// Deletes terminal requests that expired before `before`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn purge(&self, before: OffsetDateTime) -> AuthResult<u64>;
}
