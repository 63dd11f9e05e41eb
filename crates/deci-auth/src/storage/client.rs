//! Client registry storage trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::Client;

/// Read-only access to registered clients.
///
/// Registration and mutation happen outside the engine.
#[async_trait]
pub trait ClientStorage: Send + Sync {
    /// Finds a client by its identifier.
    ///
    /// Returns `None` for unknown clients. Inactive clients may be returned;
    /// the registry adapter treats them as unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get_client(&self, client_id: &str) -> AuthResult<Option<Client>>;
}
