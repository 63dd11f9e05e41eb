//! Storage capability traits.
//!
//! The engine never talks to a database directly. Each record shape has a
//! trait describing the operations the engine needs, including the atomic
//! compound operations the one-time-use guarantees rest on:
//!
//! - [`ClientStorage`] - read-only client registry lookup
//! - [`AuthRequestStorage`] - authorization requests, compare-and-swap on status
//! - [`AuthCodeStorage`] - authorization codes, atomic claim
//! - [`RefreshTokenStorage`] - refresh tokens, atomic rotate
//!
//! # Implementations
//!
//! - `deci-auth-memory` - in-process storage backed by `dashmap`
//!
//! Adapter errors should be reported as
//! [`AuthError::StorageUnavailable`](crate::AuthError::StorageUnavailable).
//! The engine wraps every call in [`with_timeout`], so an adapter that hangs
//! surfaces the same way.

pub mod auth_code;
pub mod auth_request;
pub mod client;
pub mod refresh_token;

#[cfg(test)]
pub(crate) mod testing;

use std::future::Future;
use std::time::Duration;

pub use auth_code::{AuthCodeStorage, CodeClaim};
pub use auth_request::AuthRequestStorage;
pub use client::ClientStorage;
pub use refresh_token::{RefreshClaim, RefreshTokenStorage};

use crate::{AuthError, AuthResult};

/// Runs a storage call with an upper bound on its duration.
///
/// # Errors
///
/// Returns `StorageUnavailable` when `limit` elapses, or the call's own error.
pub async fn with_timeout<T>(
    limit: Duration,
    operation: &'static str,
    call: impl Future<Output = AuthResult<T>>,
) -> AuthResult<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, timeout_ms = limit.as_millis() as u64, "Storage call timed out");
            Err(AuthError::storage_unavailable(format!(
                "{operation} timed out after {}ms",
                limit.as_millis()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_passes_result_through() {
        let value = with_timeout(Duration::from_secs(1), "get", async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_with_timeout_maps_elapsed_to_storage_unavailable() {
        let result: AuthResult<()> = with_timeout(Duration::from_millis(10), "get", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        let err = result.unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("get timed out"));
    }
}
