//! In-memory storage adapter for `deci-auth`.
//!
//! [`MemoryStorage`] implements every storage capability the engine needs,
//! using `dashmap` for concurrent access. The compound operations
//! (compare-and-swap, claim, rotate) run under a per-entry write lock, so they
//! stay atomic across any number of tasks sharing one instance. State lives
//! only as long as the process.
//!
//! [`StaticClients`] overlays a fixed client list, typically loaded from
//! configuration, on top of any other [`ClientStorage`].
//!
//! # Example
//!
//! ```ignore
//! use deci_auth_memory::{MemoryStorage, StaticClients};
//!
//! let storage = Arc::new(MemoryStorage::new());
//! let clients = StaticClients::new(config.clients.clone(), storage.clone());
//! ```

mod clients;
mod storage;

pub use clients::StaticClients;
pub use storage::{MemoryStorage, REVOCATION_RETENTION};

pub use deci_auth::storage::{
    AuthCodeStorage, AuthRequestStorage, ClientStorage, RefreshTokenStorage,
};
