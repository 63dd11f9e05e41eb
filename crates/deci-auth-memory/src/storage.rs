use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use deci_auth::AuthResult;
use deci_auth::oauth::{AuthCode, AuthRequest, AuthRequestStatus};
use deci_auth::storage::{
    AuthCodeStorage, AuthRequestStorage, ClientStorage, CodeClaim, RefreshClaim,
    RefreshTokenStorage,
};
use deci_auth::types::{Client, RefreshToken};

/// In-memory storage using `DashMap` for concurrent access.
///
/// Refresh tokens are indexed by family. Any operation that touches a
/// family (create, rotate, revoke) takes the family entry first and the
/// token entry second, so a rotation and a revocation of the same family
/// are serialized and a successor is never inserted into a revoked family.
///
/// Revocation leaves a marker for the family, so a token created into it
/// after the fact (an exchange that lost a race with a code replay) is
/// refused. Markers are swept by `cleanup_expired` once older than
/// [`REVOCATION_RETENTION`].
#[derive(Debug, Default)]
pub struct MemoryStorage {
    clients: DashMap<String, Client>,
    requests: DashMap<Uuid, AuthRequest>,
    codes: DashMap<String, AuthCode>,
    /// Keyed by token hash.
    refresh_tokens: DashMap<String, RefreshToken>,
    /// Family id -> token hashes.
    families: DashMap<Uuid, Vec<String>>,
    /// Family id -> when it was revoked.
    revoked_families: DashMap<Uuid, OffsetDateTime>,
}

/// How long a revoked-family marker is kept.
pub const REVOCATION_RETENTION: time::Duration = time::Duration::days(1);

impl MemoryStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a storage pre-populated with clients.
    pub fn with_clients(clients: impl IntoIterator<Item = Client>) -> Self {
        let storage = Self::new();
        for client in clients {
            storage.insert_client(client);
        }
        storage
    }

    /// Registers or replaces a client.
    pub fn insert_client(&self, client: Client) {
        self.clients.insert(client.client_id.clone(), client);
    }

    /// Removes a client registration.
    pub fn remove_client(&self, client_id: &str) -> Option<Client> {
        self.clients.remove(client_id).map(|(_, client)| client)
    }

    /// Number of stored authorization requests.
    pub fn request_count(&self) -> usize {
        self.requests.len()
    }

    /// Number of stored authorization codes.
    pub fn code_count(&self) -> usize {
        self.codes.len()
    }

    /// Number of stored refresh tokens, including rotated and revoked ones.
    pub fn refresh_token_count(&self) -> usize {
        self.refresh_tokens.len()
    }
}

#[async_trait]
impl ClientStorage for MemoryStorage {
    async fn get_client(&self, client_id: &str) -> AuthResult<Option<Client>> {
        Ok(self.clients.get(client_id).map(|c| c.clone()))
    }
}

#[async_trait]
impl AuthRequestStorage for MemoryStorage {
    async fn create(&self, request: &AuthRequest) -> AuthResult<()> {
        self.requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> AuthResult<Option<AuthRequest>> {
        Ok(self.requests.get(&id).map(|r| r.clone()))
    }

    async fn update(&self, request: &AuthRequest, expected: AuthRequestStatus) -> AuthResult<bool> {
        let Some(mut stored) = self.requests.get_mut(&request.id) else {
            return Ok(false);
        };
        if stored.status != expected {
            return Ok(false);
        }
        *stored = request.clone();
        Ok(true)
    }

    async fn expire_stale(&self, now: OffsetDateTime) -> AuthResult<u64> {
        let mut expired = 0;
        for mut entry in self.requests.iter_mut() {
            if entry.is_open() && entry.is_expired_at(now) {
                entry.status = AuthRequestStatus::Expired;
                expired += 1;
            }
        }
        if expired > 0 {
            debug!(expired, "Expired stale authorization requests");
        }
        Ok(expired)
    }

    async fn purge(&self, before: OffsetDateTime) -> AuthResult<u64> {
        let len = self.requests.len();
        self.requests
            .retain(|_, request| request.is_open() || request.expires_at >= before);
        Ok(len.saturating_sub(self.requests.len()) as u64)
    }
}

#[async_trait]
impl AuthCodeStorage for MemoryStorage {
    async fn create(&self, code: &AuthCode) -> AuthResult<bool> {
        match self.codes.entry(code.code.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(code.clone());
                Ok(true)
            }
        }
    }

    async fn get(&self, code: &str) -> AuthResult<Option<AuthCode>> {
        Ok(self.codes.get(code).map(|c| c.clone()))
    }

    async fn consume(&self, code: &str, now: OffsetDateTime) -> AuthResult<CodeClaim> {
        let Some(mut stored) = self.codes.get_mut(code) else {
            return Ok(CodeClaim::NotFound);
        };
        if stored.is_expired_at(now) {
            return Ok(CodeClaim::Expired(stored.clone()));
        }
        if stored.used {
            return Ok(CodeClaim::AlreadyUsed(stored.clone()));
        }
        stored.used = true;
        stored.used_at = Some(now);
        Ok(CodeClaim::Claimed(stored.clone()))
    }

    async fn cleanup_expired(&self, now: OffsetDateTime) -> AuthResult<u64> {
        let len = self.codes.len();
        self.codes.retain(|_, code| !code.is_expired_at(now));
        Ok(len.saturating_sub(self.codes.len()) as u64)
    }
}

#[async_trait]
impl RefreshTokenStorage for MemoryStorage {
    async fn create(&self, token: &RefreshToken) -> AuthResult<bool> {
        let mut family = self.families.entry(token.family_id).or_default();
        if self.revoked_families.contains_key(&token.family_id) {
            debug!(family_id = %token.family_id, "Refresh token refused: family revoked");
            return Ok(false);
        }
        self.refresh_tokens
            .insert(token.token_hash.clone(), token.clone());
        family.push(token.token_hash.clone());
        Ok(true)
    }

    async fn find_by_hash(&self, token_hash: &str) -> AuthResult<Option<RefreshToken>> {
        Ok(self.refresh_tokens.get(token_hash).map(|t| t.clone()))
    }

    async fn consume_or_rotate(
        &self,
        token_hash: &str,
        replacement: &RefreshToken,
        now: OffsetDateTime,
    ) -> AuthResult<RefreshClaim> {
        let Some(family_id) = self.refresh_tokens.get(token_hash).map(|t| t.family_id) else {
            return Ok(RefreshClaim::NotFound);
        };

        let mut family = self.families.entry(family_id).or_default();
        let family_revoked = self.revoked_families.contains_key(&family_id);
        let old = {
            let Some(mut stored) = self.refresh_tokens.get_mut(token_hash) else {
                return Ok(RefreshClaim::NotFound);
            };
            if stored.is_revoked() || family_revoked {
                return Ok(RefreshClaim::Revoked(stored.clone()));
            }
            if stored.is_expired_at(now) {
                return Ok(RefreshClaim::Expired(stored.clone()));
            }
            if stored.is_rotated() {
                return Ok(RefreshClaim::Reused(stored.clone()));
            }
            stored.rotated_at = Some(now);
            stored.clone()
        };

        // The token guard is dropped before inserting: both keys may share a shard.
        self.refresh_tokens
            .insert(replacement.token_hash.clone(), replacement.clone());
        family.push(replacement.token_hash.clone());
        Ok(RefreshClaim::Rotated(old))
    }

    async fn revoke_family(&self, family_id: Uuid, now: OffsetDateTime) -> AuthResult<u64> {
        let family = self.families.entry(family_id).or_default();
        self.revoked_families.entry(family_id).or_insert(now);
        let mut revoked = 0;
        for hash in family.iter() {
            if let Some(mut token) = self.refresh_tokens.get_mut(hash) {
                if token.revoked_at.is_none() {
                    token.revoked_at = Some(now);
                    revoked += 1;
                }
            }
        }
        Ok(revoked)
    }

    async fn cleanup_expired(&self, now: OffsetDateTime) -> AuthResult<u64> {
        let len = self.refresh_tokens.len();
        self.refresh_tokens.retain(|_, token| !token.is_expired_at(now));
        let removed = len.saturating_sub(self.refresh_tokens.len()) as u64;

        self.families.retain(|_, hashes| {
            hashes.retain(|hash| self.refresh_tokens.contains_key(hash));
            !hashes.is_empty()
        });
        self.revoked_families
            .retain(|_, revoked_at| now - *revoked_at < REVOCATION_RETENTION);
        Ok(removed)
    }
}
