//! Lock-based mock storage for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    AuthCodeStorage, AuthRequestStorage, ClientStorage, CodeClaim, RefreshClaim,
    RefreshTokenStorage,
};
use crate::AuthResult;
use crate::oauth::{AuthCode, AuthRequest, AuthRequestStatus};
use crate::types::{Client, RefreshToken};

#[derive(Default)]
pub(crate) struct MockStorage {
    pub clients: RwLock<HashMap<String, Client>>,
    pub requests: RwLock<HashMap<Uuid, AuthRequest>>,
    pub codes: RwLock<HashMap<String, AuthCode>>,
    pub refresh_tokens: RwLock<HashMap<String, RefreshToken>>,
    pub revoked_families: RwLock<HashSet<Uuid>>,
}

impl MockStorage {
    pub fn with_clients(clients: impl IntoIterator<Item = Client>) -> Self {
        let storage = Self::default();
        {
            let mut map = storage.clients.write().unwrap();
            for client in clients {
                map.insert(client.client_id.clone(), client);
            }
        }
        storage
    }

    pub fn request(&self, id: Uuid) -> Option<AuthRequest> {
        self.requests.read().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl ClientStorage for MockStorage {
    async fn get_client(&self, client_id: &str) -> AuthResult<Option<Client>> {
        Ok(self.clients.read().unwrap().get(client_id).cloned())
    }
}

#[async_trait]
impl AuthRequestStorage for MockStorage {
    async fn create(&self, request: &AuthRequest) -> AuthResult<()> {
        self.requests
            .write()
            .unwrap()
            .insert(request.id, request.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> AuthResult<Option<AuthRequest>> {
        Ok(self.request(id))
    }

    async fn update(&self, request: &AuthRequest, expected: AuthRequestStatus) -> AuthResult<bool> {
        let mut requests = self.requests.write().unwrap();
        match requests.get_mut(&request.id) {
            Some(stored) if stored.status == expected => {
                *stored = request.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn expire_stale(&self, now: OffsetDateTime) -> AuthResult<u64> {
        let mut count = 0;
        for request in self.requests.write().unwrap().values_mut() {
            if request.is_open() && request.is_expired_at(now) {
                request.status = AuthRequestStatus::Expired;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn purge(&self, before: OffsetDateTime) -> AuthResult<u64> {
        let mut requests = self.requests.write().unwrap();
        let len = requests.len();
        requests.retain(|_, r| r.is_open() || r.expires_at >= before);
        Ok((len - requests.len()) as u64)
    }
}

#[async_trait]
impl AuthCodeStorage for MockStorage {
    async fn create(&self, code: &AuthCode) -> AuthResult<bool> {
        let mut codes = self.codes.write().unwrap();
        if codes.contains_key(&code.code) {
            return Ok(false);
        }
        codes.insert(code.code.clone(), code.clone());
        Ok(true)
    }

    async fn get(&self, code: &str) -> AuthResult<Option<AuthCode>> {
        Ok(self.codes.read().unwrap().get(code).cloned())
    }

    async fn consume(&self, code: &str, now: OffsetDateTime) -> AuthResult<CodeClaim> {
        let mut codes = self.codes.write().unwrap();
        let Some(stored) = codes.get_mut(code) else {
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
        let mut codes = self.codes.write().unwrap();
        let len = codes.len();
        codes.retain(|_, c| !c.is_expired_at(now));
        Ok((len - codes.len()) as u64)
    }
}

#[async_trait]
impl RefreshTokenStorage for MockStorage {
    async fn create(&self, token: &RefreshToken) -> AuthResult<bool> {
        let revoked = self.revoked_families.read().unwrap();
        if revoked.contains(&token.family_id) {
            return Ok(false);
        }
        self.refresh_tokens
            .write()
            .unwrap()
            .insert(token.token_hash.clone(), token.clone());
        Ok(true)
    }

    async fn find_by_hash(&self, token_hash: &str) -> AuthResult<Option<RefreshToken>> {
        Ok(self.refresh_tokens.read().unwrap().get(token_hash).cloned())
    }

    async fn consume_or_rotate(
        &self,
        token_hash: &str,
        replacement: &RefreshToken,
        now: OffsetDateTime,
    ) -> AuthResult<RefreshClaim> {
        let revoked = self.revoked_families.read().unwrap();
        let mut tokens = self.refresh_tokens.write().unwrap();
        let Some(stored) = tokens.get_mut(token_hash) else {
            return Ok(RefreshClaim::NotFound);
        };
        if stored.is_revoked() || revoked.contains(&stored.family_id) {
            return Ok(RefreshClaim::Revoked(stored.clone()));
        }
        if stored.is_expired_at(now) {
            return Ok(RefreshClaim::Expired(stored.clone()));
        }
        if stored.is_rotated() {
            return Ok(RefreshClaim::Reused(stored.clone()));
        }
        stored.rotated_at = Some(now);
        let old = stored.clone();
        tokens.insert(replacement.token_hash.clone(), replacement.clone());
        Ok(RefreshClaim::Rotated(old))
    }

    async fn revoke_family(&self, family_id: Uuid, now: OffsetDateTime) -> AuthResult<u64> {
        self.revoked_families.write().unwrap().insert(family_id);
        let mut count = 0;
        for token in self.refresh_tokens.write().unwrap().values_mut() {
            if token.family_id == family_id && token.revoked_at.is_none() {
                token.revoked_at = Some(now);
                count += 1;
            }
        }
        Ok(count)
    }

    async fn cleanup_expired(&self, now: OffsetDateTime) -> AuthResult<u64> {
        let mut tokens = self.refresh_tokens.write().unwrap();
        let len = tokens.len();
        tokens.retain(|_, t| !t.is_expired_at(now));
        Ok((len - tokens.len()) as u64)
    }
}
