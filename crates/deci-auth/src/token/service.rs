//! Token issuance.
//!
//! [`TokenIssuer`] handles the two grants the token endpoint supports:
//!
//! - `authorization_code`: claims the code atomically, checks its bindings
//!   (client, redirect URI, PKCE) and mints an access token, an ID token
//!   when `openid` was granted and, with `offline_access`, a refresh token
//! - `refresh_token`: rotates the presented token and mints a new access
//!   token for the same or a narrower scope
//!
//! Every grant failure surfaces as the same `invalid_grant` error; the
//! specific cause goes to the audit log only.
//!
//! # Refresh policy
//!
//! Refresh tokens are single-use. A successful refresh retires the presented
//! token and returns a successor in the same family. Presenting a retired
//! token, or replaying a redeemed authorization code, revokes the family.

use std::sync::Arc;

use serde_json::{Map, Value};
use time::{Duration, OffsetDateTime};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{AuthConfig, to_time_duration};
use crate::oauth::pkce::PkceVerifier;
use crate::oauth::request::{AuthRequest, AuthRequestStatus};
use crate::oauth::token::TokenResponse;
use crate::storage::{
    AuthCodeStorage, AuthRequestStorage, CodeClaim, RefreshClaim, RefreshTokenStorage,
    with_timeout,
};
use crate::token::claims::ClaimsAssembler;
use crate::token::jwt::{AccessTokenClaims, IdTokenClaims};
use crate::token::keys::KeyManager;
use crate::types::{Client, GrantType, RefreshToken};
use crate::{AuthError, AuthResult};

const INVALID_CODE: &str = "invalid authorization code";
const INVALID_REFRESH_TOKEN: &str = "invalid refresh token";

/// Token lifetimes and storage bounds.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Lifetime of access and ID tokens.
    pub access_token_lifetime: Duration,

    /// Lifetime of each refresh token, restarted on rotation.
    pub refresh_token_lifetime: Duration,

    pub operation_timeout: std::time::Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_token_lifetime: Duration::hours(1),
            refresh_token_lifetime: Duration::days(30),
            operation_timeout: std::time::Duration::from_secs(5),
        }
    }
}

impl TokenConfig {
    /// # Errors
    ///
    /// Returns `Configuration` if a duration is out of range.
    pub fn from_auth_config(config: &AuthConfig) -> AuthResult<Self> {
        Ok(Self {
            access_token_lifetime: to_time_duration(config.oauth.token_validity_time)?,
            refresh_token_lifetime: to_time_duration(config.oauth.refresh_token_validity_time)?,
            operation_timeout: config.storage.operation_timeout,
        })
    }
}

/// Tokens minted for one grant.
///
/// `state` is never part of a token; it only travels in redirects.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub subject: String,
    pub client_id: String,
    /// Scopes actually granted.
    pub scopes: Vec<String>,
    pub issued_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    /// User claims embedded in the ID token.
    pub claims: Map<String, Value>,
    pub access_token: String,
    /// Absent on refresh.
    pub id_token: Option<String>,
    /// Plaintext refresh token; only its hash is stored.
    pub refresh_token: Option<String>,
    /// `kid` of the key that signed the tokens.
    pub key_id: String,
}

impl IssuedToken {
    /// Seconds until the access token expires.
    #[must_use]
    pub fn expires_in(&self) -> u64 {
        u64::try_from((self.expires_at - self.issued_at).whole_seconds()).unwrap_or(0)
    }

    #[must_use]
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }

    /// Converts into the token endpoint response body.
    #[must_use]
    pub fn into_response(self) -> TokenResponse {
        let mut response =
            TokenResponse::new(self.access_token.clone(), self.expires_in(), self.scope_string());
        if let Some(id_token) = self.id_token {
            response = response.with_id_token(id_token);
        }
        if let Some(refresh_token) = self.refresh_token {
            response = response.with_refresh_token(refresh_token);
        }
        response
    }
}

/// What a grant resolved to, ready for signing.
struct Grant {
    client_id: String,
    subject: String,
    scopes: Vec<String>,
    claims: Map<String, Value>,
    nonce: Option<String>,
    auth_time: OffsetDateTime,
    with_id_token: bool,
}

/// Exchanges codes and refresh tokens for signed tokens.
pub struct TokenIssuer {
    keys: Arc<KeyManager>,
    assembler: ClaimsAssembler,
    requests: Arc<dyn AuthRequestStorage>,
    codes: Arc<dyn AuthCodeStorage>,
    refresh_tokens: Arc<dyn RefreshTokenStorage>,
    config: TokenConfig,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(
        keys: Arc<KeyManager>,
        assembler: ClaimsAssembler,
        requests: Arc<dyn AuthRequestStorage>,
        codes: Arc<dyn AuthCodeStorage>,
        refresh_tokens: Arc<dyn RefreshTokenStorage>,
        config: TokenConfig,
    ) -> Self {
        Self {
            keys,
            assembler,
            requests,
            codes,
            refresh_tokens,
            config,
        }
    }

    /// The key manager tokens are signed with.
    #[must_use]
    pub fn keys(&self) -> &Arc<KeyManager> {
        &self.keys
    }

    /// Exchanges an authorization code.
    ///
    /// The code is claimed before any binding is checked, so a failed
    /// attempt still burns it.
    ///
    /// # Errors
    ///
    /// - `UnauthorizedClient` if the client may not use the code grant
    /// - `InvalidGrant` if the code is unknown, used, expired, issued to
    ///   another client, or fails the redirect URI or PKCE check
    /// - `KeyUnavailable` if no signing key is active
    /// - `StorageUnavailable`
    pub async fn exchange_code(
        &self,
        client: &Client,
        code: &str,
        redirect_uri: Option<&str>,
        code_verifier: Option<&str>,
        now: OffsetDateTime,
    ) -> AuthResult<IssuedToken> {
        if !client.is_grant_type_allowed(GrantType::AuthorizationCode) {
            return Err(AuthError::unauthorized_client(
                "client is not allowed the authorization_code grant",
            ));
        }

        let claim = with_timeout(
            self.config.operation_timeout,
            "consume_auth_code",
            self.codes.consume(code, now),
        )
        .await?;

        let code_record = match claim {
            CodeClaim::Claimed(record) => record,
            CodeClaim::NotFound => return Err(reject_code(client, "unknown code")),
            CodeClaim::Expired(_) => return Err(reject_code(client, "code expired")),
            CodeClaim::AlreadyUsed(record) => {
                warn!(
                    target: "deci::audit",
                    client_id = %client.client_id,
                    request_id = %record.request_id,
                    "Authorization code replayed; revoking token family"
                );
                self.revoke_family(record.request_id, now).await;
                return Err(AuthError::invalid_grant(INVALID_CODE));
            }
        };

        if code_record.client_id != client.client_id {
            return Err(reject_code(client, "code issued to another client"));
        }

        let request = with_timeout(
            self.config.operation_timeout,
            "get_auth_request",
            self.requests.get(code_record.request_id),
        )
        .await?
        .ok_or_else(|| reject_code(client, "request no longer exists"))?;

        check_code_bindings(&request, code, redirect_uri, code_verifier)
            .map_err(|reason| reject_code(client, reason))?;

        let Some(authentication) = &request.authentication else {
            return Err(reject_code(client, "request has no authentication"));
        };

        let assembled = self.assembler.assemble(&request, authentication);
        let wants_refresh = client.is_grant_type_allowed(GrantType::RefreshToken)
            && assembled.has_scope("offline_access");
        // No ID token unless the user actually granted `openid`.
        let with_id_token = assembled.has_scope("openid");

        let mut issued = self.sign(
            Grant {
                client_id: client.client_id.clone(),
                subject: authentication.subject.clone(),
                scopes: assembled.scopes,
                claims: assembled.claims,
                nonce: assembled.nonce,
                auth_time: authentication.authenticated_at,
                with_id_token,
            },
            now,
        )?;

        if wants_refresh {
            let (plaintext, record) = self.new_refresh_token(
                request.id,
                &issued.client_id,
                &issued.subject,
                issued.scopes.clone(),
                authentication.authenticated_at,
                now,
            );
            let stored = with_timeout(
                self.config.operation_timeout,
                "create_refresh_token",
                self.refresh_tokens.create(&record),
            )
            .await?;
            if !stored {
                // A replay of this code revoked the family while we were issuing.
                return Err(reject_code(client, "token family revoked during exchange"));
            }
            issued.refresh_token = Some(plaintext);
        }

        info!(
            target: "deci::audit",
            client_id = %issued.client_id,
            subject = %issued.subject,
            scope = %issued.scope_string(),
            kid = %issued.key_id,
            refresh = issued.refresh_token.is_some(),
            "Authorization code exchanged"
        );
        Ok(issued)
    }

    /// Rotates a refresh token and issues a new access token.
    ///
    /// `scope` may narrow the original grant but never widen it. No ID token
    /// is issued.
    ///
    /// # Errors
    ///
    /// - `UnauthorizedClient` if the client may not use the refresh grant
    /// - `InvalidScope` if `scope` asks for more than the original grant
    /// - `InvalidGrant` if the token is unknown, expired, revoked, already
    ///   rotated (which revokes its family) or issued to another client
    /// - `KeyUnavailable`, `StorageUnavailable`
    pub async fn refresh(
        &self,
        client: &Client,
        token: &str,
        scope: Option<&str>,
        now: OffsetDateTime,
    ) -> AuthResult<IssuedToken> {
        if !client.is_grant_type_allowed(GrantType::RefreshToken) {
            return Err(AuthError::unauthorized_client(
                "client is not allowed the refresh_token grant",
            ));
        }

        let token_hash = RefreshToken::hash_token(token);
        let current = with_timeout(
            self.config.operation_timeout,
            "find_refresh_token",
            self.refresh_tokens.find_by_hash(&token_hash),
        )
        .await?
        .ok_or_else(|| reject_refresh(client, "unknown token"))?;

        if current.client_id != client.client_id {
            return Err(reject_refresh(client, "token issued to another client"));
        }

        let scopes = narrow_scopes(&current.scopes, scope)?;

        let (plaintext, replacement) = self.new_refresh_token(
            current.family_id,
            &current.client_id,
            &current.subject,
            current.scopes.clone(),
            current.auth_time,
            now,
        );

        let claim = with_timeout(
            self.config.operation_timeout,
            "rotate_refresh_token",
            self.refresh_tokens
                .consume_or_rotate(&token_hash, &replacement, now),
        )
        .await?;

        let rotated = match claim {
            RefreshClaim::Rotated(old) => old,
            RefreshClaim::NotFound => return Err(reject_refresh(client, "unknown token")),
            RefreshClaim::Expired(_) => return Err(reject_refresh(client, "token expired")),
            RefreshClaim::Revoked(_) => return Err(reject_refresh(client, "token family revoked")),
            RefreshClaim::Reused(old) => {
                warn!(
                    target: "deci::audit",
                    client_id = %client.client_id,
                    family_id = %old.family_id,
                    "Refresh token reused; revoking token family"
                );
                self.revoke_family(old.family_id, now).await;
                return Err(AuthError::invalid_grant(INVALID_REFRESH_TOKEN));
            }
        };

        let mut issued = self.sign(
            Grant {
                client_id: rotated.client_id.clone(),
                subject: rotated.subject.clone(),
                scopes,
                claims: Map::new(),
                nonce: None,
                auth_time: rotated.auth_time,
                with_id_token: false,
            },
            now,
        )?;
        issued.refresh_token = Some(plaintext);

        info!(
            target: "deci::audit",
            client_id = %issued.client_id,
            subject = %issued.subject,
            family_id = %rotated.family_id,
            "Refresh token rotated"
        );
        Ok(issued)
    }

    /// Deletes expired refresh tokens.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the sweep fails.
    pub async fn cleanup_expired(&self, now: OffsetDateTime) -> AuthResult<u64> {
        with_timeout(
            self.config.operation_timeout,
            "cleanup_refresh_tokens",
            self.refresh_tokens.cleanup_expired(now),
        )
        .await
    }

    /// Signs both tokens with one key snapshot so they always share a `kid`.
    fn sign(&self, grant: Grant, now: OffsetDateTime) -> AuthResult<IssuedToken> {
        let key = self.keys.active_key()?;
        let expires_at = now + self.config.access_token_lifetime;
        let scope = grant.scopes.join(" ");

        let access_claims = AccessTokenClaims {
            iss: self.keys.issuer().to_string(),
            sub: grant.subject.clone(),
            aud: grant.client_id.clone(),
            exp: expires_at.unix_timestamp(),
            iat: now.unix_timestamp(),
            jti: Uuid::new_v4().to_string(),
            scope,
            client_id: grant.client_id.clone(),
        };
        let access_token = key.sign(&access_claims)?;

        let id_token = if grant.with_id_token {
            let id_claims = IdTokenClaims {
                iss: self.keys.issuer().to_string(),
                sub: grant.subject.clone(),
                aud: grant.client_id.clone(),
                exp: expires_at.unix_timestamp(),
                iat: now.unix_timestamp(),
                auth_time: grant.auth_time.unix_timestamp(),
                nonce: grant.nonce.clone(),
                azp: grant.client_id.clone(),
                claims: grant.claims.clone(),
            };
            Some(key.sign(&id_claims)?)
        } else {
            None
        };

        Ok(IssuedToken {
            subject: grant.subject,
            client_id: grant.client_id,
            scopes: grant.scopes,
            issued_at: now,
            expires_at,
            claims: grant.claims,
            access_token,
            id_token,
            refresh_token: None,
            key_id: key.kid,
        })
    }

    fn new_refresh_token(
        &self,
        family_id: Uuid,
        client_id: &str,
        subject: &str,
        scopes: Vec<String>,
        auth_time: OffsetDateTime,
        now: OffsetDateTime,
    ) -> (String, RefreshToken) {
        let plaintext = RefreshToken::generate_token();
        let record = RefreshToken {
            id: Uuid::new_v4(),
            token_hash: RefreshToken::hash_token(&plaintext),
            family_id,
            client_id: client_id.to_string(),
            subject: subject.to_string(),
            scopes,
            auth_time,
            created_at: now,
            expires_at: now + self.config.refresh_token_lifetime,
            rotated_at: None,
            revoked_at: None,
        };
        (plaintext, record)
    }

    /// Best effort: the grant is refused whether or not revocation succeeds.
    async fn revoke_family(&self, family_id: Uuid, now: OffsetDateTime) {
        match with_timeout(
            self.config.operation_timeout,
            "revoke_refresh_family",
            self.refresh_tokens.revoke_family(family_id, now),
        )
        .await
        {
            Ok(revoked) => {
                warn!(target: "deci::audit", %family_id, revoked, "Token family revoked");
            }
            Err(e) => {
                error!(%family_id, error = %e, "Failed to revoke token family");
            }
        }
    }
}

fn reject_code(client: &Client, reason: &str) -> AuthError {
    warn!(
        target: "deci::audit",
        client_id = %client.client_id,
        reason,
        "Authorization code rejected"
    );
    AuthError::invalid_grant(INVALID_CODE)
}

fn reject_refresh(client: &Client, reason: &str) -> AuthError {
    warn!(
        target: "deci::audit",
        client_id = %client.client_id,
        reason,
        "Refresh token rejected"
    );
    AuthError::invalid_grant(INVALID_REFRESH_TOKEN)
}

/// Checks that `code` is the one its request issued, that the redirect URI is
/// the negotiated one, and that the verifier satisfies the PKCE challenge.
fn check_code_bindings(
    request: &AuthRequest,
    code: &str,
    redirect_uri: Option<&str>,
    code_verifier: Option<&str>,
) -> Result<(), &'static str> {
    if request.status != AuthRequestStatus::CodeIssued || request.code.as_deref() != Some(code) {
        return Err("code is not bound to its request");
    }
    if redirect_uri != Some(request.redirect_uri.as_str()) {
        return Err("redirect_uri mismatch");
    }

    let challenge = request
        .pkce_challenge()
        .map_err(|_| "stored code_challenge is malformed")?;
    match (challenge, code_verifier) {
        (Some(challenge), Some(verifier)) => {
            let verifier =
                PkceVerifier::new(verifier.to_string()).map_err(|_| "malformed code_verifier")?;
            challenge
                .verify(&verifier)
                .map_err(|_| "code_verifier does not match")
        }
        (Some(_), None) => Err("code_verifier missing"),
        (None, Some(_)) => Err("code_verifier without negotiated challenge"),
        (None, None) => Ok(()),
    }
}

/// Scopes for a refreshed access token: the original grant, or the subset
/// `requested` names.
fn narrow_scopes(granted: &[String], requested: Option<&str>) -> AuthResult<Vec<String>> {
    let Some(requested) = requested.filter(|s| !s.trim().is_empty()) else {
        return Ok(granted.to_vec());
    };
    let requested: Vec<&str> = requested.split_whitespace().collect();
    if let Some(extra) = requested.iter().copied().find(|s| !granted.iter().any(|g| g == s)) {
        return Err(AuthError::invalid_scope(format!(
            "scope '{extra}' exceeds the original grant"
        )));
    }
    Ok(granted
        .iter()
        .filter(|g| requested.contains(&g.as_str()))
        .cloned()
        .collect())
}
