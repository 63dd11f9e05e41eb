//! Authorization state machine.
//!
//! [`AuthorizationService`] drives one [`AuthRequest`] from `pending` through
//! `authenticated` to `code_issued`, or to `denied`/`expired`. It holds no
//! in-process lock: every transition is a compare-and-swap on the stored
//! status, and a lost race is resolved by re-reading the record and
//! re-evaluating it.
//!
//! # Usage
//!
//! ```ignore
//! let request = service.start(&params, now).await?;
//! // ... user logs in at the external login UI ...
//! let redirect = service.complete_authentication(result, now).await?;
//! ```

use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{AuthConfig, to_time_duration};
use crate::oauth::authorize::{AuthorizationError, AuthorizationRequest, AuthorizationResponse};
use crate::oauth::client_registry::ClientRegistry;
use crate::oauth::code::AuthCode;
use crate::oauth::pkce::{PkceChallenge, PkceChallengeMethod};
use crate::oauth::request::{
    AuthRequest, AuthRequestStatus, Authentication, AuthenticationResult,
};
use crate::storage::{AuthCodeStorage, AuthRequestStorage, with_timeout};
use crate::types::{Client, GrantType};
use crate::{AuthError, AuthResult};

/// Validity windows and policy for the authorization flow.
#[derive(Debug, Clone)]
pub struct AuthorizationConfig {
    /// How long a request may wait for authentication and code issuance.
    pub auth_validity: Duration,

    /// Lifetime of an issued code.
    pub code_validity: Duration,

    /// PKCE default for clients without a per-client override.
    pub require_pkce_for_public_clients: bool,

    /// Bound on each storage call.
    pub operation_timeout: std::time::Duration,
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self {
            auth_validity: Duration::minutes(5),
            code_validity: Duration::minutes(5),
            require_pkce_for_public_clients: true,
            operation_timeout: std::time::Duration::from_secs(5),
        }
    }
}

impl AuthorizationConfig {
    /// Extracts the flow settings from the engine configuration.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if a duration is out of range.
    pub fn from_auth_config(config: &AuthConfig) -> AuthResult<Self> {
        Ok(Self {
            auth_validity: to_time_duration(config.oauth.auth_validity_time)?,
            code_validity: to_time_duration(config.oauth.code_validity_time)?,
            require_pkce_for_public_clients: config.oauth.require_pkce_for_public_clients,
            operation_timeout: config.storage.operation_timeout,
        })
    }
}

/// Failure of [`AuthorizationService::start`].
///
/// Carries where, if anywhere, the error may be delivered. Errors raised
/// before the client and redirect URI are trusted must be shown to the user
/// agent instead of redirected, or the endpoint becomes an open redirector.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct AuthorizeError {
    pub error: AuthError,
    redirect_uri: Option<String>,
    state: Option<String>,
}

impl AuthorizeError {
    fn direct(error: AuthError) -> Self {
        Self {
            error,
            redirect_uri: None,
            state: None,
        }
    }

    fn redirect(error: AuthError, params: &AuthorizationRequest) -> Self {
        Self {
            error,
            redirect_uri: Some(params.redirect_uri.clone()),
            state: params.state.clone(),
        }
    }

    /// Client redirect carrying the error, if the redirect URI was validated.
    #[must_use]
    pub fn redirect_url(&self) -> Option<String> {
        let redirect_uri = self.redirect_uri.as_deref()?;
        AuthorizationError::from_auth_error(&self.error, self.state.clone())
            .to_redirect_url(redirect_uri)
            .ok()
    }
}

impl From<AuthorizeError> for AuthError {
    fn from(err: AuthorizeError) -> Self {
        err.error
    }
}

/// Counts from one [`AuthorizationService::cleanup`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub expired_requests: u64,
    pub purged_requests: u64,
    pub deleted_codes: u64,
}

/// Drives authorization requests through their lifecycle.
pub struct AuthorizationService {
    clients: ClientRegistry,
    requests: Arc<dyn AuthRequestStorage>,
    codes: Arc<dyn AuthCodeStorage>,
    config: AuthorizationConfig,
}

impl AuthorizationService {
    #[must_use]
    pub fn new(
        clients: ClientRegistry,
        requests: Arc<dyn AuthRequestStorage>,
        codes: Arc<dyn AuthCodeStorage>,
        config: AuthorizationConfig,
    ) -> Self {
        Self {
            clients,
            requests,
            codes,
            config,
        }
    }

    /// Validates an authorization request and persists it as `pending`.
    ///
    /// Client and redirect URI are checked first; any later failure is
    /// redirectable to the client.
    ///
    /// # Errors
    ///
    /// - `InvalidClient` (not redirectable) for an unknown client or
    ///   unregistered redirect URI
    /// - `UnsupportedResponseType` unless `response_type=code`
    /// - `UnauthorizedClient` if the client may not use the code grant
    /// - `InvalidScope` if `openid` is missing or a scope is not allowed
    /// - `InvalidRequest` for bad or missing PKCE parameters
    /// - `StorageUnavailable`
    pub async fn start(
        &self,
        params: &AuthorizationRequest,
        now: OffsetDateTime,
    ) -> Result<AuthRequest, AuthorizeError> {
        let client = self
            .clients
            .resolve_for_redirect(&params.client_id, &params.redirect_uri)
            .await
            .map_err(AuthorizeError::direct)?;

        let request = self
            .validate(&client, params, now)
            .map_err(|e| AuthorizeError::redirect(e, params))?;

        with_timeout(
            self.config.operation_timeout,
            "create_auth_request",
            self.requests.create(&request),
        )
        .await
        .map_err(|e| AuthorizeError::redirect(e, params))?;

        info!(
            request_id = %request.id,
            client_id = %request.client_id,
            scope = %request.scope_string(),
            pkce = request.code_challenge.is_some(),
            "Authorization request created"
        );
        Ok(request)
    }

    fn validate(
        &self,
        client: &Client,
        params: &AuthorizationRequest,
        now: OffsetDateTime,
    ) -> AuthResult<AuthRequest> {
        if params.response_type != "code" {
            return Err(AuthError::unsupported_response_type(&params.response_type));
        }

        if !client.is_grant_type_allowed(GrantType::AuthorizationCode) {
            return Err(AuthError::unauthorized_client(
                "client is not allowed the authorization_code grant",
            ));
        }

        let scopes = parse_scopes(&params.scope);
        if !scopes.iter().any(|s| s == "openid") {
            return Err(AuthError::invalid_scope("scope must include openid"));
        }
        if let Some(scope) = scopes.iter().find(|s| !client.is_scope_allowed(s)) {
            return Err(AuthError::invalid_scope(format!(
                "scope '{scope}' is not allowed for this client"
            )));
        }

        let (code_challenge, code_challenge_method) = self.validate_pkce(client, params)?;

        Ok(AuthRequest {
            id: Uuid::new_v4(),
            client_id: client.client_id.clone(),
            redirect_uri: params.redirect_uri.clone(),
            scopes,
            code_challenge,
            code_challenge_method,
            state: non_empty(&params.state),
            nonce: non_empty(&params.nonce),
            created_at: now,
            expires_at: now + self.config.auth_validity,
            status: AuthRequestStatus::Pending,
            authentication: None,
            code: None,
        })
    }

    fn validate_pkce(
        &self,
        client: &Client,
        params: &AuthorizationRequest,
    ) -> AuthResult<(Option<String>, Option<PkceChallengeMethod>)> {
        let challenge = non_empty(&params.code_challenge);
        let method = non_empty(&params.code_challenge_method);

        match (challenge, method) {
            (Some(challenge), method) => {
                let method = match method {
                    Some(m) => PkceChallengeMethod::parse(&m)
                        .map_err(|e| AuthError::invalid_request(e.to_string()))?,
                    None => PkceChallengeMethod::Plain,
                };
                PkceChallenge::new(challenge.clone(), method)
                    .map_err(|e| AuthError::invalid_request(e.to_string()))?;
                Ok((Some(challenge), Some(method)))
            }
            (None, Some(_)) => Err(AuthError::invalid_request(
                "code_challenge_method without code_challenge",
            )),
            (None, None) if client.requires_pkce(self.config.require_pkce_for_public_clients) => {
                Err(AuthError::invalid_request("code_challenge is required"))
            }
            (None, None) => Ok((None, None)),
        }
    }

    /// Loads a request, applying the on-access expiry check.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` if unknown, `RequestExpired` if past its window
    /// (the request is persisted as `expired`), or `StorageUnavailable`.
    pub async fn get(&self, request_id: Uuid, now: OffsetDateTime) -> AuthResult<AuthRequest> {
        let request = self.load(request_id).await?;
        if request.status == AuthRequestStatus::Expired {
            return Err(AuthError::RequestExpired);
        }
        if request.is_open() && request.is_expired_at(now) {
            return Err(self.expire(request).await);
        }
        Ok(request)
    }

    /// `pending -> authenticated`.
    ///
    /// Re-posting the same subject for a request that already moved on is a
    /// no-op returning the stored request.
    ///
    /// # Errors
    ///
    /// `RequestExpired`, `RequestAlreadyFinalized` for denied requests or a
    /// different subject, `InvalidRequest` for an unknown request or empty
    /// subject, or `StorageUnavailable`.
    pub async fn authenticate(
        &self,
        result: AuthenticationResult,
        now: OffsetDateTime,
    ) -> AuthResult<AuthRequest> {
        if result.subject.is_empty() {
            return Err(AuthError::invalid_request("authentication result has no subject"));
        }

        loop {
            let request = self.get(result.request_id, now).await?;
            match request.status {
                AuthRequestStatus::Pending => {
                    let mut next = request.clone();
                    next.status = AuthRequestStatus::Authenticated;
                    next.authentication = Some(Authentication::from(result.clone()));
                    if self.swap(&next, AuthRequestStatus::Pending).await? {
                        debug!(request_id = %next.id, subject = %result.subject, "Request authenticated");
                        return Ok(next);
                    }
                }
                AuthRequestStatus::Authenticated | AuthRequestStatus::CodeIssued => {
                    let same_subject = request
                        .authentication
                        .as_ref()
                        .is_some_and(|a| a.subject == result.subject);
                    if same_subject {
                        return Ok(request);
                    }
                    warn!(
                        target: "deci::audit",
                        request_id = %request.id,
                        "Authentication posted for a different subject"
                    );
                    return Err(AuthError::already_finalized("request already authenticated"));
                }
                AuthRequestStatus::Denied => {
                    return Err(AuthError::already_finalized("request was denied"));
                }
                AuthRequestStatus::Expired => return Err(AuthError::RequestExpired),
            }
        }
    }

    /// `authenticated -> code_issued`.
    ///
    /// The code record is written before the status swap. If the swap is lost
    /// to a concurrent caller the orphaned code is never exchangeable, because
    /// exchange requires the request to name it.
    ///
    /// For a request already in `code_issued` this replays the stored code
    /// while it is unused and unexpired.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` if the request is not authenticated,
    /// `RequestAlreadyFinalized`, `RequestExpired`, or `StorageUnavailable`.
    pub async fn issue_code(
        &self,
        request_id: Uuid,
        now: OffsetDateTime,
    ) -> AuthResult<AuthorizationResponse> {
        loop {
            let request = self.get(request_id, now).await?;
            match request.status {
                AuthRequestStatus::Authenticated => {
                    let code = AuthCode::new(
                        AuthCode::generate_code(),
                        request.id,
                        &request.client_id,
                        now,
                        self.config.code_validity,
                    );
                    let created = with_timeout(
                        self.config.operation_timeout,
                        "create_auth_code",
                        self.codes.create(&code),
                    )
                    .await?;
                    if !created {
                        return Err(AuthError::internal("authorization code collision"));
                    }

                    let mut next = request.clone();
                    next.status = AuthRequestStatus::CodeIssued;
                    next.code = Some(code.code.clone());
                    if self.swap(&next, AuthRequestStatus::Authenticated).await? {
                        info!(
                            request_id = %next.id,
                            client_id = %next.client_id,
                            expires_at = %code.expires_at,
                            "Authorization code issued"
                        );
                        return Ok(AuthorizationResponse::new(code.code, next.state));
                    }
                }
                AuthRequestStatus::CodeIssued => return self.replay_code(&request, now).await,
                AuthRequestStatus::Pending => {
                    return Err(AuthError::invalid_request("request is not authenticated"));
                }
                AuthRequestStatus::Denied => {
                    return Err(AuthError::already_finalized("request was denied"));
                }
                AuthRequestStatus::Expired => return Err(AuthError::RequestExpired),
            }
        }
    }

    async fn replay_code(
        &self,
        request: &AuthRequest,
        now: OffsetDateTime,
    ) -> AuthResult<AuthorizationResponse> {
        let Some(code) = &request.code else {
            return Err(AuthError::internal("code_issued request without a code"));
        };
        let stored = with_timeout(
            self.config.operation_timeout,
            "get_auth_code",
            self.codes.get(code),
        )
        .await?;

        match stored {
            Some(stored) if !stored.used && !stored.is_expired_at(now) => {
                debug!(request_id = %request.id, "Replaying issued code");
                Ok(AuthorizationResponse::new(stored.code, request.state.clone()))
            }
            Some(stored) if stored.used => {
                Err(AuthError::already_finalized("authorization code already redeemed"))
            }
            _ => Err(AuthError::already_finalized("authorization code expired")),
        }
    }

    /// Authenticates and issues a code in one step, returning the client
    /// redirect. Idempotent for requests already in `code_issued`.
    ///
    /// # Errors
    ///
    /// See [`authenticate`](Self::authenticate) and
    /// [`issue_code`](Self::issue_code).
    pub async fn complete_authentication(
        &self,
        result: AuthenticationResult,
        now: OffsetDateTime,
    ) -> AuthResult<String> {
        let request = self.authenticate(result, now).await?;
        let response = self.issue_code(request.id, now).await?;
        response
            .to_redirect_url(&request.redirect_uri)
            .map_err(|e| AuthError::internal(format!("stored redirect_uri does not parse: {e}")))
    }

    /// Moves an open request to `denied` and returns the `access_denied`
    /// redirect. Denying an already denied request returns the same redirect.
    ///
    /// # Errors
    ///
    /// `RequestAlreadyFinalized` once a code was issued, `RequestExpired`,
    /// `InvalidRequest` for an unknown request, or `StorageUnavailable`.
    pub async fn deny(
        &self,
        request_id: Uuid,
        reason: Option<&str>,
        now: OffsetDateTime,
    ) -> AuthResult<String> {
        let error = AuthError::access_denied(reason.unwrap_or("the user denied the request"));
        loop {
            let request = self.get(request_id, now).await?;
            match request.status {
                AuthRequestStatus::Pending | AuthRequestStatus::Authenticated => {
                    let expected = request.status;
                    let mut next = request.clone();
                    next.status = AuthRequestStatus::Denied;
                    if self.swap(&next, expected).await? {
                        info!(
                            target: "deci::audit",
                            request_id = %next.id,
                            client_id = %next.client_id,
                            "Authorization request denied"
                        );
                        return self.error_redirect(&next, &error);
                    }
                }
                AuthRequestStatus::Denied => return self.error_redirect(&request, &error),
                AuthRequestStatus::CodeIssued => {
                    return Err(AuthError::already_finalized("code already issued"));
                }
                AuthRequestStatus::Expired => return Err(AuthError::RequestExpired),
            }
        }
    }

    /// Builds the client redirect carrying `error` and the request's `state`.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the stored redirect URI does not parse.
    pub fn error_redirect(&self, request: &AuthRequest, error: &AuthError) -> AuthResult<String> {
        AuthorizationError::from_auth_error(error, request.state.clone())
            .to_redirect_url(&request.redirect_uri)
            .map_err(|e| AuthError::internal(format!("stored redirect_uri does not parse: {e}")))
    }

    /// Moves every open request past its window to `expired`.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the sweep fails.
    pub async fn expire_stale(&self, now: OffsetDateTime) -> AuthResult<u64> {
        with_timeout(
            self.config.operation_timeout,
            "expire_stale_requests",
            self.requests.expire_stale(now),
        )
        .await
    }

    /// Expires stale requests, deletes expired codes, and purges terminal
    /// requests no code can still refer to.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if any step fails.
    pub async fn cleanup(&self, now: OffsetDateTime) -> AuthResult<CleanupReport> {
        let expired_requests = self.expire_stale(now).await?;
        let deleted_codes = with_timeout(
            self.config.operation_timeout,
            "cleanup_auth_codes",
            self.codes.cleanup_expired(now),
        )
        .await?;
        let purged_requests = with_timeout(
            self.config.operation_timeout,
            "purge_auth_requests",
            self.requests.purge(now - self.config.code_validity),
        )
        .await?;

        Ok(CleanupReport {
            expired_requests,
            purged_requests,
            deleted_codes,
        })
    }

    async fn load(&self, request_id: Uuid) -> AuthResult<AuthRequest> {
        with_timeout(
            self.config.operation_timeout,
            "get_auth_request",
            self.requests.get(request_id),
        )
        .await?
        .ok_or_else(|| AuthError::invalid_request("unknown authorization request"))
    }

    async fn swap(&self, next: &AuthRequest, expected: AuthRequestStatus) -> AuthResult<bool> {
        if !expected.can_transition_to(next.status) {
            error!(request_id = %next.id, from = %expected, to = %next.status, "Illegal request status transition");
            return Err(AuthError::internal(format!(
                "illegal request transition {expected} -> {}",
                next.status
            )));
        }
        let swapped = with_timeout(
            self.config.operation_timeout,
            "update_auth_request",
            self.requests.update(next, expected),
        )
        .await?;
        if !swapped {
            debug!(request_id = %next.id, %expected, "Request status changed concurrently, re-reading");
        }
        Ok(swapped)
    }

    /// Persists `expired` for an open request and returns the error to
    /// surface. Storage failures take precedence.
    async fn expire(&self, mut request: AuthRequest) -> AuthError {
        loop {
            if !request.is_open() {
                return AuthError::RequestExpired;
            }
            let expected = request.status;
            request.status = AuthRequestStatus::Expired;
            match self.swap(&request, expected).await {
                Ok(true) => {
                    warn!(request_id = %request.id, client_id = %request.client_id, "Authorization request expired");
                    return AuthError::RequestExpired;
                }
                Ok(false) => match self.load(request.id).await {
                    Ok(current) => request = current,
                    Err(e) => return e,
                },
                Err(e) => return e,
            }
        }
    }
}

/// Splits a scope string, dropping duplicates and keeping first-seen order.
fn parse_scopes(scope: &str) -> Vec<String> {
    let mut scopes: Vec<String> = Vec::new();
    for s in scope.split_whitespace() {
        if !scopes.iter().any(|seen| seen == s) {
            scopes.push(s.to_string());
        }
    }
    scopes
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}
