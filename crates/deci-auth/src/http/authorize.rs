//! Authorization endpoint and login UI callbacks.
//!
//! # Flow
//!
//! ```text
//! GET /auth?response_type=code&client_id=...
//!     │
//!     ├─► bad client / redirect_uri → 400 JSON (never redirected)
//!     ├─► other validation failure  → redirect to client with error + state
//!     └─► pending request created   → redirect to login UI ?request_id=<id>
//!
//! login UI authenticates the user, then
//!     POST /auth/complete  (Bearer <shared secret>) → { "redirect_uri": client?code&state }
//!     POST /auth/deny      (Bearer <shared secret>) → { "redirect_uri": client?error=access_denied&state }
//! ```

use axum::Json;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Redirect, Response};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use time::OffsetDateTime;
use tracing::{error, warn};
use uuid::Uuid;

use super::AuthState;
use crate::AuthError;
use crate::oauth::{AuthenticationResult, AuthorizationRequest};

/// The external login UI: where users are sent, and the bearer secret it
/// presents when posting results back.
#[derive(Clone)]
pub struct LoginEndpoint {
    url: String,
    shared_secret: String,
}

impl LoginEndpoint {
    pub fn new(url: impl Into<String>, shared_secret: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            shared_secret: shared_secret.into(),
        }
    }

    /// Login UI URL for one authorization request.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured login URL does not parse.
    pub fn url_for(&self, request_id: Uuid) -> Result<String, url::ParseError> {
        let mut url = url::Url::parse(&self.url)?;
        url.query_pairs_mut()
            .append_pair("request_id", &request_id.to_string());
        Ok(url.to_string())
    }

    /// Checks `Authorization: Bearer <secret>` in constant time.
    #[must_use]
    pub fn is_authorized(&self, headers: &HeaderMap) -> bool {
        let Some(presented) = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
        else {
            return false;
        };
        let expected = Sha256::digest(self.shared_secret.as_bytes());
        let presented = Sha256::digest(presented.as_bytes());
        expected.ct_eq(&presented).into()
    }
}

impl std::fmt::Debug for LoginEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginEndpoint")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

/// JSON error body for failures that are not redirected.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    error_description: String,
}

/// Response body of the login UI callbacks.
#[derive(Debug, Serialize, Deserialize)]
pub struct RedirectTarget {
    pub redirect_uri: String,
}

/// Body of `POST /auth/deny`.
#[derive(Debug, Deserialize)]
pub struct DenyRequest {
    pub request_id: Uuid,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Handler for `GET /auth`.
pub async fn authorize_handler(
    State(state): State<AuthState>,
    Query(params): Query<AuthorizationRequest>,
) -> Response {
    let now = OffsetDateTime::now_utc();
    match state.authorization.start(&params, now).await {
        Ok(request) => match state.login.url_for(request.id) {
            Ok(url) => Redirect::to(&url).into_response(),
            Err(e) => {
                error!(error = %e, "Login URL does not parse");
                error_response(&AuthError::configuration("invalid login url"))
            }
        },
        Err(err) => match err.redirect_url() {
            Some(url) => Redirect::to(&url).into_response(),
            None => error_response(&err.error),
        },
    }
}

/// Handler for `POST /auth/complete`.
///
/// Records the login UI's [`AuthenticationResult`], issues a code, and
/// returns the client redirect for the login UI to send the browser to.
pub async fn complete_handler(
    State(state): State<AuthState>,
    headers: HeaderMap,
    Json(result): Json<AuthenticationResult>,
) -> Response {
    if !state.login.is_authorized(&headers) {
        return unauthorized();
    }
    let now = OffsetDateTime::now_utc();
    match state.authorization.complete_authentication(result, now).await {
        Ok(redirect_uri) => Json(RedirectTarget { redirect_uri }).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Handler for `POST /auth/deny`.
pub async fn deny_handler(
    State(state): State<AuthState>,
    headers: HeaderMap,
    Json(body): Json<DenyRequest>,
) -> Response {
    if !state.login.is_authorized(&headers) {
        return unauthorized();
    }
    let now = OffsetDateTime::now_utc();
    match state
        .authorization
        .deny(body.request_id, body.reason.as_deref(), now)
        .await
    {
        Ok(redirect_uri) => Json(RedirectTarget { redirect_uri }).into_response(),
        Err(e) => error_response(&e),
    }
}

fn unauthorized() -> Response {
    warn!(target: "deci::audit", "Login callback with bad or missing bearer credential");
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Bearer")],
        Json(ErrorBody {
            error: "invalid_token",
            error_description: "missing or invalid bearer credential".to_string(),
        }),
    )
        .into_response()
}

fn error_response(error: &AuthError) -> Response {
    let status = match error {
        AuthError::StorageUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        AuthError::RequestAlreadyFinalized { .. } => StatusCode::CONFLICT,
        e if e.is_server_error() => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    };
    let error_description = if error.is_server_error() && !error.is_retryable() {
        error!(error = %error, "Authorization endpoint failure");
        "internal error".to_string()
    } else {
        error.to_string()
    };
    (
        status,
        Json(ErrorBody {
            error: error.oauth_error_code(),
            error_description,
        }),
    )
        .into_response()
}
