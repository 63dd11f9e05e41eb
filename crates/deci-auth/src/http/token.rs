//! Token endpoint handler.
//!
//! ```text
//! POST /token
//! Content-Type: application/x-www-form-urlencoded
//! Authorization: Basic <base64(client_id:client_secret)>
//!
//! grant_type=authorization_code
//! &code=SplxlOBeZQQYbYS6WxSbIA
//! &redirect_uri=https://acme.example/cb
//! ```
//!
//! Clients authenticate with HTTP Basic, with `client_id` + `client_secret`
//! in the body, or (public clients) with `client_id` alone. Using Basic and a
//! body secret together is rejected.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use base64::Engine;
use time::OffsetDateTime;
use tracing::{debug, error};

use super::AuthState;
use crate::AuthError;
use crate::oauth::{TokenError, TokenRequest, TokenResponse};
use crate::types::{Client, GrantType};

/// Client credentials extracted from the request.
#[derive(Debug, PartialEq)]
enum ClientAuth {
    /// HTTP Basic authentication.
    Basic { client_id: String, client_secret: String },
    /// Client credentials in the request body.
    Body { client_id: String, client_secret: String },
    /// Public client (no secret).
    Public { client_id: String },
    /// No client credentials provided.
    None,
}

impl ClientAuth {
    fn into_parts(self) -> Option<(String, Option<String>)> {
        match self {
            Self::Basic {
                client_id,
                client_secret,
            }
            | Self::Body {
                client_id,
                client_secret,
            } => Some((client_id, Some(client_secret))),
            Self::Public { client_id } => Some((client_id, None)),
            Self::None => None,
        }
    }
}

/// Handler for `POST /token`.
pub async fn token_handler(
    State(state): State<AuthState>,
    headers: HeaderMap,
    Form(request): Form<TokenRequest>,
) -> Response {
    match handle(&state, &headers, request).await {
        Ok(response) => token_success_response(response),
        Err(e) => token_error_response(&e),
    }
}

async fn handle(
    state: &AuthState,
    headers: &HeaderMap,
    request: TokenRequest,
) -> Result<TokenResponse, AuthError> {
    let grant_type = GrantType::parse(&request.grant_type)
        .ok_or_else(|| AuthError::unsupported_grant_type(request.grant_type.clone()))?;

    let client = authenticate_client(state, headers, &request).await?;
    let now = OffsetDateTime::now_utc();
    debug!(client_id = %client.client_id, grant_type = %grant_type, "Token request");

    let issued = match grant_type {
        GrantType::AuthorizationCode => {
            let code = required(&request.code, "code")?;
            state
                .issuer
                .exchange_code(
                    &client,
                    code,
                    request.redirect_uri.as_deref(),
                    request.code_verifier.as_deref(),
                    now,
                )
                .await?
        }
        GrantType::RefreshToken => {
            let token = required(&request.refresh_token, "refresh_token")?;
            state
                .issuer
                .refresh(&client, token, request.scope.as_deref(), now)
                .await?
        }
    };
    Ok(issued.into_response())
}

async fn authenticate_client(
    state: &AuthState,
    headers: &HeaderMap,
    request: &TokenRequest,
) -> Result<Client, AuthError> {
    let (client_id, secret) = extract_client_auth(headers, request)?
        .into_parts()
        .ok_or_else(|| AuthError::invalid_client("client authentication failed"))?;

    // A body client_id that disagrees with the Basic credentials is rejected.
    if let Some(body_id) = request.client_id.as_deref() {
        if body_id != client_id {
            return Err(AuthError::invalid_client("client authentication failed"));
        }
    }

    state
        .clients
        .authenticate(&client_id, secret.as_deref())
        .await
}

/// Extract client authentication from headers and request.
///
/// Basic credentials are form-urlencoded before base64 encoding
/// (RFC 6749 section 2.3.1) and are decoded here. Presenting a secret both
/// ways is `invalid_request`.
fn extract_client_auth(
    headers: &HeaderMap,
    request: &TokenRequest,
) -> Result<ClientAuth, AuthError> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        let (client_id, client_secret) = value
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix("Basic "))
            .and_then(parse_basic)
            .ok_or_else(|| AuthError::invalid_client("client authentication failed"))?;
        if request.client_secret.is_some() {
            return Err(AuthError::invalid_request(
                "client credentials sent in both the Authorization header and the body",
            ));
        }
        return Ok(ClientAuth::Basic {
            client_id,
            client_secret,
        });
    }

    Ok(match (&request.client_id, &request.client_secret) {
        (Some(client_id), Some(client_secret)) => ClientAuth::Body {
            client_id: client_id.clone(),
            client_secret: client_secret.clone(),
        },
        (Some(client_id), None) => ClientAuth::Public {
            client_id: client_id.clone(),
        },
        _ => ClientAuth::None,
    })
}

fn parse_basic(credentials: &str) -> Option<(String, String)> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(credentials.trim())
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (id, secret) = decoded.split_once(':')?;
    Some((form_decode(id)?, form_decode(secret)?))
}

fn form_decode(value: &str) -> Option<String> {
    urlencoding::decode(&value.replace('+', " "))
        .ok()
        .map(|v| v.into_owned())
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, AuthError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AuthError::invalid_request(format!("missing {name}")))
}

fn token_success_response(response: TokenResponse) -> Response {
    (
        StatusCode::OK,
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(response),
    )
        .into_response()
}

fn token_error_response(error: &AuthError) -> Response {
    if error.is_server_error() {
        error!(error = %error, category = %error.category(), "Token request failed");
    }
    let body = TokenError::from(error);
    let status = StatusCode::from_u16(body.error.http_status())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut response = (
        status,
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(body),
    )
        .into_response();
    if status == StatusCode::UNAUTHORIZED {
        response.headers_mut().insert(
            header::WWW_AUTHENTICATE,
            header::HeaderValue::from_static("Basic"),
        );
    }
    response
}
