//! JWKS endpoint.
//!
//! Publishes the active signing key and every retiring key still inside its
//! grace period, so any unexpired token can be verified.
//!
//! # References
//!
//! - [RFC 7517 - JSON Web Key](https://tools.ietf.org/html/rfc7517)

use axum::Json;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use time::OffsetDateTime;

use super::AuthState;

/// Relying parties refetch on an unknown `kid`, so a short cache is enough
/// to pick up rotations promptly.
const CACHE_CONTROL: &str = "public, max-age=300";

/// Handler for `GET /jwks.json`.
///
/// # Example Response
///
/// ```json
/// {
///   "keys": [
///     { "kty": "RSA", "kid": "...", "use": "sig", "alg": "RS256", "n": "...", "e": "AQAB" }
///   ]
/// }
/// ```
pub async fn jwks_handler(State(state): State<AuthState>) -> impl IntoResponse {
    let jwks = state
        .issuer
        .keys()
        .public_key_set(OffsetDateTime::now_utc());

    (
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CACHE_CONTROL, CACHE_CONTROL),
        ],
        Json(jwks),
    )
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};

    #[tokio::test]
    async fn test_jwks_lists_active_and_retiring_keys() {
        let (state, _) = state();
        let first = state.issuer.keys().active_key().unwrap().kid;
        let second = state
            .issuer
            .keys()
            .rotate(OffsetDateTime::now_utc())
            .unwrap()
            .kid;

        let response = send(
            &state,
            Request::get("/jwks.json").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CACHE_CONTROL], CACHE_CONTROL);

        let body = json_body(response).await;
        let kids: Vec<&str> = body["keys"]
            .as_array()
            .unwrap()
            .iter()
            .map(|k| k["kid"].as_str().unwrap())
            .collect();
        assert_eq!(kids, vec![second.as_str(), first.as_str()]);
        assert_eq!(body["keys"][0]["use"], "sig");
        assert_eq!(body["keys"][0]["alg"], "RS256");
    }
}
