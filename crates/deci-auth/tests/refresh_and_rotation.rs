//! Refresh token rotation, replay detection and signing key rotation.

mod common;

use common::*;
use deci_auth::AuthError;
use deci_auth::token::{AccessTokenClaims, IdTokenClaims};
use time::{Duration, OffsetDateTime};

#[tokio::test]
async fn refresh_rotates_and_detects_replay() {
    let provider = Provider::new();
    let now = OffsetDateTime::now_utc();
    let (_, code) = provider
        .authorize_acme(
            "openid profile offline_access",
            &["openid", "profile", "offline_access"],
            now,
        )
        .await;
    let issued = provider
        .issuer
        .exchange_code(&acme(), &code, Some(ACME_CB), None, now)
        .await
        .unwrap();
    let first = issued.refresh_token.unwrap();

    let later = now + Duration::minutes(30);
    let refreshed = provider
        .issuer
        .refresh(&acme(), &first, Some("openid"), later)
        .await
        .unwrap();
    assert_eq!(refreshed.scopes, vec!["openid"]);
    assert!(refreshed.id_token.is_none());
    let second = refreshed.refresh_token.unwrap();

    // Narrowing is per-request; the successor still carries the original grant.
    let widened = provider
        .issuer
        .refresh(&acme(), &second, None, later)
        .await
        .unwrap();
    assert_eq!(widened.scope_string(), "openid profile offline_access");
    let third = widened.refresh_token.unwrap();

    // Replaying a retired token revokes the live successor too.
    let err = provider
        .issuer
        .refresh(&acme(), &first, None, later)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidGrant { .. }));
    let err = provider
        .issuer
        .refresh(&acme(), &third, None, later)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidGrant { .. }));
}

#[tokio::test]
async fn refresh_cannot_widen_scope() {
    let provider = Provider::new();
    let now = OffsetDateTime::now_utc();
    let (_, code) = provider
        .authorize_acme("openid offline_access", &["openid", "offline_access"], now)
        .await;
    let issued = provider
        .issuer
        .exchange_code(&acme(), &code, Some(ACME_CB), None, now)
        .await
        .unwrap();

    let err = provider
        .issuer
        .refresh(&acme(), issued.refresh_token.as_deref().unwrap(), Some("openid email"), now)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidScope { .. }));
}

#[tokio::test]
async fn refresh_token_bound_to_client() {
    let provider = Provider::new();
    let now = OffsetDateTime::now_utc();
    let (_, code) = provider
        .authorize_acme("openid offline_access", &["openid", "offline_access"], now)
        .await;
    let issued = provider
        .issuer
        .exchange_code(&acme(), &code, Some(ACME_CB), None, now)
        .await
        .unwrap();

    let err = provider
        .issuer
        .refresh(&spa(), issued.refresh_token.as_deref().unwrap(), None, now)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidGrant { .. }));
}

#[tokio::test]
async fn tokens_survive_key_rotation_until_expiry() {
    let provider = Provider::new();
    let now = OffsetDateTime::now_utc();
    let (_, code) = provider.authorize_acme("openid", &["openid"], now).await;
    let issued = provider
        .issuer
        .exchange_code(&acme(), &code, Some(ACME_CB), None, now)
        .await
        .unwrap();

    let keys = provider.issuer.keys();
    let rotated = keys.rotate(now).unwrap();
    assert_ne!(rotated.kid, issued.key_id);

    let published: Vec<String> = keys
        .public_key_set(now)
        .keys
        .into_iter()
        .map(|k| k.kid)
        .collect();
    assert_eq!(published, vec![rotated.kid.clone(), issued.key_id.clone()]);

    keys.verify::<AccessTokenClaims>(&issued.access_token, now)
        .unwrap();
    keys.verify::<IdTokenClaims>(issued.id_token.as_deref().unwrap(), now)
        .unwrap();

    // A second rotation keeps the original key inside its grace period.
    keys.rotate(now + Duration::minutes(10)).unwrap();
    assert_eq!(keys.public_key_set(now + Duration::minutes(10)).keys.len(), 3);

    // Once the grace period ends the key is pruned from publication.
    let after_grace = now + Duration::hours(2);
    let pruned = keys.prune(after_grace);
    assert!(pruned.iter().any(|k| k.kid == issued.key_id));
    assert!(
        keys.public_key_set(after_grace)
            .keys
            .iter()
            .all(|k| k.kid != issued.key_id)
    );
}
