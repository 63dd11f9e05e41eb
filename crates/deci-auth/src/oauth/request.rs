//! Authorization request records.
//!
//! An [`AuthRequest`] is created when the authorization endpoint accepts a
//! request and then moves through
//!
//! ```text
//! pending -> authenticated -> code_issued
//!    |             |
//!    +-> denied    +-> denied
//!    +-> expired   +-> expired
//! ```
//!
//! Every transition is persisted by a compare-and-swap on the prior status
//! (see [`AuthRequestStorage::update`](crate::storage::AuthRequestStorage::update)).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use super::pkce::{PkceChallenge, PkceChallengeMethod, PkceError};

/// Lifecycle state of an authorization request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthRequestStatus {
    /// Waiting for the user to authenticate.
    Pending,
    /// User authenticated; no code minted yet.
    Authenticated,
    /// Code minted and returned to the client.
    CodeIssued,
    /// Refused by the user or policy.
    Denied,
    /// Outlived `auth_validity_time` before completing.
    Expired,
}

impl AuthRequestStatus {
    /// Returns the status name used in logs and storage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Authenticated => "authenticated",
            Self::CodeIssued => "code_issued",
            Self::Denied => "denied",
            Self::Expired => "expired",
        }
    }

    /// No transition leaves a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::CodeIssued | Self::Denied | Self::Expired)
    }

    /// Whether the state machine permits `self -> next`.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Authenticated)
                | (Self::Authenticated, Self::CodeIssued)
                | (Self::Pending | Self::Authenticated, Self::Denied)
                | (Self::Pending | Self::Authenticated, Self::Expired)
        )
    }
}

impl std::fmt::Display for AuthRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Profile information about the authenticated user.
///
/// Field names are the OIDC standard claim names; the claims assembler picks
/// the ones each granted scope entitles the client to.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub middle_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birthdate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoneinfo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    /// Structured postal address, passed through unchanged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number_verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
}

impl UserInfo {
    /// The populated fields as a claim map.
    #[must_use]
    pub fn to_claims(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// Outcome reported by the login/consent collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticationResult {
    /// Request the user authenticated for.
    pub request_id: Uuid,

    /// Stable identifier of the user.
    pub subject: String,

    /// Scopes the user consented to.
    pub granted_scopes: Vec<String>,

    /// When the user authenticated.
    #[serde(with = "time::serde::rfc3339")]
    pub authenticated_at: OffsetDateTime,

    /// Profile data for claim assembly.
    #[serde(default)]
    pub user_info: UserInfo,
}

/// Authentication attached to a request once it leaves `pending`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Authentication {
    pub subject: String,
    pub granted_scopes: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub authenticated_at: OffsetDateTime,
    #[serde(default)]
    pub user_info: UserInfo,
}

impl From<AuthenticationResult> for Authentication {
    fn from(result: AuthenticationResult) -> Self {
        Self {
            subject: result.subject,
            granted_scopes: result.granted_scopes,
            authenticated_at: result.authenticated_at,
            user_info: result.user_info,
        }
    }
}

/// An in-flight authorization request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthRequest {
    /// Unique request identifier, handed to the login UI.
    pub id: Uuid,

    /// Requesting client.
    pub client_id: String,

    /// Redirect URI negotiated at creation. Immutable.
    pub redirect_uri: String,

    /// Requested scopes in request order, without duplicates.
    pub scopes: Vec<String>,

    /// PKCE challenge negotiated at creation. Immutable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge_method: Option<PkceChallengeMethod>,

    /// Opaque client state, echoed in redirects only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// OIDC nonce, copied into the ID token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// `created_at + auth_validity_time`.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    pub status: AuthRequestStatus,

    /// Set by the `pending -> authenticated` transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<Authentication>,

    /// Set by the `authenticated -> code_issued` transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl AuthRequest {
    /// Returns `true` if `now` is past the request's validity window.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now > self.expires_at
    }

    /// Returns `true` while the request may still expire (not terminal).
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.status.is_terminal()
    }

    /// The negotiated PKCE challenge, if any.
    ///
    /// # Errors
    ///
    /// Fails only if a stored challenge is malformed.
    pub fn pkce_challenge(&self) -> Result<Option<PkceChallenge>, PkceError> {
        match &self.code_challenge {
            Some(value) => PkceChallenge::new(
                value.clone(),
                self.code_challenge_method.unwrap_or(PkceChallengeMethod::Plain),
            )
            .map(Some),
            None => Ok(None),
        }
    }

    /// Space-separated requested scopes.
    #[must_use]
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        use AuthRequestStatus::*;

        assert!(Pending.can_transition_to(Authenticated));
        assert!(Authenticated.can_transition_to(CodeIssued));
        assert!(Pending.can_transition_to(Denied));
        assert!(Authenticated.can_transition_to(Expired));

        assert!(!Pending.can_transition_to(CodeIssued));
        assert!(!CodeIssued.can_transition_to(Expired));
        assert!(!Denied.can_transition_to(Authenticated));
        assert!(!Expired.can_transition_to(Pending));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!AuthRequestStatus::Pending.is_terminal());
        assert!(!AuthRequestStatus::Authenticated.is_terminal());
        assert!(AuthRequestStatus::CodeIssued.is_terminal());
        assert!(AuthRequestStatus::Denied.is_terminal());
        assert!(AuthRequestStatus::Expired.is_terminal());
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&AuthRequestStatus::CodeIssued).unwrap();
        assert_eq!(json, "\"code_issued\"");
    }

    #[test]
    fn test_user_info_claims_skip_missing() {
        let info = UserInfo {
            name: Some("Alice".to_string()),
            email: Some("alice@example.com".to_string()),
            email_verified: Some(true),
            ..Default::default()
        };
        let claims = info.to_claims();
        assert_eq!(claims.len(), 3);
        assert_eq!(claims["name"], "Alice");
        assert!(!claims.contains_key("groups"));
    }
}
