//! Claims assembly.
//!
//! Maps granted scopes to the standard OIDC claim sets. Scopes the provider
//! does not support, the client did not request, or the user did not grant
//! are dropped silently; the resulting scope list is exactly what the token
//! carries.

use serde_json::{Map, Value};

use crate::oauth::{AuthRequest, Authentication};

/// Claims released by each scope (OIDC Core §5.4).
pub fn claims_for_scope(scope: &str) -> &'static [&'static str] {
    match scope {
        "profile" => &[
            "name",
            "family_name",
            "given_name",
            "middle_name",
            "nickname",
            "preferred_username",
            "profile",
            "picture",
            "website",
            "gender",
            "birthdate",
            "zoneinfo",
            "locale",
            "updated_at",
        ],
        "email" => &["email", "email_verified"],
        "address" => &["address"],
        "phone" => &["phone_number", "phone_number_verified"],
        "groups" => &["groups"],
        _ => &[],
    }
}

/// Output of [`ClaimsAssembler::assemble`].
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledClaims {
    /// Granted scopes, in request order.
    pub scopes: Vec<String>,
    /// User claims released by those scopes.
    pub claims: Map<String, Value>,
    /// Nonce from the request, verbatim.
    pub nonce: Option<String>,
}

impl AssembledClaims {
    /// Space-separated granted scopes.
    #[must_use]
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }

    /// Returns `true` if `scope` was granted.
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

/// Deterministic scope-to-claims mapping.
#[derive(Debug, Clone)]
pub struct ClaimsAssembler {
    supported_scopes: Vec<String>,
}

impl ClaimsAssembler {
    /// Creates an assembler that only ever grants `supported_scopes`.
    #[must_use]
    pub fn new(supported_scopes: Vec<String>) -> Self {
        Self { supported_scopes }
    }

    fn is_supported(&self, scope: &str) -> bool {
        self.supported_scopes.iter().any(|s| s == scope)
    }

    /// Granted scopes: requested ∩ user-granted ∩ supported, in request order
    /// with `openid` moved to the front.
    #[must_use]
    pub fn grant_scopes(&self, requested: &[String], user_granted: &[String]) -> Vec<String> {
        let mut granted: Vec<String> = requested
            .iter()
            .filter(|scope| self.is_supported(scope))
            .filter(|scope| user_granted.contains(*scope))
            .cloned()
            .collect();
        if let Some(pos) = granted.iter().position(|s| s == "openid") {
            let openid = granted.remove(pos);
            granted.insert(0, openid);
        }
        granted
    }

    /// Builds the claim payload for `request` authenticated as `authentication`.
    #[must_use]
    pub fn assemble(&self, request: &AuthRequest, authentication: &Authentication) -> AssembledClaims {
        let scopes = self.grant_scopes(&request.scopes, &authentication.granted_scopes);
        let claims = self.claims_for(&scopes, &authentication.user_info.to_claims());
        AssembledClaims {
            scopes,
            claims,
            nonce: request.nonce.clone(),
        }
    }

    /// Selects from `available` the claims `scopes` release.
    #[must_use]
    pub fn claims_for(&self, scopes: &[String], available: &Map<String, Value>) -> Map<String, Value> {
        let mut claims = Map::new();
        for scope in scopes {
            for name in claims_for_scope(scope) {
                if let Some(value) = available.get(*name) {
                    claims.insert((*name).to_string(), value.clone());
                }
            }
        }
        claims
    }
}
