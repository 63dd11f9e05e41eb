//! JWT encoding, verification and JWK export.
//!
//! ## Supported Algorithms
//!
//! - **RS256**: RSA with SHA-256 (the OIDC mandatory-to-implement default)
//! - **RS384**: RSA with SHA-384
//! - **ES384**: ECDSA with P-384 curve
//!
//! Keys are generated in-process; [`KeyManager`](super::keys::KeyManager)
//! decides which one signs.

use std::fmt;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation, decode, encode};
use p384::SecretKey as EcSecretKey;
use p384::ecdsa::SigningKey as EcSigningKey;
use p384::pkcs8::EncodePrivateKey as EcEncodePrivateKey;
use rand::rngs::OsRng;
use rsa::RsaPrivateKey;
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to encode a token.
    #[error("Failed to encode token: {message}")]
    EncodingError {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode a token.
    #[error("Failed to decode token: {message}")]
    DecodingError {
        /// Description of the decoding error.
        message: String,
    },

    /// The token has expired.
    #[error("Token expired")]
    Expired,

    /// The token signature is invalid.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The token claims are invalid.
    #[error("Invalid claims: {message}")]
    InvalidClaims {
        /// Description of why claims are invalid.
        message: String,
    },

    /// No published key carries the token's `kid`.
    #[error("Key not found: {kid}")]
    KeyNotFound {
        /// The key ID that was not found.
        kid: String,
    },

    /// Failed to generate a cryptographic key.
    #[error("Key generation error: {message}")]
    KeyGenerationError {
        /// Description of the key generation error.
        message: String,
    },
}

impl JwtError {
    fn encoding(message: impl fmt::Display) -> Self {
        Self::EncodingError {
            message: message.to_string(),
        }
    }

    fn decoding(message: impl fmt::Display) -> Self {
        Self::DecodingError {
            message: message.to_string(),
        }
    }

    fn key_generation(message: impl fmt::Display) -> Self {
        Self::KeyGenerationError {
            message: message.to_string(),
        }
    }

    /// Returns `true` if this is a validation error (expired, invalid signature, etc.).
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::Expired | Self::InvalidSignature | Self::InvalidClaims { .. }
        )
    }
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidAudience
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidSubject
            | ErrorKind::ImmatureSignature
            | ErrorKind::MissingRequiredClaim(_) => Self::InvalidClaims {
                message: err.to_string(),
            },
            _ => Self::decoding(err),
        }
    }
}

// ============================================================================
// Signing Algorithm
// ============================================================================

/// Supported signing algorithms for JWT tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningAlgorithm {
    /// RSA with SHA-256.
    RS256,
    /// RSA with SHA-384.
    RS384,
    /// ECDSA with P-384 curve.
    ES384,
}

impl SigningAlgorithm {
    /// Parses a JOSE algorithm name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "RS256" => Some(Self::RS256),
            "RS384" => Some(Self::RS384),
            "ES384" => Some(Self::ES384),
            _ => None,
        }
    }

    /// Converts to the `jsonwebtoken` Algorithm type.
    #[must_use]
    pub fn to_jwt_algorithm(self) -> Algorithm {
        match self {
            Self::RS256 => Algorithm::RS256,
            Self::RS384 => Algorithm::RS384,
            Self::ES384 => Algorithm::ES384,
        }
    }

    /// Returns the algorithm name as used in JWK/JWT headers.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::ES384 => "ES384",
        }
    }

    /// Returns `true` if this is an RSA-based algorithm.
    #[must_use]
    pub fn is_rsa(&self) -> bool {
        matches!(self, Self::RS256 | Self::RS384)
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Token Claims
// ============================================================================

/// Access token claims.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessTokenClaims {
    /// Issuer.
    pub iss: String,

    /// Subject (end user).
    pub sub: String,

    /// Audience (client ID).
    pub aud: String,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// Issued at (Unix timestamp).
    pub iat: i64,

    /// JWT ID.
    pub jti: String,

    /// Space-separated granted scopes.
    pub scope: String,

    /// OAuth client ID.
    pub client_id: String,
}

/// ID token claims for OpenID Connect.
///
/// Scope-derived claims (`email`, `name`, ...) are flattened into the
/// top-level object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdTokenClaims {
    /// Issuer.
    pub iss: String,

    /// Subject (end user).
    pub sub: String,

    /// Audience (client ID).
    pub aud: String,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// Issued at (Unix timestamp).
    pub iat: i64,

    /// When the user authenticated (Unix timestamp).
    pub auth_time: i64,

    /// Nonce from the authorization request, verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// Authorized party (client ID).
    pub azp: String,

    /// Scope-derived user claims.
    #[serde(flatten)]
    pub claims: Map<String, Value>,
}

// ============================================================================
// JWKS Types
// ============================================================================

/// JSON Web Key Set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Jwks {
    /// The keys in this set.
    pub keys: Vec<Jwk>,
}

/// JSON Web Key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Jwk {
    /// Key type ("RSA" or "EC").
    pub kty: String,

    /// Key ID.
    pub kid: String,

    /// Key use ("sig" for signing).
    #[serde(rename = "use")]
    pub use_: String,

    /// Algorithm.
    pub alg: String,

    /// RSA modulus (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA exponent (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    /// EC curve name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    /// EC x coordinate (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    /// EC y coordinate (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

// ============================================================================
// Signing Key Pair
// ============================================================================

/// Public key data for JWKS export.
enum PublicKeyData {
    Rsa { n: Vec<u8>, e: Vec<u8> },
    Ec { x: Vec<u8>, y: Vec<u8> },
}

/// A signing key pair.
///
/// `Send + Sync`; shared behind an `Arc` by the key manager.
pub struct SigningKeyPair {
    kid: String,
    algorithm: SigningAlgorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    public_key_data: PublicKeyData,
}

impl fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl SigningKeyPair {
    /// Generates a fresh key pair for `algorithm` with a random key ID.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation fails.
    pub fn generate(algorithm: SigningAlgorithm) -> Result<Self, JwtError> {
        if algorithm.is_rsa() {
            Self::generate_rsa(algorithm)
        } else {
            Self::generate_ec()
        }
    }

    fn generate_rsa(algorithm: SigningAlgorithm) -> Result<Self, JwtError> {
        let private_key = RsaPrivateKey::new(&mut OsRng, 2048).map_err(JwtError::key_generation)?;
        let public_key = private_key.to_public_key();

        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(JwtError::key_generation)?;
        let public_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(JwtError::key_generation)?;

        Ok(Self {
            kid: uuid::Uuid::new_v4().to_string(),
            algorithm,
            encoding_key: EncodingKey::from_rsa_pem(private_pem.as_bytes())
                .map_err(JwtError::key_generation)?,
            decoding_key: DecodingKey::from_rsa_pem(public_pem.as_bytes())
                .map_err(JwtError::key_generation)?,
            public_key_data: PublicKeyData::Rsa {
                n: public_key.n().to_bytes_be(),
                e: public_key.e().to_bytes_be(),
            },
        })
    }

    fn generate_ec() -> Result<Self, JwtError> {
        let secret_key = EcSecretKey::random(&mut OsRng);
        let point = EcSigningKey::from(&secret_key)
            .verifying_key()
            .to_encoded_point(false);
        let (x, y) = match (point.x(), point.y()) {
            (Some(x), Some(y)) => (x.to_vec(), y.to_vec()),
            _ => return Err(JwtError::key_generation("missing EC public point coordinates")),
        };

        // jsonwebtoken only accepts EC private keys as PKCS8 PEM
        let private_pem = secret_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(JwtError::key_generation)?;
        let decoding_key =
            DecodingKey::from_ec_components(&URL_SAFE_NO_PAD.encode(&x), &URL_SAFE_NO_PAD.encode(&y))
                .map_err(JwtError::key_generation)?;

        Ok(Self {
            kid: uuid::Uuid::new_v4().to_string(),
            algorithm: SigningAlgorithm::ES384,
            encoding_key: EncodingKey::from_ec_pem(private_pem.as_bytes())
                .map_err(JwtError::key_generation)?,
            decoding_key,
            public_key_data: PublicKeyData::Ec { x, y },
        })
    }

    /// Key ID published in the JWKS and set as the JWT `kid` header.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Signing algorithm of this key.
    #[must_use]
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    /// Signs `claims` with this key, setting the `kid` header.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn sign<T: Serialize>(&self, claims: &T) -> Result<String, JwtError> {
        let mut header = Header::new(self.algorithm.to_jwt_algorithm());
        header.kid = Some(self.kid.clone());
        encode(&header, claims, &self.encoding_key).map_err(JwtError::encoding)
    }

    /// Verifies signature, issuer and expiry of `token` against this key.
    ///
    /// Audience is checked by the caller.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding or validation fails.
    pub fn verify<T: DeserializeOwned>(
        &self,
        token: &str,
        issuer: &str,
    ) -> Result<TokenData<T>, JwtError> {
        let mut validation = Validation::new(self.algorithm.to_jwt_algorithm());
        validation.set_issuer(&[issuer]);
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.leeway = 0;

        decode(token, &self.decoding_key, &validation).map_err(JwtError::from)
    }

    /// Exports the public key as a JWK.
    #[must_use]
    pub fn to_jwk(&self) -> Jwk {
        let (kty, n, e, crv, x, y) = match &self.public_key_data {
            PublicKeyData::Rsa { n, e } => (
                "RSA",
                Some(URL_SAFE_NO_PAD.encode(n)),
                Some(URL_SAFE_NO_PAD.encode(e)),
                None,
                None,
                None,
            ),
            PublicKeyData::Ec { x, y } => (
                "EC",
                None,
                None,
                Some("P-384".to_string()),
                Some(URL_SAFE_NO_PAD.encode(x)),
                Some(URL_SAFE_NO_PAD.encode(y)),
            ),
        };
        Jwk {
            kty: kty.to_string(),
            kid: self.kid.clone(),
            use_: "sig".to_string(),
            alg: self.algorithm.as_str().to_string(),
            n,
            e,
            crv,
            x,
            y,
        }
    }
}

/// Reads the `kid` header without verifying anything.
///
/// # Errors
///
/// Returns `DecodingError` if the header is malformed or carries no `kid`.
pub fn peek_kid(token: &str) -> Result<String, JwtError> {
    jsonwebtoken::decode_header(token)
        .map_err(JwtError::from)?
        .kid
        .ok_or_else(|| JwtError::decoding("token header has no kid"))
}

// ============================================================================
// Tests
// ============================================================================
