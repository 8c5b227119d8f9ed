//! Token codec
//!
//! Issues and verifies HS256-signed JWTs. Tokens carry the user id, the role
//! at issuance, a random token id (`jti`) and issue/expiry timestamps.

use argon2::password_hash::rand_core::{OsRng, RngCore};
use chrono::{DateTime, Duration, Utc};
use data_encoding::BASE64URL_NOPAD;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::models::{Claims, UserRole};

/// Number of random bytes in a token id
const JTI_BYTES: usize = 32;

const ALGORITHM: Algorithm = Algorithm::HS256;

/// Expiry instant of a token issued at `now` for `ttl_minutes`
pub fn expiry_after(now: DateTime<Utc>, ttl_minutes: u64) -> Result<DateTime<Utc>, AuthError> {
    let minutes = i64::try_from(ttl_minutes).map_err(|_| AuthError::TtlTooLarge)?;
    let ttl = Duration::try_minutes(minutes).ok_or(AuthError::TtlTooLarge)?;
    now.checked_add_signed(ttl).ok_or(AuthError::TtlTooLarge)
}

/// Signs and verifies access and refresh tokens with a shared secret
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    validation: Validation,
    validation_ignoring_expiry: Validation,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Build a codec from configuration; an empty secret is rejected.
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        if config.secret.is_empty() {
            return Err(AuthError::Config("signing secret is not set".to_string()));
        }

        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        let mut validation_ignoring_expiry = validation.clone();
        validation_ignoring_expiry.validate_exp = false;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            validation,
            validation_ignoring_expiry,
        })
    }

    /// Issue a signed token for `subject` valid for `ttl_minutes`.
    ///
    /// A zero TTL yields a token that is already expired.
    pub fn issue(&self, subject: &str, role: UserRole, ttl_minutes: u64) -> Result<String, AuthError> {
        let now = Utc::now();
        let expires_at = expiry_after(now, ttl_minutes)?;

        let claims = Claims {
            sub: subject.to_string(),
            role,
            jti: generate_jti(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.issuer.clone(),
        };

        encode(&Header::new(ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| AuthError::TokenGeneration(e.to_string()))
    }

    /// Verify algorithm, signature, issuer and expiry, and return the claims.
    pub fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        let claims = self.decode_with(token, &self.validation)?;
        if claims.exp <= Utc::now().timestamp() {
            return Err(AuthError::Expired);
        }
        Ok(claims)
    }

    /// Like [`TokenCodec::decode`] but accepts expired tokens.
    ///
    /// Only used to locate the session entry of a token being revoked.
    pub fn decode_ignoring_expiry(&self, token: &str) -> Result<Claims, AuthError> {
        self.decode_with(token, &self.validation_ignoring_expiry)
    }

    fn decode_with(&self, token: &str, validation: &Validation) -> Result<Claims, AuthError> {
        check_algorithm(token)?;

        decode::<Claims>(token, &self.decoding_key, validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature
                | ErrorKind::InvalidAlgorithm
                | ErrorKind::InvalidAlgorithmName => AuthError::InvalidSignature,
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Malformed(e.to_string()),
            })
    }
}

/// 256 random bits, base64url without padding
fn generate_jti() -> String {
    let mut bytes = [0u8; JTI_BYTES];
    OsRng.fill_bytes(&mut bytes);
    BASE64URL_NOPAD.encode(&bytes)
}

/// Reject any token whose header does not assert HS256.
///
/// Runs before signature verification so that `none` and asymmetric
/// algorithms are reported as signature failures, not parse errors.
fn check_algorithm(token: &str) -> Result<(), AuthError> {
    let header_segment = token
        .split('.')
        .next()
        .filter(|segment| !segment.is_empty())
        .ok_or_else(|| AuthError::Malformed("missing token header".to_string()))?;

    let header_bytes = BASE64URL_NOPAD
        .decode(header_segment.as_bytes())
        .map_err(|e| AuthError::Malformed(format!("invalid header encoding: {}", e)))?;

    let header: serde_json::Value = serde_json::from_slice(&header_bytes)
        .map_err(|e| AuthError::Malformed(format!("invalid header: {}", e)))?;

    match header.get("alg").and_then(|alg| alg.as_str()) {
        Some("HS256") => Ok(()),
        Some(_) => Err(AuthError::InvalidSignature),
        None => Err(AuthError::Malformed("header has no algorithm".to_string())),
    }
}
