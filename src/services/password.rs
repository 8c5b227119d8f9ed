//! Password hashing
//!
//! Argon2id with the argon2 crate's default parameters and a random salt per
//! hash. Hashes are stored as PHC strings.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::error::AuthError;

/// One-way password hashing primitive used by the auth service
pub trait CredentialVerifier: Send + Sync {
    /// Hash a plaintext password
    fn hash(&self, plaintext: &str) -> Result<String, AuthError>;

    /// Check a plaintext password against a stored hash.
    ///
    /// A mismatch is `Ok(false)`; only an unusable hash or an internal
    /// failure is an error.
    fn verify(&self, plaintext: &str, hash: &str) -> Result<bool, AuthError>;
}

/// Argon2id implementation of [`CredentialVerifier`]
#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2Verifier;

impl CredentialVerifier for Argon2Verifier {
    fn hash(&self, plaintext: &str) -> Result<String, AuthError> {
        hash_password(plaintext)
    }

    fn verify(&self, plaintext: &str, hash: &str) -> Result<bool, AuthError> {
        verify_password(plaintext, hash)
    }
}

/// Hash a password using Argon2id.
///
/// ```ignore
/// let hash = hash_password("my_secure_password")?;
/// assert!(hash.starts_with("$argon2id$"));
/// ```
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::HashingFailure(e.to_string()))?;

    Ok(password_hash.to_string())
}

/// Verify a password against a stored PHC hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| AuthError::MalformedHash(e.to_string()))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::HashingFailure(e.to_string())),
    }
}
