//! Error taxonomy of the authentication core
//!
//! Every operation of the token codec, credential verifier, session store,
//! orchestrator and request gate fails with an [`AuthError`]. Adapters
//! (key-value backend, user directory) report `anyhow::Error`, which is kept
//! as the source of the infrastructure variants.

use thiserror::Error;

/// Authentication and session errors
#[derive(Debug, Error)]
pub enum AuthError {
    // -- configuration --
    /// Missing or unusable configuration (e.g. empty signing secret)
    #[error("configuration error: {0}")]
    Config(String),

    /// Requested token lifetime cannot be represented
    #[error("token validity period is too large")]
    TtlTooLarge,

    // -- input --
    /// Request payload failed validation
    #[error("validation error: {0}")]
    Validation(String),

    /// Authorization header absent or not `Bearer <token>`
    #[error("authorization header missing or malformed")]
    AuthHeaderMissing,

    /// Token is structurally invalid
    #[error("malformed token: {0}")]
    Malformed(String),

    /// Token presented to logout or refresh could not be decoded
    #[error("failed to parse token")]
    TokenParsingFailed(#[source] Box<AuthError>),

    // -- authentication --
    /// Signature does not verify or the algorithm is not HS256
    #[error("invalid token signature")]
    InvalidSignature,

    /// Token `exp` is in the past
    #[error("token has expired")]
    Expired,

    /// Token expired before it could be stored
    #[error("token has already expired")]
    TokenExpired,

    /// No user with the given email
    #[error("user not found")]
    UserNotFound,

    /// Password does not match
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Gate: the bearer token could not be decoded
    #[error("invalid or expired token")]
    InvalidOrExpiredToken,

    /// Gate/refresh: the token is not live in the session store
    #[error("unauthorized token")]
    Unauthorized,

    // -- authorization --
    /// Caller lacks the required role
    #[error("insufficient role")]
    Forbidden,

    // -- conflict --
    /// Email already registered
    #[error("user already exists")]
    UserExists,

    // -- infrastructure --
    /// Token could not be signed
    #[error("token generation failed: {0}")]
    TokenGeneration(String),

    /// Password hashing primitive failed
    #[error("password hashing failed: {0}")]
    HashingFailure(String),

    /// Stored password hash cannot be parsed
    #[error("stored password hash is malformed: {0}")]
    MalformedHash(String),

    /// User directory lookup failed
    #[error("user lookup failed")]
    UserLookup(#[source] anyhow::Error),

    /// User directory insert failed
    #[error("user creation failed")]
    UserCreationFailed(#[source] anyhow::Error),

    /// Key-value backend failed or timed out
    #[error("session store error")]
    Store(#[source] anyhow::Error),

    /// Newly issued tokens could not be persisted
    #[error("failed to store tokens")]
    TokenStorage(#[source] Box<AuthError>),

    /// Session entries could not be removed
    #[error("failed to delete tokens")]
    TokenDeletionFailed(#[source] Box<AuthError>),
}

impl AuthError {
    /// Stable machine-readable code used in API error bodies
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Config(_) | AuthError::TtlTooLarge => "CONFIGURATION_ERROR",
            AuthError::Validation(_) => "VALIDATION_ERROR",
            AuthError::AuthHeaderMissing => "AUTH_HEADER_MISSING",
            AuthError::Malformed(_) | AuthError::TokenParsingFailed(_) => "INVALID_TOKEN",
            AuthError::InvalidSignature | AuthError::InvalidOrExpiredToken => "INVALID_TOKEN",
            AuthError::Expired | AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::UserNotFound | AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::Unauthorized => "UNAUTHORIZED",
            AuthError::Forbidden => "FORBIDDEN",
            AuthError::UserExists => "USER_EXISTS",
            AuthError::TokenGeneration(_)
            | AuthError::HashingFailure(_)
            | AuthError::MalformedHash(_)
            | AuthError::UserLookup(_)
            | AuthError::UserCreationFailed(_)
            | AuthError::Store(_)
            | AuthError::TokenStorage(_)
            | AuthError::TokenDeletionFailed(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the error is an infrastructure fault rather than a client error
    pub fn is_internal(&self) -> bool {
        self.code() == "INTERNAL_ERROR" || self.code() == "CONFIGURATION_ERROR"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_wrapped_errors_keep_source() {
        let err = AuthError::TokenParsingFailed(Box::new(AuthError::Expired));
        assert_eq!(err.to_string(), "failed to parse token");
        assert_eq!(err.source().unwrap().to_string(), "token has expired");
    }

    #[test]
    fn test_credential_errors_share_code() {
        assert_eq!(AuthError::UserNotFound.code(), AuthError::InvalidCredentials.code());
    }

    #[test]
    fn test_internal_classification() {
        assert!(AuthError::Store(anyhow::anyhow!("down")).is_internal());
        assert!(AuthError::TtlTooLarge.is_internal());
        assert!(!AuthError::Unauthorized.is_internal());
        assert!(!AuthError::UserExists.is_internal());
    }
}
