//! Request gate
//!
//! Admits a request only when it carries a bearer token that decodes and is
//! live in the session store. Role checks run against the admitted claims.

use crate::error::AuthError;
use crate::models::{Claims, UserRole};
use crate::services::session::SessionStore;
use crate::services::token::TokenCodec;
use std::sync::Arc;

/// Bearer-token admission and role authorization
#[derive(Debug, Clone)]
pub struct RequestGate {
    codec: Arc<TokenCodec>,
    sessions: SessionStore,
}

impl RequestGate {
    pub fn new(codec: Arc<TokenCodec>, sessions: SessionStore) -> Self {
        Self { codec, sessions }
    }

    /// Admit a request by its `Authorization` header value.
    ///
    /// # Errors
    ///
    /// - `AuthHeaderMissing` if the header is absent or not `Bearer <token>`
    /// - `InvalidOrExpiredToken` if the token does not decode
    /// - `Unauthorized` if the token is revoked or the store cannot tell
    pub async fn authenticate(&self, header: Option<&str>) -> Result<Claims, AuthError> {
        let token = header
            .and_then(parse_bearer)
            .ok_or(AuthError::AuthHeaderMissing)?;

        self.admit(token).await
    }

    /// Admit a raw token taken from somewhere other than the header
    pub async fn admit(&self, token: &str) -> Result<Claims, AuthError> {
        let claims = self.codec.decode(token).map_err(|e| {
            tracing::debug!(error = %e, "Rejected undecodable bearer token");
            AuthError::InvalidOrExpiredToken
        })?;

        let user_id = claims.user_id().ok_or(AuthError::InvalidOrExpiredToken)?;

        match self.sessions.validate(user_id, token).await {
            Ok(true) => Ok(claims),
            Ok(false) => {
                tracing::debug!(user_id, "Rejected revoked token");
                Err(AuthError::Unauthorized)
            }
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Session lookup failed, rejecting request");
                Err(AuthError::Unauthorized)
            }
        }
    }

    /// Require the admitted caller to hold `required`
    pub fn authorize(&self, claims: &Claims, required: UserRole) -> Result<(), AuthError> {
        if claims.role.satisfies(required) {
            Ok(())
        } else {
            Err(AuthError::Forbidden)
        }
    }
}

/// Extract the token from `<scheme> <token>` with a case-insensitive
/// `bearer` scheme and exactly one space.
pub fn parse_bearer(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    if token.is_empty() || token.chars().any(char::is_whitespace) {
        return None;
    }
    Some(token)
}
