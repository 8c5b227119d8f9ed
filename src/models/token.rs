//! Token claims and token pair

use serde::{Deserialize, Serialize};

use super::UserRole;

/// Claims carried by access and refresh tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: user id as a decimal string
    pub sub: String,
    /// Role at issuance
    pub role: UserRole,
    /// Unique token id (base64url, 256 random bits)
    pub jti: String,
    /// Issued at (Unix seconds)
    pub iat: i64,
    /// Expires at (Unix seconds)
    pub exp: i64,
    /// Issuer
    pub iss: String,
}

impl Claims {
    /// Parse the subject as a user id
    pub fn user_id(&self) -> Option<i64> {
        self.sub.parse().ok()
    }

    /// Key of the session entry this token owns
    pub fn session_key(&self) -> String {
        session_key(&self.sub, &self.jti)
    }
}

/// `user:{user_id}:jwt:{jti}`
pub fn session_key(user_id: &str, jti: &str) -> String {
    format!("user:{}:jwt:{}", user_id, jti)
}

/// Pattern matching every session entry of a user
pub fn session_pattern(user_id: i64) -> String {
    format!("user:{}:jwt:*", user_id)
}

/// Access and refresh token issued together
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_key_format() {
        assert_eq!(session_key("42", "abc"), "user:42:jwt:abc");
        assert_eq!(session_pattern(42), "user:42:jwt:*");
    }

    #[test]
    fn test_claims_user_id() {
        let claims = Claims {
            sub: "17".to_string(),
            role: UserRole::User,
            jti: "j".to_string(),
            iat: 0,
            exp: 1,
            iss: "iss".to_string(),
        };
        assert_eq!(claims.user_id(), Some(17));
        assert_eq!(claims.session_key(), "user:17:jwt:j");

        let bad = Claims {
            sub: "not-a-number".to_string(),
            ..claims
        };
        assert_eq!(bad.user_id(), None);
    }
}
