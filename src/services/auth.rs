//! Auth service
//!
//! Drives a user between anonymous and authenticated:
//! - register / login: issue and store a fresh access + refresh pair
//! - refresh: consume a live refresh token and rotate the pair
//! - logout: revoke both tokens of a session
//! - revoke_all: revoke every session of a user
//!
//! Tokens are only returned to the caller after both session entries were
//! written; a token that could not be stored is never handed out.

use std::sync::Arc;

use crate::config::AuthConfig;
use crate::db::repositories::{DuplicateEmail, UserRepository};
use crate::error::AuthError;
use crate::models::{Claims, LoginInput, NewUser, RegisterInput, TokenPair, User, UserRole};
use crate::services::password::CredentialVerifier;
use crate::services::session::SessionStore;
use crate::services::token::TokenCodec;

/// Minimum password length in characters
const MIN_PASSWORD_LEN: usize = 8;

/// Registration, login, logout and token rotation
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    verifier: Arc<dyn CredentialVerifier>,
    codec: Arc<TokenCodec>,
    sessions: SessionStore,
    access_ttl_minutes: u64,
    refresh_ttl_minutes: u64,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        verifier: Arc<dyn CredentialVerifier>,
        codec: Arc<TokenCodec>,
        sessions: SessionStore,
        config: &AuthConfig,
    ) -> Self {
        Self {
            users,
            verifier,
            codec,
            sessions,
            access_ttl_minutes: config.access_ttl_minutes,
            refresh_ttl_minutes: config.refresh_ttl_minutes,
        }
    }

    /// Create an account and sign the new user in.
    ///
    /// # Errors
    ///
    /// - `Validation` for malformed input
    /// - `UserExists` if the email is taken, also when another registration
    ///   claims it between the lookup and the insert
    /// - `UserLookup` if the email could not be checked
    /// - `UserCreationFailed` if the user could not be persisted
    /// - `TokenStorage` if the session entries could not be written
    pub async fn register(&self, input: RegisterInput) -> Result<TokenPair, AuthError> {
        validate_register_input(&input)?;
        let email = normalize_email(&input.email);

        match self.users.find_by_email(&email).await {
            Ok(Some(_)) => return Err(AuthError::UserExists),
            Ok(None) => {}
            Err(e) => {
                tracing::error!(error = %e, "User lookup failed during registration");
                return Err(AuthError::UserLookup(e));
            }
        }

        let password_hash = self.hash_password(input.password).await?;

        let user = self
            .users
            .create(&NewUser {
                first_name: input.first_name.trim().to_string(),
                last_name: input.last_name.trim().to_string(),
                email,
                password_hash,
                role: UserRole::default(),
            })
            .await
            .map_err(|e| {
                // A concurrent registration took the email after our lookup
                if e.downcast_ref::<DuplicateEmail>().is_some() {
                    return AuthError::UserExists;
                }
                tracing::error!(error = %e, "Failed to persist new user");
                AuthError::UserCreationFailed(e)
            })?;

        tracing::info!(user_id = user.id, "User registered");

        self.issue_pair(user.id, user.role).await
    }

    /// Check credentials and start a new session.
    ///
    /// `UserNotFound` and `InvalidCredentials` are distinct here so they can
    /// be logged apart; the HTTP layer renders both identically.
    pub async fn login(&self, input: LoginInput) -> Result<TokenPair, AuthError> {
        let email = normalize_email(&input.email);

        let user = self
            .users
            .find_by_email(&email)
            .await
            .map_err(AuthError::UserLookup)?
            .ok_or_else(|| {
                tracing::info!("Login failed: unknown email");
                AuthError::UserNotFound
            })?;

        if !self.verify_password(input.password, user.password_hash.clone()).await? {
            tracing::info!(user_id = user.id, "Login failed: wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        tracing::info!(user_id = user.id, "User logged in");

        self.issue_pair(user.id, user.role).await
    }

    /// Revoke both tokens of a session.
    ///
    /// The access token identifies the user; the refresh token is only
    /// passed through to deletion and may be unknown to the store.
    pub async fn logout(&self, access_token: &str, refresh_token: &str) -> Result<(), AuthError> {
        let claims = self
            .codec
            .decode(access_token)
            .map_err(|e| AuthError::TokenParsingFailed(Box::new(e)))?;
        let user_id = subject_id(&claims)?;

        self.sessions
            .delete_pair(user_id, access_token, refresh_token)
            .await
            .map_err(|e| {
                tracing::error!(user_id, error = %e, "Failed to delete session on logout");
                AuthError::TokenDeletionFailed(Box::new(e))
            })?;

        tracing::info!(user_id, "User logged out");
        Ok(())
    }

    /// Exchange a live refresh token for a new pair with the same role.
    ///
    /// The refresh token is checked and removed in one store step before the
    /// new pair is issued, so it never validates again and concurrent
    /// refreshes with it produce at most one pair.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self
            .codec
            .decode(refresh_token)
            .map_err(|e| AuthError::TokenParsingFailed(Box::new(e)))?;
        let user_id = subject_id(&claims)?;

        if !self.sessions.consume(user_id, refresh_token).await? {
            tracing::info!(user_id, "Refresh rejected: token is not live");
            return Err(AuthError::Unauthorized);
        }

        tracing::debug!(user_id, "Refresh token consumed");

        self.issue_pair(user_id, claims.role).await
    }

    /// Revoke every session of `user_id`
    pub async fn revoke_all(&self, user_id: i64) -> Result<(), AuthError> {
        self.sessions
            .delete_all(user_id)
            .await
            .map_err(|e| AuthError::TokenDeletionFailed(Box::new(e)))
    }

    /// Change a user's role and revoke their sessions so the new role
    /// applies from the next login.
    ///
    /// Returns `None` if no such user exists.
    pub async fn change_role(&self, user_id: i64, role: UserRole) -> Result<Option<User>, AuthError> {
        let user = self
            .users
            .update_role(user_id, role)
            .await
            .map_err(AuthError::UserLookup)?;

        if user.is_some() {
            self.revoke_all(user_id).await?;
            tracing::info!(user_id, role = %role, "User role changed");
        }
        Ok(user)
    }

    /// Look up a user by id
    pub async fn get_user(&self, user_id: i64) -> Result<Option<User>, AuthError> {
        self.users
            .find_by_id(user_id)
            .await
            .map_err(AuthError::UserLookup)
    }

    async fn issue_pair(&self, user_id: i64, role: UserRole) -> Result<TokenPair, AuthError> {
        let subject = user_id.to_string();
        let access_token = self.codec.issue(&subject, role, self.access_ttl_minutes)?;
        let refresh_token = self.codec.issue(&subject, role, self.refresh_ttl_minutes)?;

        self.sessions
            .save_pair(user_id, &access_token, &refresh_token)
            .await
            .map_err(|e| {
                tracing::error!(user_id, error = %e, "Failed to store issued tokens");
                AuthError::TokenStorage(Box::new(e))
            })?;

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    // Argon2 is CPU-bound; keep it off the async worker threads.

    async fn hash_password(&self, password: String) -> Result<String, AuthError> {
        let verifier = self.verifier.clone();
        tokio::task::spawn_blocking(move || verifier.hash(&password))
            .await
            .map_err(|e| AuthError::HashingFailure(e.to_string()))?
    }

    async fn verify_password(&self, password: String, hash: String) -> Result<bool, AuthError> {
        let verifier = self.verifier.clone();
        tokio::task::spawn_blocking(move || verifier.verify(&password, &hash))
            .await
            .map_err(|e| AuthError::HashingFailure(e.to_string()))?
    }
}

fn subject_id(claims: &Claims) -> Result<i64, AuthError> {
    claims.user_id().ok_or_else(|| {
        AuthError::TokenParsingFailed(Box::new(AuthError::Malformed(
            "subject is not a user id".to_string(),
        )))
    })
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validate registration input
fn validate_register_input(input: &RegisterInput) -> Result<(), AuthError> {
    if input.first_name.trim().is_empty() {
        return Err(AuthError::Validation("First name cannot be empty".to_string()));
    }

    if input.last_name.trim().is_empty() {
        return Err(AuthError::Validation("Last name cannot be empty".to_string()));
    }

    if !is_valid_email(input.email.trim()) {
        return Err(AuthError::Validation("Invalid email format".to_string()));
    }

    if input.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    if input.password != input.confirm_password {
        return Err(AuthError::Validation("Passwords do not match".to_string()));
    }

    Ok(())
}

/// `local@domain.tld`, no whitespace, exactly one `@`
fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}
