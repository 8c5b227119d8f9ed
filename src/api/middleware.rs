//! API middleware
//!
//! Contains:
//! - Shared application state
//! - The JSON error body and its mapping from [`AuthError`]
//! - Authentication (bearer token admitted by the request gate)
//! - Authorization (role checking)

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

use crate::config::Config;
use crate::error::AuthError;
use crate::models::{Claims, UserRole};
use crate::services::{AuthService, RequestGate};

/// Name of the cookie carrying the access token
pub const ACCESS_COOKIE: &str = "access_token";
/// Name of the cookie carrying the refresh token
pub const REFRESH_COOKIE: &str = "refresh_token";

/// Attributes of the token cookies
#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub secure: bool,
    pub domain: Option<String>,
    /// Lifetime of the access cookie in seconds
    pub access_max_age: u64,
    /// Lifetime of the refresh cookie in seconds
    pub refresh_max_age: u64,
}

impl CookieSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            secure: config.server.secure_cookies,
            domain: config.server.cookie_domain.clone(),
            access_max_age: config.auth.access_ttl_minutes.saturating_mul(60),
            refresh_max_age: config.auth.refresh_ttl_minutes.saturating_mul(60),
        }
    }
}

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub auth_service: Arc<AuthService>,
    pub gate: RequestGate,
    pub cookies: Arc<CookieSettings>,
}

/// Caller admitted by [`require_auth`]
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub claims: Claims,
    /// The raw token the caller presented
    pub token: String,
}

impl AuthenticatedUser {
    pub fn user_id(&self) -> Option<i64> {
        self.claims.user_id()
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let user = parts.extensions.get::<AuthenticatedUser>().cloned();
        async move { user.ok_or_else(|| ApiError::unauthorized("Authentication required")) }
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED"
            | "AUTH_HEADER_MISSING"
            | "INVALID_TOKEN"
            | "TOKEN_EXPIRED"
            | "INVALID_CREDENTIALS" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "USER_EXISTS" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        if err.is_internal() {
            tracing::error!(error = ?err, "Request failed");
            return ApiError::new(err.code(), "Internal server error");
        }

        let message = match &err {
            // Unknown email and wrong password look the same to the client
            AuthError::UserNotFound | AuthError::InvalidCredentials => {
                "Invalid email or password".to_string()
            }
            AuthError::Validation(msg) => msg.clone(),
            AuthError::TokenParsingFailed(_) | AuthError::Malformed(_) => "Invalid token".to_string(),
            other => capitalize(&other.to_string()),
        };

        ApiError::new(err.code(), message)
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

/// Read a cookie value from the `Cookie` headers
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|s| s.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// Authentication middleware
///
/// Admits the request through the gate using the `Authorization` header, or
/// the access-token cookie when no header is sent.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .map(|h| h.to_str().unwrap_or_default().to_string());

    let user = match header_value {
        Some(value) => {
            let claims = state.gate.authenticate(Some(value.as_str())).await?;
            let token = crate::services::parse_bearer(&value)
                .unwrap_or_default()
                .to_string();
            AuthenticatedUser { claims, token }
        }
        None => {
            let token = cookie_value(request.headers(), ACCESS_COOKIE)
                .ok_or(AuthError::AuthHeaderMissing)?;
            let claims = state.gate.admit(&token).await?;
            AuthenticatedUser { claims, token }
        }
    };

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Admin authorization middleware
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    state.gate.authorize(&user.claims, UserRole::Admin)?;

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with_cookie(cookie: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
        headers
    }

    #[test]
    fn test_cookie_value() {
        let headers = headers_with_cookie("theme=dark; access_token=abc.def.ghi; refresh_token=xyz");
        assert_eq!(cookie_value(&headers, ACCESS_COOKIE).as_deref(), Some("abc.def.ghi"));
        assert_eq!(cookie_value(&headers, REFRESH_COOKIE).as_deref(), Some("xyz"));
        assert_eq!(cookie_value(&headers, "session"), None);
    }

    #[test]
    fn test_cookie_value_empty_is_absent() {
        let headers = headers_with_cookie("access_token=");
        assert_eq!(cookie_value(&headers, ACCESS_COOKIE), None);
    }

    #[test]
    fn test_credential_errors_are_indistinguishable() {
        let not_found = ApiError::from(AuthError::UserNotFound);
        let wrong_password = ApiError::from(AuthError::InvalidCredentials);

        assert_eq!(not_found.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(not_found.error.code, wrong_password.error.code);
        assert_eq!(not_found.error.message, wrong_password.error.message);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(AuthError::Validation("bad".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::from(AuthError::AuthHeaderMissing).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::from(AuthError::Unauthorized).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::from(AuthError::Forbidden).status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::from(AuthError::UserExists).status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::from(AuthError::Store(anyhow::anyhow!("down"))).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_errors_hide_detail() {
        let err = ApiError::from(AuthError::Store(anyhow::anyhow!("redis://secret-host refused")));
        assert_eq!(err.error.code, "INTERNAL_ERROR");
        assert!(!err.error.message.contains("secret-host"));
    }

    #[test]
    fn test_api_error_constructors() {
        assert_eq!(ApiError::unauthorized("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::internal_error("x").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
