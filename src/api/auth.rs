//! Authentication API endpoints
//!
//! - POST /api/auth/register - Create an account and sign in
//! - POST /api/auth/login - Sign in
//! - POST /api/auth/refresh - Rotate the token pair
//! - POST /api/auth/logout - Revoke the current session
//! - GET /api/auth/me - Current caller (requires auth)
//! - POST /api/auth/logout-all - Revoke every session of the caller (requires auth)
//!
//! Issued tokens are returned in the body and also set as http-only cookies.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{
    cookie_value, ApiError, AppState, AuthenticatedUser, CookieSettings, ACCESS_COOKIE,
    REFRESH_COOKIE,
};
use crate::error::AuthError;
use crate::models::{LoginInput, RegisterInput, TokenPair, User};
use crate::services::parse_bearer;

/// Request body for login
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for refresh and logout; the refresh token may come from the
/// cookie instead
#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Issued token pair
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
}

impl From<TokenPair> for TokenResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
        }
    }
}

/// Current caller
#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    pub id: i64,
    pub role: String,
    pub expires_at: i64,
    pub user: Option<UserResponse>,
}

/// Public view of a user record
#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: String,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            role: user.role.to_string(),
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

/// Build public auth routes (no auth required)
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
}

/// Build protected auth routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_current_user))
        .route("/logout-all", post(logout_all))
}

/// POST /api/auth/register
async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterInput>,
) -> Result<impl IntoResponse, ApiError> {
    let pair = state.auth_service.register(body).await?;
    let headers = token_cookies(&state.cookies, &pair)?;

    Ok((StatusCode::CREATED, headers, Json(TokenResponse::from(pair))))
}

/// POST /api/auth/login
async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let pair = state
        .auth_service
        .login(LoginInput::new(body.email, body.password))
        .await?;
    let headers = token_cookies(&state.cookies, &pair)?;

    Ok((headers, Json(TokenResponse::from(pair))))
}

/// POST /api/auth/refresh
async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let refresh_token = refresh_token_from(&headers, &body)
        .ok_or_else(|| ApiError::unauthorized("Refresh token missing"))?;

    let pair = state.auth_service.refresh(&refresh_token).await?;
    let response_headers = token_cookies(&state.cookies, &pair)?;

    Ok((response_headers, Json(TokenResponse::from(pair))))
}

/// POST /api/auth/logout
///
/// Both tokens must be presented: the access token in the `Authorization`
/// header or cookie, the refresh token in the body or cookie.
async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let access_token = match headers.get(header::AUTHORIZATION) {
        Some(value) => value
            .to_str()
            .ok()
            .and_then(parse_bearer)
            .map(str::to_string)
            .ok_or(AuthError::AuthHeaderMissing)?,
        None => cookie_value(&headers, ACCESS_COOKIE).ok_or(AuthError::AuthHeaderMissing)?,
    };
    let refresh_token = refresh_token_from(&headers, &body)
        .ok_or_else(|| ApiError::unauthorized("Refresh token missing"))?;

    state
        .auth_service
        .logout(&access_token, &refresh_token)
        .await?;

    Ok((StatusCode::NO_CONTENT, clear_cookies(&state.cookies)?))
}

/// GET /api/auth/me
async fn get_current_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<MeResponse>, ApiError> {
    let id = user
        .user_id()
        .ok_or_else(|| ApiError::unauthorized("Invalid token subject"))?;
    let record = state.auth_service.get_user(id).await?;

    Ok(Json(MeResponse {
        id,
        role: user.claims.role.to_string(),
        expires_at: user.claims.exp,
        user: record.map(UserResponse::from),
    }))
}

/// POST /api/auth/logout-all
async fn logout_all(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    let id = user
        .user_id()
        .ok_or_else(|| ApiError::unauthorized("Invalid token subject"))?;
    state.auth_service.revoke_all(id).await?;

    Ok((StatusCode::NO_CONTENT, clear_cookies(&state.cookies)?))
}

/// Refresh token from the JSON body, falling back to the cookie.
///
/// An empty or unparsable body counts as no body.
fn refresh_token_from(headers: &HeaderMap, body: &[u8]) -> Option<String> {
    serde_json::from_slice::<RefreshRequest>(body)
        .ok()
        .and_then(|b| b.refresh_token)
        .filter(|t| !t.is_empty())
        .or_else(|| cookie_value(headers, REFRESH_COOKIE))
}

/// Build a `Set-Cookie` value for a token cookie
pub fn build_cookie(settings: &CookieSettings, name: &str, value: &str, max_age: u64) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        name, value, max_age
    );
    if let Some(domain) = &settings.domain {
        cookie.push_str("; Domain=");
        cookie.push_str(domain);
    }
    if settings.secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn token_cookies(settings: &CookieSettings, pair: &TokenPair) -> Result<HeaderMap, ApiError> {
    set_cookies([
        build_cookie(settings, ACCESS_COOKIE, &pair.access_token, settings.access_max_age),
        build_cookie(settings, REFRESH_COOKIE, &pair.refresh_token, settings.refresh_max_age),
    ])
}

fn clear_cookies(settings: &CookieSettings) -> Result<HeaderMap, ApiError> {
    set_cookies([
        build_cookie(settings, ACCESS_COOKIE, "", 0),
        build_cookie(settings, REFRESH_COOKIE, "", 0),
    ])
}

fn set_cookies(cookies: [String; 2]) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    for cookie in cookies {
        let value = HeaderValue::from_str(&cookie)
            .map_err(|_| ApiError::internal_error("Invalid cookie value"))?;
        headers.append(header::SET_COOKIE, value);
    }
    Ok(headers)
}
