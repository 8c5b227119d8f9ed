//! Admin API endpoints
//!
//! - GET /api/admin/users/{id} - Look up a user
//! - PUT /api/admin/users/{id}/role - Change a user's role and revoke their sessions
//! - DELETE /api/admin/users/{id}/sessions - Revoke every session of a user

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::auth::UserResponse;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::UserRole;

/// Request body for a role change
#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: UserRole,
}

/// Build admin routes (requires auth and admin middleware)
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/{id}", get(get_user))
        .route("/users/{id}/role", put(change_role))
        .route("/users/{id}/sessions", delete(revoke_sessions))
}

/// GET /api/admin/users/{id}
async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .auth_service
        .get_user(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(user.into()))
}

/// PUT /api/admin/users/{id}/role
async fn change_role(
    State(state): State<AppState>,
    admin: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<ChangeRoleRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .auth_service
        .change_role(id, body.role)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    tracing::info!(
        admin_id = admin.user_id(),
        user_id = id,
        role = %body.role,
        "Role changed by admin"
    );

    Ok(Json(user.into()))
}

/// DELETE /api/admin/users/{id}/sessions
async fn revoke_sessions(
    State(state): State<AppState>,
    admin: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.auth_service.revoke_all(id).await?;

    tracing::info!(admin_id = admin.user_id(), user_id = id, "Sessions revoked by admin");

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::auth::TokenResponse;
    use crate::api::test_support::{test_server, TestApp};
    use serde_json::json;

    /// Register a user, optionally promote them, and log in again
    async fn sign_in(app: &TestApp, email: &str, admin: bool) -> (i64, TokenResponse) {
        let pair = app
            .server
            .post("/api/auth/register")
            .json(&json!({
                "first_name": "Test",
                "last_name": "User",
                "email": email,
                "password": "12341234",
                "confirm_password": "12341234"
            }))
            .await
            .json::<TokenResponse>();
        let id = app.codec.decode(&pair.access_token).unwrap().user_id().unwrap();

        if !admin {
            return (id, pair);
        }

        app.state
            .auth_service
            .change_role(id, UserRole::Admin)
            .await
            .unwrap();
        let pair = app
            .server
            .post("/api/auth/login")
            .json(&json!({"email": email, "password": "12341234"}))
            .await
            .json::<TokenResponse>();
        (id, pair)
    }

    #[tokio::test]
    async fn test_admin_can_get_user() {
        let app = test_server().await;
        let (user_id, _) = sign_in(&app, "user@b.com", false).await;
        let (_, admin) = sign_in(&app, "admin@b.com", true).await;

        let response = app
            .server
            .get(&format!("/api/admin/users/{}", user_id))
            .authorization_bearer(&admin.access_token)
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<UserResponse>().email, "user@b.com");

        app.server
            .get("/api/admin/users/9999")
            .authorization_bearer(&admin.access_token)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_non_admin_is_forbidden() {
        let app = test_server().await;
        let (user_id, user) = sign_in(&app, "user@b.com", false).await;

        app.server
            .get(&format!("/api/admin/users/{}", user_id))
            .authorization_bearer(&user.access_token)
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_admin_routes_require_auth() {
        let app = test_server().await;

        app.server
            .get("/api/admin/users/1")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_role_change_revokes_target_sessions() {
        let app = test_server().await;
        let (user_id, user) = sign_in(&app, "user@b.com", false).await;
        let (_, admin) = sign_in(&app, "admin@b.com", true).await;

        let response = app
            .server
            .put(&format!("/api/admin/users/{}/role", user_id))
            .authorization_bearer(&admin.access_token)
            .json(&json!({"role": "admin"}))
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<UserResponse>().role, "admin");

        app.server
            .get("/api/auth/me")
            .authorization_bearer(&user.access_token)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_revoke_sessions() {
        let app = test_server().await;
        let (user_id, user) = sign_in(&app, "user@b.com", false).await;
        let (_, admin) = sign_in(&app, "admin@b.com", true).await;

        app.server
            .delete(&format!("/api/admin/users/{}/sessions", user_id))
            .authorization_bearer(&admin.access_token)
            .await
            .assert_status(StatusCode::NO_CONTENT);

        app.server
            .post("/api/auth/refresh")
            .json(&json!({"refresh_token": user.refresh_token}))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }
}
