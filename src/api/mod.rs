//! API layer - HTTP handlers and routing
//!
//! - Auth endpoints (register, login, refresh, logout, me, logout-all)
//! - Admin endpoints (user lookup, role change, session revocation)
//! - Middleware: the request gate as `require_auth`, role check as `require_admin`

pub mod admin;
pub mod auth;
pub mod middleware;

use anyhow::Context;
use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use middleware::{ApiError, AppState, AuthenticatedUser, CookieSettings};

/// Build the `/api` router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Admin routes (need admin role)
    let admin_routes = Router::new()
        .nest("/admin", admin::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_admin,
        ))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Protected routes (need a live access token)
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Public routes
    Router::new()
        .nest("/auth", auth::public_router())
        .merge(admin_routes)
        .merge(protected_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> anyhow::Result<Router> {
    let origin = cors_origin
        .parse::<HeaderValue>()
        .with_context(|| format!("Invalid CORS origin: {}", cors_origin))?;

    // Credentials are allowed so the token cookies are sent cross-origin
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);

    Ok(Router::new()
        .nest("/api", build_api_router(state.clone()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}


#[cfg(test)]
mod tests {
    use super::test_support::test_server;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_invalid_cors_origin_is_error() {
        let app = test_server().await;
        assert!(super::build_router(app.state.clone(), "bad\norigin").is_err());
    }

    /// Register, call a protected route, refresh, replay, log out
    #[tokio::test]
    async fn test_full_session_lifecycle() {
        let app = test_server().await;

        let pair = app
            .server
            .post("/api/auth/register")
            .json(&json!({
                "first_name": "Ada",
                "last_name": "Lovelace",
                "email": "a@b.com",
                "password": "12341234",
                "confirm_password": "12341234"
            }))
            .await
            .json::<super::auth::TokenResponse>();

        app.server
            .get("/api/auth/me")
            .authorization_bearer(&pair.access_token)
            .await
            .assert_status_ok();

        let rotated = app
            .server
            .post("/api/auth/refresh")
            .json(&json!({"refresh_token": pair.refresh_token}))
            .await
            .json::<super::auth::TokenResponse>();

        app.server
            .post("/api/auth/refresh")
            .json(&json!({"refresh_token": pair.refresh_token}))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        app.server
            .post("/api/auth/logout")
            .authorization_bearer(&rotated.access_token)
            .json(&json!({"refresh_token": rotated.refresh_token}))
            .await
            .assert_status(StatusCode::NO_CONTENT);

        app.server
            .get("/api/auth/me")
            .authorization_bearer(&rotated.access_token)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let app = test_server().await;
        app.server
            .get("/api/nope")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}
