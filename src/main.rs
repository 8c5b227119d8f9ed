//! market-auth - token authentication service for the marketplace API

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use market_auth::{
    api::{self, AppState, CookieSettings},
    cache::create_cache,
    config::Config,
    db::{self, repositories::SqlxUserRepository},
    services::{Argon2Verifier, AuthService, RequestGate, SessionStore, TokenCodec},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "market_auth=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting market-auth...");

    // Load configuration; refuse to start without a signing secret
    let config = Config::load_with_env(Path::new("config.yml"))?;
    config.validate()?;
    tracing::info!(?config, "Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {}", config.database.url);

    // Run migrations
    let applied = db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed ({} applied)", applied);

    // Initialize session backend
    let backend = create_cache(&config.cache).await?;
    tracing::info!("Session backend initialized: {:?}", config.cache.driver);

    // Build services
    let codec = Arc::new(TokenCodec::new(&config.auth)?);
    let sessions = SessionStore::with_timeout(
        backend,
        codec.clone(),
        Duration::from_millis(config.cache.op_timeout_ms),
    );
    let auth_service = AuthService::new(
        SqlxUserRepository::boxed(pool),
        Arc::new(Argon2Verifier),
        codec.clone(),
        sessions.clone(),
        &config.auth,
    );

    let state = AppState {
        auth_service: Arc::new(auth_service),
        gate: RequestGate::new(codec, sessions),
        cookies: Arc::new(CookieSettings::from_config(&config)),
    };

    // Build router
    let app = api::build_router(state, &config.server.cors_origin)?;

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
