//! Database layer
//!
//! SQLite-backed user directory: connection pool, embedded migrations and
//! the user repository.
//!
//! # Usage
//!
//! ```ignore
//! use market_auth::config::DatabaseConfig;
//! use market_auth::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, create_test_pool};
