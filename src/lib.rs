//! market-auth - dual-token authentication and session revocation
//!
//! Short-lived access tokens and long-lived refresh tokens are signed with
//! HS256 and tracked one entry per token in a key-value store, so any token
//! can be revoked before it expires.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use error::AuthError;
