//! Database repositories

pub mod user;

pub use user::{DuplicateEmail, SqlxUserRepository, UserRepository};
