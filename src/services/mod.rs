//! Services layer
//!
//! - `token`: sign and verify access/refresh tokens
//! - `password`: argon2 credential hashing
//! - `session`: per-token revocation state in the key-value backend
//! - `auth`: register, login, logout, refresh
//! - `gate`: bearer-token admission for protected routes

pub mod auth;
pub mod gate;
pub mod password;
pub mod session;
pub mod token;

pub use auth::AuthService;
pub use gate::{parse_bearer, RequestGate};
pub use password::{hash_password, verify_password, Argon2Verifier, CredentialVerifier};
pub use session::SessionStore;
pub use token::TokenCodec;
