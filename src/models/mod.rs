//! Data models
//!
//! - User directory entities and auth request inputs
//! - Token claims and the issued token pair

mod token;
mod user;

pub use token::{session_key, session_pattern, Claims, TokenPair};
pub use user::{LoginInput, NewUser, RegisterInput, User, UserRole};
