//! User repository
//!
//! - `UserRepository` trait: the user directory as seen by the auth core
//! - `SqlxUserRepository`: SQLite implementation

use crate::models::{NewUser, User, UserRole};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// User directory.
///
/// Lookups return `Ok(None)` when no user matches and `Err` only when the
/// lookup itself failed.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user and return it with its assigned id
    async fn create(&self, user: &NewUser) -> Result<User>;

    /// Get user by ID
    async fn find_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Get user by email
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Change a user's role; returns `None` if the user does not exist
    async fn update_role(&self, id: i64, role: UserRole) -> Result<Option<User>>;
}

/// Returned (inside the `anyhow::Error`) by `create` when the email is
/// already registered
#[derive(Debug, thiserror::Error)]
#[error("email is already registered")]
pub struct DuplicateEmail;

/// SQLx-based user repository
pub struct SqlxUserRepository {
    pool: SqlitePool,
}

impl SqlxUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a shared repository for dependency injection
    pub fn boxed(pool: SqlitePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

const USER_COLUMNS: &str =
    "id, first_name, last_name, email, password_hash, role, created_at, updated_at";

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &NewUser) -> Result<User> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO users (first_name, last_name, email, password_hash, role, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            let unique = e
                .as_database_error()
                .is_some_and(|db| db.is_unique_violation());
            if unique {
                anyhow::Error::new(DuplicateEmail)
            } else {
                anyhow::Error::new(e).context("Failed to create user")
            }
        })?;

        Ok(User {
            id: result.last_insert_rowid(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            role: user.role,
            created_at: now,
            updated_at: now,
        })
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get user by ID")?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM users WHERE email = ?",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get user by email")?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn update_role(&self, id: i64, role: UserRole) -> Result<Option<User>> {
        let result = sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update user role")?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_by_id(id).await
    }
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let role_str: String = row.get("role");
    let role = UserRole::from_str(&role_str)
        .with_context(|| format!("Invalid role in database: {}", role_str))?;

    Ok(User {
        id: row.get("id"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> SqlxUserRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxUserRepository::new(pool)
    }

    fn new_user(email: &str) -> NewUser {
        NewUser {
            first_name: "Grace".to_string(),
            last_name: "Hopper".to_string(),
            email: email.to_string(),
            password_hash: "$argon2id$v=19$fake".to_string(),
            role: UserRole::User,
        }
    }

    #[tokio::test]
    async fn test_create_user() {
        let repo = setup_test_repo().await;

        let created = repo
            .create(&new_user("grace@example.com"))
            .await
            .expect("Failed to create user");

        assert!(created.id > 0);
        assert_eq!(created.email, "grace@example.com");
        assert_eq!(created.role, UserRole::User);
    }

    #[tokio::test]
    async fn test_find_by_email_and_id() {
        let repo = setup_test_repo().await;
        let created = repo.create(&new_user("grace@example.com")).await.unwrap();

        let by_email = repo
            .find_by_email("grace@example.com")
            .await
            .expect("Failed to get user")
            .expect("User not found");
        assert_eq!(by_email.id, created.id);
        assert_eq!(by_email.first_name, "Grace");
        assert_eq!(by_email.password_hash, "$argon2id$v=19$fake");

        let by_id = repo.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.email, "grace@example.com");
    }

    #[tokio::test]
    async fn test_find_missing_user_is_none() {
        let repo = setup_test_repo().await;

        assert!(repo.find_by_id(999).await.unwrap().is_none());
        assert!(repo.find_by_email("nobody@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_fails() {
        let repo = setup_test_repo().await;
        repo.create(&new_user("dup@example.com")).await.unwrap();

        let err = repo.create(&new_user("dup@example.com")).await.unwrap_err();
        assert!(err.downcast_ref::<DuplicateEmail>().is_some());
    }

    #[tokio::test]
    async fn test_update_role() {
        let repo = setup_test_repo().await;
        let created = repo.create(&new_user("grace@example.com")).await.unwrap();

        let updated = repo
            .update_role(created.id, UserRole::Admin)
            .await
            .unwrap()
            .expect("User should exist");
        assert_eq!(updated.role, UserRole::Admin);

        assert!(repo.update_role(999, UserRole::Admin).await.unwrap().is_none());
    }
}
