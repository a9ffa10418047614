// src/core/user_repository.rs
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;

use crate::app_log;
use crate::types::User;
use crate::utils::normalize_username;

const USER_COLUMNS: &str = "id, username, first_name, last_name, email, is_active, created_at";

pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        username: &str,
        first_name: &str,
        last_name: &str,
        email: Option<&str>,
    ) -> Result<User> {
        let username = normalize_username(username);
        if username.is_empty() {
            anyhow::bail!("Username must not be empty");
        }

        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO users (username, first_name, last_name, email, is_active, created_at)
            VALUES (?, ?, ?, ?, TRUE, ?)
            "#,
        )
        .bind(&username)
        .bind(first_name)
        .bind(last_name)
        .bind(email)
        .bind(now)
        .execute(self.pool)
        .await
        .with_context(|| format!("Failed to create user '{}'", username))?;

        app_log!(info, "Created user: {}", username);

        Ok(User {
            id: result.last_insert_rowid(),
            username,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: email.map(str::to_string),
            is_active: true,
            created_at: now,
        })
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = ?",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(user)
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE username = ?",
            USER_COLUMNS
        ))
        .bind(normalize_username(username))
        .fetch_optional(self.pool)
        .await?;
        Ok(user)
    }

    pub async fn list_all(&self) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users ORDER BY username ASC",
            USER_COLUMNS
        ))
        .fetch_all(self.pool)
        .await?;
        Ok(users)
    }

    pub async fn set_active(&self, username: &str, active: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET is_active = ? WHERE username = ?")
            .bind(active)
            .bind(normalize_username(username))
            .execute(self.pool)
            .await?;

        let updated = result.rows_affected() > 0;
        if updated {
            app_log!(info, "User {} active = {}", username, active);
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Database;

    #[tokio::test]
    async fn test_create_and_find() {
        let db = Database::in_memory().await.unwrap();
        let repo = UserRepository::new(db.pool());

        let created = repo
            .create("jdoe", "Jane", "Doe", Some("jane@example.com"))
            .await
            .unwrap();
        assert_eq!(created.full_name(), "Jane Doe");

        let found = repo.find_by_username(" JDoe ").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.email.as_deref(), Some("jane@example.com"));

        assert!(repo.find_by_id(created.id + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_is_rejected() {
        let db = Database::in_memory().await.unwrap();
        let repo = UserRepository::new(db.pool());

        repo.create("jdoe", "", "", None).await.unwrap();
        assert!(repo.create("jdoe", "", "", None).await.is_err());
        assert!(repo.create("  ", "", "", None).await.is_err());
    }

    #[tokio::test]
    async fn test_deactivate() {
        let db = Database::in_memory().await.unwrap();
        let repo = UserRepository::new(db.pool());
        repo.create("jdoe", "", "", None).await.unwrap();

        assert!(repo.set_active("jdoe", false).await.unwrap());
        assert!(!repo.set_active("ghost", false).await.unwrap());
        let user = repo.find_by_username("jdoe").await.unwrap().unwrap();
        assert!(!user.is_active);
    }
}
