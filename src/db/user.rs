/// Users table and the lookup the auth path needs
use crate::{error::ApiResult, metrics};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use std::time::Instant;

/// Local user record, keyed to a Telegram account by `tg_id`
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub tg_id: String,
    pub username: String,
    pub name: Option<String>,
    pub plan: String,
    pub created_at: DateTime<Utc>,
}

/// Lookup of local users by external identity
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_first_by_tg_id(&self, tg_id: &str) -> ApiResult<Option<User>>;
}

#[derive(Clone)]
pub struct SqliteUserDirectory {
    db: SqlitePool,
}

impl SqliteUserDirectory {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Insert a user row
    #[cfg(test)]
    pub async fn insert(&self, user: &User) -> ApiResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, tg_id, username, name, plan, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&user.id)
        .bind(&user.tg_id)
        .bind(&user.username)
        .bind(&user.name)
        .bind(&user.plan)
        .bind(user.created_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl UserDirectory for SqliteUserDirectory {
    async fn find_first_by_tg_id(&self, tg_id: &str) -> ApiResult<Option<User>> {
        let start = Instant::now();
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, tg_id, username, name, plan, created_at
            FROM users
            WHERE tg_id = ?1
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(tg_id)
        .fetch_optional(&self.db)
        .await?;

        metrics::record_db_query("SELECT", "users", start.elapsed().as_secs_f64());
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;

    fn user(id: &str, tg_id: &str) -> User {
        User {
            id: id.to_string(),
            tg_id: tg_id.to_string(),
            username: format!("user{}", tg_id),
            name: None,
            plan: "free".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_find_by_tg_id() {
        let directory = SqliteUserDirectory::new(memory_pool().await);
        directory.insert(&user("u1", "42")).await.unwrap();

        let found = directory.find_first_by_tg_id("42").await.unwrap();
        assert_eq!(found.map(|u| u.id), Some("u1".to_string()));
    }

    #[tokio::test]
    async fn test_missing_user_is_none() {
        let directory = SqliteUserDirectory::new(memory_pool().await);
        directory.insert(&user("u1", "42")).await.unwrap();

        assert!(directory.find_first_by_tg_id("43").await.unwrap().is_none());
    }
}
