/// Database layer for the TeleDrive API
///
/// Manages the SQLite pool and migrations and exposes the user directory the
/// auth path resolves remote identities against.

pub mod user;

pub use user::{SqliteUserDirectory, User, UserDirectory};

use crate::error::ApiResult;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

/// Database connection options
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub max_connections: u32,
    pub enable_wal: bool,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            enable_wal: true,
        }
    }
}

/// Create a SQLite connection pool
pub async fn create_pool(url: &str, options: DatabaseOptions) -> ApiResult<SqlitePool> {
    let connect_options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(if options.enable_wal {
            SqliteJournalMode::Wal
        } else {
            SqliteJournalMode::Delete
        })
        .foreign_keys(true)
        .busy_timeout(std::time::Duration::from_secs(5));

    // Ensure parent directory exists
    if let Some(parent) = connect_options.get_filename().parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| crate::error::ApiError::Database(format!("Failed to create {:?}: {}", parent, e)))?;
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(options.max_connections)
        .connect_with(connect_options)
        .await?;

    Ok(pool)
}

/// Run migrations embedded at compile time from ./migrations
pub async fn run_migrations(pool: &SqlitePool) -> ApiResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Test database connection
pub async fn test_connection(pool: &SqlitePool) -> ApiResult<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    let pool = create_pool(
        "sqlite::memory:",
        DatabaseOptions {
            max_connections: 1,
            enable_wal: false,
        },
    )
    .await
    .unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_pool_is_migrated() {
        let pool = memory_pool().await;
        test_connection(&pool).await.unwrap();
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }
}
