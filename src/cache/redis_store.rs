/// Shared key-value backend for the cache
use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::{error, info};

/// Remote string store with per-key expiry
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn get(&self, key: &str) -> ApiResult<Option<String>>;
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> ApiResult<()>;
    async fn del(&self, key: &str) -> ApiResult<()>;
    async fn ping(&self) -> ApiResult<()>;
}

/// Redis over a self-reconnecting connection manager
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> ApiResult<Self> {
        info!("Connecting to Redis at {}", url);

        let client = Client::open(url).map_err(|e| {
            error!("Failed to create Redis client: {}", e);
            ApiError::Cache(format!("Redis client creation failed: {}", e))
        })?;

        Ok(Self {
            conn: ConnectionManager::new(client).await?,
        })
    }
}

#[async_trait]
impl RemoteStore for RedisStore {
    async fn get(&self, key: &str) -> ApiResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> ApiResult<()> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> ApiResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn ping(&self) -> ApiResult<()> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;

        if pong != "PONG" {
            return Err(ApiError::Cache("Unexpected Redis PING response".to_string()));
        }

        Ok(())
    }
}
