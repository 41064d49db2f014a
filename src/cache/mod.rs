/// Caching layer for the TeleDrive API
///
/// Provides a cache-first lookup for resolved auth identities:
/// - Redis when configured and reachable
/// - An in-memory TTL store otherwise (and whenever a Redis call fails)
/// - Single-flight collapsing of concurrent fills for the same key

pub mod memory;
pub mod redis_store;
pub mod single_flight;

pub use memory::MemoryStore;
pub use redis_store::{RedisStore, RemoteStore};
pub use single_flight::SingleFlight;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Cache layer configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Redis connection URL; `None` means in-memory only
    pub redis_url: Option<String>,

    /// Key prefix for all cache entries (default: "teledrive:")
    pub key_prefix: String,

    /// TTL for resolved auth identities in seconds (default: 54000 = 15 hours)
    pub auth_ttl: u64,

    /// How often expired in-memory entries are swept, in seconds
    pub sweep_interval: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            key_prefix: "teledrive:".to_string(),
            auth_ttl: 54000,
            sweep_interval: 300,
        }
    }
}

impl CacheConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL").ok().filter(|s| !s.is_empty()),
            key_prefix: std::env::var("CACHE_KEY_PREFIX")
                .unwrap_or_else(|_| "teledrive:".to_string()),
            auth_ttl: std::env::var("AUTH_CACHE_TTL")
                .unwrap_or_else(|_| "54000".to_string())
                .parse()
                .unwrap_or(54000),
            sweep_interval: std::env::var("CACHE_SWEEP_INTERVAL")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .unwrap_or(300),
        }
    }
}

/// Cache client: Redis with in-memory fallback, plus the single-flight table
#[derive(Clone)]
pub struct CacheClient {
    redis: Option<Arc<dyn RemoteStore>>,
    memory: MemoryStore,
    flights: Arc<SingleFlight<serde_json::Value>>,
    config: CacheConfig,
}

impl CacheClient {
    /// Connect to Redis if configured, falling back to memory if that fails
    pub async fn connect(config: CacheConfig) -> Self {
        let redis = match &config.redis_url {
            Some(url) => match RedisStore::connect(url).await {
                Ok(store) => {
                    info!("✓ Redis connection established");
                    Some(Arc::new(store) as Arc<dyn RemoteStore>)
                }
                Err(e) => {
                    warn!("Redis connection failed, using in-memory cache: {}", e);
                    None
                }
            },
            None => {
                info!("REDIS_URL not set, using in-memory cache");
                None
            }
        };

        Self {
            redis,
            memory: MemoryStore::new(),
            flights: Arc::new(SingleFlight::new()),
            config,
        }
    }

    /// Memory-only client
    #[cfg(test)]
    pub fn in_memory(config: CacheConfig) -> Self {
        Self {
            redis: None,
            memory: MemoryStore::new(),
            flights: Arc::new(SingleFlight::new()),
            config,
        }
    }

    /// Client over an arbitrary remote store
    #[cfg(test)]
    pub fn with_remote(config: CacheConfig, remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            redis: Some(remote),
            ..Self::in_memory(config)
        }
    }

    pub fn is_distributed(&self) -> bool {
        self.redis.is_some()
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    /// Build a cache key with prefix
    fn build_key(&self, category: &str, key: &str) -> String {
        format!("{}{}{}", self.config.key_prefix, category, key)
    }

    /// Remote first; memory also holds entries whose remote write failed
    async fn get_raw(&self, cache_key: &str) -> Option<String> {
        if let Some(remote) = &self.redis {
            match remote.get(cache_key).await {
                Ok(Some(value)) => return Some(value),
                Ok(None) => {}
                Err(e) => warn!("Redis GET failed, falling back to memory: {}", e),
            }
        }
        self.memory.get(cache_key)
    }

    async fn set_raw(&self, cache_key: &str, payload: String, ttl_secs: u64) {
        if let Some(remote) = &self.redis {
            match remote.set_ex(cache_key, &payload, ttl_secs).await {
                Ok(()) => return,
                Err(e) => warn!("Redis SET failed, falling back to memory: {}", e),
            }
        }
        self.memory.set(cache_key, payload, Duration::from_secs(ttl_secs));
    }

    /// Get a value from cache
    pub async fn get<T: DeserializeOwned>(&self, category: &str, key: &str) -> Option<T> {
        let cache_key = self.build_key(category, key);
        let json = self.get_raw(&cache_key).await?;

        match serde_json::from_str(&json) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Failed to deserialize cached value: {}", e);
                // Delete corrupted cache entry
                self.delete(category, key).await;
                None
            }
        }
    }

    /// Set a value in cache with TTL
    pub async fn set<T: Serialize>(&self, category: &str, key: &str, value: &T, ttl_secs: u64) -> ApiResult<()> {
        let cache_key = self.build_key(category, key);
        let json = serde_json::to_string(value)
            .map_err(|e| ApiError::Cache(format!("Cache serialization failed: {}", e)))?;

        debug!("Cache SET: {}{} (TTL: {}s)", self.config.key_prefix, category, ttl_secs);
        self.set_raw(&cache_key, json, ttl_secs).await;
        Ok(())
    }

    /// Delete a value from cache
    pub async fn delete(&self, category: &str, key: &str) {
        let cache_key = self.build_key(category, key);
        if let Some(remote) = &self.redis {
            if let Err(e) = remote.del(&cache_key).await {
                warn!("Redis DELETE failed: {}", e);
            }
        }
        self.memory.delete(&cache_key);
    }

    /// Cache-first lookup
    ///
    /// 1. A live entry is returned without calling `compute`.
    /// 2. If a fill for the key is already running, its result is awaited.
    /// 3. Otherwise `compute` runs once; a success is stored for `ttl_secs`,
    ///    a failure is returned to every waiter and nothing is stored.
    pub async fn get_or_compute<T, F, Fut>(
        &self,
        category: &str,
        key: &str,
        ttl_secs: u64,
        compute: F,
    ) -> ApiResult<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ApiResult<T>> + Send + 'static,
    {
        if let Some(value) = self.get::<T>(category, key).await {
            metrics::record_cache_access(category, true);
            return Ok(value);
        }

        let cache_key = self.build_key(category, key);
        let store = self.clone();
        let fill_key = cache_key.clone();

        let (result, joined) = self
            .flights
            .run(&cache_key, async move {
                // A fill that settled between our miss and taking the slot
                if let Some(raw) = store.get_raw(&fill_key).await {
                    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&raw) {
                        return Ok(value);
                    }
                }

                let value = serde_json::to_value(compute().await?)
                    .map_err(|e| ApiError::Cache(format!("Cache serialization failed: {}", e)))?;
                store.set_raw(&fill_key, value.to_string(), ttl_secs).await;
                Ok(value)
            })
            .await;

        if joined {
            metrics::record_single_flight_join(category);
        } else {
            metrics::record_cache_access(category, false);
        }

        serde_json::from_value(result?)
            .map_err(|e| ApiError::Cache(format!("Cached value has unexpected shape: {}", e)))
    }

    /// Ping Redis to check connection
    pub async fn ping(&self) -> ApiResult<()> {
        match &self.redis {
            Some(remote) => remote.ping().await,
            None => Ok(()),
        }
    }

    /// Periodically drop expired in-memory entries
    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let memory = self.memory.clone();
        let period = Duration::from_secs(self.config.sweep_interval.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let purged = memory.purge_expired();
                if purged > 0 {
                    debug!("Purged {} expired cache entries", purged);
                }
            }
        })
    }
}

/// Cache category constants
pub mod categories {
    pub const AUTH: &str = "auth:";
}
