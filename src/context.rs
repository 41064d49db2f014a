/// Application context and dependency injection
use crate::{
    auth::Authenticator,
    cache::CacheClient,
    config::ServerConfig,
    db::{self, SqliteUserDirectory, UserDirectory},
    error::{ApiError, ApiResult},
    identity::IdentityResolver,
    rate_limit::RateLimiter,
    reporting::ErrorReporter,
    telegram::{BridgeTransport, ClientFactory, Transport},
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{info, warn};

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub cache: CacheClient,
    pub authenticator: Arc<Authenticator>,
    // None when rate limiting is disabled
    pub rate_limiter: Option<RateLimiter>,
    // None unless a bot token and chat id are configured
    pub reporter: Option<Arc<ErrorReporter>>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> ApiResult<Self> {
        // Validate configuration
        config.validate()?;

        // Initialize database
        let db = db::create_pool(
            &config.storage.database_url,
            db::DatabaseOptions {
                max_connections: config.storage.max_connections,
                ..Default::default()
            },
        )
        .await?;

        // Run migrations
        db::run_migrations(&db).await?;

        // Test connection
        db::test_connection(&db).await?;

        // Initialize cache and its expiry sweeper
        let cache = CacheClient::connect(config.cache.clone()).await;
        cache.spawn_sweeper();

        // Initialize protocol transport
        let transport = BridgeTransport::new(
            config.telegram.bridge_url.clone(),
            config.telegram.request_timeout,
        )
        .map_err(|e| ApiError::Config(format!("Failed to build Telegram transport: {}", e)))?;
        info!("Telegram bridge at {}", config.telegram.bridge_url);

        let users = Arc::new(SqliteUserDirectory::new(db.clone()));

        let ctx = Self::from_parts(config, db, cache, Arc::new(transport), users);
        if let Some(limiter) = &ctx.rate_limiter {
            limiter.spawn_cleanup(ctx.config.rate_limit.window);
        }

        Ok(ctx)
    }

    /// Assemble a context from already-built collaborators
    pub fn from_parts(
        config: ServerConfig,
        db: SqlitePool,
        cache: CacheClient,
        transport: Arc<dyn Transport>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        let clients = ClientFactory::new(
            config.telegram.credentials(),
            config.telegram.client_options(config.service.production),
            transport,
        );
        let resolver = IdentityResolver::new(config.telegram.retry);

        let authenticator = Arc::new(Authenticator::new(
            config.authentication.jwt_secret.clone(),
            config.authentication.cookie_name.clone(),
            clients,
            resolver,
            cache.clone(),
            users,
            config.cache.auth_ttl,
        ));

        let rate_limiter = if config.rate_limit.enabled {
            Some(RateLimiter::new(&config.rate_limit))
        } else {
            info!("Rate limiting disabled");
            None
        };

        let reporter = config.error_report.as_ref().and_then(|report| {
            match ErrorReporter::new(report) {
                Ok(reporter) => Some(Arc::new(reporter)),
                Err(e) => {
                    warn!("Error reporting disabled: {}", e);
                    None
                }
            }
        });

        Self {
            config: Arc::new(config),
            db,
            cache,
            authenticator,
            rate_limiter,
            reporter,
        }
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }

    pub fn database_configured(&self) -> bool {
        !self.config.storage.database_url.is_empty()
    }

    pub fn redis_configured(&self) -> bool {
        self.config.cache.redis_url.is_some()
    }

    /// Whether Telegram app credentials are present
    pub fn telegram_configured(&self) -> bool {
        self.config.telegram.api_id != 0 && !self.config.telegram.api_hash.is_empty()
    }
}
