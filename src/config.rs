/// Configuration management for the TeleDrive API
use crate::{
    cache::CacheConfig,
    error::{ApiError, ApiResult},
    identity::RetryPolicy,
    telegram::{AppCredentials, ClientOptions, LogLevel},
};
use std::env;
use std::time::Duration;

/// Main server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub authentication: AuthConfig,
    pub telegram: TelegramConfig,
    pub cache: CacheConfig,
    pub storage: StorageConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
    pub error_report: Option<ErrorReportConfig>,
}

/// Service-level configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub production: bool,
    /// Empty means any origin
    pub allowed_origins: Vec<String>,
}

/// Authentication configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Cookie consulted when the Authorization header is absent
    pub cookie_name: String,
}

/// Telegram application and transport configuration
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub api_id: i32,
    pub api_hash: String,
    pub connection_retries: u32,
    pub use_wss: bool,
    /// Base URL of the protocol bridge sidecar
    pub bridge_url: String,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl TelegramConfig {
    pub fn credentials(&self) -> AppCredentials {
        AppCredentials {
            api_id: self.api_id,
            api_hash: self.api_hash.clone(),
        }
    }

    /// Client options; protocol logging is silenced in production
    pub fn client_options(&self, production: bool) -> ClientOptions {
        ClientOptions {
            connection_retries: self.connection_retries,
            use_wss: self.use_wss,
            log_level: if production { LogLevel::None } else { LogLevel::Info },
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub database_url: String,
    pub max_connections: u32,
}

/// Rate limiting configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub window: Duration,
    pub max_requests: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

/// Where 5xx reports are forwarded
#[derive(Debug, Clone)]
pub struct ErrorReportConfig {
    pub bot_token: String,
    pub chat_id: String,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> ApiResult<Self> {
        dotenv::dotenv().ok();

        let production = env::var("ENV").map(|v| v == "production").unwrap_or(false);

        let hostname = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "4000".to_string())
            .parse()
            .map_err(|_| ApiError::Config("Invalid port number".to_string()))?;
        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let jwt_secret = env::var("API_JWT_SECRET")
            .map_err(|_| ApiError::Config("API_JWT_SECRET required".to_string()))?;
        let cookie_name =
            env::var("AUTH_COOKIE_NAME").unwrap_or_else(|_| "authorization".to_string());

        let api_id = env::var("TG_API_ID")
            .unwrap_or_else(|_| "0".to_string())
            .parse()
            .map_err(|_| ApiError::Config("TG_API_ID must be an integer".to_string()))?;
        let api_hash = env::var("TG_API_HASH").unwrap_or_default();
        let connection_retries = env::var("CONNECTION_RETRIES")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);
        let use_wss = env::var("TG_USE_WSS")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);
        let bridge_url =
            env::var("TG_BRIDGE_URL").unwrap_or_else(|_| "http://127.0.0.1:8081".to_string());
        let request_timeout = Duration::from_secs(
            env::var("TG_REQUEST_TIMEOUT")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
        );
        let retry = RetryPolicy {
            extra_attempts: env::var("IDENTITY_RETRY_ATTEMPTS")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .unwrap_or(2),
            delay: Duration::from_millis(
                env::var("IDENTITY_RETRY_DELAY_MS")
                    .unwrap_or_else(|_| "2000".to_string())
                    .parse()
                    .unwrap_or(2000),
            ),
        };

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://./data/teledrive.sqlite".to_string());
        let max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);

        let rate_limit_enabled = env::var("RATE_LIMIT_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);
        let rate_limit_window = Duration::from_secs(
            env::var("RATE_LIMIT_WINDOW_SECS")
                .unwrap_or_else(|_| "900".to_string())
                .parse()
                .unwrap_or(900),
        );
        let default_max = if production { 100 } else { 1000 };
        let rate_limit_max = env::var("RATE_LIMIT_MAX")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default_max);

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| {
            if production {
                "info".to_string()
            } else {
                "teledrive_api=debug,tower_http=debug".to_string()
            }
        });

        let error_report = match env::var("TG_BOT_TOKEN") {
            Ok(bot_token) if !bot_token.is_empty() => env::var("TG_BOT_ERROR_REPORT_ID")
                .or_else(|_| env::var("TG_BOT_OWNER_ID"))
                .ok()
                .map(|chat_id| ErrorReportConfig { bot_token, chat_id }),
            _ => None,
        };

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                production,
                allowed_origins,
            },
            authentication: AuthConfig {
                jwt_secret,
                cookie_name,
            },
            telegram: TelegramConfig {
                api_id,
                api_hash,
                connection_retries,
                use_wss,
                bridge_url,
                request_timeout,
                retry,
            },
            cache: CacheConfig::from_env(),
            storage: StorageConfig {
                database_url,
                max_connections,
            },
            rate_limit: RateLimitConfig {
                enabled: rate_limit_enabled,
                window: rate_limit_window,
                max_requests: rate_limit_max,
            },
            logging: LoggingConfig {
                level: log_level,
                json: production,
            },
            error_report,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> ApiResult<()> {
        if self.service.port == 0 {
            return Err(ApiError::Config("Port cannot be zero".to_string()));
        }

        if self.authentication.jwt_secret.is_empty() {
            return Err(ApiError::Config("API_JWT_SECRET cannot be empty".to_string()));
        }

        if self.telegram.api_id == 0 || self.telegram.api_hash.is_empty() {
            return Err(ApiError::Config(
                "TG_API_ID and TG_API_HASH are required".to_string(),
            ));
        }

        if self.cache.auth_ttl == 0 {
            return Err(ApiError::Config("AUTH_CACHE_TTL must be positive".to_string()));
        }

        Ok(())
    }
}
