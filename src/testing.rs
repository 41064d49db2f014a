/// Test doubles shared by unit tests
use crate::{
    auth::{token::SessionClaim, Authenticator},
    cache::{CacheClient, CacheConfig},
    config::{
        AuthConfig, LoggingConfig, RateLimitConfig, ServerConfig, ServiceConfig, StorageConfig,
        TelegramConfig,
    },
    context::AppContext,
    db::{memory_pool, User, UserDirectory},
    error::{ApiError, ApiResult},
    identity::{IdentityResolver, RetryPolicy},
    telegram::{
        AppCredentials, ClientFactory, ClientOptions, RemoteIdentity, StringSession, Transport,
        TransportError,
    },
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use jsonwebtoken::{encode, EncodingKey, Header};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const TEST_SECRET: &str = "test-secret";

pub fn sign_claim(claim: &SessionClaim, secret: &str) -> String {
    encode(
        &Header::default(),
        claim,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

pub fn sign_token(session: &str, secret: &str) -> String {
    sign_claim(
        &SessionClaim {
            session: session.to_string(),
            exp: None,
            iat: None,
        },
        secret,
    )
}

/// Valid configuration signed with [`TEST_SECRET`]
pub fn test_config() -> ServerConfig {
    ServerConfig {
        service: ServiceConfig {
            hostname: "127.0.0.1".into(),
            port: 4000,
            production: false,
            allowed_origins: vec![],
        },
        authentication: AuthConfig {
            jwt_secret: TEST_SECRET.into(),
            cookie_name: "authorization".into(),
        },
        telegram: TelegramConfig {
            api_id: 12345,
            api_hash: "0123456789abcdef".into(),
            connection_retries: 10,
            use_wss: false,
            bridge_url: "http://127.0.0.1:8081".into(),
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        },
        cache: CacheConfig::default(),
        storage: StorageConfig {
            database_url: "sqlite::memory:".into(),
            max_connections: 1,
        },
        rate_limit: RateLimitConfig {
            enabled: true,
            window: Duration::from_secs(900),
            max_requests: 1000,
        },
        logging: LoggingConfig {
            level: "info".into(),
            json: false,
        },
        error_report: None,
    }
}

/// A well-formed session blob for dc 2
pub fn sample_session() -> String {
    StringSession::new(2, "149.154.167.51", 443, vec![7u8; 256])
        .unwrap()
        .encode()
}

/// Token whose claim carries [`sample_session`]
pub fn valid_token() -> String {
    sign_token(&sample_session(), TEST_SECRET)
}

pub fn test_factory(transport: Arc<MockTransport>) -> ClientFactory {
    ClientFactory::new(
        AppCredentials {
            api_id: 1,
            api_hash: "hash".into(),
        },
        ClientOptions::default(),
        transport,
    )
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Scripted transport with call counters
pub struct MockTransport {
    identity: RemoteIdentity,
    latency: Duration,
    connect_failures: AtomicUsize,
    get_me_failures: AtomicUsize,
    connect_calls: AtomicUsize,
    get_me_calls: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            identity: RemoteIdentity {
                id: 42,
                first_name: Some("Test".into()),
                last_name: None,
                username: Some("tester".into()),
                phone: None,
                bot: false,
            },
            latency: Duration::ZERO,
            connect_failures: AtomicUsize::new(0),
            get_me_failures: AtomicUsize::new(0),
            connect_calls: AtomicUsize::new(0),
            get_me_calls: AtomicUsize::new(0),
        }
    }

    /// Delay every getMe by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn failing_connects(self, n: usize) -> Self {
        self.fail_next_connects(n);
        self
    }

    pub fn failing_get_me(self, n: usize) -> Self {
        self.get_me_failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn fail_next_connects(&self, n: usize) {
        self.connect_failures.store(n, Ordering::SeqCst);
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn get_me_calls(&self) -> usize {
        self.get_me_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(
        &self,
        _session: &StringSession,
        _credentials: &AppCredentials,
        _options: &ClientOptions,
    ) -> Result<(), TransportError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.connect_failures) {
            return Err(TransportError::Network("connection refused".into()));
        }
        Ok(())
    }

    async fn get_me(
        &self,
        _session: &StringSession,
        _credentials: &AppCredentials,
    ) -> Result<RemoteIdentity, TransportError> {
        self.get_me_calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if take_one(&self.get_me_failures) {
            return Err(TransportError::Timeout);
        }
        Ok(self.identity.clone())
    }
}

/// User directory backed by a map
#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: DashMap<String, User>,
}

impl InMemoryUserDirectory {
    pub fn with_user(self, tg_id: &str) -> Self {
        self.users.insert(
            tg_id.to_string(),
            User {
                id: format!("user-{}", tg_id),
                tg_id: tg_id.to_string(),
                username: format!("tg{}", tg_id),
                name: None,
                plan: "free".into(),
                created_at: Utc::now(),
            },
        );
        self
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_first_by_tg_id(&self, tg_id: &str) -> ApiResult<Option<User>> {
        Ok(self.users.get(tg_id).map(|u| u.clone()))
    }
}

/// User directory that always fails
pub struct BrokenUserDirectory;

#[async_trait]
impl UserDirectory for BrokenUserDirectory {
    async fn find_first_by_tg_id(&self, _tg_id: &str) -> ApiResult<Option<User>> {
        Err(ApiError::Database("database is locked".into()))
    }
}

/// Authenticator wired to test doubles
pub struct TestEnv {
    pub authenticator: Authenticator,
    pub transport: Arc<MockTransport>,
    pub cache: CacheClient,
}

impl TestEnv {
    pub fn new(transport: MockTransport, users: Arc<dyn UserDirectory>) -> Self {
        let transport = Arc::new(transport);
        let cache = CacheClient::in_memory(CacheConfig::default());
        let authenticator = Authenticator::new(
            TEST_SECRET.to_string(),
            "authorization".to_string(),
            test_factory(transport.clone()),
            IdentityResolver::new(RetryPolicy::default()),
            cache.clone(),
            users,
            CacheConfig::default().auth_ttl,
        );
        Self {
            authenticator,
            transport,
            cache,
        }
    }

    /// Mock transport reporting id 42, directory containing user "42"
    pub fn with_known_user() -> Self {
        Self::new(
            MockTransport::new(),
            Arc::new(InMemoryUserDirectory::default().with_user("42")),
        )
    }

    /// Mock transport reporting id 42, empty directory
    pub fn with_unknown_user() -> Self {
        Self::new(
            MockTransport::new(),
            Arc::new(InMemoryUserDirectory::default()),
        )
    }
}

/// Headers carrying `Authorization: Bearer <token>`
pub fn bearer(token: &str) -> axum::http::HeaderMap {
    let mut headers = axum::http::HeaderMap::new();
    headers.insert(
        axum::http::header::AUTHORIZATION,
        format!("Bearer {}", token).parse().unwrap(),
    );
    headers
}

/// Full application context over in-memory SQLite, memory cache and `transport`
pub async fn test_context(
    config: ServerConfig,
    transport: MockTransport,
    users: Arc<dyn UserDirectory>,
) -> (AppContext, Arc<MockTransport>) {
    let transport = Arc::new(transport);
    let ctx = AppContext::from_parts(
        config.clone(),
        memory_pool().await,
        CacheClient::in_memory(config.cache),
        transport.clone(),
        users,
    );
    (ctx, transport)
}
