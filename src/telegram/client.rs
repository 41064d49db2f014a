/// Per-request protocol client and the factory that builds it
use super::{AppCredentials, ClientOptions, LogLevel, RemoteIdentity, StringSession};
use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Transport-level failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("remote rejected request ({code}): {message}")]
    Rejected { code: u16, message: String },
    #[error("malformed response: {0}")]
    Protocol(String),
}

/// Boundary to the external protocol library
///
/// Implementations own the wire protocol; `connect` may retry internally up
/// to `options.connection_retries` times but must not be retried by callers
/// here.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(
        &self,
        session: &StringSession,
        credentials: &AppCredentials,
        options: &ClientOptions,
    ) -> Result<(), TransportError>;

    async fn get_me(
        &self,
        session: &StringSession,
        credentials: &AppCredentials,
    ) -> Result<RemoteIdentity, TransportError>;
}

/// A client bound to exactly one session
///
/// Created per request and never shared across requests.
pub struct TelegramClient {
    session: StringSession,
    credentials: AppCredentials,
    options: ClientOptions,
    transport: Arc<dyn Transport>,
    connected: Mutex<bool>,
}

impl fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramClient")
            .field("session", &self.session)
            .field("api_id", &self.credentials.api_id)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl TelegramClient {
    pub fn new(
        session: StringSession,
        credentials: AppCredentials,
        options: ClientOptions,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            session,
            credentials,
            options,
            transport,
            connected: Mutex::new(false),
        }
    }

    #[cfg(test)]
    pub async fn is_connected(&self) -> bool {
        *self.connected.lock().await
    }

    #[cfg(test)]
    pub fn session(&self) -> &StringSession {
        &self.session
    }

    /// Open the connection
    ///
    /// No-op when already connected. Concurrent callers on the same client
    /// wait for the first handshake instead of starting their own.
    pub async fn connect(&self) -> ApiResult<()> {
        let mut connected = self.connected.lock().await;
        if *connected {
            return Ok(());
        }

        self.transport
            .connect(&self.session, &self.credentials, &self.options)
            .await
            .map_err(|e| {
                if self.options.log_level.allows(LogLevel::Error) {
                    error!("Telegram connect failed (dc {:?}): {}", self.session.dc_id(), e);
                }
                ApiError::Connection {
                    reason: e.to_string(),
                }
            })?;

        *connected = true;
        if self.options.log_level.allows(LogLevel::Info) {
            info!("Telegram client connected (dc {:?})", self.session.dc_id());
        }
        Ok(())
    }

    /// Remote "who am I"
    ///
    /// A failed call leaves the client disconnected, so the next `connect`
    /// re-handshakes.
    pub async fn get_me(&self) -> ApiResult<RemoteIdentity> {
        let mut connected = self.connected.lock().await;
        if !*connected {
            return Err(ApiError::IdentityResolution(
                "client is not connected".to_string(),
            ));
        }

        match self.transport.get_me(&self.session, &self.credentials).await {
            Ok(me) => {
                if self.options.log_level.allows(LogLevel::Debug) {
                    debug!("users.getMe returned id {}", me.id);
                }
                Ok(me)
            }
            Err(e) => {
                *connected = false;
                if self.options.log_level.allows(LogLevel::Warn) {
                    warn!("users.getMe failed: {}", e);
                }
                Err(ApiError::IdentityResolution(e.to_string()))
            }
        }
    }
}

/// Builds clients from session blobs
///
/// Holds the app credentials and options shared by every client; building
/// does no network I/O.
#[derive(Clone)]
pub struct ClientFactory {
    credentials: AppCredentials,
    options: ClientOptions,
    transport: Arc<dyn Transport>,
}

impl ClientFactory {
    pub fn new(
        credentials: AppCredentials,
        options: ClientOptions,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            credentials,
            options,
            transport,
        }
    }

    /// Build a client for `session_blob`
    pub fn create(&self, session_blob: &str) -> ApiResult<TelegramClient> {
        let session = StringSession::parse(session_blob).map_err(|e| ApiError::ClientConstruction {
            reason: e.to_string(),
        })?;

        Ok(TelegramClient::new(
            session,
            self.credentials.clone(),
            self.options.clone(),
            Arc::clone(&self.transport),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_session, MockTransport};

    fn factory(transport: Arc<MockTransport>) -> ClientFactory {
        ClientFactory::new(
            AppCredentials {
                api_id: 1,
                api_hash: "hash".into(),
            },
            ClientOptions::default(),
            transport,
        )
    }

    #[test]
    fn test_create_does_no_io() {
        let transport = Arc::new(MockTransport::new());
        let client = factory(transport.clone()).create(&sample_session()).unwrap();
        assert_eq!(client.session().dc_id(), Some(2));
        assert_eq!(transport.connect_calls(), 0);
    }

    #[test]
    fn test_create_rejects_malformed_blob() {
        let transport = Arc::new(MockTransport::new());
        let result = factory(transport).create("9garbage");
        assert!(matches!(result, Err(ApiError::ClientConstruction { .. })));
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let transport = Arc::new(MockTransport::new());
        let client = factory(transport.clone()).create(&sample_session()).unwrap();

        client.connect().await.unwrap();
        client.connect().await.unwrap();

        assert!(client.is_connected().await);
        assert_eq!(transport.connect_calls(), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_is_connection_error() {
        let transport = Arc::new(MockTransport::new().failing_connects(1));
        let client = factory(transport.clone()).create(&sample_session()).unwrap();

        let result = client.connect().await;
        assert!(matches!(result, Err(ApiError::Connection { .. })));
        assert!(!client.is_connected().await);

        // No internal retry: the caller decides
        assert_eq!(transport.connect_calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_get_me_drops_connection() {
        let transport = Arc::new(MockTransport::new().failing_get_me(1));
        let client = factory(transport.clone()).create(&sample_session()).unwrap();
        client.connect().await.unwrap();

        assert!(client.get_me().await.is_err());
        assert!(!client.is_connected().await);

        client.connect().await.unwrap();
        assert_eq!(client.get_me().await.unwrap().id, 42);
        assert_eq!(transport.connect_calls(), 2);
    }

    #[tokio::test]
    async fn test_get_me_requires_connection() {
        let transport = Arc::new(MockTransport::new());
        let client = factory(transport.clone()).create(&sample_session()).unwrap();
        assert!(matches!(
            client.get_me().await,
            Err(ApiError::IdentityResolution(_))
        ));
        assert_eq!(transport.get_me_calls(), 0);
    }
}
