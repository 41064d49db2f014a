/// HTTP bridge to a protocol sidecar
///
/// The sidecar owns the MTProto connection pool; this transport forwards the
/// session and app credentials as JSON and maps HTTP outcomes to
/// [`TransportError`].
use super::{AppCredentials, ClientOptions, RemoteIdentity, StringSession, Transport, TransportError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone)]
pub struct BridgeTransport {
    http_client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConnectRequest<'a> {
    api_id: i32,
    api_hash: &'a str,
    session: String,
    connection_retries: u32,
    use_wss: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GetMeRequest<'a> {
    api_id: i32,
    api_hash: &'a str,
    session: String,
}

#[derive(Deserialize)]
struct BridgeError {
    #[serde(default)]
    error: String,
}

impl BridgeTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("teledrive-api/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<reqwest::Response, TransportError> {
        let response = self
            .http_client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        if response.status().is_success() {
            return Ok(response);
        }

        let code = response.status().as_u16();
        let message = response
            .json::<BridgeError>()
            .await
            .map(|e| e.error)
            .unwrap_or_default();
        Err(TransportError::Rejected { code, message })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(e.to_string())
    }
}

#[async_trait]
impl Transport for BridgeTransport {
    async fn connect(
        &self,
        session: &StringSession,
        credentials: &AppCredentials,
        options: &ClientOptions,
    ) -> Result<(), TransportError> {
        let body = ConnectRequest {
            api_id: credentials.api_id,
            api_hash: &credentials.api_hash,
            session: session.encode(),
            connection_retries: options.connection_retries,
            use_wss: options.use_wss,
        };
        self.post("/v1/connect", &body).await?;
        Ok(())
    }

    async fn get_me(
        &self,
        session: &StringSession,
        credentials: &AppCredentials,
    ) -> Result<RemoteIdentity, TransportError> {
        let body = GetMeRequest {
            api_id: credentials.api_id,
            api_hash: &credentials.api_hash,
            session: session.encode(),
        };
        self.post("/v1/users.getMe", &body)
            .await?
            .json::<RemoteIdentity>()
            .await
            .map_err(|e| TransportError::Protocol(e.to_string()))
    }
}
