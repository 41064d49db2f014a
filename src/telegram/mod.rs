/// Telegram protocol client
///
/// Builds per-request clients bound to a serialized session and talks to the
/// remote service through a pluggable [`Transport`]. Only the surface the auth
/// path needs is modelled: connect and "who am I".

pub mod bridge;
pub mod client;
pub mod session;

pub use bridge::BridgeTransport;
pub use client::{ClientFactory, TelegramClient, Transport, TransportError};
pub use session::StringSession;

use serde::{Deserialize, Serialize};

/// Application credentials issued by Telegram (api_id / api_hash)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppCredentials {
    pub api_id: i32,
    pub api_hash: String,
}

/// Verbosity of the protocol client's own logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    None,
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    /// Whether a message at `level` should be emitted
    pub fn allows(self, level: LogLevel) -> bool {
        self != LogLevel::None && level <= self
    }
}

/// Options handed to every client the factory builds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Max reconnect attempts, enforced by the transport
    pub connection_retries: u32,
    pub use_wss: bool,
    pub log_level: LogLevel,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connection_retries: 10,
            use_wss: false,
            log_level: LogLevel::Info,
        }
    }
}

/// Identity reported by the remote `users.getMe` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteIdentity {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

impl RemoteIdentity {
    /// External id as stored in the users table (`tg_id`)
    pub fn external_id(&self) -> String {
        self.id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_filtering() {
        assert!(!LogLevel::None.allows(LogLevel::Error));
        assert!(LogLevel::Info.allows(LogLevel::Warn));
        assert!(LogLevel::Info.allows(LogLevel::Info));
        assert!(!LogLevel::Info.allows(LogLevel::Debug));
    }

    #[test]
    fn test_remote_identity_from_minimal_json() {
        let me: RemoteIdentity = serde_json::from_str(r#"{"id": 42}"#).unwrap();
        assert_eq!(me.id, 42);
        assert_eq!(me.external_id(), "42");
        assert!(me.username.is_none());
        assert!(!me.bot);
    }
}
