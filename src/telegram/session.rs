/// Serialized session state ("string session")
///
/// Wire format: a one-character version (`1`) followed by standard base64 of
///
/// ```text
/// dc_id: u8 | address | port: u16 BE | auth_key: [u8; 256]
/// ```
///
/// where `address` is either 4 raw IPv4 octets (legacy layout, detected by the
/// decoded payload being exactly 263 bytes) or a `u16` BE length followed by a
/// UTF-8 host string.
use base64::{engine::general_purpose::STANDARD, Engine};
use std::fmt;
use std::net::Ipv4Addr;
use thiserror::Error;

const CURRENT_VERSION: char = '1';
const AUTH_KEY_LEN: usize = 256;
const LEGACY_IPV4_LEN: usize = 1 + 4 + 2 + AUTH_KEY_LEN;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("unsupported session version {0:?}")]
    Version(char),
    #[error("session is not valid base64: {0}")]
    Encoding(String),
    #[error("session payload truncated")]
    Truncated,
    #[error("server address is not valid UTF-8")]
    Address,
    #[error("auth key must be {AUTH_KEY_LEN} bytes, got {0}")]
    AuthKey(usize),
}

/// Connection state reconstructed from a session blob
#[derive(Clone, PartialEq, Eq)]
pub struct StringSession {
    dc: Option<DcSession>,
}

#[derive(Clone, PartialEq, Eq)]
struct DcSession {
    dc_id: u8,
    server_address: String,
    port: u16,
    auth_key: Vec<u8>,
}

impl StringSession {
    /// A session with no datacenter or key yet
    pub fn empty() -> Self {
        Self { dc: None }
    }

    pub fn new(dc_id: u8, server_address: impl Into<String>, port: u16, auth_key: Vec<u8>) -> Result<Self, SessionError> {
        if auth_key.len() != AUTH_KEY_LEN {
            return Err(SessionError::AuthKey(auth_key.len()));
        }
        Ok(Self {
            dc: Some(DcSession {
                dc_id,
                server_address: server_address.into(),
                port,
                auth_key,
            }),
        })
    }

    /// Parse a session blob
    pub fn parse(blob: &str) -> Result<Self, SessionError> {
        let mut chars = blob.chars();
        let version = match chars.next() {
            None => return Ok(Self::empty()),
            Some(v) => v,
        };
        if version != CURRENT_VERSION {
            return Err(SessionError::Version(version));
        }

        let payload = STANDARD
            .decode(chars.as_str())
            .map_err(|e| SessionError::Encoding(e.to_string()))?;
        let mut reader = Reader::new(&payload);

        let dc_id = reader.u8()?;
        let server_address = if payload.len() == LEGACY_IPV4_LEN {
            let octets = reader.take(4)?;
            Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]).to_string()
        } else {
            let len = reader.u16()? as usize;
            let raw = reader.take(len)?;
            String::from_utf8(raw.to_vec()).map_err(|_| SessionError::Address)?
        };
        let port = reader.u16()?;
        let auth_key = reader.rest().to_vec();

        Self::new(dc_id, server_address, port, auth_key)
    }

    /// Serialize back to the string form (always the length-prefixed layout)
    pub fn encode(&self) -> String {
        let Some(dc) = &self.dc else {
            return String::new();
        };
        let address = dc.server_address.as_bytes();
        let mut payload = Vec::with_capacity(1 + 2 + address.len() + 2 + AUTH_KEY_LEN);
        payload.push(dc.dc_id);
        payload.extend_from_slice(&(address.len() as u16).to_be_bytes());
        payload.extend_from_slice(address);
        payload.extend_from_slice(&dc.port.to_be_bytes());
        payload.extend_from_slice(&dc.auth_key);
        format!("{}{}", CURRENT_VERSION, STANDARD.encode(payload))
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.dc.is_none()
    }

    pub fn dc_id(&self) -> Option<u8> {
        self.dc.as_ref().map(|dc| dc.dc_id)
    }

    #[cfg(test)]
    pub fn server_address(&self) -> Option<&str> {
        self.dc.as_ref().map(|dc| dc.server_address.as_str())
    }

    #[cfg(test)]
    pub fn port(&self) -> Option<u16> {
        self.dc.as_ref().map(|dc| dc.port)
    }

    #[cfg(test)]
    pub fn auth_key(&self) -> Option<&[u8]> {
        self.dc.as_ref().map(|dc| dc.auth_key.as_slice())
    }
}

// Never print the auth key
impl fmt::Debug for StringSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.dc {
            None => f.write_str("StringSession(empty)"),
            Some(dc) => f
                .debug_struct("StringSession")
                .field("dc_id", &dc.dc_id)
                .field("server_address", &dc.server_address)
                .field("port", &dc.port)
                .finish_non_exhaustive(),
        }
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], SessionError> {
        let end = self.pos.checked_add(n).ok_or(SessionError::Truncated)?;
        let slice = self.buf.get(self.pos..end).ok_or(SessionError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, SessionError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, SessionError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        rest
    }
}
