use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::session::policy::{MAX_RECONNECT_ATTEMPTS, RECONNECT_DELAY};

/// Default STUN server used for reachability discovery
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// Default remote source to subscribe to
pub const DEFAULT_STREAM_NAME: &str = "akuvox";

/// Main viewer configuration
///
/// Supplied once at construction and immutable for the lifetime of a
/// [`SessionController`](crate::session::SessionController).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Client identity used for the token exchange
    pub credential: Credential,
    /// Signaling endpoint settings
    pub signaling: SignalingConfig,
    /// Media transport settings
    pub webrtc: WebRtcConfig,
    /// Automatic reconnection settings
    pub reconnect: ReconnectConfig,
}

/// Static client identity
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Credential {
    pub client_id: String,
    pub client_secret: String,
}

impl Credential {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Signaling endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    /// Endpoint host (with optional port), e.g. `media.example.com`
    pub host: String,
    /// Remote source to subscribe to
    pub stream_name: String,
    /// Use https/wss (false selects http/ws, for local servers)
    pub secure: bool,
    /// Timeout for the token exchange request (ms)
    pub auth_timeout_ms: u64,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            stream_name: DEFAULT_STREAM_NAME.to_string(),
            secure: true,
            auth_timeout_ms: 10_000,
        }
    }
}

impl SignalingConfig {
    fn http_scheme(&self) -> &'static str {
        if self.secure {
            "https"
        } else {
            "http"
        }
    }

    fn ws_scheme(&self) -> &'static str {
        if self.secure {
            "wss"
        } else {
            "ws"
        }
    }

    /// Token exchange endpoint: `https://{host}/auth`
    pub fn auth_url(&self) -> String {
        format!("{}://{}/auth", self.http_scheme(), self.host)
    }

    /// Signaling channel endpoint: `wss://{host}/api/ws?src={stream}&token={token}`
    pub fn channel_url(&self, token: &str) -> String {
        format!(
            "{}://{}/api/ws?src={}&token={}",
            self.ws_scheme(),
            self.host,
            urlencoding::encode(&self.stream_name),
            urlencoding::encode(token)
        )
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_millis(self.auth_timeout_ms)
    }
}

/// Media transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebRtcConfig {
    /// STUN server URLs
    pub stun_servers: Vec<String>,
}

impl Default for WebRtcConfig {
    fn default() -> Self {
        Self {
            stun_servers: vec![DEFAULT_STUN_SERVER.to_string()],
        }
    }
}

/// Reconnection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Retries allowed after the channel closes before giving up
    pub max_attempts: u32,
    /// Fixed delay between retries (ms)
    pub delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RECONNECT_ATTEMPTS,
            delay_ms: RECONNECT_DELAY.as_millis() as u64,
        }
    }
}
