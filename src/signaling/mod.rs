//! Signaling channel
//!
//! One bidirectional message connection to the streaming endpoint, used to
//! exchange the offer, the answer and ICE candidates. Connection failures are
//! reported through the event callback, never as returned errors: a channel
//! is opened, then tells its owner what happened to it.
//!
//! ```text
//!  SessionController ──open(url)──> SignalingChannel ──> SignalingLink (WebSocket)
//!          ^                                                   │
//!          └──────── ChannelEvent (Opened/Message/Error/Closed)┘
//! ```

pub mod message;
pub mod websocket;

pub use message::{IceCandidate, SdpRole, SessionDescription, SignalingMessage};
pub use websocket::WebSocketConnector;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::utils::LogThrottler;
use crate::warn_throttled;

/// Ready state of a signaling connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closed,
}

impl std::fmt::Display for ReadyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadyState::Connecting => write!(f, "connecting"),
            ReadyState::Open => write!(f, "open"),
            ReadyState::Closed => write!(f, "closed"),
        }
    }
}

/// Lifecycle notification from a signaling connection
///
/// `Opened`, `Error` and `Closed` fire at most once per connection;
/// `Message` repeats, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Opened,
    Message(SignalingMessage),
    Error(String),
    Closed,
}

/// Event sink handed to a connector
pub type ChannelCallback = Arc<dyn Fn(ChannelEvent) + Send + Sync>;

/// Transport-level connection produced by a [`SignalingConnector`]
pub trait SignalingLink: Send {
    fn ready_state(&self) -> ReadyState;

    /// Queue one text frame. Only called while the link reports `Open`.
    fn send_text(&self, text: String) -> Result<()>;

    /// Release the connection. Must be idempotent.
    fn close(&mut self);
}

/// Opens signaling connections
pub trait SignalingConnector: Send + Sync {
    /// Start connecting to `url`. Returns immediately; the outcome arrives
    /// through `on_event`.
    fn connect(&self, url: &str, on_event: ChannelCallback) -> Box<dyn SignalingLink>;
}

/// Owned handle to one signaling connection
///
/// Closing is idempotent, and once [`close`](Self::close) returns no further
/// events from this connection reach the owner's callback. Dropping the
/// channel closes it.
pub struct SignalingChannel {
    link: Box<dyn SignalingLink>,
    live: Arc<AtomicBool>,
}

impl SignalingChannel {
    /// Open a channel through `connector`
    pub fn open(connector: &dyn SignalingConnector, url: &str, on_event: ChannelCallback) -> Self {
        let live = Arc::new(AtomicBool::new(true));
        let gate = live.clone();
        let gated: ChannelCallback = Arc::new(move |event| {
            if gate.load(Ordering::Acquire) {
                on_event(event);
            }
        });

        Self {
            link: connector.connect(url, gated),
            live,
        }
    }

    pub fn ready_state(&self) -> ReadyState {
        if !self.live.load(Ordering::Acquire) {
            return ReadyState::Closed;
        }
        self.link.ready_state()
    }

    pub fn is_open(&self) -> bool {
        self.ready_state() == ReadyState::Open
    }

    /// Send a message. Nothing is written and `ChannelNotReady` is returned
    /// unless the channel is open; messages are never queued.
    pub fn send(&self, message: &SignalingMessage) -> Result<()> {
        if !self.is_open() {
            return Err(AppError::ChannelNotReady);
        }
        let text = message.to_json()?;
        debug!("Signaling send: {} ({} bytes)", message.kind(), text.len());
        self.link.send_text(text)
    }

    /// Close the channel. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.live.swap(false, Ordering::AcqRel) {
            self.link.close();
        }
    }
}

impl Drop for SignalingChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Decode one inbound text frame
///
/// Malformed frames are logged (throttled) and dropped: a bad transport hint
/// is not worth tearing the session down for.
pub fn decode_frame(text: &str, throttler: &LogThrottler) -> Option<SignalingMessage> {
    match SignalingMessage::from_json(text) {
        Ok(message) => Some(message),
        Err(e) => {
            warn_throttled!(throttler, "signaling.malformed", "Dropping inbound frame: {}", e);
            None
        }
    }
}
