//! Viewer event types
//!
//! Defines the events a running session publishes to its observers.

use serde::{Deserialize, Serialize};

use crate::session::ConnectionState;

/// Viewer event enumeration
///
/// Serialized as:
/// ```json
/// {
///   "event": "session.state_changed",
///   "data": { "from": "connecting", "to": "connected" }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ViewerEvent {
    /// Coarse connection state changed
    #[serde(rename = "session.state_changed")]
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },

    /// Token exchange failed; no reconnection follows
    #[serde(rename = "session.auth_failed")]
    AuthFailed { reason: String },

    /// Signaling channel reached the open state
    #[serde(rename = "signaling.opened")]
    ChannelOpened { attempt: u64 },

    /// Signaling channel closed
    #[serde(rename = "signaling.closed")]
    ChannelClosed { attempt: u64 },

    /// A reconnect was scheduled after the channel closed
    #[serde(rename = "session.reconnect_scheduled")]
    ReconnectScheduled {
        /// 1-based retry number
        attempt: u32,
        delay_ms: u64,
    },

    /// Retry budget exhausted; the session stays in error
    #[serde(rename = "session.retries_exhausted")]
    RetriesExhausted { attempts: u32 },

    /// Remote media started flowing
    #[serde(rename = "media.track_received")]
    TrackReceived {
        stream_id: String,
        track_id: String,
        mime_type: String,
    },
}

impl ViewerEvent {
    /// Get the event name (for filtering/routing)
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::StateChanged { .. } => "session.state_changed",
            Self::AuthFailed { .. } => "session.auth_failed",
            Self::ChannelOpened { .. } => "signaling.opened",
            Self::ChannelClosed { .. } => "signaling.closed",
            Self::ReconnectScheduled { .. } => "session.reconnect_scheduled",
            Self::RetriesExhausted { .. } => "session.retries_exhausted",
            Self::TrackReceived { .. } => "media.track_received",
        }
    }
}
