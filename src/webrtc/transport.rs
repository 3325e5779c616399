//! Media transport abstraction
//!
//! The negotiation engine drives a [`MediaTransport`]; the production
//! implementation is [`PeerTransport`](super::peer::PeerTransport) on top of
//! webrtc-rs.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use webrtc::track::track_remote::TrackRemote;

use crate::error::Result;
use crate::signaling::{IceCandidate, SessionDescription};

/// Handle to the inbound media stream
#[derive(Clone)]
pub struct MediaStream {
    pub stream_id: String,
    pub track_id: String,
    pub mime_type: String,
    track: Option<Arc<TrackRemote>>,
}

impl MediaStream {
    /// Wrap a remote track delivered by the peer connection
    pub fn from_remote(track: Arc<TrackRemote>) -> Self {
        Self {
            stream_id: track.stream_id(),
            track_id: track.id(),
            mime_type: track.codec().capability.mime_type,
            track: Some(track),
        }
    }

    /// Stream descriptor without a backing track
    pub fn detached(
        stream_id: impl Into<String>,
        track_id: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            stream_id: stream_id.into(),
            track_id: track_id.into(),
            mime_type: mime_type.into(),
            track: None,
        }
    }

    /// Underlying RTP track, for reading packets
    pub fn track(&self) -> Option<&Arc<TrackRemote>> {
        self.track.as_ref()
    }
}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStream")
            .field("stream_id", &self.stream_id)
            .field("track_id", &self.track_id)
            .field("mime_type", &self.mime_type)
            .field("attached", &self.track.is_some())
            .finish()
    }
}

/// Spontaneous notifications from a transport
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A local candidate was discovered
    LocalCandidate(IceCandidate),
    /// Remote media started flowing
    TrackReceived(MediaStream),
    /// Unrecoverable failure reported by the transport itself
    Failed(String),
}

pub type TransportCallback = Arc<dyn Fn(TransportEvent) + Send + Sync>;

/// One peer-to-peer media transport, receive-only video
#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Create the local offer. Resolves once ICE gathering has completed,
    /// so the returned SDP is the complete description.
    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn set_remote_answer(&self, answer: SessionDescription) -> Result<()>;

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Stop local senders and close the transport. Idempotent.
    async fn close(&self) -> Result<()>;
}

/// Creates transports
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(&self, on_event: TransportCallback) -> Result<Arc<dyn MediaTransport>>;
}
