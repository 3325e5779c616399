//! Peer-to-peer media negotiation
//!
//! - [`transport`]: the media transport seam and the inbound stream handle
//! - [`negotiation`]: offer/answer state machine over one transport
//! - [`peer`]: webrtc-rs implementation (receive-only video)

pub mod negotiation;
pub mod peer;
pub mod transport;

pub use negotiation::{EngineCallback, EngineEvent, NegotiationEngine, NegotiationState};
pub use peer::{PeerTransport, PeerTransportFactory};
pub use transport::{
    MediaStream, MediaTransport, TransportCallback, TransportEvent, TransportFactory,
};
