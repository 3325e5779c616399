//! WebRTC peer connection (webrtc-rs)

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit};
use webrtc::track::track_remote::TrackRemote;

use super::transport::{
    MediaStream, MediaTransport, TransportCallback, TransportEvent, TransportFactory,
};
use crate::config::WebRtcConfig;
use crate::error::{AppError, Result};
use crate::signaling::{IceCandidate, SdpRole, SessionDescription};

/// Builds receive-only video peer connections
pub struct PeerTransportFactory {
    config: WebRtcConfig,
}

impl PeerTransportFactory {
    pub fn new(config: WebRtcConfig) -> Self {
        Self { config }
    }

    fn ice_servers(&self) -> Vec<RTCIceServer> {
        self.config
            .stun_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .collect()
    }
}

#[async_trait]
impl TransportFactory for PeerTransportFactory {
    async fn create(&self, on_event: TransportCallback) -> Result<Arc<dyn MediaTransport>> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| AppError::Negotiation(format!("Failed to register codecs: {}", e)))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| AppError::Negotiation(format!("Failed to register interceptors: {}", e)))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: self.ice_servers(),
            ..Default::default()
        };

        let pc = api.new_peer_connection(rtc_config).await.map_err(|e| {
            AppError::Negotiation(format!("Failed to create peer connection: {}", e))
        })?;
        let pc = Arc::new(pc);

        // Video only, nothing sent from this side
        pc.add_transceiver_from_kind(
            RTPCodecType::Video,
            Some(RTCRtpTransceiverInit {
                direction: RTCRtpTransceiverDirection::Recvonly,
                send_encodings: vec![],
            }),
        )
        .await
        .map_err(|e| AppError::Negotiation(format!("Failed to add video transceiver: {}", e)))?;

        let transport = PeerTransport {
            pc,
            closed: Arc::new(AtomicBool::new(false)),
        };
        transport.setup_event_handlers(on_event);

        info!("Peer connection created (recvonly video)");
        Ok(Arc::new(transport))
    }
}

/// webrtc-rs backed media transport
pub struct PeerTransport {
    pc: Arc<RTCPeerConnection>,
    closed: Arc<AtomicBool>,
}

impl PeerTransport {
    fn setup_event_handlers(&self, on_event: TransportCallback) {
        let closed = self.closed.clone();

        let events = on_event.clone();
        let gate = closed.clone();
        self.pc
            .on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                let events = events.clone();
                let gate = gate.clone();
                Box::pin(async move {
                    let Some(c) = candidate else { return };
                    if gate.load(Ordering::Acquire) {
                        return;
                    }
                    match c.to_json() {
                        Ok(init) => {
                            debug!("Local ICE candidate: {}", init.candidate);
                            let mut local = IceCandidate::new(init.candidate);
                            local.sdp_mid = init.sdp_mid.or(local.sdp_mid);
                            local.sdp_mline_index = init.sdp_mline_index.or(local.sdp_mline_index);
                            events(TransportEvent::LocalCandidate(local));
                        }
                        Err(e) => warn!("Failed to serialize local candidate: {}", e),
                    }
                })
            }));

        let events = on_event.clone();
        let gate = closed.clone();
        self.pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                if !gate.load(Ordering::Acquire) {
                    let stream = MediaStream::from_remote(track);
                    info!(
                        "Remote track received: stream={} track={} codec={}",
                        stream.stream_id, stream.track_id, stream.mime_type
                    );
                    events(TransportEvent::TrackReceived(stream));
                }
                Box::pin(async {})
            },
        ));

        self.pc
            .on_ice_gathering_state_change(Box::new(move |state: RTCIceGathererState| {
                debug!("ICE gathering state: {}", state);
                Box::pin(async {})
            }));

        let events = on_event;
        let gate = closed;
        self.pc
            .on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
                let events = events.clone();
                let gate = gate.clone();
                Box::pin(async move {
                    info!("Peer connection state: {}", s);
                    if s == RTCPeerConnectionState::Failed && !gate.load(Ordering::Acquire) {
                        events(TransportEvent::Failed("peer connection failed".to_string()));
                    }
                })
            }));
    }
}

#[async_trait]
impl MediaTransport for PeerTransport {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| AppError::Negotiation(format!("Failed to create offer: {}", e)))?;

        // Subscribe before gathering starts so completion cannot be missed
        let mut gathering_complete = self.pc.gathering_complete_promise().await;

        self.pc
            .set_local_description(offer)
            .await
            .map_err(|e| AppError::Negotiation(format!("Failed to set local description: {}", e)))?;

        debug!("Waiting for ICE gathering to complete");
        let _ = gathering_complete.recv().await;

        let local = self
            .pc
            .local_description()
            .await
            .ok_or_else(|| {
                AppError::Negotiation("No local description after gathering".to_string())
            })?;

        debug!(
            "Local offer ready with {} candidates",
            local.sdp.matches("a=candidate:").count()
        );
        Ok(SessionDescription::offer(local.sdp))
    }

    async fn set_remote_answer(&self, answer: SessionDescription) -> Result<()> {
        if answer.role != SdpRole::Answer {
            return Err(AppError::Negotiation(format!(
                "expected an answer, got {}",
                answer.role
            )));
        }

        let sdp = RTCSessionDescription::answer(answer.sdp)
            .map_err(|e| AppError::MalformedMessage(format!("Invalid SDP answer: {}", e)))?;

        self.pc.set_remote_description(sdp).await.map_err(|e| {
            AppError::Negotiation(format!("Failed to set remote description: {}", e))
        })
    }

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: None,
        };

        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| AppError::MalformedMessage(format!("Failed to add ICE candidate: {}", e)))
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        for sender in self.pc.get_senders().await {
            if let Err(e) = sender.stop().await {
                debug!("Failed to stop sender: {}", e);
            }
        }

        self.pc
            .close()
            .await
            .map_err(|e| AppError::Negotiation(format!("Failed to close peer connection: {}", e)))?;

        info!("Peer connection closed");
        Ok(())
    }
}
