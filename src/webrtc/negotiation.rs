//! Offer/answer negotiation over one media transport
//!
//! ```text
//! Idle ──start()──> Offering ──gathering complete──> AwaitingAnswer ──track──> Negotiated
//!   ^                                                                              │
//!   └──────────────────────────────── stop() (from any state) ─────────────────────┘
//!                     any state ──transport failure──> Failed
//! ```
//!
//! The local offer is announced only once ICE gathering has completed, so
//! the peer receives one complete description; candidates discovered along
//! the way are surfaced as hints but never buffered or replayed.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::transport::{
    MediaStream, MediaTransport, TransportCallback, TransportEvent, TransportFactory,
};
use crate::error::{AppError, Result};
use crate::signaling::{IceCandidate, SdpRole, SessionDescription};

/// Negotiation state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Idle,
    Offering,
    AwaitingAnswer,
    Negotiated,
    Failed,
}

impl std::fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NegotiationState::Idle => write!(f, "idle"),
            NegotiationState::Offering => write!(f, "offering"),
            NegotiationState::AwaitingAnswer => write!(f, "awaiting-answer"),
            NegotiationState::Negotiated => write!(f, "negotiated"),
            NegotiationState::Failed => write!(f, "failed"),
        }
    }
}

/// Notifications from the engine to its owner
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Local offer is complete; hand it to [`NegotiationEngine::offer_completed`]
    OfferReady(SessionDescription),
    OfferFailed(String),
    LocalCandidate(IceCandidate),
    TrackReceived(MediaStream),
    TransportFailed(String),
}

pub type EngineCallback = Arc<dyn Fn(EngineEvent) + Send + Sync>;

/// Owns at most one media transport and tracks its negotiation
pub struct NegotiationEngine {
    factory: Arc<dyn TransportFactory>,
    state: NegotiationState,
    transport: Option<Arc<dyn MediaTransport>>,
    offer_task: Option<JoinHandle<()>>,
}

impl NegotiationEngine {
    pub fn new(factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            factory,
            state: NegotiationState::Idle,
            transport: None,
            offer_task: None,
        }
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    /// Create the transport and begin building the local offer
    ///
    /// The offer is delivered later as [`EngineEvent::OfferReady`].
    pub async fn start(&mut self, on_event: EngineCallback) -> Result<()> {
        if self.state != NegotiationState::Idle || self.transport.is_some() {
            return Err(AppError::Negotiation(format!(
                "cannot start negotiation while {}",
                self.state
            )));
        }
        self.state = NegotiationState::Offering;

        let events = on_event.clone();
        let on_transport: TransportCallback = Arc::new(move |event| {
            events(match event {
                TransportEvent::LocalCandidate(c) => EngineEvent::LocalCandidate(c),
                TransportEvent::TrackReceived(s) => EngineEvent::TrackReceived(s),
                TransportEvent::Failed(reason) => EngineEvent::TransportFailed(reason),
            })
        });

        let transport = match self.factory.create(on_transport).await {
            Ok(t) => t,
            Err(e) => {
                self.state = NegotiationState::Failed;
                return Err(e);
            }
        };
        self.transport = Some(transport.clone());

        self.offer_task = Some(tokio::spawn(async move {
            match transport.create_offer().await {
                Ok(offer) => on_event(EngineEvent::OfferReady(offer)),
                Err(e) => on_event(EngineEvent::OfferFailed(e.to_string())),
            }
        }));

        debug!("Negotiation started, gathering local candidates");
        Ok(())
    }

    /// Accept the completed local offer
    ///
    /// Returns the description to announce, or `None` when no offer is
    /// outstanding (the engine was stopped or failed meanwhile).
    pub fn offer_completed(&mut self, offer: SessionDescription) -> Option<SessionDescription> {
        if self.state != NegotiationState::Offering || offer.role != SdpRole::Offer {
            debug!("Discarding local offer while {}", self.state);
            return None;
        }
        self.offer_task = None;
        self.state = NegotiationState::AwaitingAnswer;
        info!("Local offer complete, awaiting answer");
        Some(offer)
    }

    pub fn offer_failed(&mut self, reason: &str) {
        if self.state == NegotiationState::Offering {
            warn!("Local offer failed: {}", reason);
            self.offer_task = None;
            self.state = NegotiationState::Failed;
        }
    }

    /// Apply the remote answer
    ///
    /// Before the local offer is out (idle/offering) this is a no-op and
    /// returns `Ok(false)`: answers may arrive out of order.
    pub async fn on_remote_answer(&mut self, answer: SessionDescription) -> Result<bool> {
        match self.state {
            NegotiationState::Idle | NegotiationState::Offering | NegotiationState::Failed => {
                debug!("Ignoring remote answer while {}", self.state);
                Ok(false)
            }
            NegotiationState::AwaitingAnswer | NegotiationState::Negotiated => {
                let Some(transport) = self.transport.as_ref() else {
                    return Ok(false);
                };
                transport.set_remote_answer(answer).await?;
                info!("Remote answer applied");
                Ok(true)
            }
        }
    }

    /// Apply a remote candidate whenever a transport exists
    pub async fn on_remote_candidate(&mut self, candidate: IceCandidate) -> Result<bool> {
        let Some(transport) = self.transport.as_ref() else {
            debug!("Ignoring remote candidate: no transport");
            return Ok(false);
        };
        transport.add_remote_candidate(candidate).await?;
        Ok(true)
    }

    /// Remote media arrived. Returns false if the engine cannot accept it.
    pub fn track_received(&mut self) -> bool {
        if self.transport.is_none() || self.state == NegotiationState::Failed {
            return false;
        }
        self.state = NegotiationState::Negotiated;
        true
    }

    pub fn transport_failed(&mut self) {
        if self.transport.is_some() {
            self.state = NegotiationState::Failed;
        }
    }

    /// Release the transport. Safe from any state, idempotent.
    pub async fn stop(&mut self) {
        if let Some(task) = self.offer_task.take() {
            task.abort();
        }
        if let Some(transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                warn!("Failed to close media transport: {}", e);
            }
            debug!("Negotiation stopped");
        }
        self.state = NegotiationState::Idle;
    }
}

impl Drop for NegotiationEngine {
    fn drop(&mut self) {
        if let Some(task) = self.offer_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::sync::{mpsc, Notify};

    #[derive(Default)]
    struct Calls {
        answers: Vec<SessionDescription>,
        candidates: Vec<IceCandidate>,
        closes: usize,
    }

    struct ScriptedTransport {
        calls: Arc<Mutex<Calls>>,
        gathered: Arc<Notify>,
    }

    #[async_trait]
    impl MediaTransport for ScriptedTransport {
        async fn create_offer(&self) -> Result<SessionDescription> {
            self.gathered.notified().await;
            Ok(SessionDescription::offer("v=0\r\nm=video 9 UDP/TLS/RTP/SAVPF 96\r\na=recvonly\r\n"))
        }

        async fn set_remote_answer(&self, answer: SessionDescription) -> Result<()> {
            self.calls.lock().answers.push(answer);
            Ok(())
        }

        async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<()> {
            self.calls.lock().candidates.push(candidate);
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            self.calls.lock().closes += 1;
            Ok(())
        }
    }

    struct ScriptedFactory {
        calls: Arc<Mutex<Calls>>,
        gathered: Arc<Notify>,
        created: Mutex<usize>,
        callback: Mutex<Option<TransportCallback>>,
    }

    #[async_trait]
    impl TransportFactory for ScriptedFactory {
        async fn create(&self, on_event: TransportCallback) -> Result<Arc<dyn MediaTransport>> {
            *self.created.lock() += 1;
            *self.callback.lock() = Some(on_event);
            Ok(Arc::new(ScriptedTransport {
                calls: self.calls.clone(),
                gathered: self.gathered.clone(),
            }))
        }
    }

    fn setup() -> (
        NegotiationEngine,
        Arc<ScriptedFactory>,
        mpsc::UnboundedReceiver<EngineEvent>,
        EngineCallback,
    ) {
        let factory = Arc::new(ScriptedFactory {
            calls: Arc::new(Mutex::new(Calls::default())),
            gathered: Arc::new(Notify::new()),
            created: Mutex::new(0),
            callback: Mutex::new(None),
        });
        let (tx, rx) = mpsc::unbounded_channel();
        let callback: EngineCallback = Arc::new(move |event| {
            let _ = tx.send(event);
        });
        (NegotiationEngine::new(factory.clone()), factory, rx, callback)
    }

    #[tokio::test]
    async fn test_offer_announced_after_gathering() {
        let (mut engine, factory, mut rx, callback) = setup();
        engine.start(callback).await.unwrap();
        assert_eq!(engine.state(), NegotiationState::Offering);

        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());

        factory.gathered.notify_one();
        let offer = match rx.recv().await.unwrap() {
            EngineEvent::OfferReady(offer) => offer,
            other => panic!("unexpected {:?}", other),
        };
        let announced = engine.offer_completed(offer).unwrap();
        assert_eq!(announced.role, SdpRole::Offer);
        assert_eq!(engine.state(), NegotiationState::AwaitingAnswer);
    }

    #[tokio::test]
    async fn test_answer_before_offer_is_noop() {
        let (mut engine, factory, _rx, callback) = setup();

        assert!(!engine.on_remote_answer(SessionDescription::answer("v=0")).await.unwrap());
        assert_eq!(engine.state(), NegotiationState::Idle);

        engine.start(callback).await.unwrap();
        assert!(!engine.on_remote_answer(SessionDescription::answer("v=0")).await.unwrap());
        assert_eq!(engine.state(), NegotiationState::Offering);
        assert!(factory.calls.lock().answers.is_empty());
    }

    #[tokio::test]
    async fn test_full_negotiation() {
        let (mut engine, factory, _rx, callback) = setup();
        engine.start(callback).await.unwrap();
        engine.offer_completed(SessionDescription::offer("v=0")).unwrap();

        // Candidates may precede the answer
        let candidate = IceCandidate::new("candidate:1 1 udp 2122260223 10.0.0.2 5000 typ host");
        assert!(engine.on_remote_candidate(candidate.clone()).await.unwrap());
        assert!(engine.on_remote_answer(SessionDescription::answer("v=0")).await.unwrap());
        assert!(engine.track_received());
        assert_eq!(engine.state(), NegotiationState::Negotiated);

        let calls = factory.calls.lock();
        assert_eq!(calls.answers.len(), 1);
        assert_eq!(calls.candidates, vec![candidate]);
    }

    #[tokio::test]
    async fn test_remote_candidate_without_transport() {
        let (mut engine, _factory, _rx, _callback) = setup();
        let candidate = IceCandidate::new("candidate:1 1 udp 2122260223 10.0.0.2 5000 typ host");
        assert!(!engine.on_remote_candidate(candidate).await.unwrap());
    }

    #[tokio::test]
    async fn test_local_events_are_forwarded() {
        let (mut engine, factory, mut rx, callback) = setup();
        engine.start(callback).await.unwrap();

        let transport_cb = factory.callback.lock().clone().unwrap();
        transport_cb(TransportEvent::LocalCandidate(IceCandidate::new("candidate:x")));
        transport_cb(TransportEvent::Failed("ice".to_string()));

        assert!(matches!(rx.recv().await, Some(EngineEvent::LocalCandidate(_))));
        assert!(matches!(rx.recv().await, Some(EngineEvent::TransportFailed(_))));

        engine.transport_failed();
        assert_eq!(engine.state(), NegotiationState::Failed);
        assert!(!engine.track_received());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_allows_restart() {
        let (mut engine, factory, _rx, callback) = setup();
        engine.stop().await;
        assert_eq!(engine.state(), NegotiationState::Idle);

        engine.start(callback.clone()).await.unwrap();
        assert!(engine.start(callback.clone()).await.is_err());
        assert_eq!(*factory.created.lock(), 1);

        engine.stop().await;
        engine.stop().await;
        assert_eq!(factory.calls.lock().closes, 1);
        assert_eq!(engine.state(), NegotiationState::Idle);

        // A late offer from the aborted attempt is discarded
        assert!(engine.offer_completed(SessionDescription::offer("v=0")).is_none());

        engine.start(callback).await.unwrap();
        assert_eq!(*factory.created.lock(), 2);
    }
}
