use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use super::handle::SessionHandle;
use super::policy::{ReconnectPolicy, RetryBudget};
use super::state::ConnectionState;
use crate::auth::{HttpTokenProvider, Token, TokenProvider};
use crate::config::ViewerConfig;
use crate::error::{AppError, Result};
use crate::events::{EventBus, ViewerEvent};
use crate::signaling::{
    ChannelCallback, ChannelEvent, IceCandidate, SessionDescription, SignalingChannel,
    SignalingConnector, SignalingMessage, WebSocketConnector,
};
use crate::utils::LogThrottler;
use crate::warn_throttled;
use crate::webrtc::{
    EngineCallback, EngineEvent, MediaStream, NegotiationEngine, PeerTransportFactory,
    TransportFactory,
};

/// Work item for the controller task
///
/// Every item carries the generation of the attempt that produced it.
#[derive(Debug)]
pub(super) enum ControlEvent {
    TokenReady { generation: u64, result: Result<Token> },
    Channel { generation: u64, event: ChannelEvent },
    Engine { generation: u64, event: EngineEvent },
    ReconnectDue { generation: u64 },
}

impl ControlEvent {
    fn generation(&self) -> u64 {
        match self {
            ControlEvent::TokenReady { generation, .. }
            | ControlEvent::Channel { generation, .. }
            | ControlEvent::Engine { generation, .. }
            | ControlEvent::ReconnectDue { generation } => *generation,
        }
    }
}

/// Drives one viewing session
///
/// Owns at most one signaling channel and one negotiation engine at a time.
/// Construct with [`SessionController::new`] (production components) or
/// [`SessionController::with_components`], then [`spawn`](Self::spawn) it.
pub struct SessionController {
    config: Arc<ViewerConfig>,
    tokens: Arc<dyn TokenProvider>,
    connector: Arc<dyn SignalingConnector>,
    transports: Arc<dyn TransportFactory>,

    pub(super) generation: u64,
    retries: RetryBudget,
    channels_opened: u64,
    pub(super) channel: Option<SignalingChannel>,
    pub(super) engine: Option<NegotiationEngine>,
    /// Token fetch or reconnect timer belonging to the current generation
    pending: Option<JoinHandle<()>>,

    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    media_tx: watch::Sender<Option<MediaStream>>,
    events: EventBus,
    throttler: LogThrottler,

    queue_tx: mpsc::UnboundedSender<ControlEvent>,
    pub(super) queue_rx: Option<mpsc::UnboundedReceiver<ControlEvent>>,
}

impl SessionController {
    /// Controller wired to the HTTP token endpoint, a WebSocket signaling
    /// channel and a webrtc-rs peer connection
    pub fn new(config: ViewerConfig) -> Result<Self> {
        let tokens = HttpTokenProvider::new(&config.signaling, config.credential.clone())?;
        let transports = PeerTransportFactory::new(config.webrtc.clone());
        Ok(Self::with_components(
            config,
            Arc::new(tokens),
            Arc::new(WebSocketConnector::new()),
            Arc::new(transports),
        ))
    }

    pub fn with_components(
        config: ViewerConfig,
        tokens: Arc<dyn TokenProvider>,
        connector: Arc<dyn SignalingConnector>,
        transports: Arc<dyn TransportFactory>,
    ) -> Self {
        let retries = RetryBudget::new(ReconnectPolicy::from(&config.reconnect));
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        let (media_tx, _) = watch::channel(None);
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();

        Self {
            config: Arc::new(config),
            tokens,
            connector,
            transports,
            generation: 0,
            retries,
            channels_opened: 0,
            channel: None,
            engine: None,
            pending: None,
            state: ConnectionState::Connecting,
            state_tx,
            media_tx,
            events: EventBus::new(),
            throttler: LogThrottler::default(),
            queue_tx,
            queue_rx: Some(queue_rx),
        }
    }

    /// Event bus the session publishes to
    ///
    /// Subscribe here before [`spawn`](Self::spawn) to observe the very
    /// first transitions.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Start connecting and return the observer handle
    pub fn spawn(mut self) -> SessionHandle {
        let cancel = CancellationToken::new();
        let state_rx = self.state_tx.subscribe();
        let media_rx = self.media_tx.subscribe();
        let events = self.events.clone();

        let span = tracing::info_span!(
            "session",
            id = %uuid::Uuid::new_v4(),
            stream = %self.config.signaling.stream_name,
        );
        let task = match self.queue_rx.take() {
            Some(queue) => tokio::spawn(self.run(queue, cancel.clone()).instrument(span)),
            None => tokio::spawn(async {}),
        };

        SessionHandle::new(state_rx, media_rx, events, cancel, task)
    }

    async fn run(
        mut self,
        mut queue: mpsc::UnboundedReceiver<ControlEvent>,
        cancel: CancellationToken,
    ) {
        info!(
            "Starting session for {} (max {} reconnects, {:?} apart)",
            self.config.signaling.host,
            self.retries.policy().max_attempts,
            self.retries.policy().delay
        );
        self.connect().await;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(event) = queue.recv() => self.handle(event).await,
            }
        }

        self.teardown().await;
        info!("Session stopped");
    }

    pub(super) async fn handle(&mut self, event: ControlEvent) {
        if event.generation() != self.generation {
            debug!(
                "Discarding event from generation {} (current {})",
                event.generation(),
                self.generation
            );
            return;
        }

        match event {
            ControlEvent::TokenReady { result, .. } => self.on_token(result),
            ControlEvent::Channel { event, .. } => self.on_channel_event(event).await,
            ControlEvent::Engine { event, .. } => self.on_engine_event(event).await,
            ControlEvent::ReconnectDue { .. } => self.connect().await,
        }
    }

    /// Begin a fresh attempt: release the previous one, then request a token
    pub(super) async fn connect(&mut self) {
        self.teardown().await;
        self.reset_state();

        let generation = self.generation;
        let tokens = self.tokens.clone();
        let queue = self.queue_tx.clone();
        debug!("Requesting session token");
        self.pending = Some(tokio::spawn(async move {
            let result = tokens.fetch_token().await;
            let _ = queue.send(ControlEvent::TokenReady { generation, result });
        }));
    }

    /// Release the current attempt's channel, transport and timers
    ///
    /// Safe to call at any time and repeatedly.
    pub(super) async fn teardown(&mut self) {
        self.generation += 1;
        if let Some(task) = self.pending.take() {
            task.abort();
        }
        if let Some(mut channel) = self.channel.take() {
            debug!("Closing signaling channel");
            channel.close();
        }
        if let Some(mut engine) = self.engine.take() {
            engine.stop().await;
        }
        self.media_tx.send_if_modified(|media| media.take().is_some());
    }

    fn on_token(&mut self, result: Result<Token>) {
        self.pending = None;
        let token = match result {
            Ok(token) => token,
            Err(e) => {
                error!("Token exchange failed: {}", e);
                self.events.publish(ViewerEvent::AuthFailed {
                    reason: e.to_string(),
                });
                self.set_state(ConnectionState::Error);
                return;
            }
        };

        let url = self.config.signaling.channel_url(token.as_str());
        info!(
            "Opening signaling channel to {} (stream {})",
            self.config.signaling.host, self.config.signaling.stream_name
        );
        let callback = self.channel_callback();
        let channel = SignalingChannel::open(self.connector.as_ref(), &url, callback);
        self.channel = Some(channel);
    }

    async fn on_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Opened => self.on_channel_opened().await,
            ChannelEvent::Message(message) => self.on_message(message).await,
            ChannelEvent::Error(reason) => {
                warn!("Signaling channel error: {}", reason);
                self.set_state(ConnectionState::Error);
            }
            ChannelEvent::Closed => self.on_channel_closed().await,
        }
    }

    async fn on_channel_opened(&mut self) {
        self.channels_opened += 1;
        self.retries.reset();
        info!("Signaling channel open");
        self.events.publish(ViewerEvent::ChannelOpened {
            attempt: self.channels_opened,
        });
        self.set_state(ConnectionState::Connected);

        if let Some(mut stale) = self.engine.take() {
            stale.stop().await;
        }
        let mut engine = NegotiationEngine::new(self.transports.clone());
        if let Err(e) = engine.start(self.engine_callback()).await {
            error!("Failed to start negotiation: {}", e);
            self.set_state(ConnectionState::Error);
        }
        self.engine = Some(engine);
    }

    async fn on_channel_closed(&mut self) {
        info!("Signaling channel closed");
        self.events.publish(ViewerEvent::ChannelClosed {
            attempt: self.channels_opened,
        });
        self.teardown().await;

        let policy = self.retries.policy();
        match self.retries.next_attempt() {
            Some(attempt) => {
                info!(
                    "Reconnecting in {:?} (attempt {}/{})",
                    policy.delay, attempt, policy.max_attempts
                );
                self.events.publish(ViewerEvent::ReconnectScheduled {
                    attempt,
                    delay_ms: policy.delay.as_millis() as u64,
                });

                let generation = self.generation;
                let queue = self.queue_tx.clone();
                self.pending = Some(tokio::spawn(async move {
                    tokio::time::sleep(policy.delay).await;
                    let _ = queue.send(ControlEvent::ReconnectDue { generation });
                }));
            }
            None => {
                warn!(
                    "Giving up after {} reconnect attempts",
                    self.retries.attempts()
                );
                self.events.publish(ViewerEvent::RetriesExhausted {
                    attempts: self.retries.attempts(),
                });
                self.set_state(ConnectionState::Error);
            }
        }
    }

    async fn on_message(&mut self, message: SignalingMessage) {
        debug!("Signaling recv: {}", message.kind());
        match &message {
            SignalingMessage::Answer(_) => {
                let answer = match SessionDescription::try_from(&message) {
                    Ok(answer) => answer,
                    Err(e) => {
                        warn_throttled!(
                            self.throttler,
                            "session.remote_answer",
                            "Dropping remote answer: {}",
                            e
                        );
                        return;
                    }
                };
                let Some(engine) = self.engine.as_mut() else {
                    debug!("Ignoring remote answer: negotiation not started");
                    return;
                };
                match engine.on_remote_answer(answer).await {
                    Ok(_) => {}
                    // Unparsable SDP leaves the attempt untouched
                    Err(AppError::MalformedMessage(reason)) => {
                        warn_throttled!(
                            self.throttler,
                            "session.remote_answer",
                            "Dropping remote answer: {}",
                            reason
                        );
                    }
                    Err(e) => {
                        error!("Failed to apply remote answer: {}", e);
                        engine.transport_failed();
                        self.set_state(ConnectionState::Error);
                    }
                }
            }
            SignalingMessage::Candidate(value) => {
                let candidate = match IceCandidate::parse_remote(value) {
                    Ok(Some(candidate)) => candidate,
                    Ok(None) => {
                        debug!("Remote end of candidates");
                        return;
                    }
                    Err(e) => {
                        warn_throttled!(
                            self.throttler,
                            "session.remote_candidate",
                            "Dropping remote candidate: {}",
                            e
                        );
                        return;
                    }
                };
                let Some(engine) = self.engine.as_mut() else {
                    debug!("Ignoring remote candidate: negotiation not started");
                    return;
                };
                if let Err(e) = engine.on_remote_candidate(candidate).await {
                    warn_throttled!(
                        self.throttler,
                        "session.remote_candidate",
                        "Remote candidate rejected: {}",
                        e
                    );
                }
            }
            SignalingMessage::Offer(_) => {
                debug!("Ignoring inbound offer: this client always offers");
            }
        }
    }

    async fn on_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::OfferReady(offer) => {
                let announced = self.engine.as_mut().and_then(|e| e.offer_completed(offer));
                if let Some(offer) = announced {
                    self.send(SignalingMessage::offer(&offer));
                }
            }
            EngineEvent::OfferFailed(reason) => {
                if let Some(engine) = self.engine.as_mut() {
                    engine.offer_failed(&reason);
                }
                self.set_state(ConnectionState::Error);
            }
            EngineEvent::LocalCandidate(candidate) => {
                self.send(SignalingMessage::candidate(&candidate));
            }
            EngineEvent::TrackReceived(stream) => {
                let accepted = self.engine.as_mut().map_or(false, |e| e.track_received());
                if !accepted {
                    debug!("Ignoring track {}: negotiation not active", stream.track_id);
                    return;
                }
                info!(
                    "Receiving {} (stream {}, track {})",
                    stream.mime_type, stream.stream_id, stream.track_id
                );
                self.events.publish(ViewerEvent::TrackReceived {
                    stream_id: stream.stream_id.clone(),
                    track_id: stream.track_id.clone(),
                    mime_type: stream.mime_type.clone(),
                });
                self.media_tx.send_replace(Some(stream));
                self.set_state(ConnectionState::Streaming);
            }
            EngineEvent::TransportFailed(reason) => {
                error!("Media transport failed: {}", reason);
                if let Some(engine) = self.engine.as_mut() {
                    engine.transport_failed();
                }
                self.set_state(ConnectionState::Error);
            }
        }
    }

    /// Send on the current channel if, and only if, it is open
    fn send(&self, message: SignalingMessage) {
        match self.channel.as_ref() {
            Some(channel) if channel.is_open() => {
                if let Err(e) = channel.send(&message) {
                    warn!("Failed to send {}: {}", message.kind(), e);
                }
            }
            _ => debug!("Signaling channel not open, dropping {}", message.kind()),
        }
    }

    /// Move forward within the current attempt
    fn set_state(&mut self, next: ConnectionState) {
        if self.state.can_advance_to(next) {
            self.apply_state(next);
        } else if self.state != next {
            debug!("Ignoring state change {} -> {}", self.state, next);
        }
    }

    /// A new attempt starts over from `Connecting`
    fn reset_state(&mut self) {
        if self.state != ConnectionState::Connecting {
            self.apply_state(ConnectionState::Connecting);
        }
    }

    fn apply_state(&mut self, next: ConnectionState) {
        let from = std::mem::replace(&mut self.state, next);
        info!("Session state: {} -> {}", from, next);
        self.state_tx.send_replace(next);
        self.events.publish(ViewerEvent::StateChanged { from, to: next });
    }

    fn channel_callback(&self) -> ChannelCallback {
        let queue = self.queue_tx.clone();
        let generation = self.generation;
        Arc::new(move |event| {
            let _ = queue.send(ControlEvent::Channel { generation, event });
        })
    }

    fn engine_callback(&self) -> EngineCallback {
        let queue = self.queue_tx.clone();
        let generation = self.generation;
        Arc::new(move |event| {
            let _ = queue.send(ControlEvent::Engine { generation, event });
        })
    }

    pub(super) fn current_state(&self) -> ConnectionState {
        self.state
    }
}
