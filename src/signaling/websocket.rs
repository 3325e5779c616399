//! WebSocket signaling connector

use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::{
    decode_frame, ChannelCallback, ChannelEvent, ReadyState, SignalingConnector, SignalingLink,
};
use crate::error::{AppError, Result};
use crate::utils::LogThrottler;

/// How long a close frame may take before the socket is simply dropped
const CLOSE_FRAME_TIMEOUT: Duration = Duration::from_secs(1);

const STATE_CONNECTING: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_CLOSED: u8 = 2;

fn decode_state(raw: u8) -> ReadyState {
    match raw {
        STATE_CONNECTING => ReadyState::Connecting,
        STATE_OPEN => ReadyState::Open,
        _ => ReadyState::Closed,
    }
}

enum Command {
    Send(String),
    Close,
}

/// Opens signaling channels over WebSocket (`ws://` or `wss://`)
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

impl SignalingConnector for WebSocketConnector {
    fn connect(&self, url: &str, on_event: ChannelCallback) -> Box<dyn SignalingLink> {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let state = Arc::new(AtomicU8::new(STATE_CONNECTING));

        tokio::spawn(run_connection(url.to_string(), on_event, cmd_rx, state.clone()));

        Box::new(WebSocketLink { cmd_tx, state })
    }
}

/// Handle to the connection task
struct WebSocketLink {
    cmd_tx: mpsc::UnboundedSender<Command>,
    state: Arc<AtomicU8>,
}

impl SignalingLink for WebSocketLink {
    fn ready_state(&self) -> ReadyState {
        decode_state(self.state.load(Ordering::Acquire))
    }

    fn send_text(&self, text: String) -> Result<()> {
        self.cmd_tx
            .send(Command::Send(text))
            .map_err(|_| AppError::Channel("connection task has ended".to_string()))
    }

    fn close(&mut self) {
        if self.state.swap(STATE_CLOSED, Ordering::AcqRel) != STATE_CLOSED {
            let _ = self.cmd_tx.send(Command::Close);
        }
    }
}

impl Drop for WebSocketLink {
    fn drop(&mut self) {
        self.close();
    }
}

/// Resolves once the owner asks for the connection to go away
async fn close_requested(commands: &mut mpsc::UnboundedReceiver<Command>) {
    while let Some(cmd) = commands.recv().await {
        if matches!(cmd, Command::Close) {
            return;
        }
    }
}

async fn run_connection(
    url: String,
    on_event: ChannelCallback,
    mut commands: mpsc::UnboundedReceiver<Command>,
    state: Arc<AtomicU8>,
) {
    let redacted = url.split('?').next().unwrap_or_default().to_string();
    debug!("Opening signaling channel to {}", redacted);

    let connect = tokio_tungstenite::connect_async(url.as_str());
    tokio::pin!(connect);

    let ws = tokio::select! {
        result = &mut connect => match result {
            Ok((ws, _)) => ws,
            Err(e) => {
                let owner_closed = state
                    .compare_exchange(
                        STATE_CONNECTING,
                        STATE_CLOSED,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_err();
                if owner_closed {
                    return;
                }
                warn!("Signaling handshake with {} failed: {}", redacted, e);
                on_event(ChannelEvent::Error(e.to_string()));
                on_event(ChannelEvent::Closed);
                return;
            }
        },
        _ = close_requested(&mut commands) => {
            debug!("Signaling channel closed before handshake completed");
            return;
        }
    };

    // Owner may have closed between handshake completion and now
    if state
        .compare_exchange(STATE_CONNECTING, STATE_OPEN, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return;
    }
    info!("Signaling channel open: {}", redacted);
    on_event(ChannelEvent::Opened);

    let throttler = LogThrottler::default();
    let (mut sink, mut stream) = ws.split();
    let mut failure: Option<String> = None;

    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(Command::Send(text)) => {
                    if let Err(e) = sink.send(Message::text(text)).await {
                        failure = Some(format!("send failed: {}", e));
                        break;
                    }
                }
                Some(Command::Close) | None => {
                    let close = sink.send(Message::Close(None));
                    let _ = tokio::time::timeout(CLOSE_FRAME_TIMEOUT, close).await;
                    debug!("Signaling channel closed by owner");
                    return;
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Some(message) = decode_frame(text.as_str(), &throttler) {
                        debug!("Signaling recv: {}", message.kind());
                        on_event(ChannelEvent::Message(message));
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!("Signaling channel closed by server: {:?}", frame);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    failure = Some(e.to_string());
                    break;
                }
                None => break,
            },
        }
    }

    if state.swap(STATE_CLOSED, Ordering::AcqRel) == STATE_CLOSED {
        return;
    }
    if let Some(reason) = failure {
        warn!("Signaling channel error: {}", reason);
        on_event(ChannelEvent::Error(reason));
    }
    info!("Signaling channel closed: {}", redacted);
    on_event(ChannelEvent::Closed);
}
