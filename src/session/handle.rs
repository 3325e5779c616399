use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::state::ConnectionState;
use crate::events::{EventBus, ViewerEvent};
use crate::webrtc::MediaStream;

/// Observer side of a running session
///
/// Dropping the handle stops the session.
pub struct SessionHandle {
    state_rx: watch::Receiver<ConnectionState>,
    media_rx: watch::Receiver<Option<MediaStream>>,
    events: EventBus,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    pub(super) fn new(
        state_rx: watch::Receiver<ConnectionState>,
        media_rx: watch::Receiver<Option<MediaStream>>,
        events: EventBus,
        cancel: CancellationToken,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            state_rx,
            media_rx,
            events,
            cancel,
            task: Some(task),
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch connection state changes
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// The inbound stream, present only while streaming
    pub fn media_stream(&self) -> Option<MediaStream> {
        self.media_rx.borrow().clone()
    }

    pub fn media_watch(&self) -> watch::Receiver<Option<MediaStream>> {
        self.media_rx.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ViewerEvent> {
        self.events.subscribe()
    }

    /// Wait until the state satisfies `predicate`
    ///
    /// Returns the matching state, or `None` if the session ended first.
    pub async fn wait_for<F>(&self, mut predicate: F) -> Option<ConnectionState>
    where
        F: FnMut(ConnectionState) -> bool,
    {
        let mut rx = self.state_rx.clone();
        let reached = rx.wait_for(|state| predicate(*state)).await.ok().map(|state| *state);
        reached
    }

    /// Stop the session and wait for teardown to finish. Idempotent.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
