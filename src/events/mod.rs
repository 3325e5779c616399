//! Event system for session notifications
//!
//! Publishes [`ViewerEvent`]s from the session controller to any number of
//! observers (the presentation layer, the CLI, tests).

pub mod types;

pub use types::ViewerEvent;

use tokio::sync::broadcast;

/// Event channel capacity (ring buffer size)
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Broadcast bus for viewer events
///
/// ```no_run
/// use stream_viewer::events::{EventBus, ViewerEvent};
///
/// let bus = EventBus::new();
/// let mut rx = bus.subscribe();
/// bus.publish(ViewerEvent::ChannelOpened { attempt: 1 });
/// tokio::spawn(async move {
///     while let Ok(event) = rx.recv().await {
///         println!("{}", event.event_name());
///     }
/// });
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ViewerEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish an event to all subscribers
    ///
    /// Without subscribers the event is dropped.
    pub fn publish(&self, event: ViewerEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to future events
    ///
    /// A subscriber that falls more than the channel capacity behind gets a
    /// `Lagged` error and misses events.
    pub fn subscribe(&self) -> broadcast::Receiver<ViewerEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
