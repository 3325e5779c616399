//! Session lifecycle
//!
//! A session turns a credential into a live inbound video stream and keeps
//! it alive: token exchange, signaling channel, offer/answer negotiation and
//! bounded automatic reconnection.
//!
//! Everything runs on a single controller task that drains one event queue.
//! Callbacks from the signaling channel, the media transport and timers are
//! tagged with the generation of the attempt that created them and posted
//! to that queue; teardown bumps the generation so late events from a dead
//! attempt are discarded instead of racing the live one.

mod controller;
mod handle;
pub mod policy;
mod state;


pub use controller::SessionController;
pub use handle::SessionHandle;
pub use policy::{ReconnectPolicy, RetryBudget, MAX_RECONNECT_ATTEMPTS, RECONNECT_DELAY};
pub use state::ConnectionState;
