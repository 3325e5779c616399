//! stream-viewer - headless WebRTC stream viewer
//!
//! Exchanges client credentials for a session token, opens a WebSocket
//! signaling channel, negotiates a receive-only video transport and keeps
//! the session alive with bounded reconnection.

pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod session;
pub mod signaling;
pub mod utils;
pub mod webrtc;

pub use error::{AppError, Result};
pub use session::{ConnectionState, SessionController, SessionHandle};
