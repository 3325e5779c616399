//! Credential-to-token exchange

mod token;

pub use token::{AuthRequest, AuthResponse, HttpTokenProvider};

use async_trait::async_trait;
use std::fmt;

use crate::error::Result;

/// Short-lived session token
///
/// Consumed once to open a signaling channel; a new one is requested for
/// every connection attempt.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token(<{} chars>)", self.0.len())
    }
}

/// Exchanges long-lived credentials for a session token
///
/// Implementations perform exactly one request per call and never retry;
/// failures surface as [`AppError::Auth`](crate::AppError::Auth).
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch_token(&self) -> Result<Token>;
}
