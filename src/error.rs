use thiserror::Error;

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Token exchange failed (network, non-2xx status, malformed body).
    /// Never retried: credential problems do not resolve by waiting.
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Signaling channel error: {0}")]
    Channel(String),

    #[error("Signaling channel is not open")]
    ChannelNotReady,

    #[error("Negotiation error: {0}")]
    Negotiation(String),

    /// Inbound signaling input that could not be understood. Logged and dropped.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;
