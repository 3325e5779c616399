use serde::{Deserialize, Serialize};

/// Coarse session status exposed to the presentation layer
///
/// Within one connection attempt the state only moves forward
/// (connecting → connected → streaming → error); a new attempt resets it
/// to `Connecting`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Connecting,
    Connected,
    Streaming,
    Error,
}

impl ConnectionState {
    /// Whether `next` is a forward move from `self`
    pub fn can_advance_to(self, next: ConnectionState) -> bool {
        next > self
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Streaming => write!(f, "streaming"),
            ConnectionState::Error => write!(f, "error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_only() {
        use ConnectionState::*;
        assert!(Connecting.can_advance_to(Connected));
        assert!(Connected.can_advance_to(Streaming));
        assert!(Connecting.can_advance_to(Error));
        assert!(Streaming.can_advance_to(Error));
        assert!(!Error.can_advance_to(Streaming));
        assert!(!Streaming.can_advance_to(Connected));
        assert!(!Connected.can_advance_to(Connected));
    }
}
