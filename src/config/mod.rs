//! Viewer configuration
//!
//! Configuration is read once (TOML file, then CLI overrides), validated,
//! and handed to the session controller as an immutable value.

mod schema;

pub use schema::*;

use std::path::Path;

use crate::error::{AppError, Result};

impl ViewerConfig {
    /// Load configuration from a TOML file
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        Self::from_toml(&raw)
    }

    /// Parse configuration from TOML text. Missing sections take defaults.
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| AppError::Config(format!("Invalid config file: {}", e)))
    }

    /// Check that the configuration can drive a session
    pub fn validate(&self) -> Result<()> {
        if self.signaling.host.trim().is_empty() {
            return Err(AppError::Config("signaling host is not set".to_string()));
        }
        if self.signaling.host.contains("://") {
            return Err(AppError::Config(format!(
                "signaling host must not include a scheme: {}",
                self.signaling.host
            )));
        }
        if self.signaling.stream_name.trim().is_empty() {
            return Err(AppError::Config("stream name is empty".to_string()));
        }
        if self.credential.client_id.trim().is_empty() {
            return Err(AppError::Config("client_id is not set".to_string()));
        }
        if self.webrtc.stun_servers.is_empty() {
            return Err(AppError::Config("at least one STUN server is required".to_string()));
        }
        for url in &self.webrtc.stun_servers {
            if !(url.starts_with("stun:") || url.starts_with("stuns:")) {
                return Err(AppError::Config(format!("not a STUN url: {}", url)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn valid() -> ViewerConfig {
        let mut config = ViewerConfig::default();
        config.signaling.host = "media.example.com".to_string();
        config.credential = Credential::new("viewer", "s3cret");
        config
    }

    #[test]
    fn test_defaults() {
        let config = ViewerConfig::default();
        assert_eq!(config.signaling.stream_name, DEFAULT_STREAM_NAME);
        assert!(config.signaling.secure);
        assert_eq!(config.webrtc.stun_servers, vec![DEFAULT_STUN_SERVER.to_string()]);
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.reconnect.delay_ms, 2000);
    }

    #[test]
    fn test_urls() {
        let mut config = valid();
        config.signaling.stream_name = "front door".to_string();
        assert_eq!(config.signaling.auth_url(), "https://media.example.com/auth");
        assert_eq!(
            config.signaling.channel_url("a&b"),
            "wss://media.example.com/api/ws?src=front%20door&token=a%26b"
        );

        config.signaling.secure = false;
        assert_eq!(config.signaling.auth_url(), "http://media.example.com/auth");
        assert!(config.signaling.channel_url("t").starts_with("ws://"));
    }

    #[test]
    fn test_validate() {
        assert!(valid().validate().is_ok());

        let mut config = valid();
        config.signaling.host = String::new();
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        let mut config = valid();
        config.signaling.host = "https://media.example.com".to_string();
        assert!(config.validate().is_err());

        let mut config = valid();
        config.credential.client_id = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = valid();
        config.webrtc.stun_servers = vec!["turn:relay.example.com".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_secret_is_redacted() {
        let debug = format!("{:?}", valid().credential);
        assert!(debug.contains("viewer"));
        assert!(!debug.contains("s3cret"));
    }

    #[tokio::test]
    async fn test_load_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("viewer.toml");
        tokio::fs::write(
            &path,
            r#"
[credential]
client_id = "viewer"
client_secret = "s3cret"

[signaling]
host = "127.0.0.1:8443"
stream_name = "lobby"

[reconnect]
delay_ms = 500
"#,
        )
        .await
        .unwrap();

        let config = ViewerConfig::load(&path).await.unwrap();
        assert_eq!(config.signaling.host, "127.0.0.1:8443");
        assert_eq!(config.signaling.stream_name, "lobby");
        assert_eq!(config.reconnect.delay_ms, 500);
        assert_eq!(config.reconnect.max_attempts, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_toml() {
        let err = ViewerConfig::from_toml("[signaling\nhost=").unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
