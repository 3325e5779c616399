use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{Token, TokenProvider};
use crate::config::{Credential, SignalingConfig};
use crate::error::{AppError, Result};

/// Body of `POST /auth`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequest {
    pub client_id: String,
    pub client_secret: String,
}

/// Response of `POST /auth`; the token travels in `code`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub code: String,
}

/// Token provider backed by the endpoint's `/auth` route
pub struct HttpTokenProvider {
    client: reqwest::Client,
    url: String,
    credential: Credential,
}

impl HttpTokenProvider {
    pub fn new(signaling: &SignalingConfig, credential: Credential) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(signaling.auth_timeout())
            .build()
            .map_err(|e| AppError::Auth(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: signaling.auth_url(),
            credential,
        })
    }
}

#[async_trait]
impl TokenProvider for HttpTokenProvider {
    async fn fetch_token(&self) -> Result<Token> {
        debug!("Requesting session token from {}", self.url);

        let body = AuthRequest {
            client_id: self.credential.client_id.clone(),
            client_secret: self.credential.client_secret.clone(),
        };

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Auth(format!("Failed to reach auth endpoint: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Auth(format!("Auth endpoint returned {}", status)));
        }

        let parsed: AuthResponse = response
            .json()
            .await
            .map_err(|e| AppError::Auth(format!("Malformed auth response: {}", e)))?;

        if parsed.code.is_empty() {
            return Err(AppError::Auth("Auth response carries an empty token".to_string()));
        }

        info!("Session token acquired");
        Ok(Token::new(parsed.code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let body = AuthRequest {
            client_id: "viewer".to_string(),
            client_secret: "s3cret".to_string(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["client_id"], "viewer");
        assert_eq!(json["client_secret"], "s3cret");
    }

    #[test]
    fn test_response_requires_code() {
        assert!(serde_json::from_str::<AuthResponse>(r#"{"code":"abc"}"#).is_ok());
        assert!(serde_json::from_str::<AuthResponse>(r#"{"token":"abc"}"#).is_err());
        assert!(serde_json::from_str::<AuthResponse>(r#"{"code":42}"#).is_err());
    }

    #[test]
    fn test_token_debug_hides_value() {
        let token = Token::new("very-secret");
        assert!(!format!("{:?}", token).contains("very-secret"));
        assert_eq!(token.as_str(), "very-secret");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_auth_error() {
        let mut signaling = SignalingConfig::default();
        // Port 9 (discard) on loopback is not listening in test environments
        signaling.host = "127.0.0.1:9".to_string();
        signaling.secure = false;
        signaling.auth_timeout_ms = 2000;

        let provider = HttpTokenProvider::new(&signaling, Credential::new("a", "b")).unwrap();
        let err = provider.fetch_token().await.unwrap_err();
        assert!(matches!(err, AppError::Auth(_)));
    }
}
