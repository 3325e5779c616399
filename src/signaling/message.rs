//! Signaling wire types
//!
//! Messages travel as JSON objects `{"type": ..., "value": ...}`:
//!
//! | type               | value                  |
//! |--------------------|------------------------|
//! | `webrtc/offer`     | SDP text               |
//! | `webrtc/answer`    | SDP text               |
//! | `webrtc/candidate` | raw ICE candidate line |

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Media line identifier used for candidates (single video m-line)
pub const DEFAULT_SDP_MID: &str = "0";

/// Signaling message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum SignalingMessage {
    #[serde(rename = "webrtc/offer")]
    Offer(String),
    #[serde(rename = "webrtc/answer")]
    Answer(String),
    #[serde(rename = "webrtc/candidate")]
    Candidate(String),
}

impl SignalingMessage {
    /// Parse a signaling message from a text frame
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| AppError::MalformedMessage(format!("Invalid signaling message: {}", e)))
    }

    /// Serialize for transmission
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn offer(description: &SessionDescription) -> Self {
        SignalingMessage::Offer(description.sdp.clone())
    }

    pub fn candidate(candidate: &IceCandidate) -> Self {
        SignalingMessage::Candidate(candidate.candidate.clone())
    }

    /// Wire name of the message kind
    pub fn kind(&self) -> &'static str {
        match self {
            SignalingMessage::Offer(_) => "webrtc/offer",
            SignalingMessage::Answer(_) => "webrtc/answer",
            SignalingMessage::Candidate(_) => "webrtc/candidate",
        }
    }
}

/// Role of a session description in the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpRole {
    Offer,
    Answer,
}

impl std::fmt::Display for SdpRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SdpRole::Offer => write!(f, "offer"),
            SdpRole::Answer => write!(f, "answer"),
        }
    }
}

/// Local or remote session description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub role: SdpRole,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            role: SdpRole::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            role: SdpRole::Answer,
            sdp: sdp.into(),
        }
    }
}

impl TryFrom<&SignalingMessage> for SessionDescription {
    type Error = AppError;

    fn try_from(message: &SignalingMessage) -> Result<Self> {
        let (role, sdp) = match message {
            SignalingMessage::Offer(sdp) => (SdpRole::Offer, sdp),
            SignalingMessage::Answer(sdp) => (SdpRole::Answer, sdp),
            SignalingMessage::Candidate(_) => {
                return Err(AppError::MalformedMessage(
                    "candidate message carries no session description".to_string(),
                ))
            }
        };

        if sdp.trim().is_empty() {
            return Err(AppError::MalformedMessage(format!("empty {} SDP", role)));
        }

        Ok(Self {
            role,
            sdp: sdp.clone(),
        })
    }
}

/// ICE candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    /// Candidate string
    pub candidate: String,
    /// SDP mid (media ID)
    #[serde(rename = "sdpMid")]
    pub sdp_mid: Option<String>,
    /// SDP mline index
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u16>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: Some(DEFAULT_SDP_MID.to_string()),
            sdp_mline_index: Some(0),
        }
    }

    /// Parse a candidate received from the remote side
    ///
    /// Returns `Ok(None)` for the empty end-of-candidates marker.
    pub fn parse_remote(value: &str) -> Result<Option<Self>> {
        let value = value.trim();
        if value.is_empty() {
            return Ok(None);
        }

        let line = value.strip_prefix("a=").unwrap_or(value);
        validate_candidate_line(line)?;
        Ok(Some(Self::new(line)))
    }
}

/// `candidate:<foundation> <component> <protocol> <priority> <address> <port> typ <type> ...`
fn validate_candidate_line(line: &str) -> Result<()> {
    let body = line
        .strip_prefix("candidate:")
        .ok_or_else(|| AppError::MalformedMessage(format!("not a candidate line: {:.40}", line)))?;

    let fields: Vec<&str> = body.split_whitespace().collect();
    if fields.len() < 8 {
        return Err(AppError::MalformedMessage(format!(
            "candidate has {} fields, expected at least 8",
            fields.len()
        )));
    }

    let numeric = |name: &str, value: &str, ok: bool| {
        if ok {
            Ok(())
        } else {
            Err(AppError::MalformedMessage(format!(
                "candidate {} is not numeric: {}",
                name, value
            )))
        }
    };
    numeric("component", fields[1], fields[1].parse::<u16>().is_ok())?;
    numeric("priority", fields[3], fields[3].parse::<u32>().is_ok())?;
    numeric("port", fields[5], fields[5].parse::<u16>().is_ok())?;

    if fields[6] != "typ" {
        return Err(AppError::MalformedMessage(format!(
            "candidate is missing 'typ' keyword: {:.40}",
            line
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST_CANDIDATE: &str =
        "candidate:842163049 1 udp 1677729535 203.0.113.7 46154 typ srflx \
         raddr 10.0.0.2 rport 46154";

    #[test]
    fn test_wire_format() {
        let msg = SignalingMessage::Candidate(HOST_CANDIDATE.to_string());
        let json: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "webrtc/candidate");
        assert_eq!(json["value"], HOST_CANDIDATE);
    }

    #[test]
    fn test_parse_answer() {
        let msg =
            SignalingMessage::from_json(r#"{"type":"webrtc/answer","value":"v=0\r\n"}"#).unwrap();
        assert_eq!(msg, SignalingMessage::Answer("v=0\r\n".to_string()));
        assert_eq!(msg.kind(), "webrtc/answer");
    }

    #[test]
    fn test_parse_rejects_unknown_kind_and_garbage() {
        assert!(matches!(
            SignalingMessage::from_json(r#"{"type":"webrtc/bye","value":""}"#),
            Err(AppError::MalformedMessage(_))
        ));
        assert!(SignalingMessage::from_json("not json").is_err());
        assert!(SignalingMessage::from_json(r#"{"type":"webrtc/answer","value":7}"#).is_err());
    }

    #[test]
    fn test_offer_survives_signaling_round_trip() {
        let local = SessionDescription::offer("v=0\r\no=- 1 2 IN IP4 127.0.0.1\r\ns=-\r\n");
        let text = SignalingMessage::offer(&local).to_json().unwrap();

        let received = SignalingMessage::from_json(&text).unwrap();
        let remote = SessionDescription::try_from(&received).unwrap();
        assert_eq!(remote, local);
        assert_eq!(remote.role, SdpRole::Offer);
    }

    #[test]
    fn test_empty_answer_is_malformed() {
        let msg = SignalingMessage::Answer("  ".to_string());
        assert!(matches!(
            SessionDescription::try_from(&msg),
            Err(AppError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_parse_remote_candidate() {
        let candidate = IceCandidate::parse_remote(HOST_CANDIDATE).unwrap().unwrap();
        assert_eq!(candidate.candidate, HOST_CANDIDATE);
        assert_eq!(candidate.sdp_mid.as_deref(), Some(DEFAULT_SDP_MID));
        assert_eq!(candidate.sdp_mline_index, Some(0));

        let prefixed = format!("a={}", HOST_CANDIDATE);
        let candidate = IceCandidate::parse_remote(&prefixed).unwrap().unwrap();
        assert_eq!(candidate.candidate, HOST_CANDIDATE);
    }

    #[test]
    fn test_end_of_candidates_marker() {
        assert!(IceCandidate::parse_remote("").unwrap().is_none());
    }

    #[test]
    fn test_malformed_candidates() {
        for bad in [
            "garbage",
            "candidate:1 1 udp",
            "candidate:1 one udp 2122260223 10.0.0.2 5000 typ host",
            "candidate:1 1 udp 2122260223 10.0.0.2 port typ host",
            "candidate:1 1 udp 2122260223 10.0.0.2 5000 type host",
        ] {
            assert!(
                matches!(IceCandidate::parse_remote(bad), Err(AppError::MalformedMessage(_))),
                "accepted {:?}",
                bad
            );
        }
    }
}
