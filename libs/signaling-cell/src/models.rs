// libs/signaling-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// ==============================================================================
// SIGNALS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalType {
    Offer,
    Answer,
    IceCandidate,
    ScreenShareStart,
    ScreenShareStop,
}

impl SignalType {
    /// Negotiation messages can be addressed to a single peer.
    pub fn is_negotiation(&self) -> bool {
        matches!(self, SignalType::Offer | SignalType::Answer | SignalType::IceCandidate)
    }
}

/// A signal as sent by a peer. The payload (SDP, ICE candidate, ...) is
/// opaque and forwarded unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallSignal {
    #[serde(rename = "type")]
    pub signal_type: SignalType,
    pub room_id: String,
    pub from_peer_id: String,
    pub target_peer_id: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

// ==============================================================================
// OUTBOUND MESSAGES
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelayEventType {
    Offer,
    Answer,
    IceCandidate,
    ScreenShareStart,
    ScreenShareStop,
    UserJoined,
    ExistingPeer,
    UserLeft,
    MuteStatus,
    SessionEnd,
    Error,
}

impl From<SignalType> for RelayEventType {
    fn from(signal_type: SignalType) -> Self {
        match signal_type {
            SignalType::Offer => RelayEventType::Offer,
            SignalType::Answer => RelayEventType::Answer,
            SignalType::IceCandidate => RelayEventType::IceCandidate,
            SignalType::ScreenShareStart => RelayEventType::ScreenShareStart,
            SignalType::ScreenShareStop => RelayEventType::ScreenShareStop,
        }
    }
}

/// Frame delivered to a peer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelayMessage {
    #[serde(rename = "type")]
    pub message_type: RelayEventType,
    pub room_id: String,
    pub from_peer_id: Option<String>,
    pub user_id: Option<String>,
    pub role: Option<String>,
    #[serde(default)]
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl RelayMessage {
    pub fn new(message_type: RelayEventType, room_id: &str) -> Self {
        Self {
            message_type,
            room_id: room_id.to_string(),
            from_peer_id: None,
            user_id: None,
            role: None,
            payload: Value::Null,
            timestamp: Utc::now(),
        }
    }

    pub fn from_peer(mut self, peer_id: &str, user_id: &str, role: &str) -> Self {
        self.from_peer_id = Some(peer_id.to_string());
        self.user_id = Some(user_id.to_string());
        self.role = Some(role.to_string());
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

// ==============================================================================
// INBOUND WEBSOCKET FRAMES
// ==============================================================================

/// Frames a peer sends over its socket. Room and sender come from the
/// connection, never from the frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientFrame {
    Signal {
        #[serde(rename = "type")]
        signal_type: SignalType,
        target_peer_id: Option<String>,
        #[serde(default)]
        payload: Value,
    },
    Mute {
        audio_muted: bool,
        video_muted: bool,
    },
    Leave,
    End,
}

// ==============================================================================
// ROOM STATUS & METRICS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeerInfo {
    pub peer_id: String,
    pub user_id: String,
    pub role: String,
    pub audio_muted: bool,
    pub video_muted: bool,
    pub screen_sharing: bool,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomStatus {
    pub room_id: String,
    pub active: bool,
    pub participant_count: usize,
    pub participants: Vec<PeerInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallQualityMetrics {
    pub room_id: String,
    pub consultation_id: Option<String>,
    /// 1-5 scale.
    pub audio_quality: Option<u8>,
    /// 1-5 scale.
    pub video_quality: Option<u8>,
    /// 1-5 scale.
    pub connection_stability: Option<u8>,
    pub latency_ms: Option<u64>,
    pub packet_loss_percentage: Option<f64>,
    pub network_type: Option<String>,
    pub device_type: Option<String>,
    pub browser_info: Option<String>,
}

impl CallQualityMetrics {
    pub fn validate(&self) -> Result<(), SignalingError> {
        if self.room_id.trim().is_empty() {
            return Err(SignalingError::ValidationError("room_id is required".to_string()));
        }

        for (name, score) in [
            ("audio_quality", self.audio_quality),
            ("video_quality", self.video_quality),
            ("connection_stability", self.connection_stability),
        ] {
            if let Some(score) = score {
                if !(1..=5).contains(&score) {
                    return Err(SignalingError::ValidationError(format!(
                        "{} must be between 1 and 5",
                        name
                    )));
                }
            }
        }

        if let Some(loss) = self.packet_loss_percentage {
            if !(0.0..=100.0).contains(&loss) {
                return Err(SignalingError::ValidationError(
                    "packet_loss_percentage must be between 0 and 100".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Any score of 2 or below, or more than 5% packet loss.
    pub fn is_degraded(&self) -> bool {
        let poor_score = [self.audio_quality, self.video_quality, self.connection_stability]
            .into_iter()
            .flatten()
            .any(|score| score <= 2);

        poor_score || self.packet_loss_percentage.is_some_and(|loss| loss > 5.0)
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignalingError {
    #[error("Peer {peer_id} is not connected to room {room_id}")]
    PeerNotFound { room_id: String, peer_id: String },

    #[error("Sender is not connected to this room")]
    SenderNotInRoom,

    #[error("Room not found")]
    RoomNotFound,

    #[error("Peer id is already in use in this room")]
    DuplicatePeer,

    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_frames_parse() {
        let frame: ClientFrame = serde_json::from_value(json!({
            "action": "signal",
            "type": "ICE_CANDIDATE",
            "target_peer_id": "peer-b",
            "payload": { "candidate": "candidate:1 1 UDP 2122252543 192.0.2.1 54400 typ host" }
        }))
        .unwrap();

        match frame {
            ClientFrame::Signal { signal_type, target_peer_id, .. } => {
                assert_eq!(signal_type, SignalType::IceCandidate);
                assert_eq!(target_peer_id.as_deref(), Some("peer-b"));
            }
            other => panic!("unexpected frame {:?}", other),
        }

        let mute: ClientFrame =
            serde_json::from_value(json!({ "action": "mute", "audio_muted": true, "video_muted": false }))
                .unwrap();
        assert_eq!(mute, ClientFrame::Mute { audio_muted: true, video_muted: false });

        let leave: ClientFrame = serde_json::from_value(json!({ "action": "leave" })).unwrap();
        assert_eq!(leave, ClientFrame::Leave);
    }

    #[test]
    fn test_relay_message_wire_format() {
        let message = RelayMessage::new(RelayEventType::UserJoined, "room-1")
            .from_peer("peer-a", "user-a", "doctor");
        let value = serde_json::to_value(&message).unwrap();

        assert_eq!(value["type"], "USER_JOINED");
        assert_eq!(value["from_peer_id"], "peer-a");
    }

    #[test]
    fn test_quality_metrics_validation() {
        let mut metrics = CallQualityMetrics {
            room_id: "room-1".to_string(),
            consultation_id: None,
            audio_quality: Some(4),
            video_quality: Some(5),
            connection_stability: Some(3),
            latency_ms: Some(120),
            packet_loss_percentage: Some(0.5),
            network_type: Some("wifi".to_string()),
            device_type: None,
            browser_info: None,
        };
        assert!(metrics.validate().is_ok());
        assert!(!metrics.is_degraded());

        metrics.packet_loss_percentage = Some(12.0);
        assert!(metrics.is_degraded());

        metrics.video_quality = Some(9);
        assert!(metrics.validate().is_err());
    }
}
