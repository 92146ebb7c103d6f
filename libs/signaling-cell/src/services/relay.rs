// libs/signaling-cell/src/services/relay.rs
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{
    CallSignal, PeerInfo, RelayEventType, RelayMessage, RoomStatus, SignalType, SignalingError,
};

struct PeerConnection {
    user_id: String,
    role: String,
    sender: mpsc::Sender<RelayMessage>,
    audio_muted: bool,
    video_muted: bool,
    screen_sharing: bool,
    joined_at: DateTime<Utc>,
}

impl PeerConnection {
    fn info(&self, peer_id: &str) -> PeerInfo {
        PeerInfo {
            peer_id: peer_id.to_string(),
            user_id: self.user_id.clone(),
            role: self.role.clone(),
            audio_muted: self.audio_muted,
            video_muted: self.video_muted,
            screen_sharing: self.screen_sharing,
            joined_at: self.joined_at,
        }
    }
}

type Room = HashMap<String, PeerConnection>;

/// Best-effort delivery: a full or closed queue drops the message.
fn deliver(room_id: &str, peer_id: &str, peer: &PeerConnection, message: RelayMessage) -> bool {
    match peer.sender.try_send(message) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(message)) => {
            warn!(
                "Dropped {:?} for peer {} in room {}: queue full",
                message.message_type, peer_id, room_id
            );
            false
        }
        Err(mpsc::error::TrySendError::Closed(message)) => {
            warn!(
                "Dropped {:?} for peer {} in room {}: connection closed",
                message.message_type, peer_id, room_id
            );
            false
        }
    }
}

/// Send `message` to every peer in `room` except `except`.
fn broadcast(room_id: &str, room: &Room, except: &str, message: &RelayMessage) -> usize {
    room.iter()
        .filter(|(peer_id, _)| peer_id.as_str() != except)
        .filter(|(peer_id, peer)| deliver(room_id, peer_id, peer, message.clone()))
        .count()
}

/// Room registry. Every operation holds the registry lock only for the
/// duration of non-blocking sends.
pub struct SignalingRelay {
    rooms: RwLock<HashMap<String, Room>>,
    channel_capacity: usize,
}

impl SignalingRelay {
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            channel_capacity: channel_capacity.max(1),
        }
    }

    /// Register a peer. Existing peers are told about the newcomer and the
    /// newcomer receives one `EXISTING_PEER` per peer already present.
    pub async fn join(
        &self,
        room_id: &str,
        peer_id: Option<String>,
        user_id: &str,
        role: &str,
    ) -> Result<(String, mpsc::Receiver<RelayMessage>), SignalingError> {
        if room_id.trim().is_empty() {
            return Err(SignalingError::ValidationError("room_id is required".to_string()));
        }

        let peer_id = peer_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut rooms = self.rooms.write().await;
        let room = rooms.entry(room_id.to_string()).or_default();

        if room.contains_key(&peer_id) {
            return Err(SignalingError::DuplicatePeer);
        }

        let (sender, receiver) = mpsc::channel(self.channel_capacity);
        let newcomer = PeerConnection {
            user_id: user_id.to_string(),
            role: role.to_string(),
            sender,
            audio_muted: false,
            video_muted: false,
            screen_sharing: false,
            joined_at: Utc::now(),
        };

        let joined = RelayMessage::new(RelayEventType::UserJoined, room_id)
            .from_peer(&peer_id, user_id, role);
        broadcast(room_id, room, &peer_id, &joined);

        for (existing_id, existing) in room.iter() {
            let message = RelayMessage::new(RelayEventType::ExistingPeer, room_id)
                .from_peer(existing_id, &existing.user_id, &existing.role)
                .with_payload(json!({
                    "audio_muted": existing.audio_muted,
                    "video_muted": existing.video_muted,
                    "screen_sharing": existing.screen_sharing
                }));
            deliver(room_id, &peer_id, &newcomer, message);
        }

        room.insert(peer_id.clone(), newcomer);

        info!(
            "Peer {} (user {}, {}) joined room {} ({} participants)",
            peer_id,
            user_id,
            role,
            room_id,
            room.len()
        );

        Ok((peer_id, receiver))
    }

    /// Route a signal within its room. Returns how many peers it reached.
    pub async fn relay(&self, signal: CallSignal) -> Result<usize, SignalingError> {
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .get_mut(&signal.room_id)
            .ok_or(SignalingError::SenderNotInRoom)?;

        let sender = room
            .get_mut(&signal.from_peer_id)
            .ok_or(SignalingError::SenderNotInRoom)?;

        match signal.signal_type {
            SignalType::ScreenShareStart => sender.screen_sharing = true,
            SignalType::ScreenShareStop => sender.screen_sharing = false,
            _ => {}
        }

        let message = RelayMessage::new(signal.signal_type.into(), &signal.room_id)
            .from_peer(&signal.from_peer_id, &sender.user_id, &sender.role)
            .with_payload(signal.payload);

        let target = signal
            .target_peer_id
            .as_deref()
            .filter(|_| signal.signal_type.is_negotiation());

        let delivered = match target {
            Some(target_id) if target_id == signal.from_peer_id => {
                return Err(SignalingError::ValidationError(
                    "A peer cannot signal itself".to_string(),
                ));
            }
            Some(target_id) => {
                let target = room.get(target_id).ok_or_else(|| SignalingError::PeerNotFound {
                    room_id: signal.room_id.clone(),
                    peer_id: target_id.to_string(),
                })?;
                usize::from(deliver(&signal.room_id, target_id, target, message))
            }
            None => broadcast(&signal.room_id, room, &signal.from_peer_id, &message),
        };

        debug!(
            "Relayed {:?} from {} in room {} to {} peer(s)",
            signal.signal_type, signal.from_peer_id, signal.room_id, delivered
        );

        Ok(delivered)
    }

    pub async fn leave(&self, room_id: &str, peer_id: &str) -> Result<(), SignalingError> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.get_mut(room_id).ok_or(SignalingError::RoomNotFound)?;

        let peer = room.remove(peer_id).ok_or_else(|| SignalingError::PeerNotFound {
            room_id: room_id.to_string(),
            peer_id: peer_id.to_string(),
        })?;

        let left = RelayMessage::new(RelayEventType::UserLeft, room_id)
            .from_peer(peer_id, &peer.user_id, &peer.role);
        broadcast(room_id, room, peer_id, &left);

        info!("Peer {} left room {}", peer_id, room_id);

        if room.is_empty() {
            rooms.remove(room_id);
            debug!("Room {} closed, no participants left", room_id);
        }

        Ok(())
    }

    pub async fn set_mute(
        &self,
        room_id: &str,
        peer_id: &str,
        audio_muted: bool,
        video_muted: bool,
    ) -> Result<usize, SignalingError> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.get_mut(room_id).ok_or(SignalingError::RoomNotFound)?;
        let peer = room.get_mut(peer_id).ok_or_else(|| SignalingError::PeerNotFound {
            room_id: room_id.to_string(),
            peer_id: peer_id.to_string(),
        })?;

        peer.audio_muted = audio_muted;
        peer.video_muted = video_muted;

        let message = RelayMessage::new(RelayEventType::MuteStatus, room_id)
            .from_peer(peer_id, &peer.user_id, &peer.role)
            .with_payload(json!({
                "audio_muted": audio_muted,
                "video_muted": video_muted
            }));

        Ok(broadcast(room_id, room, peer_id, &message))
    }

    /// Tell every peer the session is over and drop the room. Dropping the
    /// senders lets each connection's writer drain and finish.
    pub async fn end_session(&self, room_id: &str, ended_by: Option<&str>) -> Result<usize, SignalingError> {
        let room = self
            .rooms
            .write()
            .await
            .remove(room_id)
            .ok_or(SignalingError::RoomNotFound)?;

        let message = RelayMessage::new(RelayEventType::SessionEnd, room_id)
            .with_payload(json!({ "ended_by": ended_by }));
        let delivered = broadcast(room_id, &room, "", &message);

        info!("Session in room {} ended, {} peer(s) notified", room_id, delivered);
        Ok(delivered)
    }

    /// Send an error frame to a single peer, e.g. after it sent a bad frame.
    pub async fn notify_error(&self, room_id: &str, peer_id: &str, error: &SignalingError) {
        let rooms = self.rooms.read().await;
        if let Some(peer) = rooms.get(room_id).and_then(|room| room.get(peer_id)) {
            let message = RelayMessage::new(RelayEventType::Error, room_id)
                .with_payload(json!({ "error": error.to_string() }));
            deliver(room_id, peer_id, peer, message);
        }
    }

    pub async fn peer_user_id(&self, room_id: &str, peer_id: &str) -> Option<String> {
        self.rooms
            .read()
            .await
            .get(room_id)
            .and_then(|room| room.get(peer_id))
            .map(|peer| peer.user_id.clone())
    }

    pub async fn room_status(&self, room_id: &str) -> RoomStatus {
        let rooms = self.rooms.read().await;
        let mut participants: Vec<PeerInfo> = rooms
            .get(room_id)
            .map(|room| room.iter().map(|(id, peer)| peer.info(id)).collect())
            .unwrap_or_default();
        participants.sort_by_key(|p| p.joined_at);

        RoomStatus {
            room_id: room_id.to_string(),
            active: !participants.is_empty(),
            participant_count: participants.len(),
            participants,
        }
    }

    pub async fn active_room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_generated_peer_id() {
        let relay = SignalingRelay::new(8);
        let (peer_id, _rx) = relay.join("room", None, "user", "patient").await.unwrap();
        assert!(Uuid::parse_str(&peer_id).is_ok());

        let (blank_id, _rx2) = relay.join("room", Some("  ".to_string()), "user2", "doctor").await.unwrap();
        assert_ne!(blank_id, peer_id);
    }

    #[tokio::test]
    async fn test_full_queue_drops_messages() {
        let relay = SignalingRelay::new(1);
        let (_, mut rx_a) = relay.join("room", Some("a".into()), "ua", "doctor").await.unwrap();
        let (_, _rx_b) = relay.join("room", Some("b".into()), "ub", "patient").await.unwrap();

        // a's single slot is taken by USER_JOINED for b.
        let signal = CallSignal {
            signal_type: SignalType::Offer,
            room_id: "room".to_string(),
            from_peer_id: "b".to_string(),
            target_peer_id: Some("a".to_string()),
            payload: json!({ "sdp": "v=0" }),
        };
        assert_eq!(relay.relay(signal).await.unwrap(), 0);

        assert_eq!(rx_a.recv().await.unwrap().message_type, RelayEventType::UserJoined);
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_empty_room_is_dropped() {
        let relay = SignalingRelay::new(8);
        relay.join("room", Some("a".into()), "ua", "doctor").await.unwrap();
        assert_eq!(relay.active_room_count().await, 1);

        relay.leave("room", "a").await.unwrap();
        assert_eq!(relay.active_room_count().await, 0);
        assert_matches!(relay.leave("room", "a").await, Err(SignalingError::RoomNotFound));
    }
}
