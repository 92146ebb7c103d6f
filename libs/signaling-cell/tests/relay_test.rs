// libs/signaling-cell/tests/relay_test.rs
use assert_matches::assert_matches;
use serde_json::json;
use tokio::sync::mpsc::Receiver;

use signaling_cell::{
    CallSignal, RelayEventType, RelayMessage, SignalType, SignalingError, SignalingRelay,
};

fn signal(signal_type: SignalType, room: &str, from: &str, target: Option<&str>) -> CallSignal {
    CallSignal {
        signal_type,
        room_id: room.to_string(),
        from_peer_id: from.to_string(),
        target_peer_id: target.map(str::to_string),
        payload: json!({ "sdp": format!("v=0 from {}", from) }),
    }
}

fn drain(rx: &mut Receiver<RelayMessage>) -> Vec<RelayMessage> {
    let mut messages = Vec::new();
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    messages
}

async fn join(relay: &SignalingRelay, room: &str, peer: &str, role: &str) -> Receiver<RelayMessage> {
    let (peer_id, rx) = relay
        .join(room, Some(peer.to_string()), &format!("user-{}", peer), role)
        .await
        .unwrap();
    assert_eq!(peer_id, peer);
    rx
}

#[tokio::test]
async fn test_join_announces_peers_both_ways() {
    let relay = SignalingRelay::new(16);
    let mut doctor = join(&relay, "room-1", "doctor", "doctor").await;
    let mut patient = join(&relay, "room-1", "patient", "patient").await;

    let to_doctor = drain(&mut doctor);
    assert_eq!(to_doctor.len(), 1);
    assert_eq!(to_doctor[0].message_type, RelayEventType::UserJoined);
    assert_eq!(to_doctor[0].from_peer_id.as_deref(), Some("patient"));
    assert_eq!(to_doctor[0].role.as_deref(), Some("patient"));

    let to_patient = drain(&mut patient);
    assert_eq!(to_patient.len(), 1);
    assert_eq!(to_patient[0].message_type, RelayEventType::ExistingPeer);
    assert_eq!(to_patient[0].from_peer_id.as_deref(), Some("doctor"));
    assert_eq!(to_patient[0].user_id.as_deref(), Some("user-doctor"));
}

#[tokio::test]
async fn test_duplicate_peer_rejected() {
    let relay = SignalingRelay::new(16);
    let _first = join(&relay, "room-1", "peer", "doctor").await;

    assert_matches!(
        relay.join("room-1", Some("peer".to_string()), "someone", "patient").await,
        Err(SignalingError::DuplicatePeer)
    );
    // Same peer id in another room is fine.
    assert!(relay.join("room-2", Some("peer".to_string()), "someone", "patient").await.is_ok());
}

#[tokio::test]
async fn test_targeted_signal_reaches_only_target() {
    let relay = SignalingRelay::new(16);
    let mut a = join(&relay, "room-1", "a", "doctor").await;
    let mut b = join(&relay, "room-1", "b", "patient").await;
    let mut c = join(&relay, "room-1", "c", "patient").await;
    drain(&mut a);
    drain(&mut b);
    drain(&mut c);

    let offer = signal(SignalType::Offer, "room-1", "a", Some("b"));
    let expected_payload = offer.payload.clone();
    assert_eq!(relay.relay(offer).await.unwrap(), 1);

    let received = drain(&mut b);
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].message_type, RelayEventType::Offer);
    assert_eq!(received[0].from_peer_id.as_deref(), Some("a"));
    assert_eq!(received[0].payload, expected_payload);

    assert!(drain(&mut a).is_empty());
    assert!(drain(&mut c).is_empty());
}

#[tokio::test]
async fn test_untargeted_signal_broadcasts_within_room_only() {
    let relay = SignalingRelay::new(16);
    let mut a = join(&relay, "room-1", "a", "doctor").await;
    let mut b = join(&relay, "room-1", "b", "patient").await;
    let mut other_room = join(&relay, "room-2", "x", "patient").await;
    drain(&mut a);
    drain(&mut b);
    drain(&mut other_room);

    let delivered = relay
        .relay(signal(SignalType::IceCandidate, "room-1", "a", None))
        .await
        .unwrap();
    assert_eq!(delivered, 1);

    assert_eq!(drain(&mut b)[0].message_type, RelayEventType::IceCandidate);
    assert!(drain(&mut a).is_empty());
    assert!(drain(&mut other_room).is_empty());
}

#[tokio::test]
async fn test_signals_never_cross_rooms() {
    let relay = SignalingRelay::new(16);
    let _a = join(&relay, "room-1", "a", "doctor").await;
    let mut b = join(&relay, "room-2", "b", "patient").await;
    drain(&mut b);

    assert_matches!(
        relay.relay(signal(SignalType::Offer, "room-1", "a", Some("b"))).await,
        Err(SignalingError::PeerNotFound { .. })
    );
    assert_matches!(
        relay.relay(signal(SignalType::Offer, "room-2", "a", Some("b"))).await,
        Err(SignalingError::SenderNotInRoom)
    );
    assert_matches!(
        relay.relay(signal(SignalType::Answer, "room-9", "a", None)).await,
        Err(SignalingError::SenderNotInRoom)
    );
    assert!(drain(&mut b).is_empty());
}

#[tokio::test]
async fn test_per_sender_order_is_preserved() {
    let relay = SignalingRelay::new(64);
    let _a = join(&relay, "room-1", "a", "doctor").await;
    let mut b = join(&relay, "room-1", "b", "patient").await;
    drain(&mut b);

    for i in 0..20 {
        let mut candidate = signal(SignalType::IceCandidate, "room-1", "a", Some("b"));
        candidate.payload = json!({ "seq": i });
        relay.relay(candidate).await.unwrap();
    }

    let sequence: Vec<i64> = drain(&mut b)
        .iter()
        .map(|m| m.payload["seq"].as_i64().unwrap())
        .collect();
    assert_eq!(sequence, (0..20).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_screen_share_sets_flag_and_notifies() {
    let relay = SignalingRelay::new(16);
    let mut a = join(&relay, "room-1", "a", "doctor").await;
    let mut b = join(&relay, "room-1", "b", "patient").await;
    drain(&mut a);
    drain(&mut b);

    relay
        .relay(signal(SignalType::ScreenShareStart, "room-1", "a", Some("b")))
        .await
        .unwrap();
    assert_eq!(drain(&mut b)[0].message_type, RelayEventType::ScreenShareStart);

    let status = relay.room_status("room-1").await;
    let sharer = status.participants.iter().find(|p| p.peer_id == "a").unwrap();
    assert!(sharer.screen_sharing);

    relay
        .relay(signal(SignalType::ScreenShareStop, "room-1", "a", None))
        .await
        .unwrap();
    let status = relay.room_status("room-1").await;
    assert!(status.participants.iter().all(|p| !p.screen_sharing));
}

#[tokio::test]
async fn test_mute_leave_and_end() {
    let relay = SignalingRelay::new(16);
    let mut a = join(&relay, "room-1", "a", "doctor").await;
    let mut b = join(&relay, "room-1", "b", "patient").await;
    let mut c = join(&relay, "room-1", "c", "patient").await;
    drain(&mut a);
    drain(&mut b);
    drain(&mut c);

    assert_eq!(relay.set_mute("room-1", "b", true, false).await.unwrap(), 2);
    let mute = &drain(&mut a)[0];
    assert_eq!(mute.message_type, RelayEventType::MuteStatus);
    assert_eq!(mute.payload["audio_muted"], true);
    drain(&mut c);

    relay.leave("room-1", "b").await.unwrap();
    assert_eq!(drain(&mut a)[0].message_type, RelayEventType::UserLeft);
    assert_eq!(drain(&mut c)[0].message_type, RelayEventType::UserLeft);
    assert_eq!(relay.room_status("room-1").await.participant_count, 2);
    assert_matches!(
        relay.leave("room-1", "b").await,
        Err(SignalingError::PeerNotFound { .. })
    );

    assert_eq!(relay.end_session("room-1", Some("a")).await.unwrap(), 2);
    assert_eq!(drain(&mut c)[0].message_type, RelayEventType::SessionEnd);
    assert!(!relay.room_status("room-1").await.active);
    assert_eq!(relay.active_room_count().await, 0);

    // Senders were dropped with the room, so the receivers are closed.
    assert!(c.recv().await.is_none());
    assert_matches!(relay.end_session("room-1", None).await, Err(SignalingError::RoomNotFound));
}
