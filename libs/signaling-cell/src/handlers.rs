use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension, Path, Query, State,
    },
    response::{IntoResponse, Response},
    Json,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    CallQualityMetrics, CallSignal, ClientFrame, RelayMessage, SignalType, SignalingError,
};
use crate::router::SignalingState;
use crate::services::SignalingRelay;

#[derive(Debug, Deserialize)]
pub struct JoinQuery {
    pub peer_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SignalRequest {
    #[serde(rename = "type")]
    pub signal_type: SignalType,
    pub from_peer_id: String,
    pub target_peer_id: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

fn map_signaling_error(error: SignalingError) -> AppError {
    match error {
        SignalingError::PeerNotFound { .. } | SignalingError::RoomNotFound => {
            AppError::NotFound(error.to_string())
        }
        SignalingError::DuplicatePeer => AppError::Conflict(error.to_string()),
        SignalingError::SenderNotInRoom => AppError::Forbidden(error.to_string()),
        SignalingError::ValidationError(msg) => AppError::ValidationError(msg),
    }
}

fn is_moderator(user: &User) -> bool {
    user.has_role("doctor") || user.is_admin()
}

#[axum::debug_handler]
pub async fn health_check(State(state): State<SignalingState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "signaling-cell",
        "active_rooms": state.relay.active_room_count().await,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

// ==============================================================================
// WEBSOCKET CHANNEL
// ==============================================================================

/// Join a room and upgrade to a WebSocket. Joining happens before the upgrade
/// so a duplicate peer id is reported as a normal 409.
#[axum::debug_handler]
pub async fn room_socket(
    ws: WebSocketUpgrade,
    State(state): State<SignalingState>,
    Extension(user): Extension<User>,
    Path(room_id): Path<String>,
    Query(query): Query<JoinQuery>,
) -> Result<Response, AppError> {
    // Only the verified token decides the role announced to other peers.
    let role = user.role.clone().unwrap_or_else(|| "participant".to_string());

    let (peer_id, outbound) = state
        .relay
        .join(&room_id, query.peer_id, &user.id, &role)
        .await
        .map_err(map_signaling_error)?;

    let relay = state.relay.clone();
    let cleanup = (state.relay.clone(), room_id.clone(), peer_id.clone());

    Ok(ws
        .on_failed_upgrade(move |error| {
            warn!("WebSocket upgrade failed for peer {}: {}", cleanup.2, error);
            tokio::spawn(async move {
                let (relay, room_id, peer_id) = cleanup;
                let _ = relay.leave(&room_id, &peer_id).await;
            });
        })
        .on_upgrade(move |socket| handle_socket(socket, relay, room_id, peer_id, user, outbound))
        .into_response())
}

#[derive(Debug)]
enum FrameOutcome {
    Continue,
    Departed,
}

async fn handle_socket(
    socket: WebSocket,
    relay: Arc<SignalingRelay>,
    room_id: String,
    peer_id: String,
    user: User,
    mut outbound: mpsc::Receiver<RelayMessage>,
) {
    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to encode relay message: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let mut departed = false;

    // Frames from one socket are handled in order, which keeps each sender's
    // signals in order for every recipient.
    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };

        let outcome = match serde_json::from_str::<ClientFrame>(text.as_str()) {
            Ok(frame) => handle_frame(&relay, &room_id, &peer_id, &user, frame).await,
            Err(e) => Err(SignalingError::ValidationError(format!("Malformed frame: {}", e))),
        };

        match outcome {
            Ok(FrameOutcome::Continue) => {}
            Ok(FrameOutcome::Departed) => {
                departed = true;
                break;
            }
            Err(error) => {
                debug!("Frame from peer {} rejected: {}", peer_id, error);
                relay.notify_error(&room_id, &peer_id, &error).await;
            }
        }
    }

    if !departed {
        // The room may already be gone if another peer ended the session.
        if let Err(e) = relay.leave(&room_id, &peer_id).await {
            debug!("Peer {} disconnected after leaving room {}: {}", peer_id, room_id, e);
        }
    }

    if let Err(e) = writer.await {
        warn!("WebSocket writer for peer {} failed: {}", peer_id, e);
    }

    info!("Peer {} disconnected from room {}", peer_id, room_id);
}

async fn handle_frame(
    relay: &SignalingRelay,
    room_id: &str,
    peer_id: &str,
    user: &User,
    frame: ClientFrame,
) -> Result<FrameOutcome, SignalingError> {
    match frame {
        ClientFrame::Signal { signal_type, target_peer_id, payload } => {
            relay
                .relay(CallSignal {
                    signal_type,
                    room_id: room_id.to_string(),
                    from_peer_id: peer_id.to_string(),
                    target_peer_id,
                    payload,
                })
                .await?;
            Ok(FrameOutcome::Continue)
        }
        ClientFrame::Mute { audio_muted, video_muted } => {
            relay.set_mute(room_id, peer_id, audio_muted, video_muted).await?;
            Ok(FrameOutcome::Continue)
        }
        ClientFrame::Leave => {
            relay.leave(room_id, peer_id).await?;
            Ok(FrameOutcome::Departed)
        }
        ClientFrame::End if is_moderator(user) => {
            relay.end_session(room_id, Some(peer_id)).await?;
            Ok(FrameOutcome::Departed)
        }
        ClientFrame::End => Err(SignalingError::ValidationError(
            "Only the doctor can end the session".to_string(),
        )),
    }
}

// ==============================================================================
// HTTP HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn relay_signal(
    State(state): State<SignalingState>,
    Extension(user): Extension<User>,
    Path(room_id): Path<String>,
    Json(request): Json<SignalRequest>,
) -> Result<Json<Value>, AppError> {
    // The caller must own the peer it is signalling as.
    match state.relay.peer_user_id(&room_id, &request.from_peer_id).await {
        Some(owner) if owner == user.id => {}
        Some(_) => {
            return Err(AppError::Forbidden("Peer belongs to another user".to_string()));
        }
        None => return Err(map_signaling_error(SignalingError::SenderNotInRoom)),
    }

    let delivered = state
        .relay
        .relay(CallSignal {
            signal_type: request.signal_type,
            room_id: room_id.clone(),
            from_peer_id: request.from_peer_id,
            target_peer_id: request.target_peer_id,
            payload: request.payload,
        })
        .await
        .map_err(map_signaling_error)?;

    Ok(Json(json!({
        "room_id": room_id,
        "delivered": delivered
    })))
}

#[axum::debug_handler]
pub async fn room_status(
    State(state): State<SignalingState>,
    Extension(user): Extension<User>,
    Path(room_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let status = state.relay.room_status(&room_id).await;

    let participant = status.participants.iter().any(|p| p.user_id == user.id);
    if !participant && !is_moderator(&user) {
        return Err(AppError::Forbidden("Not a participant of this room".to_string()));
    }

    Ok(Json(json!(status)))
}

#[axum::debug_handler]
pub async fn end_session(
    State(state): State<SignalingState>,
    Extension(user): Extension<User>,
    Path(room_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    if !is_moderator(&user) {
        return Err(AppError::Forbidden("Only doctors can end a session".to_string()));
    }

    let notified = state
        .relay
        .end_session(&room_id, None)
        .await
        .map_err(map_signaling_error)?;

    info!("User {} ended session in room {}", user.id, room_id);

    Ok(Json(json!({
        "room_id": room_id,
        "ended": true,
        "notified": notified
    })))
}

#[axum::debug_handler]
pub async fn submit_quality_metrics(
    Extension(user): Extension<User>,
    Json(metrics): Json<CallQualityMetrics>,
) -> Result<Json<Value>, AppError> {
    metrics.validate().map_err(map_signaling_error)?;

    let degraded = metrics.is_degraded();
    info!(
        room_id = %metrics.room_id,
        user_id = %user.id,
        audio_quality = ?metrics.audio_quality,
        video_quality = ?metrics.video_quality,
        connection_stability = ?metrics.connection_stability,
        latency_ms = ?metrics.latency_ms,
        packet_loss = ?metrics.packet_loss_percentage,
        network_type = ?metrics.network_type,
        "Call quality metrics received"
    );

    if degraded {
        warn!("Degraded call quality reported in room {} by user {}", metrics.room_id, user.id);
    }

    Ok(Json(json!({
        "status": "received",
        "room_id": metrics.room_id,
        "degraded": degraded
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use shared_utils::test_utils::TestUser;

    #[tokio::test]
    async fn test_end_frame_requires_moderator_token() {
        let relay = SignalingRelay::new(8);
        let (_, _doctor_rx) = relay.join("room", Some("doc".into()), "doctor-user", "doctor").await.unwrap();
        let (_, _patient_rx) = relay.join("room", Some("pat".into()), "patient-user", "patient").await.unwrap();

        // A token without a role claim cannot end the call.
        let mut roleless = TestUser::patient("roleless@example.com").to_user();
        roleless.role = None;
        assert_matches!(
            handle_frame(&relay, "room", "pat", &roleless, ClientFrame::End).await,
            Err(SignalingError::ValidationError(_))
        );

        let patient = TestUser::patient("patient@example.com").to_user();
        assert_matches!(
            handle_frame(&relay, "room", "pat", &patient, ClientFrame::End).await,
            Err(SignalingError::ValidationError(_))
        );
        assert_eq!(relay.active_room_count().await, 1);

        let doctor = TestUser::doctor("doctor@example.com").to_user();
        assert_matches!(
            handle_frame(&relay, "room", "doc", &doctor, ClientFrame::End).await,
            Ok(FrameOutcome::Departed)
        );
        assert_eq!(relay.active_room_count().await, 0);
    }

    #[tokio::test]
    async fn test_leave_frame_departs() {
        let relay = SignalingRelay::new(8);
        let (_, _rx) = relay.join("room", Some("pat".into()), "patient-user", "patient").await.unwrap();
        let patient = TestUser::patient("patient@example.com").to_user();

        assert_matches!(
            handle_frame(&relay, "room", "pat", &patient, ClientFrame::Leave).await,
            Ok(FrameOutcome::Departed)
        );
        assert_matches!(
            handle_frame(&relay, "room", "pat", &patient, ClientFrame::Mute { audio_muted: true, video_muted: false }).await,
            Err(SignalingError::RoomNotFound)
        );
    }
}
