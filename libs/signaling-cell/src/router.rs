use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::SignalingRelay;

#[derive(Clone)]
pub struct SignalingState {
    pub relay: Arc<SignalingRelay>,
}

impl SignalingState {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            relay: Arc::new(SignalingRelay::new(config.signaling_channel_capacity)),
        }
    }
}

pub fn signaling_routes(config: Arc<AppConfig>, state: SignalingState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check));

    // The WebSocket route authenticates like the others; browsers pass the
    // token as `?access_token=` since they cannot set headers on the handshake.
    let protected_routes = Router::new()
        .route("/rooms/{room_id}/ws", get(handlers::room_socket))
        .route("/rooms/{room_id}/signal", post(handlers::relay_signal))
        .route("/rooms/{room_id}/status", get(handlers::room_status))
        .route("/rooms/{room_id}/end", post(handlers::end_session))
        .route("/quality/metrics", post(handlers::submit_quality_metrics))
        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
