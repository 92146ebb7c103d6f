// libs/signaling-cell/src/lib.rs
//! # Signaling Cell
//!
//! Relays WebRTC negotiation messages (offers, answers, ICE candidates) and
//! call-control events between the peers of a consultation room. Media never
//! passes through here; only the small JSON messages peers need to find each
//! other.
//!
//! Delivery is best effort: each peer has a bounded queue and a message that
//! does not fit is dropped and logged. Messages never leave their room.
//!
//! ## API Endpoints
//!
//! - `GET /signaling/rooms/{room_id}/ws` - Join a room over WebSocket
//! - `POST /signaling/rooms/{room_id}/signal` - Relay a signal over HTTP
//! - `GET /signaling/rooms/{room_id}/status` - Room participants
//! - `POST /signaling/rooms/{room_id}/end` - End the session (doctor/admin)
//! - `POST /signaling/quality/metrics` - Submit call quality metrics
//! - `GET /signaling/health` - Health check (public)

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{
    CallQualityMetrics, CallSignal, ClientFrame, PeerInfo, RelayEventType, RelayMessage,
    RoomStatus, SignalType, SignalingError,
};
pub use router::{signaling_routes, SignalingState};
pub use services::SignalingRelay;
