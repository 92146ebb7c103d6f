pub mod relay;

pub use relay::SignalingRelay;
