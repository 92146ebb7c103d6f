use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::PrescriptionService;

#[derive(Clone)]
pub struct PrescriptionState {
    pub service: Arc<PrescriptionService>,
}

impl PrescriptionState {
    pub fn new(service: PrescriptionService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

pub fn prescription_routes(config: Arc<AppConfig>, state: PrescriptionState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/types", get(handlers::prescription_types));

    let protected_routes = Router::new()
        .route("/create", post(handlers::create_prescription))
        .route("/doctor/prescriptions", get(handlers::doctor_prescriptions))
        .route("/patient/prescriptions", get(handlers::patient_prescriptions))
        .route("/patient/active", get(handlers::active_prescriptions))
        .route("/patient/expiring", get(handlers::expiring_prescriptions))
        .route("/{prescription_id}", get(handlers::get_prescription))
        .route("/{prescription_id}/issue", post(handlers::issue_prescription))
        .route("/{prescription_id}/send-to-pharmacy", post(handlers::send_to_pharmacy))
        .route("/{prescription_id}/refill", post(handlers::refill_prescription))
        .route("/{prescription_id}/cancel", post(handlers::cancel_prescription))
        .route("/{prescription_id}/verify-signature", get(handlers::verify_signature))
        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
