use std::sync::Arc;

use axum::{routing::get, Router};
use tracing::info;

use insurance_cell::{insurance_routes, InsuranceState};
use prescription_cell::{
    prescription_routes, InMemoryPrescriptionStore, PrescriptionService, PrescriptionState,
    PrescriptionStore, SupabasePrescriptionStore,
};
use shared_config::{AppConfig, PrescriptionStoreKind};
use shared_database::supabase::SupabaseClient;
use signaling_cell::{signaling_routes, SignalingState};

fn prescription_store(config: &AppConfig) -> Arc<dyn PrescriptionStore> {
    match config.prescription_store {
        PrescriptionStoreKind::Memory => {
            info!("Prescriptions are kept in memory and lost on restart");
            Arc::new(InMemoryPrescriptionStore::new())
        }
        PrescriptionStoreKind::Supabase => {
            let client = Arc::new(SupabaseClient::new(config));
            Arc::new(SupabasePrescriptionStore::new(client))
        }
    }
}

pub fn create_router(config: Arc<AppConfig>) -> Router {
    let insurance = InsuranceState::new(&config);

    // Prescriptions file their claims with the same registry the insurance
    // endpoints read from.
    let prescriptions = PrescriptionState::new(PrescriptionService::new(
        prescription_store(&config),
        insurance.claims.clone(),
        &config,
    ));

    let signaling = SignalingState::new(&config);

    Router::new()
        .route("/", get(|| async { "Telehealth API is running!" }))
        .nest("/prescription", prescription_routes(config.clone(), prescriptions))
        .nest("/insurance", insurance_routes(config.clone(), insurance))
        .nest("/signaling", signaling_routes(config, signaling))
}
