use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::{InsuranceClaimService, InsuranceCoverageService};

/// Services shared by every insurance route. The claim service is also handed
/// to the prescription cell so both see the same claim registry.
#[derive(Clone)]
pub struct InsuranceState {
    pub coverage: Arc<InsuranceCoverageService>,
    pub claims: Arc<InsuranceClaimService>,
}

impl InsuranceState {
    pub fn new(config: &AppConfig) -> Self {
        let coverage = Arc::new(InsuranceCoverageService::new(&config.insurance_default_provider));
        let claims = Arc::new(InsuranceClaimService::new(coverage.clone()));

        Self { coverage, claims }
    }
}

pub fn insurance_routes(config: Arc<AppConfig>, state: InsuranceState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/providers", get(handlers::list_providers))
        .route("/providers/{name}", get(handlers::get_provider));

    let protected_routes = Router::new()
        .route(
            "/estimate-cost",
            get(handlers::estimate_cost_query).post(handlers::estimate_cost_body),
        )
        .route("/coverage-summary", get(handlers::coverage_summary))
        .route("/eligibility/{service_type}", get(handlers::check_eligibility))
        .route("/verify-coverage", post(handlers::verify_coverage))
        .route("/claims/{claim_number}", get(handlers::get_claim))
        .route(
            "/prescriptions/{prescription_id}/claims",
            get(handlers::prescription_claims),
        )
        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
