use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{EstimateCostRequest, InsuranceError, VerifyCoverageRequest};
use crate::router::InsuranceState;

#[derive(Debug, Deserialize)]
pub struct PatientQuery {
    pub patient_id: Option<Uuid>,
}

fn map_insurance_error(error: InsuranceError) -> AppError {
    match error {
        InsuranceError::UnknownProvider(_) | InsuranceError::ClaimNotFound => {
            AppError::NotFound(error.to_string())
        }
        InsuranceError::ValidationError(msg) => AppError::ValidationError(msg),
    }
}

/// Whose coverage the caller is asking about. Patients only ever see their own;
/// doctors and admins must name the patient.
fn resolve_patient(user: &User, requested: Option<Uuid>) -> Result<Uuid, AppError> {
    if user.has_role("patient") {
        let own_id = user
            .uuid()
            .ok_or_else(|| AppError::Auth("Invalid user id in token".to_string()))?;

        return match requested {
            Some(patient_id) if patient_id != own_id => Err(AppError::Forbidden(
                "Patients can only access their own insurance information".to_string(),
            )),
            _ => Ok(own_id),
        };
    }

    if user.has_role("doctor") || user.is_admin() {
        return requested
            .ok_or_else(|| AppError::BadRequest("patient_id is required".to_string()));
    }

    Err(AppError::Forbidden("Not authorized to access insurance information".to_string()))
}

// ==============================================================================
// PUBLIC HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "insurance-cell",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

#[axum::debug_handler]
pub async fn list_providers(State(state): State<InsuranceState>) -> Json<Value> {
    let providers = state.coverage.providers();

    Json(json!({
        "providers": providers,
        "total": providers.len()
    }))
}

#[axum::debug_handler]
pub async fn get_provider(
    State(state): State<InsuranceState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, AppError> {
    let provider = state.coverage.find_provider(&name).map_err(map_insurance_error)?;

    Ok(Json(json!(provider)))
}

// ==============================================================================
// COST ESTIMATION
// ==============================================================================

#[axum::debug_handler]
pub async fn estimate_cost_query(
    State(state): State<InsuranceState>,
    Extension(user): Extension<User>,
    Query(request): Query<EstimateCostRequest>,
) -> Result<Json<Value>, AppError> {
    estimate_cost(&state, &user, request)
}

#[axum::debug_handler]
pub async fn estimate_cost_body(
    State(state): State<InsuranceState>,
    Extension(user): Extension<User>,
    Json(request): Json<EstimateCostRequest>,
) -> Result<Json<Value>, AppError> {
    estimate_cost(&state, &user, request)
}

fn estimate_cost(
    state: &InsuranceState,
    user: &User,
    request: EstimateCostRequest,
) -> Result<Json<Value>, AppError> {
    let patient_id = match (request.patient_id, user.has_role("patient")) {
        (None, false) => None,
        (requested, _) => Some(resolve_patient(user, requested)?),
    };

    let estimate = state
        .coverage
        .estimate_cost(
            &request.service_type,
            request.base_cost,
            request.provider.as_deref(),
            patient_id,
        )
        .map_err(map_insurance_error)?;

    Ok(Json(json!(estimate)))
}

// ==============================================================================
// COVERAGE & ELIGIBILITY
// ==============================================================================

#[axum::debug_handler]
pub async fn coverage_summary(
    State(state): State<InsuranceState>,
    Extension(user): Extension<User>,
    Query(query): Query<PatientQuery>,
) -> Result<Json<Value>, AppError> {
    let patient_id = resolve_patient(&user, query.patient_id)?;
    let summary = state.coverage.coverage_summary(patient_id);

    Ok(Json(json!(summary)))
}

#[axum::debug_handler]
pub async fn check_eligibility(
    State(state): State<InsuranceState>,
    Extension(user): Extension<User>,
    Path(service_type): Path<String>,
    Query(query): Query<PatientQuery>,
) -> Result<Json<Value>, AppError> {
    let patient_id = resolve_patient(&user, query.patient_id)?;
    let eligibility = state.coverage.check_eligibility(patient_id, &service_type);

    Ok(Json(json!(eligibility)))
}

#[axum::debug_handler]
pub async fn verify_coverage(
    State(state): State<InsuranceState>,
    Extension(user): Extension<User>,
    Json(request): Json<VerifyCoverageRequest>,
) -> Result<Json<Value>, AppError> {
    if request.service_type.trim().is_empty() {
        return Err(AppError::ValidationError("service_type is required".to_string()));
    }

    let patient_id = resolve_patient(&user, request.patient_id)?;
    let eligibility = state.coverage.check_eligibility(patient_id, &request.service_type);

    info!(
        "Coverage verified for patient {} ({}): eligible={}",
        patient_id, eligibility.service_type, eligibility.eligible
    );

    Ok(Json(json!({
        "patient_id": patient_id,
        "service_type": request.service_type,
        "eligibility": eligibility
    })))
}

// ==============================================================================
// CLAIMS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_claim(
    State(state): State<InsuranceState>,
    Extension(user): Extension<User>,
    Path(claim_number): Path<String>,
) -> Result<Json<Value>, AppError> {
    let claim = state
        .claims
        .get_claim(&claim_number)
        .await
        .map_err(map_insurance_error)?;

    if user.has_role("patient") && user.uuid() != Some(claim.patient_id) {
        return Err(AppError::NotFound(InsuranceError::ClaimNotFound.to_string()));
    }

    Ok(Json(json!(claim)))
}

#[axum::debug_handler]
pub async fn prescription_claims(
    State(state): State<InsuranceState>,
    Extension(user): Extension<User>,
    Path(prescription_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let mut claims = state.claims.claims_for_prescription(prescription_id).await;

    if user.has_role("patient") {
        let own_id = user.uuid();
        claims.retain(|claim| Some(claim.patient_id) == own_id);
    }

    Ok(Json(json!({
        "prescription_id": prescription_id,
        "claims": claims,
        "total": claims.len()
    })))
}
