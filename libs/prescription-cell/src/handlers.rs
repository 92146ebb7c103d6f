use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    CancelPrescriptionRequest, CreatePrescriptionRequest, PharmacyInfo, PrescriptionError,
    PrescriptionStatus, PrescriptionType,
};
use crate::router::PrescriptionState;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<usize>,
    pub size: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ExpiringQuery {
    pub days_ahead: Option<i64>,
}

fn map_prescription_error(error: PrescriptionError) -> AppError {
    match error {
        PrescriptionError::NotFound => AppError::NotFound(error.to_string()),
        PrescriptionError::InvalidTransition { .. }
        | PrescriptionError::RefillExhausted
        | PrescriptionError::Conflict => AppError::Conflict(error.to_string()),
        PrescriptionError::Expired => AppError::BadRequest(error.to_string()),
        PrescriptionError::ValidationError(msg) => AppError::ValidationError(msg),
        PrescriptionError::Unauthorized => AppError::Forbidden(error.to_string()),
        PrescriptionError::Signature(msg) => AppError::Internal(msg),
        PrescriptionError::DatabaseError(msg) => AppError::Database(msg),
    }
}

// ==============================================================================
// PUBLIC HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "prescription-cell",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

#[axum::debug_handler]
pub async fn prescription_types(State(state): State<PrescriptionState>) -> Json<Value> {
    let types: Vec<Value> = PrescriptionType::ALL
        .iter()
        .map(|t| json!({ "code": t, "name": t.display_name() }))
        .collect();

    let statuses: Vec<Value> = PrescriptionStatus::ALL
        .iter()
        .map(|s| json!({ "code": s, "next": state.service.valid_transitions(*s) }))
        .collect();

    Json(json!({
        "prescription_types": types,
        "statuses": statuses
    }))
}

// ==============================================================================
// LIFECYCLE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_prescription(
    State(state): State<PrescriptionState>,
    Extension(user): Extension<User>,
    Json(request): Json<CreatePrescriptionRequest>,
) -> Result<Json<Value>, AppError> {
    let prescription = state
        .service
        .create(request, &user)
        .await
        .map_err(map_prescription_error)?;

    Ok(Json(json!(prescription)))
}

#[axum::debug_handler]
pub async fn get_prescription(
    State(state): State<PrescriptionState>,
    Extension(user): Extension<User>,
    Path(prescription_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let prescription = state
        .service
        .get(prescription_id, &user)
        .await
        .map_err(map_prescription_error)?;

    Ok(Json(json!(prescription)))
}

#[axum::debug_handler]
pub async fn issue_prescription(
    State(state): State<PrescriptionState>,
    Extension(user): Extension<User>,
    Path(prescription_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let prescription = state
        .service
        .issue(prescription_id, &user)
        .await
        .map_err(map_prescription_error)?;

    Ok(Json(json!(prescription)))
}

#[axum::debug_handler]
pub async fn send_to_pharmacy(
    State(state): State<PrescriptionState>,
    Extension(user): Extension<User>,
    Path(prescription_id): Path<Uuid>,
    Json(pharmacy): Json<PharmacyInfo>,
) -> Result<Json<Value>, AppError> {
    let prescription = state
        .service
        .send_to_pharmacy(prescription_id, &pharmacy, &user)
        .await
        .map_err(map_prescription_error)?;

    Ok(Json(json!(prescription)))
}

#[axum::debug_handler]
pub async fn refill_prescription(
    State(state): State<PrescriptionState>,
    Extension(user): Extension<User>,
    Path(prescription_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let prescription = state
        .service
        .refill(prescription_id, &user)
        .await
        .map_err(map_prescription_error)?;

    Ok(Json(json!(prescription)))
}

#[axum::debug_handler]
pub async fn cancel_prescription(
    State(state): State<PrescriptionState>,
    Extension(user): Extension<User>,
    Path(prescription_id): Path<Uuid>,
    Json(request): Json<CancelPrescriptionRequest>,
) -> Result<Json<Value>, AppError> {
    let prescription = state
        .service
        .cancel(prescription_id, &request.reason, &user)
        .await
        .map_err(map_prescription_error)?;

    Ok(Json(json!(prescription)))
}

#[axum::debug_handler]
pub async fn verify_signature(
    State(state): State<PrescriptionState>,
    Extension(user): Extension<User>,
    Path(prescription_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let valid = state
        .service
        .verify_signature(prescription_id, &user)
        .await
        .map_err(map_prescription_error)?;

    Ok(Json(json!({
        "prescription_id": prescription_id,
        "valid": valid
    })))
}

// ==============================================================================
// LISTING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn doctor_prescriptions(
    State(state): State<PrescriptionState>,
    Extension(user): Extension<User>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, AppError> {
    let page = state
        .service
        .list_for_doctor(&user, query.page, query.size)
        .await
        .map_err(map_prescription_error)?;

    Ok(Json(json!(page)))
}

#[axum::debug_handler]
pub async fn patient_prescriptions(
    State(state): State<PrescriptionState>,
    Extension(user): Extension<User>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, AppError> {
    let page = state
        .service
        .list_for_patient(&user, query.page, query.size)
        .await
        .map_err(map_prescription_error)?;

    Ok(Json(json!(page)))
}

#[axum::debug_handler]
pub async fn active_prescriptions(
    State(state): State<PrescriptionState>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let prescriptions = state
        .service
        .active_for_patient(&user)
        .await
        .map_err(map_prescription_error)?;

    Ok(Json(json!({
        "prescriptions": prescriptions,
        "total": prescriptions.len()
    })))
}

#[axum::debug_handler]
pub async fn expiring_prescriptions(
    State(state): State<PrescriptionState>,
    Extension(user): Extension<User>,
    Query(query): Query<ExpiringQuery>,
) -> Result<Json<Value>, AppError> {
    let prescriptions = state
        .service
        .expiring_for_patient(&user, query.days_ahead)
        .await
        .map_err(map_prescription_error)?;

    Ok(Json(json!({
        "prescriptions": prescriptions,
        "total": prescriptions.len()
    })))
}
