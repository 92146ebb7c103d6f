// libs/prescription-cell/src/services/prescription.rs
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::Rng;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use insurance_cell::InsuranceClaimService;
use shared_config::AppConfig;
use shared_models::auth::User;

use crate::models::{
    CreatePrescriptionRequest, PharmacyInfo, Prescription, PrescriptionError, PrescriptionPage,
    PrescriptionStatus,
};
use crate::services::lifecycle::PrescriptionLifecycleService;
use crate::services::signature::PrescriptionSigner;
use crate::services::store::PrescriptionStore;

const COST_PER_MEDICATION: f64 = 25.0;
const FALLBACK_PRESCRIPTION_COST: f64 = 50.0;
const DEFAULT_PAGE_SIZE: usize = 10;
const MAX_PAGE_SIZE: usize = 100;
pub const DEFAULT_EXPIRY_WINDOW_DAYS: i64 = 7;

/// Who may run an operation against an existing prescription.
#[derive(Debug, Clone, Copy)]
enum Access {
    Prescriber,
    Patient,
    PrescriberOrPatient,
}

pub struct PrescriptionService {
    store: Arc<dyn PrescriptionStore>,
    claims: Arc<InsuranceClaimService>,
    signer: PrescriptionSigner,
    lifecycle: PrescriptionLifecycleService,
    record_locks: RwLock<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl PrescriptionService {
    pub fn new(
        store: Arc<dyn PrescriptionStore>,
        claims: Arc<InsuranceClaimService>,
        config: &AppConfig,
    ) -> Self {
        Self {
            store,
            claims,
            signer: PrescriptionSigner::new(&config.prescription_signing_secret),
            lifecycle: PrescriptionLifecycleService::new(),
            record_locks: RwLock::new(HashMap::new()),
        }
    }

    // ==========================================================================
    // AUTHORIZATION HELPERS
    // ==========================================================================

    fn caller_id(user: &User) -> Result<Uuid, PrescriptionError> {
        user.uuid().ok_or(PrescriptionError::Unauthorized)
    }

    fn require_role(user: &User, role: &str) -> Result<Uuid, PrescriptionError> {
        if !user.has_role(role) {
            return Err(PrescriptionError::Unauthorized);
        }
        Self::caller_id(user)
    }

    fn authorize(prescription: &Prescription, user: &User, access: Access) -> Result<(), PrescriptionError> {
        let caller = Self::caller_id(user)?;
        let is_prescriber = user.has_role("doctor") && prescription.doctor_id == caller;
        let is_patient = user.has_role("patient") && prescription.patient_id == caller;

        let allowed = match access {
            Access::Prescriber => is_prescriber,
            Access::Patient => is_patient,
            Access::PrescriberOrPatient => is_prescriber || is_patient,
        };

        if allowed {
            Ok(())
        } else {
            warn!("User {} denied access to prescription {}", user.id, prescription.id);
            Err(PrescriptionError::Unauthorized)
        }
    }

    // ==========================================================================
    // PER-RECORD SERIALIZATION
    // ==========================================================================

    async fn lock_for(&self, id: Uuid) -> Arc<Mutex<()>> {
        if let Some(lock) = self.record_locks.read().await.get(&id) {
            return lock.clone();
        }

        self.record_locks
            .write()
            .await
            .entry(id)
            .or_default()
            .clone()
    }

    /// Drop the registry entry once no other request holds or waits on it.
    async fn release_lock(&self, id: Uuid, lock: Arc<Mutex<()>>) {
        let mut locks = self.record_locks.write().await;
        // One reference in the map, one held here.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&id);
        }
    }

    /// Read-modify-write under the record lock. The write is still a
    /// version-checked update so other processes sharing the store are caught.
    async fn mutate<F>(
        &self,
        id: Uuid,
        user: &User,
        access: Access,
        apply: F,
    ) -> Result<Prescription, PrescriptionError>
    where
        F: FnOnce(&mut Prescription) -> Result<(), PrescriptionError>,
    {
        let lock = self.lock_for(id).await;

        let outcome = async {
            let _guard = lock.lock().await;

            let mut prescription = self.store.get(id).await?.ok_or(PrescriptionError::NotFound)?;
            Self::authorize(&prescription, user, access)?;

            let expected_version = prescription.version;
            apply(&mut prescription)?;
            prescription.updated_at = Utc::now();

            self.store.update(prescription, expected_version).await
        }
        .await;

        self.release_lock(id, lock).await;
        outcome
    }

    #[cfg(test)]
    async fn tracked_locks(&self) -> usize {
        self.record_locks.read().await.len()
    }

    // ==========================================================================
    // CREATION
    // ==========================================================================

    pub async fn create(
        &self,
        request: CreatePrescriptionRequest,
        user: &User,
    ) -> Result<Prescription, PrescriptionError> {
        let doctor_id = Self::require_role(user, "doctor")?;
        validate_create_request(&request)?;

        let now = Utc::now();
        let today = now.date_naive();
        let prescription_number = generate_prescription_number();

        let mut prescription = Prescription {
            id: Uuid::new_v4(),
            qr_code: format!("QR_{}", prescription_number),
            prescription_number,
            doctor_id,
            patient_id: request.patient_id,
            consultation_id: request.consultation_id,
            appointment_id: request.appointment_id,
            prescription_type: request.prescription_type,
            diagnosis: request.diagnosis.trim().to_string(),
            symptoms: request.symptoms,
            instructions: request.instructions,
            warnings: request.warnings,
            notes: request.notes,
            status: PrescriptionStatus::Draft,
            issue_date: today,
            valid_until: request.prescription_type.valid_until(today),
            issued_at: None,
            refills_allowed: request.refills_allowed,
            refills_remaining: request.refills_allowed,
            pharmacy_name: None,
            pharmacy_address: None,
            pharmacy_phone: None,
            digital_signature: None,
            verification_code: generate_verification_code(),
            insurance_approved: false,
            insurance_claim_number: None,
            total_cost: None,
            patient_cost: None,
            insurance_coverage: None,
            version: 1,
            created_at: now,
            updated_at: now,
            medications: request.medications,
        };

        if request.insurance_requested {
            let total_cost = estimated_total_cost(request.total_cost, &prescription);

            match self
                .claims
                .submit_prescription_claim(prescription.id, prescription.patient_id, total_cost)
                .await
            {
                Ok(claim) => {
                    prescription.insurance_approved = claim.approved;
                    prescription.insurance_claim_number = Some(claim.claim_number);
                    prescription.total_cost = Some(claim.total_cost);
                    prescription.patient_cost = Some(claim.patient_cost);
                    prescription.insurance_coverage = Some(claim.insurance_coverage);
                }
                Err(e) => {
                    warn!(
                        "Insurance claim for prescription {} failed, continuing without coverage: {}",
                        prescription.id, e
                    );
                    prescription.total_cost = Some(total_cost);
                }
            }
        }

        let saved = self.store.insert(prescription).await?;

        info!(
            "Prescription {} ({}) created by doctor {} for patient {}",
            saved.prescription_number, saved.id, saved.doctor_id, saved.patient_id
        );

        Ok(saved)
    }

    // ==========================================================================
    // LIFECYCLE OPERATIONS
    // ==========================================================================

    pub async fn issue(&self, id: Uuid, user: &User) -> Result<Prescription, PrescriptionError> {
        self.mutate(id, user, Access::Prescriber, |prescription| {
            self.lifecycle.issue(prescription, &self.signer, Utc::now())
        })
        .await
    }

    pub async fn send_to_pharmacy(
        &self,
        id: Uuid,
        pharmacy: &PharmacyInfo,
        user: &User,
    ) -> Result<Prescription, PrescriptionError> {
        self.mutate(id, user, Access::PrescriberOrPatient, |prescription| {
            self.lifecycle.send_to_pharmacy(prescription, pharmacy)
        })
        .await
    }

    pub async fn refill(&self, id: Uuid, user: &User) -> Result<Prescription, PrescriptionError> {
        self.mutate(id, user, Access::Patient, |prescription| {
            self.lifecycle.refill(prescription, Utc::now().date_naive())
        })
        .await
    }

    pub async fn cancel(
        &self,
        id: Uuid,
        reason: &str,
        user: &User,
    ) -> Result<Prescription, PrescriptionError> {
        self.mutate(id, user, Access::Prescriber, |prescription| {
            self.lifecycle.cancel(prescription, reason)
        })
        .await
    }

    pub fn valid_transitions(&self, status: PrescriptionStatus) -> Vec<PrescriptionStatus> {
        self.lifecycle.valid_transitions(status)
    }

    // ==========================================================================
    // QUERIES
    // ==========================================================================

    pub async fn get(&self, id: Uuid, user: &User) -> Result<Prescription, PrescriptionError> {
        let prescription = self.store.get(id).await?.ok_or(PrescriptionError::NotFound)?;

        if !user.is_admin() {
            Self::authorize(&prescription, user, Access::PrescriberOrPatient)?;
        }

        Ok(prescription)
    }

    pub async fn verify_signature(&self, id: Uuid, user: &User) -> Result<bool, PrescriptionError> {
        let prescription = self.get(id, user).await?;

        if prescription.digital_signature.is_none() {
            return Ok(false);
        }

        self.signer.verify(&prescription)
    }

    pub async fn list_for_doctor(
        &self,
        user: &User,
        page: Option<usize>,
        size: Option<usize>,
    ) -> Result<PrescriptionPage, PrescriptionError> {
        let doctor_id = Self::require_role(user, "doctor")?;
        let prescriptions = self.store.list_by_doctor(doctor_id).await?;

        Ok(paginate(prescriptions, page, size))
    }

    pub async fn list_for_patient(
        &self,
        user: &User,
        page: Option<usize>,
        size: Option<usize>,
    ) -> Result<PrescriptionPage, PrescriptionError> {
        let patient_id = Self::require_role(user, "patient")?;
        let prescriptions = self.store.list_by_patient(patient_id).await?;

        Ok(paginate(prescriptions, page, size))
    }

    pub async fn active_for_patient(&self, user: &User) -> Result<Vec<Prescription>, PrescriptionError> {
        let patient_id = Self::require_role(user, "patient")?;
        let today = Utc::now().date_naive();

        let active: Vec<Prescription> = self
            .store
            .list_by_patient(patient_id)
            .await?
            .into_iter()
            .filter(|p| p.is_active(today))
            .collect();

        debug!("Patient {} has {} active prescriptions", patient_id, active.len());
        Ok(active)
    }

    /// Active prescriptions whose last valid day falls inside the next
    /// `days_ahead` days.
    pub async fn expiring_for_patient(
        &self,
        user: &User,
        days_ahead: Option<i64>,
    ) -> Result<Vec<Prescription>, PrescriptionError> {
        let days_ahead = days_ahead.unwrap_or(DEFAULT_EXPIRY_WINDOW_DAYS);
        if !(0..=3650).contains(&days_ahead) {
            return Err(PrescriptionError::ValidationError(
                "days_ahead must be between 0 and 3650".to_string(),
            ));
        }

        let horizon = Utc::now().date_naive() + Duration::days(days_ahead);

        Ok(self
            .active_for_patient(user)
            .await?
            .into_iter()
            .filter(|p| p.valid_until < horizon)
            .collect())
    }
}

// ==============================================================================
// HELPERS
// ==============================================================================

fn validate_create_request(request: &CreatePrescriptionRequest) -> Result<(), PrescriptionError> {
    if request.diagnosis.trim().is_empty() {
        return Err(PrescriptionError::ValidationError("Diagnosis is required".to_string()));
    }

    if let Some(medication) = request
        .medications
        .iter()
        .find(|m| m.medication_name.trim().is_empty())
    {
        return Err(PrescriptionError::ValidationError(format!(
            "Medication name is required (strength {})",
            medication.strength
        )));
    }

    if let Some(total_cost) = request.total_cost {
        if !total_cost.is_finite() || total_cost < 0.0 {
            return Err(PrescriptionError::ValidationError(
                "total_cost must be a non-negative amount".to_string(),
            ));
        }
    }

    Ok(())
}

/// Cost submitted with an insurance claim: the caller's figure, otherwise a
/// flat rate per medication, otherwise a fixed fallback.
fn estimated_total_cost(requested: Option<f64>, prescription: &Prescription) -> f64 {
    match requested {
        Some(cost) => cost,
        None if !prescription.medications.is_empty() => {
            prescription.medications.len() as f64 * COST_PER_MEDICATION
        }
        None => FALLBACK_PRESCRIPTION_COST,
    }
}

fn paginate(prescriptions: Vec<Prescription>, page: Option<usize>, size: Option<usize>) -> PrescriptionPage {
    let page = page.unwrap_or(0);
    let size = size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let total = prescriptions.len();

    let items = prescriptions
        .into_iter()
        .skip(page.saturating_mul(size))
        .take(size)
        .collect();

    PrescriptionPage { items, page, size, total }
}

fn generate_prescription_number() -> String {
    let suffix: u32 = rand::thread_rng().gen();
    format!("RX{}{:08X}", Utc::now().timestamp_millis(), suffix)
}

fn generate_verification_code() -> String {
    let code: u32 = rand::thread_rng().gen();
    format!("{:08X}", code)
}
