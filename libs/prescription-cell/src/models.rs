// libs/prescription-cell/src/models.rs
use chrono::{DateTime, Duration, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

// ==============================================================================
// ENUMS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrescriptionType {
    Acute,
    Chronic,
    Repeat,
    Emergency,
    ControlledSubstance,
    OverTheCounter,
    SpecialistPrescription,
}

impl PrescriptionType {
    pub const ALL: [PrescriptionType; 7] = [
        PrescriptionType::Acute,
        PrescriptionType::Chronic,
        PrescriptionType::Repeat,
        PrescriptionType::Emergency,
        PrescriptionType::ControlledSubstance,
        PrescriptionType::OverTheCounter,
        PrescriptionType::SpecialistPrescription,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            PrescriptionType::Acute => "Acute Treatment",
            PrescriptionType::Chronic => "Chronic Condition",
            PrescriptionType::Repeat => "Repeat Prescription",
            PrescriptionType::Emergency => "Emergency Prescription",
            PrescriptionType::ControlledSubstance => "Controlled Substance",
            PrescriptionType::OverTheCounter => "Over the Counter",
            PrescriptionType::SpecialistPrescription => "Specialist Prescription",
        }
    }

    /// Last valid day for a prescription of this type issued on `issue_date`.
    pub fn valid_until(&self, issue_date: NaiveDate) -> NaiveDate {
        match self {
            PrescriptionType::Chronic => issue_date
                .checked_add_months(Months::new(12))
                .unwrap_or(NaiveDate::MAX),
            _ => issue_date + Duration::days(30),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrescriptionStatus {
    Draft,
    Issued,
    SentToPharmacy,
    PartiallyDispensed,
    Cancelled,
}

impl PrescriptionStatus {
    pub const ALL: [PrescriptionStatus; 5] = [
        PrescriptionStatus::Draft,
        PrescriptionStatus::Issued,
        PrescriptionStatus::SentToPharmacy,
        PrescriptionStatus::PartiallyDispensed,
        PrescriptionStatus::Cancelled,
    ];

    /// Statuses in which the patient can still collect medication.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            PrescriptionStatus::Issued
                | PrescriptionStatus::SentToPharmacy
                | PrescriptionStatus::PartiallyDispensed
        )
    }
}

impl fmt::Display for PrescriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PrescriptionStatus::Draft => "DRAFT",
            PrescriptionStatus::Issued => "ISSUED",
            PrescriptionStatus::SentToPharmacy => "SENT_TO_PHARMACY",
            PrescriptionStatus::PartiallyDispensed => "PARTIALLY_DISPENSED",
            PrescriptionStatus::Cancelled => "CANCELLED",
        };
        write!(f, "{}", label)
    }
}

// ==============================================================================
// PRESCRIPTION MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrescriptionMedication {
    pub medication_name: String,
    pub strength: String,
    pub dosage_form: String,
    pub dosage_instructions: String,
    pub quantity: u32,
    pub frequency: Option<String>,
    pub duration: Option<String>,
    pub route_of_administration: Option<String>,
    #[serde(default = "default_substitution_allowed")]
    pub substitution_allowed: bool,
    pub cost_estimate: Option<f64>,
}

fn default_substitution_allowed() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prescription {
    pub id: Uuid,
    pub prescription_number: String,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub consultation_id: Option<Uuid>,
    pub appointment_id: Option<Uuid>,
    pub prescription_type: PrescriptionType,
    pub diagnosis: String,
    pub symptoms: String,
    pub instructions: String,
    pub warnings: Option<String>,
    pub notes: Option<String>,
    pub medications: Vec<PrescriptionMedication>,
    pub status: PrescriptionStatus,
    pub issue_date: NaiveDate,
    pub valid_until: NaiveDate,
    pub issued_at: Option<DateTime<Utc>>,
    pub refills_allowed: u32,
    pub refills_remaining: u32,
    pub pharmacy_name: Option<String>,
    pub pharmacy_address: Option<String>,
    pub pharmacy_phone: Option<String>,
    pub digital_signature: Option<String>,
    pub verification_code: String,
    pub qr_code: String,
    pub insurance_approved: bool,
    pub insurance_claim_number: Option<String>,
    pub total_cost: Option<f64>,
    pub patient_cost: Option<f64>,
    pub insurance_coverage: Option<f64>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Prescription {
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.valid_until < today
    }

    pub fn is_active(&self, today: NaiveDate) -> bool {
        self.status.is_active() && !self.is_expired(today)
    }
}

// ==============================================================================
// REQUEST / RESPONSE MODELS
// ==============================================================================

/// `refills_remaining` is deliberately absent: it always starts at
/// `refills_allowed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePrescriptionRequest {
    pub patient_id: Uuid,
    pub consultation_id: Option<Uuid>,
    pub appointment_id: Option<Uuid>,
    pub prescription_type: PrescriptionType,
    pub diagnosis: String,
    #[serde(default)]
    pub symptoms: String,
    #[serde(default)]
    pub instructions: String,
    pub warnings: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub medications: Vec<PrescriptionMedication>,
    #[serde(default)]
    pub refills_allowed: u32,
    #[serde(default)]
    pub insurance_requested: bool,
    pub total_cost: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PharmacyInfo {
    pub pharmacy_name: String,
    pub pharmacy_address: Option<String>,
    pub pharmacy_phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelPrescriptionRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescriptionPage {
    pub items: Vec<Prescription>,
    pub page: usize,
    pub size: usize,
    pub total: usize,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PrescriptionError {
    #[error("Prescription not found")]
    NotFound,

    #[error("Cannot {action} a prescription in status {from}")]
    InvalidTransition {
        from: PrescriptionStatus,
        action: String,
    },

    #[error("No refills remaining")]
    RefillExhausted,

    #[error("Prescription has expired")]
    Expired,

    #[error("Unauthorized access to prescription")]
    Unauthorized,

    #[error("Prescription was modified concurrently, retry the request")]
    Conflict,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Signature error: {0}")]
    Signature(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl PrescriptionError {
    pub fn invalid_transition(from: PrescriptionStatus, action: &str) -> Self {
        PrescriptionError::InvalidTransition {
            from,
            action: action.to_string(),
        }
    }
}

#[cfg(test)]
impl Prescription {
    /// A DRAFT acute prescription issued today with the given refill budget.
    pub(crate) fn sample_draft(refills_allowed: u32) -> Self {
        let now = Utc::now();
        let today = now.date_naive();

        Prescription {
            id: Uuid::new_v4(),
            prescription_number: "RX1700000000000ABCDEF12".to_string(),
            doctor_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            consultation_id: None,
            appointment_id: None,
            prescription_type: PrescriptionType::Acute,
            diagnosis: "Acute bronchitis".to_string(),
            symptoms: "Cough".to_string(),
            instructions: "Take after meals".to_string(),
            warnings: None,
            notes: None,
            medications: vec![],
            status: PrescriptionStatus::Draft,
            issue_date: today,
            valid_until: PrescriptionType::Acute.valid_until(today),
            issued_at: None,
            refills_allowed,
            refills_remaining: refills_allowed,
            pharmacy_name: None,
            pharmacy_address: None,
            pharmacy_phone: None,
            digital_signature: None,
            verification_code: "0A1B2C3D".to_string(),
            qr_code: "QR_RX1700000000000ABCDEF12".to_string(),
            insurance_approved: false,
            insurance_claim_number: None,
            total_cost: None,
            patient_cost: None,
            insurance_coverage: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_wire_format() {
        assert_eq!(
            serde_json::to_value(PrescriptionType::ControlledSubstance).unwrap(),
            "CONTROLLED_SUBSTANCE"
        );
        assert_eq!(
            serde_json::to_value(PrescriptionStatus::SentToPharmacy).unwrap(),
            "SENT_TO_PHARMACY"
        );
        assert_eq!(PrescriptionStatus::PartiallyDispensed.to_string(), "PARTIALLY_DISPENSED");
    }

    #[test]
    fn test_validity_window() {
        let issued = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(
            PrescriptionType::Chronic.valid_until(issued),
            NaiveDate::from_ymd_opt(2025, 2, 28).unwrap()
        );
        assert_eq!(
            PrescriptionType::Emergency.valid_until(issued),
            NaiveDate::from_ymd_opt(2024, 3, 30).unwrap()
        );
    }

    #[test]
    fn test_transition_error_message() {
        let error = PrescriptionError::invalid_transition(PrescriptionStatus::Issued, "issue");
        assert_eq!(error.to_string(), "Cannot issue a prescription in status ISSUED");
    }
}
