// libs/insurance-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

// ==============================================================================
// PROVIDER & COVERAGE MODELS
// ==============================================================================

/// Service categories a provider publishes a coverage rate for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Consultation,
    Prescription,
    Appointment,
}

impl ServiceType {
    pub const ALL: [ServiceType; 3] = [
        ServiceType::Prescription,
        ServiceType::Consultation,
        ServiceType::Appointment,
    ];

    /// Case-insensitive lookup. Anything unrecognised is `None`, which callers
    /// treat as an uncovered service.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "consultation" => Some(ServiceType::Consultation),
            "prescription" => Some(ServiceType::Prescription),
            "appointment" => Some(ServiceType::Appointment),
            _ => None,
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceType::Consultation => write!(f, "consultation"),
            ServiceType::Prescription => write!(f, "prescription"),
            ServiceType::Appointment => write!(f, "appointment"),
        }
    }
}

/// Coverage percentages (0-100) per service type for one provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CoverageTable {
    pub consultation: f64,
    pub prescription: f64,
    pub appointment: f64,
}

impl CoverageTable {
    pub fn coverage_for(&self, service_type: ServiceType) -> f64 {
        match service_type {
            ServiceType::Consultation => self.consultation,
            ServiceType::Prescription => self.prescription,
            ServiceType::Appointment => self.appointment,
        }
    }

    /// Coverage for a raw service-type string; unknown types get 0%.
    pub fn coverage_for_name(&self, service_type: &str) -> f64 {
        ServiceType::parse(service_type)
            .map(|service| self.coverage_for(service))
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InsuranceProvider {
    pub code: String,
    pub name: String,
    pub policy_prefix: String,
    pub coverage: CoverageTable,
}

impl InsuranceProvider {
    fn new(code: &str, name: &str, policy_prefix: &str, consultation: f64, prescription: f64, appointment: f64) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            policy_prefix: policy_prefix.to_string(),
            coverage: CoverageTable { consultation, prescription, appointment },
        }
    }

    /// Supported providers and their published coverage rates.
    pub fn supported() -> Vec<InsuranceProvider> {
        vec![
            Self::new("BLUE_CROSS", "Blue Cross Blue Shield", "BC", 80.0, 70.0, 90.0),
            Self::new("AETNA", "Aetna", "AE", 75.0, 65.0, 85.0),
            Self::new("CIGNA", "Cigna", "CI", 78.0, 68.0, 88.0),
            Self::new("UNITED_HEALTH", "United Healthcare", "UH", 82.0, 72.0, 92.0),
            Self::new("HUMANA", "Humana", "HU", 76.0, 66.0, 86.0),
        ]
    }

    pub fn policy_number(&self, patient_id: Uuid) -> String {
        format!("{}{}001", self.policy_prefix, patient_id.simple())
    }
}

// ==============================================================================
// ESTIMATION & ELIGIBILITY MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostEstimate {
    pub service_type: String,
    pub base_cost: f64,
    pub coverage_percentage: f64,
    pub insurance_coverage: f64,
    pub patient_cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsuranceEligibility {
    pub eligible: bool,
    pub service_type: String,
    pub coverage_percentage: f64,
    pub reason: String,
    pub provider_code: Option<String>,
    pub provider_name: Option<String>,
    pub policy_number: Option<String>,
    pub effective_date: Option<DateTime<Utc>>,
    pub expiration_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageSummary {
    pub patient_id: Uuid,
    pub prescription_coverage: InsuranceEligibility,
    pub consultation_coverage: InsuranceEligibility,
    pub appointment_coverage: InsuranceEligibility,
    pub last_updated: DateTime<Utc>,
}

// ==============================================================================
// CLAIM MODELS
// ==============================================================================

/// Claim derived from a prescription at creation time. Never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InsuranceClaim {
    pub claim_number: String,
    pub prescription_id: Uuid,
    pub patient_id: Uuid,
    pub provider_code: String,
    pub provider_name: String,
    pub policy_number: String,
    pub service_type: ServiceType,
    pub total_cost: f64,
    pub insurance_coverage: f64,
    pub patient_cost: f64,
    pub coverage_percentage: f64,
    pub approved: bool,
    pub submitted_at: DateTime<Utc>,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimateCostRequest {
    pub service_type: String,
    pub base_cost: f64,
    pub provider: Option<String>,
    pub patient_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyCoverageRequest {
    pub service_type: String,
    pub patient_id: Option<Uuid>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InsuranceError {
    #[error("Insurance provider not recognized: {0}")]
    UnknownProvider(String),

    #[error("Insurance claim not found")]
    ClaimNotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),
}
