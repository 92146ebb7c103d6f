use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{InsuranceClaim, InsuranceError, ServiceType};
use crate::services::coverage::InsuranceCoverageService;
use crate::services::estimator::estimate;

/// Claim registry. Claims are immutable once submitted.
pub struct InsuranceClaimService {
    coverage: Arc<InsuranceCoverageService>,
    claims: RwLock<HashMap<String, InsuranceClaim>>,
}

impl InsuranceClaimService {
    pub fn new(coverage: Arc<InsuranceCoverageService>) -> Self {
        Self {
            coverage,
            claims: RwLock::new(HashMap::new()),
        }
    }

    /// Submit a claim for a prescription at the patient's prescription
    /// coverage rate.
    pub async fn submit_prescription_claim(
        &self,
        prescription_id: Uuid,
        patient_id: Uuid,
        total_cost: f64,
    ) -> Result<InsuranceClaim, InsuranceError> {
        let provider = self.coverage.provider_for_patient(patient_id)?;
        let service_type = ServiceType::Prescription.to_string();
        let split = estimate(&service_type, total_cost, &provider.coverage)?;
        let eligibility = self.coverage.check_eligibility(patient_id, &service_type);

        let claim = InsuranceClaim {
            claim_number: generate_claim_number(),
            prescription_id,
            patient_id,
            policy_number: provider.policy_number(patient_id),
            provider_code: provider.code,
            provider_name: provider.name,
            service_type: ServiceType::Prescription,
            total_cost: split.base_cost,
            insurance_coverage: split.insurance_coverage,
            patient_cost: split.patient_cost,
            coverage_percentage: split.coverage_percentage,
            approved: eligibility.eligible,
            submitted_at: Utc::now(),
        };

        self.claims
            .write()
            .await
            .insert(claim.claim_number.clone(), claim.clone());

        info!(
            "Submitted insurance claim {} for prescription {} (approved: {})",
            claim.claim_number, prescription_id, claim.approved
        );

        Ok(claim)
    }

    pub async fn get_claim(&self, claim_number: &str) -> Result<InsuranceClaim, InsuranceError> {
        debug!("Looking up insurance claim {}", claim_number);

        self.claims
            .read()
            .await
            .get(claim_number)
            .cloned()
            .ok_or(InsuranceError::ClaimNotFound)
    }

    /// Claims filed for one prescription, oldest first.
    pub async fn claims_for_prescription(&self, prescription_id: Uuid) -> Vec<InsuranceClaim> {
        let mut claims: Vec<InsuranceClaim> = self
            .claims
            .read()
            .await
            .values()
            .filter(|claim| claim.prescription_id == prescription_id)
            .cloned()
            .collect();

        claims.sort_by_key(|claim| claim.submitted_at);
        claims
    }
}

fn generate_claim_number() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..0x100_0000);
    format!("CLM{}{:06X}", Utc::now().timestamp_millis(), suffix)
}
