use chrono::{Duration, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{
    CostEstimate, CoverageSummary, InsuranceEligibility, InsuranceError, InsuranceProvider,
    ServiceType,
};
use crate::services::estimator::estimate;

/// Provider catalogue plus the patient-to-provider mapping. Every patient is
/// enrolled with the configured default provider.
pub struct InsuranceCoverageService {
    providers: Vec<InsuranceProvider>,
    default_provider: Option<InsuranceProvider>,
}

impl InsuranceCoverageService {
    pub fn new(default_provider_code: &str) -> Self {
        let providers = InsuranceProvider::supported();
        let default_provider = providers
            .iter()
            .find(|p| p.code.eq_ignore_ascii_case(default_provider_code.trim()))
            .cloned();

        if default_provider.is_none() {
            warn!(
                "Default insurance provider {} is not supported, patients will have no coverage",
                default_provider_code
            );
        }

        Self { providers, default_provider }
    }

    pub fn providers(&self) -> &[InsuranceProvider] {
        &self.providers
    }

    /// Case-insensitive substring match on provider name or code.
    pub fn find_provider(&self, name: &str) -> Result<InsuranceProvider, InsuranceError> {
        let needle = name.trim().to_ascii_lowercase();
        if needle.is_empty() {
            return Err(InsuranceError::ValidationError("Provider name is required".to_string()));
        }

        self.providers
            .iter()
            .find(|p| {
                p.name.to_ascii_lowercase().contains(&needle)
                    || p.code.to_ascii_lowercase().contains(&needle)
            })
            .cloned()
            .ok_or_else(|| InsuranceError::UnknownProvider(name.to_string()))
    }

    pub fn provider_for_patient(&self, patient_id: Uuid) -> Result<InsuranceProvider, InsuranceError> {
        debug!("Resolving insurance provider for patient {}", patient_id);

        self.default_provider
            .clone()
            .ok_or_else(|| InsuranceError::UnknownProvider("default".to_string()))
    }

    pub fn check_eligibility(&self, patient_id: Uuid, service_type: &str) -> InsuranceEligibility {
        let service_name = service_type.trim().to_ascii_lowercase();

        let provider = match self.provider_for_patient(patient_id) {
            Ok(provider) => provider,
            Err(_) => {
                return InsuranceEligibility {
                    eligible: false,
                    service_type: service_name,
                    coverage_percentage: 0.0,
                    reason: "No insurance coverage found".to_string(),
                    provider_code: None,
                    provider_name: None,
                    policy_number: None,
                    effective_date: None,
                    expiration_date: None,
                };
            }
        };

        let coverage_percentage = provider.coverage.coverage_for_name(&service_name);
        let eligible = coverage_percentage > 0.0;
        let reason = if eligible {
            format!("Covered at {}% by {}", coverage_percentage, provider.name)
        } else {
            format!("Service type '{}' is not covered by {}", service_name, provider.name)
        };

        let now = Utc::now();
        InsuranceEligibility {
            eligible,
            service_type: service_name,
            coverage_percentage,
            reason,
            policy_number: Some(provider.policy_number(patient_id)),
            provider_code: Some(provider.code),
            provider_name: Some(provider.name),
            effective_date: Some(now - Duration::days(365)),
            expiration_date: Some(now + Duration::days(365)),
        }
    }

    pub fn coverage_summary(&self, patient_id: Uuid) -> CoverageSummary {
        let check = |service: ServiceType| self.check_eligibility(patient_id, &service.to_string());

        CoverageSummary {
            patient_id,
            prescription_coverage: check(ServiceType::Prescription),
            consultation_coverage: check(ServiceType::Consultation),
            appointment_coverage: check(ServiceType::Appointment),
            last_updated: Utc::now(),
        }
    }

    /// Estimate against an explicit provider, or the patient's own provider
    /// when none is named.
    pub fn estimate_cost(
        &self,
        service_type: &str,
        base_cost: f64,
        provider: Option<&str>,
        patient_id: Option<Uuid>,
    ) -> Result<CostEstimate, InsuranceError> {
        let provider = match (provider, patient_id) {
            (Some(name), _) => self.find_provider(name)?,
            (None, Some(patient_id)) => self.provider_for_patient(patient_id)?,
            (None, None) => self
                .default_provider
                .clone()
                .ok_or_else(|| InsuranceError::UnknownProvider("default".to_string()))?,
        };

        estimate(service_type, base_cost, &provider.coverage)
    }
}
