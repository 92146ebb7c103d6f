use crate::models::{CostEstimate, CoverageTable, InsuranceError};

/// Round half away from zero to two decimals.
pub fn round_currency(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Split `base_cost` between insurer and patient using the coverage rate
/// `table` publishes for `service_type`. Unrecognised service types are
/// uncovered and the patient pays the full amount.
pub fn estimate(
    service_type: &str,
    base_cost: f64,
    table: &CoverageTable,
) -> Result<CostEstimate, InsuranceError> {
    if !base_cost.is_finite() || base_cost < 0.0 {
        return Err(InsuranceError::ValidationError(format!(
            "Base cost must be a non-negative amount, got {}",
            base_cost
        )));
    }

    let coverage_percentage = table.coverage_for_name(service_type);
    let patient_cost = round_currency(base_cost * (1.0 - coverage_percentage / 100.0));
    let insurance_coverage = round_currency(base_cost - patient_cost);

    Ok(CostEstimate {
        service_type: service_type.trim().to_ascii_lowercase(),
        base_cost,
        coverage_percentage,
        insurance_coverage,
        patient_cost,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn table(consultation: f64, prescription: f64, appointment: f64) -> CoverageTable {
        CoverageTable { consultation, prescription, appointment }
    }

    #[test]
    fn test_thirty_percent_coverage() {
        let estimate = estimate("prescription", 100.0, &table(0.0, 30.0, 0.0)).unwrap();

        assert_eq!(estimate.coverage_percentage, 30.0);
        assert_eq!(estimate.patient_cost, 70.0);
        assert_eq!(estimate.insurance_coverage, 30.0);
    }

    #[test]
    fn test_service_type_matching_ignores_case() {
        let estimate = estimate("Consultation", 120.0, &table(80.0, 70.0, 90.0)).unwrap();

        assert_eq!(estimate.service_type, "consultation");
        assert_eq!(estimate.patient_cost, 24.0);
        assert_eq!(estimate.insurance_coverage, 96.0);
    }

    #[test]
    fn test_unknown_service_type_pays_full_price() {
        let estimate = estimate("dental", 80.0, &table(80.0, 70.0, 90.0)).unwrap();

        assert_eq!(estimate.coverage_percentage, 0.0);
        assert_eq!(estimate.patient_cost, 80.0);
        assert_eq!(estimate.insurance_coverage, 0.0);
    }

    #[test]
    fn test_amounts_are_rounded_to_cents() {
        let estimate = estimate("prescription", 19.99, &table(0.0, 65.0, 0.0)).unwrap();

        assert_eq!(estimate.patient_cost, 7.0);
        assert_eq!(estimate.insurance_coverage, 12.99);
    }

    #[test]
    fn test_zero_cost() {
        let estimate = estimate("appointment", 0.0, &table(80.0, 70.0, 90.0)).unwrap();
        assert_eq!(estimate.patient_cost, 0.0);
        assert_eq!(estimate.insurance_coverage, 0.0);
    }

    #[test]
    fn test_invalid_cost_rejected() {
        let coverage = table(80.0, 70.0, 90.0);
        assert_matches!(estimate("consultation", -1.0, &coverage), Err(InsuranceError::ValidationError(_)));
        assert_matches!(estimate("consultation", f64::NAN, &coverage), Err(InsuranceError::ValidationError(_)));
        assert_matches!(estimate("consultation", f64::INFINITY, &coverage), Err(InsuranceError::ValidationError(_)));
    }
}
