// libs/prescription-cell/src/services/lifecycle.rs
use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::models::{PharmacyInfo, Prescription, PrescriptionError, PrescriptionStatus};
use crate::services::signature::PrescriptionSigner;

const PHONE_PATTERN: &str = r"^\+?[0-9][0-9 ()\-]{6,19}$";

/// Prescription state machine. Every operation either fully applies to the
/// record or leaves it untouched.
pub struct PrescriptionLifecycleService;

impl Default for PrescriptionLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}

impl PrescriptionLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Statuses reachable from `current`. Refills are an action, not a status,
    /// so they do not appear here.
    pub fn valid_transitions(&self, current: PrescriptionStatus) -> Vec<PrescriptionStatus> {
        match current {
            PrescriptionStatus::Draft => vec![
                PrescriptionStatus::Issued,
                PrescriptionStatus::Cancelled,
            ],
            PrescriptionStatus::Issued => vec![
                PrescriptionStatus::SentToPharmacy,
                PrescriptionStatus::Cancelled,
            ],
            PrescriptionStatus::SentToPharmacy => vec![
                PrescriptionStatus::PartiallyDispensed,
                PrescriptionStatus::Cancelled,
            ],
            PrescriptionStatus::PartiallyDispensed => vec![PrescriptionStatus::Cancelled],
            PrescriptionStatus::Cancelled => vec![],
        }
    }

    fn reject(&self, prescription: &Prescription, action: &str) -> PrescriptionError {
        warn!(
            "Rejected {} on prescription {} in status {}",
            action, prescription.id, prescription.status
        );
        PrescriptionError::invalid_transition(prescription.status, action)
    }

    pub fn issue(
        &self,
        prescription: &mut Prescription,
        signer: &PrescriptionSigner,
        now: DateTime<Utc>,
    ) -> Result<(), PrescriptionError> {
        if prescription.status != PrescriptionStatus::Draft {
            return Err(self.reject(prescription, "issue"));
        }

        // Stored at the precision the database keeps, so the signed and
        // reloaded instants match.
        let mut issued = prescription.clone();
        issued.issued_at = Some(now.trunc_subsecs(6));
        issued.digital_signature = Some(signer.sign(&issued)?);
        issued.status = PrescriptionStatus::Issued;
        *prescription = issued;

        info!("Prescription {} issued", prescription.id);
        Ok(())
    }

    pub fn send_to_pharmacy(
        &self,
        prescription: &mut Prescription,
        pharmacy: &PharmacyInfo,
    ) -> Result<(), PrescriptionError> {
        if prescription.status != PrescriptionStatus::Issued {
            return Err(self.reject(prescription, "send to pharmacy"));
        }

        let name = pharmacy.pharmacy_name.trim();
        if name.is_empty() {
            return Err(PrescriptionError::ValidationError("Pharmacy name is required".to_string()));
        }

        let phone = pharmacy
            .pharmacy_phone
            .as_deref()
            .map(str::trim)
            .filter(|phone| !phone.is_empty());

        if let Some(phone) = phone {
            let pattern = Regex::new(PHONE_PATTERN)
                .map_err(|e| PrescriptionError::ValidationError(e.to_string()))?;
            if !pattern.is_match(phone) {
                return Err(PrescriptionError::ValidationError(format!(
                    "Invalid pharmacy phone number: {}",
                    phone
                )));
            }
        }

        prescription.pharmacy_name = Some(name.to_string());
        prescription.pharmacy_address = pharmacy
            .pharmacy_address
            .as_deref()
            .map(str::trim)
            .filter(|address| !address.is_empty())
            .map(str::to_string);
        prescription.pharmacy_phone = phone.map(str::to_string);
        prescription.status = PrescriptionStatus::SentToPharmacy;

        info!("Prescription {} sent to pharmacy {}", prescription.id, name);
        Ok(())
    }

    pub fn refill(
        &self,
        prescription: &mut Prescription,
        today: NaiveDate,
    ) -> Result<(), PrescriptionError> {
        if !prescription.status.is_active() {
            return Err(self.reject(prescription, "refill"));
        }

        let remaining = prescription
            .refills_remaining
            .checked_sub(1)
            .ok_or(PrescriptionError::RefillExhausted)?;

        if prescription.is_expired(today) {
            return Err(PrescriptionError::Expired);
        }

        prescription.refills_remaining = remaining;
        if prescription.status == PrescriptionStatus::SentToPharmacy {
            prescription.status = PrescriptionStatus::PartiallyDispensed;
        }

        debug!(
            "Prescription {} refilled, {} of {} remaining",
            prescription.id, prescription.refills_remaining, prescription.refills_allowed
        );
        Ok(())
    }

    pub fn cancel(&self, prescription: &mut Prescription, reason: &str) -> Result<(), PrescriptionError> {
        if prescription.status == PrescriptionStatus::Cancelled {
            return Err(self.reject(prescription, "cancel"));
        }

        let reason = reason.trim();
        if reason.is_empty() {
            return Err(PrescriptionError::ValidationError("Cancellation reason is required".to_string()));
        }

        let entry = format!("Cancellation reason: {}", reason);
        prescription.notes = Some(match prescription.notes.take().filter(|n| !n.trim().is_empty()) {
            Some(existing) => format!("{}\n{}", existing, entry),
            None => entry,
        });
        prescription.status = PrescriptionStatus::Cancelled;

        info!("Prescription {} cancelled", prescription.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Duration;

    fn signer() -> PrescriptionSigner {
        PrescriptionSigner::new("lifecycle-test-secret")
    }

    fn pharmacy(phone: Option<&str>) -> PharmacyInfo {
        PharmacyInfo {
            pharmacy_name: "Corner Pharmacy".to_string(),
            pharmacy_address: Some("1 Main St".to_string()),
            pharmacy_phone: phone.map(str::to_string),
        }
    }

    fn issued(refills: u32) -> Prescription {
        let mut prescription = Prescription::sample_draft(refills);
        PrescriptionLifecycleService::new()
            .issue(&mut prescription, &signer(), Utc::now())
            .unwrap();
        prescription
    }

    #[test]
    fn test_issue_signs_draft_once() {
        let lifecycle = PrescriptionLifecycleService::new();
        let mut prescription = Prescription::sample_draft(1);

        lifecycle.issue(&mut prescription, &signer(), Utc::now()).unwrap();
        assert_eq!(prescription.status, PrescriptionStatus::Issued);
        assert!(prescription.issued_at.is_some());
        assert!(prescription.digital_signature.as_deref().is_some_and(|s| !s.is_empty()));
        assert!(signer().verify(&prescription).unwrap());
        assert_eq!(prescription.issued_at.map(|at| at.timestamp_subsec_nanos() % 1_000), Some(0));

        assert_matches!(
            lifecycle.issue(&mut prescription, &signer(), Utc::now()),
            Err(PrescriptionError::InvalidTransition { from: PrescriptionStatus::Issued, .. })
        );
    }

    #[test]
    fn test_failed_issue_leaves_draft_untouched() {
        let lifecycle = PrescriptionLifecycleService::new();
        let mut prescription = Prescription::sample_draft(1);
        let before = prescription.clone();

        let result = lifecycle.issue(&mut prescription, &PrescriptionSigner::new(""), Utc::now());
        assert_matches!(result, Err(PrescriptionError::Signature(_)));
        assert_eq!(prescription, before);
    }

    #[test]
    fn test_send_to_pharmacy_requires_issued() {
        let lifecycle = PrescriptionLifecycleService::new();

        let mut draft = Prescription::sample_draft(0);
        assert_matches!(
            lifecycle.send_to_pharmacy(&mut draft, &pharmacy(None)),
            Err(PrescriptionError::InvalidTransition { .. })
        );

        let mut prescription = issued(0);
        lifecycle.send_to_pharmacy(&mut prescription, &pharmacy(Some("+1 (555) 010-9999"))).unwrap();
        assert_eq!(prescription.status, PrescriptionStatus::SentToPharmacy);
        assert_eq!(prescription.pharmacy_name.as_deref(), Some("Corner Pharmacy"));
        assert_eq!(prescription.pharmacy_phone.as_deref(), Some("+1 (555) 010-9999"));
    }

    #[test]
    fn test_send_to_pharmacy_validates_input() {
        let lifecycle = PrescriptionLifecycleService::new();
        let mut prescription = issued(0);

        let mut blank = pharmacy(None);
        blank.pharmacy_name = "   ".to_string();
        assert_matches!(
            lifecycle.send_to_pharmacy(&mut prescription, &blank),
            Err(PrescriptionError::ValidationError(_))
        );
        assert_matches!(
            lifecycle.send_to_pharmacy(&mut prescription, &pharmacy(Some("call me"))),
            Err(PrescriptionError::ValidationError(_))
        );
        assert_eq!(prescription.status, PrescriptionStatus::Issued);
    }

    #[test]
    fn test_refill_counts_down_and_stops() {
        let lifecycle = PrescriptionLifecycleService::new();
        let today = Utc::now().date_naive();
        let mut prescription = issued(2);

        lifecycle.refill(&mut prescription, today).unwrap();
        lifecycle.refill(&mut prescription, today).unwrap();
        assert_eq!(prescription.refills_remaining, 0);
        assert_eq!(prescription.status, PrescriptionStatus::Issued);

        assert_matches!(
            lifecycle.refill(&mut prescription, today),
            Err(PrescriptionError::RefillExhausted)
        );
        assert_eq!(prescription.refills_remaining, 0);
    }

    #[test]
    fn test_refill_after_pharmacy_marks_partially_dispensed() {
        let lifecycle = PrescriptionLifecycleService::new();
        let today = Utc::now().date_naive();
        let mut prescription = issued(3);
        lifecycle.send_to_pharmacy(&mut prescription, &pharmacy(None)).unwrap();

        lifecycle.refill(&mut prescription, today).unwrap();
        assert_eq!(prescription.status, PrescriptionStatus::PartiallyDispensed);
        assert_eq!(prescription.refills_remaining, 2);

        lifecycle.refill(&mut prescription, today).unwrap();
        assert_eq!(prescription.status, PrescriptionStatus::PartiallyDispensed);
    }

    #[test]
    fn test_refill_rejected_for_draft_and_expired() {
        let lifecycle = PrescriptionLifecycleService::new();
        let today = Utc::now().date_naive();

        let mut draft = Prescription::sample_draft(3);
        assert_matches!(
            lifecycle.refill(&mut draft, today),
            Err(PrescriptionError::InvalidTransition { from: PrescriptionStatus::Draft, .. })
        );

        let mut prescription = issued(3);
        let after_expiry = prescription.valid_until + Duration::days(1);
        assert_matches!(
            lifecycle.refill(&mut prescription, after_expiry),
            Err(PrescriptionError::Expired)
        );
        assert_eq!(prescription.refills_remaining, 3);

        let last_day = prescription.valid_until;
        assert!(lifecycle.refill(&mut prescription, last_day).is_ok());
    }

    #[test]
    fn test_cancel_appends_reason_once() {
        let lifecycle = PrescriptionLifecycleService::new();
        let mut prescription = issued(1);
        prescription.notes = Some("Review in two weeks".to_string());

        lifecycle.cancel(&mut prescription, "Allergic reaction").unwrap();
        assert_eq!(prescription.status, PrescriptionStatus::Cancelled);
        assert_eq!(
            prescription.notes.as_deref(),
            Some("Review in two weeks\nCancellation reason: Allergic reaction")
        );
        assert!(prescription.digital_signature.is_some());

        assert_matches!(
            lifecycle.cancel(&mut prescription, "again"),
            Err(PrescriptionError::InvalidTransition { from: PrescriptionStatus::Cancelled, .. })
        );
        assert_matches!(
            lifecycle.refill(&mut prescription, Utc::now().date_naive()),
            Err(PrescriptionError::InvalidTransition { .. })
        );
    }

    #[test]
    fn test_cancel_draft_requires_reason() {
        let lifecycle = PrescriptionLifecycleService::new();
        let mut draft = Prescription::sample_draft(0);

        assert_matches!(lifecycle.cancel(&mut draft, " "), Err(PrescriptionError::ValidationError(_)));

        lifecycle.cancel(&mut draft, "Entered in error").unwrap();
        assert_eq!(draft.notes.as_deref(), Some("Cancellation reason: Entered in error"));
        assert!(draft.digital_signature.is_none());
    }

    #[test]
    fn test_valid_transitions() {
        let lifecycle = PrescriptionLifecycleService::new();

        assert_eq!(
            lifecycle.valid_transitions(PrescriptionStatus::Draft),
            vec![PrescriptionStatus::Issued, PrescriptionStatus::Cancelled]
        );
        assert!(lifecycle.valid_transitions(PrescriptionStatus::Cancelled).is_empty());
        for status in PrescriptionStatus::ALL {
            if status != PrescriptionStatus::Cancelled {
                assert!(lifecycle.valid_transitions(status).contains(&PrescriptionStatus::Cancelled));
            }
        }
    }
}
