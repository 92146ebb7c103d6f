use base64::{engine::general_purpose, Engine as _};
use chrono::SecondsFormat;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::models::{Prescription, PrescriptionError};

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "DS1.";

/// Issues and checks prescription signatures: HMAC-SHA256 over the
/// prescription identity and its issue instant. The instant is signed at
/// microsecond precision, which is what `timestamptz` keeps.
#[derive(Clone)]
pub struct PrescriptionSigner {
    secret: Vec<u8>,
}

impl PrescriptionSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    fn mac_for(&self, prescription: &Prescription) -> Result<HmacSha256, PrescriptionError> {
        if self.secret.is_empty() {
            return Err(PrescriptionError::Signature("Signing secret is not configured".to_string()));
        }

        let issued_at = prescription.issued_at.ok_or_else(|| {
            PrescriptionError::Signature("Prescription has no issue timestamp".to_string())
        })?;

        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| PrescriptionError::Signature(e.to_string()))?;
        mac.update(
            format!(
                "{}:{}:{}:{}",
                prescription.id,
                prescription.doctor_id,
                prescription.prescription_number,
                issued_at.to_rfc3339_opts(SecondsFormat::Micros, true)
            )
            .as_bytes(),
        );

        Ok(mac)
    }

    pub fn sign(&self, prescription: &Prescription) -> Result<String, PrescriptionError> {
        let tag = self.mac_for(prescription)?.finalize().into_bytes();

        Ok(format!("{}{}", SIGNATURE_PREFIX, general_purpose::URL_SAFE_NO_PAD.encode(tag)))
    }

    /// Constant-time check of the stored signature against a fresh MAC.
    pub fn verify(&self, prescription: &Prescription) -> Result<bool, PrescriptionError> {
        let Some(signature) = prescription.digital_signature.as_deref() else {
            return Ok(false);
        };

        let Some(encoded) = signature.strip_prefix(SIGNATURE_PREFIX) else {
            return Ok(false);
        };

        let Ok(tag) = general_purpose::URL_SAFE_NO_PAD.decode(encoded) else {
            return Ok(false);
        };

        Ok(self.mac_for(prescription)?.verify_slice(&tag).is_ok())
    }
}
