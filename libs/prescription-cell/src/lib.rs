// libs/prescription-cell/src/lib.rs
//! # Prescription Cell
//!
//! Digital prescriptions: creation, signing, pharmacy hand-off, refills and
//! cancellation, with optimistic versioning on every write.
//!
//! ```text
//! DRAFT --issue--> ISSUED --send--> SENT_TO_PHARMACY --refill--> PARTIALLY_DISPENSED
//!   |                |                     |                            |
//!   +----------------+------cancel---------+----------------------------+--> CANCELLED
//! ```
//!
//! ## API Endpoints
//!
//! - `POST /prescription/create` - Create a DRAFT prescription (doctor)
//! - `GET /prescription/{id}` - Prescription details
//! - `POST /prescription/{id}/issue` - Sign and issue (prescriber)
//! - `POST /prescription/{id}/send-to-pharmacy` - Hand off to a pharmacy
//! - `POST /prescription/{id}/refill` - Use one refill (patient)
//! - `POST /prescription/{id}/cancel` - Cancel with a reason (prescriber)
//! - `GET /prescription/{id}/verify-signature` - Recompute and check the signature
//! - `GET /prescription/doctor/prescriptions` - Paginated, by prescriber
//! - `GET /prescription/patient/prescriptions` - Paginated, by patient
//! - `GET /prescription/patient/active` - Active prescriptions
//! - `GET /prescription/patient/expiring` - Active prescriptions about to lapse
//! - `GET /prescription/types` - Prescription types and statuses (public)
//! - `GET /prescription/health` - Health check (public)

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{
    Prescription, PrescriptionError, PrescriptionMedication, PrescriptionStatus, PrescriptionType,
};
pub use router::{prescription_routes, PrescriptionState};
pub use services::{
    InMemoryPrescriptionStore, PrescriptionLifecycleService, PrescriptionService,
    PrescriptionSigner, PrescriptionStore, SupabasePrescriptionStore,
};
