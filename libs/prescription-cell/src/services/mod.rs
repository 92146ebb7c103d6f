pub mod lifecycle;
pub mod prescription;
pub mod signature;
pub mod store;

pub use lifecycle::PrescriptionLifecycleService;
pub use prescription::PrescriptionService;
pub use signature::PrescriptionSigner;
pub use store::{InMemoryPrescriptionStore, PrescriptionStore, SupabasePrescriptionStore};
