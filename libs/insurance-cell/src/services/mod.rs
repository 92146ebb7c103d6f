pub mod claims;
pub mod coverage;
pub mod estimator;

pub use claims::InsuranceClaimService;
pub use coverage::InsuranceCoverageService;
pub use estimator::{estimate, round_currency};
