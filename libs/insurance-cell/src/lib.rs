// libs/insurance-cell/src/lib.rs
//! # Insurance Cell
//!
//! Coverage lookups, cost estimation and prescription claims against a static
//! table of supported insurance providers.
//!
//! ```text
//! +-----------------------------------------------------+
//! |                  Insurance Cell                     |
//! +-----------------------------------------------------+
//! |  handlers.rs     |  HTTP endpoint handlers          |
//! |  router.rs       |  Route definitions               |
//! |  models.rs       |  Data structures & DTOs          |
//! |  services/       |  Business logic layer            |
//! |    estimator.rs  |  Pure cost estimation            |
//! |    coverage.rs   |  Providers & eligibility         |
//! |    claims.rs     |  Claim submission & lookup       |
//! +-----------------------------------------------------+
//! ```
//!
//! ## API Endpoints
//!
//! - `GET|POST /insurance/estimate-cost` - Estimate patient cost for a service
//! - `GET /insurance/coverage-summary` - Coverage for every service type
//! - `GET /insurance/eligibility/{service_type}` - Eligibility for one service
//! - `POST /insurance/verify-coverage` - Eligibility with request echo
//! - `GET /insurance/claims/{claim_number}` - Claim details
//! - `GET /insurance/prescriptions/{prescription_id}/claims` - Claims for a prescription
//! - `GET /insurance/providers` - Supported providers (public)
//! - `GET /insurance/providers/{name}` - Provider lookup (public)
//! - `GET /insurance/health` - Health check (public)

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{
    CostEstimate, CoverageSummary, CoverageTable, InsuranceClaim, InsuranceEligibility,
    InsuranceError, InsuranceProvider, ServiceType,
};
pub use router::{insurance_routes, InsuranceState};
pub use services::{estimate, InsuranceClaimService, InsuranceCoverageService};
