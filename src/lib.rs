pub mod auth;
pub mod config;
pub mod engine;
pub mod errors;
pub mod executor;
pub mod filter;
pub mod models;
pub mod parsers;
pub mod reporting;
pub mod similarity;
pub mod verdict;

// Re-export commonly used items
pub use auth::{strip_auth_headers, Credential, AUTH_HEADERS};
pub use config::{matches_target_domain, ScanConfig};
pub use engine::{RequestSource, ScanEngine, ScanEvent, ScanState};
pub use errors::{ExecutorError, ParseError, ScanError};
pub use executor::{HttpExecutor, ReqwestExecutor};
pub use filter::RequestFilter;
pub use models::{
    CapturedRequest, Finding, Method, ResponseRecord, RiskLevel, VulnerabilityKind,
};
pub use verdict::{
    classify_privilege_escalation, classify_unauthorized_access, privilege_escalation_risk,
    Classification, Verdict,
};
