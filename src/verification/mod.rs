pub mod aggregate;
pub mod cache;
pub mod engine;
pub mod evidence;
pub mod helpers;
pub mod messages;
pub mod recommendations;
pub mod reference;
pub mod risk_factors;
pub mod rules;
pub mod types;

pub use cache::{InMemoryVerificationCache, VerificationCache};
pub use engine::VerificationEngine;
pub use evidence::{ClinicalEvidence, SnapshotEvidence};
pub use reference::SafetyReferenceData;
pub use rules::{Rule, RuleContext, RuleRegistry};
pub use types::{
    Category, CategoryResult, CategoryResults, Issue, IssueType, OverallAssessment,
    OverallRiskLevel, PatientRiskSummary, Recommendation, RequiredAction, RiskFactor, RiskLevel,
    RuleError, SafetyError, SafetyVerifier, VerificationReport,
};
