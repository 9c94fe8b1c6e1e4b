use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::gateway::GatewayError;

// ---------------------------------------------------------------------------
// RiskLevel
// ---------------------------------------------------------------------------

/// Severity carried by every issue and risk factor.
/// Declared in ascending severity so `Ord` ranks `Critical` highest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Could not be classified (rule failure). Counted, never scored.
    Unknown,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Report-level label: the highest severity present, or `Safe`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum OverallRiskLevel {
    Safe,
    Low,
    Medium,
    High,
    Critical,
}

impl OverallRiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

// ---------------------------------------------------------------------------
// IssueType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    DuplicateTherapy,
    AllergyConflict,
    MissingMonitoring,
    UnsafeDosage,
    AbruptDiscontinuation,
    MissingFollowup,
    MissingDosage,
    UnclearDosage,
    MissingDuration,
    ExcessiveRefills,
    EarlyRefillPattern,
    OverdueAssessment,
    MissingAdverseMonitoring,
    MissingEducation,
    VerificationError,
}

impl IssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DuplicateTherapy => "duplicate_therapy",
            Self::AllergyConflict => "allergy_conflict",
            Self::MissingMonitoring => "missing_monitoring",
            Self::UnsafeDosage => "unsafe_dosage",
            Self::AbruptDiscontinuation => "abrupt_discontinuation",
            Self::MissingFollowup => "missing_followup",
            Self::MissingDosage => "missing_dosage",
            Self::UnclearDosage => "unclear_dosage",
            Self::MissingDuration => "missing_duration",
            Self::ExcessiveRefills => "excessive_refills",
            Self::EarlyRefillPattern => "early_refill_pattern",
            Self::OverdueAssessment => "overdue_assessment",
            Self::MissingAdverseMonitoring => "missing_adverse_monitoring",
            Self::MissingEducation => "missing_education",
            Self::VerificationError => "verification_error",
        }
    }
}

// ---------------------------------------------------------------------------
// Issue
// ---------------------------------------------------------------------------

/// One discrete safety finding produced by a rule check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub message: String,
    pub risk_level: RiskLevel,
    pub resource_ids: Vec<String>,
    /// Name of the rule that produced the issue.
    pub rule: String,
}

impl Issue {
    pub fn new(
        issue_type: IssueType,
        risk_level: RiskLevel,
        message: String,
        resource_ids: Vec<String>,
    ) -> Self {
        Self {
            issue_type,
            message,
            risk_level,
            resource_ids,
            rule: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    CriticalSafety,
    WorkflowSafety,
    ProcessSafety,
}

impl Category {
    pub const ALL: [Category; 3] = [
        Category::CriticalSafety,
        Category::WorkflowSafety,
        Category::ProcessSafety,
    ];

    /// Stable report key.
    pub fn key(&self) -> &'static str {
        match self {
            Self::CriticalSafety => "criticalSafety",
            Self::WorkflowSafety => "workflowSafety",
            Self::ProcessSafety => "processSafety",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryResult {
    pub safe: bool,
    pub issues: Vec<Issue>,
}

impl CategoryResult {
    /// `safe` is derived from the issue list, never set independently.
    pub fn from_issues(issues: Vec<Issue>) -> Self {
        Self {
            safe: issues.is_empty(),
            issues,
        }
    }
}

impl Default for CategoryResult {
    fn default() -> Self {
        Self::from_issues(Vec::new())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryResults {
    pub critical_safety: CategoryResult,
    pub workflow_safety: CategoryResult,
    pub process_safety: CategoryResult,
}

impl CategoryResults {
    pub fn get(&self, category: Category) -> &CategoryResult {
        match category {
            Category::CriticalSafety => &self.critical_safety,
            Category::WorkflowSafety => &self.workflow_safety,
            Category::ProcessSafety => &self.process_safety,
        }
    }

    pub fn set(&mut self, category: Category, result: CategoryResult) {
        match category {
            Category::CriticalSafety => self.critical_safety = result,
            Category::WorkflowSafety => self.workflow_safety = result,
            Category::ProcessSafety => self.process_safety = result,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, &CategoryResult)> {
        Category::ALL.into_iter().map(move |c| (c, self.get(c)))
    }

    pub fn all_issues(&self) -> impl Iterator<Item = &Issue> {
        self.iter().flat_map(|(_, r)| r.issues.iter())
    }
}

// ---------------------------------------------------------------------------
// Overall assessment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallAssessment {
    pub safe: bool,
    pub risk_level: OverallRiskLevel,
    /// 0..=100, higher is safer.
    pub score: u8,
    pub critical_issues: usize,
    pub high_risk_issues: usize,
    pub medium_risk_issues: usize,
    pub low_risk_issues: usize,
    pub unknown_issues: usize,
    pub total_issues: usize,
}

impl Default for OverallAssessment {
    fn default() -> Self {
        Self {
            safe: true,
            risk_level: OverallRiskLevel::Safe,
            score: 100,
            critical_issues: 0,
            high_risk_issues: 0,
            medium_risk_issues: 0,
            low_risk_issues: 0,
            unknown_issues: 0,
            total_issues: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Risk factors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RiskFactorType {
    AgeGeriatric,
    AgePediatric,
    HighRiskCondition,
    MultipleAllergies,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskFactor {
    #[serde(rename = "type")]
    pub factor_type: RiskFactorType,
    pub description: String,
    pub risk_level: RiskLevel,
    pub resource_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientRiskSummary {
    pub age: Option<u32>,
    pub allergy_count: usize,
    pub condition_count: usize,
    pub risk_factors: Vec<RiskFactor>,
}

impl PatientRiskSummary {
    pub fn has_factor(&self, factor_type: RiskFactorType) -> bool {
        self.risk_factors.iter().any(|f| f.factor_type == factor_type)
    }
}

// ---------------------------------------------------------------------------
// Recommendations & actions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationPriority {
    Low,
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationCategory {
    Safety,
    Geriatric,
    Allergy,
    Therapy,
    Monitoring,
    Dosage,
    Workflow,
    Education,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub priority: RecommendationPriority,
    pub category: RecommendationCategory,
    pub title: String,
    pub description: String,
    /// Issue type the recommendation was derived from, if any.
    pub issue_type: Option<IssueType>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Immediate,
    Review,
    Schedule,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ActionPriority {
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequiredAction {
    pub action_type: ActionType,
    pub priority: ActionPriority,
    pub description: String,
    pub due_date: DateTime<Utc>,
    pub issue_type: IssueType,
    pub resource_ids: Vec<String>,
}

// ---------------------------------------------------------------------------
// VerificationReport
// ---------------------------------------------------------------------------

/// Root aggregate of one verification run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub id: Uuid,
    pub patient_id: String,
    pub generated_at: DateTime<Utc>,
    pub overall: OverallAssessment,
    pub categories: CategoryResults,
    pub recommendations: Vec<Recommendation>,
    pub actions: Vec<RequiredAction>,
    pub patient_risk: PatientRiskSummary,
    /// Non-fatal problems met while gathering data (failed collection fetches).
    pub diagnostics: Vec<String>,
    pub processing_time_ms: u64,
}

impl VerificationReport {
    pub fn new(patient_id: &str, generated_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            patient_id: patient_id.to_string(),
            generated_at,
            overall: OverallAssessment::default(),
            categories: CategoryResults::default(),
            recommendations: Vec::new(),
            actions: Vec::new(),
            patient_risk: PatientRiskSummary::default(),
            diagnostics: Vec::new(),
            processing_time_ms: 0,
        }
    }

    pub fn to_json(&self) -> Result<String, SafetyError> {
        serde_json::to_string(self).map_err(|e| SafetyError::Serialization(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure inside a single rule check. Never escapes the orchestrator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleError {
    #[error("Missing data: {0}")]
    MissingData(String),

    #[error("Lookup failed: {0}")]
    Lookup(String),

    #[error("Invalid record: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("Patient identifier must not be empty")]
    EmptyPatientId,

    #[error("Patient record unavailable: {0}")]
    PatientFetch(#[source] GatewayError),

    #[error("Verification timed out after {0} ms")]
    Timeout(u64),

    #[error("Reference data load failed ({0}): {1}")]
    ReferenceDataLoad(String, String),

    #[error("Reference data parse failed ({0}): {1}")]
    ReferenceDataParse(String, String),

    #[error("Config load failed ({0}): {1}")]
    ConfigLoad(String, String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal lock failed")]
    LockFailed,
}

// ---------------------------------------------------------------------------
// SafetyVerifier trait
// ---------------------------------------------------------------------------

/// Entry point used by callers of the engine.
#[async_trait]
pub trait SafetyVerifier: Send + Sync {
    /// Verify a patient's active medications and clinical context.
    async fn verify_safety(&self, patient_id: &str) -> Result<VerificationReport, SafetyError>;

    /// Drop any cached report for this patient.
    fn invalidate(&self, patient_id: &str) -> Result<(), SafetyError>;
}
