use chrono::{DateTime, Duration, Utc};

use super::helpers::distinct_issue_types;
use super::types::{
    ActionPriority, ActionType, CategoryResults, IssueType, OverallAssessment,
    PatientRiskSummary, Recommendation, RecommendationCategory, RecommendationPriority,
    RequiredAction, RiskFactorType,
};

/// Maps issue patterns and patient risk to recommendations and due-dated
/// required actions.
pub struct RecommendationGenerator;

impl RecommendationGenerator {
    /// Report-level recommendations, then one per distinct issue type in each
    /// unsafe category. Unmapped issue types produce nothing.
    pub fn recommendations(
        overall: &OverallAssessment,
        categories: &CategoryResults,
        risk: &PatientRiskSummary,
    ) -> Vec<Recommendation> {
        let mut out = Vec::new();

        if overall.critical_issues > 0 {
            out.push(Recommendation {
                priority: RecommendationPriority::Urgent,
                category: RecommendationCategory::Safety,
                title: "Resolve critical safety issues".into(),
                description: format!(
                    "{} critical issue(s) found. Resolve them before continuing care.",
                    overall.critical_issues
                ),
                issue_type: None,
            });
        }

        if risk.has_factor(RiskFactorType::AgeGeriatric) {
            out.push(Recommendation {
                priority: RecommendationPriority::Medium,
                category: RecommendationCategory::Geriatric,
                title: "Apply geriatric prescribing guidelines".into(),
                description: "Review the regimen against geriatric prescribing criteria \
                              and consider dose adjustment for age-related clearance."
                    .into(),
                issue_type: None,
            });
        }

        if risk.has_factor(RiskFactorType::MultipleAllergies) {
            out.push(Recommendation {
                priority: RecommendationPriority::Medium,
                category: RecommendationCategory::Allergy,
                title: "Enhanced allergy monitoring".into(),
                description: format!(
                    "Patient has {} active allergies. Verify every new order against the \
                     allergy list.",
                    risk.allergy_count
                ),
                issue_type: None,
            });
        }

        for (_, result) in categories.iter().filter(|(_, r)| !r.safe) {
            for issue_type in distinct_issue_types(&result.issues) {
                if let Some(rec) = Self::for_issue_type(issue_type) {
                    out.push(rec);
                }
            }
        }

        out
    }

    fn for_issue_type(issue_type: IssueType) -> Option<Recommendation> {
        let (priority, category, title, description) = match issue_type {
            IssueType::DuplicateTherapy => (
                RecommendationPriority::High,
                RecommendationCategory::Therapy,
                "Review duplicate therapy",
                "Multiple active medications share a therapeutic class. Confirm the \
                 combination is intended or discontinue the duplicate.",
            ),
            IssueType::MissingMonitoring => (
                RecommendationPriority::High,
                RecommendationCategory::Monitoring,
                "Order required laboratory monitoring",
                "High-risk medications lack recent monitoring results. Order the \
                 required labs.",
            ),
            IssueType::UnsafeDosage => (
                RecommendationPriority::High,
                RecommendationCategory::Dosage,
                "Adjust unsafe dosage",
                "One or more doses exceed patient-specific safety limits.",
            ),
            IssueType::AbruptDiscontinuation => (
                RecommendationPriority::Medium,
                RecommendationCategory::Workflow,
                "Plan a tapering schedule",
                "Medications that require tapering were stopped abruptly. Assess for \
                 withdrawal and document a taper.",
            ),
            IssueType::ExcessiveRefills => (
                RecommendationPriority::Medium,
                RecommendationCategory::Workflow,
                "Limit controlled-substance refills",
                "Reduce refill authorizations to the permitted maximum.",
            ),
            IssueType::OverdueAssessment => (
                RecommendationPriority::Low,
                RecommendationCategory::Monitoring,
                "Schedule effectiveness assessment",
                "Long-running medications have no recent effectiveness assessment.",
            ),
            IssueType::MissingEducation => (
                RecommendationPriority::Low,
                RecommendationCategory::Education,
                "Provide medication education",
                "Newly started medications have no documented patient education.",
            ),
            _ => return None,
        };

        Some(Recommendation {
            priority,
            category,
            title: title.into(),
            description: description.into(),
            issue_type: Some(issue_type),
        })
    }

    /// One action per issue of an actionable type, due relative to `now`.
    pub fn actions(categories: &CategoryResults, now: DateTime<Utc>) -> Vec<RequiredAction> {
        categories
            .all_issues()
            .filter_map(|issue| {
                let (action_type, priority, due_in_days, verb) = match issue.issue_type {
                    IssueType::AllergyConflict => {
                        (ActionType::Immediate, ActionPriority::Critical, 0, "Resolve allergy conflict")
                    }
                    IssueType::DuplicateTherapy => {
                        (ActionType::Review, ActionPriority::High, 1, "Review duplicate therapy")
                    }
                    IssueType::MissingMonitoring => {
                        (ActionType::Schedule, ActionPriority::High, 3, "Schedule monitoring labs")
                    }
                    IssueType::MissingFollowup => {
                        (ActionType::Schedule, ActionPriority::Medium, 7, "Schedule follow-up")
                    }
                    _ => return None,
                };
                Some(RequiredAction {
                    action_type,
                    priority,
                    description: format!("{}: {}", verb, issue.message),
                    due_date: now + Duration::days(due_in_days),
                    issue_type: issue.issue_type,
                    resource_ids: issue.resource_ids.clone(),
                })
            })
            .collect()
    }
}
