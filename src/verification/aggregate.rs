//! Risk Aggregator: category results to the overall assessment.

use super::types::{CategoryResults, OverallAssessment, OverallRiskLevel, RiskLevel};

const CRITICAL_PENALTY: usize = 25;
const HIGH_PENALTY: usize = 15;
const MEDIUM_PENALTY: usize = 10;
const LOW_PENALTY: usize = 5;

/// Count issues by severity, derive the risk level and score.
///
/// `safe` ignores low and unknown issues, so a report can be safe with a
/// `low` risk level. Unknown issues are counted but never scored.
pub fn aggregate(categories: &CategoryResults) -> OverallAssessment {
    let mut overall = OverallAssessment::default();

    for issue in categories.all_issues() {
        match issue.risk_level {
            RiskLevel::Critical => overall.critical_issues += 1,
            RiskLevel::High => overall.high_risk_issues += 1,
            RiskLevel::Medium => overall.medium_risk_issues += 1,
            RiskLevel::Low => overall.low_risk_issues += 1,
            RiskLevel::Unknown => overall.unknown_issues += 1,
        }
        overall.total_issues += 1;
    }

    overall.safe = overall.critical_issues == 0
        && overall.high_risk_issues == 0
        && overall.medium_risk_issues == 0;

    overall.risk_level = if overall.critical_issues > 0 {
        OverallRiskLevel::Critical
    } else if overall.high_risk_issues > 0 {
        OverallRiskLevel::High
    } else if overall.medium_risk_issues > 0 {
        OverallRiskLevel::Medium
    } else if overall.low_risk_issues > 0 {
        OverallRiskLevel::Low
    } else {
        OverallRiskLevel::Safe
    };

    overall.score = score(&overall);
    overall
}

/// 100 minus weighted penalties, floored at 0.
fn score(overall: &OverallAssessment) -> u8 {
    let penalty = [
        (CRITICAL_PENALTY, overall.critical_issues),
        (HIGH_PENALTY, overall.high_risk_issues),
        (MEDIUM_PENALTY, overall.medium_risk_issues),
        (LOW_PENALTY, overall.low_risk_issues),
    ]
    .into_iter()
    .fold(0usize, |acc, (weight, count)| {
        acc.saturating_add(weight.saturating_mul(count))
    });
    100usize.saturating_sub(penalty) as u8
}
