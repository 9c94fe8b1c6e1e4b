//! Risk Factor Analyzer: patient-specific risk derived from the snapshot,
//! independent of rule issues.

use crate::config::SafetyConfig;
use crate::gateway::GatheredData;

use super::messages::MessageTemplates;
use super::reference::SafetyReferenceData;
use super::types::{PatientRiskSummary, RiskFactor, RiskFactorType, RiskLevel};

/// Derive age bracket, high-risk condition and allergy burden factors.
pub fn analyze_risk_factors(
    data: &GatheredData,
    reference: &SafetyReferenceData,
    config: &SafetyConfig,
) -> PatientRiskSummary {
    let age = data.patient_age();
    let allergy_count = data.active_allergies().count();
    let active_conditions: Vec<_> = data
        .conditions
        .iter()
        .filter(|c| c.clinical_status.is_active())
        .collect();

    let mut risk_factors = Vec::new();

    match age {
        Some(a) if a >= config.geriatric_age => risk_factors.push(RiskFactor {
            factor_type: RiskFactorType::AgeGeriatric,
            description: MessageTemplates::age_geriatric(a),
            risk_level: RiskLevel::Medium,
            resource_id: None,
        }),
        Some(a) if a < config.pediatric_age => risk_factors.push(RiskFactor {
            factor_type: RiskFactorType::AgePediatric,
            description: MessageTemplates::age_pediatric(a),
            risk_level: RiskLevel::Medium,
            resource_id: None,
        }),
        _ => {}
    }

    for condition in &active_conditions {
        if reference.is_high_risk_condition(&condition.code) {
            risk_factors.push(RiskFactor {
                factor_type: RiskFactorType::HighRiskCondition,
                description: MessageTemplates::high_risk_condition(&condition.code),
                risk_level: RiskLevel::High,
                resource_id: Some(condition.id.clone()),
            });
        }
    }

    if allergy_count > config.allergy_burden_threshold {
        risk_factors.push(RiskFactor {
            factor_type: RiskFactorType::MultipleAllergies,
            description: MessageTemplates::multiple_allergies(allergy_count),
            risk_level: RiskLevel::Medium,
            resource_id: None,
        });
    }

    PatientRiskSummary {
        age,
        allergy_count,
        condition_count: active_conditions.len(),
        risk_factors,
    }
}
