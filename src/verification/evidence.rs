//! Clinical evidence lookups consumed by rule checks.
//!
//! Each question a rule asks about the outside world ("is there a recent
//! INR?", "was education documented?") goes through `ClinicalEvidence`, so
//! the answer source can be swapped without changing the rules.

use crate::gateway::GatheredData;
use crate::models::enums::{ActivityKind, ObservationCategory};
use crate::models::{DiscontinuationRecord, MedicationOrder, Observation};

use super::helpers::days_between;
use super::types::RuleError;

/// Observation code recorded for a medication effectiveness assessment.
pub const EFFECTIVENESS_ASSESSMENT_CODE: &str = "medication-effectiveness";

pub trait ClinicalEvidence: Send + Sync {
    /// A resulted lab with one of `codes` within `lookback_days`.
    fn has_recent_lab(
        &self,
        data: &GatheredData,
        med: &MedicationOrder,
        codes: &[String],
        lookback_days: i64,
    ) -> Result<bool, RuleError>;

    /// An effectiveness assessment focused on `med` within `lookback_days`.
    fn has_recent_effectiveness_assessment(
        &self,
        data: &GatheredData,
        med: &MedicationOrder,
        lookback_days: i64,
    ) -> Result<bool, RuleError>;

    fn has_adverse_effect_monitoring(
        &self,
        data: &GatheredData,
        med: &MedicationOrder,
    ) -> Result<bool, RuleError>;

    fn has_patient_education(
        &self,
        data: &GatheredData,
        med: &MedicationOrder,
    ) -> Result<bool, RuleError>;

    fn has_follow_up(&self, data: &GatheredData, med: &MedicationOrder)
        -> Result<bool, RuleError>;

    fn discontinuation_record(
        &self,
        data: &GatheredData,
        med: &MedicationOrder,
    ) -> Result<Option<DiscontinuationRecord>, RuleError>;

    /// Any refill dispensed before `ratio` of the previous supply was used.
    fn has_early_refill_pattern(
        &self,
        data: &GatheredData,
        med: &MedicationOrder,
        ratio: f64,
    ) -> Result<bool, RuleError>;
}

/// Answers every lookup from the gathered snapshot: observations, care plan
/// activities and the order's own dispense and discontinuation records.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotEvidence;

impl SnapshotEvidence {
    fn recent_observations<'a>(
        data: &'a GatheredData,
        lookback_days: i64,
    ) -> impl Iterator<Item = &'a Observation> + 'a {
        let now = data.gathered_at;
        data.observations.iter().filter(move |o| {
            o.status.is_resulted()
                && o.effective_at
                    .map(|at| (0..=lookback_days).contains(&days_between(at, now)))
                    .unwrap_or(false)
        })
    }

    fn has_activity(data: &GatheredData, kind: ActivityKind, med: &MedicationOrder) -> bool {
        data.care_plans
            .iter()
            .any(|plan| plan.activities_for(kind, &med.id).next().is_some())
    }
}

impl ClinicalEvidence for SnapshotEvidence {
    fn has_recent_lab(
        &self,
        data: &GatheredData,
        _med: &MedicationOrder,
        codes: &[String],
        lookback_days: i64,
    ) -> Result<bool, RuleError> {
        Ok(Self::recent_observations(data, lookback_days).any(|o| {
            o.category == ObservationCategory::Laboratory && codes.iter().any(|c| *c == o.code)
        }))
    }

    fn has_recent_effectiveness_assessment(
        &self,
        data: &GatheredData,
        med: &MedicationOrder,
        lookback_days: i64,
    ) -> Result<bool, RuleError> {
        let observed = Self::recent_observations(data, lookback_days).any(|o| {
            o.code == EFFECTIVENESS_ASSESSMENT_CODE && o.focus.iter().any(|f| *f == med.id)
        });
        Ok(observed || Self::has_activity(data, ActivityKind::EffectivenessReview, med))
    }

    fn has_adverse_effect_monitoring(
        &self,
        data: &GatheredData,
        med: &MedicationOrder,
    ) -> Result<bool, RuleError> {
        Ok(Self::has_activity(data, ActivityKind::AdverseEffectMonitoring, med))
    }

    fn has_patient_education(
        &self,
        data: &GatheredData,
        med: &MedicationOrder,
    ) -> Result<bool, RuleError> {
        Ok(Self::has_activity(data, ActivityKind::PatientEducation, med))
    }

    fn has_follow_up(
        &self,
        data: &GatheredData,
        med: &MedicationOrder,
    ) -> Result<bool, RuleError> {
        Ok(Self::has_activity(data, ActivityKind::FollowUp, med))
    }

    fn discontinuation_record(
        &self,
        _data: &GatheredData,
        med: &MedicationOrder,
    ) -> Result<Option<DiscontinuationRecord>, RuleError> {
        Ok(med.discontinuation.clone())
    }

    fn has_early_refill_pattern(
        &self,
        _data: &GatheredData,
        med: &MedicationOrder,
        ratio: f64,
    ) -> Result<bool, RuleError> {
        let mut dispenses: Vec<_> = med.dispenses.iter().collect();
        dispenses.sort_by_key(|d| d.dispensed_on);

        Ok(dispenses.windows(2).any(|pair| {
            let elapsed = (pair[1].dispensed_on - pair[0].dispensed_on).num_days() as f64;
            pair[0].days_supply > 0 && elapsed < f64::from(pair[0].days_supply) * ratio
        }))
    }
}
