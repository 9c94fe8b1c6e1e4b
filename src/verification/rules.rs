use std::sync::Arc;

use crate::config::SafetyConfig;
use crate::gateway::GatheredData;
use crate::models::enums::{DiscontinuationKind, MedicationStatus};
use crate::models::MedicationOrder;

use super::evidence::{ClinicalEvidence, SnapshotEvidence};
use super::helpers::{days_prescribed, format_dose_mg, mutual_contains, single_dose_mg};
use super::messages::MessageTemplates;
use super::reference::{DoseLimit, SafetyReferenceData, UNKNOWN_CLASS};
use super::types::{Category, Issue, IssueType, RiskLevel, RuleError};

/// Signature shared by every rule check. Checks read the snapshot and never
/// see another rule's output.
pub type CheckFn =
    fn(&[MedicationOrder], &GatheredData, &RuleContext) -> Result<Vec<Issue>, RuleError>;

/// Read-only collaborators handed to every check.
pub struct RuleContext {
    pub reference: SafetyReferenceData,
    pub evidence: Arc<dyn ClinicalEvidence>,
    pub config: SafetyConfig,
}

impl RuleContext {
    pub fn new(
        reference: SafetyReferenceData,
        evidence: Arc<dyn ClinicalEvidence>,
        config: SafetyConfig,
    ) -> Self {
        Self {
            reference,
            evidence,
            config,
        }
    }

    /// Snapshot-backed evidence with the given tables and config.
    pub fn with_snapshot_evidence(reference: SafetyReferenceData, config: SafetyConfig) -> Self {
        Self::new(reference, Arc::new(SnapshotEvidence), config)
    }
}

// ---------------------------------------------------------------------------
// Rule & RuleRegistry
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct Rule {
    pub name: &'static str,
    pub description: &'static str,
    /// Declared severity class; individual issues carry their own level.
    pub severity: RiskLevel,
    pub check: CheckFn,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("severity", &self.severity)
            .finish_non_exhaustive()
    }
}

impl Rule {
    pub const fn new(
        name: &'static str,
        description: &'static str,
        severity: RiskLevel,
        check: CheckFn,
    ) -> Self {
        Self {
            name,
            description,
            severity,
            check,
        }
    }

    /// Run the check and stamp each issue with this rule's name.
    pub fn evaluate(
        &self,
        medications: &[MedicationOrder],
        data: &GatheredData,
        ctx: &RuleContext,
    ) -> Result<Vec<Issue>, RuleError> {
        let mut issues = (self.check)(medications, data, ctx)?;
        for issue in &mut issues {
            issue.rule = self.name.to_string();
        }
        Ok(issues)
    }

    /// The synthetic issue standing in for a failed, panicked or timed-out check.
    pub fn failure_issue(&self, cause: &str) -> Issue {
        Issue {
            issue_type: IssueType::VerificationError,
            message: MessageTemplates::verification_error(self.description, cause),
            risk_level: RiskLevel::Unknown,
            resource_ids: Vec::new(),
            rule: self.name.to_string(),
        }
    }
}

/// Named, categorized rule set. Read-only once built; share it behind an
/// `Arc` across concurrent verifications.
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    critical_safety: Vec<Rule>,
    workflow_safety: Vec<Rule>,
    process_safety: Vec<Rule>,
}

impl RuleRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The standard rule set.
    pub fn standard() -> Self {
        Self::empty()
            .with_rule(
                Category::CriticalSafety,
                Rule::new(
                    "duplicate_therapy",
                    "Check for duplicate therapy within a therapeutic class",
                    RiskLevel::High,
                    check_duplicate_therapy,
                ),
            )
            .with_rule(
                Category::CriticalSafety,
                Rule::new(
                    "allergy_contraindications",
                    "Check active medications against active allergies",
                    RiskLevel::Critical,
                    check_allergy_contraindications,
                ),
            )
            .with_rule(
                Category::CriticalSafety,
                Rule::new(
                    "high_risk_monitoring",
                    "Check lab monitoring for high-risk medications",
                    RiskLevel::High,
                    check_high_risk_monitoring,
                ),
            )
            .with_rule(
                Category::CriticalSafety,
                Rule::new(
                    "dosage_safety_limits",
                    "Check doses against patient-specific safety limits",
                    RiskLevel::High,
                    check_dosage_safety_limits,
                ),
            )
            .with_rule(
                Category::WorkflowSafety,
                Rule::new(
                    "discontinuation_safety",
                    "Check discontinued medications for tapering and follow-up",
                    RiskLevel::Medium,
                    check_discontinuation_safety,
                ),
            )
            .with_rule(
                Category::WorkflowSafety,
                Rule::new(
                    "prescription_completeness",
                    "Check prescriptions for complete dosage and duration",
                    RiskLevel::Medium,
                    check_prescription_completeness,
                ),
            )
            .with_rule(
                Category::WorkflowSafety,
                Rule::new(
                    "refill_safety",
                    "Check controlled-substance refill authorizations and history",
                    RiskLevel::Medium,
                    check_refill_safety,
                ),
            )
            .with_rule(
                Category::ProcessSafety,
                Rule::new(
                    "effectiveness_monitoring",
                    "Check long-running medications for effectiveness assessment",
                    RiskLevel::Low,
                    check_effectiveness_monitoring,
                ),
            )
            .with_rule(
                Category::ProcessSafety,
                Rule::new(
                    "adverse_effect_monitoring",
                    "Check adverse-effect tracking for medications that require it",
                    RiskLevel::Medium,
                    check_adverse_effect_monitoring,
                ),
            )
            .with_rule(
                Category::ProcessSafety,
                Rule::new(
                    "patient_education",
                    "Check patient education for newly started medications",
                    RiskLevel::Low,
                    check_patient_education,
                ),
            )
    }

    /// Append a rule to a category.
    pub fn with_rule(mut self, category: Category, rule: Rule) -> Self {
        self.rules_mut(category).push(rule);
        self
    }

    pub fn rules(&self, category: Category) -> &[Rule] {
        match category {
            Category::CriticalSafety => &self.critical_safety,
            Category::WorkflowSafety => &self.workflow_safety,
            Category::ProcessSafety => &self.process_safety,
        }
    }

    fn rules_mut(&mut self, category: Category) -> &mut Vec<Rule> {
        match category {
            Category::CriticalSafety => &mut self.critical_safety,
            Category::WorkflowSafety => &mut self.workflow_safety,
            Category::ProcessSafety => &mut self.process_safety,
        }
    }

    pub fn rule_names(&self, category: Category) -> Vec<&'static str> {
        self.rules(category).iter().map(|r| r.name).collect()
    }

    pub fn len(&self) -> usize {
        Category::ALL.iter().map(|c| self.rules(*c).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Critical safety
// ---------------------------------------------------------------------------

/// One issue per non-`unknown` class with two or more active members.
pub fn check_duplicate_therapy(
    medications: &[MedicationOrder],
    _data: &GatheredData,
    ctx: &RuleContext,
) -> Result<Vec<Issue>, RuleError> {
    let mut groups: Vec<(&str, Vec<&MedicationOrder>)> = Vec::new();

    for med in medications.iter().filter(|m| m.is_active()) {
        let class = ctx.reference.therapeutic_class(&med.display_name);
        match groups.iter_mut().find(|(c, _)| *c == class) {
            Some((_, members)) => members.push(med),
            None => groups.push((class, vec![med])),
        }
    }

    Ok(groups
        .into_iter()
        .filter(|(class, members)| *class != UNKNOWN_CLASS && members.len() >= 2)
        .map(|(class, members)| {
            let names: Vec<&str> = members.iter().map(|m| m.display_name.as_str()).collect();
            Issue::new(
                IssueType::DuplicateTherapy,
                RiskLevel::High,
                MessageTemplates::duplicate_therapy(class, &names),
                members.iter().map(|m| m.id.clone()).collect(),
            )
        })
        .collect())
}

/// One issue per active medication x active allergy pair whose texts overlap.
pub fn check_allergy_contraindications(
    medications: &[MedicationOrder],
    data: &GatheredData,
    _ctx: &RuleContext,
) -> Result<Vec<Issue>, RuleError> {
    let mut issues = Vec::new();

    for med in medications.iter().filter(|m| m.is_active()) {
        for allergy in data.active_allergies() {
            if mutual_contains(&med.display_name, &allergy.allergen) {
                issues.push(Issue::new(
                    IssueType::AllergyConflict,
                    RiskLevel::Critical,
                    MessageTemplates::allergy_conflict(&allergy.allergen, &med.display_name),
                    vec![med.id.clone(), allergy.id.clone()],
                ));
            }
        }
    }

    Ok(issues)
}

pub fn check_high_risk_monitoring(
    medications: &[MedicationOrder],
    data: &GatheredData,
    ctx: &RuleContext,
) -> Result<Vec<Issue>, RuleError> {
    let mut issues = Vec::new();
    let lookback = ctx.config.lab_lookback_days;

    for med in medications.iter().filter(|m| m.is_active()) {
        let Some(substance) = ctx.reference.high_risk_substance(&med.display_name) else {
            continue;
        };
        let monitored =
            ctx.evidence
                .has_recent_lab(data, med, &substance.monitoring_labs, lookback)?;
        if !monitored {
            issues.push(Issue::new(
                IssueType::MissingMonitoring,
                RiskLevel::High,
                MessageTemplates::missing_monitoring(
                    &med.display_name,
                    &substance.monitoring_description,
                    lookback,
                ),
                vec![med.id.clone()],
            ));
        }
    }

    Ok(issues)
}

/// A dose-limit violation with its own risk classification.
#[derive(Debug, Clone, PartialEq)]
pub struct DosageViolation {
    pub risk_level: RiskLevel,
    pub detail: String,
}

/// Evaluate one medication against its dose limit. The most severe
/// violation wins; unparseable doses produce none.
pub fn check_dosage(
    med: &MedicationOrder,
    limit: &DoseLimit,
    age: Option<u32>,
    config: &SafetyConfig,
) -> Option<DosageViolation> {
    if limit.pediatric_contraindicated && age.is_some_and(|a| a < config.pediatric_age) {
        return Some(DosageViolation {
            risk_level: RiskLevel::Critical,
            detail: format!(
                "{} is contraindicated for patients under {}",
                limit.substance, config.pediatric_age
            ),
        });
    }

    let single = single_dose_mg(med)?;
    if single > limit.max_single_dose_mg {
        return Some(DosageViolation {
            risk_level: RiskLevel::High,
            detail: format!(
                "single dose {} above maximum {}",
                format_dose_mg(single),
                format_dose_mg(limit.max_single_dose_mg)
            ),
        });
    }

    let per_day = med
        .dosage
        .as_ref()
        .and_then(|d| d.frequency_per_day)
        .filter(|f| *f > 0.0)
        .unwrap_or(1.0);
    let daily = single * per_day;
    if daily > limit.max_daily_dose_mg {
        return Some(DosageViolation {
            risk_level: RiskLevel::High,
            detail: format!(
                "daily dose {} above maximum {}",
                format_dose_mg(daily),
                format_dose_mg(limit.max_daily_dose_mg)
            ),
        });
    }

    match limit.geriatric_max_daily_dose_mg {
        Some(max) if daily > max && age.is_some_and(|a| a >= config.geriatric_age) => {
            Some(DosageViolation {
                risk_level: RiskLevel::Medium,
                detail: format!(
                    "daily dose {} above geriatric maximum {}",
                    format_dose_mg(daily),
                    format_dose_mg(max)
                ),
            })
        }
        _ => None,
    }
}

pub fn check_dosage_safety_limits(
    medications: &[MedicationOrder],
    data: &GatheredData,
    ctx: &RuleContext,
) -> Result<Vec<Issue>, RuleError> {
    let age = data.patient_age();

    Ok(medications
        .iter()
        .filter(|m| m.is_active())
        .filter_map(|med| {
            let limit = ctx.reference.dose_limit(&med.display_name)?;
            let violation = check_dosage(med, limit, age, &ctx.config)?;
            Some(Issue::new(
                IssueType::UnsafeDosage,
                violation.risk_level,
                MessageTemplates::unsafe_dosage(&med.display_name, &violation.detail),
                vec![med.id.clone()],
            ))
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Workflow safety
// ---------------------------------------------------------------------------

pub fn check_discontinuation_safety(
    medications: &[MedicationOrder],
    data: &GatheredData,
    ctx: &RuleContext,
) -> Result<Vec<Issue>, RuleError> {
    let mut issues = Vec::new();

    for med in medications
        .iter()
        .filter(|m| m.status == MedicationStatus::Stopped)
    {
        let Some(record) = ctx.evidence.discontinuation_record(data, med)? else {
            continue;
        };

        if record.kind == DiscontinuationKind::Immediate
            && ctx.reference.requires_tapering(&med.display_name)
        {
            issues.push(Issue::new(
                IssueType::AbruptDiscontinuation,
                RiskLevel::Medium,
                MessageTemplates::abrupt_discontinuation(&med.display_name),
                vec![med.id.clone()],
            ));
        }

        if ctx.reference.follow_up_required(record.kind)
            && !ctx.evidence.has_follow_up(data, med)?
        {
            issues.push(Issue::new(
                IssueType::MissingFollowup,
                RiskLevel::Medium,
                MessageTemplates::missing_followup(&med.display_name, record.kind.as_str()),
                vec![med.id.clone()],
            ));
        }
    }

    Ok(issues)
}

/// Completeness applies to every order that is still in play (not terminal).
pub fn check_prescription_completeness(
    medications: &[MedicationOrder],
    _data: &GatheredData,
    ctx: &RuleContext,
) -> Result<Vec<Issue>, RuleError> {
    let mut issues = Vec::new();

    for med in medications.iter().filter(|m| !m.status.is_terminal()) {
        match &med.dosage {
            None => issues.push(Issue::new(
                IssueType::MissingDosage,
                RiskLevel::Medium,
                MessageTemplates::missing_dosage(&med.display_name),
                vec![med.id.clone()],
            )),
            Some(dosage) => {
                let has_text = dosage
                    .text
                    .as_ref()
                    .map(|t| !t.trim().is_empty())
                    .unwrap_or(false);
                if !has_text && dosage.dose.is_none() {
                    issues.push(Issue::new(
                        IssueType::UnclearDosage,
                        RiskLevel::Medium,
                        MessageTemplates::unclear_dosage(&med.display_name),
                        vec![med.id.clone()],
                    ));
                }
            }
        }

        let has_duration = med
            .dosage
            .as_ref()
            .and_then(|d| d.duration_days)
            .is_some_and(|d| d > 0);
        if !has_duration && ctx.reference.is_short_course(&med.display_name) {
            issues.push(Issue::new(
                IssueType::MissingDuration,
                RiskLevel::Low,
                MessageTemplates::missing_duration(&med.display_name),
                vec![med.id.clone()],
            ));
        }
    }

    Ok(issues)
}

pub fn check_refill_safety(
    medications: &[MedicationOrder],
    data: &GatheredData,
    ctx: &RuleContext,
) -> Result<Vec<Issue>, RuleError> {
    let mut issues = Vec::new();
    let max = ctx.config.max_controlled_refills;

    for med in medications
        .iter()
        .filter(|m| m.is_active() && ctx.reference.is_controlled(&m.display_name))
    {
        if med.refills_allowed > max {
            issues.push(Issue::new(
                IssueType::ExcessiveRefills,
                RiskLevel::Medium,
                MessageTemplates::excessive_refills(&med.display_name, med.refills_allowed, max),
                vec![med.id.clone()],
            ));
        }

        if ctx
            .evidence
            .has_early_refill_pattern(data, med, ctx.config.early_refill_ratio)?
        {
            issues.push(Issue::new(
                IssueType::EarlyRefillPattern,
                RiskLevel::Medium,
                MessageTemplates::early_refill_pattern(&med.display_name),
                vec![med.id.clone()],
            ));
        }
    }

    Ok(issues)
}

// ---------------------------------------------------------------------------
// Process safety
// ---------------------------------------------------------------------------

pub fn check_effectiveness_monitoring(
    medications: &[MedicationOrder],
    data: &GatheredData,
    ctx: &RuleContext,
) -> Result<Vec<Issue>, RuleError> {
    let mut issues = Vec::new();

    for med in medications.iter().filter(|m| m.is_active()) {
        let Some(days_active) = days_prescribed(med, data.gathered_at) else {
            continue;
        };
        if days_active <= ctx.config.assessment_interval_days {
            continue;
        }
        let assessed = ctx.evidence.has_recent_effectiveness_assessment(
            data,
            med,
            ctx.config.assessment_lookback_days,
        )?;
        if !assessed {
            issues.push(Issue::new(
                IssueType::OverdueAssessment,
                RiskLevel::Low,
                MessageTemplates::overdue_assessment(&med.display_name, days_active),
                vec![med.id.clone()],
            ));
        }
    }

    Ok(issues)
}

pub fn check_adverse_effect_monitoring(
    medications: &[MedicationOrder],
    data: &GatheredData,
    ctx: &RuleContext,
) -> Result<Vec<Issue>, RuleError> {
    let mut issues = Vec::new();

    for med in medications
        .iter()
        .filter(|m| m.is_active() && ctx.reference.requires_adverse_tracking(&m.display_name))
    {
        if !ctx.evidence.has_adverse_effect_monitoring(data, med)? {
            issues.push(Issue::new(
                IssueType::MissingAdverseMonitoring,
                RiskLevel::Medium,
                MessageTemplates::missing_adverse_monitoring(&med.display_name),
                vec![med.id.clone()],
            ));
        }
    }

    Ok(issues)
}

pub fn check_patient_education(
    medications: &[MedicationOrder],
    data: &GatheredData,
    ctx: &RuleContext,
) -> Result<Vec<Issue>, RuleError> {
    let mut issues = Vec::new();

    for med in medications.iter().filter(|m| m.is_active()) {
        let is_new = days_prescribed(med, data.gathered_at)
            .is_some_and(|d| (0..=ctx.config.new_medication_days).contains(&d));
        if is_new && !ctx.evidence.has_patient_education(data, med)? {
            issues.push(Issue::new(
                IssueType::MissingEducation,
                RiskLevel::Low,
                MessageTemplates::missing_education(&med.display_name),
                vec![med.id.clone()],
            ));
        }
    }

    Ok(issues)
}
