use serde::{Deserialize, Serialize};

use crate::models::enums::DiscontinuationKind;

use super::helpers::{contains_keyword, normalize_text};
use super::types::SafetyError;

/// Class assigned when no table entry matches.
pub const UNKNOWN_CLASS: &str = "unknown";

const THERAPEUTIC_CLASSES_FILE: &str = "therapeutic_classes.json";
const SUBSTANCE_LISTS_FILE: &str = "substance_lists.json";
const DOSE_LIMITS_FILE: &str = "dose_limits.json";

/// Keyword to therapeutic class mapping (loaded from therapeutic_classes.json).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TherapeuticClassEntry {
    pub keyword: String,
    pub class: String,
}

/// A substance that needs lab monitoring while active.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighRiskSubstance {
    pub substance: String,
    /// LOINC codes any of which count as monitoring.
    pub monitoring_labs: Vec<String>,
    pub monitoring_description: String,
}

/// Dose ceiling for a substance (loaded from dose_limits.json).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoseLimit {
    pub substance: String,
    pub max_single_dose_mg: f64,
    pub max_daily_dose_mg: f64,
    pub geriatric_max_daily_dose_mg: Option<f64>,
    pub pediatric_contraindicated: bool,
}

/// Keyword lists driving the rule checks (loaded from substance_lists.json).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubstanceLists {
    pub high_risk: Vec<HighRiskSubstance>,
    pub controlled: Vec<String>,
    pub tapering_required: Vec<String>,
    pub short_course: Vec<String>,
    pub adverse_effect_tracking: Vec<String>,
    pub high_risk_condition_prefixes: Vec<String>,
    pub follow_up_required: Vec<DiscontinuationKind>,
}

/// Lookup tables for the safety rules. Injected into the rule context so
/// lists can be swapped without touching orchestration.
#[derive(Debug, Clone, Default)]
pub struct SafetyReferenceData {
    pub therapeutic_classes: Vec<TherapeuticClassEntry>,
    pub lists: SubstanceLists,
    pub dose_limits: Vec<DoseLimit>,
}

impl SafetyReferenceData {
    /// Load reference data from JSON files in `resources_dir`.
    pub fn load(resources_dir: &std::path::Path) -> Result<Self, SafetyError> {
        let read = |file: &str| {
            let path = resources_dir.join(file);
            std::fs::read_to_string(&path).map_err(|e| {
                SafetyError::ReferenceDataLoad(path.display().to_string(), e.to_string())
            })
        };

        Self::parse(
            &read(THERAPEUTIC_CLASSES_FILE)?,
            &read(SUBSTANCE_LISTS_FILE)?,
            &read(DOSE_LIMITS_FILE)?,
        )
    }

    /// Tables compiled into the crate from `resources/`.
    pub fn bundled() -> Result<Self, SafetyError> {
        Self::parse(
            include_str!("../../resources/therapeutic_classes.json"),
            include_str!("../../resources/substance_lists.json"),
            include_str!("../../resources/dose_limits.json"),
        )
    }

    fn parse(classes_json: &str, lists_json: &str, limits_json: &str) -> Result<Self, SafetyError> {
        let therapeutic_classes = serde_json::from_str(classes_json).map_err(|e| {
            SafetyError::ReferenceDataParse(THERAPEUTIC_CLASSES_FILE.into(), e.to_string())
        })?;
        let lists = serde_json::from_str(lists_json).map_err(|e| {
            SafetyError::ReferenceDataParse(SUBSTANCE_LISTS_FILE.into(), e.to_string())
        })?;
        let dose_limits = serde_json::from_str(limits_json).map_err(|e| {
            SafetyError::ReferenceDataParse(DOSE_LIMITS_FILE.into(), e.to_string())
        })?;

        Ok(Self {
            therapeutic_classes,
            lists,
            dose_limits,
        })
    }

    /// Create reference data for tests (no file I/O).
    pub fn load_test() -> Self {
        let class = |keyword: &str, class: &str| TherapeuticClassEntry {
            keyword: keyword.into(),
            class: class.into(),
        };
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        Self {
            therapeutic_classes: vec![
                class("lisinopril", "ace_inhibitor"),
                class("enalapril", "ace_inhibitor"),
                class("ramipril", "ace_inhibitor"),
                class("amlodipine", "ace_inhibitor"),
                class("atorvastatin", "statin"),
                class("simvastatin", "statin"),
                class("metformin", "biguanide"),
                class("warfarin", "anticoagulant"),
                class("oxycodone", "opioid"),
            ],
            lists: SubstanceLists {
                high_risk: vec![HighRiskSubstance {
                    substance: "warfarin".into(),
                    monitoring_labs: strings(&["34714-6"]),
                    monitoring_description: "INR".into(),
                }],
                controlled: strings(&["oxycodone", "alprazolam"]),
                tapering_required: strings(&["prednisone", "alprazolam"]),
                short_course: strings(&["amoxicillin"]),
                adverse_effect_tracking: strings(&["clozapine"]),
                high_risk_condition_prefixes: strings(&["I50", "N18"]),
                follow_up_required: vec![
                    DiscontinuationKind::Immediate,
                    DiscontinuationKind::AdverseReaction,
                ],
            },
            dose_limits: vec![
                DoseLimit {
                    substance: "metformin".into(),
                    max_single_dose_mg: 2000.0,
                    max_daily_dose_mg: 2550.0,
                    geriatric_max_daily_dose_mg: Some(2000.0),
                    pediatric_contraindicated: false,
                },
                DoseLimit {
                    substance: "aspirin".into(),
                    max_single_dose_mg: 1000.0,
                    max_daily_dose_mg: 4000.0,
                    geriatric_max_daily_dose_mg: Some(325.0),
                    pediatric_contraindicated: true,
                },
            ],
        }
    }

    /// Therapeutic class for a medication's display text, `unknown` if no
    /// entry matches. The first matching entry wins.
    pub fn therapeutic_class(&self, medication_text: &str) -> &str {
        let text = normalize_text(medication_text);
        self.therapeutic_classes
            .iter()
            .find(|e| contains_keyword(&text, &e.keyword))
            .map(|e| e.class.as_str())
            .unwrap_or(UNKNOWN_CLASS)
    }

    pub fn high_risk_substance(&self, medication_text: &str) -> Option<&HighRiskSubstance> {
        let text = normalize_text(medication_text);
        self.lists
            .high_risk
            .iter()
            .find(|s| contains_keyword(&text, &s.substance))
    }

    pub fn dose_limit(&self, medication_text: &str) -> Option<&DoseLimit> {
        let text = normalize_text(medication_text);
        self.dose_limits
            .iter()
            .find(|d| contains_keyword(&text, &d.substance))
    }

    pub fn is_controlled(&self, medication_text: &str) -> bool {
        matches_any(&self.lists.controlled, medication_text)
    }

    pub fn requires_tapering(&self, medication_text: &str) -> bool {
        matches_any(&self.lists.tapering_required, medication_text)
    }

    pub fn is_short_course(&self, medication_text: &str) -> bool {
        matches_any(&self.lists.short_course, medication_text)
    }

    pub fn requires_adverse_tracking(&self, medication_text: &str) -> bool {
        matches_any(&self.lists.adverse_effect_tracking, medication_text)
    }

    /// Condition codes are matched by prefix, case-insensitively.
    pub fn is_high_risk_condition(&self, code: &str) -> bool {
        let code = code.trim().to_uppercase();
        !code.is_empty()
            && self
                .lists
                .high_risk_condition_prefixes
                .iter()
                .any(|p| code.starts_with(&p.to_uppercase()))
    }

    pub fn follow_up_required(&self, kind: DiscontinuationKind) -> bool {
        self.lists.follow_up_required.contains(&kind)
    }
}

fn matches_any(keywords: &[String], medication_text: &str) -> bool {
    let text = normalize_text(medication_text);
    keywords.iter().any(|k| contains_keyword(&text, k))
}
