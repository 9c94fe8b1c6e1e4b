use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::models::{DoseQuantity, MedicationOrder};

use super::types::{Issue, IssueType};

/// Lowercase, trim and collapse inner whitespace.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Whether already-normalized `text` contains `keyword`. Blank keywords
/// never match.
pub fn contains_keyword(text: &str, keyword: &str) -> bool {
    let keyword = normalize_text(keyword);
    !keyword.is_empty() && text.contains(&keyword)
}

/// Case-insensitive containment in either direction. Blank values never match.
pub fn mutual_contains(a: &str, b: &str) -> bool {
    let a = normalize_text(a);
    let b = normalize_text(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.contains(&b) || b.contains(&a)
}

/// Regex patterns for dose parsing (compiled once via LazyLock).
static RE_MCG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+\.?\d*)\s*(?:mcg|micrograms?|ug|µg)\b").expect("valid mcg regex")
});
static RE_MG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+\.?\d*)\s*(?:mg|milligrams?)\b").expect("valid mg regex"));
static RE_G: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+\.?\d*)\s*(?:g|grams?)\b").expect("valid g regex"));

/// Parse the first dose found in free text into milligrams.
/// Handles: "500mg", "1g", "250 mg", "0.5 g", "100mcg", "500 milligrams".
pub fn parse_dose_to_mg(text: &str) -> Option<f64> {
    let lower = text.to_lowercase();

    if let Some(caps) = RE_MCG.captures(&lower) {
        return caps.get(1)?.as_str().parse::<f64>().ok().map(|v| v / 1000.0);
    }
    if let Some(caps) = RE_MG.captures(&lower) {
        return caps.get(1)?.as_str().parse::<f64>().ok();
    }
    if let Some(caps) = RE_G.captures(&lower) {
        return caps.get(1)?.as_str().parse::<f64>().ok().map(|v| v * 1000.0);
    }

    None
}

/// Convert a structured dose into milligrams, if the unit is a mass unit.
pub fn quantity_to_mg(dose: &DoseQuantity) -> Option<f64> {
    match normalize_text(&dose.unit).as_str() {
        "mg" | "milligram" | "milligrams" => Some(dose.value),
        "g" | "gram" | "grams" => Some(dose.value * 1000.0),
        "mcg" | "ug" | "µg" | "microgram" | "micrograms" => Some(dose.value / 1000.0),
        _ => None,
    }
}

/// Single dose in mg: structured dose first, then the sig text, then the
/// display name ("Warfarin 5mg").
pub fn single_dose_mg(med: &MedicationOrder) -> Option<f64> {
    let dosage = med.dosage.as_ref();
    dosage
        .and_then(|d| d.dose.as_ref())
        .and_then(quantity_to_mg)
        .or_else(|| dosage.and_then(|d| d.text.as_deref()).and_then(parse_dose_to_mg))
        .or_else(|| parse_dose_to_mg(&med.display_name))
}

/// Whole days from `from` to `to` (negative if `from` is later).
pub fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_days()
}

/// Days a medication has been prescribed as of `now`, if known.
pub fn days_prescribed(med: &MedicationOrder, now: DateTime<Utc>) -> Option<i64> {
    med.prescribed_on.map(|p| days_between(p, now))
}

/// Distinct issue types in first-seen order.
pub fn distinct_issue_types(issues: &[Issue]) -> Vec<IssueType> {
    let mut seen = HashSet::new();
    issues
        .iter()
        .map(|i| i.issue_type)
        .filter(|t| seen.insert(*t))
        .collect()
}

/// Format a milligram value for display.
pub fn format_dose_mg(mg: f64) -> String {
    if mg >= 1000.0 {
        format!("{}g", mg / 1000.0)
    } else if mg < 1.0 {
        format!("{}mcg", mg * 1000.0)
    } else {
        format!("{}mg", mg)
    }
}
