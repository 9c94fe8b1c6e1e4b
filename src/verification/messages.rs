/// Message template builder for issue and recommendation text.
/// Clinician-facing: name the medication, state the finding, no speculation.
pub struct MessageTemplates;

impl MessageTemplates {
    pub fn duplicate_therapy(class: &str, medications: &[&str]) -> String {
        format!(
            "{} active medications share the therapeutic class {}: {}.",
            medications.len(),
            class,
            medications.join(", "),
        )
    }

    pub fn allergy_conflict(allergen: &str, medication: &str) -> String {
        format!(
            "Active medication {} conflicts with a documented active allergy to {}.",
            medication, allergen,
        )
    }

    pub fn missing_monitoring(medication: &str, monitoring: &str, days: i64) -> String {
        format!(
            "High-risk medication {} has no {} result in the last {} days.",
            medication, monitoring, days,
        )
    }

    pub fn unsafe_dosage(medication: &str, detail: &str) -> String {
        format!("Dosage of {} exceeds safety limits: {}.", medication, detail)
    }

    pub fn abrupt_discontinuation(medication: &str) -> String {
        format!(
            "{} was stopped immediately but requires a gradual taper.",
            medication,
        )
    }

    pub fn missing_followup(medication: &str, kind: &str) -> String {
        format!(
            "{} was discontinued ({}) and no follow-up is scheduled.",
            medication, kind,
        )
    }

    pub fn missing_dosage(medication: &str) -> String {
        format!("{} has no dosage instructions.", medication)
    }

    pub fn unclear_dosage(medication: &str) -> String {
        format!(
            "{} has dosage instructions without free text or a structured dose.",
            medication,
        )
    }

    pub fn missing_duration(medication: &str) -> String {
        format!(
            "{} is a short-course medication with no explicit duration.",
            medication,
        )
    }

    pub fn excessive_refills(medication: &str, refills: u32, max: u32) -> String {
        format!(
            "Controlled substance {} authorizes {} refills (limit {}).",
            medication, refills, max,
        )
    }

    pub fn early_refill_pattern(medication: &str) -> String {
        format!(
            "Refill history for {} shows refills before the prior supply was used.",
            medication,
        )
    }

    pub fn overdue_assessment(medication: &str, days_active: i64) -> String {
        format!(
            "{} has been active for {} days without a recent effectiveness assessment.",
            medication, days_active,
        )
    }

    pub fn missing_adverse_monitoring(medication: &str) -> String {
        format!(
            "{} requires adverse-effect tracking but none is documented.",
            medication,
        )
    }

    pub fn missing_education(medication: &str) -> String {
        format!(
            "{} was started recently and no patient education is documented.",
            medication,
        )
    }

    pub fn verification_error(rule_description: &str, cause: &str) -> String {
        format!(
            "Safety check could not be completed: {} ({}).",
            rule_description, cause,
        )
    }

    // -- Risk factors -------------------------------------------------------

    pub fn age_geriatric(age: u32) -> String {
        format!("Patient is {} years old (geriatric age bracket).", age)
    }

    pub fn age_pediatric(age: u32) -> String {
        format!("Patient is {} years old (pediatric age bracket).", age)
    }

    pub fn high_risk_condition(code: &str) -> String {
        format!("Active high-risk condition {}.", code)
    }

    pub fn multiple_allergies(count: usize) -> String {
        format!("Patient has {} active allergies.", count)
    }
}
