use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{DiscontinuationKind, MedicationStatus};

/// A medication order as supplied by the patient data gateway. Read-only to
/// the verification engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationOrder {
    pub id: String,
    pub display_name: String,
    pub status: MedicationStatus,
    pub prescribed_on: Option<DateTime<Utc>>,
    #[serde(default)]
    pub dosage: Option<DosageInstruction>,
    #[serde(default)]
    pub refills_allowed: u32,
    #[serde(default)]
    pub dispenses: Vec<DispenseRecord>,
    #[serde(default)]
    pub discontinuation: Option<DiscontinuationRecord>,
}

impl MedicationOrder {
    pub fn is_active(&self) -> bool {
        self.status == MedicationStatus::Active
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DosageInstruction {
    /// Free-text sig, e.g. "10 mg by mouth once daily".
    pub text: Option<String>,
    pub dose: Option<DoseQuantity>,
    pub frequency_per_day: Option<f64>,
    pub duration_days: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoseQuantity {
    pub value: f64,
    pub unit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispenseRecord {
    pub dispensed_on: NaiveDate,
    pub days_supply: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscontinuationRecord {
    pub kind: DiscontinuationKind,
    pub reason: Option<String>,
    pub discontinued_on: Option<NaiveDate>,
}
