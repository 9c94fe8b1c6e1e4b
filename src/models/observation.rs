use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{ObservationCategory, ObservationStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub id: String,
    /// LOINC code for labs, local code for assessments.
    pub code: String,
    pub category: ObservationCategory,
    pub status: ObservationStatus,
    pub effective_at: Option<DateTime<Utc>>,
    /// Resource identifiers this observation is about (e.g. a medication order).
    #[serde(default)]
    pub focus: Vec<String>,
}
