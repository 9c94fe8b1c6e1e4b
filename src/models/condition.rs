use serde::{Deserialize, Serialize};

use super::enums::ConditionStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub id: String,
    /// Coded diagnosis, e.g. an ICD-10 code such as "I50.9".
    pub code: String,
    pub clinical_status: ConditionStatus,
}
