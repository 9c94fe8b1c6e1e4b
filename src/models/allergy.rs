use serde::{Deserialize, Serialize};

use super::enums::AllergyStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allergy {
    pub id: String,
    pub allergen: String,
    pub clinical_status: AllergyStatus,
}

impl Allergy {
    pub fn is_active(&self) -> bool {
        self.clinical_status == AllergyStatus::Active
    }
}
