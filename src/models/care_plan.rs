use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{ActivityKind, ActivityStatus, CarePlanStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarePlan {
    pub id: String,
    pub status: CarePlanStatus,
    #[serde(default)]
    pub activities: Vec<CarePlanActivity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarePlanActivity {
    pub kind: ActivityKind,
    pub status: ActivityStatus,
    /// Identifier of the resource the activity addresses, usually a medication order.
    pub reference: Option<String>,
    pub scheduled_for: Option<DateTime<Utc>>,
}

impl CarePlan {
    /// Live activities of `kind` that reference `resource_id`.
    pub fn activities_for<'a>(
        &'a self,
        kind: ActivityKind,
        resource_id: &'a str,
    ) -> impl Iterator<Item = &'a CarePlanActivity> + 'a {
        self.activities.iter().filter(move |a| {
            a.kind == kind
                && a.status.is_live()
                && a.reference.as_deref() == Some(resource_id)
        })
    }
}
