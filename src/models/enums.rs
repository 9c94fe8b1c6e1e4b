use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Invalid value for {field}: {value}")]
    InvalidEnum { field: String, value: String },
}

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = ModelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(ModelError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(MedicationStatus {
    Active => "active",
    OnHold => "on-hold",
    Stopped => "stopped",
    Completed => "completed",
    Cancelled => "cancelled",
    EnteredInError => "entered-in-error",
    Draft => "draft",
    Unknown => "unknown",
});

impl MedicationStatus {
    /// Terminal orders are no longer being taken and are excluded from
    /// completeness checks.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Stopped | Self::Completed | Self::Cancelled | Self::EnteredInError
        )
    }
}

str_enum!(AllergyStatus {
    Active => "active",
    Inactive => "inactive",
    Resolved => "resolved",
});

str_enum!(ConditionStatus {
    Active => "active",
    Recurrence => "recurrence",
    Relapse => "relapse",
    Inactive => "inactive",
    Remission => "remission",
    Resolved => "resolved",
});

impl ConditionStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active | Self::Recurrence | Self::Relapse)
    }
}

str_enum!(DiscontinuationKind {
    Immediate => "immediate",
    Tapered => "tapered",
    Completed => "completed",
    AdverseReaction => "adverse_reaction",
    Ineffective => "ineffective",
});

str_enum!(ObservationCategory {
    Laboratory => "laboratory",
    Assessment => "assessment",
    VitalSigns => "vital-signs",
    Other => "other",
});

str_enum!(ObservationStatus {
    Registered => "registered",
    Preliminary => "preliminary",
    Final => "final",
    Amended => "amended",
    Cancelled => "cancelled",
    EnteredInError => "entered-in-error",
});

impl ObservationStatus {
    /// Only resulted observations count as evidence.
    pub fn is_resulted(&self) -> bool {
        matches!(self, Self::Final | Self::Amended | Self::Preliminary)
    }
}

str_enum!(CarePlanStatus {
    Draft => "draft",
    Active => "active",
    OnHold => "on-hold",
    Completed => "completed",
    Revoked => "revoked",
});

str_enum!(ActivityKind {
    PatientEducation => "patient-education",
    AdverseEffectMonitoring => "adverse-effect-monitoring",
    FollowUp => "follow-up",
    EffectivenessReview => "effectiveness-review",
    Other => "other",
});

str_enum!(ActivityStatus {
    NotStarted => "not-started",
    Scheduled => "scheduled",
    InProgress => "in-progress",
    Completed => "completed",
    Cancelled => "cancelled",
});

impl ActivityStatus {
    pub fn is_live(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn medication_status_roundtrip() {
        assert_eq!(MedicationStatus::from_str("on-hold"), Ok(MedicationStatus::OnHold));
        assert_eq!(MedicationStatus::OnHold.as_str(), "on-hold");
    }

    #[test]
    fn invalid_enum_reports_field() {
        let err = AllergyStatus::from_str("maybe").unwrap_err();
        assert_eq!(
            err,
            ModelError::InvalidEnum {
                field: "AllergyStatus".into(),
                value: "maybe".into()
            }
        );
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&MedicationStatus::EnteredInError).unwrap();
        assert_eq!(json, "\"entered-in-error\"");
        let parsed: ActivityKind = serde_json::from_str("\"patient-education\"").unwrap();
        assert_eq!(parsed, ActivityKind::PatientEducation);
    }

    #[test]
    fn terminal_statuses() {
        assert!(MedicationStatus::Stopped.is_terminal());
        assert!(!MedicationStatus::OnHold.is_terminal());
        assert!(!MedicationStatus::Active.is_terminal());
    }

    #[test]
    fn condition_activity() {
        assert!(ConditionStatus::Relapse.is_active());
        assert!(!ConditionStatus::Resolved.is_active());
    }
}
