pub mod allergy;
pub mod care_plan;
pub mod condition;
pub mod enums;
pub mod medication;
pub mod observation;
pub mod patient;

pub use allergy::Allergy;
pub use care_plan::{CarePlan, CarePlanActivity};
pub use condition::Condition;
pub use medication::{
    DiscontinuationRecord, DispenseRecord, DosageInstruction, DoseQuantity, MedicationOrder,
};
pub use observation::Observation;
pub use patient::PatientRecord;
