//! Patient data gateway: the external collaborator that supplies clinical
//! records, and the concurrent gathering step that turns its six collections
//! into one immutable `GatheredData` snapshot.
//!
//! Only the patient record is mandatory. Any other collection that fails to
//! load degrades to empty and leaves a diagnostic note on the snapshot.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Allergy, CarePlan, Condition, MedicationOrder, Observation, PatientRecord};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Data source unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

/// The six collections a gateway serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Patient,
    Medications,
    Allergies,
    Conditions,
    Observations,
    CarePlans,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Patient => "patient",
            Self::Medications => "medications",
            Self::Allergies => "allergies",
            Self::Conditions => "conditions",
            Self::Observations => "observations",
            Self::CarePlans => "care_plans",
        }
    }
}

/// Supplies typed clinical records for a patient. Each fetch may fail
/// independently of the others.
#[async_trait]
pub trait PatientDataGateway: Send + Sync {
    async fn fetch_patient(&self, patient_id: &str) -> Result<PatientRecord, GatewayError>;

    async fn fetch_medications(
        &self,
        patient_id: &str,
    ) -> Result<Vec<MedicationOrder>, GatewayError>;

    async fn fetch_allergies(&self, patient_id: &str) -> Result<Vec<Allergy>, GatewayError>;

    async fn fetch_conditions(&self, patient_id: &str) -> Result<Vec<Condition>, GatewayError>;

    async fn fetch_observations(&self, patient_id: &str)
        -> Result<Vec<Observation>, GatewayError>;

    async fn fetch_care_plans(&self, patient_id: &str) -> Result<Vec<CarePlan>, GatewayError>;
}

// ---------------------------------------------------------------------------
// GatheredData
// ---------------------------------------------------------------------------

/// Immutable snapshot assembled once per verification run. Every rule reads
/// the same snapshot, and `gathered_at` is the single "now" they all share.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatheredData {
    pub patient: PatientRecord,
    pub medications: Vec<MedicationOrder>,
    pub allergies: Vec<Allergy>,
    pub conditions: Vec<Condition>,
    pub observations: Vec<Observation>,
    pub care_plans: Vec<CarePlan>,
    pub gathered_at: DateTime<Utc>,
    pub diagnostics: Vec<String>,
}

impl GatheredData {
    /// Snapshot with only a patient record.
    pub fn for_patient(patient: PatientRecord, gathered_at: DateTime<Utc>) -> Self {
        Self {
            patient,
            medications: Vec::new(),
            allergies: Vec::new(),
            conditions: Vec::new(),
            observations: Vec::new(),
            care_plans: Vec::new(),
            gathered_at,
            diagnostics: Vec::new(),
        }
    }

    pub fn active_allergies(&self) -> impl Iterator<Item = &Allergy> {
        self.allergies.iter().filter(|a| a.is_active())
    }

    /// Patient age on the snapshot date.
    pub fn patient_age(&self) -> Option<u32> {
        self.patient.age_on(self.gathered_at.date_naive())
    }
}

/// Fetch every collection concurrently and assemble the snapshot.
///
/// Fails only when the patient record itself cannot be fetched.
pub async fn gather_patient_data(
    gateway: &dyn PatientDataGateway,
    patient_id: &str,
    gathered_at: DateTime<Utc>,
) -> Result<GatheredData, GatewayError> {
    let (patient, medications, allergies, conditions, observations, care_plans) = tokio::join!(
        gateway.fetch_patient(patient_id),
        gateway.fetch_medications(patient_id),
        gateway.fetch_allergies(patient_id),
        gateway.fetch_conditions(patient_id),
        gateway.fetch_observations(patient_id),
        gateway.fetch_care_plans(patient_id),
    );

    let patient = patient.inspect_err(|e| {
        tracing::error!(patient_id, error = %e, "Patient record fetch failed");
    })?;

    let mut diagnostics = Vec::new();
    let medications = degrade(Collection::Medications, patient_id, medications, &mut diagnostics);
    let allergies = degrade(Collection::Allergies, patient_id, allergies, &mut diagnostics);
    let conditions = degrade(Collection::Conditions, patient_id, conditions, &mut diagnostics);
    let observations =
        degrade(Collection::Observations, patient_id, observations, &mut diagnostics);
    let care_plans = degrade(Collection::CarePlans, patient_id, care_plans, &mut diagnostics);

    tracing::debug!(
        patient_id,
        medications = medications.len(),
        allergies = allergies.len(),
        conditions = conditions.len(),
        observations = observations.len(),
        care_plans = care_plans.len(),
        degraded = diagnostics.len(),
        "Patient data gathered"
    );

    Ok(GatheredData {
        patient,
        medications,
        allergies,
        conditions,
        observations,
        care_plans,
        gathered_at,
        diagnostics,
    })
}

/// A failed collection becomes empty, logged and noted.
fn degrade<T>(
    collection: Collection,
    patient_id: &str,
    result: Result<Vec<T>, GatewayError>,
    diagnostics: &mut Vec<String>,
) -> Vec<T> {
    match result {
        Ok(items) => items,
        Err(e) => {
            tracing::warn!(
                patient_id,
                collection = collection.as_str(),
                error = %e,
                "Collection fetch failed, continuing with empty collection"
            );
            diagnostics.push(format!(
                "{} unavailable, evaluated as empty: {}",
                collection.as_str(),
                e
            ));
            Vec::new()
        }
    }
}

// ---------------------------------------------------------------------------
// InMemoryGateway
// ---------------------------------------------------------------------------

/// All records for one patient, as served by `InMemoryGateway`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientBundle {
    pub patient: PatientRecord,
    #[serde(default)]
    pub medications: Vec<MedicationOrder>,
    #[serde(default)]
    pub allergies: Vec<Allergy>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub observations: Vec<Observation>,
    #[serde(default)]
    pub care_plans: Vec<CarePlan>,
}

impl PatientBundle {
    pub fn new(patient: PatientRecord) -> Self {
        Self {
            patient,
            medications: Vec::new(),
            allergies: Vec::new(),
            conditions: Vec::new(),
            observations: Vec::new(),
            care_plans: Vec::new(),
        }
    }
}

/// Gateway over pre-loaded bundles. Collections can be marked failing and a
/// per-fetch latency can be injected.
#[derive(Debug, Default)]
pub struct InMemoryGateway {
    bundles: HashMap<String, PatientBundle>,
    failing: HashSet<Collection>,
    latency: Option<Duration>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON array of bundles.
    pub fn from_json(json: &str) -> Result<Self, GatewayError> {
        let bundles: Vec<PatientBundle> =
            serde_json::from_str(json).map_err(|e| GatewayError::InvalidRecord(e.to_string()))?;
        Ok(bundles
            .into_iter()
            .fold(Self::new(), |gateway, bundle| gateway.with_bundle(bundle)))
    }

    pub fn with_bundle(mut self, bundle: PatientBundle) -> Self {
        self.bundles.insert(bundle.patient.id.clone(), bundle);
        self
    }

    pub fn failing(mut self, collection: Collection) -> Self {
        self.failing.insert(collection);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    async fn bundle(
        &self,
        collection: Collection,
        patient_id: &str,
    ) -> Result<&PatientBundle, GatewayError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.contains(&collection) {
            return Err(GatewayError::Unavailable(collection.as_str().to_string()));
        }
        self.bundles
            .get(patient_id)
            .ok_or_else(|| GatewayError::NotFound(patient_id.to_string()))
    }
}

#[async_trait]
impl PatientDataGateway for InMemoryGateway {
    async fn fetch_patient(&self, patient_id: &str) -> Result<PatientRecord, GatewayError> {
        Ok(self.bundle(Collection::Patient, patient_id).await?.patient.clone())
    }

    async fn fetch_medications(
        &self,
        patient_id: &str,
    ) -> Result<Vec<MedicationOrder>, GatewayError> {
        Ok(self
            .bundle(Collection::Medications, patient_id)
            .await?
            .medications
            .clone())
    }

    async fn fetch_allergies(&self, patient_id: &str) -> Result<Vec<Allergy>, GatewayError> {
        Ok(self.bundle(Collection::Allergies, patient_id).await?.allergies.clone())
    }

    async fn fetch_conditions(&self, patient_id: &str) -> Result<Vec<Condition>, GatewayError> {
        Ok(self.bundle(Collection::Conditions, patient_id).await?.conditions.clone())
    }

    async fn fetch_observations(
        &self,
        patient_id: &str,
    ) -> Result<Vec<Observation>, GatewayError> {
        Ok(self
            .bundle(Collection::Observations, patient_id)
            .await?
            .observations
            .clone())
    }

    async fn fetch_care_plans(&self, patient_id: &str) -> Result<Vec<CarePlan>, GatewayError> {
        Ok(self.bundle(Collection::CarePlans, patient_id).await?.care_plans.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::{AllergyStatus, MedicationStatus};

    fn bundle() -> PatientBundle {
        let mut bundle = PatientBundle::new(PatientRecord {
            id: "p1".into(),
            birth_date: None,
        });
        bundle.allergies.push(Allergy {
            id: "a1".into(),
            allergen: "Penicillin".into(),
            clinical_status: AllergyStatus::Active,
        });
        bundle.medications.push(MedicationOrder {
            id: "m1".into(),
            display_name: "Metformin 500mg".into(),
            status: MedicationStatus::Active,
            prescribed_on: None,
            dosage: None,
            refills_allowed: 0,
            dispenses: vec![],
            discontinuation: None,
        });
        bundle
    }

    #[tokio::test]
    async fn gathers_all_collections() {
        let gateway = InMemoryGateway::new().with_bundle(bundle());
        let data = gather_patient_data(&gateway, "p1", Utc::now()).await.unwrap();
        assert_eq!(data.medications.len(), 1);
        assert_eq!(data.allergies.len(), 1);
        assert!(data.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn failed_collection_degrades_to_empty_with_note() {
        let gateway = InMemoryGateway::new()
            .with_bundle(bundle())
            .failing(Collection::Allergies);
        let data = gather_patient_data(&gateway, "p1", Utc::now()).await.unwrap();

        assert!(data.allergies.is_empty());
        assert_eq!(data.medications.len(), 1, "sibling fetches must not be aborted");
        assert_eq!(data.diagnostics.len(), 1);
        assert!(data.diagnostics[0].starts_with("allergies"));
    }

    #[tokio::test]
    async fn missing_patient_is_fatal() {
        let gateway = InMemoryGateway::new().with_bundle(bundle());
        let err = gather_patient_data(&gateway, "nobody", Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::NotFound("nobody".into()));
    }

    #[tokio::test]
    async fn failed_patient_fetch_is_fatal() {
        let gateway = InMemoryGateway::new()
            .with_bundle(bundle())
            .failing(Collection::Patient);
        assert!(gather_patient_data(&gateway, "p1", Utc::now()).await.is_err());
    }

    #[test]
    fn bundles_load_from_json() {
        let json = r#"[{
            "patient": {"id": "p9", "birthDate": "1950-03-01"},
            "medications": [{
                "id": "m1", "displayName": "Warfarin 5mg", "status": "active",
                "prescribedOn": "2026-01-01T00:00:00Z"
            }]
        }]"#;
        let gateway = InMemoryGateway::from_json(json).unwrap();
        let bundle = gateway.bundles.get("p9").unwrap();
        assert_eq!(bundle.medications[0].status, MedicationStatus::Active);
        assert!(bundle.allergies.is_empty());
    }

    #[test]
    fn invalid_json_is_invalid_record() {
        assert!(matches!(
            InMemoryGateway::from_json("{"),
            Err(GatewayError::InvalidRecord(_))
        ));
    }
}
