use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::config::{self, SafetyConfig};
use crate::gateway::{gather_patient_data, GatheredData, PatientDataGateway};

use super::aggregate::aggregate;
use super::cache::{InMemoryVerificationCache, VerificationCache};
use super::recommendations::RecommendationGenerator;
use super::reference::SafetyReferenceData;
use super::risk_factors::analyze_risk_factors;
use super::rules::{Rule, RuleContext, RuleRegistry};
use super::types::{
    Category, CategoryResult, CategoryResults, Issue, RuleError, SafetyError, SafetyVerifier,
    VerificationReport,
};

type RuleTask = JoinHandle<Result<Vec<Issue>, RuleError>>;

/// Verification orchestrator.
/// Gathers the patient snapshot, runs every registered rule concurrently,
/// derives risk factors and assembles the report.
pub struct VerificationEngine {
    gateway: Arc<dyn PatientDataGateway>,
    registry: Arc<RuleRegistry>,
    context: Arc<RuleContext>,
    cache: Option<Arc<dyn VerificationCache>>,
    timeout: Duration,
}

impl VerificationEngine {
    /// Engine with the standard rule set and no cache.
    pub fn new(gateway: Arc<dyn PatientDataGateway>, context: RuleContext) -> Self {
        let timeout = context.config.verification_timeout();
        Self {
            gateway,
            registry: Arc::new(RuleRegistry::standard()),
            context: Arc::new(context),
            cache: None,
            timeout,
        }
    }

    /// Engine whose reference tables come from `config.reference_dir`, the
    /// default reference directory if present, or the bundled tables.
    pub fn from_config(
        gateway: Arc<dyn PatientDataGateway>,
        config: SafetyConfig,
    ) -> Result<Self, SafetyError> {
        let reference = match &config.reference_dir {
            Some(dir) => SafetyReferenceData::load(dir)?,
            None if config::reference_dir().is_dir() => {
                SafetyReferenceData::load(&config::reference_dir())?
            }
            None => SafetyReferenceData::bundled()?,
        };
        Ok(Self::new(
            gateway,
            RuleContext::with_snapshot_evidence(reference, config),
        ))
    }

    pub fn with_registry(mut self, registry: RuleRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn VerificationCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Attach an in-memory cache using the configured TTL.
    pub fn with_in_memory_cache(self) -> Self {
        let ttl = self.context.config.cache_ttl();
        self.with_cache(Arc::new(InMemoryVerificationCache::new(ttl)))
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// Verify with an explicit "now". Every rule and every due date in the
    /// report is computed against `now`, so the cache is never read here;
    /// the fresh report replaces any cached one.
    pub async fn verify_safety_at(
        &self,
        patient_id: &str,
        now: DateTime<Utc>,
    ) -> Result<VerificationReport, SafetyError> {
        let start = Instant::now();
        let patient_id = patient_id.trim();
        if patient_id.is_empty() {
            return Err(SafetyError::EmptyPatientId);
        }

        let deadline = tokio::time::Instant::now() + self.timeout;
        let timeout_ms = self.timeout.as_millis() as u64;

        let data = match tokio::time::timeout_at(
            deadline,
            gather_patient_data(self.gateway.as_ref(), patient_id, now),
        )
        .await
        {
            Ok(Ok(data)) => Arc::new(data),
            Ok(Err(e)) => return Err(SafetyError::PatientFetch(e)),
            Err(_) => {
                tracing::warn!(patient_id, timeout_ms, "Patient data gathering timed out");
                return Err(SafetyError::Timeout(timeout_ms));
            }
        };

        let pending = self.spawn_rules(&data);

        // Risk factors run on this task while the rules run on the blocking pool.
        let patient_risk =
            analyze_risk_factors(&data, &self.context.reference, &self.context.config);

        let mut categories = CategoryResults::default();
        for (category, tasks) in pending {
            let mut issues = Vec::new();
            for (rule, task) in tasks {
                issues.extend(Self::collect(patient_id, category, &rule, task, deadline).await);
            }
            categories.set(category, CategoryResult::from_issues(issues));
        }

        let overall = aggregate(&categories);
        let recommendations =
            RecommendationGenerator::recommendations(&overall, &categories, &patient_risk);
        let actions = RecommendationGenerator::actions(&categories, now);

        let mut report = VerificationReport::new(patient_id, now);
        report.overall = overall;
        report.categories = categories;
        report.recommendations = recommendations;
        report.actions = actions;
        report.patient_risk = patient_risk;
        report.diagnostics = data.diagnostics.clone();
        report.processing_time_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            patient_id,
            total = report.overall.total_issues,
            critical = report.overall.critical_issues,
            risk_level = report.overall.risk_level.as_str(),
            score = report.overall.score,
            processing_ms = report.processing_time_ms,
            "Safety verification complete"
        );

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put(&report) {
                tracing::warn!(patient_id, error = %e, "Failed to cache verification report");
            }
        }

        Ok(report)
    }

    /// One blocking task per rule, grouped by category in registry order.
    fn spawn_rules(&self, data: &Arc<GatheredData>) -> Vec<(Category, Vec<(Rule, RuleTask)>)> {
        Category::ALL
            .into_iter()
            .map(|category| {
                let tasks = self
                    .registry
                    .rules(category)
                    .iter()
                    .map(|rule| {
                        let data = Arc::clone(data);
                        let context = Arc::clone(&self.context);
                        let task_rule = rule.clone();
                        let task = tokio::task::spawn_blocking(move || {
                            task_rule.evaluate(&data.medications, &data, &context)
                        });
                        (rule.clone(), task)
                    })
                    .collect();
                (category, tasks)
            })
            .collect()
    }

    /// Await one rule. Errors, panics and timeouts become a single
    /// `verification_error` issue for that rule.
    async fn collect(
        patient_id: &str,
        category: Category,
        rule: &Rule,
        task: RuleTask,
        deadline: tokio::time::Instant,
    ) -> Vec<Issue> {
        let cause = match tokio::time::timeout_at(deadline, task).await {
            Ok(Ok(Ok(issues))) => return issues,
            Ok(Ok(Err(e))) => e.to_string(),
            Ok(Err(e)) if e.is_panic() => "rule panicked".to_string(),
            Ok(Err(_)) => "rule task cancelled".to_string(),
            Err(_) => "timed out".to_string(),
        };

        tracing::warn!(
            patient_id,
            category = category.key(),
            rule = rule.name,
            cause = %cause,
            "Safety rule failed"
        );
        vec![rule.failure_issue(&cause)]
    }
}

#[async_trait]
impl SafetyVerifier for VerificationEngine {
    /// Verify as of the current time, serving a live cached report if one exists.
    async fn verify_safety(&self, patient_id: &str) -> Result<VerificationReport, SafetyError> {
        let trimmed = patient_id.trim();
        if let Some(cache) = self.cache.as_ref().filter(|_| !trimmed.is_empty()) {
            if let Some(report) = cache.get(trimmed)? {
                tracing::debug!(patient_id = trimmed, "Verification served from cache");
                return Ok(report);
            }
        }
        self.verify_safety_at(patient_id, Utc::now()).await
    }

    fn invalidate(&self, patient_id: &str) -> Result<(), SafetyError> {
        if let Some(cache) = &self.cache {
            cache.invalidate(patient_id.trim())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration as ChronoDuration, NaiveDate};

    use super::*;
    use crate::gateway::{Collection, GatewayError, InMemoryGateway, PatientBundle};
    use crate::models::enums::ObservationCategory;
    use crate::models::{MedicationOrder, Observation, PatientRecord};
    use crate::verification::test_support::{days_ago, make_allergy, make_medication, now};
    use crate::verification::types::{
        IssueType, OverallRiskLevel, RecommendationPriority, RiskFactorType, RiskLevel,
    };

    fn patient(id: &str, birth: Option<NaiveDate>) -> PatientRecord {
        PatientRecord {
            id: id.into(),
            birth_date: birth,
        }
    }

    fn engine_for(bundle: PatientBundle) -> VerificationEngine {
        engine_with(InMemoryGateway::new().with_bundle(bundle), SafetyConfig::default())
    }

    fn engine_with(gateway: InMemoryGateway, config: SafetyConfig) -> VerificationEngine {
        VerificationEngine::new(
            Arc::new(gateway),
            RuleContext::with_snapshot_evidence(SafetyReferenceData::load_test(), config),
        )
    }

    fn failing_check(
        _: &[MedicationOrder],
        _: &GatheredData,
        _: &RuleContext,
    ) -> Result<Vec<Issue>, RuleError> {
        Err(RuleError::Lookup("formulary offline".into()))
    }

    fn panicking_check(
        _: &[MedicationOrder],
        _: &GatheredData,
        _: &RuleContext,
    ) -> Result<Vec<Issue>, RuleError> {
        panic!("rule bug");
    }

    fn slow_check(
        _: &[MedicationOrder],
        _: &GatheredData,
        _: &RuleContext,
    ) -> Result<Vec<Issue>, RuleError> {
        std::thread::sleep(std::time::Duration::from_millis(300));
        Ok(vec![])
    }

    #[tokio::test]
    async fn empty_patient_is_fully_safe() {
        let engine = engine_for(PatientBundle::new(patient("p1", None)));
        let report = engine.verify_safety_at("p1", now()).await.unwrap();

        assert!(report.overall.safe);
        assert_eq!(report.overall.score, 100);
        assert_eq!(report.overall.risk_level, OverallRiskLevel::Safe);
        assert!(report.recommendations.is_empty());
        assert!(report.actions.is_empty());
        for (_, result) in report.categories.iter() {
            assert!(result.safe);
            assert!(result.issues.is_empty());
        }
    }

    #[tokio::test]
    async fn empty_patient_id_rejected() {
        let engine = engine_for(PatientBundle::new(patient("p1", None)));
        let err = engine.verify_safety("  ").await.unwrap_err();
        assert!(matches!(err, SafetyError::EmptyPatientId));
    }

    #[tokio::test]
    async fn unknown_patient_is_fatal() {
        let engine = engine_for(PatientBundle::new(patient("p1", None)));
        let err = engine.verify_safety_at("p404", now()).await.unwrap_err();
        assert!(matches!(err, SafetyError::PatientFetch(GatewayError::NotFound(_))));
    }

    #[tokio::test]
    async fn geriatric_duplicate_therapy_scores_85() {
        let mut bundle = PatientBundle::new(patient("p1", NaiveDate::from_ymd_opt(1956, 1, 10)));
        bundle.medications = vec![
            make_medication("m1", "Lisinopril"),
            make_medication("m2", "Amlodipine"),
        ];
        let report = engine_for(bundle).verify_safety_at("p1", now()).await.unwrap();

        let issues = &report.categories.critical_safety.issues;
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].issue_type, IssueType::DuplicateTherapy);
        assert_eq!(issues[0].risk_level, RiskLevel::High);
        assert_eq!(issues[0].rule, "duplicate_therapy");
        assert!(report.patient_risk.has_factor(RiskFactorType::AgeGeriatric));
        assert_eq!(report.overall.risk_level, OverallRiskLevel::High);
        assert_eq!(report.overall.score, 85);
        assert!(!report.overall.safe);
    }

    #[tokio::test]
    async fn penicillin_allergy_is_critical() {
        let mut bundle = PatientBundle::new(patient("p1", None));
        bundle.medications = vec![make_medication("m1", "Penicillin V")];
        bundle.allergies = vec![make_allergy("a1", "Penicillin")];
        let report = engine_for(bundle).verify_safety_at("p1", now()).await.unwrap();

        assert_eq!(report.overall.critical_issues, 1);
        assert_eq!(report.overall.risk_level, OverallRiskLevel::Critical);
        assert_eq!(report.overall.score, 75);
        assert_eq!(report.recommendations[0].priority, RecommendationPriority::Urgent);
        assert_eq!(report.actions.len(), 1);
        assert_eq!(report.actions[0].due_date, now());
    }

    #[tokio::test]
    async fn overdue_assessment_alone_stays_safe() {
        let mut bundle = PatientBundle::new(patient("p1", None));
        let mut med = make_medication("m1", "Sertraline 50mg");
        med.prescribed_on = Some(days_ago(40));
        bundle.medications = vec![med];
        let report = engine_for(bundle).verify_safety_at("p1", now()).await.unwrap();

        assert_eq!(report.categories.process_safety.issues.len(), 1);
        assert!(!report.categories.process_safety.safe);
        assert!(report.overall.safe);
        assert_eq!(report.overall.risk_level, OverallRiskLevel::Low);
        assert_eq!(report.overall.score, 95);
        assert_eq!(
            report.recommendations[0].issue_type,
            Some(IssueType::OverdueAssessment)
        );
    }

    #[tokio::test]
    async fn three_same_class_meds_one_issue() {
        let mut bundle = PatientBundle::new(patient("p1", None));
        bundle.medications = vec![
            make_medication("m1", "Lisinopril"),
            make_medication("m2", "Enalapril"),
            make_medication("m3", "Ramipril"),
        ];
        let report = engine_for(bundle).verify_safety_at("p1", now()).await.unwrap();
        let duplicates: Vec<_> = report
            .categories
            .all_issues()
            .filter(|i| i.issue_type == IssueType::DuplicateTherapy)
            .collect();
        assert_eq!(duplicates.len(), 1);
        assert_eq!(duplicates[0].resource_ids.len(), 3);
    }

    #[tokio::test]
    async fn category_safe_matches_issues() {
        let mut bundle = PatientBundle::new(patient("p1", NaiveDate::from_ymd_opt(2015, 1, 1)));
        let mut warfarin = make_medication("m1", "Warfarin 5mg");
        warfarin.dosage = None;
        bundle.medications = vec![warfarin, make_medication("m2", "Metformin")];
        let report = engine_for(bundle).verify_safety_at("p1", now()).await.unwrap();

        for (_, result) in report.categories.iter() {
            assert_eq!(result.safe, result.issues.is_empty());
        }
        assert!(report.patient_risk.has_factor(RiskFactorType::AgePediatric));
    }

    #[tokio::test]
    async fn score_is_bounded_and_matches_formula() {
        let mut bundle = PatientBundle::new(patient("p1", None));
        bundle.allergies = (0..6).map(|i| make_allergy(&format!("a{i}"), "penicillin")).collect();
        bundle.medications = vec![make_medication("m1", "Penicillin V")];
        let report = engine_for(bundle).verify_safety_at("p1", now()).await.unwrap();

        let o = &report.overall;
        let expected = 100i64
            - 25 * o.critical_issues as i64
            - 15 * o.high_risk_issues as i64
            - 10 * o.medium_risk_issues as i64
            - 5 * o.low_risk_issues as i64;
        assert_eq!(o.score as i64, expected.max(0));
        assert_eq!(o.score, 0);
    }

    #[tokio::test]
    async fn failing_rule_becomes_verification_error() {
        let mut bundle = PatientBundle::new(patient("p1", None));
        bundle.medications = vec![make_medication("m1", "Atorvastatin"), make_medication("m2", "Simvastatin")];
        let registry = RuleRegistry::standard().with_rule(
            Category::WorkflowSafety,
            Rule::new("formulary_lookup", "Check formulary status", RiskLevel::Medium, failing_check),
        );
        let engine = engine_for(bundle).with_registry(registry);

        let report = engine.verify_safety_at("p1", now()).await.unwrap();

        let errors: Vec<_> = report
            .categories
            .workflow_safety
            .issues
            .iter()
            .filter(|i| i.issue_type == IssueType::VerificationError)
            .collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].risk_level, RiskLevel::Unknown);
        assert!(errors[0].message.contains("Check formulary status"));
        assert_eq!(report.overall.unknown_issues, 1);
        // Other rules still report.
        assert_eq!(report.overall.high_risk_issues, 1);
    }

    #[tokio::test]
    async fn panicking_rule_is_isolated() {
        let mut bundle = PatientBundle::new(patient("p1", None));
        bundle.medications = vec![make_medication("m1", "Penicillin V")];
        bundle.allergies = vec![make_allergy("a1", "Penicillin")];
        let registry = RuleRegistry::standard().with_rule(
            Category::CriticalSafety,
            Rule::new("broken", "Broken check", RiskLevel::High, panicking_check),
        );
        let report = engine_for(bundle)
            .with_registry(registry)
            .verify_safety_at("p1", now())
            .await
            .unwrap();

        let critical = &report.categories.critical_safety.issues;
        assert!(critical.iter().any(|i| i.issue_type == IssueType::AllergyConflict));
        let last = critical.last().unwrap();
        assert_eq!(last.issue_type, IssueType::VerificationError);
        assert_eq!(last.rule, "broken");
        assert!(!report.categories.critical_safety.safe);
    }

    #[tokio::test]
    async fn slow_rule_times_out_as_verification_error() {
        let config = SafetyConfig {
            verification_timeout_ms: 50,
            ..Default::default()
        };
        let gateway = InMemoryGateway::new().with_bundle(PatientBundle::new(patient("p1", None)));
        let registry = RuleRegistry::standard().with_rule(
            Category::ProcessSafety,
            Rule::new("slow", "Slow check", RiskLevel::Low, slow_check),
        );
        let engine = engine_with(gateway, config).with_registry(registry);

        let report = engine.verify_safety_at("p1", now()).await.unwrap();

        let process = &report.categories.process_safety.issues;
        assert_eq!(process.len(), 1);
        assert_eq!(process[0].rule, "slow");
        assert!(process[0].message.contains("timed out"));
        assert!(report.overall.safe);
    }

    #[tokio::test]
    async fn slow_gathering_is_a_timeout() {
        let config = SafetyConfig {
            verification_timeout_ms: 20,
            ..Default::default()
        };
        let gateway = InMemoryGateway::new()
            .with_bundle(PatientBundle::new(patient("p1", None)))
            .with_latency(std::time::Duration::from_millis(200));
        let err = engine_with(gateway, config)
            .verify_safety_at("p1", now())
            .await
            .unwrap_err();
        assert!(matches!(err, SafetyError::Timeout(20)));
    }

    #[tokio::test]
    async fn failed_collection_reported_in_diagnostics() {
        let mut bundle = PatientBundle::new(patient("p1", None));
        bundle.medications = vec![make_medication("m1", "Penicillin V")];
        bundle.allergies = vec![make_allergy("a1", "Penicillin")];
        let gateway = InMemoryGateway::new()
            .with_bundle(bundle)
            .failing(Collection::Allergies);
        let report = engine_with(gateway, SafetyConfig::default())
            .verify_safety_at("p1", now())
            .await
            .unwrap();

        assert_eq!(report.diagnostics.len(), 1);
        assert!(report.diagnostics[0].contains("allergies"));
        assert_eq!(report.overall.critical_issues, 0, "allergies evaluated as empty");
    }

    #[tokio::test]
    async fn repeated_runs_are_identical() {
        let mut bundle = PatientBundle::new(patient("p1", NaiveDate::from_ymd_opt(1950, 5, 5)));
        let mut warfarin = make_medication("m3", "Warfarin 5mg");
        warfarin.prescribed_on = Some(days_ago(60));
        bundle.medications = vec![
            make_medication("m1", "Lisinopril"),
            make_medication("m2", "Enalapril"),
            warfarin,
            make_medication("m4", "Amoxicillin 500mg"),
        ];
        bundle.allergies = vec![make_allergy("a1", "enalapril")];
        bundle.observations = vec![Observation {
            id: "o1".into(),
            code: "2160-0".into(),
            category: ObservationCategory::Laboratory,
            status: crate::models::enums::ObservationStatus::Final,
            effective_at: Some(now() - ChronoDuration::days(3)),
            focus: vec![],
        }];
        let engine = engine_for(bundle);

        let first = engine.verify_safety_at("p1", now()).await.unwrap();
        let second = engine.verify_safety_at("p1", now()).await.unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(first.categories, second.categories);
        assert_eq!(first.overall, second.overall);
        assert_eq!(first.recommendations, second.recommendations);
        assert_eq!(first.actions, second.actions);
        assert_eq!(first.patient_risk, second.patient_risk);
    }

    #[tokio::test]
    async fn cache_serves_until_invalidated() {
        let engine = engine_for(PatientBundle::new(patient("p1", None))).with_in_memory_cache();

        let first = engine.verify_safety("p1").await.unwrap();
        let cached = engine.verify_safety(" p1 ").await.unwrap();
        assert_eq!(first.id, cached.id);

        engine.invalidate("p1").unwrap();
        let fresh = engine.verify_safety("p1").await.unwrap();
        assert_ne!(first.id, fresh.id);
    }

    #[tokio::test]
    async fn explicit_now_bypasses_cached_report() {
        let mut bundle = PatientBundle::new(patient("p1", None));
        bundle.medications = vec![make_medication("m1", "Sertraline 50mg")];
        let engine = engine_for(bundle).with_in_memory_cache();

        let first = engine.verify_safety_at("p1", now()).await.unwrap();
        assert_eq!(first.overall.total_issues, 0);

        let later = now() + ChronoDuration::days(60);
        let second = engine.verify_safety_at("p1", later).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(second.generated_at, later);
        assert!(second
            .categories
            .process_safety
            .issues
            .iter()
            .any(|i| i.issue_type == IssueType::OverdueAssessment));

        // The fresh report replaced the cached one.
        let cached = engine.verify_safety("p1").await.unwrap();
        assert_eq!(cached.id, second.id);
    }

    #[tokio::test]
    async fn bundled_tables_flag_lisinopril_with_amlodipine() {
        let mut bundle = PatientBundle::new(patient("p1", NaiveDate::from_ymd_opt(1956, 1, 10)));
        bundle.medications = vec![
            make_medication("m1", "Lisinopril"),
            make_medication("m2", "Amlodipine"),
        ];
        let engine = VerificationEngine::new(
            Arc::new(InMemoryGateway::new().with_bundle(bundle)),
            RuleContext::with_snapshot_evidence(
                SafetyReferenceData::bundled().unwrap(),
                SafetyConfig::default(),
            ),
        );

        let report = engine.verify_safety_at("p1", now()).await.unwrap();
        assert_eq!(report.overall.high_risk_issues, 1);
        assert_eq!(report.overall.risk_level, OverallRiskLevel::High);
        assert_eq!(report.overall.score, 85);
    }

    #[tokio::test]
    async fn report_serializes_with_category_keys() {
        let engine = engine_for(PatientBundle::new(patient("p1", None)));
        let report = engine.verify_safety("p1").await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

        assert!(json["categories"]["criticalSafety"]["safe"].as_bool().unwrap());
        assert!(json["categories"]["workflowSafety"].is_object());
        assert!(json["categories"]["processSafety"].is_object());
        assert_eq!(json["overall"]["riskLevel"], "safe");
        assert_eq!(json["patientId"], "p1");
    }

    #[test]
    fn from_config_uses_bundled_tables() {
        let gateway: Arc<dyn PatientDataGateway> = Arc::new(InMemoryGateway::new());
        let engine = VerificationEngine::from_config(gateway, SafetyConfig::default()).unwrap();
        assert_eq!(engine.registry().len(), 10);
    }

    #[test]
    fn from_config_reports_missing_reference_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = SafetyConfig {
            reference_dir: Some(dir.path().join("absent")),
            ..Default::default()
        };
        let gateway: Arc<dyn PatientDataGateway> = Arc::new(InMemoryGateway::new());
        let err = VerificationEngine::from_config(gateway, config).err().unwrap();
        assert!(matches!(err, SafetyError::ReferenceDataLoad(_, _)));
    }
}
