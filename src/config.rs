use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::verification::types::SafetyError;

/// Application-level constants
pub const APP_NAME: &str = "Coheara";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable pointing at a JSON `SafetyConfig` file.
pub const CONFIG_ENV_VAR: &str = "COHEARA_SAFETY_CONFIG";

/// Log filter used when RUST_LOG is not set.
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "info,coheara_safety=debug"
    } else {
        "info"
    }
}

/// Get the application data directory
/// ~/Coheara/ on all platforms. Falls back to the working directory when no
/// home directory can be determined.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Coheara")
}

/// Default location of the safety reference tables.
pub fn reference_dir() -> PathBuf {
    app_data_dir().join("reference")
}

/// Tunable thresholds for the safety verification engine.
///
/// Every field has a default, so a config file only needs the values it
/// overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Deadline for a whole verification call.
    pub verification_timeout_ms: u64,
    /// A lab result older than this does not count as recent monitoring.
    pub lab_lookback_days: i64,
    /// Active for longer than this without an assessment is overdue.
    pub assessment_interval_days: i64,
    /// An effectiveness assessment older than this does not count.
    pub assessment_lookback_days: i64,
    /// Medications prescribed within this window are "new".
    pub new_medication_days: i64,
    /// Controlled substances may carry at most this many refills.
    pub max_controlled_refills: u32,
    /// A refill before this fraction of the previous supply elapsed is early.
    pub early_refill_ratio: f64,
    pub geriatric_age: u32,
    pub pediatric_age: u32,
    /// More than this many active allergies is a risk factor.
    pub allergy_burden_threshold: usize,
    pub cache_ttl_secs: u64,
    /// Directory holding reference JSON; bundled tables are used when unset.
    pub reference_dir: Option<PathBuf>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            verification_timeout_ms: 10_000,
            lab_lookback_days: 90,
            assessment_interval_days: 30,
            assessment_lookback_days: 90,
            new_medication_days: 7,
            max_controlled_refills: 5,
            early_refill_ratio: 0.75,
            geriatric_age: 65,
            pediatric_age: 18,
            allergy_burden_threshold: 3,
            cache_ttl_secs: 300,
            reference_dir: None,
        }
    }
}

impl SafetyConfig {
    /// Load a config from a JSON file.
    pub fn load(path: &Path) -> Result<Self, SafetyError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| SafetyError::ConfigLoad(path.display().to_string(), e.to_string()))?;
        serde_json::from_str(&json)
            .map_err(|e| SafetyError::ConfigLoad(path.display().to_string(), e.to_string()))
    }

    /// Load from the file named by `COHEARA_SAFETY_CONFIG`, or defaults.
    pub fn from_env() -> Result<Self, SafetyError> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => {
                let path = PathBuf::from(path);
                tracing::info!(path = %path.display(), "Loading safety config");
                Self::load(&path)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn verification_timeout(&self) -> Duration {
        Duration::from_millis(self.verification_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn app_data_dir_ends_with_app_name() {
        assert!(app_data_dir().ends_with("Coheara"));
        assert!(reference_dir().starts_with(app_data_dir()));
    }

    #[test]
    fn app_name_is_coheara() {
        assert_eq!(APP_NAME, "Coheara");
    }

    #[test]
    fn defaults_match_documented_thresholds() {
        let config = SafetyConfig::default();
        assert_eq!(config.assessment_interval_days, 30);
        assert_eq!(config.new_medication_days, 7);
        assert_eq!(config.max_controlled_refills, 5);
        assert_eq!(config.geriatric_age, 65);
        assert_eq!(config.pediatric_age, 18);
        assert_eq!(config.allergy_burden_threshold, 3);
        assert_eq!(config.verification_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"verification_timeout_ms": 250, "geriatric_age": 70}}"#).unwrap();

        let config = SafetyConfig::load(file.path()).unwrap();
        assert_eq!(config.verification_timeout_ms, 250);
        assert_eq!(config.geriatric_age, 70);
        assert_eq!(config.lab_lookback_days, 90);
    }

    #[test]
    fn malformed_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = SafetyConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, SafetyError::ConfigLoad(_, _)));
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = SafetyConfig::load(Path::new("/nonexistent/safety.json")).unwrap_err();
        assert!(matches!(err, SafetyError::ConfigLoad(_, _)));
    }
}
