use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use super::types::{SafetyError, VerificationReport};

/// Optional report cache consulted by the engine when injected.
pub trait VerificationCache: Send + Sync {
    fn get(&self, patient_id: &str) -> Result<Option<VerificationReport>, SafetyError>;

    fn put(&self, report: &VerificationReport) -> Result<(), SafetyError>;

    /// Returns true if an entry was removed.
    fn invalidate(&self, patient_id: &str) -> Result<bool, SafetyError>;

    fn clear(&self) -> Result<(), SafetyError>;
}

struct CachedReport {
    report: VerificationReport,
    stored_at: Instant,
}

/// In-memory cache backed by RwLock. Entries expire after `ttl`.
pub struct InMemoryVerificationCache {
    entries: RwLock<HashMap<String, CachedReport>>,
    ttl: Duration,
}

impl InMemoryVerificationCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn len(&self) -> Result<usize, SafetyError> {
        let entries = self.entries.read().map_err(|_| SafetyError::LockFailed)?;
        Ok(entries.len())
    }

    pub fn is_empty(&self) -> Result<bool, SafetyError> {
        Ok(self.len()? == 0)
    }
}

impl VerificationCache for InMemoryVerificationCache {
    fn get(&self, patient_id: &str) -> Result<Option<VerificationReport>, SafetyError> {
        {
            let entries = self.entries.read().map_err(|_| SafetyError::LockFailed)?;
            match entries.get(patient_id) {
                None => return Ok(None),
                Some(entry) if entry.stored_at.elapsed() < self.ttl => {
                    return Ok(Some(entry.report.clone()));
                }
                Some(_) => {}
            }
        }

        // Expired: evict under the write lock.
        let mut entries = self.entries.write().map_err(|_| SafetyError::LockFailed)?;
        entries.remove(patient_id);
        tracing::debug!(patient_id, "Cached report expired");
        Ok(None)
    }

    fn put(&self, report: &VerificationReport) -> Result<(), SafetyError> {
        let mut entries = self.entries.write().map_err(|_| SafetyError::LockFailed)?;
        entries.insert(
            report.patient_id.clone(),
            CachedReport {
                report: report.clone(),
                stored_at: Instant::now(),
            },
        );
        Ok(())
    }

    fn invalidate(&self, patient_id: &str) -> Result<bool, SafetyError> {
        let mut entries = self.entries.write().map_err(|_| SafetyError::LockFailed)?;
        let removed = entries.remove(patient_id).is_some();
        if removed {
            tracing::debug!(patient_id, "Cached report invalidated");
        }
        Ok(removed)
    }

    fn clear(&self) -> Result<(), SafetyError> {
        let mut entries = self.entries.write().map_err(|_| SafetyError::LockFailed)?;
        entries.clear();
        Ok(())
    }
}
