use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::analytics::evaluation_models::FeatureFlagEvaluation;
use crate::analytics::evaluation_sink::EvaluationSink;
use crate::api::errors::FlagError;
use crate::audit::audit_models::FeatureFlagAudit;
use crate::audit::audit_store::AuditStore;
use crate::flags::flag_models::FeatureFlag;
use crate::flags::flag_store::FlagStore;
use crate::time::TimeSource;

pub fn random_string(prefix: &str, length: usize) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(Alphanumeric)
        .take(length)
        .map(char::from)
        .collect();
    format!("{}_{}", prefix, suffix)
}

/// Clock pinned to one instant, for tests that assert on timestamps.
#[derive(Clone)]
pub struct FixedTime(pub DateTime<Utc>);

impl TimeSource for FixedTime {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[derive(Default)]
struct MemoryState {
    flags: HashMap<String, FeatureFlag>,
    audits: Vec<FeatureFlagAudit>,
    evaluations: Vec<FeatureFlagEvaluation>,
    sink_failure: bool,
}

/// In-memory stand-in for all three stores, with the same compare-and-swap
/// update semantics as the Postgres implementations.
#[derive(Default)]
pub struct MemoryStorage {
    inner: Mutex<MemoryState>,
}

impl MemoryStorage {
    /// Inserts or replaces a flag directly, bypassing the audit trail the way
    /// seed data would.
    pub fn seed_flag(&self, flag: FeatureFlag) {
        let mut state = self.inner.lock().unwrap();
        state.flags.insert(flag.flag_key.clone(), flag);
    }

    pub fn audits(&self) -> Vec<FeatureFlagAudit> {
        self.inner.lock().unwrap().audits.clone()
    }

    pub fn evaluations(&self) -> Vec<FeatureFlagEvaluation> {
        self.inner.lock().unwrap().evaluations.clone()
    }

    /// Makes subsequent evaluation-log writes fail, to exercise the
    /// best-effort contract.
    pub fn fail_sink(&self, fail: bool) {
        self.inner.lock().unwrap().sink_failure = fail;
    }
}

#[async_trait]
impl FlagStore for MemoryStorage {
    async fn get_flag(&self, flag_key: &str) -> Result<Option<FeatureFlag>, FlagError> {
        let state = self.inner.lock().unwrap();
        Ok(state
            .flags
            .get(flag_key)
            .filter(|flag| !flag.deleted)
            .cloned())
    }

    async fn list_flags(&self) -> Result<Vec<FeatureFlag>, FlagError> {
        let state = self.inner.lock().unwrap();
        let mut flags: Vec<FeatureFlag> = state
            .flags
            .values()
            .filter(|flag| !flag.deleted)
            .cloned()
            .collect();
        flags.sort_by(|a, b| a.flag_key.cmp(&b.flag_key));
        Ok(flags)
    }

    async fn create_flag(
        &self,
        flag: &FeatureFlag,
        audit: &FeatureFlagAudit,
    ) -> Result<(), FlagError> {
        let mut state = self.inner.lock().unwrap();
        // Soft-deleted rows still hold the unique key, like the database
        // constraint would.
        if state.flags.contains_key(&flag.flag_key) {
            return Err(FlagError::FlagAlreadyExists(flag.flag_key.clone()));
        }
        state.flags.insert(flag.flag_key.clone(), flag.clone());
        state.audits.push(audit.clone());
        Ok(())
    }

    async fn update_flag(
        &self,
        flag: &FeatureFlag,
        expected_updated_at: DateTime<Utc>,
        audit: &FeatureFlagAudit,
    ) -> Result<(), FlagError> {
        let mut state = self.inner.lock().unwrap();
        match state.flags.get(&flag.flag_key).filter(|f| !f.deleted) {
            None => return Err(FlagError::FlagNotFound(flag.flag_key.clone())),
            Some(stored) if stored.updated_at != expected_updated_at => {
                return Err(FlagError::UpdateConflict(flag.flag_key.clone()));
            }
            Some(_) => {}
        }
        state.flags.insert(flag.flag_key.clone(), flag.clone());
        state.audits.push(audit.clone());
        Ok(())
    }

    async fn delete_flag(
        &self,
        flag_key: &str,
        deleted_at: DateTime<Utc>,
        audit: &FeatureFlagAudit,
    ) -> Result<(), FlagError> {
        let mut state = self.inner.lock().unwrap();
        match state.flags.get_mut(flag_key).filter(|f| !f.deleted) {
            None => return Err(FlagError::FlagNotFound(flag_key.to_string())),
            Some(stored) => {
                stored.deleted = true;
                stored.updated_at = deleted_at;
            }
        }
        state.audits.push(audit.clone());
        Ok(())
    }
}

#[async_trait]
impl AuditStore for MemoryStorage {
    async fn audit_trail(&self, flag_key: &str) -> Result<Vec<FeatureFlagAudit>, FlagError> {
        let state = self.inner.lock().unwrap();
        Ok(state
            .audits
            .iter()
            .filter(|audit| audit.flag_key == flag_key)
            .rev()
            .cloned()
            .collect())
    }
}

#[async_trait]
impl EvaluationSink for MemoryStorage {
    async fn send(&self, evaluation: FeatureFlagEvaluation) -> Result<(), FlagError> {
        let mut state = self.inner.lock().unwrap();
        if state.sink_failure {
            return Err(FlagError::DatabaseError("sink failure injected".to_string()));
        }
        state.evaluations.push(evaluation);
        Ok(())
    }
}
