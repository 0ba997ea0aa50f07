use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::api::errors::FlagError;
use crate::audit::audit_models::{ActorType, AuditAction, FeatureFlagAudit};
use crate::flags::flag_models::{FeatureFlag, FlagPatch};
use crate::flags::flag_store::FlagStore;
use crate::time::TimeSource;

/// The administration surface. All mutations run through here so that every
/// effective change leaves exactly one audit row, and none of them touch the
/// store when validation fails.
pub struct FlagAdminService {
    flag_store: Arc<dyn FlagStore + Send + Sync>,
    time: Arc<dyn TimeSource + Send + Sync>,
}

fn snapshot(flag: &FeatureFlag) -> Result<serde_json::Value, FlagError> {
    serde_json::to_value(flag).map_err(|e| {
        tracing::error!("failed to snapshot flag {}: {}", flag.flag_key, e);
        FlagError::DataParsingError
    })
}

fn audit_row(
    flag_key: &str,
    action: AuditAction,
    actor_id: String,
    before_state: Option<serde_json::Value>,
    after_state: Option<serde_json::Value>,
    reason: Option<String>,
    timestamp: DateTime<Utc>,
) -> FeatureFlagAudit {
    FeatureFlagAudit {
        flag_key: flag_key.to_string(),
        actor_id,
        actor_type: ActorType::Admin,
        action,
        before_state,
        after_state,
        reason,
        timestamp,
    }
}

impl FlagAdminService {
    pub fn new(
        flag_store: Arc<dyn FlagStore + Send + Sync>,
        time: Arc<dyn TimeSource + Send + Sync>,
    ) -> Self {
        FlagAdminService { flag_store, time }
    }

    #[instrument(skip_all, fields(flag_key = %flag_key))]
    pub async fn create_flag(
        &self,
        flag_key: String,
        patch: FlagPatch,
        actor_id: String,
        reason: Option<String>,
    ) -> Result<FeatureFlag, FlagError> {
        if flag_key.trim().is_empty() {
            return Err(FlagError::EmptyFlagKey);
        }
        patch.validate()?;

        let now = self.time.now();
        let mut flag = FeatureFlag::new(flag_key, now);
        patch.apply(&mut flag);

        let audit = audit_row(
            &flag.flag_key,
            AuditAction::Create,
            actor_id,
            None,
            Some(snapshot(&flag)?),
            reason,
            now,
        );
        self.flag_store.create_flag(&flag, &audit).await?;

        Ok(flag)
    }

    /// Applies a partial update. A no-op patch (nothing effectively changes)
    /// leaves `updated_at` alone and writes no audit row.
    #[instrument(skip_all, fields(flag_key = %flag_key))]
    pub async fn update_flag(
        &self,
        flag_key: &str,
        patch: FlagPatch,
        actor_id: String,
        reason: Option<String>,
    ) -> Result<FeatureFlag, FlagError> {
        patch.validate()?;

        let current = self
            .flag_store
            .get_flag(flag_key)
            .await?
            .ok_or_else(|| FlagError::FlagNotFound(flag_key.to_string()))?;

        let mut updated = current.clone();
        patch.apply(&mut updated);

        if updated == current {
            return Ok(current);
        }

        let before_state = snapshot(&current)?;
        let expected_updated_at = current.updated_at;
        updated.updated_at = self.time.now();
        let after_state = snapshot(&updated)?;

        let audit = audit_row(
            flag_key,
            AuditAction::Update,
            actor_id,
            Some(before_state),
            Some(after_state),
            reason,
            updated.updated_at,
        );
        self.flag_store
            .update_flag(&updated, expected_updated_at, &audit)
            .await?;

        Ok(updated)
    }

    #[instrument(skip_all, fields(flag_key = %flag_key))]
    pub async fn delete_flag(
        &self,
        flag_key: &str,
        actor_id: String,
        reason: Option<String>,
    ) -> Result<(), FlagError> {
        let current = self
            .flag_store
            .get_flag(flag_key)
            .await?
            .ok_or_else(|| FlagError::FlagNotFound(flag_key.to_string()))?;

        let now = self.time.now();
        let audit = audit_row(
            flag_key,
            AuditAction::Delete,
            actor_id,
            Some(snapshot(&current)?),
            None,
            reason,
            now,
        );
        self.flag_store.delete_flag(flag_key, now, &audit).await
    }

    pub async fn get_flag(&self, flag_key: &str) -> Result<FeatureFlag, FlagError> {
        self.flag_store
            .get_flag(flag_key)
            .await?
            .ok_or_else(|| FlagError::FlagNotFound(flag_key.to_string()))
    }

    pub async fn list_flags(&self) -> Result<Vec<FeatureFlag>, FlagError> {
        self.flag_store.list_flags().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::test_utils::{FixedTime, MemoryStorage};

    fn admin(storage: &Arc<MemoryStorage>) -> FlagAdminService {
        let time = FixedTime(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
        FlagAdminService::new(storage.clone(), Arc::new(time))
    }

    fn rollout_patch(percentage: i16) -> FlagPatch {
        FlagPatch {
            rollout_percentage: Some(percentage),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_writes_flag_and_audit() {
        let storage = Arc::new(MemoryStorage::default());
        let flag = admin(&storage)
            .create_flag(
                "checkout_v2".to_string(),
                rollout_patch(10),
                "alice".to_string(),
                Some("initial rollout".to_string()),
            )
            .await
            .unwrap();

        assert_eq!(flag.rollout_percentage, 10);
        assert!(!flag.enabled);

        let audits = storage.audits();
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].action, AuditAction::Create);
        assert_eq!(audits[0].actor_type, ActorType::Admin);
        assert_eq!(audits[0].actor_id, "alice");
        assert_eq!(audits[0].before_state, None);
        assert_eq!(
            audits[0].after_state,
            Some(serde_json::to_value(&flag).unwrap())
        );
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_key() {
        let storage = Arc::new(MemoryStorage::default());
        let admin = admin(&storage);
        admin
            .create_flag(
                "checkout_v2".to_string(),
                FlagPatch::default(),
                "alice".to_string(),
                None,
            )
            .await
            .unwrap();

        match admin
            .create_flag(
                "checkout_v2".to_string(),
                FlagPatch::default(),
                "alice".to_string(),
                None,
            )
            .await
        {
            Err(FlagError::FlagAlreadyExists(_)) => (),
            other => panic!("expected FlagAlreadyExists, got {:?}", other),
        }
        assert_eq!(storage.audits().len(), 1);
    }

    #[tokio::test]
    async fn test_update_snapshots_before_and_after() {
        let storage = Arc::new(MemoryStorage::default());
        let admin = admin(&storage);
        let created = admin
            .create_flag(
                "checkout_v2".to_string(),
                FlagPatch::default(),
                "alice".to_string(),
                None,
            )
            .await
            .unwrap();

        let updated = admin
            .update_flag(
                "checkout_v2",
                FlagPatch {
                    enabled: Some(true),
                    rollout_percentage: Some(25),
                    ..Default::default()
                },
                "bob".to_string(),
                Some("start the rollout".to_string()),
            )
            .await
            .unwrap();

        assert!(updated.enabled);
        assert_eq!(updated.rollout_percentage, 25);

        let audits = storage.audits();
        assert_eq!(audits.len(), 2);
        let update_audit = audits
            .iter()
            .find(|a| a.action == AuditAction::Update)
            .unwrap();
        assert_eq!(
            update_audit.before_state,
            Some(serde_json::to_value(&created).unwrap())
        );
        assert_eq!(
            update_audit.after_state,
            Some(serde_json::to_value(&updated).unwrap())
        );
        assert_eq!(update_audit.reason, Some("start the rollout".to_string()));
    }

    #[tokio::test]
    async fn test_noop_update_writes_no_audit_and_keeps_updated_at() {
        let storage = Arc::new(MemoryStorage::default());
        let created_at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let created = FlagAdminService::new(storage.clone(), Arc::new(FixedTime(created_at)))
            .create_flag(
                "checkout_v2".to_string(),
                rollout_patch(10),
                "alice".to_string(),
                None,
            )
            .await
            .unwrap();

        // A later no-op update must not move updated_at to the newer clock.
        let later = Utc.with_ymd_and_hms(2024, 6, 2, 12, 0, 0).unwrap();
        let admin = FlagAdminService::new(storage.clone(), Arc::new(FixedTime(later)));
        let unchanged = admin
            .update_flag("checkout_v2", rollout_patch(10), "bob".to_string(), None)
            .await
            .unwrap();

        assert_eq!(unchanged, created);
        assert_eq!(unchanged.updated_at, created_at);
        assert_eq!(storage.audits().len(), 1);

        // An effective update through the same service does move it.
        let updated = admin
            .update_flag("checkout_v2", rollout_patch(20), "bob".to_string(), None)
            .await
            .unwrap();
        assert_eq!(updated.updated_at, later);
        assert_eq!(storage.audits().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_rollout_leaves_store_untouched() {
        let storage = Arc::new(MemoryStorage::default());
        let admin = admin(&storage);
        let created = admin
            .create_flag(
                "checkout_v2".to_string(),
                rollout_patch(10),
                "alice".to_string(),
                None,
            )
            .await
            .unwrap();

        match admin
            .update_flag("checkout_v2", rollout_patch(150), "bob".to_string(), None)
            .await
        {
            Err(FlagError::InvalidRolloutPercentage(150)) => (),
            other => panic!("expected InvalidRolloutPercentage, got {:?}", other),
        }

        let stored = admin.get_flag("checkout_v2").await.unwrap();
        assert_eq!(stored, created);
        assert_eq!(storage.audits().len(), 1);
    }

    #[tokio::test]
    async fn test_update_of_unknown_flag_is_not_found() {
        let storage = Arc::new(MemoryStorage::default());
        match admin(&storage)
            .update_flag("missing", rollout_patch(10), "bob".to_string(), None)
            .await
        {
            Err(FlagError::FlagNotFound(_)) => (),
            other => panic!("expected FlagNotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_concurrent_update_loses_cleanly() {
        let storage = Arc::new(MemoryStorage::default());
        let admin = admin(&storage);
        let created = admin
            .create_flag(
                "checkout_v2".to_string(),
                FlagPatch::default(),
                "alice".to_string(),
                None,
            )
            .await
            .unwrap();

        // Simulate a racing writer by moving the stored state under us.
        let mut raced = created.clone();
        raced.rollout_percentage = 50;
        raced.updated_at = created.updated_at + chrono::Duration::seconds(1);
        storage.seed_flag(raced);

        let stale_audit = FeatureFlagAudit {
            flag_key: "checkout_v2".to_string(),
            actor_id: "bob".to_string(),
            actor_type: ActorType::Admin,
            action: AuditAction::Update,
            before_state: None,
            after_state: None,
            reason: None,
            timestamp: created.updated_at,
        };
        let mut stale = created.clone();
        stale.enabled = true;
        match storage
            .update_flag(&stale, created.updated_at, &stale_audit)
            .await
        {
            Err(FlagError::UpdateConflict(_)) => (),
            other => panic!("expected UpdateConflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delete_hides_flag_but_keeps_audit_history() {
        let storage = Arc::new(MemoryStorage::default());
        let admin = admin(&storage);
        let created = admin
            .create_flag(
                "checkout_v2".to_string(),
                FlagPatch::default(),
                "alice".to_string(),
                None,
            )
            .await
            .unwrap();

        admin
            .delete_flag("checkout_v2", "alice".to_string(), Some("sunset".to_string()))
            .await
            .unwrap();

        match admin.get_flag("checkout_v2").await {
            Err(FlagError::FlagNotFound(_)) => (),
            other => panic!("expected FlagNotFound, got {:?}", other),
        }

        let audits = storage.audits();
        assert_eq!(audits.len(), 2);
        let delete_audit = audits
            .iter()
            .find(|a| a.action == AuditAction::Delete)
            .unwrap();
        assert_eq!(
            delete_audit.before_state,
            Some(serde_json::to_value(&created).unwrap())
        );
        assert_eq!(delete_audit.after_state, None);
    }
}
