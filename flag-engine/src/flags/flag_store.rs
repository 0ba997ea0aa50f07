use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use tracing::instrument;

use crate::api::errors::FlagError;
use crate::audit::audit_models::FeatureFlagAudit;
use crate::database::is_unique_violation;
use crate::flags::flag_models::{FeatureFlag, FeatureFlagRow};

/// Durable storage for flag configuration. Mutations carry the audit row that
/// describes them, and implementations must commit the flag write and the
/// audit write as a single unit.
#[async_trait]
pub trait FlagStore {
    /// Returns the flag for a key, or None if it does not exist or has been
    /// soft-deleted.
    async fn get_flag(&self, flag_key: &str) -> Result<Option<FeatureFlag>, FlagError>;

    async fn list_flags(&self) -> Result<Vec<FeatureFlag>, FlagError>;

    async fn create_flag(
        &self,
        flag: &FeatureFlag,
        audit: &FeatureFlagAudit,
    ) -> Result<(), FlagError>;

    /// Persists a new flag state. The write is guarded by a compare-and-swap
    /// on `updated_at`: if the stored flag no longer matches
    /// `expected_updated_at`, another update won the race and
    /// `UpdateConflict` is returned.
    async fn update_flag(
        &self,
        flag: &FeatureFlag,
        expected_updated_at: DateTime<Utc>,
        audit: &FeatureFlagAudit,
    ) -> Result<(), FlagError>;

    /// Soft-deletes a flag. The record stays behind for audit and evaluation
    /// history.
    async fn delete_flag(
        &self,
        flag_key: &str,
        deleted_at: DateTime<Utc>,
        audit: &FeatureFlagAudit,
    ) -> Result<(), FlagError>;
}

pub struct PostgresFlagStore {
    reader: PgPool,
    writer: PgPool,
}

impl PostgresFlagStore {
    pub fn new(reader: PgPool, writer: PgPool) -> Self {
        PostgresFlagStore { reader, writer }
    }
}

const FLAG_COLUMNS: &str = "flag_key, description, enabled, rollout_percentage, whitelist, analytics_enabled, deleted, created_at, updated_at";

async fn insert_audit(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    audit: &FeatureFlagAudit,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO feature_flag_audit
            (flag_key, actor_id, actor_type, action, before_state, after_state, reason, timestamp)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(&audit.flag_key)
    .bind(&audit.actor_id)
    .bind(audit.actor_type.to_string())
    .bind(audit.action.to_string())
    .bind(&audit.before_state)
    .bind(&audit.after_state)
    .bind(&audit.reason)
    .bind(audit.timestamp)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

fn whitelist_json(flag: &FeatureFlag) -> Result<serde_json::Value, FlagError> {
    serde_json::to_value(&flag.whitelist).map_err(|e| {
        tracing::error!("failed to serialize whitelist for flag {}: {}", flag.flag_key, e);
        FlagError::DataParsingError
    })
}

#[async_trait]
impl FlagStore for PostgresFlagStore {
    #[instrument(skip_all, fields(flag_key = %flag_key))]
    async fn get_flag(&self, flag_key: &str) -> Result<Option<FeatureFlag>, FlagError> {
        let query = format!(
            "SELECT {FLAG_COLUMNS} FROM feature_flag WHERE flag_key = $1 AND deleted = false"
        );
        let row = sqlx::query_as::<_, FeatureFlagRow>(&query)
            .bind(flag_key)
            .fetch_optional(&self.reader)
            .await
            .map_err(|e| {
                tracing::error!("failed to fetch flag {}: {}", flag_key, e);
                FlagError::DatabaseError(e.to_string())
            })?;

        row.map(FeatureFlag::try_from).transpose()
    }

    #[instrument(skip_all)]
    async fn list_flags(&self) -> Result<Vec<FeatureFlag>, FlagError> {
        let query = format!(
            "SELECT {FLAG_COLUMNS} FROM feature_flag WHERE deleted = false ORDER BY flag_key"
        );
        let rows = sqlx::query_as::<_, FeatureFlagRow>(&query)
            .fetch_all(&self.reader)
            .await
            .map_err(|e| {
                tracing::error!("failed to list flags: {}", e);
                FlagError::DatabaseError(e.to_string())
            })?;

        rows.into_iter().map(FeatureFlag::try_from).collect()
    }

    #[instrument(skip_all, fields(flag_key = %flag.flag_key))]
    async fn create_flag(
        &self,
        flag: &FeatureFlag,
        audit: &FeatureFlagAudit,
    ) -> Result<(), FlagError> {
        let whitelist = whitelist_json(flag)?;

        let mut tx = self.writer.begin().await.map_err(|e| {
            tracing::error!("failed to open transaction: {}", e);
            FlagError::DatabaseUnavailable
        })?;

        sqlx::query(
            r#"
            INSERT INTO feature_flag
                (flag_key, description, enabled, rollout_percentage, whitelist,
                 analytics_enabled, deleted, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&flag.flag_key)
        .bind(&flag.description)
        .bind(flag.enabled)
        .bind(flag.rollout_percentage)
        .bind(whitelist)
        .bind(flag.analytics_enabled)
        .bind(flag.deleted)
        .bind(flag.created_at)
        .bind(flag.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                FlagError::FlagAlreadyExists(flag.flag_key.clone())
            } else {
                tracing::error!("failed to insert flag {}: {}", flag.flag_key, e);
                FlagError::DatabaseError(e.to_string())
            }
        })?;

        insert_audit(&mut tx, audit).await.map_err(|e| {
            tracing::error!("failed to insert audit for flag {}: {}", flag.flag_key, e);
            FlagError::DatabaseError(e.to_string())
        })?;

        tx.commit().await.map_err(|e| {
            tracing::error!("failed to commit create of flag {}: {}", flag.flag_key, e);
            FlagError::DatabaseError(e.to_string())
        })?;

        Ok(())
    }

    #[instrument(skip_all, fields(flag_key = %flag.flag_key))]
    async fn update_flag(
        &self,
        flag: &FeatureFlag,
        expected_updated_at: DateTime<Utc>,
        audit: &FeatureFlagAudit,
    ) -> Result<(), FlagError> {
        let whitelist = whitelist_json(flag)?;

        let mut tx = self.writer.begin().await.map_err(|e| {
            tracing::error!("failed to open transaction: {}", e);
            FlagError::DatabaseUnavailable
        })?;

        let result = sqlx::query(
            r#"
            UPDATE feature_flag
               SET description = $2,
                   enabled = $3,
                   rollout_percentage = $4,
                   whitelist = $5,
                   analytics_enabled = $6,
                   updated_at = $7
             WHERE flag_key = $1 AND updated_at = $8 AND deleted = false
            "#,
        )
        .bind(&flag.flag_key)
        .bind(&flag.description)
        .bind(flag.enabled)
        .bind(flag.rollout_percentage)
        .bind(whitelist)
        .bind(flag.analytics_enabled)
        .bind(flag.updated_at)
        .bind(expected_updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!("failed to update flag {}: {}", flag.flag_key, e);
            FlagError::DatabaseError(e.to_string())
        })?;

        if result.rows_affected() == 0 {
            // Either the flag is gone or someone else won the race.
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM feature_flag WHERE flag_key = $1 AND deleted = false)",
            )
            .bind(&flag.flag_key)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                tracing::error!("failed to check flag {}: {}", flag.flag_key, e);
                FlagError::DatabaseError(e.to_string())
            })?;

            return Err(if exists {
                FlagError::UpdateConflict(flag.flag_key.clone())
            } else {
                FlagError::FlagNotFound(flag.flag_key.clone())
            });
        }

        insert_audit(&mut tx, audit).await.map_err(|e| {
            tracing::error!("failed to insert audit for flag {}: {}", flag.flag_key, e);
            FlagError::DatabaseError(e.to_string())
        })?;

        tx.commit().await.map_err(|e| {
            tracing::error!("failed to commit update of flag {}: {}", flag.flag_key, e);
            FlagError::DatabaseError(e.to_string())
        })?;

        Ok(())
    }

    #[instrument(skip_all, fields(flag_key = %flag_key))]
    async fn delete_flag(
        &self,
        flag_key: &str,
        deleted_at: DateTime<Utc>,
        audit: &FeatureFlagAudit,
    ) -> Result<(), FlagError> {
        let mut tx = self.writer.begin().await.map_err(|e| {
            tracing::error!("failed to open transaction: {}", e);
            FlagError::DatabaseUnavailable
        })?;

        let result = sqlx::query(
            "UPDATE feature_flag SET deleted = true, updated_at = $2 WHERE flag_key = $1 AND deleted = false",
        )
        .bind(flag_key)
        .bind(deleted_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!("failed to delete flag {}: {}", flag_key, e);
            FlagError::DatabaseError(e.to_string())
        })?;

        if result.rows_affected() == 0 {
            return Err(FlagError::FlagNotFound(flag_key.to_string()));
        }

        insert_audit(&mut tx, audit).await.map_err(|e| {
            tracing::error!("failed to insert audit for flag {}: {}", flag_key, e);
            FlagError::DatabaseError(e.to_string())
        })?;

        tx.commit().await.map_err(|e| {
            tracing::error!("failed to commit delete of flag {}: {}", flag_key, e);
            FlagError::DatabaseError(e.to_string())
        })?;

        Ok(())
    }
}
