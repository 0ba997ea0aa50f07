use std::str::FromStr;

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use tracing::instrument;

use crate::api::errors::FlagError;
use crate::audit::audit_models::{ActorType, AuditAction, FeatureFlagAudit, FeatureFlagAuditRow};

/// Read side of the append-only audit history. Writes happen through
/// `FlagStore` mutations so that each flag write and its audit row commit
/// together.
#[async_trait]
pub trait AuditStore {
    /// Returns the audit history for a flag, newest first.
    async fn audit_trail(&self, flag_key: &str) -> Result<Vec<FeatureFlagAudit>, FlagError>;
}

pub struct PostgresAuditStore {
    reader: PgPool,
}

impl PostgresAuditStore {
    pub fn new(reader: PgPool) -> Self {
        PostgresAuditStore { reader }
    }
}

impl TryFrom<FeatureFlagAuditRow> for FeatureFlagAudit {
    type Error = FlagError;

    fn try_from(row: FeatureFlagAuditRow) -> Result<FeatureFlagAudit, FlagError> {
        let actor_type = ActorType::from_str(&row.actor_type).map_err(|_| {
            tracing::error!("unknown actor type in audit row: {}", row.actor_type);
            FlagError::DataParsingError
        })?;
        let action = AuditAction::from_str(&row.action).map_err(|_| {
            tracing::error!("unknown action in audit row: {}", row.action);
            FlagError::DataParsingError
        })?;

        Ok(FeatureFlagAudit {
            flag_key: row.flag_key,
            actor_id: row.actor_id,
            actor_type,
            action,
            before_state: row.before_state,
            after_state: row.after_state,
            reason: row.reason,
            timestamp: row.timestamp,
        })
    }
}

#[async_trait]
impl AuditStore for PostgresAuditStore {
    #[instrument(skip_all, fields(flag_key = %flag_key))]
    async fn audit_trail(&self, flag_key: &str) -> Result<Vec<FeatureFlagAudit>, FlagError> {
        let rows = sqlx::query_as::<_, FeatureFlagAuditRow>(
            r#"
            SELECT flag_key, actor_id, actor_type, action, before_state, after_state, reason, timestamp
              FROM feature_flag_audit
             WHERE flag_key = $1
             ORDER BY id DESC
            "#,
        )
        .bind(flag_key)
        .fetch_all(&self.reader)
        .await
        .map_err(|e| {
            tracing::error!("failed to fetch audit trail for {}: {}", flag_key, e);
            FlagError::DatabaseError(e.to_string())
        })?;

        rows.into_iter().map(FeatureFlagAudit::try_from).collect()
    }
}
