use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::EnumString;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    #[strum(serialize = "admin")]
    Admin,
    #[strum(serialize = "system")]
    System,
}

impl std::fmt::Display for ActorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                ActorType::Admin => "admin",
                ActorType::System => "system",
            }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    #[strum(serialize = "create")]
    Create,
    #[strum(serialize = "update")]
    Update,
    #[strum(serialize = "delete")]
    Delete,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                AuditAction::Create => "create",
                AuditAction::Update => "update",
                AuditAction::Delete => "delete",
            }
        )
    }
}

/// One row per successful configuration mutation, append-only. The before and
/// after states are structural snapshots of the flag taken at the mutation
/// boundary, not references to the live record: `None` before a create,
/// `None` after a delete.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureFlagAudit {
    pub flag_key: String,
    pub actor_id: String,
    pub actor_type: ActorType,
    pub action: AuditAction,
    pub before_state: Option<serde_json::Value>,
    pub after_state: Option<serde_json::Value>,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Database row for `feature_flag_audit`; enums travel as their snake_case
/// text form.
#[derive(Debug, sqlx::FromRow)]
pub struct FeatureFlagAuditRow {
    pub flag_key: String,
    pub actor_id: String,
    pub actor_type: String,
    pub action: String,
    pub before_state: Option<serde_json::Value>,
    pub after_state: Option<serde_json::Value>,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_enum_wire_forms() {
        assert_eq!(ActorType::Admin.to_string(), "admin");
        assert_eq!(ActorType::System.to_string(), "system");
        assert_eq!(AuditAction::Create.to_string(), "create");
        assert_eq!(AuditAction::Update.to_string(), "update");
        assert_eq!(AuditAction::Delete.to_string(), "delete");

        assert_eq!(ActorType::from_str("admin").unwrap(), ActorType::Admin);
        assert_eq!(AuditAction::from_str("delete").unwrap(), AuditAction::Delete);
    }
}
