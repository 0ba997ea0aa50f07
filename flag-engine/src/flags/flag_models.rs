use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::errors::FlagError;

/// The unit of control. `flag_key` is immutable after creation; everything
/// else is mutated through the administration service only, so that every
/// change leaves an audit row behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlag {
    pub flag_key: String,
    pub description: String,
    pub enabled: bool,
    pub rollout_percentage: i16,
    pub whitelist: Vec<String>,
    pub analytics_enabled: bool,
    #[serde(default)]
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FeatureFlag {
    /// A freshly created flag is off for everyone and records no analytics
    /// until an administrator opts it in.
    pub fn new(flag_key: String, now: DateTime<Utc>) -> FeatureFlag {
        FeatureFlag {
            flag_key,
            description: String::new(),
            enabled: false,
            rollout_percentage: 0,
            whitelist: Vec::new(),
            analytics_enabled: false,
            deleted: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Database row for `feature_flag`. The whitelist is stored as JSONB and
/// parsed into the domain struct on read.
#[derive(Debug, sqlx::FromRow)]
pub struct FeatureFlagRow {
    pub flag_key: String,
    pub description: String,
    pub enabled: bool,
    pub rollout_percentage: i16,
    pub whitelist: serde_json::Value,
    pub analytics_enabled: bool,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<FeatureFlagRow> for FeatureFlag {
    type Error = FlagError;

    fn try_from(row: FeatureFlagRow) -> Result<FeatureFlag, FlagError> {
        let whitelist = serde_json::from_value(row.whitelist).map_err(|e| {
            tracing::error!("failed to parse whitelist for flag {}: {}", row.flag_key, e);
            FlagError::DataParsingError
        })?;

        Ok(FeatureFlag {
            flag_key: row.flag_key,
            description: row.description,
            enabled: row.enabled,
            rollout_percentage: row.rollout_percentage,
            whitelist,
            analytics_enabled: row.analytics_enabled,
            deleted: row.deleted,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Partial update over a flag: only supplied fields are applied, the rest of
/// the record is left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlagPatch {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub rollout_percentage: Option<i16>,
    #[serde(default)]
    pub whitelist: Option<Vec<String>>,
    #[serde(default)]
    pub analytics_enabled: Option<bool>,
}

impl FlagPatch {
    pub fn validate(&self) -> Result<(), FlagError> {
        if let Some(percentage) = self.rollout_percentage {
            if !(0..=100).contains(&percentage) {
                return Err(FlagError::InvalidRolloutPercentage(percentage));
            }
        }
        Ok(())
    }

    pub fn apply(&self, flag: &mut FeatureFlag) {
        if let Some(description) = &self.description {
            flag.description = description.clone();
        }
        if let Some(enabled) = self.enabled {
            flag.enabled = enabled;
        }
        if let Some(percentage) = self.rollout_percentage {
            flag.rollout_percentage = percentage;
        }
        if let Some(whitelist) = &self.whitelist {
            // The whitelist is an ordered set: duplicates are dropped on
            // write, first occurrence wins.
            let mut seen = HashSet::new();
            flag.whitelist = whitelist
                .iter()
                .filter(|id| seen.insert(id.as_str()))
                .cloned()
                .collect();
        }
        if let Some(analytics_enabled) = self.analytics_enabled {
            flag.analytics_enabled = analytics_enabled;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectType {
    User,
    Session,
}

impl std::fmt::Display for SubjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                SubjectType::User => "user",
                SubjectType::Session => "session",
            }
        )
    }
}

/// The identity a flag is evaluated against: an authenticated user or an
/// anonymous session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    User(String),
    Session(String),
}

impl Subject {
    /// When both identities are supplied, the user id is the canonical one.
    /// Empty identifiers count as absent.
    pub fn from_parts(user_id: Option<String>, session_hash: Option<String>) -> Option<Subject> {
        if let Some(user_id) = user_id.filter(|id| !id.is_empty()) {
            return Some(Subject::User(user_id));
        }
        session_hash
            .filter(|hash| !hash.is_empty())
            .map(Subject::Session)
    }

    pub fn id(&self) -> &str {
        match self {
            Subject::User(id) => id,
            Subject::Session(hash) => hash,
        }
    }

    pub fn subject_type(&self) -> SubjectType {
        match self {
            Subject::User(_) => SubjectType::User,
            Subject::Session(_) => SubjectType::Session,
        }
    }
}
