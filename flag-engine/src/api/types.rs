use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::flags::evaluation_reason::EvaluationReason;
use crate::flags::flag_models::FlagPatch;

#[derive(Debug, Clone, Deserialize)]
pub struct EvaluationRequest {
    pub flag_key: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_hash: Option<String>,
    #[serde(default)]
    pub analytics_consent: bool,
    #[serde(default)]
    pub trace_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluationResponse {
    pub enabled: bool,
    pub reason: EvaluationReason,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateFlagRequest {
    pub flag_key: String,
    #[serde(flatten)]
    pub patch: FlagPatch,
    pub actor_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateFlagRequest {
    #[serde(flatten)]
    pub patch: FlagPatch,
    pub actor_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteFlagRequest {
    pub actor_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}
