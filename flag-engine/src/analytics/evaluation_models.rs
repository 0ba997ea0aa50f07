use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::flags::evaluation_reason::EvaluationReason;
use crate::flags::flag_models::SubjectType;

/// One recorded evaluation outcome. Purely observational: the engine writes
/// these (consent permitting) and never reads them back. The rollout
/// percentage is a snapshot of the value in effect at evaluation time, so
/// historical analysis stays correct after later reconfiguration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureFlagEvaluation {
    pub flag_key: String,
    pub subject_type: SubjectType,
    pub subject_id: String,
    pub result: bool,
    pub consent_granted: bool,
    pub rollout_percentage_snapshot: i16,
    pub evaluation_reason: EvaluationReason,
    pub trace_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}
