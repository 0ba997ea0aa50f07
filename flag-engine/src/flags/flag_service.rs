use std::sync::Arc;

use tracing::instrument;
use uuid::Uuid;

use crate::analytics::evaluation_models::FeatureFlagEvaluation;
use crate::analytics::evaluation_sink::EvaluationSink;
use crate::api::errors::FlagError;
use crate::flags::evaluation_reason::EvaluationReason;
use crate::flags::flag_matching::{FlagMatch, FlagMatcher};
use crate::flags::flag_models::Subject;
use crate::flags::flag_store::FlagStore;
use crate::time::TimeSource;

/// The evaluation engine: loads the flag, resolves the subject, runs the
/// matcher and records the outcome when consent allows.
pub struct FlagService {
    flag_store: Arc<dyn FlagStore + Send + Sync>,
    sink: Arc<dyn EvaluationSink + Send + Sync>,
    time: Arc<dyn TimeSource + Send + Sync>,
}

impl FlagService {
    pub fn new(
        flag_store: Arc<dyn FlagStore + Send + Sync>,
        sink: Arc<dyn EvaluationSink + Send + Sync>,
        time: Arc<dyn TimeSource + Send + Sync>,
    ) -> Self {
        FlagService {
            flag_store,
            sink,
            time,
        }
    }

    /// Decides whether a flag is on for a subject. A missing flag or missing
    /// subject is a normal negative result, not an error; only store
    /// failures propagate.
    #[instrument(skip_all, fields(flag_key = %flag_key))]
    pub async fn evaluate(
        &self,
        flag_key: &str,
        user_id: Option<String>,
        session_hash: Option<String>,
        analytics_consent: bool,
        trace_id: Option<Uuid>,
    ) -> Result<FlagMatch, FlagError> {
        let Some(flag) = self.flag_store.get_flag(flag_key).await? else {
            // No flag-level analytics setting to consult, so no log write.
            return Ok(FlagMatch {
                enabled: false,
                reason: EvaluationReason::FlagNotFound,
            });
        };

        let Some(subject) = Subject::from_parts(user_id, session_hash) else {
            return Ok(FlagMatch {
                enabled: false,
                reason: EvaluationReason::MissingSubject,
            });
        };

        let flag_match = FlagMatcher::new(subject.clone()).get_match(&flag);

        if analytics_consent && flag.analytics_enabled {
            let evaluation = FeatureFlagEvaluation {
                flag_key: flag.flag_key.clone(),
                subject_type: subject.subject_type(),
                subject_id: subject.id().to_string(),
                result: flag_match.enabled,
                consent_granted: analytics_consent,
                rollout_percentage_snapshot: flag.rollout_percentage,
                evaluation_reason: flag_match.reason,
                trace_id,
                timestamp: self.time.now(),
            };

            // Best-effort: a failed log write never affects the result.
            if let Err(e) = self.sink.send(evaluation).await {
                tracing::warn!("failed to record evaluation of flag {}: {}", flag_key, e);
            }
        }

        Ok(flag_match)
    }
}
