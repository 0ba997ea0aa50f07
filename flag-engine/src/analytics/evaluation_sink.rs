use async_trait::async_trait;
use sqlx::postgres::PgPool;

use crate::analytics::evaluation_models::FeatureFlagEvaluation;
use crate::api::errors::FlagError;

/// Destination for evaluation telemetry. Callers treat sends as best-effort:
/// a failed write is logged and swallowed, never surfaced into the
/// evaluation result.
#[async_trait]
pub trait EvaluationSink {
    async fn send(&self, evaluation: FeatureFlagEvaluation) -> Result<(), FlagError>;
}

pub struct PostgresSink {
    writer: PgPool,
}

impl PostgresSink {
    pub fn new(writer: PgPool) -> Self {
        PostgresSink { writer }
    }
}

#[async_trait]
impl EvaluationSink for PostgresSink {
    async fn send(&self, evaluation: FeatureFlagEvaluation) -> Result<(), FlagError> {
        // Single-row autocommit insert; durability is scoped to this row and
        // holds no locks that could contend with concurrent evaluations.
        sqlx::query(
            r#"
            INSERT INTO feature_flag_evaluation
                (flag_key, subject_type, subject_id, result, consent_granted,
                 rollout_percentage_snapshot, evaluation_reason, trace_id, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&evaluation.flag_key)
        .bind(evaluation.subject_type.to_string())
        .bind(&evaluation.subject_id)
        .bind(evaluation.result)
        .bind(evaluation.consent_granted)
        .bind(evaluation.rollout_percentage_snapshot)
        .bind(evaluation.evaluation_reason.to_string())
        .bind(evaluation.trace_id)
        .bind(evaluation.timestamp)
        .execute(&self.writer)
        .await
        .map_err(|e| {
            tracing::error!(
                "failed to record evaluation of flag {}: {}",
                evaluation.flag_key,
                e
            );
            FlagError::DatabaseError(e.to_string())
        })?;

        Ok(())
    }
}

/// Sink for running without an evaluation-log table: outcomes only show up
/// in the trace output.
pub struct TraceSink {}

#[async_trait]
impl EvaluationSink for TraceSink {
    async fn send(&self, evaluation: FeatureFlagEvaluation) -> Result<(), FlagError> {
        tracing::info!(
            flag_key = %evaluation.flag_key,
            subject_type = %evaluation.subject_type,
            subject_id = %evaluation.subject_id,
            result = evaluation.result,
            reason = %evaluation.evaluation_reason,
            rollout_percentage = evaluation.rollout_percentage_snapshot,
            "flag evaluation"
        );
        Ok(())
    }
}
