use serde::{Deserialize, Serialize};
use strum::EnumString;

/// Why an evaluation came out the way it did. The wire and storage form is
/// the snake_case string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationReason {
    #[strum(serialize = "flag_not_found")]
    FlagNotFound,
    #[strum(serialize = "missing_subject")]
    MissingSubject,
    #[strum(serialize = "master_disabled")]
    MasterDisabled,
    #[strum(serialize = "whitelisted")]
    Whitelisted,
    #[strum(serialize = "full_rollout")]
    FullRollout,
    #[strum(serialize = "zero_rollout")]
    ZeroRollout,
    #[strum(serialize = "cohort_included")]
    CohortIncluded,
    #[strum(serialize = "cohort_excluded")]
    CohortExcluded,
}

impl std::fmt::Display for EvaluationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                EvaluationReason::FlagNotFound => "flag_not_found",
                EvaluationReason::MissingSubject => "missing_subject",
                EvaluationReason::MasterDisabled => "master_disabled",
                EvaluationReason::Whitelisted => "whitelisted",
                EvaluationReason::FullRollout => "full_rollout",
                EvaluationReason::ZeroRollout => "zero_rollout",
                EvaluationReason::CohortIncluded => "cohort_included",
                EvaluationReason::CohortExcluded => "cohort_excluded",
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(EvaluationReason::FlagNotFound.to_string(), "flag_not_found");
        assert_eq!(
            EvaluationReason::MissingSubject.to_string(),
            "missing_subject"
        );
        assert_eq!(
            EvaluationReason::MasterDisabled.to_string(),
            "master_disabled"
        );
        assert_eq!(EvaluationReason::Whitelisted.to_string(), "whitelisted");
        assert_eq!(EvaluationReason::FullRollout.to_string(), "full_rollout");
        assert_eq!(EvaluationReason::ZeroRollout.to_string(), "zero_rollout");
        assert_eq!(
            EvaluationReason::CohortIncluded.to_string(),
            "cohort_included"
        );
        assert_eq!(
            EvaluationReason::CohortExcluded.to_string(),
            "cohort_excluded"
        );
    }

    #[test]
    fn test_from_str_round_trips_display() {
        let reasons = [
            EvaluationReason::FlagNotFound,
            EvaluationReason::MissingSubject,
            EvaluationReason::MasterDisabled,
            EvaluationReason::Whitelisted,
            EvaluationReason::FullRollout,
            EvaluationReason::ZeroRollout,
            EvaluationReason::CohortIncluded,
            EvaluationReason::CohortExcluded,
        ];

        for reason in reasons {
            assert_eq!(
                EvaluationReason::from_str(&reason.to_string()).unwrap(),
                reason
            );
        }
    }

    #[test]
    fn test_serde_uses_snake_case() {
        assert_eq!(
            serde_json::to_value(EvaluationReason::FullRollout).unwrap(),
            serde_json::json!("full_rollout")
        );
        assert_eq!(
            serde_json::from_value::<EvaluationReason>(serde_json::json!("cohort_excluded"))
                .unwrap(),
            EvaluationReason::CohortExcluded
        );
    }
}
