use crate::flags::evaluation_reason::EvaluationReason;
use crate::flags::flag_models::{FeatureFlag, Subject};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagMatch {
    pub enabled: bool,
    pub reason: EvaluationReason,
}

/// Applies the precedence chain for one subject against a loaded flag:
/// kill switch, then whitelist, then the rollout shortcuts, then cohort
/// bucketing. First match wins.
#[derive(Debug)]
pub struct FlagMatcher {
    pub subject: Subject,
}

impl FlagMatcher {
    pub fn new(subject: Subject) -> Self {
        FlagMatcher { subject }
    }

    pub fn get_match(&self, flag: &FeatureFlag) -> FlagMatch {
        if !flag.enabled {
            return FlagMatch {
                enabled: false,
                reason: EvaluationReason::MasterDisabled,
            };
        }

        // Whitelisted subjects bypass the rollout percentage entirely.
        if flag.whitelist.iter().any(|id| id == self.subject.id()) {
            return FlagMatch {
                enabled: true,
                reason: EvaluationReason::Whitelisted,
            };
        }

        // Fully launched and fully dark flags never touch the hash.
        if flag.rollout_percentage >= 100 {
            return FlagMatch {
                enabled: true,
                reason: EvaluationReason::FullRollout,
            };
        }
        if flag.rollout_percentage <= 0 {
            return FlagMatch {
                enabled: false,
                reason: EvaluationReason::ZeroRollout,
            };
        }

        if Self::bucket(&flag.flag_key, self.subject.id()) < flag.rollout_percentage as u32 {
            FlagMatch {
                enabled: true,
                reason: EvaluationReason::CohortIncluded,
            }
        } else {
            FlagMatch {
                enabled: false,
                reason: EvaluationReason::CohortExcluded,
            }
        }
    }

    /// Maps a (flag key, subject id) pair to a stable bucket in [0, 100).
    /// Given the same inputs this always returns the same bucket, across
    /// processes and over time, so a subject's cohort assignment never flips
    /// on re-evaluation. Buckets are approximately uniform; growing the
    /// rollout percentage grows the enabled population without reshuffling
    /// it (best-effort, not a formal guarantee of the hash).
    pub fn bucket(flag_key: &str, subject_id: &str) -> u32 {
        let digest = md5::compute(format!("{flag_key}.{subject_id}"));
        let prefix = u64::from_be_bytes([
            digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
        ]);
        (prefix % 100) as u32
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn flag(key: &str) -> FeatureFlag {
        FeatureFlag::new(key.to_string(), Utc::now())
    }

    #[test]
    fn test_bucket_is_stable() {
        for subject_id in ["1", "42", "some-session-hash", ""] {
            assert_eq!(
                FlagMatcher::bucket("checkout_v2", subject_id),
                FlagMatcher::bucket("checkout_v2", subject_id)
            );
        }
    }

    #[test]
    fn test_bucket_stays_in_range() {
        for i in 0..1000 {
            let bucket = FlagMatcher::bucket("checkout_v2", &i.to_string());
            assert!(bucket < 100, "bucket {} out of range", bucket);
        }
    }

    #[test]
    fn test_bucket_distribution_is_roughly_uniform() {
        // Pseudo-random assignment over 100 sequential ids at a 50% rollout
        // should land well within 30-70 enabled.
        let enabled = (0..100)
            .filter(|i| FlagMatcher::bucket("distribution_check", &i.to_string()) < 50)
            .count();
        assert!(
            (30..=70).contains(&enabled),
            "expected roughly half enabled, got {}",
            enabled
        );
    }

    #[test]
    fn test_repeated_matches_are_identical() {
        let mut config = flag("checkout_v2");
        config.enabled = true;
        config.rollout_percentage = 37;

        let matcher = FlagMatcher::new(Subject::User("17".to_string()));
        let first = matcher.get_match(&config);
        for _ in 0..10 {
            assert_eq!(matcher.get_match(&config), first);
        }
    }

    #[test]
    fn test_kill_switch_beats_whitelist_and_rollout() {
        let mut config = flag("checkout_v2");
        config.enabled = false;
        config.rollout_percentage = 100;
        config.whitelist = vec!["42".to_string()];

        let result = FlagMatcher::new(Subject::User("42".to_string())).get_match(&config);
        assert!(!result.enabled);
        assert_eq!(result.reason, EvaluationReason::MasterDisabled);
    }

    #[test]
    fn test_whitelist_beats_zero_rollout() {
        let mut config = flag("beta_widget");
        config.enabled = true;
        config.rollout_percentage = 0;
        config.whitelist = vec!["42".to_string()];

        let result = FlagMatcher::new(Subject::User("42".to_string())).get_match(&config);
        assert!(result.enabled);
        assert_eq!(result.reason, EvaluationReason::Whitelisted);

        let result = FlagMatcher::new(Subject::User("99".to_string())).get_match(&config);
        assert!(!result.enabled);
        assert_eq!(result.reason, EvaluationReason::ZeroRollout);
    }

    #[test]
    fn test_full_rollout_enables_everyone() {
        let mut config = flag("checkout_v2");
        config.enabled = true;
        config.rollout_percentage = 100;

        for i in 0..100 {
            let result = FlagMatcher::new(Subject::User(i.to_string())).get_match(&config);
            assert!(result.enabled);
            assert_eq!(result.reason, EvaluationReason::FullRollout);
        }
    }

    #[test]
    fn test_zero_rollout_disables_everyone() {
        let mut config = flag("checkout_v2");
        config.enabled = true;
        config.rollout_percentage = 0;

        for i in 0..100 {
            let result = FlagMatcher::new(Subject::Session(format!("hash{}", i))).get_match(&config);
            assert!(!result.enabled);
            assert_eq!(result.reason, EvaluationReason::ZeroRollout);
        }
    }

    #[test]
    fn test_partial_rollout_reports_cohort_reasons() {
        let mut config = flag("cohort_check");
        config.enabled = true;
        config.rollout_percentage = 50;

        for i in 0..100 {
            let subject_id = i.to_string();
            let result = FlagMatcher::new(Subject::User(subject_id.clone())).get_match(&config);
            let in_cohort = FlagMatcher::bucket("cohort_check", &subject_id) < 50;
            assert_eq!(result.enabled, in_cohort);
            assert_eq!(
                result.reason,
                if in_cohort {
                    EvaluationReason::CohortIncluded
                } else {
                    EvaluationReason::CohortExcluded
                }
            );
        }
    }
}
