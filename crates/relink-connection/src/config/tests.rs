//! Tests for configuration loading

use super::*;
use crate::reconnect::BackoffSchedule;
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::time::Duration;

fn overrides(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key: &str| map.get(key).cloned()
}

mod policy_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let policy = RetryPolicyConfig::default();
        assert_eq!(policy.max_tries(), 3);
        assert_eq!(policy.retry_wait(), Duration::from_millis(500));
        assert!(policy.enable_retry());
        assert!(policy.retry_read_only());
    }

    #[test]
    fn test_zero_tries_still_makes_one_attempt() {
        let policy = RetryPolicyConfig::default().with_max_tries(0);
        assert_eq!(policy.max_tries(), 1);
    }

    #[test]
    fn test_handle_snapshot_is_detached() {
        let handle = PolicyHandle::new(RetryPolicyConfig::default());
        let snapshot = handle.snapshot();

        handle.update(|policy| policy.set_max_tries(9));

        assert_eq!(snapshot.max_tries(), 3);
        assert_eq!(handle.snapshot().max_tries(), 9);
    }

    #[test]
    fn test_cloned_handles_share_policy() {
        let handle = PolicyHandle::new(RetryPolicyConfig::default());
        let other = handle.clone();

        other.set(RetryPolicyConfig::default().with_enable_retry(false));

        assert!(!handle.snapshot().enable_retry());
        assert!(handle.same_as(&other));
        assert!(!handle.same_as(&PolicyHandle::new(RetryPolicyConfig::default())));
    }

    #[test]
    fn test_global_handle_is_shared() {
        assert!(PolicyHandle::global().same_as(&PolicyHandle::default()));
    }
}

mod file_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = RelinkConfig::from_toml_str("").unwrap();
        assert_eq!(config, RelinkConfig::default());
        assert_eq!(config.reconnect.backoff(), &BackoffSchedule::failover());
    }

    #[test]
    fn test_full_document() {
        let config = RelinkConfig::from_toml_str(
            r#"
            [retry]
            max_tries = 7
            retry_wait_seconds = 0.25
            enable_retry = false
            retry_read_only = false

            [reconnect]
            max_attempts = 4
            intervals = [0.1, 0.5]
            "#,
        )
        .unwrap();

        assert_eq!(config.retry.max_tries(), 7);
        assert_eq!(config.retry.retry_wait(), Duration::from_millis(250));
        assert!(!config.retry.enable_retry());
        assert!(!config.retry.retry_read_only());
        assert_eq!(config.reconnect.max_attempts(), 4);
        assert_eq!(
            config.reconnect.backoff().intervals(),
            &[Duration::from_millis(100), Duration::from_millis(500)]
        );
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = RelinkConfig::from_toml_str("[retry]\nmax_tries = 5\n").unwrap();
        assert_eq!(config.retry.max_tries(), 5);
        assert!(config.retry.retry_read_only());
        assert_eq!(config.retry.retry_wait(), Duration::from_millis(500));
    }

    #[test]
    fn test_rejects_empty_interval_list() {
        let err = RelinkConfig::from_toml_str("[reconnect]\nintervals = []\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_rejects_negative_wait() {
        let err = RelinkConfig::from_toml_str("[retry]\nretry_wait_seconds = -1.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = RelinkConfig::from_file("/nonexistent/relink.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = RelinkConfig {
            retry: RetryPolicyConfig::new(4, Duration::from_millis(750)),
            ..RelinkConfig::default()
        };
        let text = toml::to_string(&config).unwrap();
        assert_eq!(RelinkConfig::from_toml_str(&text).unwrap(), config);
    }
}

mod env_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_overrides_apply() {
        let config = RelinkConfig::default()
            .with_overrides(overrides(&[
                ("RELINK_MAX_TRIES", "6"),
                ("RELINK_RETRY_WAIT", "1.5"),
                ("RELINK_ENABLE_RETRY", "off"),
                ("RELINK_RETRY_READ_ONLY", "No"),
            ]))
            .unwrap();

        assert_eq!(config.retry.max_tries(), 6);
        assert_eq!(config.retry.retry_wait(), Duration::from_millis(1500));
        assert!(!config.retry.enable_retry());
        assert!(!config.retry.retry_read_only());
    }

    #[test]
    fn test_absent_variables_change_nothing() {
        let config = RelinkConfig::default().with_overrides(overrides(&[])).unwrap();
        assert_eq!(config, RelinkConfig::default());
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let err = RelinkConfig::default()
            .with_overrides(overrides(&[("RELINK_MAX_TRIES", "lots")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv { key: "RELINK_MAX_TRIES", .. }
        ));

        let err = RelinkConfig::default()
            .with_overrides(overrides(&[("RELINK_ENABLE_RETRY", "maybe")]))
            .unwrap_err();
        assert!(err.to_string().contains("RELINK_ENABLE_RETRY"));
    }
}
