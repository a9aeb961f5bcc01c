use std::time::Duration as StdDuration;

use serial_test::serial;

use reportflow::EngineConfig;

const KEYS: &[&str] = &[
    "REPORTFLOW_STATE_DIR",
    "STATE_DIR",
    "REPORTFLOW_POLL_INTERVAL_MS",
    "REPORTFLOW_BACKOFF_MAX_MS",
    "REPORTFLOW_BACKOFF_JITTER_PCT",
    "REPORTFLOW_FAILURE_THRESHOLD",
    "REPORTFLOW_PASS_CEILING_MS",
    "REPORTFLOW_RECENT_EVERY_PASSES",
    "REPORTFLOW_RETENTION_HOURS",
    "REPORTFLOW_COMPLETION_GRACE_MINUTES",
    "REPORTFLOW_RECENT_LIMIT",
];

fn clear_env() {
    for key in KEYS {
        std::env::remove_var(key);
    }
}

#[test]
#[serial]
fn defaults_without_env() {
    clear_env();
    let cfg = EngineConfig::from_env();

    assert_eq!(
        cfg.state_dir.as_deref().map(|p| p.to_string_lossy().to_string()),
        Some(".reportflow".to_string())
    );
    assert_eq!(cfg.scheduler.poll_interval, StdDuration::from_millis(4_000));
    assert_eq!(cfg.scheduler.failure_threshold, 3);
    assert_eq!(cfg.scheduler.backoff.max_ms, 60_000);
    assert_eq!(cfg.retention.max_age, chrono::Duration::hours(24));
    assert_eq!(cfg.retention.completion_grace, chrono::Duration::minutes(5));
    assert_eq!(cfg.recent_limit, 25);
}

#[test]
#[serial]
fn env_overrides_are_applied() {
    clear_env();
    std::env::set_var("REPORTFLOW_POLL_INTERVAL_MS", "1500");
    std::env::set_var("REPORTFLOW_FAILURE_THRESHOLD", "5");
    std::env::set_var("REPORTFLOW_RETENTION_HOURS", "48");
    std::env::set_var("REPORTFLOW_RECENT_LIMIT", "10");
    std::env::set_var("REPORTFLOW_STATE_DIR", "/tmp/reportflow-test");

    let cfg = EngineConfig::from_env();
    clear_env();

    assert_eq!(cfg.scheduler.poll_interval, StdDuration::from_millis(1_500));
    assert_eq!(cfg.scheduler.backoff.base_ms, 1_500);
    assert_eq!(cfg.scheduler.failure_threshold, 5);
    assert_eq!(cfg.retention.max_age, chrono::Duration::hours(48));
    assert_eq!(cfg.recent_limit, 10);
    assert_eq!(
        cfg.state_dir.as_deref().map(|p| p.to_string_lossy().to_string()),
        Some("/tmp/reportflow-test".to_string())
    );
}

#[test]
#[serial]
fn state_dir_can_be_switched_off() {
    clear_env();
    std::env::set_var("REPORTFLOW_STATE_DIR", "none");

    let cfg = EngineConfig::from_env();
    clear_env();

    assert!(cfg.state_dir.is_none());
}

#[test]
#[serial]
fn nonsense_values_fall_back_to_defaults() {
    clear_env();
    std::env::set_var("REPORTFLOW_POLL_INTERVAL_MS", "soon");
    std::env::set_var("REPORTFLOW_FAILURE_THRESHOLD", "-2");
    std::env::set_var("REPORTFLOW_RECENT_LIMIT", "0");

    let cfg = EngineConfig::from_env();
    clear_env();

    assert_eq!(cfg.scheduler.poll_interval, StdDuration::from_millis(4_000));
    assert_eq!(cfg.scheduler.failure_threshold, 3);
    // a zero listing bound would disable discovery entirely; clamped instead
    assert_eq!(cfg.recent_limit, 1);
}
