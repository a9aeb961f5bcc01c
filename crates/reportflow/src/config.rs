use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::jobs::backoff::BackoffConfig;
use crate::jobs::gc::RetentionPolicy;
use crate::jobs::scheduler::SchedulerConfig;

/// Central runtime configuration for the engine, loaded from environment
/// variables into a typed struct. Nonsense values fall back to the defaults
/// rather than failing startup; the only genuinely fallible piece
/// (the state directory) is handled lazily by the store.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Directory for the per-user persisted documents; None runs memory-only.
    pub state_dir: Option<PathBuf>,
    pub scheduler: SchedulerConfig,
    pub retention: RetentionPolicy,
    /// Bound passed to the remote recent-jobs listing.
    pub recent_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            state_dir: None,
            scheduler: SchedulerConfig::default(),
            retention: RetentionPolicy::default(),
            recent_limit: 25,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let state_dir = match env_or_fallback("REPORTFLOW_STATE_DIR", "STATE_DIR") {
            Some(value) => normalize_optional_dir(&value),
            None => Some(PathBuf::from(".reportflow")),
        };

        let poll_interval_ms: u64 = env_parse("REPORTFLOW_POLL_INTERVAL_MS", 4_000);
        let backoff_max_ms: u64 = env_parse("REPORTFLOW_BACKOFF_MAX_MS", 60_000);
        let jitter_pct: f64 = env_parse("REPORTFLOW_BACKOFF_JITTER_PCT", 0.20);
        let failure_threshold: u32 = env_parse("REPORTFLOW_FAILURE_THRESHOLD", 3);
        let pass_ceiling_ms: u64 = env_parse("REPORTFLOW_PASS_CEILING_MS", 30_000);
        let recent_every_passes: u32 = env_parse("REPORTFLOW_RECENT_EVERY_PASSES", 5);

        let retention_hours: i64 = env_parse("REPORTFLOW_RETENTION_HOURS", 24);
        let completion_grace_minutes: i64 = env_parse("REPORTFLOW_COMPLETION_GRACE_MINUTES", 5);

        let recent_limit: usize = env_parse("REPORTFLOW_RECENT_LIMIT", 25);

        Self {
            state_dir,
            scheduler: SchedulerConfig {
                poll_interval: Duration::from_millis(poll_interval_ms),
                failure_threshold,
                backoff: BackoffConfig {
                    base_ms: poll_interval_ms,
                    max_ms: backoff_max_ms.max(poll_interval_ms),
                    jitter_pct: jitter_pct.clamp(0.0, 1.0),
                },
                pass_ceiling: Duration::from_millis(pass_ceiling_ms),
                recent_every_passes,
            },
            retention: RetentionPolicy {
                max_age: chrono::Duration::hours(retention_hours.max(1)),
                completion_grace: chrono::Duration::minutes(completion_grace_minutes.max(1)),
            },
            recent_limit: recent_limit.clamp(1, 500),
        }
    }

    /// Memory-only configuration, handy for tests and embedders that manage
    /// their own persistence.
    pub fn memory_only() -> Self {
        Self {
            state_dir: None,
            ..Self::default()
        }
    }
}

fn env_or_fallback(primary: &str, fallback: &str) -> Option<String> {
    std::env::var(primary)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| std::env::var(fallback).ok().filter(|s| !s.trim().is_empty()))
}

fn env_parse<T: FromStr + Copy>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn normalize_optional_dir(value: &str) -> Option<PathBuf> {
    let v = value.trim();
    if v.is_empty() {
        return None;
    }
    if matches!(v.to_lowercase().as_str(), "0" | "off" | "false" | "none") {
        return None;
    }
    Some(PathBuf::from(v))
}
