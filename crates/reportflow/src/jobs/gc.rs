use chrono::{DateTime, Duration, Utc};

use crate::jobs::model::JobStub;

/// Retention policy for the local stub collection. Two independent rules,
/// either one expires a stub:
/// - age: `created_at` older than `max_age`, regardless of status — abandoned
///   optimistic entries must not accumulate forever
/// - post-completion: terminal status with `completed_at` older than
///   `completion_grace` — the authoritative history lives server-side
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    pub max_age: Duration,
    pub completion_grace: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age: Duration::hours(24),
            completion_grace: Duration::minutes(5),
        }
    }
}

pub fn is_expired(stub: &JobStub, now: DateTime<Utc>, policy: &RetentionPolicy) -> bool {
    if now - stub.created_at > policy.max_age {
        return true;
    }
    if stub.status.is_terminal() {
        if let Some(completed_at) = stub.completed_at {
            return now - completed_at > policy.completion_grace;
        }
    }
    false
}

/// Ids of stubs the retention policy expires at `now`. Pure; runs inside every
/// reconciliation pass rather than on its own timer, so removal is always
/// consistent with the freshest merge.
pub fn expired_ids<'a>(
    stubs: impl IntoIterator<Item = &'a JobStub>,
    now: DateTime<Utc>,
    policy: &RetentionPolicy,
) -> Vec<String> {
    stubs
        .into_iter()
        .filter(|stub| is_expired(stub, now, policy))
        .map(|stub| stub.job_id.clone())
        .collect()
}
