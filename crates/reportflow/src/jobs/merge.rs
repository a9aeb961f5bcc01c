use chrono::{DateTime, Utc};

use crate::jobs::model::{JobSnapshot, JobStub, Origin};

/// What applying a snapshot (or an incoming stub) to the store did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// No stub existed for this id; the incoming record was inserted as-is.
    Inserted,
    /// The stub advanced into a terminal status just now.
    Completed,
    /// Fields changed without a terminal transition.
    Updated,
    /// The incoming record carried nothing the stub did not already have.
    Unchanged,
    /// The incoming status would regress a more advanced stub; discarded whole.
    RejectedRegression,
}

/// Merge an authoritative snapshot into a stub in place.
///
/// Rules:
/// - status only moves forward in the queued -> running -> terminal order;
///   a regressive snapshot is rejected without touching any field
/// - `result` and `template_ref` follow the accepted status; `template_ref`
///   fills only when unset
/// - `completed_at` is set exactly once, at the first observed terminal status
/// - any accepted snapshot upgrades `origin` to remote
///
/// Re-applying the same snapshot is a no-op, which makes reconciliation passes
/// idempotent regardless of how often a job is re-polled.
pub fn merge_snapshot(stub: &mut JobStub, snapshot: &JobSnapshot, now: DateTime<Utc>) -> MergeOutcome {
    if snapshot.status.rank() < stub.status.rank() {
        return MergeOutcome::RejectedRegression;
    }

    let was_terminal = stub.status.is_terminal();
    let mut changed = false;

    if stub.status != snapshot.status {
        stub.status = snapshot.status;
        changed = true;
    }

    if stub.template_ref.is_none() && snapshot.template_ref.is_some() {
        stub.template_ref = snapshot.template_ref.clone();
        changed = true;
    }

    if let Some(result) = &snapshot.result {
        if stub.result.as_ref() != Some(result) {
            stub.result = Some(result.clone());
            changed = true;
        }
    }

    if stub.origin != Origin::Remote {
        stub.origin = Origin::Remote;
        changed = true;
    }

    if stub.status.is_terminal() && stub.completed_at.is_none() {
        stub.completed_at = Some(now);
        changed = true;
    }

    if stub.status.is_terminal() && !was_terminal {
        MergeOutcome::Completed
    } else if changed {
        MergeOutcome::Updated
    } else {
        MergeOutcome::Unchanged
    }
}
