use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::jobs::gc::{expired_ids, RetentionPolicy};
use crate::jobs::merge::{merge_snapshot, MergeOutcome};
use crate::jobs::model::{JobSnapshot, JobStub, Origin};

/// On-disk layout: one document per authenticated user, so switching accounts
/// on a shared device neither leaks nor mixes job lists.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedState {
    user_id: String,
    saved_at: DateTime<Utc>,
    stubs: Vec<JobStub>,
}

struct StoreInner {
    user_id: String,
    stubs: HashMap<String, JobStub>,
    /// Cleared after the first write failure; the store then runs memory-only
    /// for the rest of the session.
    path: Option<PathBuf>,
    degraded: bool,
}

/// The single in-process owner of truth for this device's job list.
///
/// All methods are synchronous and internally locked, so readers never observe
/// a torn state even though the surrounding polling is asynchronous. Mutation
/// reaches this store from exactly two places: the optimistic write at
/// submission time and the reconciler's serialized pass.
#[derive(Clone)]
pub struct LocalJobStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl LocalJobStore {
    /// Open the store for one user, loading the persisted document when a
    /// state directory is configured. A missing or unreadable document starts
    /// the session empty rather than failing.
    pub fn open(user_id: &str, state_dir: Option<&Path>) -> Self {
        let path = state_dir.map(|dir| dir.join(format!("jobs-{}.json", file_key(user_id))));

        let mut stubs = HashMap::new();
        if let Some(path) = &path {
            match load_document(path, user_id) {
                Ok(Some(loaded)) => {
                    debug!(user_id, count = loaded.len(), "restored persisted job list");
                    stubs = loaded;
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(user_id, error = %err, "could not read persisted job list, starting empty");
                }
            }
        }

        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                user_id: user_id.to_string(),
                stubs,
                path,
                degraded: false,
            })),
        }
    }

    /// In-memory store with no persistence, for embedders that manage their own.
    pub fn in_memory(user_id: &str) -> Self {
        Self::open(user_id, None)
    }

    /// Insert or merge by job id.
    ///
    /// Merge rules: status/result apply only if equal-or-later in the status
    /// order; title/template_ref fill only when unset; completed_at is
    /// set-once. An incoming record that would regress the stub is discarded.
    pub fn upsert(&self, incoming: JobStub, now: DateTime<Utc>) -> MergeOutcome {
        let mut inner = self.lock();
        let outcome = match inner.stubs.entry(incoming.job_id.clone()) {
            Entry::Vacant(slot) => {
                let mut stub = incoming;
                if stub.status.is_terminal() && stub.completed_at.is_none() {
                    stub.completed_at = Some(now);
                }
                slot.insert(stub);
                MergeOutcome::Inserted
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                let mut filled = false;
                if existing.title.is_none() && incoming.title.is_some() {
                    existing.title = incoming.title.clone();
                    filled = true;
                }
                if incoming.origin == Origin::Remote {
                    let snapshot = JobSnapshot {
                        job_id: incoming.job_id.clone(),
                        status: incoming.status,
                        template_ref: incoming.template_ref.clone(),
                        result: incoming.result.clone(),
                    };
                    match merge_snapshot(existing, &snapshot, now) {
                        MergeOutcome::Unchanged if filled => MergeOutcome::Updated,
                        outcome => outcome,
                    }
                } else {
                    // A duplicate optimistic write only fills display hints;
                    // it never moves status backwards.
                    if existing.template_ref.is_none() && incoming.template_ref.is_some() {
                        existing.template_ref = incoming.template_ref.clone();
                        filled = true;
                    }
                    if filled {
                        MergeOutcome::Updated
                    } else {
                        MergeOutcome::Unchanged
                    }
                }
            }
        };

        if !matches!(outcome, MergeOutcome::Unchanged | MergeOutcome::RejectedRegression) {
            persist(&mut inner);
        }
        outcome
    }

    /// Merge an authoritative snapshot into the stub it refreshes.
    /// Returns None when the stub is gone (deleted mid-pass); the result is
    /// dropped rather than resurrecting the entry.
    pub fn apply_snapshot(&self, snapshot: &JobSnapshot, now: DateTime<Utc>) -> Option<MergeOutcome> {
        let mut inner = self.lock();
        let outcome = inner
            .stubs
            .get_mut(&snapshot.job_id)
            .map(|stub| merge_snapshot(stub, snapshot, now));
        if matches!(outcome, Some(MergeOutcome::Updated | MergeOutcome::Completed)) {
            persist(&mut inner);
        }
        outcome
    }

    pub fn remove(&self, job_id: &str) -> bool {
        let mut inner = self.lock();
        let removed = inner.stubs.remove(job_id).is_some();
        if removed {
            persist(&mut inner);
        }
        removed
    }

    pub fn get(&self, job_id: &str) -> Option<JobStub> {
        self.lock().stubs.get(job_id).cloned()
    }

    /// All stubs, newest first. The ordering is a user-facing contract.
    pub fn list_all(&self) -> Vec<JobStub> {
        let inner = self.lock();
        let mut stubs: Vec<JobStub> = inner.stubs.values().cloned().collect();
        stubs.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.job_id.cmp(&a.job_id))
        });
        stubs
    }

    pub fn active_stubs(&self) -> Vec<JobStub> {
        self.lock()
            .stubs
            .values()
            .filter(|stub| !stub.status.is_terminal())
            .cloned()
            .collect()
    }

    pub fn has_active(&self) -> bool {
        self.lock()
            .stubs
            .values()
            .any(|stub| !stub.status.is_terminal())
    }

    /// Apply the retention policy; returns the ids removed.
    pub fn prune_expired(&self, now: DateTime<Utc>, policy: &RetentionPolicy) -> Vec<String> {
        let mut inner = self.lock();
        let expired = expired_ids(inner.stubs.values(), now, policy);
        if !expired.is_empty() {
            for job_id in &expired {
                inner.stubs.remove(job_id);
            }
            persist(&mut inner);
        }
        expired
    }

    /// True once a persistence failure has downgraded the store to
    /// memory-only operation for this session.
    pub fn is_degraded(&self) -> bool {
        self.lock().degraded
    }

    pub fn user_id(&self) -> String {
        self.lock().user_id.clone()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// User ids come from the auth layer; flatten anything that is not filename-safe
/// so the per-user namespacing cannot be escaped.
fn file_key(user_id: &str) -> String {
    user_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect()
}

fn load_document(path: &Path, user_id: &str) -> anyhow::Result<Option<HashMap<String, JobStub>>> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(path)?;
    let doc: PersistedState = serde_json::from_slice(&bytes)?;
    if doc.user_id != user_id {
        // A document for another account must never populate this session.
        warn!(
            expected = user_id,
            found = %doc.user_id,
            "persisted document belongs to a different user, ignoring"
        );
        return Ok(None);
    }
    Ok(Some(
        doc.stubs
            .into_iter()
            .map(|stub| (stub.job_id.clone(), stub))
            .collect(),
    ))
}

/// Best-effort write of the whole document. Failure flips the store into
/// memory-only mode with a single warning; public methods never fail for
/// persistence reasons.
fn persist(inner: &mut StoreInner) {
    let Some(path) = inner.path.clone() else {
        return;
    };

    let mut stubs: Vec<JobStub> = inner.stubs.values().cloned().collect();
    stubs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let doc = PersistedState {
        user_id: inner.user_id.clone(),
        saved_at: Utc::now(),
        stubs,
    };

    let write = || -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_vec_pretty(&doc)?)?;
        Ok(())
    };

    if let Err(err) = write() {
        warn!(
            user_id = %inner.user_id,
            path = %path.display(),
            error = %err,
            "persisting job list failed, continuing memory-only for this session"
        );
        inner.path = None;
        inner.degraded = true;
    }
}
