use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::gateway::{GatewayError, RemoteJobGateway};
use crate::jobs::gc::RetentionPolicy;
use crate::jobs::merge::MergeOutcome;
use crate::jobs::model::{JobSnapshot, JobStub};
use crate::jobs::store::LocalJobStore;

/// What one reconciliation pass did, for the caller to persist, notify and
/// re-render from.
#[derive(Debug, Clone, Default)]
pub struct PassReport {
    /// Active stubs whose status was refreshed this pass.
    pub refreshed: usize,
    /// Jobs observed transitioning into a terminal status this pass.
    pub completed: Vec<String>,
    /// Locally-known jobs the remote 404'd; removed.
    pub orphaned: Vec<String>,
    /// Jobs first seen through the recent listing (started elsewhere).
    pub discovered: Vec<String>,
    /// Stubs expired by the retention policy at the end of the pass.
    pub pruned: Vec<String>,
    pub transport_failures: usize,
}

impl PassReport {
    pub fn fully_successful(&self) -> bool {
        self.transport_failures == 0
    }
}

/// Everything a pass gathered from the network, before any store mutation.
/// Splitting gather from commit keeps the merge atomic: dropping the gather
/// future (cancellation, pass ceiling) leaves the store untouched.
pub struct PassInputs {
    settled: Vec<(String, Result<JobSnapshot, GatewayError>)>,
    recent: Option<Result<Vec<JobSnapshot>, GatewayError>>,
}

/// The single chokepoint through which remote state reaches the local store.
pub struct Reconciler {
    store: LocalJobStore,
    gateway: Arc<dyn RemoteJobGateway>,
    retention: RetentionPolicy,
    recent_limit: usize,
}

impl Reconciler {
    pub fn new(
        store: LocalJobStore,
        gateway: Arc<dyn RemoteJobGateway>,
        retention: RetentionPolicy,
        recent_limit: usize,
    ) -> Self {
        Self {
            store,
            gateway,
            retention,
            recent_limit,
        }
    }

    pub fn store(&self) -> &LocalJobStore {
        &self.store
    }

    /// Fan out one lookup per active stub and wait for every request to
    /// settle. Terminal stubs are not re-fetched. One slow or failing job
    /// never blocks status updates for the others.
    pub async fn gather(&self, include_recent: bool) -> PassInputs {
        let active = self.store.active_stubs();

        let mut lookups = JoinSet::new();
        for stub in active {
            let gateway = Arc::clone(&self.gateway);
            let job_id = stub.job_id;
            lookups.spawn(async move {
                let result = gateway.get_job(&job_id).await;
                (job_id, result)
            });
        }

        let mut settled = Vec::new();
        while let Some(joined) = lookups.join_next().await {
            match joined {
                Ok(pair) => settled.push(pair),
                Err(err) => warn!(error = %err, "job lookup task failed to join"),
            }
        }

        let recent = if include_recent {
            Some(self.gateway.list_recent_jobs(self.recent_limit).await)
        } else {
            None
        };

        PassInputs { settled, recent }
    }

    /// Apply a gathered pass to the store. Synchronous: the merge never
    /// suspends, so partial merges are not observable. Results are applied in
    /// job-id order, making the final state independent of network arrival
    /// order.
    pub fn commit(&self, mut inputs: PassInputs) -> PassReport {
        let now = Utc::now();
        let mut report = PassReport::default();

        inputs.settled.sort_by(|a, b| a.0.cmp(&b.0));

        for (job_id, result) in inputs.settled {
            match result {
                Ok(snapshot) => {
                    report.refreshed += 1;
                    match self.store.apply_snapshot(&snapshot, now) {
                        Some(MergeOutcome::Completed) => report.completed.push(job_id),
                        Some(MergeOutcome::RejectedRegression) => {
                            warn!(
                                %job_id,
                                incoming = snapshot.status.as_str(),
                                "discarded stale snapshot that would regress a terminal job"
                            );
                        }
                        _ => {}
                    }
                }
                Err(GatewayError::NotFound) => {
                    // Orphan: the remote purged (or never persisted) this job.
                    if self.store.remove(&job_id) {
                        report.orphaned.push(job_id);
                    }
                }
                Err(GatewayError::Transport(message)) => {
                    // Leave the stub untouched; a job is never deleted or
                    // marked failed because the network was briefly unreachable.
                    debug!(%job_id, %message, "job refresh failed in transit");
                    report.transport_failures += 1;
                }
            }
        }

        match inputs.recent {
            Some(Ok(snapshots)) => {
                for snapshot in snapshots {
                    match self.store.upsert(JobStub::discovered(&snapshot, now), now) {
                        MergeOutcome::Inserted => report.discovered.push(snapshot.job_id),
                        // A known job can also finish through the listing when
                        // its direct lookup failed this pass.
                        MergeOutcome::Completed => report.completed.push(snapshot.job_id),
                        _ => {}
                    }
                }
                // Jobs known locally but absent from the bounded listing stay:
                // only an explicit 404 on direct lookup removes anything.
            }
            Some(Err(err)) => {
                debug!(error = %err, "recent-jobs listing failed in transit");
                report.transport_failures += 1;
            }
            None => {}
        }

        report.pruned = self.store.prune_expired(now, &self.retention);

        debug!(
            refreshed = report.refreshed,
            completed = report.completed.len(),
            orphaned = report.orphaned.len(),
            discovered = report.discovered.len(),
            pruned = report.pruned.len(),
            transport_failures = report.transport_failures,
            "reconciliation pass committed"
        );
        report
    }

    /// One complete cycle: gather, merge, garbage-collect.
    pub async fn run_pass(&self, include_recent: bool) -> PassReport {
        let inputs = self.gather(include_recent).await;
        self.commit(inputs)
    }
}
