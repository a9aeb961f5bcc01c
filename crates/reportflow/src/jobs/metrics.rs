use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::jobs::reconcile::PassReport;

/// Running counters over reconciliation passes, kept by the scheduler and
/// readable through the view model.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PassStats {
    pub passes: u64,
    pub failed_passes: u64,
    pub transport_failures: u64,
    pub jobs_completed: u64,
    pub orphans_removed: u64,
    pub jobs_discovered: u64,
    pub stubs_pruned: u64,
    pub last_pass_at: Option<DateTime<Utc>>,
}

impl PassStats {
    pub fn absorb(&mut self, report: &PassReport, at: DateTime<Utc>) {
        self.passes += 1;
        if !report.fully_successful() {
            self.failed_passes += 1;
        }
        self.transport_failures += report.transport_failures as u64;
        self.jobs_completed += report.completed.len() as u64;
        self.orphans_removed += report.orphaned.len() as u64;
        self.jobs_discovered += report.discovered.len() as u64;
        self.stubs_pruned += report.pruned.len() as u64;
        self.last_pass_at = Some(at);
    }

    /// A pass abandoned at the ceiling counts as a failed pass with no merge.
    pub fn record_abandoned(&mut self, at: DateTime<Utc>) {
        self.passes += 1;
        self.failed_passes += 1;
        self.last_pass_at = Some(at);
    }
}
