/// Events surfaced to the UI layer, each fired at most once per state
/// transition. Re-polling an already-known state never re-fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A job was observed transitioning into `done` or `error`.
    JobCompleted { job_id: String },
    /// The remote answered 404 for a locally-known job; it has been purged.
    JobOrphaned { job_id: String },
    /// Consecutive failed passes crossed the threshold ("updates delayed" banner).
    ConnectivityDegraded,
    /// A fully successful pass after a degraded period.
    ConnectivityRestored,
}
