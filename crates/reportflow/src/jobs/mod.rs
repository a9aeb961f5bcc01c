pub mod backoff;
pub mod events;
pub mod gc;
pub mod merge;
pub mod metrics;
pub mod model;
pub mod reconcile;
pub mod scheduler;
pub mod store;

pub use backoff::BackoffConfig;
pub use events::EngineEvent;
pub use gc::RetentionPolicy;
pub use merge::{merge_snapshot, MergeOutcome};
pub use metrics::PassStats;
pub use model::{JobSnapshot, JobStatus, JobStub, Origin};
pub use reconcile::{PassReport, Reconciler};
pub use scheduler::{EngineHub, PollingScheduler, SchedulerConfig, SchedulerState};
pub use store::LocalJobStore;
