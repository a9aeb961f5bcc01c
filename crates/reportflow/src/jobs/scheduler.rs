use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::jobs::backoff::{self, BackoffConfig};
use crate::jobs::events::EngineEvent;
use crate::jobs::metrics::PassStats;
use crate::jobs::model::JobStub;
use crate::jobs::reconcile::{PassInputs, PassReport, Reconciler};
use crate::jobs::store::LocalJobStore;

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No active jobs; nothing to poll.
    Idle,
    /// At least one active job; periodic reconciliation running.
    Polling,
    /// Consecutive transport failures crossed the threshold; interval widened.
    Backoff,
    /// Page/tab not visible; polling paused entirely.
    Suspended,
}

impl SchedulerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Polling => "polling",
            SchedulerState::Backoff => "backoff",
            SchedulerState::Suspended => "suspended",
        }
    }
}

/// The state the scheduler settles into between passes. Pure, so the
/// transition table is testable without timers.
pub fn resting_state(
    visible: bool,
    has_active: bool,
    consecutive_failures: u32,
    failure_threshold: u32,
) -> SchedulerState {
    if !visible {
        SchedulerState::Suspended
    } else if !has_active {
        SchedulerState::Idle
    } else if consecutive_failures >= failure_threshold {
        SchedulerState::Backoff
    } else {
        SchedulerState::Polling
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Base reconciliation interval while polling.
    pub poll_interval: Duration,
    /// Consecutive failed passes before entering backoff and signalling
    /// degraded connectivity.
    pub failure_threshold: u32,
    pub backoff: BackoffConfig,
    /// A pass still gathering past this ceiling is abandoned and counted as
    /// a failed pass.
    pub pass_ceiling: Duration,
    /// Fetch the cross-device recent listing every Nth pass.
    pub recent_every_passes: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(4_000),
            failure_threshold: 3,
            backoff: BackoffConfig::default(),
            pass_ceiling: Duration::from_millis(30_000),
            recent_every_passes: 5,
        }
    }
}

/// Shared surface between the scheduler loop, the view model and the session:
/// the store handle, the reactive list channel, the event stream, selection
/// state, pass statistics, the manual-refresh trigger and page visibility.
pub struct EngineHub {
    store: LocalJobStore,
    list_tx: watch::Sender<Vec<JobStub>>,
    // Held so publishing works before the first subscriber arrives.
    _list_rx: watch::Receiver<Vec<JobStub>>,
    events_tx: broadcast::Sender<EngineEvent>,
    selection: Mutex<HashSet<String>>,
    stats: Mutex<PassStats>,
    state: Mutex<SchedulerState>,
    kick: Notify,
    visible_tx: watch::Sender<bool>,
    _visible_rx: watch::Receiver<bool>,
}

impl EngineHub {
    pub fn new(store: LocalJobStore) -> Arc<Self> {
        let (list_tx, list_rx) = watch::channel(Vec::new());
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (visible_tx, visible_rx) = watch::channel(true);
        Arc::new(Self {
            store,
            list_tx,
            _list_rx: list_rx,
            events_tx,
            selection: Mutex::new(HashSet::new()),
            stats: Mutex::new(PassStats::default()),
            state: Mutex::new(SchedulerState::Idle),
            kick: Notify::new(),
            visible_tx,
            _visible_rx: visible_rx,
        })
    }

    pub fn store(&self) -> &LocalJobStore {
        &self.store
    }

    /// Receiver that always holds the latest ordered job list; late
    /// subscribers see the current list immediately.
    pub fn subscribe_list(&self) -> watch::Receiver<Vec<JobStub>> {
        self.list_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events_tx.subscribe()
    }

    pub fn publish_list(&self) {
        let _ = self.list_tx.send(self.store.list_all());
    }

    pub(crate) fn emit(&self, event: EngineEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Request an out-of-band pass: wakes an idle scheduler and pre-empts a
    /// pending interval. Requests made while a pass is running coalesce into
    /// at most one follow-up pass.
    pub fn request_pass(&self) {
        self.kick.notify_one();
    }

    pub(crate) async fn pass_requested(&self) {
        self.kick.notified().await;
    }

    pub fn set_visible(&self, visible: bool) {
        let _ = self.visible_tx.send(visible);
    }

    pub fn is_visible(&self) -> bool {
        *self.visible_tx.borrow()
    }

    pub(crate) fn visibility_receiver(&self) -> watch::Receiver<bool> {
        self.visible_tx.subscribe()
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_state(&self, next: SchedulerState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != next {
            debug!(from = state.as_str(), to = next.as_str(), "scheduler state change");
            *state = next;
        }
    }

    pub fn stats(&self) -> PassStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn absorb_stats(&self, report: &PassReport) {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .absorb(report, Utc::now());
    }

    pub(crate) fn record_abandoned_pass(&self) {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record_abandoned(Utc::now());
    }

    pub fn toggle_selected(&self, job_id: &str) -> bool {
        let mut selection = self.selection.lock().unwrap_or_else(PoisonError::into_inner);
        if selection.remove(job_id) {
            false
        } else {
            selection.insert(job_id.to_string());
            true
        }
    }

    pub fn selected_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .selection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn clear_selection(&self) {
        self.selection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Ids that no longer exist (orphaned, pruned, deleted) must not linger in
    /// the bulk-select state.
    pub(crate) fn discard_selection<'a>(&self, ids: impl IntoIterator<Item = &'a String>) {
        let mut selection = self.selection.lock().unwrap_or_else(PoisonError::into_inner);
        for id in ids {
            selection.remove(id);
        }
    }
}

enum Wake {
    Pass,
    Revisit,
    Stop,
}

enum PassOutcome {
    Finished(PassReport),
    Abandoned,
    Cancelled,
}

/// Drives periodic reconciliation. A single loop task owns the cadence, so
/// passes are strictly serialized: a tick that would overlap a running pass
/// cannot happen by construction, and a manual refresh during a pass coalesces
/// into one follow-up.
pub struct PollingScheduler {
    hub: Arc<EngineHub>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PollingScheduler {
    pub fn spawn(reconciler: Reconciler, cfg: SchedulerConfig, hub: Arc<EngineHub>) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_loop(reconciler, cfg, Arc::clone(&hub), cancel.clone()));
        Self {
            hub,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.hub.state()
    }

    pub fn hub(&self) -> &Arc<EngineHub> {
        &self.hub
    }

    /// Stop the loop. No further pass starts after this returns, and a pass
    /// in flight at cancellation time has its results dropped, not applied.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

async fn run_loop(
    reconciler: Reconciler,
    cfg: SchedulerConfig,
    hub: Arc<EngineHub>,
    cancel: CancellationToken,
) {
    let mut visible_rx = hub.visibility_receiver();
    let mut consecutive_failures: u32 = 0;
    let mut degraded = false;
    let mut pass_counter: u64 = 0;
    let mut run_immediately = false;
    let mut rng = StdRng::from_entropy();

    loop {
        if cancel.is_cancelled() {
            break;
        }

        if !*visible_rx.borrow() {
            hub.set_state(SchedulerState::Suspended);
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = visible_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            // Catch up as soon as visibility returns instead of waiting out
            // the remaining interval.
            run_immediately = *visible_rx.borrow();
            continue;
        }

        let state = resting_state(
            true,
            hub.store().has_active(),
            consecutive_failures,
            cfg.failure_threshold,
        );
        hub.set_state(state);

        if !run_immediately {
            let wake = if state == SchedulerState::Idle {
                // Nothing to poll; sleep until a submission or manual refresh.
                tokio::select! {
                    _ = cancel.cancelled() => Wake::Stop,
                    _ = hub.pass_requested() => Wake::Pass,
                    changed = visible_rx.changed() => {
                        if changed.is_err() { Wake::Stop } else { Wake::Revisit }
                    }
                }
            } else {
                let delay = if state == SchedulerState::Backoff {
                    let level = consecutive_failures.saturating_sub(cfg.failure_threshold) + 1;
                    Duration::from_millis(backoff::next_delay_ms(level, &cfg.backoff, &mut rng))
                } else {
                    cfg.poll_interval
                };
                tokio::select! {
                    _ = cancel.cancelled() => Wake::Stop,
                    _ = tokio::time::sleep(delay) => Wake::Pass,
                    _ = hub.pass_requested() => Wake::Pass,
                    changed = visible_rx.changed() => {
                        if changed.is_err() { Wake::Stop } else { Wake::Revisit }
                    }
                }
            };
            match wake {
                Wake::Stop => break,
                Wake::Revisit => continue,
                Wake::Pass => {}
            }
        }
        run_immediately = false;

        pass_counter += 1;
        let include_recent =
            cfg.recent_every_passes <= 1 || pass_counter % u64::from(cfg.recent_every_passes) == 1;

        let failed = match run_one_pass(&reconciler, &cfg, &cancel, include_recent).await {
            PassOutcome::Cancelled => break,
            PassOutcome::Abandoned => {
                warn!(
                    ceiling_ms = cfg.pass_ceiling.as_millis() as u64,
                    "reconciliation pass exceeded ceiling, abandoned"
                );
                hub.record_abandoned_pass();
                true
            }
            PassOutcome::Finished(report) => {
                for job_id in &report.completed {
                    hub.emit(EngineEvent::JobCompleted {
                        job_id: job_id.clone(),
                    });
                }
                for job_id in &report.orphaned {
                    hub.emit(EngineEvent::JobOrphaned {
                        job_id: job_id.clone(),
                    });
                }
                hub.discard_selection(report.orphaned.iter().chain(report.pruned.iter()));
                hub.absorb_stats(&report);
                hub.publish_list();
                !report.fully_successful()
            }
        };

        if failed {
            consecutive_failures += 1;
            if consecutive_failures >= cfg.failure_threshold && !degraded {
                degraded = true;
                info!(consecutive_failures, "connectivity degraded, widening poll interval");
                hub.emit(EngineEvent::ConnectivityDegraded);
            }
        } else {
            if degraded {
                info!("connectivity restored");
                hub.emit(EngineEvent::ConnectivityRestored);
            }
            degraded = false;
            consecutive_failures = 0;
        }
    }
}

async fn run_one_pass(
    reconciler: &Reconciler,
    cfg: &SchedulerConfig,
    cancel: &CancellationToken,
    include_recent: bool,
) -> PassOutcome {
    let gather = reconciler.gather(include_recent);
    let inputs: PassInputs = tokio::select! {
        _ = cancel.cancelled() => return PassOutcome::Cancelled,
        gathered = tokio::time::timeout(cfg.pass_ceiling, gather) => match gathered {
            Ok(inputs) => inputs,
            Err(_) => return PassOutcome::Abandoned,
        }
    };
    if cancel.is_cancelled() {
        // A pass in flight when the scheduler stops must not touch the store.
        return PassOutcome::Cancelled;
    }
    PassOutcome::Finished(reconciler.commit(inputs))
}
