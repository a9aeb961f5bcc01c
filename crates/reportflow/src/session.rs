use std::sync::Arc;

use tracing::info;

use crate::config::EngineConfig;
use crate::gateway::RemoteJobGateway;
use crate::jobs::reconcile::Reconciler;
use crate::jobs::scheduler::{EngineHub, PollingScheduler, SchedulerState};
use crate::jobs::store::LocalJobStore;
use crate::viewmodel::ReportsViewModel;

/// One authenticated user's reconciliation engine: store, scheduler and view
/// model constructed together and torn down together. No ambient singletons;
/// two sessions on the same process never share state.
pub struct ReportSession {
    user_id: String,
    view: ReportsViewModel,
    scheduler: PollingScheduler,
}

impl ReportSession {
    /// Build the engine for `user_id` and start polling. Loads the user's
    /// persisted job list and immediately schedules a catch-up pass for any
    /// jobs still active from a previous session.
    pub fn start(user_id: &str, gateway: Arc<dyn RemoteJobGateway>, config: EngineConfig) -> Self {
        let store = LocalJobStore::open(user_id, config.state_dir.as_deref());
        let hub = EngineHub::new(store.clone());

        let reconciler = Reconciler::new(
            store,
            Arc::clone(&gateway),
            config.retention.clone(),
            config.recent_limit,
        );
        let scheduler = PollingScheduler::spawn(reconciler, config.scheduler.clone(), Arc::clone(&hub));
        let view = ReportsViewModel::new(gateway, Arc::clone(&hub));

        // Late subscribers still see the restored list right away.
        hub.publish_list();
        hub.request_pass();

        info!(user_id, "report session started");
        Self {
            user_id: user_id.to_string(),
            view,
            scheduler,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn view(&self) -> &ReportsViewModel {
        &self.view
    }

    pub fn state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    /// Feed page/tab visibility into the scheduler.
    pub fn set_visible(&self, visible: bool) {
        self.scheduler.hub().set_visible(visible);
    }

    /// Teardown on logout: stops the polling loop and guarantees no further
    /// reconciliation results are applied.
    pub async fn shutdown(self) {
        self.scheduler.shutdown().await;
        info!(user_id = %self.user_id, "report session shut down");
    }
}
