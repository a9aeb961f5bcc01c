use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::gateway::{RemoteJobGateway, ReportRequest};
use crate::jobs::events::EngineEvent;
use crate::jobs::metrics::PassStats;
use crate::jobs::model::JobStub;
use crate::jobs::scheduler::EngineHub;

/// Thin facade between the engine and the UI layer: one observable job list,
/// the event stream, and the user actions (submit, delete, bulk-select,
/// manual refresh) forwarded into the store and scheduler.
#[derive(Clone)]
pub struct ReportsViewModel {
    gateway: Arc<dyn RemoteJobGateway>,
    hub: Arc<EngineHub>,
}

impl ReportsViewModel {
    pub fn new(gateway: Arc<dyn RemoteJobGateway>, hub: Arc<EngineHub>) -> Self {
        Self { gateway, hub }
    }

    /// Latest ordered job list, pushed on every store change.
    pub fn subscribe(&self) -> watch::Receiver<Vec<JobStub>> {
        self.hub.subscribe_list()
    }

    pub fn events(&self) -> broadcast::Receiver<EngineEvent> {
        self.hub.subscribe_events()
    }

    /// Current list, newest first.
    pub fn jobs(&self) -> Vec<JobStub> {
        self.hub.store().list_all()
    }

    /// Submit a report request and record the optimistic stub the moment the
    /// id is known, before any poll confirms it. A just-started job is never
    /// invisible to the list.
    pub async fn submit(&self, request: &ReportRequest) -> anyhow::Result<String> {
        let job_id = self.gateway.submit_job(request).await?;

        let now = Utc::now();
        let stub = JobStub::optimistic(
            &job_id,
            request.title.clone(),
            Some(request.template_ref.clone()),
            now,
        );
        self.hub.store().upsert(stub, now);
        self.hub.publish_list();
        // Poll soon rather than waiting out the current interval.
        self.hub.request_pass();

        debug!(%job_id, "submitted report job");
        Ok(job_id)
    }

    /// Local-only hide. Whether the server also deletes the job is the remote
    /// collaborator's concern, not this engine's.
    pub fn delete(&self, job_id: &str) {
        self.hub.store().remove(job_id);
        self.hub.discard_selection(std::iter::once(&job_id.to_string()));
        self.hub.publish_list();
    }

    /// User-initiated refresh, independent of the scheduler's timer.
    pub fn refresh_now(&self) {
        self.hub.request_pass();
    }

    pub fn toggle_selected(&self, job_id: &str) -> bool {
        self.hub.toggle_selected(job_id)
    }

    pub fn selected_ids(&self) -> Vec<String> {
        self.hub.selected_ids()
    }

    pub fn clear_selection(&self) {
        self.hub.clear_selection()
    }

    pub fn stats(&self) -> PassStats {
        self.hub.stats()
    }
}
