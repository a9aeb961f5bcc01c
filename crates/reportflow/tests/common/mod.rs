use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use reportflow::{
    GatewayError, JobSnapshot, JobStatus, JobStub, Origin, RemoteJobGateway, ReportRequest,
};

/// Per-job canned answer for `get_job`.
#[derive(Clone)]
#[allow(dead_code)]
pub enum Script {
    Snapshot(JobStatus),
    NotFound,
    Transport,
}

/// Programmable gateway: every lookup answers from a per-id script, the whole
/// gateway can be switched into an outage, and calls are counted.
#[allow(dead_code)]
pub struct ScriptedGateway {
    scripts: Mutex<HashMap<String, Script>>,
    recent: Mutex<Vec<JobSnapshot>>,
    /// Fails get_job and list_recent_jobs with a transport error; submissions
    /// still go through so tests can seed state before an outage.
    fail_lookups: AtomicBool,
    get_calls: AtomicUsize,
    submit_calls: AtomicUsize,
}

#[allow(dead_code)]
impl ScriptedGateway {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            recent: Mutex::new(Vec::new()),
            fail_lookups: AtomicBool::new(false),
            get_calls: AtomicUsize::new(0),
            submit_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_script(&self, job_id: &str, script: Script) {
        self.lock_scripts().insert(job_id.to_string(), script);
    }

    pub fn set_recent(&self, snapshots: Vec<JobSnapshot>) {
        *self.recent.lock().unwrap_or_else(PoisonError::into_inner) = snapshots;
    }

    pub fn set_fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    fn lock_scripts(&self) -> MutexGuard<'_, HashMap<String, Script>> {
        self.scripts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RemoteJobGateway for ScriptedGateway {
    async fn submit_job(&self, _request: &ReportRequest) -> Result<String, GatewayError> {
        let n = self.submit_calls.fetch_add(1, Ordering::SeqCst);
        let job_id = format!("job-{n}");
        // Until a test scripts otherwise, the remote reports it queued.
        self.set_script(&job_id, Script::Snapshot(JobStatus::Queued));
        Ok(job_id)
    }

    async fn get_job(&self, job_id: &str) -> Result<JobSnapshot, GatewayError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("scripted outage".to_string()));
        }
        match self.lock_scripts().get(job_id) {
            Some(Script::Snapshot(status)) => Ok(snapshot(job_id, *status)),
            Some(Script::NotFound) | None => Err(GatewayError::NotFound),
            Some(Script::Transport) => {
                Err(GatewayError::Transport("scripted failure".to_string()))
            }
        }
    }

    async fn list_recent_jobs(&self, limit: usize) -> Result<Vec<JobSnapshot>, GatewayError> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("scripted outage".to_string()));
        }
        let recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(recent.iter().take(limit).cloned().collect())
    }
}

#[allow(dead_code)]
pub fn snapshot(job_id: &str, status: JobStatus) -> JobSnapshot {
    JobSnapshot {
        job_id: job_id.to_string(),
        status,
        template_ref: None,
        result: None,
    }
}

#[allow(dead_code)]
pub fn stub_created_ago(job_id: &str, status: JobStatus, age: Duration) -> JobStub {
    JobStub {
        job_id: job_id.to_string(),
        status,
        template_ref: None,
        title: Some(format!("{job_id} report")),
        created_at: Utc::now() - age,
        completed_at: None,
        origin: Origin::Local,
        result: None,
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
#[allow(dead_code)]
pub async fn wait_until(mut condition: impl FnMut() -> bool, timeout: StdDuration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
}
