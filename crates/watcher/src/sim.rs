use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use serde_json::json;
use uuid::Uuid;

use reportflow::{GatewayError, JobSnapshot, JobStatus, RemoteJobGateway, ReportRequest};

/// Stand-in for the remote job store: jobs progress queued -> running ->
/// done/error on their own clocks, lookups carry a little latency, and the
/// whole thing can be switched into an outage to exercise backoff.
pub struct SimulatedGateway {
    jobs: Mutex<HashMap<String, SimJob>>,
    /// Submission order, newest last; backs the recent listing.
    order: Mutex<Vec<String>>,
    outage: AtomicBool,
}

struct SimJob {
    template_ref: String,
    submitted: Instant,
    running_after: Duration,
    finished_after: Duration,
    outcome: JobStatus,
}

impl SimJob {
    fn status(&self) -> JobStatus {
        let elapsed = self.submitted.elapsed();
        if elapsed < self.running_after {
            JobStatus::Queued
        } else if elapsed < self.finished_after {
            JobStatus::Running
        } else {
            self.outcome
        }
    }
}

impl SimulatedGateway {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            order: Mutex::new(Vec::new()),
            outage: AtomicBool::new(false),
        }
    }

    pub fn set_outage(&self, down: bool) {
        self.outage.store(down, Ordering::SeqCst);
    }

    /// Drop a job server-side, as if a cleanup task purged it. The next
    /// direct lookup answers 404.
    pub fn purge(&self, job_id: &str) -> bool {
        self.lock_jobs().remove(job_id).is_some()
    }

    /// Plant a finished job that was never submitted through this session,
    /// as if another device started it. Only the recent listing reveals it.
    pub fn seed_remote_job(&self, template_ref: &str, outcome: JobStatus) -> String {
        let job_id = mint_job_id();
        self.lock_jobs().insert(
            job_id.clone(),
            SimJob {
                template_ref: template_ref.to_string(),
                submitted: Instant::now(),
                running_after: Duration::ZERO,
                finished_after: Duration::ZERO,
                outcome,
            },
        );
        self.lock_order().push(job_id.clone());
        job_id
    }

    fn snapshot(&self, job_id: &str, job: &SimJob) -> JobSnapshot {
        let status = job.status();
        let result = (status == JobStatus::Done)
            .then(|| json!({ "url": format!("https://reports.example/{job_id}.pdf") }));
        JobSnapshot {
            job_id: job_id.to_string(),
            status,
            template_ref: Some(job.template_ref.clone()),
            result,
        }
    }

    fn check_outage(&self) -> Result<(), GatewayError> {
        if self.outage.load(Ordering::SeqCst) {
            Err(GatewayError::Transport("simulated outage".to_string()))
        } else {
            Ok(())
        }
    }

    fn lock_jobs(&self) -> MutexGuard<'_, HashMap<String, SimJob>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_order(&self) -> MutexGuard<'_, Vec<String>> {
        self.order.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteJobGateway for SimulatedGateway {
    async fn submit_job(&self, request: &ReportRequest) -> Result<String, GatewayError> {
        self.check_outage()?;
        simulated_latency().await;

        let (running_after, finished_after, outcome) = {
            let mut rng = rand::thread_rng();
            let running_after = Duration::from_millis(rng.gen_range(200..600));
            let finished_after = running_after + Duration::from_millis(rng.gen_range(800..2_500));
            let outcome = if rng.gen_ratio(1, 6) {
                JobStatus::Error
            } else {
                JobStatus::Done
            };
            (running_after, finished_after, outcome)
        };

        let job_id = mint_job_id();
        self.lock_jobs().insert(
            job_id.clone(),
            SimJob {
                template_ref: request.template_ref.clone(),
                submitted: Instant::now(),
                running_after,
                finished_after,
                outcome,
            },
        );
        self.lock_order().push(job_id.clone());
        Ok(job_id)
    }

    async fn get_job(&self, job_id: &str) -> Result<JobSnapshot, GatewayError> {
        self.check_outage()?;
        simulated_latency().await;

        let jobs = self.lock_jobs();
        match jobs.get(job_id) {
            Some(job) => Ok(self.snapshot(job_id, job)),
            None => Err(GatewayError::NotFound),
        }
    }

    async fn list_recent_jobs(&self, limit: usize) -> Result<Vec<JobSnapshot>, GatewayError> {
        self.check_outage()?;
        simulated_latency().await;

        let order = self.lock_order();
        let jobs = self.lock_jobs();
        Ok(order
            .iter()
            .rev()
            .filter_map(|job_id| jobs.get(job_id).map(|job| self.snapshot(job_id, job)))
            .take(limit)
            .collect())
    }
}

fn mint_job_id() -> String {
    format!("job-{}", Uuid::new_v4().simple())
}

async fn simulated_latency() {
    let millis = {
        let mut rng = rand::thread_rng();
        rng.gen_range(10..40)
    };
    tokio::time::sleep(Duration::from_millis(millis)).await;
}
