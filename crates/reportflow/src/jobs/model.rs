use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Shown when neither a title nor a template ref survived to display time.
pub const UNTITLED_REPORT: &str = "Untitled report";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }

    /// Position in the queued -> running -> {done, error} order.
    /// Both terminal statuses share a rank; neither regresses into the other.
    pub fn rank(&self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Running => 1,
            JobStatus::Done | JobStatus::Error => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Local,
    Remote,
}

/// The local, possibly-optimistic, possibly-stale record of one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStub {
    pub job_id: String,
    pub status: JobStatus,
    pub template_ref: Option<String>,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Set the first time the job is observed in a terminal status, never rewritten.
    pub completed_at: Option<DateTime<Utc>>,
    pub origin: Origin,
    pub result: Option<Value>,
}

impl JobStub {
    /// Stub written at submission time, before the remote has confirmed anything.
    pub fn optimistic(
        job_id: &str,
        title: Option<String>,
        template_ref: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id: job_id.to_string(),
            status: JobStatus::Queued,
            template_ref,
            title,
            created_at,
            completed_at: None,
            origin: Origin::Local,
            result: None,
        }
    }

    /// Stub for a job first seen through the remote (another device started it).
    pub fn discovered(snapshot: &JobSnapshot, now: DateTime<Utc>) -> Self {
        Self {
            job_id: snapshot.job_id.clone(),
            status: snapshot.status,
            template_ref: snapshot.template_ref.clone(),
            title: None,
            created_at: now,
            completed_at: snapshot.status.is_terminal().then_some(now),
            origin: Origin::Remote,
            result: snapshot.result.clone(),
        }
    }

    /// Display title fallback chain: title, then template ref, then a placeholder.
    /// Never empty.
    pub fn display_title(&self) -> &str {
        match self.title.as_deref() {
            Some(t) if !t.trim().is_empty() => t,
            _ => match self.template_ref.as_deref() {
                Some(t) if !t.trim().is_empty() => t,
                _ => UNTITLED_REPORT,
            },
        }
    }
}

/// Authoritative point-in-time read from the remote job store.
/// Wins over a stub's status under the monotonicity guard; fields the remote
/// does not track (title, created_at) are preserved from the stub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: String,
    pub status: JobStatus,
    pub template_ref: Option<String>,
    pub result: Option<Value>,
}
