use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::jobs::model::JobSnapshot;

/// Submission payload. The engine only reads the display hints; everything
/// else rides through to the remote untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRequest {
    pub template_ref: String,
    pub title: Option<String>,
    #[serde(default)]
    pub parameters: Value,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The remote does not know this job id. Expected, not an error condition:
    /// it means the job was purged or never persisted server-side.
    #[error("job not found")]
    NotFound,
    /// Network / timeout / 5xx. Recoverable; never grounds for mutating or
    /// removing job data.
    #[error("transport failure: {0}")]
    Transport(String),
}

impl GatewayError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::NotFound)
    }
}

/// The remote job store. External collaborator: the engine consumes this
/// contract and implements none of it.
#[async_trait]
pub trait RemoteJobGateway: Send + Sync {
    async fn submit_job(&self, request: &ReportRequest) -> Result<String, GatewayError>;

    async fn get_job(&self, job_id: &str) -> Result<JobSnapshot, GatewayError>;

    /// Bounded listing of the user's most recent jobs across devices.
    /// Absence from this list is never proof a job no longer exists.
    async fn list_recent_jobs(&self, limit: usize) -> Result<Vec<JobSnapshot>, GatewayError>;
}
