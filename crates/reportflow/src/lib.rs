pub mod config;
pub mod gateway;
pub mod jobs;
pub mod session;
pub mod viewmodel;

pub use config::EngineConfig;
pub use gateway::{GatewayError, RemoteJobGateway, ReportRequest};
pub use jobs::{EngineEvent, JobSnapshot, JobStatus, JobStub, Origin, PassStats};
pub use session::ReportSession;
pub use viewmodel::ReportsViewModel;
