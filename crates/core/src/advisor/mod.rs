pub mod error;
pub mod frames;
pub mod http;
pub mod job;
pub mod payload;

use crate::advisor::error::AdvisorError;
use crate::domain::preference::PreferenceInput;
use crate::domain::recommendation::RecommendationResult;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Opaque identifier of one submitted recommendation job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobHandle {
    job_id: String,
}

impl JobHandle {
    pub fn new(job_id: impl Into<String>) -> Result<Self, AdvisorError> {
        let job_id = job_id.into();
        if job_id.trim().is_empty() {
            return Err(AdvisorError::submission("decode", "job identifier is empty"));
        }
        Ok(Self { job_id })
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.job_id)
    }
}

/// How far a still-running job has got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The status body carried no payload frame yet.
    Queued,
    /// A payload arrived but its status is not `success`.
    Generating,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Processing(Progress),
    Completed(RecommendationResult),
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Transport for the two-phase recommendation protocol.
#[async_trait::async_trait]
pub trait RecommendationService: Send + Sync {
    fn service_name(&self) -> &'static str;

    async fn submit(&self, input: &PreferenceInput) -> Result<JobHandle, AdvisorError>;

    async fn poll(&self, handle: &JobHandle) -> Result<JobStatus, AdvisorError>;
}
