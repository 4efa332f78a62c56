// SPDX-License-Identifier: GPL-3.0-or-later
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::fmt;

/// Execution context handed to a job for one attempt
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: String,
    pub execution_time: DateTime<Utc>,
    /// 1 for the first attempt, incremented on each retry
    pub attempt: u32,
}

impl JobContext {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            execution_time: Utc::now(),
            attempt: 1,
        }
    }

    /// Context for the next retry, stamped with the current time.
    pub fn retry(&self) -> Self {
        Self {
            job_id: self.job_id.clone(),
            execution_time: Utc::now(),
            attempt: self.attempt + 1,
        }
    }
}

/// Outcome of one job attempt
#[derive(Debug, PartialEq, Eq)]
pub enum JobResult {
    Success,
    /// The job chose not to run this tick, e.g. because a run is active
    Skipped { reason: String },
    Failure { error: String, retry: bool },
}

/// Core trait for all background jobs
#[async_trait::async_trait]
pub trait Job: Send + Sync {
    /// Unique identifier for this job type
    fn job_type(&self) -> &'static str;

    /// Human-readable job name
    fn name(&self) -> String;

    /// Execute one attempt with the given context
    async fn execute(&self, ctx: JobContext) -> Result<JobResult>;

    /// Whether failures may be retried before the next schedule tick
    fn is_retriable(&self) -> bool {
        true
    }

    /// Maximum number of retry attempts
    fn max_retries(&self) -> u32 {
        3
    }

    /// Backoff delay in seconds between retries
    fn retry_delay_seconds(&self) -> u64 {
        60
    }
}

impl fmt::Debug for dyn Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("type", &self.job_type())
            .field("name", &self.name())
            .finish()
    }
}
