// SPDX-License-Identifier: GPL-3.0-or-later
use crate::job::{Job, JobContext, JobResult};
use anyhow::Result;
use sitesub_application::{DiscoveryRunner, RunError};
use std::sync::Arc;
use tracing::info;

/// Periodic discovery pass over the configured sources.
///
/// Not retried: the next scheduled tick is the retry, and a tick that lands
/// while another run is active is skipped rather than queued.
pub struct DiscoveryJob {
    runner: Arc<DiscoveryRunner>,
}

impl DiscoveryJob {
    pub fn new(runner: Arc<DiscoveryRunner>) -> Arc<Self> {
        Arc::new(Self { runner })
    }
}

#[async_trait::async_trait]
impl Job for DiscoveryJob {
    fn job_type(&self) -> &'static str {
        "discovery"
    }

    fn name(&self) -> String {
        "Site Discovery".to_string()
    }

    async fn execute(&self, ctx: JobContext) -> Result<JobResult> {
        info!(
            target: "jobs",
            job_id = %ctx.job_id,
            at = %ctx.execution_time,
            attempt = ctx.attempt,
            "starting discovery job"
        );

        match self.runner.try_run().await {
            Ok(summary) => {
                info!(
                    target: "jobs",
                    job_id = %ctx.job_id,
                    sources = summary.sources,
                    sources_failed = summary.sources_failed,
                    candidates = summary.candidates,
                    queued = summary.queued,
                    failed = summary.failed,
                    "discovery job finished"
                );
                Ok(JobResult::Success)
            }
            Err(err @ RunError::AlreadyRunning) => Ok(JobResult::Skipped {
                reason: err.to_string(),
            }),
        }
    }

    fn is_retriable(&self) -> bool {
        false
    }
}
