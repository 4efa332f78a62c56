// SPDX-License-Identifier: GPL-3.0-or-later
pub mod job;
pub mod jobs;
pub mod registry;

use anyhow::Result;
use registry::JobRegistry;
use sitesub_application::DiscoveryRunner;
use sitesub_config::DiscoveryConfig;
use std::sync::Arc;
use tracing::{error, info};

use jobs::DiscoveryJob;

/// Durable name of the run-once flag.
pub const RUN_ONCE_FLAG: &str = "run_once";

pub struct Scheduler {
    discovery: DiscoveryConfig,
    runner: Arc<DiscoveryRunner>,
    registry: Arc<JobRegistry>,
}

impl Scheduler {
    pub fn new(
        discovery: DiscoveryConfig,
        max_concurrent_jobs: usize,
        runner: Arc<DiscoveryRunner>,
    ) -> Self {
        let registry = Arc::new(JobRegistry::new(max_concurrent_jobs));
        Self {
            discovery,
            runner,
            registry,
        }
    }

    /// Periodic schedule for discovery, if it is enabled at all.
    pub fn discovery_schedule(config: &DiscoveryConfig) -> Option<Schedule> {
        if !config.enabled {
            return None;
        }
        Some(match config.cron_expression() {
            Some(expr) => Schedule::Cron(expr.to_string()),
            None => Schedule::Interval(config.interval_minutes.max(1) * 60),
        })
    }

    pub async fn register_jobs(&self) {
        info!(target: "scheduler", "registering background jobs");

        if let Some(schedule) = Self::discovery_schedule(&self.discovery) {
            self.registry
                .register("discovery", DiscoveryJob::new(self.runner.clone()), schedule)
                .await;
        } else {
            info!(target: "scheduler", "periodic discovery disabled");
        }

        if self.claim_run_once().await {
            self.registry
                .register(
                    "discovery-once",
                    DiscoveryJob::new(self.runner.clone()),
                    Schedule::Once,
                )
                .await;
        }

        info!(target: "scheduler", jobs = self.registry.len().await, "all jobs registered");
    }

    /// `run_once` fires once per setting of the flag, not once per start.
    async fn claim_run_once(&self) -> bool {
        match self
            .runner
            .history()
            .claim_one_shot(RUN_ONCE_FLAG, self.discovery.run_once)
            .await
        {
            Ok(claimed) => claimed,
            Err(err) => {
                error!(target: "scheduler", error = %err, "could not record run_once, skipping it");
                false
            }
        }
    }

    /// Start every registered job. The returned registry owns the cron
    /// scheduler and must be kept alive for as long as jobs should fire.
    pub async fn start(self) -> Result<Arc<JobRegistry>> {
        if let Err(err) = self.registry.clone().start().await {
            error!(target: "scheduler", error = %err, "scheduler failed to start");
            return Err(err);
        }
        Ok(self.registry)
    }
}

pub use job::{Job, JobContext, JobResult};
pub use registry::Schedule;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::tests::runner;

    #[test]
    fn disabled_discovery_has_no_schedule() {
        let config = DiscoveryConfig {
            enabled: false,
            ..Default::default()
        };
        assert_eq!(Scheduler::discovery_schedule(&config), None);
    }

    #[test]
    fn cron_wins_over_interval() {
        let config = DiscoveryConfig {
            enabled: true,
            cron: Some("0 */2 * * *".to_string()),
            ..Default::default()
        };
        assert_eq!(
            Scheduler::discovery_schedule(&config),
            Some(Schedule::Cron("0 */2 * * *".to_string()))
        );
    }

    #[test]
    fn blank_cron_falls_back_to_interval() {
        let config = DiscoveryConfig {
            enabled: true,
            cron: Some("  ".to_string()),
            interval_minutes: 45,
            ..Default::default()
        };
        assert_eq!(
            Scheduler::discovery_schedule(&config),
            Some(Schedule::Interval(45 * 60))
        );
    }

    #[tokio::test]
    async fn invalid_cron_is_reported_by_start() {
        let config = DiscoveryConfig {
            enabled: true,
            cron: Some("every thirty minutes".to_string()),
            run_once: true,
            ..Default::default()
        };
        let scheduler = Scheduler::new(config, 1, runner().await);
        scheduler.register_jobs().await;

        let err = scheduler.start().await.unwrap_err();
        assert!(err.to_string().contains("every thirty minutes"));
    }

    #[tokio::test]
    async fn run_once_is_registered_once_per_flag_setting() {
        let runner = runner().await;
        let config = DiscoveryConfig {
            enabled: false,
            run_once: true,
            ..Default::default()
        };

        let first = Scheduler::new(config.clone(), 1, runner.clone());
        first.register_jobs().await;
        assert_eq!(first.registry.len().await, 1);

        let restarted = Scheduler::new(config, 1, runner);
        restarted.register_jobs().await;
        assert!(restarted.registry.is_empty().await);
    }
}
