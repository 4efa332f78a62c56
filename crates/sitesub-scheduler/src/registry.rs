// SPDX-License-Identifier: GPL-3.0-or-later
use crate::job::{Job, JobContext, JobResult};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::time::{interval_at, Duration, Instant};
use tokio_cron_scheduler::{Job as CronJob, JobScheduler, JobSchedulerError};
use tracing::{error, info, warn};

/// Job schedule configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    /// Every N seconds, first run one period after start
    Interval(u64),
    /// Run once immediately, then never again
    Once,
    /// Crontab expression, five fields (minute precision) or six (with seconds)
    Cron(String),
}

/// Prefixes a seconds field onto five-field crontab expressions.
pub fn normalize_cron(expr: &str) -> String {
    let expr = expr.trim();
    if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    }
}

struct RegisteredJob {
    job: Arc<dyn Job>,
    schedule: Schedule,
}

/// Job registry that manages and executes scheduled jobs
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<String, RegisteredJob>>>,
    max_concurrent: usize,
    cron: Mutex<Option<JobScheduler>>,
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry")
            .field("max_concurrent", &self.max_concurrent)
            .finish_non_exhaustive()
    }
}

impl JobRegistry {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            max_concurrent: max_concurrent.max(1),
            cron: Mutex::new(None),
        }
    }

    pub async fn register(
        &self,
        job_id: impl Into<String>,
        job: Arc<dyn Job>,
        schedule: Schedule,
    ) {
        let job_id = job_id.into();
        let registered = RegisteredJob { job, schedule };

        let mut jobs = self.jobs.write().await;
        info!(
            target: "registry",
            %job_id,
            job_type = registered.job.job_type(),
            schedule = ?registered.schedule,
            "registering job"
        );
        jobs.insert(job_id, registered);
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Spawns every registered job. Cron expressions are all validated
    /// before anything is spawned, so a bad one starts nothing.
    pub async fn start(self: Arc<Self>) -> Result<()> {
        info!(target: "registry", max_concurrent = self.max_concurrent, "starting job registry");

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let jobs = self.jobs.read().await;

        let mut cron_jobs = Vec::new();
        for (job_id, registered) in jobs.iter() {
            if let Schedule::Cron(expr) = &registered.schedule {
                let expr = normalize_cron(expr);
                let cron_job = Self::cron_job(&expr, job_id, &registered.job, &semaphore)
                    .with_context(|| {
                        format!("invalid cron expression '{expr}' for job {job_id}")
                    })?;
                cron_jobs.push((job_id.clone(), expr, cron_job));
            }
        }

        if !cron_jobs.is_empty() {
            let scheduler = JobScheduler::new().await?;
            for (job_id, expr, cron_job) in cron_jobs {
                scheduler.add(cron_job).await?;
                info!(target: "registry", %job_id, cron = %expr, "cron job scheduled");
            }
            scheduler.start().await?;
            *self.cron.lock().await = Some(scheduler);
        }

        for (job_id, registered) in jobs.iter() {
            match &registered.schedule {
                Schedule::Interval(seconds) => {
                    let job_id = job_id.clone();
                    let job = registered.job.clone();
                    let period = Duration::from_secs((*seconds).max(1));
                    let semaphore = semaphore.clone();

                    tokio::spawn(async move {
                        let mut ticker = interval_at(Instant::now() + period, period);
                        loop {
                            ticker.tick().await;
                            Self::spawn_permitted(semaphore.clone(), job_id.clone(), job.clone())
                                .await;
                        }
                    });
                }
                Schedule::Once => {
                    let job_id = job_id.clone();
                    let job = registered.job.clone();
                    let semaphore = semaphore.clone();

                    tokio::spawn(async move {
                        let permit = semaphore.acquire_owned().await;
                        if let Ok(_permit) = permit {
                            Self::execute_job(job_id, job).await;
                        }
                    });
                }
                Schedule::Cron(_) => {}
            }
        }

        info!(target: "registry", jobs = jobs.len(), "job registry started");
        Ok(())
    }

    fn cron_job(
        expr: &str,
        job_id: &str,
        job: &Arc<dyn Job>,
        semaphore: &Arc<Semaphore>,
    ) -> Result<CronJob, JobSchedulerError> {
        let job_id = job_id.to_string();
        let job = job.clone();
        let semaphore = semaphore.clone();

        CronJob::new_async(expr, move |_uuid, _scheduler| {
            let job_id = job_id.clone();
            let job = job.clone();
            let semaphore = semaphore.clone();
            Box::pin(async move {
                Self::spawn_permitted(semaphore, job_id, job).await;
            })
        })
    }

    async fn spawn_permitted(semaphore: Arc<Semaphore>, job_id: String, job: Arc<dyn Job>) {
        match semaphore.acquire_owned().await {
            Ok(permit) => {
                tokio::spawn(async move {
                    let _permit = permit;
                    Self::execute_job(job_id, job).await;
                });
            }
            Err(err) => warn!(target: "registry", %job_id, error = %err, "job semaphore closed"),
        }
    }

    /// Execute a single job with retry logic
    async fn execute_job(job_id: String, job: Arc<dyn Job>) {
        let mut ctx = JobContext::new(&job_id);
        let max_attempts = if job.is_retriable() {
            job.max_retries() + 1
        } else {
            1
        };

        loop {
            let attempts = ctx.attempt;
            info!(
                target: "registry",
                job_id = %job_id,
                job_type = job.job_type(),
                attempt = attempts,
                max_attempts,
                "executing job"
            );

            let retry = match job.execute(ctx.clone()).await {
                Ok(JobResult::Success) => {
                    info!(
                        target: "registry",
                        job_id = %job_id,
                        job_type = job.job_type(),
                        attempts,
                        "job completed successfully"
                    );
                    false
                }
                Ok(JobResult::Skipped { reason }) => {
                    info!(
                        target: "registry",
                        job_id = %job_id,
                        job_type = job.job_type(),
                        %reason,
                        "job skipped"
                    );
                    false
                }
                Ok(JobResult::Failure { error, retry }) => {
                    error!(
                        target: "registry",
                        job_id = %job_id,
                        job_type = job.job_type(),
                        attempts,
                        %error,
                        retry,
                        "job failed"
                    );
                    retry
                }
                Err(err) => {
                    error!(
                        target: "registry",
                        job_id = %job_id,
                        job_type = job.job_type(),
                        attempts,
                        error = %err,
                        "job execution error"
                    );
                    job.is_retriable()
                }
            };

            if !retry {
                break;
            }
            if attempts >= max_attempts {
                error!(target: "registry", job_id = %job_id, "job exhausted all retry attempts");
                break;
            }

            let delay = Duration::from_secs(job.retry_delay_seconds());
            warn!(target: "registry", job_id = %job_id, ?delay, "retrying job after delay");
            tokio::time::sleep(delay).await;
            ctx = ctx.retry();
        }
    }
}
