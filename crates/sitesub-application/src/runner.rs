// SPDX-License-Identifier: GPL-3.0-or-later
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, warn};

use crate::discovery::{DiscoveryEngine, RunSummary};
use crate::history::HistoryStore;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunError {
    #[error("a discovery run is already in progress")]
    AlreadyRunning,
}

/// Durable name of the history reset flag.
pub const RESET_HISTORY_FLAG: &str = "reset_history";

/// Entry point for scheduled and on-demand runs; never lets two overlap.
pub struct DiscoveryRunner {
    engine: DiscoveryEngine,
    guard: Mutex<()>,
    reset_requested: bool,
    reset_checked: AtomicBool,
}

impl DiscoveryRunner {
    /// `reset_history` clears the store before the first run, once per
    /// setting of the flag rather than once per process.
    pub fn new(engine: DiscoveryEngine, reset_history: bool) -> Self {
        Self {
            engine,
            guard: Mutex::new(()),
            reset_requested: reset_history,
            reset_checked: AtomicBool::new(false),
        }
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        self.engine.history()
    }

    pub fn is_running(&self) -> bool {
        self.guard.try_lock().is_err()
    }

    pub async fn try_run(&self) -> Result<RunSummary, RunError> {
        let Ok(_running) = self.guard.try_lock() else {
            warn!(target: "discovery", "discovery run requested while another is in progress");
            return Err(RunError::AlreadyRunning);
        };

        let first_run = !self.reset_checked.swap(true, Ordering::SeqCst);
        let reset = first_run && self.claim_reset().await;
        Ok(self.engine.run(reset).await)
    }

    async fn claim_reset(&self) -> bool {
        match self
            .history()
            .claim_one_shot(RESET_HISTORY_FLAG, self.reset_requested)
            .await
        {
            Ok(claimed) => claimed,
            Err(err) => {
                error!(
                    target: "discovery",
                    error = %err,
                    "could not record history reset, skipping it"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::Collaborators;
    use crate::discovery::tests::{discovery_config, engine_with, show, FakeHost};
    use sitesub_domain::{DiscoveryAction, HistoryStatus};
    use sitesub_infrastructure::repositories::{HistoryRepository, InMemoryHistoryRepository};

    #[tokio::test]
    async fn overlapping_run_is_refused() {
        let host = Arc::new(FakeHost::default());
        let (engine, _) =
            engine_with(discovery_config(DiscoveryAction::ManualSubscribe), host).await;
        let runner = DiscoveryRunner::new(engine, false);

        let held = runner.guard.lock().await;
        assert!(runner.is_running());
        assert_eq!(runner.try_run().await.unwrap_err(), RunError::AlreadyRunning);
        drop(held);

        assert!(!runner.is_running());
        assert!(runner.try_run().await.is_ok());
    }

    #[tokio::test]
    async fn reset_flag_applies_to_first_run_only() {
        let host = Arc::new(FakeHost::default());
        host.knows("Show", show());
        host.list("1", &["Show.S01E01"]);
        let (engine, _) =
            engine_with(discovery_config(DiscoveryAction::ManualSubscribe), host).await;
        let history = engine.history().clone();
        let runner = DiscoveryRunner::new(engine, true);

        assert_eq!(runner.try_run().await.unwrap().queued, 1);
        history
            .transition(&"100_S01".into(), HistoryStatus::Ignored)
            .await
            .unwrap();

        let second = runner.try_run().await.unwrap();
        assert_eq!(second.frozen, 1);
        assert_eq!(
            history.get(&"100_S01".into()).await.unwrap().status,
            HistoryStatus::Ignored
        );
    }

    #[tokio::test]
    async fn reset_is_not_repeated_after_restart() {
        let host = Arc::new(FakeHost::default());
        host.knows("Show", show());
        host.list("1", &["Show.S01E01"]);
        let repo = Arc::new(InMemoryHistoryRepository::new());

        let start = |repo: Arc<InMemoryHistoryRepository>, host: Arc<FakeHost>| async move {
            let history = Arc::new(HistoryStore::load(repo).await.unwrap());
            let engine = DiscoveryEngine::new(
                discovery_config(DiscoveryAction::ManualSubscribe),
                Collaborators::from_integration(host),
                history,
            );
            DiscoveryRunner::new(engine, true)
        };

        let first = start(repo.clone(), host.clone()).await;
        assert_eq!(first.try_run().await.unwrap().queued, 1);
        first
            .history()
            .transition(&"100_S01".into(), HistoryStatus::Ignored)
            .await
            .unwrap();
        assert_eq!(host.notification_count(), 1);

        let restarted = start(repo.clone(), host.clone()).await;
        let summary = restarted.try_run().await.unwrap();
        assert_eq!(summary.queued, 0);
        assert_eq!(summary.frozen, 1);
        assert_eq!(
            restarted.history().get(&"100_S01".into()).await.unwrap().status,
            HistoryStatus::Ignored
        );
        assert_eq!(host.notification_count(), 1);
    }

    #[tokio::test]
    async fn unsetting_the_flag_rearms_the_reset() {
        let host = Arc::new(FakeHost::default());
        host.knows("Show", show());
        host.list("1", &["Show.S01E01"]);
        let repo = Arc::new(InMemoryHistoryRepository::new());
        repo.set_flag_consumed(RESET_HISTORY_FLAG, true).await.unwrap();

        let history = Arc::new(HistoryStore::load(repo.clone()).await.unwrap());
        let engine = DiscoveryEngine::new(
            discovery_config(DiscoveryAction::ManualSubscribe),
            Collaborators::from_integration(host),
            history,
        );
        DiscoveryRunner::new(engine, false).try_run().await.unwrap();

        assert!(!repo.flag_consumed(RESET_HISTORY_FLAG).await.unwrap());
    }
}
