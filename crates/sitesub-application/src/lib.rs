// SPDX-License-Identifier: GPL-3.0-or-later
use reqwest::Client;
use sitesub_config::AppConfig;
use sitesub_infrastructure::repositories::HistoryRepository;
use std::sync::Arc;

pub mod attribute_filter;
pub mod collaborators;
pub mod discovery;
pub mod episode_stats;
pub mod history;
pub mod host_client;
pub mod notifications;
pub mod release_meta;
pub mod review;
pub mod rule_groups;
pub mod runner;
pub mod text_heuristics;

pub use collaborators::{CollaboratorError, Collaborators};
pub use discovery::{DiscoveryEngine, DiscoveryError, RunContext, RunSummary};
pub use history::{HistoryError, HistoryStore};
pub use host_client::HostClient;
pub use review::{ReviewError, ReviewService};
pub use runner::{DiscoveryRunner, RunError};

use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub history: Arc<HistoryStore>,
    pub runner: Arc<DiscoveryRunner>,
    pub review: Arc<ReviewService>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        collaborators: Collaborators,
        history: Arc<HistoryStore>,
    ) -> Self {
        let engine = DiscoveryEngine::new(
            config.discovery.clone(),
            collaborators.clone(),
            history.clone(),
        );
        let runner = Arc::new(DiscoveryRunner::new(engine, config.discovery.reset_history));
        let review = Arc::new(ReviewService::new(
            config.discovery.clone(),
            config.auth.api_token.clone(),
            collaborators,
            history.clone(),
        ));

        Self {
            config,
            history,
            runner,
            review,
        }
    }

    /// Wires the host integration and the configured notification channel
    /// around a history loaded from `repository`.
    pub async fn bootstrap(
        config: AppConfig,
        repository: Arc<dyn HistoryRepository>,
        client: Client,
    ) -> anyhow::Result<Self> {
        let history = Arc::new(HistoryStore::load(repository).await?);
        let host = Arc::new(HostClient::from_config(client, &config.host));
        let notifier = notifications::select_notifier(&config.notifications, host.clone());
        let collaborators = Collaborators::from_integration(host).with_notifier(notifier);
        Ok(Self::new(config, collaborators, history))
    }

    pub fn on_start(&self) {
        info!(
            target: "application",
            enabled = self.config.discovery.enabled,
            sources = self.config.discovery.sources.len(),
            pending_reset = self.config.discovery.reset_history,
            "application state initialized"
        );
    }
}
