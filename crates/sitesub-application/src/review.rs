// SPDX-License-Identifier: GPL-3.0-or-later
//! Operator decisions on pending records: confirm runs the deferred action,
//! ignore freezes the record.

use sitesub_config::DiscoveryConfig;
use sitesub_domain::{DiscoveryAction, HistoryKey, HistoryRecord, HistoryStatus, ParsedMeta};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::collaborators::{CollaboratorError, Collaborators};
use crate::discovery::{download_request, subscribe_request};
use crate::history::{HistoryError, HistoryStore};
use crate::text_heuristics::extract_season;

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("invalid api key")]
    Unauthorized,
    #[error("no pending record for key {0}")]
    NotFound(HistoryKey),
    #[error("action failed: {0}")]
    Collaborator(#[from] CollaboratorError),
    #[error(transparent)]
    History(HistoryError),
}

impl From<HistoryError> for ReviewError {
    fn from(err: HistoryError) -> Self {
        match err {
            HistoryError::NotFound(key) | HistoryError::NotPending { key, .. } => {
                Self::NotFound(key)
            }
            other => Self::History(other),
        }
    }
}

pub struct ReviewService {
    config: DiscoveryConfig,
    api_token: String,
    collaborators: Collaborators,
    history: Arc<HistoryStore>,
}

impl ReviewService {
    pub fn new(
        config: DiscoveryConfig,
        api_token: impl Into<String>,
        collaborators: Collaborators,
        history: Arc<HistoryStore>,
    ) -> Self {
        Self {
            config,
            api_token: api_token.into(),
            collaborators,
            history,
        }
    }

    /// An empty configured token rejects every credential.
    pub fn authorize(&self, credential: &str) -> Result<(), ReviewError> {
        if self.api_token.is_empty() {
            return Err(ReviewError::Unauthorized);
        }
        if bool::from(credential.as_bytes().ct_eq(self.api_token.as_bytes())) {
            Ok(())
        } else {
            Err(ReviewError::Unauthorized)
        }
    }

    pub async fn pending(&self, credential: &str) -> Result<Vec<HistoryRecord>, ReviewError> {
        self.authorize(credential)?;
        Ok(self.history.pending().await)
    }

    /// Runs the record's deferred action and marks it confirmed. Any failure
    /// leaves the record pending. A history reset waits for the decision.
    pub async fn confirm(
        &self,
        key: &HistoryKey,
        credential: &str,
    ) -> Result<HistoryRecord, ReviewError> {
        self.authorize(credential)?;
        let _decision = self.history.lock_decisions().await;

        let record = self.pending_record(key).await?;
        let meta = rebuild_meta(&record);
        let log_title = record.log_title();
        info!(target: "review", %key, title = %log_title, action = %record.action, "confirming pending record");

        let outcome = match record.action {
            DiscoveryAction::Download => {
                let request = download_request(&self.config, &meta, &record.media, &record.torrent);
                self.collaborators.downloads.download(&request).await
            }
            DiscoveryAction::ManualSubscribe | DiscoveryAction::AutoSubscribe => {
                self.subscribe_unless_present(&record, &meta).await
            }
        };

        if let Err(err) = outcome {
            error!(target: "review", %key, title = %log_title, error = %err, "confirm action failed, record stays pending");
            return Err(err.into());
        }

        let confirmed = self
            .history
            .transition(key, HistoryStatus::Confirmed)
            .await?;
        info!(target: "review", %key, title = %log_title, "record confirmed");
        Ok(confirmed)
    }

    pub async fn ignore(
        &self,
        key: &HistoryKey,
        credential: &str,
    ) -> Result<HistoryRecord, ReviewError> {
        self.authorize(credential)?;
        let _decision = self.history.lock_decisions().await;

        let record = self.pending_record(key).await?;
        let ignored = self.history.transition(key, HistoryStatus::Ignored).await?;
        info!(target: "review", %key, title = %record.log_title(), "record ignored");
        Ok(ignored)
    }

    async fn pending_record(&self, key: &HistoryKey) -> Result<HistoryRecord, ReviewError> {
        match self.history.get(key).await {
            Some(record) if record.status == HistoryStatus::Pending => Ok(record),
            _ => {
                warn!(target: "review", %key, "no pending record for key");
                Err(ReviewError::NotFound(key.clone()))
            }
        }
    }

    async fn subscribe_unless_present(
        &self,
        record: &HistoryRecord,
        meta: &ParsedMeta,
    ) -> Result<(), CollaboratorError> {
        let subscriptions = &self.collaborators.subscriptions;
        if subscriptions.exists(&record.media, meta).await? {
            info!(target: "review", key = %record.key, "already subscribed, nothing to add");
            return Ok(());
        }
        let request = subscribe_request(&self.config, meta, &record.media, &record.source_id);
        subscriptions.subscribe(&request).await
    }
}

/// Stored season wins; otherwise it is read back from the stored title.
fn rebuild_meta(record: &HistoryRecord) -> ParsedMeta {
    let mut meta = record.meta.to_parsed_meta();
    if meta.begin_season.is_none() {
        meta.begin_season = extract_season(&record.title);
    }
    meta
}
