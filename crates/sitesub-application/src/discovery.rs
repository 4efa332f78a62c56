// SPDX-License-Identifier: GPL-3.0-or-later
use chrono::{DateTime, Utc};
use serde::Serialize;
use sitesub_config::{DiscoveryConfig, SizeRange};
use sitesub_domain::{
    CandidateResource, DiscoveryAction, EpisodeStats, HistoryKey, HistoryRecord, HistoryStatus,
    LibraryPresence, MediaType, ParsedMeta, RecognizedMedia,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::attribute_filter::ActiveFilters;
use crate::collaborators::{
    CollaboratorError, Collaborators, DownloadRequest, NotificationMessage, SubscribeFilters,
    SubscribeRequest,
};
use crate::episode_stats;
use crate::history::{HistoryError, HistoryStore};
use crate::release_meta::parse_meta;
use crate::rule_groups::RuleGroupFilter;

const PENDING_TITLE: &str = "New pending subscription";

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("{stage} failed: {source}")]
    Collaborator {
        stage: &'static str,
        #[source]
        source: CollaboratorError,
    },
    #[error(transparent)]
    History(#[from] HistoryError),
}

fn stage(stage: &'static str) -> impl FnOnce(CollaboratorError) -> DiscoveryError {
    move |source| DiscoveryError::Collaborator { stage, source }
}

/// Identity of one run, threaded through per-source and per-candidate work.
#[derive(Debug, Clone, Copy)]
pub struct RunContext {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a single candidate ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateOutcome {
    Filtered,
    NoName,
    Unrecognized,
    RuleRejected,
    StatsUpdated,
    Unchanged,
    Frozen(HistoryStatus),
    SizeRejected,
    InLibrary,
    AlreadySubscribed,
    Subscribed,
    Downloaded,
    Queued,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: Option<Uuid>,
    pub sources: usize,
    pub sources_failed: usize,
    pub candidates: usize,
    pub filtered: usize,
    pub unrecognized: usize,
    pub stats_updated: usize,
    pub unchanged: usize,
    pub frozen: usize,
    pub skipped_existing: usize,
    pub subscribed: usize,
    pub downloaded: usize,
    pub queued: usize,
    pub failed: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: CandidateOutcome) {
        match outcome {
            CandidateOutcome::Filtered
            | CandidateOutcome::RuleRejected
            | CandidateOutcome::SizeRejected => self.filtered += 1,
            CandidateOutcome::NoName | CandidateOutcome::Unrecognized => self.unrecognized += 1,
            CandidateOutcome::StatsUpdated => self.stats_updated += 1,
            CandidateOutcome::Unchanged => self.unchanged += 1,
            CandidateOutcome::Frozen(_) => self.frozen += 1,
            CandidateOutcome::InLibrary | CandidateOutcome::AlreadySubscribed => {
                self.skipped_existing += 1
            }
            CandidateOutcome::Subscribed => self.subscribed += 1,
            CandidateOutcome::Downloaded => self.downloaded += 1,
            CandidateOutcome::Queued => self.queued += 1,
        }
    }
}

/// Filters resolved once at the start of a run.
struct RunPlan {
    filters: ActiveFilters,
    size_range: Option<SizeRange>,
    rule_groups: RuleGroupFilter,
}

pub struct DiscoveryEngine {
    config: DiscoveryConfig,
    collaborators: Collaborators,
    history: Arc<HistoryStore>,
}

impl DiscoveryEngine {
    pub fn new(
        config: DiscoveryConfig,
        collaborators: Collaborators,
        history: Arc<HistoryStore>,
    ) -> Self {
        Self {
            config,
            collaborators,
            history,
        }
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// One full pass over every configured source. Failures stay scoped to
    /// the source or candidate that raised them.
    pub async fn run(&self, reset_history: bool) -> RunSummary {
        let ctx = RunContext::new();
        let mut summary = RunSummary {
            run_id: Some(ctx.run_id),
            ..Default::default()
        };
        info!(
            target: "discovery",
            run_id = %ctx.run_id,
            sources = self.config.sources.len(),
            action = %self.config.action,
            "discovery run started"
        );

        if reset_history {
            match self.history.clear().await {
                Ok(()) => info!(target: "discovery", run_id = %ctx.run_id, "history reset before run"),
                Err(err) => error!(target: "discovery", run_id = %ctx.run_id, error = %err, "history reset failed"),
            }
        }

        let plan = self.plan(&ctx);

        for source_id in &self.config.sources {
            summary.sources += 1;
            let span = info_span!("source", run_id = %ctx.run_id, source_id = %source_id);
            self.process_source(&ctx, &plan, source_id, &mut summary)
                .instrument(span)
                .await;
        }

        if let Err(err) = self.history.persist().await {
            error!(target: "discovery", run_id = %ctx.run_id, error = %err, "failed to persist history after run");
        }

        info!(
            target: "discovery",
            run_id = %ctx.run_id,
            elapsed_ms = (Utc::now() - ctx.started_at).num_milliseconds(),
            candidates = summary.candidates,
            queued = summary.queued,
            subscribed = summary.subscribed,
            downloaded = summary.downloaded,
            failed = summary.failed,
            "discovery run finished"
        );
        summary
    }

    fn plan(&self, ctx: &RunContext) -> RunPlan {
        let (filters, errors) = ActiveFilters::from_config(&self.config);
        for err in errors {
            warn!(target: "discovery", run_id = %ctx.run_id, error = %err, "filter disabled for this run");
        }

        let size_range = self.config.size_filter().unwrap_or_else(|err| {
            warn!(target: "discovery", run_id = %ctx.run_id, error = %err, "size filter disabled for this run");
            None
        });

        RunPlan {
            filters,
            size_range,
            rule_groups: RuleGroupFilter::new(self.config.rule_groups.clone()),
        }
    }

    async fn process_source(
        &self,
        ctx: &RunContext,
        plan: &RunPlan,
        source_id: &str,
        summary: &mut RunSummary,
    ) {
        let candidates = match self.collaborators.sources.search(source_id).await {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!(target: "discovery", run_id = %ctx.run_id, source_id, error = %err, "source fetch failed, skipping");
                summary.sources_failed += 1;
                return;
            }
        };

        if candidates.is_empty() {
            info!(target: "discovery", run_id = %ctx.run_id, source_id, "source returned no resources");
            return;
        }

        for candidate in candidates {
            summary.candidates += 1;
            let title = candidate.title.clone();
            match self.process_candidate(ctx, plan, candidate).await {
                Ok(outcome) => summary.record(outcome),
                Err(err) => {
                    error!(target: "discovery", run_id = %ctx.run_id, source_id, %title, error = %err, "failed to process resource");
                    summary.failed += 1;
                }
            }
        }
    }

    async fn process_candidate(
        &self,
        ctx: &RunContext,
        plan: &RunPlan,
        candidate: CandidateResource,
    ) -> Result<CandidateOutcome, DiscoveryError> {
        if let Some(reason) = plan.filters.rejection(&candidate) {
            info!(target: "discovery", run_id = %ctx.run_id, title = %candidate.title, %reason, "rejected by attribute filter");
            return Ok(CandidateOutcome::Filtered);
        }

        let meta = parse_meta(&candidate.title, &candidate.description);
        if meta.name.is_none() {
            warn!(target: "discovery", run_id = %ctx.run_id, title = %candidate.title, "no media name found in title");
            return Ok(CandidateOutcome::NoName);
        }

        let Some(media) = self
            .collaborators
            .recognizer
            .recognize(&meta)
            .await
            .map_err(stage("recognize"))?
        else {
            info!(target: "discovery", run_id = %ctx.run_id, title = %candidate.title, "media not recognized");
            return Ok(CandidateOutcome::Unrecognized);
        };

        let Some(candidate) = plan
            .rule_groups
            .select(self.collaborators.rule_groups.as_ref(), candidate, &media)
            .await
            .map_err(stage("rule groups"))?
        else {
            info!(target: "discovery", run_id = %ctx.run_id, media = %media.title_year(), "rejected by rule groups");
            return Ok(CandidateOutcome::RuleRejected);
        };

        let key = HistoryKey::for_media(&media, meta.begin_season);
        let log_title = media.log_title(meta.begin_season);

        if let Some(existing) = self.history.get(&key).await {
            return self
                .refresh_existing(ctx, existing, &meta, &media, &candidate)
                .await;
        }

        if let Some(range) = plan.size_range {
            if candidate.size_bytes > 0 && !range.admits(candidate.size_bytes) {
                info!(target: "discovery", run_id = %ctx.run_id, title = %candidate.title, size_bytes = candidate.size_bytes, "size outside configured range");
                return Ok(CandidateOutcome::SizeRejected);
            }
        }

        let presence = self
            .collaborators
            .library
            .presence(&media)
            .await
            .map_err(stage("library lookup"))?;
        if library_holds(presence.as_ref(), &media, &meta) {
            info!(target: "discovery", run_id = %ctx.run_id, title = %log_title, "already in library");
            return Ok(CandidateOutcome::InLibrary);
        }

        if self
            .collaborators
            .subscriptions
            .exists(&media, &meta)
            .await
            .map_err(stage("subscription lookup"))?
        {
            info!(target: "discovery", run_id = %ctx.run_id, title = %log_title, "already subscribed");
            return Ok(CandidateOutcome::AlreadySubscribed);
        }

        match self.config.action {
            DiscoveryAction::AutoSubscribe => {
                let request = subscribe_request(&self.config, &meta, &media, &candidate.source_id);
                self.collaborators
                    .subscriptions
                    .subscribe(&request)
                    .await
                    .map_err(stage("subscribe"))?;
                info!(target: "discovery", run_id = %ctx.run_id, title = %log_title, "subscribed");
                Ok(CandidateOutcome::Subscribed)
            }
            DiscoveryAction::Download => {
                let request = download_request(&self.config, &meta, &media, &candidate);
                self.collaborators
                    .downloads
                    .download(&request)
                    .await
                    .map_err(stage("download"))?;
                info!(target: "discovery", run_id = %ctx.run_id, title = %log_title, "download started");
                Ok(CandidateOutcome::Downloaded)
            }
            DiscoveryAction::ManualSubscribe => {
                self.queue_pending(ctx, key, &meta, &media, &candidate).await
            }
        }
    }

    async fn refresh_existing(
        &self,
        ctx: &RunContext,
        existing: HistoryRecord,
        meta: &ParsedMeta,
        media: &RecognizedMedia,
        candidate: &CandidateResource,
    ) -> Result<CandidateOutcome, DiscoveryError> {
        if existing.status != HistoryStatus::Pending {
            info!(target: "discovery", run_id = %ctx.run_id, key = %existing.key, status = %existing.status, "already handled, skipping");
            return Ok(CandidateOutcome::Frozen(existing.status));
        }

        let stats = episode_stats::compute(meta, media, candidate, existing.stats());
        match self.history.update_stats(&existing.key, stats).await {
            Ok(true) => {
                info!(
                    target: "discovery",
                    run_id = %ctx.run_id,
                    key = %existing.key,
                    total = ?stats.total,
                    latest = ?stats.latest,
                    "pending record stats updated"
                );
                Ok(CandidateOutcome::StatsUpdated)
            }
            Ok(false) => Ok(CandidateOutcome::Unchanged),
            Err(HistoryError::NotPending { status, .. }) => Ok(CandidateOutcome::Frozen(status)),
            Err(err) => Err(err.into()),
        }
    }

    async fn queue_pending(
        &self,
        ctx: &RunContext,
        key: HistoryKey,
        meta: &ParsedMeta,
        media: &RecognizedMedia,
        candidate: &CandidateResource,
    ) -> Result<CandidateOutcome, DiscoveryError> {
        let stats = episode_stats::compute(meta, media, candidate, EpisodeStats::default());
        let record = HistoryRecord::pending(
            key,
            self.config.action,
            meta,
            media,
            candidate,
            stats,
        );
        let log_title = record.log_title();

        if !self.history.upsert_pending(record).await? {
            return Ok(CandidateOutcome::Unchanged);
        }
        info!(target: "discovery", run_id = %ctx.run_id, title = %log_title, "added to pending list");

        if self.config.notify {
            let message = NotificationMessage {
                title: PENDING_TITLE.to_string(),
                text: format!("{log_title} was added to the pending list and awaits review."),
                image: media.backdrop_url.clone().or_else(|| media.poster_url.clone()),
            };
            if let Err(err) = self.collaborators.notifier.notify(&message).await {
                warn!(target: "discovery", run_id = %ctx.run_id, title = %log_title, error = %err, "pending notification failed");
            }
        }
        Ok(CandidateOutcome::Queued)
    }
}

/// Movies count as held when present at all. A series season counts as held
/// only when every inferred episode is already in the library.
pub fn library_holds(
    presence: Option<&LibraryPresence>,
    media: &RecognizedMedia,
    meta: &ParsedMeta,
) -> bool {
    let Some(presence) = presence else {
        return false;
    };
    match media.media_type {
        MediaType::Movie => true,
        MediaType::Series => {
            let season = meta.begin_season.unwrap_or(1);
            match presence.seasons.get(&season) {
                Some(held) if !held.is_empty() && !meta.episodes.is_empty() => {
                    meta.episodes.iter().all(|episode| held.contains(episode))
                }
                _ => false,
            }
        }
    }
}

pub fn subscribe_request(
    config: &DiscoveryConfig,
    meta: &ParsedMeta,
    media: &RecognizedMedia,
    source_id: &str,
) -> SubscribeRequest {
    let owned = |value: Option<&str>| value.map(str::to_string);
    SubscribeRequest {
        meta: meta.clone(),
        media: media.clone(),
        source_id: source_id.to_string(),
        filters: SubscribeFilters {
            quality: owned(config.quality_tag()),
            resolution: owned(config.resolution_tag()),
            effect: owned(config.effect_tag()),
            rule_groups: config.rule_groups.clone(),
            include: owned(config.include_pattern()),
            exclude: owned(config.exclude_pattern()),
            sites: vec![source_id.to_string()],
            downloader: owned(config.downloader()),
            save_path: owned(config.save_path()),
        },
    }
}

pub fn download_request(
    config: &DiscoveryConfig,
    meta: &ParsedMeta,
    media: &RecognizedMedia,
    torrent: &CandidateResource,
) -> DownloadRequest {
    DownloadRequest {
        meta: meta.clone(),
        media: media.clone(),
        torrent: torrent.clone(),
        downloader: config.downloader().map(str::to_string),
        save_path: config.save_path().map(str::to_string),
    }
}
