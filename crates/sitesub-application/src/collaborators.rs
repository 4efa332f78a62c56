// SPDX-License-Identifier: GPL-3.0-or-later
//! Services the discovery engine drives but does not implement itself.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sitesub_domain::{CandidateResource, LibraryPresence, ParsedMeta, RecognizedMedia};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("collaborator responded with status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("deserialization failed: {0}")]
    Deserialization(String),
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Filters forwarded with a subscription so the host applies the same rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeFilters {
    pub quality: Option<String>,
    pub resolution: Option<String>,
    pub effect: Option<String>,
    pub rule_groups: Vec<String>,
    pub include: Option<String>,
    pub exclude: Option<String>,
    pub sites: Vec<String>,
    pub downloader: Option<String>,
    pub save_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub meta: ParsedMeta,
    pub media: RecognizedMedia,
    pub source_id: String,
    pub filters: SubscribeFilters,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub meta: ParsedMeta,
    pub media: RecognizedMedia,
    pub torrent: CandidateResource,
    pub downloader: Option<String>,
    pub save_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub title: String,
    pub text: String,
    pub image: Option<String>,
}

#[async_trait]
pub trait SourceSearch: Send + Sync {
    async fn search(&self, source_id: &str) -> Result<Vec<CandidateResource>, CollaboratorError>;
}

#[async_trait]
pub trait MediaRecognizer: Send + Sync {
    async fn recognize(
        &self,
        meta: &ParsedMeta,
    ) -> Result<Option<RecognizedMedia>, CollaboratorError>;
}

#[async_trait]
pub trait RuleGroupEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        groups: &[String],
        candidates: &[CandidateResource],
        media: &RecognizedMedia,
    ) -> Result<Vec<CandidateResource>, CollaboratorError>;
}

#[async_trait]
pub trait LibraryLookup: Send + Sync {
    /// `None` when the library holds nothing for this media.
    async fn presence(
        &self,
        media: &RecognizedMedia,
    ) -> Result<Option<LibraryPresence>, CollaboratorError>;
}

#[async_trait]
pub trait SubscriptionService: Send + Sync {
    async fn exists(
        &self,
        media: &RecognizedMedia,
        meta: &ParsedMeta,
    ) -> Result<bool, CollaboratorError>;
    async fn subscribe(&self, request: &SubscribeRequest) -> Result<(), CollaboratorError>;
}

#[async_trait]
pub trait DownloadService: Send + Sync {
    async fn download(&self, request: &DownloadRequest) -> Result<(), CollaboratorError>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &NotificationMessage) -> Result<(), CollaboratorError>;
}

/// One handle per collaborator role, shared by the engine and the review service.
#[derive(Clone)]
pub struct Collaborators {
    pub sources: Arc<dyn SourceSearch>,
    pub recognizer: Arc<dyn MediaRecognizer>,
    pub rule_groups: Arc<dyn RuleGroupEvaluator>,
    pub library: Arc<dyn LibraryLookup>,
    pub subscriptions: Arc<dyn SubscriptionService>,
    pub downloads: Arc<dyn DownloadService>,
    pub notifier: Arc<dyn Notifier>,
}

impl Collaborators {
    /// Every role served by a single integration.
    pub fn from_integration<T>(integration: Arc<T>) -> Self
    where
        T: SourceSearch
            + MediaRecognizer
            + RuleGroupEvaluator
            + LibraryLookup
            + SubscriptionService
            + DownloadService
            + Notifier
            + 'static,
    {
        Self {
            sources: integration.clone(),
            recognizer: integration.clone(),
            rule_groups: integration.clone(),
            library: integration.clone(),
            subscriptions: integration.clone(),
            downloads: integration.clone(),
            notifier: integration,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }
}
