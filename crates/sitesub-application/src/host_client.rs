// SPDX-License-Identifier: GPL-3.0-or-later
//! REST integration with the media host, implementing every collaborator role.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sitesub_config::HostConfig;
use sitesub_domain::{
    CandidateResource, LibraryPresence, MediaType, ParsedMeta, RecognizedMedia, SeasonEpisodes,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::collaborators::{
    CollaboratorError, DownloadRequest, DownloadService, LibraryLookup, MediaRecognizer,
    NotificationMessage, Notifier, RuleGroupEvaluator, SourceSearch, SubscribeRequest,
    SubscriptionService,
};

const API_KEY_HEADER: &str = "X-API-KEY";

pub struct HostClient {
    client: Client,
    base_url: String,
    api_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HostResource {
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    enclosure: Option<String>,
    #[serde(default)]
    page_url: Option<String>,
    #[serde(default)]
    seeders: Option<u32>,
    #[serde(default)]
    pubdate: Option<String>,
}

impl HostResource {
    fn into_candidate(self, source_id: &str) -> CandidateResource {
        CandidateResource {
            title: self.title,
            description: self.description.unwrap_or_default(),
            size_bytes: self.size.unwrap_or(0),
            source_id: source_id.to_string(),
            enclosure: self.enclosure,
            page_url: self.page_url,
            seeders: self.seeders,
            published_at: self.pubdate,
        }
    }
}

/// Season data arrives as a bare count, an episode list, or an object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HostSeason {
    Count(u32),
    Episodes(Vec<u32>),
    Detail {
        #[serde(default)]
        episode_count: Option<u32>,
        #[serde(default)]
        episodes: Vec<u32>,
    },
}

impl From<HostSeason> for SeasonEpisodes {
    fn from(season: HostSeason) -> Self {
        match season {
            HostSeason::Count(count) => SeasonEpisodes {
                episode_count: Some(count),
                episodes: Vec::new(),
            },
            HostSeason::Episodes(episodes) => SeasonEpisodes {
                episode_count: None,
                episodes,
            },
            HostSeason::Detail {
                episode_count,
                episodes,
            } => SeasonEpisodes {
                episode_count,
                episodes,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct HostMedia {
    title: String,
    #[serde(default)]
    year: Option<u32>,
    #[serde(rename = "type")]
    media_type: MediaType,
    tmdb_id: u64,
    #[serde(default)]
    poster_path: Option<String>,
    #[serde(default)]
    backdrop_path: Option<String>,
    #[serde(default)]
    overview: Option<String>,
    #[serde(default)]
    seasons: BTreeMap<String, HostSeason>,
}

impl From<HostMedia> for RecognizedMedia {
    fn from(media: HostMedia) -> Self {
        let seasons = media
            .seasons
            .into_iter()
            .filter_map(|(key, season)| season_number(&key).map(|n| (n, season.into())))
            .collect();
        RecognizedMedia {
            canonical_title: media.title,
            year: media.year,
            media_type: media.media_type,
            external_id: media.tmdb_id,
            poster_url: media.poster_path,
            backdrop_url: media.backdrop_path,
            overview: media.overview,
            seasons,
        }
    }
}

/// Accepts `1`, `01` and `S01` season keys.
fn season_number(key: &str) -> Option<u32> {
    let key = key.trim();
    let digits = key
        .strip_prefix('S')
        .or_else(|| key.strip_prefix('s'))
        .unwrap_or(key);
    digits.parse().ok()
}

#[derive(Debug, Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    media: Option<HostMedia>,
}

#[derive(Debug, Serialize)]
struct RuleFilterBody<'a> {
    rule_groups: &'a [String],
    torrents: &'a [CandidateResource],
    media: &'a RecognizedMedia,
}

#[derive(Debug, Deserialize)]
struct RuleFilterResponse {
    #[serde(default)]
    torrents: Vec<CandidateResource>,
}

#[derive(Debug, Serialize)]
struct MediaBody<'a> {
    media: &'a RecognizedMedia,
}

#[derive(Debug, Deserialize)]
struct LibraryResponse {
    exists: bool,
    #[serde(default)]
    seasons: BTreeMap<String, Vec<u32>>,
}

#[derive(Debug, Serialize)]
struct SubscriptionExistsBody<'a> {
    media: &'a RecognizedMedia,
    meta: &'a ParsedMeta,
}

#[derive(Debug, Deserialize)]
struct ExistsResponse {
    exists: bool,
}

#[derive(Debug, Deserialize)]
struct HostAck {
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

impl HostClient {
    pub fn new(client: Client, base_url: impl Into<String>, api_token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token,
        }
    }

    pub fn from_config(client: Client, config: &HostConfig) -> Self {
        Self::new(client, config.base_url.clone(), config.api_token.clone())
    }

    fn endpoint(&self, path: &str) -> Result<Url, CollaboratorError> {
        Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|err| CollaboratorError::Request(format!("invalid host url: {err}")))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.api_token.as_deref() {
            Some(token) => request.header(API_KEY_HEADER, token),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, CollaboratorError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| CollaboratorError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CollaboratorError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(CollaboratorError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| CollaboratorError::Deserialization(e.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, CollaboratorError> {
        let url = self.endpoint(path)?;
        self.send(self.client.get(url)).await
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, CollaboratorError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        self.send(self.client.post(url).json(body)).await
    }

    async fn post_ack<B>(&self, path: &str, body: &B) -> Result<(), CollaboratorError>
    where
        B: Serialize + ?Sized + Sync,
    {
        let ack: HostAck = self.post_json(path, body).await?;
        if ack.success {
            Ok(())
        } else {
            Err(CollaboratorError::Rejected(
                ack.message.unwrap_or_else(|| "no reason given".to_string()),
            ))
        }
    }
}

#[async_trait]
impl SourceSearch for HostClient {
    async fn search(&self, source_id: &str) -> Result<Vec<CandidateResource>, CollaboratorError> {
        let resources: Vec<HostResource> = self
            .get_json(&format!("/api/v1/sites/{source_id}/resources"))
            .await?;
        debug!(target: "host", source_id, count = resources.len(), "site resources fetched");
        Ok(resources
            .into_iter()
            .map(|r| r.into_candidate(source_id))
            .collect())
    }
}

#[async_trait]
impl MediaRecognizer for HostClient {
    async fn recognize(
        &self,
        meta: &ParsedMeta,
    ) -> Result<Option<RecognizedMedia>, CollaboratorError> {
        let recognized = self.post_json("/api/v1/media/recognize", meta).await;
        let response: RecognizeResponse = match recognized {
            Ok(response) => response,
            Err(CollaboratorError::HttpStatus { status: 404, .. }) => return Ok(None),
            Err(err) => return Err(err),
        };
        Ok(response.media.map(RecognizedMedia::from))
    }
}

#[async_trait]
impl RuleGroupEvaluator for HostClient {
    async fn evaluate(
        &self,
        groups: &[String],
        candidates: &[CandidateResource],
        media: &RecognizedMedia,
    ) -> Result<Vec<CandidateResource>, CollaboratorError> {
        let body = RuleFilterBody {
            rule_groups: groups,
            torrents: candidates,
            media,
        };
        let response: RuleFilterResponse = self.post_json("/api/v1/rules/filter", &body).await?;
        Ok(response.torrents)
    }
}

#[async_trait]
impl LibraryLookup for HostClient {
    async fn presence(
        &self,
        media: &RecognizedMedia,
    ) -> Result<Option<LibraryPresence>, CollaboratorError> {
        let response: LibraryResponse = self
            .post_json("/api/v1/library/exists", &MediaBody { media })
            .await?;
        if !response.exists {
            return Ok(None);
        }

        let seasons = response
            .seasons
            .into_iter()
            .filter_map(|(key, episodes)| {
                season_number(&key).map(|n| (n, episodes.into_iter().collect::<BTreeSet<u32>>()))
            })
            .collect();
        Ok(Some(LibraryPresence { seasons }))
    }
}

#[async_trait]
impl SubscriptionService for HostClient {
    async fn exists(
        &self,
        media: &RecognizedMedia,
        meta: &ParsedMeta,
    ) -> Result<bool, CollaboratorError> {
        let response: ExistsResponse = self
            .post_json(
                "/api/v1/subscribe/exists",
                &SubscriptionExistsBody { media, meta },
            )
            .await?;
        Ok(response.exists)
    }

    async fn subscribe(&self, request: &SubscribeRequest) -> Result<(), CollaboratorError> {
        self.post_ack("/api/v1/subscribe", request).await
    }
}

#[async_trait]
impl DownloadService for HostClient {
    async fn download(&self, request: &DownloadRequest) -> Result<(), CollaboratorError> {
        self.post_ack("/api/v1/download", request).await
    }
}

#[async_trait]
impl Notifier for HostClient {
    async fn notify(&self, message: &NotificationMessage) -> Result<(), CollaboratorError> {
        self.post_ack("/api/v1/message", message).await
    }
}
