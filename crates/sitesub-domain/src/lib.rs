// SPDX-License-Identifier: GPL-3.0-or-later
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// Value Objects & Keys
// ============================================================================

/// Dedup key for the discovery history.
///
/// Movies are keyed by external id alone; series are keyed by external id and
/// season (`<id>_S<nn>`), with season 0 standing in for "unknown".
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryKey(pub String);

impl HistoryKey {
    pub fn for_media(media: &RecognizedMedia, season: Option<u32>) -> Self {
        match media.media_type {
            MediaType::Movie => Self(media.external_id.to_string()),
            MediaType::Series => Self(format!(
                "{}_S{:02}",
                media.external_id,
                season.unwrap_or(0)
            )),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for HistoryKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for HistoryKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for HistoryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    #[serde(alias = "tv")]
    Series,
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Movie => write!(f, "movie"),
            Self::Series => write!(f, "series"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryStatus {
    Pending,
    Confirmed,
    Ignored,
}

impl HistoryStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for HistoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Confirmed => write!(f, "confirmed"),
            Self::Ignored => write!(f, "ignored"),
        }
    }
}

/// Terminal action taken for a newly discovered resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryAction {
    #[default]
    #[serde(alias = "manual")]
    ManualSubscribe,
    #[serde(alias = "auto-subscribe")]
    AutoSubscribe,
    Download,
}

impl DiscoveryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ManualSubscribe => "manual_subscribe",
            Self::AutoSubscribe => "auto_subscribe",
            Self::Download => "download",
        }
    }
}

impl std::fmt::Display for DiscoveryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Entities
// ============================================================================

/// One listing item returned by a source, before recognition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateResource {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub size_bytes: u64,
    pub source_id: String,
    #[serde(default)]
    pub enclosure: Option<String>,
    #[serde(default)]
    pub page_url: Option<String>,
    #[serde(default)]
    pub seeders: Option<u32>,
    #[serde(default)]
    pub published_at: Option<String>,
}

impl CandidateResource {
    pub fn new(source_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            size_bytes: 0,
            source_id: source_id.into(),
            enclosure: None,
            page_url: None,
            seeders: None,
            published_at: None,
        }
    }

    /// Title and description joined, the text the heuristics scan.
    pub fn text(&self) -> String {
        if self.description.trim().is_empty() {
            self.title.clone()
        } else {
            format!("{} {}", self.title, self.description)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonEpisodes {
    #[serde(default)]
    pub episode_count: Option<u32>,
    #[serde(default)]
    pub episodes: Vec<u32>,
}

impl SeasonEpisodes {
    pub fn count(&self) -> Option<u32> {
        match self.episode_count {
            Some(count) if count > 0 => Some(count),
            _ if !self.episodes.is_empty() => Some(self.episodes.len() as u32),
            _ => None,
        }
    }
}

/// Canonical media identity resolved by the host's recognizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognizedMedia {
    pub canonical_title: String,
    pub year: Option<u32>,
    pub media_type: MediaType,
    pub external_id: u64,
    #[serde(default)]
    pub poster_url: Option<String>,
    #[serde(default)]
    pub backdrop_url: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub seasons: BTreeMap<u32, SeasonEpisodes>,
}

impl RecognizedMedia {
    pub fn new(
        canonical_title: impl Into<String>,
        media_type: MediaType,
        external_id: u64,
    ) -> Self {
        Self {
            canonical_title: canonical_title.into(),
            year: None,
            media_type,
            external_id,
            poster_url: None,
            backdrop_url: None,
            overview: None,
            seasons: BTreeMap::new(),
        }
    }

    /// Episode count the recognizer reports for one season, if any.
    pub fn season_episode_count(&self, season: u32) -> Option<u32> {
        self.seasons.get(&season).and_then(SeasonEpisodes::count)
    }

    pub fn title_year(&self) -> String {
        match self.year {
            Some(year) => format!("{} ({})", self.canonical_title, year),
            None => self.canonical_title.clone(),
        }
    }

    /// Human readable label used in logs and notifications.
    pub fn log_title(&self, season: Option<u32>) -> String {
        match (self.media_type, season) {
            (MediaType::Series, Some(season)) => format!("{} S{:02}", self.title_year(), season),
            _ => self.title_year(),
        }
    }
}

/// Metadata inferred from a candidate's free text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedMeta {
    pub name: Option<String>,
    pub year: Option<u32>,
    pub media_type: Option<MediaType>,
    pub begin_season: Option<u32>,
    #[serde(default)]
    pub episodes: Vec<u32>,
}

impl ParsedMeta {
    pub fn snapshot(&self, media: &RecognizedMedia) -> MetaSnapshot {
        MetaSnapshot {
            name: self.name.clone(),
            year: self.year,
            media_type: Some(media.media_type).or(self.media_type),
            season: self.begin_season,
        }
    }
}

/// Serializable subset of [`ParsedMeta`] kept in history records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaSnapshot {
    pub name: Option<String>,
    pub year: Option<u32>,
    pub media_type: Option<MediaType>,
    pub season: Option<u32>,
}

impl MetaSnapshot {
    pub fn to_parsed_meta(&self) -> ParsedMeta {
        ParsedMeta {
            name: self.name.clone(),
            year: self.year,
            media_type: self.media_type,
            begin_season: self.season,
            episodes: Vec::new(),
        }
    }
}

/// Aired-progress of one season: declared total and latest aired episode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeStats {
    pub total: Option<u32>,
    pub latest: Option<u32>,
}

impl EpisodeStats {
    pub fn new(total: Option<u32>, latest: Option<u32>) -> Self {
        Self { total, latest }
    }
}

/// What the library already holds for a piece of media.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryPresence {
    #[serde(default)]
    pub seasons: BTreeMap<u32, BTreeSet<u32>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub key: HistoryKey,
    pub title: String,
    pub status: HistoryStatus,
    pub action: DiscoveryAction,
    pub source_id: String,
    pub media_type: MediaType,
    pub poster_url: Option<String>,
    pub meta: MetaSnapshot,
    pub media: RecognizedMedia,
    pub torrent: CandidateResource,
    pub total_episodes: Option<u32>,
    pub latest_episode: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub last_update_time: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn pending(
        key: HistoryKey,
        action: DiscoveryAction,
        meta: &ParsedMeta,
        media: &RecognizedMedia,
        torrent: &CandidateResource,
        stats: EpisodeStats,
    ) -> Self {
        let now = Utc::now();
        Self {
            key,
            title: torrent.title.clone(),
            status: HistoryStatus::Pending,
            action,
            source_id: torrent.source_id.clone(),
            media_type: media.media_type,
            poster_url: media.poster_url.clone(),
            meta: meta.snapshot(media),
            media: media.clone(),
            torrent: torrent.clone(),
            total_episodes: stats.total,
            latest_episode: stats.latest,
            created_at: now,
            last_update_time: now,
        }
    }

    pub fn stats(&self) -> EpisodeStats {
        EpisodeStats::new(self.total_episodes, self.latest_episode)
    }

    pub fn log_title(&self) -> String {
        self.media.log_title(self.meta.season)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn series(id: u64) -> RecognizedMedia {
        RecognizedMedia::new("Show", MediaType::Series, id)
    }

    #[test]
    fn history_key_for_series_pads_season() {
        let first = HistoryKey::for_media(&series(100), Some(2));
        let second = HistoryKey::for_media(&series(100), Some(2));
        assert_eq!(first.as_str(), "100_S02");
        assert_eq!(first, second);
        assert_eq!(HistoryKey::for_media(&series(100), None).as_str(), "100_S00");
        assert_eq!(HistoryKey::for_media(&series(7), Some(123)).as_str(), "7_S123");
    }

    #[test]
    fn history_key_for_movie_ignores_season() {
        let movie = RecognizedMedia::new("Film", MediaType::Movie, 42);
        assert_eq!(HistoryKey::for_media(&movie, Some(3)).as_str(), "42");
    }

    #[test]
    fn season_count_falls_back_to_episode_list() {
        let mut media = series(1);
        media.seasons.insert(
            1,
            SeasonEpisodes {
                episode_count: Some(0),
                episodes: vec![1, 2, 3],
            },
        );
        media.seasons.insert(
            2,
            SeasonEpisodes {
                episode_count: Some(10),
                episodes: vec![],
            },
        );

        assert_eq!(media.season_episode_count(1), Some(3));
        assert_eq!(media.season_episode_count(2), Some(10));
        assert_eq!(media.season_episode_count(3), None);
    }

    #[test]
    fn log_title_includes_year_and_season() {
        let mut media = series(1);
        media.year = Some(2024);
        assert_eq!(media.log_title(Some(1)), "Show (2024) S01");
        assert_eq!(media.log_title(None), "Show (2024)");
    }

    #[test]
    fn action_accepts_config_aliases() {
        let manual: DiscoveryAction = serde_json::from_str("\"manual\"").unwrap();
        let auto: DiscoveryAction = serde_json::from_str("\"auto-subscribe\"").unwrap();
        let download: DiscoveryAction = serde_json::from_str("\"download\"").unwrap();

        assert_eq!(manual, DiscoveryAction::ManualSubscribe);
        assert_eq!(auto, DiscoveryAction::AutoSubscribe);
        assert_eq!(download, DiscoveryAction::Download);
        assert_eq!(
            serde_json::to_string(&DiscoveryAction::AutoSubscribe).unwrap(),
            "\"auto_subscribe\""
        );
    }

    #[test]
    fn pending_record_snapshots_inputs() {
        let media = series(100);
        let meta = ParsedMeta {
            name: Some("Show".to_string()),
            begin_season: Some(1),
            episodes: vec![1, 2],
            ..Default::default()
        };
        let torrent = CandidateResource::new("site-1", "Show.S01E01-E02");
        let record = HistoryRecord::pending(
            HistoryKey::for_media(&media, meta.begin_season),
            DiscoveryAction::ManualSubscribe,
            &meta,
            &media,
            &torrent,
            EpisodeStats::new(Some(8), Some(2)),
        );

        assert_eq!(record.status, HistoryStatus::Pending);
        assert_eq!(record.key.as_str(), "100_S01");
        assert_eq!(record.source_id, "site-1");
        assert_eq!(record.meta.season, Some(1));
        assert_eq!(record.meta.media_type, Some(MediaType::Series));
        assert_eq!(record.stats(), EpisodeStats::new(Some(8), Some(2)));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["key"], "100_S01");
    }
}
