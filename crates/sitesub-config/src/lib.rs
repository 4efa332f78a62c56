// SPDX-License-Identifier: GPL-3.0-or-later
use std::path::Path;

use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use sitesub_domain::DiscoveryAction;
use thiserror::Error;
use tracing::info;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Filter values meaning "no restriction".
const ALL_MARKERS: [&str; 2] = ["all", "全部"];

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid size range '{0}', expected 'N' or 'N-M' in GB")]
    InvalidSizeRange(String),
    #[error("invalid {field} pattern '{pattern}': {message}")]
    InvalidPattern {
        field: &'static str,
        pattern: String,
        message: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_max_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://sitesub.db".to_string(),
            pool_max_size: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5160,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub max_concurrent_jobs: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
        }
    }
}

/// Credential required by confirm/ignore and on-demand runs.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    pub api_token: String,
}

/// Connection to the host application whose services the engine drives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    pub base_url: String,
    pub api_token: Option<String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3001".to_string(),
            api_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    pub enabled: bool,
    /// Five-field crontab expression; empty falls back to `interval_minutes`.
    pub cron: Option<String>,
    pub interval_minutes: u64,
    pub run_once: bool,
    pub reset_history: bool,
    pub action: DiscoveryAction,
    pub sources: Vec<String>,
    pub include: Option<String>,
    pub exclude: Option<String>,
    pub quality: Option<String>,
    pub resolution: Option<String>,
    pub effect: Option<String>,
    pub rule_groups: Vec<String>,
    pub downloader: Option<String>,
    pub save_path: Option<String>,
    pub size_range: Option<String>,
    pub notify: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cron: Some("*/30 * * * *".to_string()),
            interval_minutes: 30,
            run_once: false,
            reset_history: false,
            action: DiscoveryAction::ManualSubscribe,
            sources: Vec::new(),
            include: None,
            exclude: None,
            quality: None,
            resolution: None,
            effect: None,
            rule_groups: Vec::new(),
            downloader: None,
            save_path: None,
            size_range: None,
            notify: true,
        }
    }
}

impl DiscoveryConfig {
    pub fn cron_expression(&self) -> Option<&str> {
        self.cron
            .as_deref()
            .map(str::trim)
            .filter(|expr| !expr.is_empty())
    }

    pub fn size_filter(&self) -> Result<Option<SizeRange>, ConfigError> {
        match active_value(self.size_range.as_deref()) {
            Some(value) => SizeRange::parse(value).map(Some),
            None => Ok(None),
        }
    }

    pub fn include_pattern(&self) -> Option<&str> {
        active_value(self.include.as_deref())
    }

    pub fn exclude_pattern(&self) -> Option<&str> {
        active_value(self.exclude.as_deref())
    }

    pub fn quality_tag(&self) -> Option<&str> {
        active_value(self.quality.as_deref())
    }

    pub fn resolution_tag(&self) -> Option<&str> {
        active_value(self.resolution.as_deref())
    }

    pub fn effect_tag(&self) -> Option<&str> {
        active_value(self.effect.as_deref())
    }

    pub fn save_path(&self) -> Option<&str> {
        active_value(self.save_path.as_deref())
    }

    pub fn downloader(&self) -> Option<&str> {
        active_value(self.downloader.as_deref())
    }
}

/// Returns the trimmed value unless it is empty or an "all" marker.
pub fn active_value(value: Option<&str>) -> Option<&str> {
    let value = value?.trim();
    if value.is_empty() || ALL_MARKERS.iter().any(|m| value.eq_ignore_ascii_case(m)) {
        None
    } else {
        Some(value)
    }
}

/// Accepted torrent size in bytes, configured in GB.
///
/// A single value is a minimum, `N-M` is an inclusive range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeRange {
    pub min_bytes: f64,
    pub max_bytes: Option<f64>,
}

impl SizeRange {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidSizeRange(value.to_string());
        let value = value.trim();

        let (min, max) = match value.split_once('-') {
            Some((min, max)) => (min, Some(max)),
            None => (value, None),
        };

        let min_gb = parse_gb(min).ok_or_else(invalid)?;
        let max_gb = match max {
            Some(max) => Some(parse_gb(max).ok_or_else(invalid)?),
            None => None,
        };

        if matches!(max_gb, Some(max) if max < min_gb) {
            return Err(invalid());
        }

        Ok(Self {
            min_bytes: min_gb * BYTES_PER_GB,
            max_bytes: max_gb.map(|gb| gb * BYTES_PER_GB),
        })
    }

    pub fn admits(&self, size_bytes: u64) -> bool {
        let size = size_bytes as f64;
        match self.max_bytes {
            Some(max) => self.min_bytes <= size && size <= max,
            None => size >= self.min_bytes,
        }
    }
}

fn parse_gb(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    value.parse::<f64>().ok().filter(|gb| gb.is_finite())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelConfig {
    pub channel: String,
    pub token: Option<String>,
    pub chat_id: Option<String>,
    #[serde(default)]
    pub proxy: bool,
}

/// Independent notification channel, used instead of the host's default one.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NotificationConfig {
    pub independent: bool,
    pub proxy_url: Option<String>,
    pub channels: Vec<ChannelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub http: HttpConfig,
    pub telemetry: TelemetryConfig,
    pub scheduler: SchedulerConfig,
    pub auth: AuthConfig,
    pub host: HostConfig,
    pub discovery: DiscoveryConfig,
    pub notifications: NotificationConfig,
}

/// Load configuration from defaults, optional TOML file, and environment
/// overrides (prefix: SITESUB_).
pub fn load(config_path: Option<&Path>) -> Result<AppConfig> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if let Some(path) = config_path {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("SITESUB_").split("__"));

    let config: AppConfig = figment.extract()?;
    info!(
        target: "config",
        sources = config.discovery.sources.len(),
        action = %config.discovery.action,
        "configuration loaded"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    const GB: u64 = 1024 * 1024 * 1024;

    #[test]
    fn size_range_inclusive_bounds() {
        let range = SizeRange::parse("3-5").unwrap();
        assert!(range.admits(GB * 9 / 2));
        assert!(range.admits(GB * 3));
        assert!(range.admits(GB * 5));
        assert!(!range.admits(GB * 29 / 10));
        assert!(!range.admits(GB * 6));
    }

    #[test]
    fn size_range_single_value_is_minimum() {
        let range = SizeRange::parse("2.5").unwrap();
        assert!(range.admits(GB * 100));
        assert!(!range.admits(GB * 2));
    }

    #[test]
    fn size_range_rejects_garbage() {
        for value in ["abc", "3-", "-5", "5-3", "1-2-3", "3 GB"] {
            assert!(
                matches!(SizeRange::parse(value), Err(ConfigError::InvalidSizeRange(_))),
                "{value} should be rejected"
            );
        }
    }

    #[test]
    fn all_markers_are_inactive() {
        let config = DiscoveryConfig {
            quality: Some("全部".to_string()),
            resolution: Some("All".to_string()),
            effect: Some("  ".to_string()),
            include: Some("S01".to_string()),
            ..Default::default()
        };

        assert_eq!(config.quality_tag(), None);
        assert_eq!(config.resolution_tag(), None);
        assert_eq!(config.effect_tag(), None);
        assert_eq!(config.include_pattern(), Some("S01"));
    }

    #[test]
    fn empty_cron_falls_back_to_interval() {
        let config = DiscoveryConfig {
            cron: Some(" ".to_string()),
            ..Default::default()
        };
        assert_eq!(config.cron_expression(), None);
        assert_eq!(
            DiscoveryConfig::default().cron_expression(),
            Some("*/30 * * * *")
        );
    }

    #[test]
    fn load_merges_toml_and_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "sitesub.toml",
                r#"
                    [discovery]
                    enabled = true
                    action = "download"
                    sources = ["1", "2"]
                    size_range = "3-5"
                "#,
            )?;
            jail.set_env("SITESUB_AUTH__API_TOKEN", "secret");

            let config = load(Some(Path::new("sitesub.toml"))).expect("config should load");
            assert!(config.discovery.enabled);
            assert_eq!(config.discovery.action, DiscoveryAction::Download);
            assert_eq!(config.discovery.sources, vec!["1", "2"]);
            assert!(config.discovery.size_filter().unwrap().is_some());
            assert_eq!(config.auth.api_token, "secret");
            assert_eq!(config.http.port, 5160);
            Ok(())
        });
    }
}
