// SPDX-License-Identifier: GPL-3.0-or-later
use regex::{Regex, RegexBuilder};
use sitesub_config::{ConfigError, DiscoveryConfig};
use sitesub_domain::CandidateResource;

/// Patterns for the quality, resolution and effect choices offered to operators.
const KNOWN_TAGS: &[(&str, &str)] = &[
    ("蓝光原盘", r"蓝光原盘|原盘|bdmv|bdiso|complete[\s.]?blu-?ray"),
    ("remux", r"remux"),
    ("bluray", r"blu-?ray"),
    ("uhd", r"uhd|ultra[\s.]?hd"),
    ("web-dl", r"web-?dl|web-?rip"),
    ("hdtv", r"hdtv"),
    ("h265", r"[hx]\.?265|hevc"),
    ("h264", r"[hx]\.?264|avc"),
    ("4k", r"4k|2160p|x2160"),
    ("1080p", r"1080[pi]|x1080"),
    ("720p", r"720p|x720"),
    ("杜比视界", r"dolby[\s.]?vision|\bdovi\b|\bdv\b|杜比视界"),
    ("杜比全景声", r"atmos|杜比全景声"),
    ("hdr", r"hdr"),
    ("sdr", r"sdr"),
];

#[derive(Debug, Clone)]
struct TagFilter {
    field: &'static str,
    value: String,
    pattern: Regex,
}

/// Accept/reject predicate over candidate titles, holding only active entries.
#[derive(Debug, Clone, Default)]
pub struct ActiveFilters {
    include: Option<Regex>,
    exclude: Option<Regex>,
    tags: Vec<TagFilter>,
}

impl ActiveFilters {
    /// Builds the active filter set. Invalid include/exclude patterns are
    /// dropped and reported back so the caller can warn about them.
    pub fn from_config(config: &DiscoveryConfig) -> (Self, Vec<ConfigError>) {
        let mut errors = Vec::new();
        let mut compile_user = |field: &'static str, value: Option<&str>| {
            value.and_then(|pattern| match case_insensitive(pattern) {
                Ok(regex) => Some(regex),
                Err(err) => {
                    errors.push(ConfigError::InvalidPattern {
                        field,
                        pattern: pattern.to_string(),
                        message: err.to_string(),
                    });
                    None
                }
            })
        };

        let include = compile_user("include", config.include_pattern());
        let exclude = compile_user("exclude", config.exclude_pattern());

        let tags = [
            ("quality", config.quality_tag()),
            ("resolution", config.resolution_tag()),
            ("effect", config.effect_tag()),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.map(|value| (field, value)))
        .filter_map(|(field, value)| {
            tag_pattern(value).map(|pattern| TagFilter {
                field,
                value: value.to_string(),
                pattern,
            })
        })
        .collect();

        (
            Self {
                include,
                exclude,
                tags,
            },
            errors,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_none() && self.exclude.is_none() && self.tags.is_empty()
    }

    pub fn accepts(&self, candidate: &CandidateResource) -> bool {
        self.rejection(candidate).is_none()
    }

    /// Name of the first filter rejecting the candidate, if any.
    pub fn rejection(&self, candidate: &CandidateResource) -> Option<String> {
        let title = candidate.title.as_str();

        if let Some(include) = &self.include {
            if !include.is_match(title) {
                return Some("include".to_string());
            }
        }
        if let Some(exclude) = &self.exclude {
            if exclude.is_match(title) {
                return Some("exclude".to_string());
            }
        }
        self.tags
            .iter()
            .find(|tag| !tag.pattern.is_match(title))
            .map(|tag| format!("{}={}", tag.field, tag.value))
    }
}

fn case_insensitive(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

fn tag_pattern(value: &str) -> Option<Regex> {
    let lowered = value.to_lowercase();
    let pattern = KNOWN_TAGS
        .iter()
        .find(|(tag, _)| *tag == lowered)
        .map(|(_, pattern)| pattern.to_string())
        .unwrap_or_else(|| regex::escape(value));
    case_insensitive(&pattern).ok()
}
