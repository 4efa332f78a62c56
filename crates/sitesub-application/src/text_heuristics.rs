// SPDX-License-Identifier: GPL-3.0-or-later
//! Regex extraction of season, declared episode total and aired progress from
//! free-text release titles and descriptions.

use lazy_static::lazy_static;
use regex::{Captures, Regex};

/// Terms announcing a re-release of a single episode rather than new progress.
const MAINTENANCE_KEYWORDS: [&str; 12] = [
    "修复", "修正", "替换", "重发", "补发", "更正", "repair", "fix", "replace", "reissue",
    "patch", "repack",
];

/// How many characters before an episode reference are scanned for keywords.
const MAINTENANCE_WINDOW: usize = 8;

/// Longest episode span expanded into a list.
const MAX_SPAN: u32 = 2000;

lazy_static! {
    static ref SEASON_TOKEN: Regex =
        Regex::new(r"(?i)(?:^|[.\s_\-\[(])S(\d{1,4})").expect("valid season token regex");
    static ref SEASON_CJK: Regex = Regex::new(r"第\s*(\d{1,4})\s*季").expect("valid cjk season regex");
    static ref SEASON_WORD: Regex =
        Regex::new(r"(?i)\bSeason[ .]?(\d{1,4})").expect("valid season word regex");
    static ref TOTAL_MARKERS: [Regex; 3] = [
        Regex::new(r"全\s*(\d{1,4})\s*集").expect("valid total regex"),
        Regex::new(r"共\s*(\d{1,4})\s*集").expect("valid total regex"),
        Regex::new(r"(\d{1,4})\s*集\s*全").expect("valid total regex"),
    ];
    static ref SEASON_EPISODE: Regex = Regex::new(r"(?i)S\d{1,4}E(\d{1,4})(?:-E?(\d{1,4}))?")
        .expect("valid season episode regex");
    static ref BARE_EPISODE: Regex =
        Regex::new(r"(?i)E(\d{1,4})(?:-E?(\d{1,4}))?").expect("valid bare episode regex");
    static ref EP_EPISODE: Regex =
        Regex::new(r"(?i)EP(\d{1,4})(?:-(?:EP)?(\d{1,4}))?").expect("valid ep regex");
    static ref CJK_EPISODE: Regex =
        Regex::new(r"第\s*(\d{1,4})\s*(?:[-~、,，]\s*(\d{1,4})\s*)?集").expect("valid cjk episode regex");
    static ref YEAR: Regex =
        Regex::new(r"(?:^|[^\d])((?:19|20)\d{2})(?:[^\d]|$)").expect("valid year regex");
}

/// One episode reference found in text: a single episode or an inclusive span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EpisodeRef {
    start: usize,
    first: u32,
    last: Option<u32>,
}

impl EpisodeRef {
    fn max(&self) -> u32 {
        self.last.map_or(self.first, |last| last.max(self.first))
    }
}

pub fn extract_season(text: &str) -> Option<u32> {
    [&*SEASON_TOKEN, &*SEASON_CJK, &*SEASON_WORD]
        .into_iter()
        .find_map(|re| re.captures(text))
        .and_then(|caps| number(&caps, 1))
}

/// Declared season length, e.g. `全12集`, `共12集` or `12集全`.
pub fn extract_total_from_title(text: &str) -> Option<u32> {
    TOTAL_MARKERS
        .iter()
        .find_map(|re| re.captures(text))
        .and_then(|caps| number(&caps, 1))
        .filter(|total| *total > 0)
}

/// Highest episode number referenced anywhere in the text, ignoring
/// references that announce a repaired or re-issued episode.
pub fn extract_latest_episode(text: &str) -> Option<u32> {
    episode_refs(text).iter().map(EpisodeRef::max).max()
}

/// Episodes covered by the first usable reference, or `1..=N` from a
/// completeness marker when no reference exists.
pub fn extract_episode_list(text: &str) -> Vec<u32> {
    if let Some(reference) = episode_refs(text).first() {
        let last = reference.max();
        if last - reference.first <= MAX_SPAN {
            return (reference.first..=last).collect();
        }
        return vec![reference.first];
    }

    extract_total_from_title(text)
        .filter(|total| *total <= MAX_SPAN)
        .map(|total| (1..=total).collect())
        .unwrap_or_default()
}

pub fn extract_year(text: &str) -> Option<u32> {
    YEAR.captures(text).and_then(|caps| number(&caps, 1))
}

fn number(caps: &Captures<'_>, group: usize) -> Option<u32> {
    caps.get(group).and_then(|m| m.as_str().parse().ok())
}

fn episode_refs(text: &str) -> Vec<EpisodeRef> {
    let mut refs = Vec::new();

    let mut collect = |re: &Regex, boundary: fn(&str, usize, usize) -> bool| {
        for caps in re.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            if !boundary(text, whole.start(), whole.end()) {
                continue;
            }
            if follows_maintenance_keyword(text, whole.start()) {
                continue;
            }
            if let Some(first) = number(&caps, 1) {
                refs.push(EpisodeRef {
                    start: whole.start(),
                    first,
                    last: number(&caps, 2),
                });
            }
        }
    };

    collect(&SEASON_EPISODE, |_, _, _| true);
    collect(&BARE_EPISODE, letter_bounded);
    collect(&EP_EPISODE, letter_bounded);
    collect(&CJK_EPISODE, |_, _, _| true);

    refs.sort_by_key(|r| r.start);
    refs.dedup_by_key(|r| (r.start, r.first));
    refs
}

/// Rejects matches glued to surrounding ASCII words or digits, e.g. the `E`
/// inside `S01E05` or `HEVC10`.
fn letter_bounded(text: &str, start: usize, end: usize) -> bool {
    let before_ok = text[..start]
        .chars()
        .next_back()
        .map_or(true, |c| !c.is_ascii_alphanumeric());
    let after_ok = text[end..]
        .chars()
        .next()
        .map_or(true, |c| !c.is_ascii_digit());
    before_ok && after_ok
}

fn follows_maintenance_keyword(text: &str, start: usize) -> bool {
    let mut window: Vec<char> = text[..start]
        .chars()
        .rev()
        .take(MAINTENANCE_WINDOW)
        .collect();
    window.reverse();
    let window: String = window.into_iter().collect::<String>().to_lowercase();
    MAINTENANCE_KEYWORDS.iter().any(|kw| window.contains(kw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn season_token_variants() {
        assert_eq!(extract_season("Show.S02E03.1080p"), Some(2));
        assert_eq!(extract_season("S03 Show"), Some(3));
        assert_eq!(extract_season("三体 第1季 全30集"), Some(1));
        assert_eq!(extract_season("Show Season 4 Complete"), Some(4));
        assert_eq!(extract_season("Show.Season.5"), Some(5));
        assert_eq!(extract_season("Movie.2024.1080p"), None);
    }

    #[test]
    fn season_token_needs_boundary() {
        assert_eq!(extract_season("CHAOS10 Rip"), None);
    }

    #[test]
    fn total_markers() {
        assert_eq!(extract_total_from_title("Show.S01.全8集"), Some(8));
        assert_eq!(extract_total_from_title("共 24 集"), Some(24));
        assert_eq!(extract_total_from_title("10集全"), Some(10));
        assert_eq!(extract_total_from_title("更新至第8集"), None);
    }

    #[test]
    fn latest_episode_takes_maximum_across_shapes() {
        assert_eq!(extract_latest_episode("Show.S01E03.1080p"), Some(3));
        assert_eq!(extract_latest_episode("Show.S01E01-E06.WEB-DL"), Some(6));
        assert_eq!(extract_latest_episode("Show E07 HDTV"), Some(7));
        assert_eq!(extract_latest_episode("Show EP09-12"), Some(12));
        assert_eq!(extract_latest_episode("更新至第1-16集"), Some(16));
        assert_eq!(extract_latest_episode("第5集 | S01E04"), Some(5));
        assert_eq!(extract_latest_episode("Show.2024.1080p.HEVC"), None);
    }

    #[test]
    fn maintenance_reference_is_excluded() {
        assert_eq!(extract_latest_episode("修复第2集 更新至第10集"), Some(10));
        assert_eq!(extract_latest_episode("Show S01E04 repack E09"), Some(4));
        assert_eq!(extract_latest_episode("替换第12集"), None);
    }

    #[test]
    fn bare_episode_rejects_glued_tokens() {
        assert_eq!(extract_latest_episode("DDP5.1.Atmos.HEVC10"), None);
        assert_eq!(extract_latest_episode("CODE12345"), None);
    }

    #[test]
    fn episode_list_expands_first_span() {
        assert_eq!(extract_episode_list("Show.S01E01-E03"), vec![1, 2, 3]);
        assert_eq!(extract_episode_list("Show.S01E05"), vec![5]);
        assert_eq!(extract_episode_list("Show.S01.全4集"), vec![1, 2, 3, 4]);
        assert!(extract_episode_list("Show.S01").is_empty());
    }

    #[test]
    fn year_is_standalone_four_digits() {
        assert_eq!(extract_year("Movie.2019.1080p"), Some(2019));
        assert_eq!(extract_year("Show.S01.2160p"), None);
    }
}
