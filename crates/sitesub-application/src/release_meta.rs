// SPDX-License-Identifier: GPL-3.0-or-later
use lazy_static::lazy_static;
use regex::Regex;
use sitesub_domain::{MediaType, ParsedMeta};

use crate::text_heuristics::{extract_episode_list, extract_season, extract_year};

lazy_static! {
    static ref BRACKETED: Regex =
        Regex::new(r"\[[^\]]*\]|【[^】]*】").expect("valid bracket regex");
    static ref NAME_END: Regex = Regex::new(
        r"(?i)(?:^|[.\s_\-])(?:S\d{1,4}|E\d{1,4}|EP\d{1,4}|Season[ .]?\d|(?:19|20)\d{2}(?:[.\s_\-)\]]|$)|\d{3,4}[pi]\b|4k\b|web-?dl|web-?rip|blu-?ray|remux|hdtv|uhd|[hx]\.?26[45]|hevc|avc)|第\s*\d{1,4}\s*[季集]|全\s*\d{1,4}\s*集|共\s*\d{1,4}\s*集"
    )
    .expect("valid name boundary regex");
    static ref SEPARATORS: Regex = Regex::new(r"[._]+").expect("valid separator regex");
    static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("valid whitespace regex");
}

/// Infers name, year, season and episode span from a release title and its
/// description. Media type is only set when a season or episode marker is
/// present; otherwise the recognizer decides.
pub fn parse_meta(title: &str, description: &str) -> ParsedMeta {
    let stripped = BRACKETED.replace_all(title, " ");
    let name = extract_name(&stripped);

    let begin_season = extract_season(title);
    let mut episodes = extract_episode_list(title);
    if episodes.is_empty() && !description.trim().is_empty() {
        episodes = extract_episode_list(&format!("{title} {description}"));
    }

    let media_type = (begin_season.is_some() || !episodes.is_empty()).then_some(MediaType::Series);

    ParsedMeta {
        name,
        year: extract_year(title),
        media_type,
        begin_season,
        episodes,
    }
}

fn extract_name(title: &str) -> Option<String> {
    let cut = NAME_END
        .find(title)
        .map_or(title, |m| &title[..m.start()]);
    let spaced = SEPARATORS.replace_all(cut, " ");
    let name = WHITESPACE.replace_all(&spaced, " ");
    let name = name.trim().trim_end_matches(['-', '(', '[']).trim();

    (!name.is_empty()).then(|| name.to_string())
}
