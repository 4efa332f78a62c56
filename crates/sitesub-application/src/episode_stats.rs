// SPDX-License-Identifier: GPL-3.0-or-later
use sitesub_domain::{CandidateResource, EpisodeStats, MediaType, ParsedMeta, RecognizedMedia};

use crate::text_heuristics::{extract_latest_episode, extract_total_from_title};

/// Merges text heuristics, recognizer season data and prior observations into
/// a (total, latest) pair that never moves below `prior`.
///
/// A completeness marker in the text (`全N集`) overrides a stale progress
/// marker, and `latest` is never left above `total`.
pub fn compute(
    meta: &ParsedMeta,
    media: &RecognizedMedia,
    candidate: &CandidateResource,
    prior: EpisodeStats,
) -> EpisodeStats {
    let text = candidate.text();

    let title_total = extract_total_from_title(&text);
    let media_total = match media.media_type {
        MediaType::Series => media.season_episode_count(meta.begin_season.unwrap_or(1)),
        MediaType::Movie => None,
    };
    let list_total = u32::try_from(meta.episodes.len()).ok();

    let mut total = [title_total, media_total, list_total]
        .into_iter()
        .flatten()
        .find(|n| *n > 0)
        .unwrap_or(0)
        .max(prior.total.unwrap_or(0));

    let mut latest = match (extract_latest_episode(&text), prior.latest) {
        (Some(seen), Some(floor)) => Some(seen.max(floor)),
        (seen, floor) => seen.or(floor),
    };

    if latest.is_none() && total > 0 {
        latest = Some(total);
    }
    if title_total.is_some() && total > 0 {
        latest = latest.map(|l| l.max(total));
    }
    if let Some(l) = latest {
        total = total.max(l);
    }

    EpisodeStats::new((total > 0).then_some(total), latest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitesub_domain::SeasonEpisodes;

    fn series() -> RecognizedMedia {
        RecognizedMedia::new("Show", MediaType::Series, 100)
    }

    fn meta(season: u32) -> ParsedMeta {
        ParsedMeta {
            name: Some("Show".to_string()),
            begin_season: Some(season),
            media_type: Some(MediaType::Series),
            ..Default::default()
        }
    }

    fn candidate(title: &str) -> CandidateResource {
        CandidateResource::new("1", title)
    }

    #[test]
    fn completeness_marker_overrides_progress() {
        let stats = compute(
            &meta(1),
            &series(),
            &candidate("全12集 更新至第5集"),
            EpisodeStats::default(),
        );
        assert_eq!(stats, EpisodeStats::new(Some(12), Some(12)));
    }

    #[test]
    fn total_only_sets_latest() {
        let stats = compute(
            &meta(1),
            &series(),
            &candidate("Show.S01.全8集"),
            EpisodeStats::default(),
        );
        assert_eq!(stats, EpisodeStats::new(Some(8), Some(8)));
    }

    #[test]
    fn media_season_count_supplies_total() {
        let mut media = series();
        media.seasons.insert(
            2,
            SeasonEpisodes {
                episode_count: Some(10),
                episodes: vec![],
            },
        );
        let stats = compute(
            &meta(2),
            &media,
            &candidate("Show.S02E04"),
            EpisodeStats::default(),
        );
        assert_eq!(stats, EpisodeStats::new(Some(10), Some(4)));
    }

    #[test]
    fn latest_above_total_raises_total() {
        let mut media = series();
        media.seasons.insert(
            1,
            SeasonEpisodes {
                episode_count: Some(6),
                episodes: vec![],
            },
        );
        let stats = compute(
            &meta(1),
            &media,
            &candidate("Show.S01E09"),
            EpisodeStats::default(),
        );
        assert_eq!(stats, EpisodeStats::new(Some(9), Some(9)));
    }

    #[test]
    fn never_moves_below_prior() {
        let prior = EpisodeStats::new(Some(24), Some(10));
        let stats = compute(&meta(1), &series(), &candidate("Show.S01E03"), prior);
        assert_eq!(stats, prior);

        let observations = ["Show.S01E11", "Show.S01E02", "Show.S01", "Show.S01E12-E13"];
        let mut current = prior;
        for title in observations {
            let next = compute(&meta(1), &series(), &candidate(title), current);
            assert!(next.total >= current.total, "total regressed on {title}");
            assert!(next.latest >= current.latest, "latest regressed on {title}");
            current = next;
        }
        assert_eq!(current, EpisodeStats::new(Some(24), Some(13)));
    }

    #[test]
    fn identical_inputs_give_identical_output() {
        let prior = EpisodeStats::new(Some(8), Some(3));
        let candidate = candidate("Show.S01E05 修复第2集");
        let first = compute(&meta(1), &series(), &candidate, prior);
        let second = compute(&meta(1), &series(), &candidate, prior);
        assert_eq!(first, second);
        assert_eq!(first, EpisodeStats::new(Some(8), Some(5)));
    }

    #[test]
    fn description_is_scanned() {
        let mut candidate = candidate("Show.S01");
        candidate.description = "更新至第7集".to_string();
        let stats = compute(&meta(1), &series(), &candidate, EpisodeStats::default());
        assert_eq!(stats, EpisodeStats::new(Some(7), Some(7)));
    }

    #[test]
    fn movie_without_markers_has_no_stats() {
        let media = RecognizedMedia::new("Film", MediaType::Movie, 5);
        let stats = compute(
            &ParsedMeta::default(),
            &media,
            &candidate("Film.2020.1080p"),
            EpisodeStats::default(),
        );
        assert_eq!(stats, EpisodeStats::default());
    }
}
