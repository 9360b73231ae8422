//! Pick the best candidate among duplicates collected from many sites.
//!
//! Candidates are ordered descending by
//! `(title, res_order, seeders, site_order, season_count, episode_count)` in
//! seeder mode, with seeders and site order swapped in priority mode. The sort
//! is stable: candidates with identical keys keep their input order. After
//! sorting, the first candidate per title (plus season/episode signature for
//! non-movies) wins.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::types::{MediaHint, MediaType, TorrentRecord};

const TITLE_WIDTH: usize = 100;

static SEASON_EPISODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bS(\d{1,2})(?:-S?(\d{1,2}))?(?:E(\d{1,4})(?:-E?(\d{1,4}))?)?\b")
        .expect("static regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderMode {
    /// Seeders before site priority.
    #[default]
    Seeder,
    /// Site priority before seeders.
    Priority,
}

impl FromStr for OrderMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "seeder" => Ok(OrderMode::Seeder),
            "priority" | "site" => Ok(OrderMode::Priority),
            other => Err(format!("unknown order mode: {}", other)),
        }
    }
}

impl OrderMode {
    /// Anything other than `seeder` ranks by site priority.
    pub fn parse_lenient(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("seeder") {
            OrderMode::Seeder
        } else {
            OrderMode::Priority
        }
    }
}

/// A search result prepared for ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct RankCandidate {
    pub title: String,
    pub year: Option<String>,
    pub media_type: MediaType,
    pub seasons: Vec<u32>,
    pub episodes: Vec<u32>,
    /// Resource-type preference; higher is better.
    pub res_order: u32,
    /// Site preference; higher is better.
    pub site_order: i32,
    pub seeders: u32,
    pub record: TorrentRecord,
}

impl RankCandidate {
    /// Build a candidate from a record, taking title and year from the hint when given.
    pub fn from_record(record: TorrentRecord, media: Option<&MediaHint>, res_order: u32) -> Self {
        let (seasons, episodes) = season_episode_markers(&record.title);
        let title = media
            .map(|m| m.title.trim())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| record.title.clone());
        Self {
            title,
            year: media.and_then(|m| m.year.clone()),
            media_type: media.map(|m| m.media_type).unwrap_or_default(),
            seasons,
            episodes,
            res_order,
            site_order: record.site_priority,
            seeders: record.seeders,
            record,
        }
    }

    /// `title (year)`, or the bare title.
    pub fn title_string(&self) -> String {
        match &self.year {
            Some(year) if !year.is_empty() => format!("{} ({})", self.title, year),
            _ => self.title.clone(),
        }
    }

    /// e.g. `S01E03`, `S01-S02`, `S02E01-E08`; empty without markers.
    pub fn season_episode_string(&self) -> String {
        let mut out = String::new();
        if let (Some(first), Some(last)) = (self.seasons.first(), self.seasons.last()) {
            out.push_str(&format!("S{:02}", first));
            if last != first {
                out.push_str(&format!("-S{:02}", last));
            }
        }
        if let (Some(first), Some(last)) = (self.episodes.first(), self.episodes.last()) {
            out.push_str(&format!("E{:02}", first));
            if last != first {
                out.push_str(&format!("-E{:02}", last));
            }
        }
        out
    }

    fn dedup_key(&self) -> String {
        if self.media_type == MediaType::Movie {
            self.title_string()
        } else {
            format!("{}{}", self.title_string(), self.season_episode_string())
        }
    }

    fn sort_title(&self) -> String {
        self.title.chars().take(TITLE_WIDTH).collect()
    }
}

/// Season and episode numbers named in a release title.
pub fn season_episode_markers(title: &str) -> (Vec<u32>, Vec<u32>) {
    let Some(caps) = SEASON_EPISODE.captures(title) else {
        return (Vec::new(), Vec::new());
    };
    let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());

    let seasons = match (num(1), num(2)) {
        (Some(a), Some(b)) if b >= a => (a..=b).collect(),
        (Some(a), _) => vec![a],
        _ => Vec::new(),
    };
    let episodes = match (num(3), num(4)) {
        (Some(a), Some(b)) if b >= a => (a..=b).collect(),
        (Some(a), _) => vec![a],
        _ => Vec::new(),
    };
    (seasons, episodes)
}

fn compare(a: &RankCandidate, b: &RankCandidate, mode: OrderMode) -> Ordering {
    let primary = a
        .sort_title()
        .cmp(&b.sort_title())
        .then(a.res_order.cmp(&b.res_order));
    let middle = match mode {
        OrderMode::Seeder => a
            .seeders
            .cmp(&b.seeders)
            .then(a.site_order.cmp(&b.site_order)),
        OrderMode::Priority => a
            .site_order
            .cmp(&b.site_order)
            .then(a.seeders.cmp(&b.seeders)),
    };
    primary
        .then(middle)
        .then(a.seasons.len().cmp(&b.seasons.len()))
        .then(a.episodes.len().cmp(&b.episodes.len()))
}

/// Rank candidates best-first and keep one per title/season/episode.
pub fn select_best(mut candidates: Vec<RankCandidate>, mode: OrderMode) -> Vec<RankCandidate> {
    // Descending; sort_by is stable so equal keys keep input order
    candidates.sort_by(|a, b| compare(b, a, mode));

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.dedup_key()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(title: &str, site: &str, seeders: u32, site_order: i32) -> RankCandidate {
        let mut record = TorrentRecord::new(site, format!("{} S01E02 1080p", title));
        record.seeders = seeders;
        record.site_priority = site_order;
        let hint = MediaHint {
            media_type: MediaType::Tv,
            title: title.to_string(),
            year: Some("2023".to_string()),
            tmdb_matched: true,
        };
        RankCandidate::from_record(record, Some(&hint), 10)
    }

    #[test]
    fn test_order_mode_parse() {
        assert_eq!("seeder".parse::<OrderMode>().unwrap(), OrderMode::Seeder);
        assert_eq!("Priority".parse::<OrderMode>().unwrap(), OrderMode::Priority);
        assert!("random".parse::<OrderMode>().is_err());
        assert_eq!(OrderMode::parse_lenient("random"), OrderMode::Priority);
        assert_eq!(OrderMode::parse_lenient("SEEDER"), OrderMode::Seeder);
    }

    #[test]
    fn test_season_episode_markers() {
        assert_eq!(season_episode_markers("Show.S01E02.1080p"), (vec![1], vec![2]));
        assert_eq!(
            season_episode_markers("Show S02E01-E03 WEB"),
            (vec![2], vec![1, 2, 3])
        );
        assert_eq!(season_episode_markers("Show S01-S03 Complete"), (vec![1, 2, 3], vec![]));
        assert_eq!(season_episode_markers("Movie.2023.2160p"), (vec![], vec![]));
    }

    #[test]
    fn test_season_episode_string() {
        let c = candidate("Show", "a", 1, 0);
        assert_eq!(c.season_episode_string(), "S01E02");
        assert_eq!(c.title_string(), "Show (2023)");
    }

    #[test]
    fn test_select_best_dedups_by_seeders() {
        let low_seed_high_site = candidate("Show", "a", 5, 9);
        let high_seed_low_site = candidate("Show", "b", 50, 1);

        let best = select_best(
            vec![low_seed_high_site.clone(), high_seed_low_site.clone()],
            OrderMode::Seeder,
        );
        assert_eq!(best.len(), 1);
        assert_eq!(best[0].record.indexer_id, "b");
    }

    #[test]
    fn test_select_best_dedups_by_priority() {
        let low_seed_high_site = candidate("Show", "a", 5, 9);
        let high_seed_low_site = candidate("Show", "b", 50, 1);

        let best = select_best(
            vec![high_seed_low_site, low_seed_high_site],
            OrderMode::Priority,
        );
        assert_eq!(best.len(), 1);
        assert_eq!(best[0].record.indexer_id, "a");
    }

    #[test]
    fn test_res_order_outranks_seeders() {
        let mut better_res = candidate("Show", "a", 1, 0);
        better_res.res_order = 20;
        let more_seeds = candidate("Show", "b", 999, 0);

        let best = select_best(vec![more_seeds, better_res], OrderMode::Seeder);
        assert_eq!(best[0].record.indexer_id, "a");
    }

    #[test]
    fn test_distinct_episodes_are_kept() {
        let e2 = candidate("Show", "a", 5, 0);
        let mut e3 = candidate("Show", "b", 5, 0);
        e3.episodes = vec![3];

        let best = select_best(vec![e2, e3], OrderMode::Seeder);
        assert_eq!(best.len(), 2);
    }

    #[test]
    fn test_movies_dedup_on_title_only() {
        let mut a = candidate("Film", "a", 5, 0);
        a.media_type = MediaType::Movie;
        let mut b = candidate("Film", "b", 8, 0);
        b.media_type = MediaType::Movie;
        b.episodes = vec![7];

        let best = select_best(vec![a, b], OrderMode::Seeder);
        assert_eq!(best.len(), 1);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let first = candidate("Show", "first", 5, 1);
        let second = candidate("Show", "second", 5, 1);

        let best = select_best(vec![first, second], OrderMode::Seeder);
        assert_eq!(best.len(), 1);
        assert_eq!(best[0].record.indexer_id, "first");
    }

    #[test]
    fn test_titles_sort_descending() {
        let mut a = candidate("Alpha", "a", 1, 0);
        a.media_type = MediaType::Movie;
        let mut b = candidate("Beta", "b", 1, 0);
        b.media_type = MediaType::Movie;

        let best = select_best(vec![a, b], OrderMode::Seeder);
        let titles: Vec<&str> = best.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Beta", "Alpha"]);
    }
}
