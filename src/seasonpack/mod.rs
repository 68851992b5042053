//! Season-pack completeness detector. Purely heuristic: never gates
//! torrent creation, only produces a warning record the caller may
//! choose to surface.

use std::sync::OnceLock;

use regex::{Regex, RegexSet};

const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4"];

/// Suspicion thresholds (spec §4.9): flagged when missing episode count
/// is at least this many and the season's max episode is at least this
/// many, or when the missing fraction exceeds 50%.
const SUSPICION_MIN_MISSING: usize = 3;
const SUSPICION_MIN_MAX_EPISODE: u32 = 7;
const SUSPICION_MISSING_FRACTION: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeasonPackInfo {
    pub is_season_pack: bool,
    pub season: Option<u32>,
    pub episodes: Vec<u32>,
    pub max_episode: u32,
    pub missing_episodes: Vec<u32>,
    pub video_file_count: usize,
    pub is_suspicious: bool,
}

fn season_dir_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            Regex::new(r"(?i)season[ ._-]?(\d{1,2})").unwrap(),
            Regex::new(r"(?i)[/\\._ -]s(\d{1,2})(?:[/\\._ -]|$)").unwrap(),
            Regex::new(r"(?i)^s(\d{1,2})(?:[/\\._ -]|$)").unwrap(),
        ]
    })
}

/// Union of both source variants' episode-marker separators (`E?` and
/// `-?E?`), so `S01E02`, `S01-E02`, and `S01.02` all match uniformly.
fn episode_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)s(\d{1,2})-?e?(\d{1,4})(?:(-?e)(\d{1,4}))?").unwrap())
}

fn season_from_filename() -> &'static RegexSet {
    static SET: OnceLock<RegexSet> = OnceLock::new();
    SET.get_or_init(|| {
        RegexSet::new([r"(?i)s(\d{1,2})e\d{1,4}"]).expect("season-from-filename regex set")
    })
}

/// Analyze a directory's `(directory_path, filenames)` for season-pack
/// completeness. `directory_path` is used only to detect the season
/// number; `filenames` are basenames within that directory.
pub fn analyze(directory_path: &str, filenames: &[String]) -> SeasonPackInfo {
    let season = detect_season(directory_path, filenames);

    let mut episodes = Vec::new();
    let mut video_file_count = 0usize;

    for filename in filenames {
        if !has_video_extension(filename) {
            continue;
        }
        video_file_count += 1;
        if let Some(caps) = episode_regex().captures(filename) {
            let Some(ep_start) = caps.get(2).and_then(|m| m.as_str().parse::<u32>().ok()) else {
                continue;
            };
            if let (Some(_), Some(end_match)) = (caps.get(3), caps.get(4)) {
                if let Ok(ep_end) = end_match.as_str().parse::<u32>() {
                    let (lo, hi) = if ep_start <= ep_end {
                        (ep_start, ep_end)
                    } else {
                        (ep_end, ep_start)
                    };
                    episodes.extend(lo..=hi);
                    continue;
                }
            }
            episodes.push(ep_start);
        }
    }

    episodes.sort_unstable();
    episodes.dedup();

    let is_season_pack = episodes.len() >= 2;
    let max_episode = episodes.last().copied().unwrap_or(0);
    let missing_episodes: Vec<u32> = if is_season_pack {
        (1..max_episode).filter(|e| !episodes.contains(e)).collect()
    } else {
        Vec::new()
    };

    let is_suspicious = is_season_pack
        && !missing_episodes.is_empty()
        && ((missing_episodes.len() >= SUSPICION_MIN_MISSING && max_episode >= SUSPICION_MIN_MAX_EPISODE)
            || (missing_episodes.len() as f64 / max_episode.max(1) as f64) > SUSPICION_MISSING_FRACTION);

    SeasonPackInfo {
        is_season_pack,
        season,
        episodes,
        max_episode,
        missing_episodes,
        video_file_count,
        is_suspicious,
    }
}

fn detect_season(directory_path: &str, filenames: &[String]) -> Option<u32> {
    for pattern in season_dir_patterns() {
        if let Some(caps) = pattern.captures(directory_path) {
            if let Some(n) = caps.get(1).and_then(|m| m.as_str().parse().ok()) {
                return Some(n);
            }
        }
    }

    let set = season_from_filename();
    for filename in filenames.iter().take(5) {
        if set.is_match(filename) {
            if let Some(caps) = episode_regex().captures(filename) {
                if let Some(n) = caps.get(1).and_then(|m| m.as_str().parse().ok()) {
                    return Some(n);
                }
            }
        }
    }
    None
}

fn has_video_extension(filename: &str) -> bool {
    let lower = filename.to_ascii_lowercase();
    VIDEO_EXTENSIONS
        .iter()
        .any(|ext| lower.ends_with(&format!(".{ext}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(files: &[&str]) -> Vec<String> {
        files.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn season_pack_with_one_missing_episode_is_not_suspicious() {
        // S6: Show.S01.1080p..., S01E01..S01E10 minus S01E03.
        let files: Vec<String> = (1..=10)
            .filter(|&n| n != 3)
            .map(|n| format!("S01E{n:02}.mkv"))
            .collect();
        let info = analyze("Show.S01.1080p.WEB", &files);

        assert!(info.is_season_pack);
        assert_eq!(info.season, Some(1));
        assert_eq!(info.max_episode, 10);
        assert_eq!(info.missing_episodes, vec![3]);
        assert!(!info.is_suspicious);
    }

    #[test]
    fn missing_many_episodes_with_high_max_is_suspicious() {
        let files = names(&["S02E01.mkv", "S02E02.mkv", "S02E10.mkv"]);
        let info = analyze("Show.S02", &files);
        assert!(info.is_season_pack);
        assert_eq!(info.max_episode, 10);
        assert!(info.missing_episodes.len() >= 3);
        assert!(info.is_suspicious);
    }

    #[test]
    fn single_file_is_not_a_season_pack() {
        let files = names(&["S01E01.mkv"]);
        let info = analyze("Show.S01", &files);
        assert!(!info.is_season_pack);
        assert!(info.missing_episodes.is_empty());
    }

    #[test]
    fn multi_episode_range_expands_inclusive() {
        let files = names(&["S01E01-E03.mkv", "S01E05.mkv"]);
        let info = analyze("Show.S01", &files);
        assert_eq!(info.episodes, vec![1, 2, 3, 5]);
        assert_eq!(info.missing_episodes, vec![4]);
    }

    #[test]
    fn non_video_files_are_ignored_for_video_count() {
        let files = names(&["S01E01.mkv", "S01E02.mkv", "S01E02.nfo", "cover.jpg"]);
        let info = analyze("Show.S01", &files);
        assert_eq!(info.video_file_count, 2);
    }

    #[test]
    fn season_detected_from_directory_name_variants() {
        assert_eq!(detect_season("Show/Season 3", &[]), Some(3));
        assert_eq!(detect_season("Show/S04", &[]), Some(4));
    }
}
