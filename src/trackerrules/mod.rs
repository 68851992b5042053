//! Tracker rule registry: a static table mapping an announce URL to a
//! maximum piece exponent, size-banded recommended exponents, a maximum
//! metainfo byte size, and a default source tag. Immutable after
//! process start, looked up by substring/host match.

use std::sync::OnceLock;

/// One entry in the tracker rule registry.
#[derive(Debug, Clone)]
pub struct TrackerRule {
    /// Substrings/host fragments used to recognize this tracker in an
    /// announce URL.
    pub url_patterns: Vec<&'static str>,
    /// Inclusive upper bound on the piece-length exponent.
    pub max_piece_exp: u32,
    /// Ordered `(max_total_size, recommended_exp)` bands, strictly
    /// ascending in `max_total_size`.
    pub size_bands: Vec<(u64, u32)>,
    /// Hard cap on the serialized `.torrent` size, if any.
    pub max_metainfo_bytes: Option<u64>,
    /// Source tag applied when the user specified none.
    pub default_source: Option<&'static str>,
}

impl TrackerRule {
    /// The recommended exponent for `total_size`, from the first band
    /// whose `max_total_size` is `>= total_size`.
    pub fn recommended_exp(&self, total_size: u64) -> Option<u32> {
        self.size_bands
            .iter()
            .find(|(max_size, _)| *max_size >= total_size)
            .map(|(_, exp)| *exp)
    }

    fn matches(&self, url: &str) -> bool {
        let lower = url.to_ascii_lowercase();
        self.url_patterns
            .iter()
            .any(|pattern| lower.contains(&pattern.to_ascii_lowercase()))
    }
}

fn registry() -> &'static Vec<TrackerRule> {
    static REGISTRY: OnceLock<Vec<TrackerRule>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        vec![
            // A private tracker archetype with a conservative piece cap
            // and size-banded recommendations.
            TrackerRule {
                url_patterns: vec!["trackera.example"],
                max_piece_exp: 23,
                size_bands: vec![
                    (1 << 30, 19),
                    (2 << 30, 20),
                    (4 << 30, 21),
                    (8 << 30, 22),
                    (u64::MAX, 23),
                ],
                max_metainfo_bytes: Some(1_000_000),
                default_source: Some("TRACKERA"),
            },
            // A tracker archetype with a very small metainfo size cap,
            // used to exercise the re-hash-until-it-fits loop.
            TrackerRule {
                url_patterns: vec!["microtracker.example"],
                max_piece_exp: 24,
                size_bands: Vec::new(),
                max_metainfo_bytes: Some(2_000),
                default_source: Some("MICRO"),
            },
            // A generous public tracker archetype: high piece cap, no
            // size bands, no metainfo size cap.
            TrackerRule {
                url_patterns: vec!["publictracker.example"],
                max_piece_exp: 26,
                size_bands: Vec::new(),
                max_metainfo_bytes: None,
                default_source: None,
            },
        ]
    })
}

/// Look up the rule matching `url`, if any. Unrecognized URLs carry no
/// constraints and return `None`.
pub fn lookup(url: &str) -> Option<&'static TrackerRule> {
    registry().iter().find(|rule| rule.matches(url))
}

pub fn max_piece_exp(url: &str) -> Option<u32> {
    lookup(url).map(|rule| rule.max_piece_exp)
}

pub fn recommended_exp(url: &str, total_size: u64) -> Option<u32> {
    lookup(url).and_then(|rule| rule.recommended_exp(total_size))
}

pub fn max_metainfo_bytes(url: &str) -> Option<u64> {
    lookup(url).and_then(|rule| rule.max_metainfo_bytes)
}

pub fn default_source(url: &str) -> Option<&'static str> {
    lookup(url).and_then(|rule| rule.default_source)
}
