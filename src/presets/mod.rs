//! Preset configuration: a versioned YAML document of named option
//! bundles (spec §6 "Preset configuration"), merged defaults → preset
//! → caller override.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

const SUPPORTED_VERSION: u32 = 1;

/// Whether a list-valued option should append to the lower layer's
/// list or replace it outright when merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListMergeMode {
    #[default]
    Replace,
    Append,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PresetOptions {
    pub trackers: Option<Vec<String>>,
    pub webseeds: Option<Vec<String>>,
    pub private: Option<bool>,
    pub no_date: Option<bool>,
    pub no_creator: Option<bool>,
    pub skip_prefix: Option<bool>,
    pub entropy: Option<bool>,
    pub comment: Option<String>,
    pub source: Option<String>,
    pub piece_length: Option<u32>,
    pub max_piece_length: Option<u32>,
    pub exclude_patterns: Option<Vec<String>>,
    pub include_patterns: Option<Vec<String>>,
    pub output_dir: Option<PathBuf>,
}

impl PresetOptions {
    /// Apply `override_opts` on top of `self` (the lower layer).
    /// Scalars: `Some` in the override wins. Lists named in
    /// `append_lists` are concatenated instead of replaced.
    pub fn merge(&self, override_opts: &PresetOptions, append_lists: &[&str]) -> PresetOptions {
        PresetOptions {
            trackers: merge_list(&self.trackers, &override_opts.trackers, append_lists.contains(&"trackers")),
            webseeds: merge_list(&self.webseeds, &override_opts.webseeds, append_lists.contains(&"webseeds")),
            private: override_opts.private.or(self.private),
            no_date: override_opts.no_date.or(self.no_date),
            no_creator: override_opts.no_creator.or(self.no_creator),
            skip_prefix: override_opts.skip_prefix.or(self.skip_prefix),
            entropy: override_opts.entropy.or(self.entropy),
            comment: override_opts.comment.clone().or_else(|| self.comment.clone()),
            source: override_opts.source.clone().or_else(|| self.source.clone()),
            piece_length: override_opts.piece_length.or(self.piece_length),
            max_piece_length: override_opts.max_piece_length.or(self.max_piece_length),
            exclude_patterns: merge_list(
                &self.exclude_patterns,
                &override_opts.exclude_patterns,
                append_lists.contains(&"exclude_patterns"),
            ),
            include_patterns: merge_list(
                &self.include_patterns,
                &override_opts.include_patterns,
                append_lists.contains(&"include_patterns"),
            ),
            output_dir: override_opts.output_dir.clone().or_else(|| self.output_dir.clone()),
        }
    }
}

fn merge_list(base: &Option<Vec<String>>, over: &Option<Vec<String>>, append: bool) -> Option<Vec<String>> {
    match (base, over) {
        (_, None) => base.clone(),
        (None, Some(o)) => Some(o.clone()),
        (Some(b), Some(o)) if append => {
            let mut combined = b.clone();
            combined.extend(o.iter().cloned());
            Some(combined)
        }
        (Some(_), Some(o)) => Some(o.clone()),
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PresetFile {
    pub version: u32,
    #[serde(default)]
    pub default: Option<PresetOptions>,
    #[serde(default)]
    pub presets: BTreeMap<String, PresetOptions>,
}

impl PresetFile {
    pub fn parse(data: &str) -> Result<Self> {
        let file: PresetFile =
            serde_yaml::from_str(data).map_err(|e| Error::ConfigInvalid(e.to_string()))?;
        if file.version != SUPPORTED_VERSION {
            return Err(Error::ConfigInvalid(format!(
                "unsupported preset file version {} (expected {SUPPORTED_VERSION})",
                file.version
            )));
        }
        Ok(file)
    }

    /// Resolve `name`'s effective options: the file's `default` block
    /// merged with the named preset (preset fields win).
    pub fn resolve(&self, name: &str) -> Result<PresetOptions> {
        let preset = self
            .presets
            .get(name)
            .ok_or_else(|| Error::InvalidInput(format!("unknown preset {name:?}")))?;
        match &self.default {
            Some(default) => Ok(default.merge(preset, &["exclude_patterns", "include_patterns"])),
            None => Ok(preset.clone()),
        }
    }
}

/// Search order for an unqualified preset file reference: explicit
/// path, `./presets.yaml`, `$HOME/.config/<prog>/presets.yaml`,
/// `$HOME/.<prog>/presets.yaml`.
pub fn search_paths(explicit: Option<&Path>, program_name: &str) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(path) = explicit {
        candidates.push(path.to_path_buf());
    }
    candidates.push(PathBuf::from("presets.yaml"));
    if let Some(home) = std::env::var_os("HOME") {
        let home = PathBuf::from(home);
        candidates.push(home.join(".config").join(program_name).join("presets.yaml"));
        candidates.push(home.join(format!(".{program_name}")).join("presets.yaml"));
    }
    candidates
}

pub fn load_from_search_path(explicit: Option<&Path>, program_name: &str) -> Result<Option<(PathBuf, PresetFile)>> {
    for candidate in search_paths(explicit, program_name) {
        if candidate.is_file() {
            let data = std::fs::read_to_string(&candidate).map_err(|e| Error::io(&candidate, e))?;
            return Ok(Some((candidate, PresetFile::parse(&data)?)));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version: 1
default:
  no_date: true
  trackers: ["http://default.example/announce"]
presets:
  private-pack:
    private: true
    source: "PRIVATE"
    trackers: ["http://tracker.example/announce"]
  public-pack:
    skip_prefix: true
"#;

    #[test]
    fn parses_and_resolves_named_preset() {
        let file = PresetFile::parse(SAMPLE).unwrap();
        let resolved = file.resolve("private-pack").unwrap();
        assert_eq!(resolved.private, Some(true));
        assert_eq!(resolved.source.as_deref(), Some("PRIVATE"));
        assert_eq!(resolved.no_date, Some(true));
        assert_eq!(resolved.trackers, Some(vec!["http://tracker.example/announce".to_string()]));
    }

    #[test]
    fn unset_fields_fall_back_to_default() {
        let file = PresetFile::parse(SAMPLE).unwrap();
        let resolved = file.resolve("public-pack").unwrap();
        assert_eq!(resolved.skip_prefix, Some(true));
        assert_eq!(resolved.no_date, Some(true));
        assert_eq!(resolved.trackers, Some(vec!["http://default.example/announce".to_string()]));
    }

    #[test]
    fn unknown_preset_name_is_an_error() {
        let file = PresetFile::parse(SAMPLE).unwrap();
        assert!(file.resolve("does-not-exist").is_err());
    }

    #[test]
    fn wrong_version_is_rejected() {
        let data = "version: 2\npresets: {}\n";
        assert!(PresetFile::parse(data).is_err());
    }

    #[test]
    fn caller_override_replaces_list_by_default() {
        let base = PresetOptions {
            trackers: Some(vec!["a".into()]),
            ..Default::default()
        };
        let over = PresetOptions {
            trackers: Some(vec!["b".into()]),
            ..Default::default()
        };
        let merged = base.merge(&over, &[]);
        assert_eq!(merged.trackers, Some(vec!["b".to_string()]));
    }

    #[test]
    fn append_mode_concatenates_lists() {
        let base = PresetOptions {
            exclude_patterns: Some(vec!["*.nfo".into()]),
            ..Default::default()
        };
        let over = PresetOptions {
            exclude_patterns: Some(vec!["*.jpg".into()]),
            ..Default::default()
        };
        let merged = base.merge(&over, &["exclude_patterns"]);
        assert_eq!(merged.exclude_patterns, Some(vec!["*.nfo".to_string(), "*.jpg".to_string()]));
    }
}
