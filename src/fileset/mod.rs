//! File enumeration: walks a path, applies include/exclude and
//! hard-ignored patterns, and emits an ordered file list with cumulative
//! byte offsets.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Directory names that are always ignored, regardless of include/exclude
/// configuration, wherever they occur as a path segment.
const RESERVED_DIR_NAMES: &[&str] = &["@eadir"];

/// Basename suffixes that are always ignored, case-insensitively.
const RESERVED_SUFFIXES: &[&str] = &[
    ".torrent",
    ".ds_store",
    "thumbs.db",
    "desktop.ini",
    "zone.identifier",
];

/// One regular file selected for inclusion in a torrent.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Filesystem path usable for reading (symlinks dereferenced on open).
    pub path: PathBuf,
    /// Byte length.
    pub length: u64,
    /// Cumulative byte offset in the concatenation of all included files,
    /// in traversal order.
    pub offset: u64,
    /// Path components relative to the base directory, forward-slash
    /// semantics, used only in the info dictionary.
    pub relative_path_components: Vec<String>,
}

impl FileEntry {
    /// `relative_path_components` joined with `/`, used for sort order
    /// and for matching against the expected-file table in the verifier.
    pub fn relative_path(&self) -> String {
        self.relative_path_components.join("/")
    }
}

/// Walk `root` and produce the ordered file list. `include`/`exclude` are
/// each a list of option values, where a single value may itself contain
/// a comma-separated list of glob patterns.
pub fn enumerate(root: &Path, include: &[String], exclude: &[String]) -> Result<Vec<FileEntry>> {
    let root_meta = std::fs::symlink_metadata(root).map_err(|e| Error::io(root, e))?;

    let walk_root: PathBuf = if root_meta.file_type().is_symlink() {
        std::fs::canonicalize(root).map_err(|e| Error::io(root, e))?
    } else {
        root.to_path_buf()
    };

    let walk_root_meta = std::fs::metadata(&walk_root).map_err(|e| Error::io(&walk_root, e))?;

    if walk_root_meta.is_file() {
        let name = walk_root
            .file_name()
            .ok_or_else(|| Error::InvalidInput(format!("cannot determine basename of {walk_root:?}")))?
            .to_string_lossy()
            .into_owned();
        return Ok(vec![FileEntry {
            path: walk_root.clone(),
            length: walk_root_meta.len(),
            offset: 0,
            relative_path_components: vec![name],
        }]);
    }

    let include_set = compile_patterns(include)?;
    let exclude_set = compile_patterns(exclude)?;

    let mut entries = Vec::new();
    for result in WalkDir::new(&walk_root).follow_links(false) {
        let entry = result.map_err(|e| {
            Error::io(
                e.path().unwrap_or(&walk_root).to_path_buf(),
                std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
            )
        })?;
        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }
        let path = entry.path();

        // A nested directory symlink is skipped (only the root symlink
        // is followed); a file symlink is dereferenced for reading.
        let meta = if file_type.is_symlink() {
            match std::fs::metadata(path) {
                Ok(meta) if meta.is_file() => meta,
                _ => continue,
            }
        } else {
            entry
                .metadata()
                .map_err(|e| Error::io(path, std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?
        };

        let rel = path
            .strip_prefix(&walk_root)
            .expect("walkdir entries are rooted at walk_root");
        let components: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();

        if is_ignored(&components, &include_set, &exclude_set)? {
            continue;
        }

        entries.push(FileEntry {
            path: path.to_path_buf(),
            length: meta.len(),
            offset: 0,
            relative_path_components: components,
        });
    }

    entries.sort_by(|a, b| a.relative_path().cmp(&b.relative_path()));

    let mut offset = 0u64;
    for entry in &mut entries {
        entry.offset = offset;
        offset += entry.length;
    }

    Ok(entries)
}

fn is_ignored(components: &[String], include: &Option<GlobSet>, exclude: &Option<GlobSet>) -> Result<bool> {
    for segment in components {
        let lower = segment.to_ascii_lowercase();
        if RESERVED_DIR_NAMES.iter().any(|reserved| lower == *reserved) {
            return Ok(true);
        }
    }

    let basename = components
        .last()
        .expect("a file entry always has at least one path component")
        .to_ascii_lowercase();
    if RESERVED_SUFFIXES.iter().any(|suffix| basename.ends_with(suffix)) {
        return Ok(true);
    }

    if let Some(include) = include {
        return Ok(!include.is_match(&basename));
    }

    if let Some(exclude) = exclude {
        return Ok(exclude.is_match(&basename));
    }

    Ok(false)
}

fn compile_patterns(values: &[String]) -> Result<Option<GlobSet>> {
    let patterns: Vec<&str> = values
        .iter()
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in &patterns {
        let glob = Glob::new(&pattern.to_ascii_lowercase()).map_err(|e| Error::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map(Some)
        .map_err(|e| Error::InvalidPattern {
            pattern: patterns.join(","),
            reason: e.to_string(),
        })
}
