//! The verifier: reconciles an on-disk content path against an existing
//! torrent's expected file table, then re-hashes only the pieces that
//! are actually readable.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::error::Result;
use crate::fileset::FileEntry;
use crate::hash::{self, HashOptions, PieceStatus};
use crate::metainfo::DecodedMetaInfo;
use crate::progress::ProgressCallback;

#[derive(Debug, Default, Clone)]
pub struct VerifyOptions {
    pub workers: Option<usize>,
    pub progress: Option<ProgressCallback>,
    pub cancel: Option<Arc<AtomicBool>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MismatchedFile {
    pub relative_path: String,
    pub expected_length: u64,
    pub actual_length: u64,
}

#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub total_pieces: u64,
    pub good_pieces: u64,
    pub bad_pieces: u64,
    pub missing_pieces: u64,
    pub bad_piece_indices: Vec<u64>,
    pub missing_files: Vec<String>,
    pub mismatched_files: Vec<MismatchedFile>,
    pub completion_percent: f64,
}

impl VerifyReport {
    /// Whether the CLI should treat this as a failing run: any bad
    /// piece, or any file entirely absent.
    pub fn has_problems(&self) -> bool {
        self.bad_pieces > 0 || !self.missing_files.is_empty()
    }
}

/// Verify `content_path` against the decoded `torrent_data`.
pub fn verify(torrent_data: &[u8], content_path: &Path, opts: &VerifyOptions) -> Result<VerifyReport> {
    let decoded = DecodedMetaInfo::load(torrent_data)?;
    let name = decoded.name()?;
    let piece_length = decoded.piece_length()?;
    let expected_pieces = decoded.pieces()?.to_vec();
    let is_single_file = decoded.single_file_length()?.is_some();

    let expected_files: Vec<(String, u64)> = if let Some(len) = decoded.single_file_length()? {
        vec![(name.clone(), len)]
    } else {
        decoded.expected_files()?
    };
    let total: u64 = expected_files.iter().map(|(_, len)| len).sum();

    let mut present_files = Vec::new();
    let mut missing_ranges = Vec::new();
    let mut missing_files = Vec::new();
    let mut mismatched_files = Vec::new();
    let mut offset = 0u64;

    for (rel_path, expected_len) in &expected_files {
        let resolved = resolve_content_path(content_path, is_single_file, &name, rel_path);
        match std::fs::metadata(&resolved) {
            Ok(meta) if meta.is_file() && meta.len() == *expected_len => {
                present_files.push(FileEntry {
                    path: resolved,
                    length: *expected_len,
                    offset,
                    relative_path_components: rel_path.split('/').map(String::from).collect(),
                });
            }
            Ok(meta) if meta.is_file() => {
                mismatched_files.push(MismatchedFile {
                    relative_path: rel_path.clone(),
                    expected_length: *expected_len,
                    actual_length: meta.len(),
                });
                missing_ranges.push(offset..offset + expected_len);
            }
            _ => {
                missing_files.push(rel_path.clone());
                missing_ranges.push(offset..offset + expected_len);
            }
        }
        offset += expected_len;
    }

    let hash_opts = HashOptions {
        workers: opts.workers,
        progress: opts.progress.clone(),
        cancel: opts.cancel.clone(),
    };

    let statuses = hash::hash_pieces_verify(
        &present_files,
        piece_length,
        total,
        &missing_ranges,
        &expected_pieces,
        &hash_opts,
    )?;

    let mut bad_piece_indices = Vec::new();
    let (mut good, mut bad, mut missing) = (0u64, 0u64, 0u64);
    for (i, status) in statuses.iter().enumerate() {
        match status {
            PieceStatus::Good => good += 1,
            PieceStatus::Bad => {
                bad += 1;
                bad_piece_indices.push(i as u64);
            }
            PieceStatus::Missing => missing += 1,
        }
    }

    let total_pieces = statuses.len() as u64;
    let checkable = total_pieces - missing;
    let completion_percent = if checkable > 0 {
        (good as f64 / checkable as f64) * 100.0
    } else {
        0.0
    };

    Ok(VerifyReport {
        total_pieces,
        good_pieces: good,
        bad_pieces: bad,
        missing_pieces: missing,
        bad_piece_indices,
        missing_files,
        mismatched_files,
        completion_percent,
    })
}

fn resolve_content_path(content_path: &Path, is_single_file: bool, name: &str, rel_path: &str) -> PathBuf {
    if is_single_file {
        if content_path.is_dir() {
            content_path.join(name)
        } else {
            content_path.to_path_buf()
        }
    } else {
        content_path.join(rel_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metainfo::{create, CreateOptions};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn verifying_unchanged_tree_is_fully_good() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), b"hello").unwrap();
        fs::write(tmp.path().join("b.txt"), b"world!!").unwrap();
        let result = create(tmp.path(), &CreateOptions::default()).unwrap();

        let report = verify(&result.bytes, tmp.path(), &VerifyOptions::default()).unwrap();
        assert_eq!(report.bad_pieces, 0);
        assert_eq!(report.missing_pieces, 0);
        assert_eq!(report.good_pieces, report.total_pieces);
        assert_eq!(report.completion_percent, 100.0);
        assert!(!report.has_problems());
    }

    #[test]
    fn missing_file_is_reported_and_lowers_completion_not_integrity() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), vec![b'a'; 100_000]).unwrap();
        fs::write(tmp.path().join("b.txt"), vec![b'b'; 100_000]).unwrap();
        let mut opts = CreateOptions::default();
        opts.piece_length_exp = Some(16);
        let result = create(tmp.path(), &opts).unwrap();

        fs::remove_file(tmp.path().join("b.txt")).unwrap();
        let report = verify(&result.bytes, tmp.path(), &VerifyOptions::default()).unwrap();

        assert_eq!(report.missing_files, vec!["b.txt".to_string()]);
        assert_eq!(report.bad_pieces, 0);
        assert!(report.missing_pieces > 0);
        assert!(report.has_problems());
    }

    #[test]
    fn truncated_file_is_a_size_mismatch_not_a_bad_piece() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), vec![b'a'; 100_000]).unwrap();
        let mut opts = CreateOptions::default();
        opts.piece_length_exp = Some(16);
        let result = create(tmp.path(), &opts).unwrap();

        fs::write(tmp.path().join("a.txt"), vec![b'a'; 50_000]).unwrap();
        let report = verify(&result.bytes, tmp.path(), &VerifyOptions::default()).unwrap();

        assert_eq!(report.mismatched_files.len(), 1);
        assert_eq!(report.mismatched_files[0].relative_path, "a.txt");
        assert_eq!(report.bad_pieces, 0);
        assert!(report.missing_pieces > 0);
    }

    #[test]
    fn corrupted_byte_yields_bad_piece() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), vec![b'a'; 100_000]).unwrap();
        let mut opts = CreateOptions::default();
        opts.piece_length_exp = Some(16);
        let result = create(tmp.path(), &opts).unwrap();

        let mut content = fs::read(tmp.path().join("a.txt")).unwrap();
        content[0] = b'z';
        fs::write(tmp.path().join("a.txt"), content).unwrap();

        let report = verify(&result.bytes, tmp.path(), &VerifyOptions::default()).unwrap();
        assert_eq!(report.bad_pieces, 1);
        assert_eq!(report.missing_pieces, 0);
        assert!(report.has_problems());
    }

    #[test]
    fn single_file_torrent_against_directory_content_path() {
        let tmp = TempDir::new().unwrap();
        let file_path = tmp.path().join("solo.bin");
        fs::write(&file_path, b"solo content").unwrap();
        let result = create(&file_path, &CreateOptions::default()).unwrap();

        let report = verify(&result.bytes, tmp.path(), &VerifyOptions::default()).unwrap();
        assert_eq!(report.good_pieces, report.total_pieces);
        assert_eq!(report.completion_percent, 100.0);
    }
}
