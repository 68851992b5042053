//! The parallel piece hasher: SHA-1 over every piece across the
//! multi-file offset space, using a bounded worker pool and a buffer
//! pool. This is the hot path of the whole crate.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use sha1::{Digest, Sha1};

use crate::error::{Error, Result};
use crate::fileset::FileEntry;
use crate::progress::{ProgressCallback, ProgressUpdate};

const PROGRESS_INTERVAL: Duration = Duration::from_millis(200);

/// Options controlling worker count, progress reporting, and
/// cooperative cancellation for a single hashing pass.
#[derive(Clone, Default)]
pub struct HashOptions {
    /// Overrides the adaptive worker-count heuristic when set and > 0.
    pub workers: Option<usize>,
    pub progress: Option<ProgressCallback>,
    pub cancel: Option<Arc<AtomicBool>>,
}

/// The outcome of hashing one piece in verify mode: either its digest
/// matched/mismatched the expected value, or it was never read because
/// it fell inside an unreadable byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceStatus {
    Good,
    Bad,
    Missing,
}

pub fn num_pieces(total: u64, piece_len: u64) -> u64 {
    if total == 0 {
        0
    } else {
        (total + piece_len - 1) / piece_len
    }
}

/// Compute every piece's SHA-1 digest. Pure: the same `files`,
/// `piece_len` and `total` always produce the same output bytes,
/// regardless of worker count.
pub fn hash_pieces(
    files: &[FileEntry],
    piece_len: u64,
    total: u64,
    opts: &HashOptions,
) -> Result<Vec<[u8; 20]>> {
    let count = num_pieces(total, piece_len) as usize;
    let mut pieces = vec![[0u8; 20]; count];
    if count == 0 {
        return Ok(pieces);
    }

    let plan = plan_for(files, total, count, opts.workers);
    let pieces_counter = Arc::new(AtomicU64::new(0));
    let bytes_counter = Arc::new(AtomicU64::new(0));
    let pool = Arc::new(BufferPool::new(plan.read_size));

    let result = std::thread::scope(|scope| -> Result<()> {
        let done = AtomicBool::new(false);
        let progress_handle = opts.progress.clone().map(|cb| {
            let pieces_counter = Arc::clone(&pieces_counter);
            let bytes_counter = Arc::clone(&bytes_counter);
            let done = &done;
            scope.spawn(move || {
                run_progress_observer(&pieces_counter, &bytes_counter, count as u64, done, &cb);
            })
        });

        let mut worker_handles = Vec::new();
        let mut remaining: &mut [[u8; 20]] = &mut pieces;
        let mut start_idx = 0usize;
        let mut pieces_left = count;
        let mut workers_left = plan.workers;
        while workers_left > 0 {
            let take = pieces_left.div_ceil(workers_left);
            let (chunk, rest) = remaining.split_at_mut(take);
            remaining = rest;

            let pieces_counter = Arc::clone(&pieces_counter);
            let bytes_counter = Arc::clone(&bytes_counter);
            let pool = Arc::clone(&pool);
            let cancel = opts.cancel.clone();
            let base = start_idx;

            worker_handles.push(scope.spawn(move || -> Result<()> {
                let mut cursor = FileCursor::new(files);
                let mut buf = pool.get();
                let result = hash_range(
                    &mut cursor,
                    chunk,
                    base,
                    piece_len,
                    total,
                    &mut buf,
                    &pieces_counter,
                    &bytes_counter,
                    cancel.as_deref(),
                );
                pool.put(buf);
                result
            }));

            start_idx += take;
            pieces_left -= take;
            workers_left -= 1;
        }

        let mut first_err = None;
        for handle in worker_handles {
            if let Err(e) = handle.join().expect("hasher worker thread panicked") {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }

        done.store(true, Ordering::Relaxed);
        if let Some(handle) = progress_handle {
            handle.join().expect("progress observer thread panicked");
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    });

    result?;
    Ok(pieces)
}

/// Hash (or mark missing) every piece for verification: pieces
/// intersecting `missing_ranges` are never read and are reported as
/// [`PieceStatus::Missing`]; all others are hashed and compared against
/// `expected_pieces` (20 bytes per piece, in piece order).
pub fn hash_pieces_verify(
    files: &[FileEntry],
    piece_len: u64,
    total: u64,
    missing_ranges: &[Range<u64>],
    expected_pieces: &[u8],
    opts: &HashOptions,
) -> Result<Vec<PieceStatus>> {
    let count = num_pieces(total, piece_len) as usize;
    let mut statuses = vec![PieceStatus::Missing; count];
    if count == 0 {
        return Ok(statuses);
    }
    if expected_pieces.len() != count * 20 {
        return Err(Error::InvalidMetainfo(format!(
            "expected {} piece hash bytes, got {}",
            count * 20,
            expected_pieces.len()
        )));
    }

    let plan = plan_for(files, total, count, opts.workers);
    let pieces_counter = Arc::new(AtomicU64::new(0));
    let bytes_counter = Arc::new(AtomicU64::new(0));
    let pool = Arc::new(BufferPool::new(plan.read_size));

    let result = std::thread::scope(|scope| -> Result<()> {
        let done = AtomicBool::new(false);
        let progress_handle = opts.progress.clone().map(|cb| {
            let pieces_counter = Arc::clone(&pieces_counter);
            let bytes_counter = Arc::clone(&bytes_counter);
            let done = &done;
            scope.spawn(move || {
                run_progress_observer(&pieces_counter, &bytes_counter, count as u64, done, &cb);
            })
        });

        let mut worker_handles = Vec::new();
        let mut remaining: &mut [PieceStatus] = &mut statuses;
        let mut start_idx = 0usize;
        let mut pieces_left = count;
        let mut workers_left = plan.workers;
        while workers_left > 0 {
            let take = pieces_left.div_ceil(workers_left);
            let (chunk, rest) = remaining.split_at_mut(take);
            remaining = rest;

            let pieces_counter = Arc::clone(&pieces_counter);
            let bytes_counter = Arc::clone(&bytes_counter);
            let pool = Arc::clone(&pool);
            let cancel = opts.cancel.clone();
            let base = start_idx;

            worker_handles.push(scope.spawn(move || -> Result<()> {
                let mut cursor = FileCursor::new(files);
                let mut buf = pool.get();
                let result = verify_range(
                    &mut cursor,
                    chunk,
                    base,
                    piece_len,
                    total,
                    missing_ranges,
                    expected_pieces,
                    &mut buf,
                    &pieces_counter,
                    &bytes_counter,
                    cancel.as_deref(),
                );
                pool.put(buf);
                result
            }));

            start_idx += take;
            pieces_left -= take;
            workers_left -= 1;
        }

        let mut first_err = None;
        for handle in worker_handles {
            if let Err(e) = handle.join().expect("verify worker thread panicked") {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }

        done.store(true, Ordering::Relaxed);
        if let Some(handle) = progress_handle {
            handle.join().expect("progress observer thread panicked");
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    });

    result?;
    Ok(statuses)
}

#[allow(clippy::too_many_arguments)]
fn hash_range(
    cursor: &mut FileCursor<'_>,
    slots: &mut [[u8; 20]],
    base_idx: usize,
    piece_len: u64,
    total: u64,
    buf: &mut [u8],
    pieces_counter: &AtomicU64,
    bytes_counter: &AtomicU64,
    cancel: Option<&AtomicBool>,
) -> Result<()> {
    for (i, slot) in slots.iter_mut().enumerate() {
        if let Some(cancel) = cancel {
            if cancel.load(Ordering::Relaxed) {
                return Err(Error::Canceled);
            }
        }
        let piece_idx = base_idx + i;
        let piece_off = piece_idx as u64 * piece_len;
        let piece_actual_len = piece_len.min(total - piece_off);
        let mut hasher = Sha1::new();
        cursor.read_range(piece_off, piece_actual_len, buf, &mut hasher, bytes_counter)?;
        *slot = hasher.finalize().into();
        pieces_counter.fetch_add(1, Ordering::Relaxed);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn verify_range(
    cursor: &mut FileCursor<'_>,
    slots: &mut [PieceStatus],
    base_idx: usize,
    piece_len: u64,
    total: u64,
    missing_ranges: &[Range<u64>],
    expected_pieces: &[u8],
    buf: &mut [u8],
    pieces_counter: &AtomicU64,
    bytes_counter: &AtomicU64,
    cancel: Option<&AtomicBool>,
) -> Result<()> {
    for (i, slot) in slots.iter_mut().enumerate() {
        if let Some(cancel) = cancel {
            if cancel.load(Ordering::Relaxed) {
                return Err(Error::Canceled);
            }
        }
        let piece_idx = base_idx + i;
        let piece_off = piece_idx as u64 * piece_len;
        let piece_actual_len = piece_len.min(total - piece_off);
        let piece_end = piece_off + piece_actual_len;

        if overlaps_any(missing_ranges, piece_off, piece_end) {
            *slot = PieceStatus::Missing;
            pieces_counter.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        let mut hasher = Sha1::new();
        cursor.read_range(piece_off, piece_actual_len, buf, &mut hasher, bytes_counter)?;
        let digest: [u8; 20] = hasher.finalize().into();
        let expected = &expected_pieces[piece_idx * 20..piece_idx * 20 + 20];
        *slot = if digest == expected {
            PieceStatus::Good
        } else {
            PieceStatus::Bad
        };
        pieces_counter.fetch_add(1, Ordering::Relaxed);
    }
    Ok(())
}

fn overlaps_any(ranges: &[Range<u64>], start: u64, end: u64) -> bool {
    ranges.iter().any(|r| r.start < end && r.end > start)
}

fn run_progress_observer(
    pieces_counter: &AtomicU64,
    bytes_counter: &AtomicU64,
    total_pieces: u64,
    done: &AtomicBool,
    callback: &ProgressCallback,
) {
    let mut last_sample = Instant::now();
    let mut last_bytes = 0u64;
    loop {
        std::thread::sleep(PROGRESS_INTERVAL);
        let now = Instant::now();
        let bytes_now = bytes_counter.load(Ordering::Relaxed);
        let elapsed = now.duration_since(last_sample).as_secs_f64().max(0.001);
        let rate = ((bytes_now.saturating_sub(last_bytes)) as f64 / elapsed) as u64;
        callback(ProgressUpdate {
            pieces_done: pieces_counter.load(Ordering::Relaxed),
            pieces_total: total_pieces,
            bytes_per_sec: rate,
        });
        last_sample = now;
        last_bytes = bytes_now;
        if done.load(Ordering::Relaxed) {
            break;
        }
    }
}

/// Per-worker scratch state: a monotonic cursor into `files` and a small
/// cache of open file handles (each with its last-known read position,
/// to avoid redundant seeks). Not shared across workers.
struct FileCursor<'a> {
    files: &'a [FileEntry],
    idx: usize,
    handles: std::collections::HashMap<PathBuf, (File, u64)>,
}

impl<'a> FileCursor<'a> {
    fn new(files: &'a [FileEntry]) -> Self {
        FileCursor {
            files,
            idx: 0,
            handles: std::collections::HashMap::new(),
        }
    }

    fn locate(&mut self, offset: u64) -> usize {
        while self.idx + 1 < self.files.len()
            && self.files[self.idx].offset + self.files[self.idx].length <= offset
        {
            self.idx += 1;
        }
        self.idx
    }

    fn handle_for(&mut self, path: &Path) -> Result<&mut (File, u64)> {
        if !self.handles.contains_key(path) {
            let file = File::open(path).map_err(|e| Error::io(path.to_path_buf(), e))?;
            self.handles.insert(path.to_path_buf(), (file, 0));
        }
        Ok(self.handles.get_mut(path).unwrap())
    }

    /// Hash `len` bytes starting at global byte `offset` into `hasher`,
    /// reading in `buf`-sized chunks, crossing file boundaries as
    /// needed.
    fn read_range(
        &mut self,
        mut offset: u64,
        mut len: u64,
        buf: &mut [u8],
        hasher: &mut Sha1,
        bytes_counter: &AtomicU64,
    ) -> Result<()> {
        while len > 0 {
            let fi = self.locate(offset);
            let entry = &self.files[fi];
            let file_offset = entry.offset;
            let file_length = entry.length;
            let file_path = entry.path.clone();

            let local_offset = offset - file_offset;
            let avail = file_length - local_offset;
            let chunk_len = avail.min(len).min(buf.len() as u64) as usize;

            let (file, pos) = self.handle_for(&file_path)?;
            let target = file_offset + local_offset;
            if *pos != target {
                file.seek(SeekFrom::Start(target))
                    .map_err(|e| Error::io(file_path.clone(), e))?;
            }
            let chunk = &mut buf[..chunk_len];
            file.read_exact(chunk)
                .map_err(|e| Error::io(file_path.clone(), e))?;
            *pos = target + chunk_len as u64;

            hasher.update(&chunk[..chunk_len]);
            bytes_counter.fetch_add(chunk_len as u64, Ordering::Relaxed);

            offset += chunk_len as u64;
            len -= chunk_len as u64;
        }
        Ok(())
    }
}

struct BufferPool {
    buffers: Mutex<Vec<Vec<u8>>>,
    size: usize,
}

impl BufferPool {
    fn new(size: usize) -> Self {
        BufferPool {
            buffers: Mutex::new(Vec::new()),
            size,
        }
    }

    fn get(&self) -> Vec<u8> {
        let mut guard = self.buffers.lock().unwrap();
        guard.pop().unwrap_or_else(|| vec![0u8; self.size])
    }

    fn put(&self, buf: Vec<u8>) {
        self.buffers.lock().unwrap().push(buf);
    }
}

struct Plan {
    read_size: usize,
    workers: usize,
}

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * 1024 * 1024;

fn plan_for(files: &[FileEntry], total: u64, count: usize, user_workers: Option<usize>) -> Plan {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);

    let (read_size, workers) = if files.len() <= 1 {
        if total < MIB {
            (64 * KIB as usize, 1)
        } else if total < GIB {
            (2 * MIB as usize, cpus.max(2))
        } else {
            (8 * MIB as usize, cpus * 2)
        }
    } else {
        let avg = total / files.len().max(1) as u64;
        if avg < MIB {
            (256 * KIB as usize, cpus.min(8))
        } else if avg < 10 * MIB {
            (MIB as usize, cpus.min(4))
        } else if avg < GIB {
            (4 * MIB as usize, cpus * 2)
        } else {
            (8 * MIB as usize, cpus * 2)
        }
    };

    let mut workers = user_workers.filter(|w| *w > 0).unwrap_or(workers);
    workers = workers.clamp(1, count.max(1));
    Plan { read_size, workers }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn entry(path: PathBuf, offset: u64, length: u64) -> FileEntry {
        FileEntry {
            path,
            length,
            offset,
            relative_path_components: vec!["f".to_string()],
        }
    }

    fn expected_sha1(data: &[u8]) -> [u8; 20] {
        let mut hasher = Sha1::new();
        hasher.update(data);
        hasher.finalize().into()
    }

    #[test]
    fn single_piece_matches_direct_sha1() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.bin");
        let content = b"This is the actual content of the file.";
        fs::write(&path, content).unwrap();

        let files = vec![entry(path, 0, content.len() as u64)];
        let pieces = hash_pieces(&files, 1 << 16, content.len() as u64, &HashOptions::default())
            .unwrap();

        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0], expected_sha1(content));
    }

    #[test]
    fn piece_spans_multiple_files() {
        let tmp = TempDir::new().unwrap();
        let p1 = tmp.path().join("1.bin");
        let p2 = tmp.path().join("2.bin");
        fs::write(&p1, b"abcde").unwrap();
        fs::write(&p2, b"fghij").unwrap();

        let files = vec![entry(p1, 0, 5), entry(p2, 5, 5)];
        let piece_len = 4u64;
        let total = 10u64;
        let pieces = hash_pieces(&files, piece_len, total, &HashOptions::default()).unwrap();

        let all = b"abcdefghij";
        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[0], expected_sha1(&all[0..4]));
        assert_eq!(pieces[1], expected_sha1(&all[4..8]));
        assert_eq!(pieces[2], expected_sha1(&all[8..10]));
    }

    #[test]
    fn deterministic_across_worker_counts() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("big.bin");
        let content: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &content).unwrap();
        let files = vec![entry(path, 0, content.len() as u64)];

        let mut opts1 = HashOptions::default();
        opts1.workers = Some(1);
        let mut opts4 = HashOptions::default();
        opts4.workers = Some(4);

        let pieces1 = hash_pieces(&files, 256, content.len() as u64, &opts1).unwrap();
        let pieces4 = hash_pieces(&files, 256, content.len() as u64, &opts4).unwrap();
        assert_eq!(pieces1, pieces4);
    }

    #[test]
    fn empty_total_has_no_pieces() {
        assert_eq!(
            hash_pieces(&[], 1 << 16, 0, &HashOptions::default()).unwrap(),
            Vec::<[u8; 20]>::new()
        );
    }

    #[test]
    fn verify_marks_missing_ranges_without_reading() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.bin");
        let content = b"0123456789abcdef";
        fs::write(&path, content).unwrap();
        let files = vec![entry(path, 0, content.len() as u64)];
        let piece_len = 4u64;
        let total = content.len() as u64;

        let mut expected = Vec::new();
        for chunk in content.chunks(4) {
            expected.extend_from_slice(&expected_sha1(chunk));
        }

        let missing = vec![4..8]; // second piece
        let statuses = hash_pieces_verify(
            &files,
            piece_len,
            total,
            &missing,
            &expected,
            &HashOptions::default(),
        )
        .unwrap();

        assert_eq!(
            statuses,
            vec![
                PieceStatus::Good,
                PieceStatus::Missing,
                PieceStatus::Good,
                PieceStatus::Good,
            ]
        );
    }

    #[test]
    fn verify_detects_bad_piece() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.bin");
        let content = b"aaaa";
        fs::write(&path, content).unwrap();
        let files = vec![entry(path, 0, content.len() as u64)];
        let wrong_expected = vec![0u8; 20];

        let statuses = hash_pieces_verify(
            &files,
            4,
            4,
            &[],
            &wrong_expected,
            &HashOptions::default(),
        )
        .unwrap();
        assert_eq!(statuses, vec![PieceStatus::Bad]);
    }

    #[test]
    fn cancellation_stops_before_completion() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.bin");
        fs::write(&path, vec![0u8; 4096]).unwrap();
        let files = vec![entry(path, 0, 4096)];
        let cancel = Arc::new(AtomicBool::new(true));
        let mut opts = HashOptions::default();
        opts.cancel = Some(cancel);
        let result = hash_pieces(&files, 16, 4096, &opts);
        assert!(matches!(result, Err(Error::Canceled)));
    }
}
