//! Batch orchestrator: runs up to `B` creation jobs concurrently over a
//! thread pool, collecting per-job results without letting one job's
//! failure cancel the others.

use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::metainfo::{self, CreateOptions};

const SUPPORTED_VERSION: u32 = 1;
pub const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchJob {
    pub output: PathBuf,
    pub path: PathBuf,
    pub name: Option<String>,
    #[serde(default)]
    pub trackers: Vec<String>,
    #[serde(default)]
    pub webseeds: Vec<String>,
    pub private: Option<bool>,
    pub piece_length: Option<u32>,
    pub max_piece_length: Option<u32>,
    pub comment: Option<String>,
    pub source: Option<String>,
    pub no_date: Option<bool>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    #[serde(default)]
    pub include_patterns: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchConfig {
    pub version: u32,
    pub jobs: Vec<BatchJob>,
}

impl BatchConfig {
    pub fn parse(data: &str) -> Result<Self> {
        let config: BatchConfig =
            serde_yaml::from_str(data).map_err(|e| Error::ConfigInvalid(e.to_string()))?;
        if config.version != SUPPORTED_VERSION {
            return Err(Error::ConfigInvalid(format!(
                "unsupported batch file version {} (expected {SUPPORTED_VERSION})",
                config.version
            )));
        }
        for job in &config.jobs {
            if let Some(exp) = job.piece_length {
                if !(16..=27).contains(&exp) {
                    return Err(Error::InvalidPieceLength { exp, min: 16, max: 27 });
                }
            }
        }
        Ok(config)
    }
}

impl BatchJob {
    fn to_create_options(&self) -> CreateOptions {
        CreateOptions {
            name: self.name.clone(),
            trackers: self.trackers.clone(),
            webseeds: self.webseeds.clone(),
            private: self.private.unwrap_or(false),
            source: self.source.clone(),
            entropy: false,
            comment: self.comment.clone(),
            no_creator: false,
            no_date: self.no_date.unwrap_or(false),
            piece_length_exp: self.piece_length,
            max_piece_length_exp: self.max_piece_length,
            include_patterns: self.include_patterns.clone(),
            exclude_patterns: self.exclude_patterns.clone(),
            skip_prefix: false,
            output_path: Some(self.output.clone()),
            workers: None,
            progress: None,
            cancel: None,
        }
    }
}

#[derive(Debug)]
pub struct JobResult {
    pub index: usize,
    pub output: PathBuf,
    pub success: bool,
    pub info_hash: Option<[u8; 20]>,
    pub error: Option<String>,
}

/// Run every job in `config`, at most `concurrency` at a time. Jobs are
/// independent; one job's failure is recorded on its own result and
/// never cancels the others. Results are returned in job order,
/// regardless of completion order.
pub fn run_batch(config: &BatchConfig, concurrency: usize) -> Vec<JobResult> {
    let concurrency = concurrency.max(1).min(config.jobs.len().max(1));
    let jobs = Arc::new(config.jobs.clone());

    let (job_tx, job_rx) = mpsc::channel::<usize>();
    let job_rx = Arc::new(std::sync::Mutex::new(job_rx));
    let (result_tx, result_rx) = mpsc::channel::<JobResult>();

    for index in 0..jobs.len() {
        job_tx.send(index).expect("job queue receiver outlives all sends");
    }
    drop(job_tx);

    std::thread::scope(|scope| {
        for _ in 0..concurrency {
            let job_rx = Arc::clone(&job_rx);
            let jobs = Arc::clone(&jobs);
            let result_tx = result_tx.clone();
            scope.spawn(move || loop {
                let index = {
                    let rx = job_rx.lock().expect("job queue mutex poisoned");
                    rx.recv()
                };
                let Ok(index) = index else { break };
                let job = &jobs[index];
                let result = run_one_job(index, job);
                if result_tx.send(result).is_err() {
                    break;
                }
            });
        }
        drop(result_tx);
    });

    let mut results: Vec<JobResult> = result_rx.into_iter().collect();
    results.sort_by_key(|r| r.index);
    results
}

fn run_one_job(index: usize, job: &BatchJob) -> JobResult {
    let opts = job.to_create_options();
    match metainfo::create(&job.path, &opts) {
        Ok(created) => JobResult {
            index,
            output: created.output_path,
            success: true,
            info_hash: Some(created.info_hash),
            error: None,
        },
        Err(e) => JobResult {
            index,
            output: job.output.clone(),
            success: false,
            info_hash: None,
            error: Some(e.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn parses_minimal_batch_config() {
        let data = r#"
version: 1
jobs:
  - output: out1.torrent
    path: content1
  - output: out2.torrent
    path: content2
    piece_length: 20
"#;
        let config = BatchConfig::parse(data).unwrap();
        assert_eq!(config.jobs.len(), 2);
        assert_eq!(config.jobs[1].piece_length, Some(20));
    }

    #[test]
    fn out_of_range_piece_length_is_rejected() {
        let data = r#"
version: 1
jobs:
  - output: out.torrent
    path: content
    piece_length: 40
"#;
        assert!(BatchConfig::parse(data).is_err());
    }

    #[test]
    fn independent_jobs_run_and_one_failure_does_not_cancel_others() {
        let tmp = TempDir::new().unwrap();
        let good_dir = tmp.path().join("good");
        fs::create_dir(&good_dir).unwrap();
        fs::write(good_dir.join("a.txt"), b"hello").unwrap();
        let missing_dir = tmp.path().join("does-not-exist");

        let config = BatchConfig {
            version: 1,
            jobs: vec![
                BatchJob {
                    output: tmp.path().join("good.torrent"),
                    path: good_dir,
                    name: None,
                    trackers: Vec::new(),
                    webseeds: Vec::new(),
                    private: None,
                    piece_length: None,
                    max_piece_length: None,
                    comment: None,
                    source: None,
                    no_date: Some(true),
                    exclude_patterns: Vec::new(),
                    include_patterns: Vec::new(),
                },
                BatchJob {
                    output: tmp.path().join("bad.torrent"),
                    path: missing_dir,
                    name: None,
                    trackers: Vec::new(),
                    webseeds: Vec::new(),
                    private: None,
                    piece_length: None,
                    max_piece_length: None,
                    comment: None,
                    source: None,
                    no_date: Some(true),
                    exclude_patterns: Vec::new(),
                    include_patterns: Vec::new(),
                },
            ],
        };

        let results = run_batch(&config, DEFAULT_CONCURRENCY);
        assert_eq!(results.len(), 2);
        assert!(results[0].success);
        assert!(!results[1].success);
        assert!(results[1].error.is_some());
    }
}
