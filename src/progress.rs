//! Progress callback shared by the hasher and the verifier.
//!
//! Kept deliberately generic (pieces completed, total pieces, bytes
//! hashed per second) so the core stays pure and testable; terminal
//! rendering is the caller's problem.

use std::sync::Arc;

pub type ProgressCallback = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

#[derive(Debug, Clone, Copy)]
pub struct ProgressUpdate {
    pub pieces_done: u64,
    pub pieces_total: u64,
    pub bytes_per_sec: u64,
}
