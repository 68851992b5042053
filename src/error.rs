//! Crate-wide error taxonomy.
//!
//! Each variant names the offending path, URL, exponent, or pattern so
//! callers (the CLI in particular) can render an actionable message
//! without re-deriving context from a generic string.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("path not found or unreadable: {path}")]
    PathNotFound { path: PathBuf },

    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("invalid piece length exponent {exp} (expected between {min} and {max})")]
    InvalidPieceLength { exp: u32, min: u32, max: u32 },

    #[error("config invalid: {0}")]
    ConfigInvalid(String),

    #[error("tracker {url:?} permits piece exponent <= {max_exp}, got {requested}")]
    TrackerExponentExceeded {
        url: String,
        max_exp: u32,
        requested: u32,
    },

    #[error(
        "cannot fit metainfo for tracker {url:?} under {limit} bytes (reached exponent {reached_exp})"
    )]
    MetainfoTooLarge {
        url: String,
        limit: u64,
        reached_exp: u32,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    IoPlain(#[from] std::io::Error),

    #[error("bencode decode error: {0}")]
    BencodeDecode(String),

    #[error("bencode encode error: {0}")]
    BencodeEncode(String),

    #[error("invalid metainfo: {0}")]
    InvalidMetainfo(String),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("verification found problems: {bad} bad piece(s), {missing} missing file(s)")]
    VerificationFailure { bad: usize, missing: usize },

    #[error("operation canceled")]
    Canceled,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
