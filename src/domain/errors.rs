//! Domain Errors
//!
//! Failure taxonomy for database acquisition, mirror access, response
//! caching and lookups. A not-modified origin reply is not an error; it is
//! reported as [`FetchOutcome::NotModified`](crate::domain::ports::FetchOutcome).

use std::io;
use std::path::PathBuf;

/// Errors raised while acquiring or installing a database.
///
/// After the first successful load these are logged by the renewal task and
/// the previously installed database stays in service.
#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    #[error("origin responded with status {status}")]
    Fetch { status: u16 },

    #[error("origin request failed: {0}")]
    Transport(String),

    #[error("malformed database archive: {0}")]
    Extract(#[source] io::Error),

    #[error("{filename} not found in archive")]
    NotFound { filename: String },

    #[error("failed to open database {path}: {reason}")]
    DecodeOpen { path: PathBuf, reason: String },

    #[error("no database version available")]
    NoVersion,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Errors raised by a mirror store. Never fatal: the origin is the fallback.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("mirror backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Errors raised by the response cache. Degrades to serving uncached.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("failed to serialize cached value: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Errors surfaced to lookup callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("invalid IP address: {0:?}")]
    BadInput(String),

    #[error("address not found in database: {0}")]
    NotFound(String),

    #[error("no database installed")]
    NoDatabase,

    #[error("database decode error: {0}")]
    Decode(String),
}

/// Errors raised by external address detection.
#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("invalid address from {url}: {body:?}")]
    InvalidAddress { url: String, body: String },

    #[error("no address detected by {0} detector(s)")]
    NoneDetected(usize),
}
