//! Mirror Store Port
//!
//! Defines the interface of the optional object-storage tier that can
//! satisfy an acquisition without contacting the origin.

use crate::domain::errors::MirrorError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::pin::Pin;
use tokio::io::AsyncRead;

/// Object metadata (user-defined key/value pairs).
pub type Metadata = HashMap<String, String>;

/// Streaming body of a mirrored object.
pub type MirrorReader = Pin<Box<dyn AsyncRead + Send>>;

pub const META_ETAG: &str = "etag";
pub const META_EDITION: &str = "edition";
pub const META_DOWNLOAD_TIME: &str = "download_time";

/// Object key for an edition: one logical object per edition.
pub fn edition_key(edition: &str) -> String {
    format!("{}.mmdb", edition)
}

/// Combine an optional key prefix with an object key.
pub fn prefixed_key(prefix: Option<&str>, key: &str) -> String {
    match prefix {
        Some(p) if !p.is_empty() => format!("{}/{}", p.trim_end_matches('/'), key),
        _ => key.to_string(),
    }
}

/// Secondary storage tier for database blobs.
///
/// This is an outbound port. Zero or more implementations may be configured;
/// "no mirror" behaves exactly like a mirror that holds nothing.
#[async_trait]
pub trait MirrorStore: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Check whether an object exists.
    async fn exists(&self, key: &str) -> Result<bool, MirrorError>;

    /// Read the user metadata attached to an object.
    async fn get_metadata(&self, key: &str) -> Result<Metadata, MirrorError>;

    /// Open a stream over the object's content.
    async fn download(&self, key: &str) -> Result<MirrorReader, MirrorError>;

    /// Store the content of `source` under `key`, replacing any previous
    /// object, with the given metadata.
    async fn upload_with_metadata(
        &self,
        key: &str,
        source: &Path,
        metadata: Metadata,
    ) -> Result<(), MirrorError>;

    /// Last modification time of an object.
    async fn last_modified(&self, key: &str) -> Result<DateTime<Utc>, MirrorError>;
}
