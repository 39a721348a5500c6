//! Origin Fetcher Port
//!
//! Defines the interface for conditionally downloading the database
//! from its upstream publisher.

use crate::domain::entities::DatabaseVersion;
use crate::domain::errors::AcquireError;
use async_trait::async_trait;

/// Result of a conditional fetch against the origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// New content was downloaded and staged at `version.local_path`.
    Fetched(DatabaseVersion),
    /// The origin confirmed the presented entity tag is still current.
    NotModified,
}

/// Conditional downloader for the upstream database archive.
///
/// This is an outbound port; the MaxMind download service is the
/// production implementation.
#[async_trait]
pub trait OriginFetcher: Send + Sync {
    /// Edition identifier this fetcher downloads (e.g. `GeoLite2-City`).
    fn edition(&self) -> &str;

    /// Fetch the database, presenting `previous_etag` as a validator when
    /// it is non-empty. No local state changes on `NotModified` or error.
    async fn fetch(&self, previous_etag: &str) -> Result<FetchOutcome, AcquireError>;
}
