//! MaxMind Origin Fetcher
//!
//! Implements OriginFetcher against the MaxMind download service:
//! a conditional GET returning a `.tar.gz` archive.

use crate::adapters::outbound::maxmind_archive::{database_filename, extract_database};
use crate::domain::entities::DatabaseVersion;
use crate::domain::errors::AcquireError;
use crate::domain::ports::{FetchOutcome, OriginFetcher};
use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use reqwest::StatusCode;
use std::io;
use std::path::PathBuf;
use tokio_util::io::{StreamReader, SyncIoBridge};

/// Default MaxMind download endpoint.
pub const DEFAULT_ORIGIN_URL: &str = "https://download.maxmind.com/app/geoip_download";

/// Downloads one edition of a MaxMind database.
pub struct MaxMindOriginFetcher {
    client: reqwest::Client,
    base_url: String,
    edition: String,
    license_key: String,
    work_dir: PathBuf,
}

impl MaxMindOriginFetcher {
    /// Create a fetcher staging downloads under `work_dir`.
    pub fn new(
        base_url: impl Into<String>,
        edition: impl Into<String>,
        license_key: impl Into<String>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            edition: edition.into(),
            license_key: license_key.into(),
            work_dir: work_dir.into(),
        }
    }
}

#[async_trait]
impl OriginFetcher for MaxMindOriginFetcher {
    fn edition(&self) -> &str {
        &self.edition
    }

    async fn fetch(&self, previous_etag: &str) -> Result<FetchOutcome, AcquireError> {
        let mut request = self.client.get(&self.base_url).query(&[
            ("edition_id", self.edition.as_str()),
            ("license_key", self.license_key.as_str()),
            ("suffix", "tar.gz"),
        ]);
        if !previous_etag.is_empty() {
            request = request.header(IF_NONE_MATCH, previous_etag);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AcquireError::Transport(e.without_url().to_string()))?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_MODIFIED => {
                tracing::info!("not modified: {} => {}", self.edition, previous_etag);
                return Ok(FetchOutcome::NotModified);
            }
            status => {
                tracing::error!("failed to download {}: {}", self.edition, status);
                return Err(AcquireError::Fetch {
                    status: status.as_u16(),
                });
            }
        }

        let entity_tag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        // gzip/tar decoding is blocking; bridge the body stream into it
        let body = Box::pin(
            response
                .bytes_stream()
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e)),
        );
        let reader = SyncIoBridge::new(StreamReader::new(body));
        let filename = database_filename(&self.edition);
        let work_dir = self.work_dir.clone();

        let extracted = tokio::task::spawn_blocking(move || {
            extract_database(reader, &filename, &work_dir)
        })
        .await
        .map_err(|e| AcquireError::Io(io::Error::new(io::ErrorKind::Other, e)))??;

        tracing::info!(
            "downloaded {} => {} (etag {})",
            self.edition,
            extracted.path.display(),
            entity_tag
        );

        Ok(FetchOutcome::Fetched(DatabaseVersion::new(
            entity_tag,
            extracted.modified_at,
            extracted.path,
        )))
    }
}
