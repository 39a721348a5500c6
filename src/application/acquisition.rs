//! Acquisition Pipeline
//!
//! Resolves the newest database revision, preferring configured mirrors
//! over the origin, and installs it into the live handle.

use crate::application::live_database::LiveDatabase;
use crate::domain::entities::DatabaseVersion;
use crate::domain::errors::{AcquireError, MirrorError};
use crate::domain::ports::{
    edition_key, FetchOutcome, Metadata, MirrorStore, OriginFetcher, META_DOWNLOAD_TIME,
    META_EDITION, META_ETAG,
};
use chrono::Utc;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

/// Outcome of one acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquisition {
    /// The installed version (if any) is still current.
    Unchanged,
    /// A new version was staged and is ready to install.
    Updated(DatabaseVersion),
}

impl Acquisition {
    pub fn did_change(&self) -> bool {
        matches!(self, Self::Updated(_))
    }
}

enum MirrorLookup {
    Absent,
    Current,
    Fetched(DatabaseVersion),
}

/// Mirror-then-origin database acquisition.
pub struct AcquisitionPipeline {
    origin: Arc<dyn OriginFetcher>,
    mirrors: Vec<Arc<dyn MirrorStore>>,
    work_dir: PathBuf,
}

impl AcquisitionPipeline {
    /// Mirrors are consulted in order; an empty list means no mirror tier.
    pub fn new(
        origin: Arc<dyn OriginFetcher>,
        mirrors: Vec<Arc<dyn MirrorStore>>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            origin,
            mirrors,
            work_dir: work_dir.into(),
        }
    }

    pub fn edition(&self) -> &str {
        self.origin.edition()
    }

    fn mirror_key(&self) -> String {
        edition_key(self.edition())
    }

    /// Find a revision newer than `current`.
    ///
    /// Mirror failures fall through to the origin. Origin failures are
    /// returned. Nothing is installed or written back by this call.
    pub async fn acquire(
        &self,
        current: Option<&DatabaseVersion>,
    ) -> Result<Acquisition, AcquireError> {
        if let Some(acquisition) = self.acquire_from_mirrors(current).await {
            return Ok(acquisition);
        }
        Ok(match self.acquire_from_origin(current).await? {
            Some(version) => Acquisition::Updated(version),
            None => Acquisition::Unchanged,
        })
    }

    /// `None` when no mirror could answer.
    async fn acquire_from_mirrors(&self, current: Option<&DatabaseVersion>) -> Option<Acquisition> {
        for mirror in &self.mirrors {
            match self.check_mirror(mirror.as_ref(), current).await {
                Ok(MirrorLookup::Absent) => continue,
                Ok(MirrorLookup::Current) => return Some(Acquisition::Unchanged),
                Ok(MirrorLookup::Fetched(version)) => return Some(Acquisition::Updated(version)),
                Err(e) => {
                    tracing::warn!(
                        "mirror {} unavailable, falling back to origin: {}",
                        mirror.name(),
                        e
                    );
                }
            }
        }
        None
    }

    /// `None` when the origin reports `current` is still the latest.
    async fn acquire_from_origin(
        &self,
        current: Option<&DatabaseVersion>,
    ) -> Result<Option<DatabaseVersion>, AcquireError> {
        let current_etag = current.map(|v| v.entity_tag.as_str()).unwrap_or("");
        match self.origin.fetch(current_etag).await? {
            FetchOutcome::NotModified => Ok(None),
            FetchOutcome::Fetched(version) => Ok(Some(version)),
        }
    }

    async fn check_mirror(
        &self,
        mirror: &dyn MirrorStore,
        current: Option<&DatabaseVersion>,
    ) -> Result<MirrorLookup, MirrorError> {
        let key = self.mirror_key();
        if !mirror.exists(&key).await? {
            tracing::debug!("mirror {} has no {}", mirror.name(), key);
            return Ok(MirrorLookup::Absent);
        }

        let metadata = mirror.get_metadata(&key).await?;
        let etag = metadata.get(META_ETAG).cloned().unwrap_or_default();
        if let Some(current) = current {
            if !etag.is_empty() && etag == current.entity_tag {
                tracing::info!("mirror {} matches installed etag {}", mirror.name(), etag);
                return Ok(MirrorLookup::Current);
            }
        }

        let modified_at = match mirror.last_modified(&key).await {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!("no last-modified time from mirror {}: {}", mirror.name(), e);
                Utc::now()
            }
        };
        let path = self.download_from_mirror(mirror, &key).await?;
        tracing::info!(
            "downloaded {} from mirror {} (etag {}) to {}",
            key,
            mirror.name(),
            etag,
            path.display()
        );
        Ok(MirrorLookup::Fetched(DatabaseVersion::new(
            etag,
            modified_at,
            path,
        )))
    }

    /// Stream a mirror object into a fresh staged file. The staged file is
    /// removed if the copy fails.
    async fn download_from_mirror(
        &self,
        mirror: &dyn MirrorStore,
        key: &str,
    ) -> Result<PathBuf, MirrorError> {
        let mut reader = mirror.download(key).await?;
        let (file, temp_path) = tempfile::Builder::new()
            .prefix(self.edition())
            .suffix(".mmdb")
            .tempfile_in(&self.work_dir)?
            .into_parts();
        let mut file = tokio::fs::File::from_std(file);
        tokio::io::copy(&mut reader, &mut file).await?;
        file.sync_all().await?;
        drop(file);
        temp_path.keep().map_err(|e| MirrorError::Io(e.error))
    }

    /// Best-effort upload of a freshly fetched database to every mirror.
    async fn write_back(&self, version: &DatabaseVersion) {
        if self.mirrors.is_empty() {
            return;
        }
        let key = self.mirror_key();
        let mut metadata = Metadata::new();
        metadata.insert(META_ETAG.to_string(), version.entity_tag.clone());
        metadata.insert(META_EDITION.to_string(), self.edition().to_string());
        metadata.insert(META_DOWNLOAD_TIME.to_string(), Utc::now().to_rfc3339());

        for mirror in &self.mirrors {
            match mirror
                .upload_with_metadata(&key, &version.local_path, metadata.clone())
                .await
            {
                Ok(()) => tracing::info!(
                    "uploaded {} to mirror {} (etag {})",
                    key,
                    mirror.name(),
                    version.entity_tag
                ),
                Err(e) => tracing::warn!("failed to upload {} to mirror {}: {}", key, mirror.name(), e),
            }
        }
    }

    /// Acquire and, if a new revision was found, install it.
    ///
    /// A mirror copy that fails to open counts as a mirror failure and the
    /// origin is asked instead. An origin revision is written back to the
    /// mirrors only once it has been installed.
    ///
    /// Returns whether the live database changed. Fails with `NoVersion`
    /// when nothing is installed and no revision could be found.
    pub async fn renew(&self, live: &Arc<LiveDatabase>) -> Result<bool, AcquireError> {
        let current = live.version();
        match self.acquire_from_mirrors(current.as_ref()).await {
            Some(Acquisition::Unchanged) if current.is_some() => return Ok(false),
            Some(Acquisition::Updated(version)) => match install(live, version).await {
                Ok(()) => return Ok(true),
                Err(e @ AcquireError::DecodeOpen { .. }) => {
                    tracing::warn!("mirror copy failed to open, falling back to origin: {}", e);
                }
                Err(e) => return Err(e),
            },
            _ => {}
        }

        let Some(version) = self.acquire_from_origin(current.as_ref()).await? else {
            return match current {
                Some(_) => Ok(false),
                None => Err(AcquireError::NoVersion),
            };
        };
        install(live, version.clone()).await?;
        self.write_back(&version).await;
        Ok(true)
    }
}

async fn install(live: &Arc<LiveDatabase>, version: DatabaseVersion) -> Result<(), AcquireError> {
    let live = live.clone();
    tokio::task::spawn_blocking(move || live.install(version))
        .await
        .map_err(|e| AcquireError::Io(io::Error::new(io::ErrorKind::Other, e)))?
}
