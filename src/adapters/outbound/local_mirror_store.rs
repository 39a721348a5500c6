//! Local Mirror Store
//!
//! Implements MirrorStore on a directory, e.g. a volume shared between
//! instances.
//!
//! Each upload stages its object under a unique `<key>.blob-*` name. The
//! `<key>.meta.json` sidecar holds the metadata plus the name of the blob it
//! describes, and replacing the sidecar is the single commit point: readers
//! always see an object together with its own etag, whatever the number of
//! concurrent writers.

use crate::domain::errors::MirrorError;
use crate::domain::ports::{prefixed_key, Metadata, MirrorReader, MirrorStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

const BLOB_MARKER: &str = ".blob-";

/// Uncommitted or superseded blobs older than this are swept after an upload.
const ORPHAN_GRACE: Duration = Duration::from_secs(600);

/// Content of `<key>.meta.json`.
#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    /// File name of the committed blob, in the sidecar's directory
    object: String,
    metadata: Metadata,
}

/// Directory-backed mirror store.
#[derive(Debug, Clone)]
pub struct LocalMirrorStore {
    root: PathBuf,
    prefix: Option<String>,
}

impl LocalMirrorStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>, prefix: Option<String>) -> io::Result<Self> {
        let root = root.into();
        // Sync is fine here; only happens once at startup
        std::fs::create_dir_all(&root)?;
        Ok(Self { root, prefix })
    }

    /// Directory holding the sidecar and blobs of `key`, plus the key's file name.
    fn location(&self, key: &str) -> (PathBuf, String) {
        let path = self.root.join(prefixed_key(self.prefix.as_deref(), key));
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| key.to_string());
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());
        (dir, name)
    }

    fn map_io_error(err: io::Error, key: &str) -> MirrorError {
        if err.kind() == io::ErrorKind::NotFound {
            MirrorError::NotFound(key.to_string())
        } else {
            MirrorError::Io(err)
        }
    }

    async fn read_sidecar(&self, key: &str) -> Result<(PathBuf, Sidecar), MirrorError> {
        let (dir, name) = self.location(key);
        let data = fs::read(sidecar_path(&dir, &name))
            .await
            .map_err(|e| Self::map_io_error(e, key))?;
        let sidecar = parse_sidecar(&data)?;
        Ok((dir, sidecar))
    }

    async fn blob_path(&self, key: &str) -> Result<PathBuf, MirrorError> {
        let (dir, sidecar) = self.read_sidecar(key).await?;
        Ok(dir.join(sidecar.object))
    }
}

fn sidecar_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.meta.json", name))
}

fn parse_sidecar(data: &[u8]) -> Result<Sidecar, MirrorError> {
    let sidecar: Sidecar =
        serde_json::from_slice(data).map_err(|e| MirrorError::Backend(e.to_string()))?;
    // The blob must sit beside the sidecar
    if Path::new(&sidecar.object).file_name() != Some(sidecar.object.as_ref()) {
        return Err(MirrorError::Backend(format!(
            "invalid object name in sidecar: {:?}",
            sidecar.object
        )));
    }
    Ok(sidecar)
}

fn current_object(dir: &Path, name: &str) -> Option<String> {
    let data = std::fs::read(sidecar_path(dir, name)).ok()?;
    parse_sidecar(&data).ok().map(|s| s.object)
}

/// Blocking part of an upload: stage the blob, then commit the sidecar.
fn commit_upload(
    dir: &Path,
    name: &str,
    source: &Path,
    metadata: Metadata,
) -> Result<(), MirrorError> {
    std::fs::create_dir_all(dir)?;

    let mut blob = tempfile::Builder::new()
        .prefix(&format!("{}{}", name, BLOB_MARKER))
        .tempfile_in(dir)?;
    io::copy(&mut std::fs::File::open(source)?, blob.as_file_mut())?;
    blob.as_file().sync_all()?;
    let object = blob
        .path()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| MirrorError::Backend("staged blob has no file name".to_string()))?;

    let data = serde_json::to_vec_pretty(&Sidecar {
        object: object.clone(),
        metadata,
    })
    .map_err(|e| MirrorError::Backend(e.to_string()))?;
    let mut staged_sidecar = tempfile::Builder::new().prefix(".meta-").tempfile_in(dir)?;
    io::Write::write_all(staged_sidecar.as_file_mut(), &data)?;
    staged_sidecar.as_file().sync_all()?;

    // Any error above drops `blob`, which removes it
    let (_, blob_path) = blob.keep().map_err(|e| MirrorError::Io(e.error))?;
    let previous = current_object(dir, name);
    if let Err(e) = staged_sidecar.persist(sidecar_path(dir, name)) {
        let _ = std::fs::remove_file(&blob_path);
        return Err(MirrorError::Io(e.error));
    }

    if let Some(previous) = previous.filter(|p| *p != object) {
        remove_blob(&dir.join(previous));
    }
    sweep_orphans(dir, name);
    Ok(())
}

fn remove_blob(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!("removed superseded mirror blob {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("failed to remove mirror blob {}: {}", path.display(), e),
    }
}

/// Remove blobs left behind by racing or failed writers.
fn sweep_orphans(dir: &Path, name: &str) {
    let current = current_object(dir, name);
    let marker = format!("{}{}", name, BLOB_MARKER);
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("failed to list mirror directory {}: {}", dir.display(), e);
            return;
        }
    };

    for entry in entries.flatten() {
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if !file_name.starts_with(&marker) || current.as_deref() == Some(file_name.as_str()) {
            continue;
        }
        let stale = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.elapsed().ok())
            .is_some_and(|age| age > ORPHAN_GRACE);
        if stale {
            remove_blob(&entry.path());
        }
    }
}

#[async_trait]
impl MirrorStore for LocalMirrorStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn exists(&self, key: &str) -> Result<bool, MirrorError> {
        match self.blob_path(key).await {
            Ok(path) => Ok(fs::try_exists(path).await?),
            Err(MirrorError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn get_metadata(&self, key: &str) -> Result<Metadata, MirrorError> {
        let (_, sidecar) = self.read_sidecar(key).await?;
        Ok(sidecar.metadata)
    }

    async fn download(&self, key: &str) -> Result<MirrorReader, MirrorError> {
        let file = fs::File::open(self.blob_path(key).await?)
            .await
            .map_err(|e| Self::map_io_error(e, key))?;
        Ok(Box::pin(file))
    }

    async fn upload_with_metadata(
        &self,
        key: &str,
        source: &Path,
        metadata: Metadata,
    ) -> Result<(), MirrorError> {
        let (dir, name) = self.location(key);
        let source = source.to_path_buf();
        tokio::task::spawn_blocking(move || commit_upload(&dir, &name, &source, metadata))
            .await
            .map_err(|e| MirrorError::Backend(e.to_string()))?
    }

    async fn last_modified(&self, key: &str) -> Result<DateTime<Utc>, MirrorError> {
        let metadata = fs::metadata(self.blob_path(key).await?)
            .await
            .map_err(|e| Self::map_io_error(e, key))?;
        Ok(DateTime::<Utc>::from(metadata.modified()?))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::domain::ports::{META_EDITION, META_ETAG};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    fn source_file(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn metadata(etag: &str) -> Metadata {
        let mut m = Metadata::new();
        m.insert(META_ETAG.to_string(), etag.to_string());
        m.insert(META_EDITION.to_string(), "GeoLite2-City".to_string());
        m
    }

    async fn read_object(store: &LocalMirrorStore, key: &str) -> Vec<u8> {
        let mut reader = store.download(key).await.unwrap();
        let mut content = Vec::new();
        reader.read_to_end(&mut content).await.unwrap();
        content
    }

    fn blobs(dir: &Path, name: &str) -> Vec<String> {
        let marker = format!("{}{}", name, BLOB_MARKER);
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with(&marker))
            .collect()
    }

    #[tokio::test]
    async fn test_missing_object() {
        let root = TempDir::new().unwrap();
        let store = LocalMirrorStore::new(root.path(), None).unwrap();

        assert!(!store.exists("GeoLite2-City.mmdb").await.unwrap());
        assert!(matches!(
            store.get_metadata("GeoLite2-City.mmdb").await,
            Err(MirrorError::NotFound(_))
        ));
        assert!(matches!(
            store.download("GeoLite2-City.mmdb").await,
            Err(MirrorError::NotFound(_))
        ));
        assert!(matches!(
            store.last_modified("GeoLite2-City.mmdb").await,
            Err(MirrorError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_upload_then_download() {
        let root = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let store = LocalMirrorStore::new(root.path(), None).unwrap();
        let source = source_file(&scratch, "source.mmdb", b"database bytes");

        store
            .upload_with_metadata("GeoLite2-City.mmdb", &source, metadata("\"v1\""))
            .await
            .unwrap();

        assert!(store.exists("GeoLite2-City.mmdb").await.unwrap());
        let meta = store.get_metadata("GeoLite2-City.mmdb").await.unwrap();
        assert_eq!(meta.get(META_ETAG).map(String::as_str), Some("\"v1\""));
        assert_eq!(read_object(&store, "GeoLite2-City.mmdb").await, b"database bytes");

        let modified = store.last_modified("GeoLite2-City.mmdb").await.unwrap();
        assert!(modified <= Utc::now());
    }

    #[tokio::test]
    async fn test_upload_overwrites_and_removes_superseded_blob() {
        let root = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let store = LocalMirrorStore::new(root.path(), None).unwrap();

        let first = source_file(&scratch, "first.mmdb", b"first");
        store
            .upload_with_metadata("k.mmdb", &first, metadata("a"))
            .await
            .unwrap();
        let second = source_file(&scratch, "second.mmdb", b"second");
        store
            .upload_with_metadata("k.mmdb", &second, metadata("b"))
            .await
            .unwrap();

        let meta = store.get_metadata("k.mmdb").await.unwrap();
        assert_eq!(meta.get(META_ETAG).map(String::as_str), Some("b"));
        assert_eq!(read_object(&store, "k.mmdb").await, b"second");
        assert_eq!(blobs(root.path(), "k.mmdb").len(), 1);
    }

    #[tokio::test]
    async fn test_prefix_places_objects_in_subdirectory() {
        let root = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let store = LocalMirrorStore::new(root.path(), Some("geoip/".to_string())).unwrap();
        let source = source_file(&scratch, "source.mmdb", b"x");

        store
            .upload_with_metadata("GeoLite2-City.mmdb", &source, metadata("t"))
            .await
            .unwrap();

        let dir = root.path().join("geoip");
        assert!(dir.join("GeoLite2-City.mmdb.meta.json").exists());
        assert_eq!(blobs(&dir, "GeoLite2-City.mmdb").len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_metadata_is_backend_error() {
        let root = TempDir::new().unwrap();
        let store = LocalMirrorStore::new(root.path(), None).unwrap();
        std::fs::write(root.path().join("k.mmdb.meta.json"), b"{not json").unwrap();

        assert!(matches!(
            store.get_metadata("k.mmdb").await,
            Err(MirrorError::Backend(_))
        ));
        assert!(matches!(
            store.exists("k.mmdb").await,
            Err(MirrorError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn test_sidecar_cannot_point_outside_directory() {
        let root = TempDir::new().unwrap();
        let store = LocalMirrorStore::new(root.path(), None).unwrap();
        std::fs::write(
            root.path().join("k.mmdb.meta.json"),
            br#"{"object": "../../etc/passwd", "metadata": {}}"#,
        )
        .unwrap();

        assert!(matches!(
            store.download("k.mmdb").await,
            Err(MirrorError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn test_dangling_sidecar_is_not_found() {
        let root = TempDir::new().unwrap();
        let store = LocalMirrorStore::new(root.path(), None).unwrap();
        std::fs::write(
            root.path().join("k.mmdb.meta.json"),
            br#"{"object": "k.mmdb.blob-gone", "metadata": {"etag": "x"}}"#,
        )
        .unwrap();

        assert!(!store.exists("k.mmdb").await.unwrap());
        assert!(matches!(
            store.download("k.mmdb").await,
            Err(MirrorError::NotFound(_))
        ));
    }

    #[test]
    fn test_sweep_keeps_fresh_blobs() {
        let root = TempDir::new().unwrap();
        std::fs::write(root.path().join("k.mmdb.blob-inflight"), b"x").unwrap();

        sweep_orphans(root.path(), "k.mmdb");

        assert!(root.path().join("k.mmdb.blob-inflight").exists());
    }

    // ===== Concurrent Writer Tests =====

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_never_mix_object_and_etag() {
        let root = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let large = source_file(&scratch, "a.mmdb", &vec![b'A'; 4 << 20]);
        let small = source_file(&scratch, "b.mmdb", &vec![b'B'; 2 << 20]);

        // Two instances sharing one mirror directory
        let first = Arc::new(LocalMirrorStore::new(root.path(), None).unwrap());
        let second = Arc::new(LocalMirrorStore::new(root.path(), None).unwrap());

        for _ in 0..20 {
            let a = {
                let store = first.clone();
                let source = large.clone();
                tokio::spawn(async move {
                    store
                        .upload_with_metadata("k.mmdb", &source, metadata("A"))
                        .await
                })
            };
            let b = {
                let store = second.clone();
                let source = small.clone();
                tokio::spawn(async move {
                    store
                        .upload_with_metadata("k.mmdb", &source, metadata("B"))
                        .await
                })
            };
            a.await.unwrap().unwrap();
            b.await.unwrap().unwrap();

            let etag = first.get_metadata("k.mmdb").await.unwrap()[META_ETAG].clone();
            let content = read_object(&first, "k.mmdb").await;
            match etag.as_str() {
                "A" => assert!(content.len() == 4 << 20 && content.iter().all(|b| *b == b'A')),
                "B" => assert!(content.len() == 2 << 20 && content.iter().all(|b| *b == b'B')),
                other => panic!("unexpected etag {}", other),
            }
        }
    }
}
