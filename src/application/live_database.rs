//! Live Database Handle
//!
//! Holds the database currently in service and swaps in new versions
//! without pausing lookups.
//!
//! The active database is an immutable [`DatabaseSnapshot`] behind an
//! atomically swapped pointer. A lookup loads the pointer once and keeps its
//! own `Arc` for the whole read, so a concurrent install can never close the
//! decoder or delete the file underneath it: both are released by the
//! snapshot's `Drop`, which runs when the last in-flight reader finishes.

use crate::domain::entities::{CityResult, CountryResult, DatabaseVersion, QueryKind, QueryResult};
use crate::domain::errors::{AcquireError, LookupError};
use crate::domain::ports::{DecoderOpener, GeoDecoder};
use arc_swap::ArcSwapOption;
use std::io;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

/// An opened decoder together with the version that produced it.
pub struct DatabaseSnapshot {
    decoder: Arc<dyn GeoDecoder>,
    version: DatabaseVersion,
}

impl DatabaseSnapshot {
    pub fn version(&self) -> &DatabaseVersion {
        &self.version
    }

    /// Look up `ip`, stamping the result with this snapshot's modification time.
    pub fn query(&self, kind: QueryKind, ip: IpAddr) -> Result<QueryResult, LookupError> {
        let updated_at = self.version.modified_at;
        let result = match kind {
            QueryKind::City => QueryResult::City(CityResult {
                ip: ip.to_string(),
                updated_at,
                record: self.decoder.city(ip)?,
            }),
            QueryKind::Country => QueryResult::Country(CountryResult {
                ip: ip.to_string(),
                updated_at,
                record: self.decoder.country(ip)?,
            }),
        };
        Ok(result)
    }
}

impl Drop for DatabaseSnapshot {
    fn drop(&mut self) {
        remove_database_file(&self.version.local_path);
    }
}

fn remove_database_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::info!("deleted database file {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("failed to delete database file {}: {}", path.display(), e),
    }
}

/// The currently active database, replaceable at runtime.
pub struct LiveDatabase {
    opener: Arc<dyn DecoderOpener>,
    current: ArcSwapOption<DatabaseSnapshot>,
}

impl LiveDatabase {
    /// Create an empty handle; lookups fail with `NoDatabase` until the
    /// first install.
    pub fn new(opener: Arc<dyn DecoderOpener>) -> Self {
        Self {
            opener,
            current: ArcSwapOption::empty(),
        }
    }

    /// The snapshot in service right now.
    pub fn snapshot(&self) -> Option<Arc<DatabaseSnapshot>> {
        self.current.load_full()
    }

    pub fn version(&self) -> Option<DatabaseVersion> {
        self.current.load_full().map(|s| s.version.clone())
    }

    pub fn is_installed(&self) -> bool {
        self.current.load().is_some()
    }

    /// Open `version` and put it in service.
    ///
    /// Opening happens before the swap; if it fails the installed database
    /// is untouched, the rejected staged file is removed and the error is
    /// returned. Blocking: call from `spawn_blocking` in async contexts.
    pub fn install(&self, version: DatabaseVersion) -> Result<(), AcquireError> {
        let decoder = match self.opener.open(&version.local_path) {
            Ok(decoder) => decoder,
            Err(e) => {
                tracing::warn!("failed to open {}: {}", version.local_path.display(), e);
                let in_service = self
                    .current
                    .load_full()
                    .is_some_and(|s| s.version.local_path == version.local_path);
                if !in_service {
                    remove_database_file(&version.local_path);
                }
                return Err(e);
            }
        };

        tracing::info!(
            "installing database {} (etag {}, modified {})",
            version.local_path.display(),
            version.entity_tag,
            version.modified_at
        );
        let previous = self
            .current
            .swap(Some(Arc::new(DatabaseSnapshot { decoder, version })));

        if let Some(previous) = previous {
            tracing::info!(
                "superseded database {} (etag {})",
                previous.version.local_path.display(),
                previous.version.entity_tag
            );
            // Released here, or by the last in-flight lookup still holding it
            drop(previous);
        }
        Ok(())
    }

    /// Look up `ip` against the database in service.
    pub fn query(&self, kind: QueryKind, ip: IpAddr) -> Result<QueryResult, LookupError> {
        let snapshot = self.current.load_full().ok_or(LookupError::NoDatabase)?;
        snapshot.query(kind, ip)
    }

    /// Take the database out of service. Its file is deleted once no
    /// lookup holds it any more.
    pub fn close(&self) {
        if let Some(previous) = self.current.swap(None) {
            tracing::info!(
                "closing database {}",
                previous.version.local_path.display()
            );
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::application::test_support::{staged_version, timestamp, write_database, TextOpener};
    use tempfile::TempDir;

    fn live() -> (Arc<TextOpener>, LiveDatabase) {
        let opener = Arc::new(TextOpener::default());
        let live = LiveDatabase::new(opener.clone());
        (opener, live)
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn country_of(result: &QueryResult) -> Option<String> {
        match result {
            QueryResult::Country(c) => c.record.country.as_ref()?.iso_code.clone(),
            QueryResult::City(c) => c.record.country.as_ref()?.iso_code.clone(),
        }
    }

    // ===== Empty Handle Tests =====

    #[test]
    fn test_query_before_install() {
        let (_, live) = live();
        assert!(!live.is_installed());
        assert!(live.version().is_none());
        assert_eq!(
            live.query(QueryKind::City, ip("8.8.8.8")),
            Err(LookupError::NoDatabase)
        );
    }

    // ===== Install Tests =====

    #[test]
    fn test_install_and_query() {
        let dir = TempDir::new().unwrap();
        let (_, live) = live();
        let version = staged_version(dir.path(), "a.mmdb", "US", "\"a\"", 1);

        live.install(version.clone()).unwrap();

        assert_eq!(live.version(), Some(version));
        let result = live.query(QueryKind::Country, ip("8.8.8.8")).unwrap();
        assert_eq!(result.kind(), QueryKind::Country);
        assert_eq!(result.ip(), "8.8.8.8");
        assert_eq!(result.updated_at(), timestamp(1));
        assert_eq!(country_of(&result).as_deref(), Some("US"));
    }

    #[test]
    fn test_city_query() {
        let dir = TempDir::new().unwrap();
        let (_, live) = live();
        live.install(staged_version(dir.path(), "a.mmdb", "DE", "a", 1))
            .unwrap();

        let result = live.query(QueryKind::City, ip("2001:db8::1")).unwrap();
        match result {
            QueryResult::City(city) => {
                assert_eq!(city.ip, "2001:db8::1");
                assert!(city.record.city.is_some());
            }
            other => panic!("expected city result, got {:?}", other),
        }
    }

    #[test]
    fn test_query_address_not_covered() {
        let dir = TempDir::new().unwrap();
        let (_, live) = live();
        live.install(staged_version(dir.path(), "a.mmdb", "US", "a", 1))
            .unwrap();

        assert_eq!(
            live.query(QueryKind::City, ip("10.1.2.3")),
            Err(LookupError::NotFound("10.1.2.3".to_string()))
        );
    }

    #[test]
    fn test_install_replaces_and_deletes_previous_file() {
        let dir = TempDir::new().unwrap();
        let (_, live) = live();
        let first = staged_version(dir.path(), "first.mmdb", "US", "a", 1);
        let second = staged_version(dir.path(), "second.mmdb", "FR", "b", 2);

        live.install(first.clone()).unwrap();
        live.install(second.clone()).unwrap();

        assert!(!first.local_path.exists());
        assert!(second.local_path.exists());
        let result = live.query(QueryKind::Country, ip("1.1.1.1")).unwrap();
        assert_eq!(result.updated_at(), timestamp(2));
        assert_eq!(country_of(&result).as_deref(), Some("FR"));
    }

    #[test]
    fn test_superseded_file_kept_while_snapshot_held() {
        let dir = TempDir::new().unwrap();
        let (_, live) = live();
        let first = staged_version(dir.path(), "first.mmdb", "US", "a", 1);
        live.install(first.clone()).unwrap();

        let held = live.snapshot().unwrap();
        live.install(staged_version(dir.path(), "second.mmdb", "FR", "b", 2))
            .unwrap();

        // The old snapshot still answers and its file still exists
        assert!(first.local_path.exists());
        let result = held.query(QueryKind::Country, ip("1.1.1.1")).unwrap();
        assert_eq!(result.updated_at(), timestamp(1));

        drop(held);
        assert!(!first.local_path.exists());
    }

    #[test]
    fn test_failed_open_preserves_previous_state() {
        let dir = TempDir::new().unwrap();
        let (opener, live) = live();
        let good = staged_version(dir.path(), "good.mmdb", "US", "good", 1);
        live.install(good.clone()).unwrap();

        let bad_path = dir.path().join("bad.mmdb");
        std::fs::write(&bad_path, b"garbage").unwrap();
        let bad = DatabaseVersion::new("bad", timestamp(2), &bad_path);

        let result = live.install(bad);

        assert!(matches!(result, Err(AcquireError::DecodeOpen { .. })));
        assert_eq!(opener.opens(), 2);
        assert_eq!(live.version(), Some(good.clone()));
        assert!(good.local_path.exists());
        assert!(!bad_path.exists());
        assert!(live.query(QueryKind::Country, ip("8.8.8.8")).is_ok());
    }

    #[test]
    fn test_failed_reopen_of_live_file_keeps_it() {
        let dir = TempDir::new().unwrap();
        let (_, live) = live();
        let good = staged_version(dir.path(), "good.mmdb", "US", "good", 1);
        live.install(good.clone()).unwrap();

        // Corrupt the live file, then try to install it again
        std::fs::write(&good.local_path, b"garbage").unwrap();
        assert!(live.install(good.clone()).is_err());

        assert!(good.local_path.exists());
        assert_eq!(live.version(), Some(good));
    }

    // ===== Close Tests =====

    #[test]
    fn test_close_deletes_file() {
        let dir = TempDir::new().unwrap();
        let (_, live) = live();
        let version = staged_version(dir.path(), "a.mmdb", "US", "a", 1);
        live.install(version.clone()).unwrap();

        live.close();

        assert!(!live.is_installed());
        assert!(!version.local_path.exists());
        assert_eq!(
            live.query(QueryKind::City, ip("8.8.8.8")),
            Err(LookupError::NoDatabase)
        );
    }

    #[test]
    fn test_close_empty_is_noop() {
        let (_, live) = live();
        live.close();
        assert!(!live.is_installed());
    }

    // ===== Concurrency Tests =====

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_lookups_during_swap() {
        let dir = TempDir::new().unwrap();
        let (_, live) = live();
        let live = Arc::new(live);
        live.install(staged_version(dir.path(), "before.mmdb", "US", "before", 1))
            .unwrap();
        let after_path = write_database(dir.path(), "after.mmdb", "FR");

        let barrier = Arc::new(tokio::sync::Barrier::new(51));
        let mut handles = Vec::new();
        for i in 0..50u8 {
            let live = live.clone();
            let barrier = barrier.clone();
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                let mut seen = Vec::new();
                for _ in 0..20 {
                    let result = live
                        .query(QueryKind::Country, IpAddr::from([1, 2, 3, i]))
                        .unwrap();
                    seen.push((result.updated_at(), country_of(&result)));
                    tokio::task::yield_now().await;
                }
                seen
            }));
        }

        barrier.wait().await;
        let installer = live.clone();
        tokio::task::spawn_blocking(move || {
            installer.install(DatabaseVersion::new("after", timestamp(2), after_path))
        })
        .await
        .unwrap()
        .unwrap();

        for handle in handles {
            for (updated_at, country) in handle.await.unwrap() {
                match country.as_deref() {
                    Some("US") => assert_eq!(updated_at, timestamp(1)),
                    Some("FR") => assert_eq!(updated_at, timestamp(2)),
                    other => panic!("unexpected country {:?}", other),
                }
            }
        }

        let result = live.query(QueryKind::Country, ip("1.2.3.4")).unwrap();
        assert_eq!(result.updated_at(), timestamp(2));
        assert!(!dir.path().join("before.mmdb").exists());
    }
}
