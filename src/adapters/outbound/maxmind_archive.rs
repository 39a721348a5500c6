//! MaxMind Archive Extraction
//!
//! MaxMind publishes each edition as a gzip-compressed tar archive holding a
//! dated directory with the `.mmdb` file plus license/readme files. This
//! module streams such an archive and stages only the database file.

use crate::domain::errors::AcquireError;
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tar::Archive;

/// The database file staged out of an archive.
#[derive(Debug, Clone)]
pub struct ExtractedDatabase {
    pub path: PathBuf,
    /// Modification time recorded in the archive entry
    pub modified_at: DateTime<Utc>,
    pub size: u64,
}

/// Expected database filename for an edition.
pub fn database_filename(edition: &str) -> String {
    format!("{}.mmdb", edition)
}

/// Stream a `.tar.gz` archive and stage the first regular file whose name
/// ends with `filename` into a fresh temporary file under `work_dir`.
///
/// Other entries are drained without buffering. The staged file is kept on
/// disk; its lifetime is owned by whoever installs it.
pub fn extract_database<R: Read>(
    reader: R,
    filename: &str,
    work_dir: &Path,
) -> Result<ExtractedDatabase, AcquireError> {
    let mut archive = Archive::new(GzDecoder::new(reader));
    let entries = archive.entries().map_err(AcquireError::Extract)?;

    for entry in entries {
        let mut entry = entry.map_err(AcquireError::Extract)?;
        let entry_type = entry.header().entry_type();
        let name = entry
            .path()
            .map_err(AcquireError::Extract)?
            .to_string_lossy()
            .into_owned();

        if entry_type.is_dir() {
            continue;
        }
        if !entry_type.is_file() {
            tracing::warn!("unknown entry type {:?} in archive: {}", entry_type, name);
            continue;
        }
        if !name.ends_with(filename) {
            io::copy(&mut entry, &mut io::sink()).map_err(AcquireError::Extract)?;
            continue;
        }

        let size = entry.header().size().unwrap_or(0);
        let mtime = entry.header().mtime().unwrap_or(0);
        tracing::info!("extracting database {} ({} bytes)", name, size);

        let stem = filename.trim_end_matches(".mmdb");
        let mut staged = tempfile::Builder::new()
            .prefix(stem)
            .suffix(".mmdb")
            .tempfile_in(work_dir)?;
        // On failure the temp file is dropped and removed
        let copied =
            io::copy(&mut entry, staged.as_file_mut()).map_err(AcquireError::Extract)?;
        if copied != size {
            return Err(AcquireError::Extract(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{} truncated: {} of {} bytes", name, copied, size),
            )));
        }
        staged.as_file().sync_all()?;
        let (_, path) = staged.keep().map_err(|e| AcquireError::Io(e.error))?;

        let modified_at =
            DateTime::<Utc>::from_timestamp(mtime as i64, 0).unwrap_or_else(Utc::now);
        return Ok(ExtractedDatabase {
            path,
            modified_at,
            size,
        });
    }

    tracing::error!("{} not found in archive", filename);
    Err(AcquireError::NotFound {
        filename: filename.to_string(),
    })
}
