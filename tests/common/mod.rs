//! Shared fixtures for integration tests.

#![allow(dead_code)]

use flate2::write::GzEncoder;
use flate2::Compression;
use geoipd::domain::entities::{CityRecord, Country, CountryRecord};
use geoipd::domain::errors::{AcquireError, LookupError};
use geoipd::domain::ports::{DecoderOpener, GeoDecoder};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

/// Archive mtime used by [`archive`]: 2024-05-07T00:00:00Z.
pub const ARCHIVE_MTIME: u64 = 1_715_040_000;

/// Build a MaxMind-style `.tar.gz`: a dated directory holding a license
/// file and `<edition>.mmdb` with `database` as its contents.
pub fn archive(edition: &str, database: &[u8]) -> Vec<u8> {
    let dir = format!("{}_20240507", edition);
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));

    append(&mut builder, &format!("{}/LICENSE.txt", dir), b"license text");
    append(&mut builder, &format!("{}/{}.mmdb", dir, edition), database);

    builder.into_inner().unwrap().finish().unwrap()
}

/// Same as [`archive`] but without a database file.
pub fn archive_without_database(edition: &str) -> Vec<u8> {
    let dir = format!("{}_20240507", edition);
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    append(&mut builder, &format!("{}/README.txt", dir), b"nothing here");
    builder.into_inner().unwrap().finish().unwrap()
}

fn append<W: std::io::Write>(builder: &mut tar::Builder<W>, name: &str, data: &[u8]) {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(ARCHIVE_MTIME);
    header.set_entry_type(tar::EntryType::Regular);
    builder.append_data(&mut header, name, data).unwrap();
}

/// Database body understood by [`StubOpener`].
pub fn stub_database(iso_code: &str) -> Vec<u8> {
    format!("GEO:{}", iso_code).into_bytes()
}

/// Opens files written by [`stub_database`]; anything else fails to open.
pub struct StubOpener;

impl DecoderOpener for StubOpener {
    fn open(&self, path: &Path) -> Result<Arc<dyn GeoDecoder>, AcquireError> {
        let content = std::fs::read_to_string(path).unwrap_or_default();
        match content.strip_prefix("GEO:") {
            Some(iso_code) => Ok(Arc::new(StubDecoder {
                iso_code: iso_code.to_string(),
            })),
            None => Err(AcquireError::DecodeOpen {
                path: path.to_path_buf(),
                reason: "not a stub database".to_string(),
            }),
        }
    }
}

struct StubDecoder {
    iso_code: String,
}

impl StubDecoder {
    fn country_field(&self) -> Option<Country> {
        Some(Country {
            iso_code: Some(self.iso_code.clone()),
            ..Default::default()
        })
    }
}

impl GeoDecoder for StubDecoder {
    fn city(&self, ip: IpAddr) -> Result<CityRecord, LookupError> {
        if ip.is_loopback() {
            return Err(LookupError::NotFound(ip.to_string()));
        }
        Ok(CityRecord {
            country: self.country_field(),
            ..Default::default()
        })
    }

    fn country(&self, ip: IpAddr) -> Result<CountryRecord, LookupError> {
        if ip.is_loopback() {
            return Err(LookupError::NotFound(ip.to_string()));
        }
        Ok(CountryRecord {
            country: self.country_field(),
            ..Default::default()
        })
    }
}
