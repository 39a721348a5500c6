//! Fakes shared by the application unit tests.

use crate::domain::entities::{CityRecord, Country, CountryRecord, DatabaseVersion, Names, Place};
use crate::domain::errors::{AcquireError, LookupError};
use crate::domain::ports::{DecoderOpener, GeoDecoder};
use chrono::{DateTime, TimeZone, Utc};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Decoder over a text file of the form `GEO:<iso>`.
///
/// Every address resolves to that country, except `10.0.0.0/8` which is
/// reported as not found.
pub struct TextDecoder {
    pub iso_code: String,
}

impl TextDecoder {
    fn covered(ip: IpAddr) -> Result<(), LookupError> {
        match ip {
            IpAddr::V4(v4) if v4.octets()[0] == 10 => Err(LookupError::NotFound(ip.to_string())),
            _ => Ok(()),
        }
    }

    fn country_field(&self) -> Country {
        Country {
            iso_code: Some(self.iso_code.clone()),
            ..Default::default()
        }
    }
}

impl GeoDecoder for TextDecoder {
    fn city(&self, ip: IpAddr) -> Result<CityRecord, LookupError> {
        Self::covered(ip)?;
        let mut names = Names::new();
        names.insert("en".to_string(), format!("Capital of {}", self.iso_code));
        Ok(CityRecord {
            city: Some(Place {
                geoname_id: Some(1),
                names: Some(names),
            }),
            country: Some(self.country_field()),
            ..Default::default()
        })
    }

    fn country(&self, ip: IpAddr) -> Result<CountryRecord, LookupError> {
        Self::covered(ip)?;
        Ok(CountryRecord {
            country: Some(self.country_field()),
            ..Default::default()
        })
    }
}

/// Opener for [`TextDecoder`] files, counting every open attempt.
#[derive(Default)]
pub struct TextOpener {
    pub opens: AtomicUsize,
}

impl TextOpener {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl DecoderOpener for TextOpener {
    fn open(&self, path: &Path) -> Result<Arc<dyn GeoDecoder>, AcquireError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let content = std::fs::read_to_string(path).map_err(|e| AcquireError::DecodeOpen {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let iso_code = content
            .trim()
            .strip_prefix("GEO:")
            .ok_or_else(|| AcquireError::DecodeOpen {
                path: path.to_path_buf(),
                reason: "missing GEO: header".to_string(),
            })?;
        Ok(Arc::new(TextDecoder {
            iso_code: iso_code.to_string(),
        }))
    }
}

pub fn timestamp(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, day, 0, 0, 0).unwrap()
}

/// Write a database file for `iso_code` into `dir`.
pub fn write_database(dir: &Path, name: &str, iso_code: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("GEO:{}", iso_code)).unwrap();
    path
}

/// A staged version whose file holds a database for `iso_code`.
pub fn staged_version(
    dir: &Path,
    name: &str,
    iso_code: &str,
    etag: &str,
    day: u32,
) -> DatabaseVersion {
    DatabaseVersion::new(etag, timestamp(day), write_database(dir, name, iso_code))
}
