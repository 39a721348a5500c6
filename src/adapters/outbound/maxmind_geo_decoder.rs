//! MaxMind Geo Decoder
//!
//! Implements GeoDecoder using a MaxMind GeoIP2/GeoLite2 database.

use crate::domain::entities::{CityRecord, CountryRecord};
use crate::domain::errors::{AcquireError, LookupError};
use crate::domain::ports::{DecoderOpener, GeoDecoder};
use maxminddb::{MaxMindDBError, Reader};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

/// MaxMind database decoder.
///
/// The database is read fully into memory, so the backing file can be
/// removed while the decoder is still answering queries.
pub struct MaxMindDecoder {
    reader: Reader<Vec<u8>>,
}

impl MaxMindDecoder {
    /// Load a database from a file path.
    pub fn from_file(path: &Path) -> Result<Self, MaxMindDBError> {
        let reader = Reader::open_readfile(path)?;
        Ok(Self { reader })
    }

    /// Database type from the metadata section (e.g. `GeoLite2-City`).
    pub fn database_type(&self) -> &str {
        &self.reader.metadata.database_type
    }

    /// Build epoch from the metadata section.
    pub fn build_epoch(&self) -> u64 {
        self.reader.metadata.build_epoch
    }
}

fn lookup_error(ip: IpAddr, err: MaxMindDBError) -> LookupError {
    match err {
        MaxMindDBError::AddressNotFoundError(_) => LookupError::NotFound(ip.to_string()),
        other => LookupError::Decode(other.to_string()),
    }
}

impl GeoDecoder for MaxMindDecoder {
    fn city(&self, ip: IpAddr) -> Result<CityRecord, LookupError> {
        self.reader.lookup(ip).map_err(|e| lookup_error(ip, e))
    }

    fn country(&self, ip: IpAddr) -> Result<CountryRecord, LookupError> {
        self.reader.lookup(ip).map_err(|e| lookup_error(ip, e))
    }
}

/// Opens `.mmdb` files as [`MaxMindDecoder`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxMindOpener;

impl DecoderOpener for MaxMindOpener {
    fn open(&self, path: &Path) -> Result<Arc<dyn GeoDecoder>, AcquireError> {
        let decoder = MaxMindDecoder::from_file(path).map_err(|e| AcquireError::DecodeOpen {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        tracing::info!(
            "opened {} database built at {} from {}",
            decoder.database_type(),
            decoder.build_epoch(),
            path.display()
        );
        Ok(Arc::new(decoder))
    }
}
