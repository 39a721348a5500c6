//! Geo Decoder Port
//!
//! Defines the interface for decoding addresses against a loaded
//! geolocation database, and for opening such a database from disk.

use crate::domain::entities::{CityRecord, CountryRecord};
use crate::domain::errors::{AcquireError, LookupError};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

/// An opened, read-only geolocation database.
///
/// Implementations must be safe to query from many threads at once.
pub trait GeoDecoder: Send + Sync {
    /// City-level lookup.
    fn city(&self, ip: IpAddr) -> Result<CityRecord, LookupError>;

    /// Country-level lookup.
    fn country(&self, ip: IpAddr) -> Result<CountryRecord, LookupError>;
}

/// Opens a database file into a [`GeoDecoder`].
pub trait DecoderOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<Arc<dyn GeoDecoder>, AcquireError>;
}
