//! Application Layer
//!
//! Use cases orchestrating the domain ports: acquiring and installing the
//! database, and serving lookups from it.

pub mod acquisition;
pub mod geoip_service;
pub mod live_database;

#[cfg(test)]
pub(crate) mod test_support;

pub use acquisition::{Acquisition, AcquisitionPipeline};
pub use geoip_service::{GeoIpService, LookupResponse};
pub use live_database::{DatabaseSnapshot, LiveDatabase};
