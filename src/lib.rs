//! geoipd Library
//!
//! Keeps a MaxMind GeoIP database current (origin download, mirror tier,
//! scheduled renewal, hot swap) and answers city/country lookups over HTTP.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use application::{AcquisitionPipeline, GeoIpService, LiveDatabase};
pub use config::{load_config, Config, ConfigError};
pub use domain::entities::{CacheKey, DatabaseVersion, QueryKind, QueryResult};
pub use domain::errors::{AcquireError, LookupError};
pub use domain::ports::{DecoderOpener, GeoDecoder, MirrorStore, OriginFetcher, ResponseCache};
pub use infrastructure::{first_success, RenewalScheduler, ShutdownController};
