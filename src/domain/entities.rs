//! Domain Entities - Core business objects
//!
//! These entities represent the core concepts of the geoipd domain:
//! the versioned database that is in service, the lookups served from it,
//! and the keys used to cache those lookups.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// A downloaded revision of the geolocation database.
///
/// Produced by a successful fetch (origin or mirror) and never mutated:
/// the next successful fetch produces a new version that supersedes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseVersion {
    /// Opaque validator identifying the remote content revision
    pub entity_tag: String,
    /// Modification time of the database file inside the archive
    pub modified_at: DateTime<Utc>,
    /// Staged local file holding the database bytes
    pub local_path: PathBuf,
}

impl DatabaseVersion {
    pub fn new(
        entity_tag: impl Into<String>,
        modified_at: DateTime<Utc>,
        local_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            entity_tag: entity_tag.into(),
            modified_at,
            local_path: local_path.into(),
        }
    }
}

/// The kind of geolocation query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    City,
    Country,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::City => "city",
            Self::Country => "country",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response cache key: query kind plus the subject address.
///
/// Renders as `city:8.8.8.8`, which is also the key used by shared caches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub kind: QueryKind,
    pub subject: String,
}

impl CacheKey {
    pub fn new(kind: QueryKind, subject: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.subject)
    }
}

/// Localized names keyed by locale code (`en`, `de`, `pt-BR`, ...).
pub type Names = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Place {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geoname_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub names: Option<Names>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Continent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geoname_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub names: Option<Names>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Country {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geoname_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_in_european_union: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iso_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub names: Option<Names>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepresentedCountry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geoname_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iso_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub names: Option<Names>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub representation_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_radius: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metro_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Postal {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subdivision {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geoname_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iso_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub names: Option<Names>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Traits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_anonymous_proxy: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_satellite_provider: Option<bool>,
}

/// City-level record as decoded from a GeoIP2/GeoLite2 City database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CityRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<Place>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continent: Option<Continent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<Country>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal: Option<Postal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered_country: Option<Country>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub represented_country: Option<RepresentedCountry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdivisions: Option<Vec<Subdivision>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traits: Option<Traits>,
}

/// Country-level record; City databases answer country queries too.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CountryRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continent: Option<Continent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<Country>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered_country: Option<Country>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub represented_country: Option<RepresentedCountry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traits: Option<Traits>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityResult {
    /// The address that was looked up
    pub ip: String,
    /// Modification time of the database version that answered
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub record: CityRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryResult {
    pub ip: String,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub record: CountryRecord,
}

/// A lookup result annotated with the subject address and database version.
///
/// Serializes as the bare inner record; deserialization needs the kind
/// (see [`QueryResult::from_json`]) because every record field is optional.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryResult {
    City(CityResult),
    Country(CountryResult),
}

impl QueryResult {
    pub fn kind(&self) -> QueryKind {
        match self {
            Self::City(_) => QueryKind::City,
            Self::Country(_) => QueryKind::Country,
        }
    }

    pub fn ip(&self) -> &str {
        match self {
            Self::City(c) => &c.ip,
            Self::Country(c) => &c.ip,
        }
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        match self {
            Self::City(c) => c.updated_at,
            Self::Country(c) => c.updated_at,
        }
    }

    /// Decode a serialized result of the given kind.
    pub fn from_json(kind: QueryKind, data: &[u8]) -> serde_json::Result<Self> {
        match kind {
            QueryKind::City => serde_json::from_slice(data).map(Self::City),
            QueryKind::Country => serde_json::from_slice(data).map(Self::Country),
        }
    }
}
