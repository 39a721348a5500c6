use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;

use crate::adapters::outbound::DEFAULT_ORIGIN_URL;

/// Errors in the startup configuration. Always fatal.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Where lookup responses are cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    Redis,
    None,
}

impl FromStr for CacheBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            "none" | "off" => Ok(Self::None),
            _ => Err(ConfigError::Invalid {
                name: "GEOIPD_CACHE_BACKEND",
                value: s.to_string(),
            }),
        }
    }
}

/// Mirror tier backing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MirrorProvider {
    /// S3-compatible bucket
    S3,
    /// Local or shared directory; the bucket is the directory path
    Local,
}

impl FromStr for MirrorProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "s3" => Ok(Self::S3),
            "local" => Ok(Self::Local),
            _ => Err(ConfigError::Invalid {
                name: "GEOIPD_MIRROR_PROVIDER",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct MirrorConfig {
    pub provider: MirrorProvider,
    pub bucket: String,
    pub region: String,
    pub key_prefix: Option<String>,
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    // HTTP settings
    pub listen_addr: String,
    pub endpoint: String,

    // Origin settings
    pub license_key: String,
    pub edition: String,
    pub origin_url: String,
    pub renew_secs: u64,
    pub work_dir: PathBuf,

    // Response cache settings
    pub cache_backend: CacheBackend,
    pub cache_ttl_secs: u64,
    pub redis_url: String,

    // Mirror tier settings
    pub mirror: Option<MirrorConfig>,

    pub detect_external_ip: bool,
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            endpoint: String::new(),
            license_key: String::new(),
            edition: "GeoLite2-City".to_string(),
            origin_url: DEFAULT_ORIGIN_URL.to_string(),
            renew_secs: 0,
            work_dir: std::env::temp_dir(),
            cache_backend: CacheBackend::Memory,
            cache_ttl_secs: 300,
            redis_url: "redis://127.0.0.1:6379/0".to_string(),
            mirror: None,
            detect_external_ip: false,
            debug: false,
        }
    }
}

impl Config {
    /// Check settings that have no usable default.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.license_key.trim().is_empty() {
            return Err(ConfigError::Missing("GEOIPD_LICENSE_KEY"));
        }
        if self.edition.trim().is_empty() {
            return Err(ConfigError::Missing("GEOIPD_EDITION"));
        }
        if let Some(mirror) = &self.mirror {
            if mirror.bucket.is_empty() {
                return Err(ConfigError::Missing("GEOIPD_MIRROR_BUCKET"));
            }
            if mirror.provider == MirrorProvider::S3 {
                if mirror.access_key_id.is_none() {
                    return Err(ConfigError::Missing("GEOIPD_MIRROR_ACCESS_KEY_ID"));
                }
                if mirror.secret_access_key.is_none() {
                    return Err(ConfigError::Missing("GEOIPD_MIRROR_SECRET_ACCESS_KEY"));
                }
            }
        }
        Ok(())
    }
}

/// `/geoip/` and `geoip` both become `/geoip`; empty stays empty.
fn normalize_endpoint(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

fn flag(value: Option<String>) -> bool {
    value
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false)
}

pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(|name| std::env::var(name).ok())
}

/// Build the configuration from a variable lookup (the process environment
/// in production).
pub fn load_config_from<F>(var: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = Config::default();

    let listen_addr = var("GEOIPD_LISTEN_ADDR").unwrap_or(defaults.listen_addr);

    let endpoint = normalize_endpoint(&var("GEOIPD_ENDPOINT").unwrap_or_default());

    let license_key = var("GEOIPD_LICENSE_KEY").unwrap_or_default();

    let edition = var("GEOIPD_EDITION").unwrap_or(defaults.edition);

    let origin_url = var("GEOIPD_ORIGIN_URL").unwrap_or(defaults.origin_url);

    let renew_secs = var("GEOIPD_RENEW_SECS")
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults.renew_secs);

    let work_dir = var("GEOIPD_WORK_DIR")
        .map(PathBuf::from)
        .unwrap_or(defaults.work_dir);

    // Response cache settings
    let cache_backend = match var("GEOIPD_CACHE_BACKEND") {
        Some(v) => v.parse()?,
        None => defaults.cache_backend,
    };

    let cache_ttl_secs = var("GEOIPD_CACHE_TTL_SECS")
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults.cache_ttl_secs);

    let redis_url = var("GEOIPD_REDIS_URL").unwrap_or(defaults.redis_url);

    // Mirror tier settings
    let mirror = match var("GEOIPD_MIRROR_PROVIDER").filter(|p| !p.trim().is_empty()) {
        Some(provider) => Some(MirrorConfig {
            provider: provider.parse()?,
            bucket: var("GEOIPD_MIRROR_BUCKET").unwrap_or_default(),
            region: var("GEOIPD_MIRROR_REGION").unwrap_or_else(|| "us-east-1".to_string()),
            key_prefix: var("GEOIPD_MIRROR_KEY_PREFIX").filter(|p| !p.is_empty()),
            endpoint: var("GEOIPD_MIRROR_ENDPOINT").filter(|e| !e.is_empty()),
            access_key_id: var("GEOIPD_MIRROR_ACCESS_KEY_ID"),
            secret_access_key: var("GEOIPD_MIRROR_SECRET_ACCESS_KEY"),
        }),
        None => None,
    };

    let detect_external_ip = flag(var("GEOIPD_DETECT_EXTERNAL_IP"));

    let debug = var("DEBUG").is_some();

    let config = Config {
        listen_addr,
        endpoint,
        license_key,
        edition,
        origin_url,
        renew_secs,
        work_dir,
        cache_backend,
        cache_ttl_secs,
        redis_url,
        mirror,
        detect_external_ip,
        debug,
    };
    config.validate()?;
    Ok(config)
}
