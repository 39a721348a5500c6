mod dashmap_response_cache;
mod http_ip_detector;
mod local_mirror_store;
mod maxmind_archive;
mod maxmind_geo_decoder;
mod maxmind_origin_fetcher;
mod redis_response_cache;
mod s3_mirror_store;

pub use dashmap_response_cache::DashMapResponseCache;
pub use http_ip_detector::{HttpIpDetector, DEFAULT_DETECTOR_URLS, DEFAULT_DETECT_TIMEOUT};
pub use local_mirror_store::LocalMirrorStore;
pub use maxmind_archive::{database_filename, extract_database, ExtractedDatabase};
pub use maxmind_geo_decoder::{MaxMindDecoder, MaxMindOpener};
pub use maxmind_origin_fetcher::{MaxMindOriginFetcher, DEFAULT_ORIGIN_URL};
pub use redis_response_cache::RedisResponseCache;
pub use s3_mirror_store::S3MirrorStore;
