mod geo_decoder;
mod ip_detector;
mod mirror_store;
mod origin_fetcher;
mod response_cache;

pub use geo_decoder::{DecoderOpener, GeoDecoder};
pub use ip_detector::IpDetector;
pub use mirror_store::{
    edition_key, prefixed_key, Metadata, MirrorReader, MirrorStore, META_DOWNLOAD_TIME,
    META_EDITION, META_ETAG,
};
pub use origin_fetcher::{FetchOutcome, OriginFetcher};
pub use response_cache::ResponseCache;
