//! geoipd - GeoIP database lifecycle manager and lookup API
//!
//! This is the composition root that wires together all the components.

use geoipd::adapters::inbound::{ApiServer, ApiState, BuildInfo};
use geoipd::adapters::outbound::{
    HttpIpDetector, LocalMirrorStore, MaxMindOpener, MaxMindOriginFetcher, S3MirrorStore,
    DEFAULT_DETECTOR_URLS, DEFAULT_DETECT_TIMEOUT,
};
use geoipd::config::{load_config, MirrorConfig, MirrorProvider};
use geoipd::domain::ports::{IpDetector, MirrorStore};
use geoipd::infrastructure::{
    open_response_cache, shutdown_signal, ConcurrentIpDetector, RenewalScheduler,
    ShutdownController,
};
use geoipd::{AcquisitionPipeline, GeoIpService, LiveDatabase};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment
    let cfg = load_config()?;

    // Setup logging
    let log_level = if cfg.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt().with_max_level(log_level).init();

    tracing::info!(
        "starting geoipd edition={} listen={}",
        cfg.edition,
        cfg.listen_addr
    );

    // ===== COMPOSITION ROOT =====

    // 1. Acquisition: origin plus optional mirror tier
    let origin = Arc::new(MaxMindOriginFetcher::new(
        cfg.origin_url.clone(),
        cfg.edition.clone(),
        cfg.license_key.clone(),
        cfg.work_dir.clone(),
    ));

    let mirrors = match &cfg.mirror {
        Some(mirror) => vec![mirror_store(mirror)?],
        None => Vec::new(),
    };

    let pipeline = Arc::new(AcquisitionPipeline::new(
        origin,
        mirrors,
        cfg.work_dir.clone(),
    ));
    let live = Arc::new(LiveDatabase::new(Arc::new(MaxMindOpener)));

    // Nothing to serve without a first database
    pipeline.renew(&live).await?;

    let mut scheduler = RenewalScheduler::new(
        pipeline.clone(),
        live.clone(),
        Duration::from_secs(cfg.renew_secs),
    );
    scheduler.start();

    // 2. Response cache; the shutdown controller also ends its GC task
    let shutdown = ShutdownController::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let cache = open_response_cache(
        cfg.cache_backend,
        &cfg.redis_url,
        Duration::from_secs(cfg.cache_ttl_secs),
        &shutdown,
    )
    .await;

    let service = Arc::new(GeoIpService::new(live.clone(), cache));

    // 3. Optional external address report
    if cfg.detect_external_ip {
        let detectors: Vec<Arc<dyn IpDetector>> = DEFAULT_DETECTOR_URLS
            .iter()
            .map(|url| {
                Arc::new(HttpIpDetector::new(*url, DEFAULT_DETECT_TIMEOUT)) as Arc<dyn IpDetector>
            })
            .collect();
        tokio::spawn(async move {
            if let Err(e) = ConcurrentIpDetector::new(detectors).detect().await {
                tracing::warn!("could not detect external IP: {}", e);
            }
        });
    }

    // 4. HTTP API until SIGINT/SIGTERM
    let server = ApiServer::new(
        cfg.listen_addr.clone(),
        cfg.endpoint.clone(),
        ApiState::new(service, BuildInfo::from_build_env()),
    );
    let served = server.run(shutdown).await;

    // Teardown: stop renewals before releasing the database
    scheduler.stop().await;
    live.close();
    tracing::info!("geoipd stopped");

    served
}

fn mirror_store(mirror: &MirrorConfig) -> anyhow::Result<Arc<dyn MirrorStore>> {
    let store: Arc<dyn MirrorStore> = match mirror.provider {
        MirrorProvider::S3 => Arc::new(S3MirrorStore::new(
            mirror.bucket.clone(),
            mirror.key_prefix.clone(),
            mirror.region.clone(),
            mirror.endpoint.clone(),
            mirror.access_key_id.clone().unwrap_or_default(),
            mirror.secret_access_key.clone().unwrap_or_default(),
        )),
        MirrorProvider::Local => Arc::new(LocalMirrorStore::new(
            mirror.bucket.clone(),
            mirror.key_prefix.clone(),
        )?),
    };
    tracing::info!("using mirror {}", store.name());
    Ok(store)
}
