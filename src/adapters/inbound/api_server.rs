//! GeoIP API Server
//!
//! HTTP facade over the lookup service:
//!
//! - `GET {endpoint}/city?ip=`: city-level lookup
//! - `GET {endpoint}/country?ip=`: country-level lookup
//! - `GET {endpoint}/version`: build information
//! - `GET /health`: installed database version
//!
//! Without `ip` the caller's peer address is looked up. Every response
//! carries `Cache-Control: no-cache`; lookups also carry `X-Cache: HIT|MISS`.

use crate::application::{GeoIpService, LookupResponse};
use crate::domain::entities::QueryKind;
use crate::domain::errors::LookupError;
use crate::infrastructure::ShutdownController;
use axum::{
    extract::{ConnectInfo, Query, State},
    http::{
        header::{CACHE_CONTROL, CONTENT_TYPE, USER_AGENT},
        HeaderMap, HeaderName, HeaderValue, StatusCode,
    },
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Observability header telling whether the answer came from the cache.
pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// Build metadata baked in at compile time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildInfo {
    pub commit: String,
    pub tag: String,
    pub time: Option<DateTime<Utc>>,
}

impl BuildInfo {
    /// Read `GEOIPD_GIT_HASH`, `GEOIPD_GIT_TAG` and `GEOIPD_BUILD_TIME`
    /// (unix seconds) from the build environment.
    pub fn from_build_env() -> Self {
        Self {
            commit: option_env!("GEOIPD_GIT_HASH").unwrap_or_default().to_string(),
            tag: option_env!("GEOIPD_GIT_TAG").unwrap_or_default().to_string(),
            time: option_env!("GEOIPD_BUILD_TIME")
                .and_then(|t| t.parse::<i64>().ok())
                .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionTime {
    pub epoch: i64,
    pub rfc3339: String,
}

/// Version response.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionResponse {
    pub time: VersionTime,
    pub commit: String,
    pub tag: String,
}

/// Installed database, as reported by the health endpoint.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatabaseStatus {
    pub etag: String,
    pub modified_at: DateTime<Utc>,
}

/// Health response.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: Option<DatabaseStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LookupParams {
    pub ip: Option<String>,
}

/// API Server state.
#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<GeoIpService>,
    pub build: Arc<BuildInfo>,
}

impl ApiState {
    pub fn new(service: Arc<GeoIpService>, build: BuildInfo) -> Self {
        Self {
            service,
            build: Arc::new(build),
        }
    }
}

/// Build the router, mounting lookups under `endpoint` (`""` for root).
pub fn router(state: ApiState, endpoint: &str) -> Router {
    let routes = Router::new()
        .route("/city", get(city_handler))
        .route("/country", get(country_handler))
        .route("/version", get(version_handler));

    let app = match endpoint.trim_matches('/') {
        "" => routes,
        prefix => Router::new().nest(&format!("/{}", prefix), routes),
    };

    app.route("/health", get(health_handler))
        .layer(middleware::map_response(no_cache))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn no_cache(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

/// API Server for GeoIP lookups.
pub struct ApiServer {
    listen_addr: String,
    endpoint: String,
    state: ApiState,
}

impl ApiServer {
    pub fn new(listen_addr: String, endpoint: String, state: ApiState) -> Self {
        Self {
            listen_addr,
            endpoint,
            state,
        }
    }

    /// Bind the listen address and serve until `shutdown` fires.
    #[cfg_attr(coverage_nightly, coverage(off))]
    pub async fn run(&self, shutdown: ShutdownController) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.listen_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` fires.
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown: ShutdownController,
    ) -> anyhow::Result<()> {
        let app = router(self.state.clone(), &self.endpoint);
        tracing::info!("GeoIP API listening on {}", listener.local_addr()?);

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await?;

        tracing::info!("GeoIP API stopped");
        Ok(())
    }
}

// Handler functions

async fn city_handler(
    State(state): State<ApiState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Query(params): Query<LookupParams>,
    headers: HeaderMap,
) -> Response {
    lookup(&state, QueryKind::City, connect_info, params, &headers).await
}

async fn country_handler(
    State(state): State<ApiState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Query(params): Query<LookupParams>,
    headers: HeaderMap,
) -> Response {
    lookup(&state, QueryKind::Country, connect_info, params, &headers).await
}

async fn lookup(
    state: &ApiState,
    kind: QueryKind,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    params: LookupParams,
    headers: &HeaderMap,
) -> Response {
    let caller = connect_info.map(|ConnectInfo(addr)| addr.ip());
    match state
        .service
        .lookup(kind, params.ip.as_deref(), caller)
        .await
    {
        Ok(response) => render(&response, wants_pretty(headers)),
        Err(e) => error_response(e),
    }
}

/// Browsers get indented JSON.
fn wants_pretty(headers: &HeaderMap) -> bool {
    headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ua| ua.contains("Mozilla"))
}

fn render(response: &LookupResponse, pretty: bool) -> Response {
    let body = if pretty {
        serde_json::to_vec_pretty(&response.result)
    } else {
        serde_json::to_vec(&response.result)
    };
    let body = match body {
        Ok(body) => body,
        Err(e) => {
            tracing::error!("failed to serialize lookup result: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response();
        }
    };
    let cache = if response.cache_hit { "HIT" } else { "MISS" };
    (
        StatusCode::OK,
        [
            (CONTENT_TYPE, HeaderValue::from_static("application/json")),
            (X_CACHE, HeaderValue::from_static(cache)),
        ],
        body,
    )
        .into_response()
}

fn error_status(e: &LookupError) -> StatusCode {
    match e {
        LookupError::BadInput(_) => StatusCode::BAD_REQUEST,
        LookupError::NotFound(_) => StatusCode::NOT_FOUND,
        LookupError::NoDatabase | LookupError::Decode(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(e: LookupError) -> Response {
    let status = error_status(&e);
    if status.is_server_error() {
        tracing::error!("lookup failed: {}", e);
    } else {
        tracing::debug!("lookup rejected: {}", e);
    }
    (status, Json(serde_json::json!({ "error": e.to_string() }))).into_response()
}

async fn version_handler(State(state): State<ApiState>) -> impl IntoResponse {
    let build = &state.build;
    let time = match build.time {
        Some(t) => VersionTime {
            epoch: t.timestamp(),
            rfc3339: t.to_rfc3339(),
        },
        None => VersionTime {
            epoch: 0,
            rfc3339: String::new(),
        },
    };
    Json(VersionResponse {
        time,
        commit: build.commit.clone(),
        tag: build.tag.clone(),
    })
}

async fn health_handler(State(state): State<ApiState>) -> impl IntoResponse {
    let database = state.service.live().version().map(|v| DatabaseStatus {
        etag: v.entity_tag,
        modified_at: v.modified_at,
    });
    let (status, label) = if database.is_some() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    };
    (
        status,
        Json(HealthResponse {
            status: label.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database,
        }),
    )
}
