use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, ConnectInfo, DefaultBodyLimit, Extension},
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE,
        },
        HeaderMap, HeaderName, Method, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use beacon_common::{time::epoch_seconds, ErrorBody, LogEntry, TrackResponse, UNKNOWN};
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::{
    config::{IngestConfig, DEFAULT_MAX_BODY_BYTES},
    enrich::Enricher,
    geo::{GeoLookup, GeoTable},
    sink::EventSink,
};

/// Headers sent on every response from the tracking route, preflight included.
fn tracking_headers() -> [(HeaderName, &'static str); 4] {
    [
        (CONTENT_TYPE, "application/json"),
        (ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        (ACCESS_CONTROL_ALLOW_METHODS, "POST, OPTIONS"),
        (ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
    ]
}

#[derive(Clone)]
pub struct IngestState {
    inner: Arc<IngestStateInner>,
    max_body_bytes: usize,
}

struct IngestStateInner {
    sink: Arc<EventSink>,
    enricher: Enricher,
}

impl IngestState {
    pub fn new(sink: Arc<EventSink>, enricher: Enricher) -> Self {
        Self {
            inner: Arc::new(IngestStateInner { sink, enricher }),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Largest accepted request body. Anything bigger is answered like a
    /// body that failed to parse.
    pub fn with_body_limit(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// Builds state from resolved configuration, loading the geolocation table once.
    pub fn from_config(config: &IngestConfig) -> Result<Self> {
        let geo: Option<Arc<dyn GeoLookup>> = match &config.geo_table {
            Some(path) => {
                let table = GeoTable::load(path).with_context(|| {
                    format!("Failed to load geolocation table {}", path.display())
                })?;
                tracing::info!(
                    "geolocation enabled with {} networks from {}",
                    table.len(),
                    path.display()
                );
                Some(Arc::new(table))
            }
            None => None,
        };

        let sink = Arc::new(EventSink::new(config.log_root.clone()));
        let enricher = Enricher::new(geo, config.trust_forwarded_for);
        Ok(Self::new(sink, enricher).with_body_limit(config.max_body_bytes))
    }

    pub fn sink(&self) -> &Arc<EventSink> {
        &self.inner.sink
    }

    fn enricher(&self) -> &Enricher {
        &self.inner.enricher
    }

    /// Writes on the blocking pool. Failures are logged and counted but never
    /// reach the client.
    async fn persist(&self, entry: LogEntry, received_at: DateTime<Utc>) {
        let sink = Arc::clone(self.sink());
        let outcome = tokio::task::spawn_blocking(move || sink.append(&entry, received_at)).await;

        match outcome {
            Ok(Ok(path)) => tracing::debug!("appended tracking entry to {}", path.display()),
            Ok(Err(err)) => {
                self.sink().record_failure();
                tracing::warn!("tracking entry dropped: {err}");
            }
            Err(err) => {
                self.sink().record_failure();
                tracing::warn!("tracking writer task failed: {err}");
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ApiError {
    MethodNotAllowed,
    InvalidJson,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::MethodNotAllowed => (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed"),
            ApiError::InvalidJson => (StatusCode::BAD_REQUEST, "Invalid JSON data"),
        };
        (status, tracking_headers(), Json(ErrorBody::new(message))).into_response()
    }
}

pub fn build_router(state: IngestState, route: &str) -> Router {
    let body_limit = DefaultBodyLimit::max(state.max_body_bytes());
    Router::new()
        .route(route, any(track))
        .route("/health", get(health))
        .layer(body_limit)
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
}

pub async fn run_http_server(config: IngestConfig) -> Result<()> {
    let state = IngestState::from_config(&config)?;
    let router = build_router(state, &config.route);

    let bind = config.bind_address();
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("Invalid bind address {bind}"))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind ingest server to {addr}"))?;

    tracing::info!(
        "ingest listening on {addr}{}, writing under {}",
        config.route,
        config.log_root.display()
    );

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("ingest server encountered an unrecoverable error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

/// received -> validated -> enriched -> persisted -> acknowledged.
async fn track(
    Extension(state): Extension<IngestState>,
    method: Method,
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    match method {
        Method::OPTIONS => return Ok((StatusCode::OK, tracking_headers()).into_response()),
        Method::POST => {}
        _ => return Err(ApiError::MethodNotAllowed),
    }

    let body = body.map_err(|rejection| {
        tracing::debug!("rejecting unreadable tracking body: {rejection}");
        ApiError::InvalidJson
    })?;
    let record = parse_record(&body)?;

    let received_at = Utc::now();
    let peer = connect.map(|ConnectInfo(addr)| addr);
    let entry = state
        .enricher()
        .enrich(record, &method, &headers, peer, received_at.timestamp());

    let session_id = entry
        .session_id()
        .cloned()
        .unwrap_or_else(|| Value::String(UNKNOWN.to_string()));

    state.persist(entry, received_at).await;

    let ack = TrackResponse::success(epoch_seconds(), session_id);
    Ok((StatusCode::OK, tracking_headers(), Json(ack)).into_response())
}

/// Accepts any non-empty JSON object. Empty bodies, `null`, `{}` and
/// non-object values are all rejected the same way.
fn parse_record(body: &[u8]) -> Result<Map<String, Value>, ApiError> {
    let value: Value = serde_json::from_slice(body).map_err(|err| {
        tracing::debug!("rejecting tracking payload: {err}");
        ApiError::InvalidJson
    })?;

    match value {
        Value::Object(map) if !map.is_empty() => Ok(map),
        other => {
            tracing::debug!("rejecting non-object tracking payload: {}", type_name(&other));
            Err(ApiError::InvalidJson)
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "empty object",
    }
}

async fn health(Extension(state): Extension<IngestState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "write_failures": state.sink().write_failures(),
    }))
}
