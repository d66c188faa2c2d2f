//! Fire-and-forget delivery.
//!
//! [`Delivery`] serializes a record and hands it to the primary transport.
//! Only when the primary reports itself unavailable is the fallback tried.
//! Nothing is retried and nothing is surfaced to the page; the returned
//! [`DeliveryOutcome`] exists for diagnostics only.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread,
};

use beacon_common::EventRecord;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport unavailable: {0}")]
    Unavailable(&'static str),
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to start delivery thread: {0}")]
    Spawn(#[source] std::io::Error),
}

pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;

    /// Queues `body` for `endpoint` without waiting for the network.
    fn send(&self, endpoint: &str, body: String) -> Result<(), TransportError>;
}

/// Non-blocking send on the ambient tokio runtime. The body goes out as
/// `text/plain`, the way browsers send beacons.
#[derive(Debug, Clone, Default)]
pub struct BeaconTransport {
    client: reqwest::Client,
}

impl BeaconTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for BeaconTransport {
    fn name(&self) -> &'static str {
        "beacon"
    }

    fn send(&self, endpoint: &str, body: String) -> Result<(), TransportError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| TransportError::Unavailable("no async runtime"))?;

        let request = self
            .client
            .post(endpoint)
            .header(CONTENT_TYPE, "text/plain;charset=UTF-8")
            .body(body);

        handle.spawn(async move {
            if let Err(err) = request.send().await {
                tracing::debug!("beacon delivery failed: {err}");
            }
        });
        Ok(())
    }
}

/// Detached request on a short-lived thread with its own runtime. Slower than
/// [`BeaconTransport`] but works from any context.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchTransport;

impl Transport for FetchTransport {
    fn name(&self) -> &'static str {
        "fetch"
    }

    fn send(&self, endpoint: &str, body: String) -> Result<(), TransportError> {
        let endpoint = endpoint.to_string();
        thread::Builder::new()
            .name("beacon-fetch".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        tracing::debug!("fetch fallback could not start a runtime: {err}");
                        return;
                    }
                };

                let client = reqwest::Client::new();
                let result = runtime.block_on(
                    client
                        .post(&endpoint)
                        .header(CONTENT_TYPE, "application/json")
                        .body(body)
                        .send(),
                );
                if let Err(err) = result {
                    tracing::debug!("fetch delivery failed: {err}");
                }
            })
            .map(|_| ())
            .map_err(TransportError::Spawn)
    }
}

/// Records payloads instead of sending them.
#[derive(Debug)]
pub struct MemoryTransport {
    available: AtomicBool,
    sent: Mutex<Vec<(String, String)>>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self {
            available: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
        }
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport that reports itself unavailable, forcing the fallback path.
    pub fn unavailable() -> Self {
        let transport = Self::default();
        transport.set_available(false);
        transport
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn bodies(&self) -> Vec<String> {
        self.lock().iter().map(|(_, body)| body.clone()).collect()
    }

    pub fn records(&self) -> Vec<Value> {
        self.lock()
            .iter()
            .filter_map(|(_, body)| serde_json::from_str(body).ok())
            .collect()
    }

    /// `event` names of recorded custom events, or `"pageview"` for page views.
    pub fn event_names(&self) -> Vec<String> {
        self.records()
            .iter()
            .map(|record| {
                record
                    .get("event")
                    .and_then(Value::as_str)
                    .or_else(|| record.get("type").and_then(Value::as_str))
                    .unwrap_or_default()
                    .to_string()
            })
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(String, String)>> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Transport for MemoryTransport {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn send(&self, endpoint: &str, body: String) -> Result<(), TransportError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable("memory transport disabled"));
        }
        self.lock().push((endpoint.to_string(), body));
        Ok(())
    }
}

#[derive(Debug)]
pub enum DeliveryOutcome {
    Queued { via: &'static str },
    Dropped { error: TransportError },
}

impl DeliveryOutcome {
    pub fn is_queued(&self) -> bool {
        matches!(self, DeliveryOutcome::Queued { .. })
    }
}

#[derive(Clone)]
pub struct Delivery {
    endpoint: String,
    primary: Option<Arc<dyn Transport>>,
    fallback: Option<Arc<dyn Transport>>,
}

impl Delivery {
    pub fn new(
        endpoint: impl Into<String>,
        primary: Option<Arc<dyn Transport>>,
        fallback: Option<Arc<dyn Transport>>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            primary,
            fallback,
        }
    }

    /// Beacon first, detached fetch as fallback.
    pub fn http(endpoint: impl Into<String>) -> Self {
        Self::new(
            endpoint,
            Some(Arc::new(BeaconTransport::default())),
            Some(Arc::new(FetchTransport)),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn send(&self, record: &EventRecord) -> DeliveryOutcome {
        let body = match serde_json::to_string(record) {
            Ok(body) => body,
            Err(err) => return self.dropped(TransportError::Encode(err)),
        };

        let chain = [self.primary.as_ref(), self.fallback.as_ref()];
        let mut last_error = TransportError::Unavailable("no transport configured");

        for transport in chain.into_iter().flatten() {
            match transport.send(&self.endpoint, body.clone()) {
                Ok(()) => {
                    return DeliveryOutcome::Queued {
                        via: transport.name(),
                    }
                }
                Err(TransportError::Unavailable(reason)) => {
                    tracing::trace!("{} transport unavailable: {reason}", transport.name());
                    last_error = TransportError::Unavailable(reason);
                }
                Err(err) => return self.dropped(err),
            }
        }

        self.dropped(last_error)
    }

    fn dropped(&self, error: TransportError) -> DeliveryOutcome {
        tracing::debug!("tracking event dropped: {error}");
        DeliveryOutcome::Dropped { error }
    }
}
