//! Ingestion endpoint for beacon events.
//!
//! A POST to the tracking route is validated, enriched with request metadata
//! and appended as one JSON line to `<log_root>/tracking/YYYY/MM/tracking_DD.json`.

pub mod config;
pub mod enrich;
pub mod geo;
mod http_server;
pub mod partition;
pub mod sink;

pub use http_server::{build_router, run_http_server, IngestState};
