// # -----------------------------
// # crates/common/src/lib.rs
// # -----------------------------
pub mod event;
pub mod log_entry;
pub mod response;
pub mod time;

pub use event::{
    DeviceClass, DeviceInfo, EventKind, EventRecord, PerformanceTimings, ScreenInfo, Viewport,
};
pub use log_entry::{Coordinate, Geolocation, LogEntry, ServerInfo};
pub use response::{ErrorBody, TrackResponse};

/// Sentinel written wherever a request-derived value is missing.
pub const UNKNOWN: &str = "unknown";
