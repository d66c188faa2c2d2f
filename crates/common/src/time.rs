use chrono::Utc;

/// Milliseconds since the Unix epoch, the resolution the beacon stamps events with.
pub fn epoch_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Seconds since the Unix epoch, the resolution the ingest endpoint records.
pub fn epoch_seconds() -> i64 {
    Utc::now().timestamp()
}
