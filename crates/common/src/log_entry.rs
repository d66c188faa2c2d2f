//! Server-side enrichment attached to each persisted record.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::UNKNOWN;

/// Request metadata captured at receipt. Keys are snake_case on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub timestamp: i64,
    pub ip: String,
    pub user_agent: String,
    pub referer: String,
    pub request_method: String,
    pub content_type: String,
}

/// Latitude or longitude, or the `"unknown"` sentinel when the lookup had none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Coordinate {
    Degrees(f64),
    Unknown(String),
}

impl Coordinate {
    pub fn unknown() -> Self {
        Coordinate::Unknown(UNKNOWN.to_string())
    }
}

impl From<Option<f64>> for Coordinate {
    fn from(value: Option<f64>) -> Self {
        value.map(Coordinate::Degrees).unwrap_or_else(Coordinate::unknown)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geolocation {
    pub country: String,
    pub region: String,
    pub city: String,
    pub latitude: Coordinate,
    pub longitude: Coordinate,
}

/// A received record plus its enrichment, serialized as one log line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    #[serde(flatten)]
    pub record: Map<String, Value>,
    pub server: ServerInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geolocation: Option<Geolocation>,
}

impl LogEntry {
    /// Builds an entry, letting enrichment replace any client-supplied
    /// `server` key and, when a lookup matched, any `geolocation` key.
    pub fn new(
        mut record: Map<String, Value>,
        server: ServerInfo,
        geolocation: Option<Geolocation>,
    ) -> Self {
        record.remove("server");
        if geolocation.is_some() {
            record.remove("geolocation");
        }

        Self {
            record,
            server,
            geolocation,
        }
    }

    /// Session identifier the client reported, if any.
    pub fn session_id(&self) -> Option<&Value> {
        self.record.get("sessionId").filter(|value| !value.is_null())
    }

    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}
