use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Acknowledgement returned for every accepted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackResponse {
    pub status: String,
    pub timestamp: i64,
    pub session_id: Value,
}

impl TrackResponse {
    pub fn success(timestamp: i64, session_id: Value) -> Self {
        Self {
            status: "success".to_string(),
            timestamp,
            session_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
