//! Wire format emitted by the beacon client.
//!
//! Field names follow the camelCase JSON the ingest endpoint persists
//! verbatim, so renaming anything here changes the log format.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Pageview,
    Event,
}

/// One record as sent over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    pub timestamp: i64,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance: Option<PerformanceTimings>,
}

impl EventRecord {
    /// Named custom event. `data` is always present on the wire, even when empty.
    pub fn custom(
        name: impl Into<String>,
        data: Map<String, Value>,
        timestamp: i64,
        session_id: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            kind: EventKind::Event,
            event: Some(name.into()),
            data: Some(data),
            url: url.into(),
            title: None,
            referrer: None,
            timestamp,
            session_id: session_id.into(),
            device: None,
            performance: None,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn pageview(
        url: impl Into<String>,
        title: impl Into<String>,
        referrer: impl Into<String>,
        timestamp: i64,
        session_id: impl Into<String>,
        device: DeviceInfo,
        performance: PerformanceTimings,
    ) -> Self {
        Self {
            kind: EventKind::Pageview,
            event: None,
            data: None,
            url: url.into(),
            title: Some(title.into()),
            referrer: Some(referrer.into()),
            timestamp,
            session_id: session_id.into(),
            device: Some(device),
            performance: Some(performance),
        }
    }

    pub fn event_name(&self) -> Option<&str> {
        self.event.as_deref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    #[default]
    Desktop,
    Mobile,
    Tablet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    #[serde(rename = "type")]
    pub class: DeviceClass,
    pub user_agent: String,
    pub screen: ScreenInfo,
    pub viewport: Viewport,
    pub language: String,
    pub timezone: String,
    pub cookies_enabled: bool,
    pub online: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ScreenInfo {
    pub width: u32,
    pub height: u32,
    pub color_depth: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Navigation timings relative to navigation start, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceTimings {
    pub load_time: i64,
    pub dom_ready: i64,
    pub first_paint: f64,
}
