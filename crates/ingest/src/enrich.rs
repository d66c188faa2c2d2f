use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use axum::http::{
    header::{CONTENT_TYPE, REFERER, USER_AGENT},
    HeaderMap, HeaderName, Method,
};
use beacon_common::{Geolocation, LogEntry, ServerInfo, UNKNOWN};
use serde_json::{Map, Value};

use crate::geo::GeoLookup;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Adds request-derived metadata to received records.
#[derive(Clone, Default)]
pub struct Enricher {
    geo: Option<Arc<dyn GeoLookup>>,
    trust_forwarded_for: bool,
}

impl Enricher {
    pub fn new(geo: Option<Arc<dyn GeoLookup>>, trust_forwarded_for: bool) -> Self {
        Self {
            geo,
            trust_forwarded_for,
        }
    }

    pub fn has_geolocation(&self) -> bool {
        self.geo.is_some()
    }

    pub fn enrich(
        &self,
        record: Map<String, Value>,
        method: &Method,
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
        timestamp: i64,
    ) -> LogEntry {
        let server = self.server_info(method, headers, peer, timestamp);
        let geolocation = self.geolocation(&server.ip);
        LogEntry::new(record, server, geolocation)
    }

    pub fn server_info(
        &self,
        method: &Method,
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
        timestamp: i64,
    ) -> ServerInfo {
        ServerInfo {
            timestamp,
            ip: self.client_ip(headers, peer),
            user_agent: header_or_unknown(headers, &USER_AGENT),
            referer: header_or_unknown(headers, &REFERER),
            request_method: method.as_str().to_string(),
            content_type: header_or_unknown(headers, &CONTENT_TYPE),
        }
    }

    /// Looks up `ip` when a geolocation source is configured. An unparsable
    /// address (including the `"unknown"` sentinel) never matches.
    pub fn geolocation(&self, ip: &str) -> Option<Geolocation> {
        let geo = self.geo.as_ref()?;
        let addr: IpAddr = ip.parse().ok()?;
        geo.lookup(addr).map(|record| record.into_geolocation())
    }

    fn client_ip(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
        if self.trust_forwarded_for {
            let forwarded = headers
                .get(X_FORWARDED_FOR)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.split(',').next())
                .and_then(|value| value.trim().parse::<IpAddr>().ok());
            match forwarded {
                Some(ip) => return ip.to_string(),
                None => tracing::debug!("no usable X-Forwarded-For hop, using peer address"),
            }
        }

        peer.map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| UNKNOWN.to_string())
    }
}

fn header_or_unknown(headers: &HeaderMap, name: &HeaderName) -> String {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| UNKNOWN.to_string())
}
