//! Optional IP geolocation.
//!
//! The server resolves one [`GeoLookup`] at startup, or none at all. With no
//! lookup configured, entries are persisted without a `geolocation` object.

use std::{
    fs,
    net::IpAddr,
    path::{Path, PathBuf},
};

use beacon_common::{Geolocation, UNKNOWN};
use serde::Deserialize;
use thiserror::Error;

pub trait GeoLookup: Send + Sync {
    fn lookup(&self, ip: IpAddr) -> Option<GeoRecord>;
}

/// Raw lookup result; any missing field is written as `"unknown"`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GeoRecord {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl GeoRecord {
    pub fn into_geolocation(self) -> Geolocation {
        let or_unknown = |value: Option<String>| value.unwrap_or_else(|| UNKNOWN.to_string());
        Geolocation {
            country: or_unknown(self.country),
            region: or_unknown(self.region),
            city: or_unknown(self.city),
            latitude: self.latitude.into(),
            longitude: self.longitude.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("failed to read geolocation table {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse geolocation table: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid network '{0}' in geolocation table")]
    InvalidNetwork(String),
}

#[derive(Deserialize)]
struct RawTable {
    networks: Vec<RawNetwork>,
}

#[derive(Deserialize)]
struct RawNetwork {
    network: String,
    #[serde(flatten)]
    record: GeoRecord,
}

#[derive(Debug, Clone)]
struct Network {
    base: IpAddr,
    prefix: u8,
    record: GeoRecord,
}

impl Network {
    fn parse(raw: RawNetwork) -> Result<Self, GeoError> {
        let invalid = || GeoError::InvalidNetwork(raw.network.clone());
        let (addr, prefix) = match raw.network.split_once('/') {
            Some((addr, prefix)) => {
                let addr: IpAddr = addr.trim().parse().map_err(|_| invalid())?;
                let prefix: u8 = prefix.trim().parse().map_err(|_| invalid())?;
                (addr, prefix)
            }
            None => {
                let addr: IpAddr = raw.network.trim().parse().map_err(|_| invalid())?;
                let full = if addr.is_ipv4() { 32 } else { 128 };
                (addr, full)
            }
        };

        let max = if addr.is_ipv4() { 32 } else { 128 };
        if prefix > max {
            return Err(invalid());
        }

        Ok(Self {
            base: addr,
            prefix,
            record: raw.record,
        })
    }

    fn contains(&self, ip: IpAddr) -> bool {
        match (self.base, ip) {
            (IpAddr::V4(base), IpAddr::V4(ip)) => {
                let mask = u32::MAX.checked_shl(32 - u32::from(self.prefix)).unwrap_or(0);
                u32::from(base) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(base), IpAddr::V6(ip)) => {
                let mask = u128::MAX.checked_shl(128 - u32::from(self.prefix)).unwrap_or(0);
                u128::from(base) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

/// Static table of CIDR networks, matched longest prefix first.
///
/// ```json
/// {"networks": [{"network": "203.0.113.0/24", "country": "France", "city": "Paris",
///                "latitude": 48.85, "longitude": 2.35}]}
/// ```
#[derive(Debug, Clone, Default)]
pub struct GeoTable {
    networks: Vec<Network>,
}

impl GeoTable {
    pub fn load(path: &Path) -> Result<Self, GeoError> {
        let contents = fs::read_to_string(path).map_err(|source| GeoError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, GeoError> {
        let raw: RawTable = serde_json::from_str(contents)?;
        let mut networks = raw
            .networks
            .into_iter()
            .map(Network::parse)
            .collect::<Result<Vec<_>, _>>()?;
        networks.sort_by(|a, b| b.prefix.cmp(&a.prefix));
        Ok(Self { networks })
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}

impl GeoLookup for GeoTable {
    fn lookup(&self, ip: IpAddr) -> Option<GeoRecord> {
        self.networks
            .iter()
            .find(|network| network.contains(ip))
            .map(|network| network.record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = r#"{
        "networks": [
            {"network": "203.0.113.0/24", "country": "France", "city": "Paris", "latitude": 48.85, "longitude": 2.35},
            {"network": "203.0.113.128/25", "country": "France", "region": "Normandie", "city": "Rouen"},
            {"network": "2001:db8::/32", "country": "Japan"},
            {"network": "0.0.0.0/0", "country": "Elsewhere"}
        ]
    }"#;

    #[test]
    fn longest_prefix_wins() {
        let table = GeoTable::from_json(TABLE).expect("parse table");
        assert_eq!(table.len(), 4);

        let rouen = table.lookup("203.0.113.200".parse().unwrap()).expect("match");
        assert_eq!(rouen.city.as_deref(), Some("Rouen"));

        let paris = table.lookup("203.0.113.7".parse().unwrap()).expect("match");
        assert_eq!(paris.city.as_deref(), Some("Paris"));

        let other = table.lookup("198.51.100.1".parse().unwrap()).expect("match");
        assert_eq!(other.country.as_deref(), Some("Elsewhere"));
    }

    #[test]
    fn ipv6_networks_do_not_match_ipv4() {
        let table = GeoTable::from_json(
            r#"{"networks": [{"network": "2001:db8::/32", "country": "Japan"}]}"#,
        )
        .expect("parse table");

        assert!(table.lookup("2001:db8::1".parse().unwrap()).is_some());
        assert!(table.lookup("10.0.0.1".parse().unwrap()).is_none());
    }

    #[test]
    fn missing_fields_become_unknown() {
        let table = GeoTable::from_json(TABLE).expect("parse table");
        let geo = table
            .lookup("2001:db8::1".parse().unwrap())
            .expect("match")
            .into_geolocation();

        assert_eq!(geo.country, "Japan");
        assert_eq!(geo.region, UNKNOWN);
        assert_eq!(geo.city, UNKNOWN);
        assert_eq!(geo.latitude, beacon_common::Coordinate::unknown());
    }

    #[test]
    fn rejects_bad_networks() {
        let err = GeoTable::from_json(r#"{"networks": [{"network": "10.0.0.0/40"}]}"#).unwrap_err();
        assert!(matches!(err, GeoError::InvalidNetwork(_)));

        let err = GeoTable::from_json(r#"{"networks": [{"network": "not-an-ip"}]}"#).unwrap_err();
        assert!(matches!(err, GeoError::InvalidNetwork(_)));
    }
}
