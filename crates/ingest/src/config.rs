use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_LOG_ROOT: &str = "/var/log/beacon";
pub const DEFAULT_ROUTE: &str = "/api/track";
pub const DEFAULT_MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Fully resolved runtime configuration for the ingest server.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestConfig {
    pub host: String,
    pub port: u16,
    pub log_root: PathBuf,
    pub route: String,
    pub trust_forwarded_for: bool,
    pub geo_table: Option<PathBuf>,
    pub max_body_bytes: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            log_root: PathBuf::from(DEFAULT_LOG_ROOT),
            route: DEFAULT_ROUTE.to_string(),
            trust_forwarded_for: false,
            geo_table: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl IngestConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Default, Clone)]
pub struct CliIngestOptions {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub log_root: Option<PathBuf>,
    pub route: Option<String>,
    pub trust_forwarded_for: Option<bool>,
    pub geo_table: Option<PathBuf>,
    pub max_body_bytes: Option<usize>,
}

/// Values read from the environment, kept separate so resolution stays testable.
#[derive(Debug, Default, Clone)]
pub struct EnvIngestOptions {
    pub log_root: Option<PathBuf>,
}

impl EnvIngestOptions {
    pub fn from_env() -> Self {
        Self {
            log_root: std::env::var("BEACON_LOG_ROOT")
                .ok()
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct FileIngestConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub log_root: Option<PathBuf>,
    pub route: Option<String>,
    pub trust_forwarded_for: Option<bool>,
    pub geo_table: Option<PathBuf>,
    pub max_body_bytes: Option<usize>,
}

#[derive(Deserialize)]
struct RootConfig {
    #[serde(default)]
    ingest: Option<RawFileIngestConfig>,
}

#[derive(Deserialize, Default)]
struct RawFileIngestConfig {
    host: Option<String>,
    port: Option<u16>,
    log_root: Option<String>,
    route: Option<String>,
    trust_forwarded_for: Option<bool>,
    max_body_bytes: Option<usize>,
    geo: Option<RawGeoConfig>,
}

#[derive(Deserialize, Default)]
struct RawGeoConfig {
    table: Option<String>,
}

/// Reads the `[ingest]` table from a TOML file. A missing file is not an error.
pub fn load_file_config(path: Option<&Path>) -> Result<Option<FileIngestConfig>> {
    let Some(path) = path else {
        return Ok(None);
    };

    if !path.exists() {
        tracing::debug!("config file {} not found, using defaults", path.display());
        return Ok(None);
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read ingest config from {}", path.display()))?;
    let parsed: RootConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse TOML config {}", path.display()))?;

    Ok(parsed
        .ingest
        .map(|raw| raw.into_runtime_config(path.parent().unwrap_or(Path::new(".")))))
}

/// Merges configuration sources. Precedence: CLI, then environment, then file, then defaults.
pub fn resolve(
    cli: &CliIngestOptions,
    env: &EnvIngestOptions,
    file_cfg: Option<&FileIngestConfig>,
) -> Result<IngestConfig> {
    let defaults = IngestConfig::default();

    let host = cli
        .host
        .clone()
        .or_else(|| file_cfg.and_then(|cfg| cfg.host.clone()))
        .unwrap_or(defaults.host);

    let port = cli
        .port
        .or_else(|| file_cfg.and_then(|cfg| cfg.port))
        .unwrap_or(defaults.port);

    let log_root = cli
        .log_root
        .clone()
        .or_else(|| env.log_root.clone())
        .or_else(|| file_cfg.and_then(|cfg| cfg.log_root.clone()))
        .unwrap_or(defaults.log_root);

    let route = cli
        .route
        .clone()
        .or_else(|| file_cfg.and_then(|cfg| cfg.route.clone()))
        .unwrap_or(defaults.route);

    if !route.starts_with('/') {
        return Err(anyhow!("Ingest route '{}' must start with '/'", route));
    }
    if route == "/health" {
        return Err(anyhow!("Ingest route cannot shadow the /health endpoint"));
    }

    let trust_forwarded_for = cli
        .trust_forwarded_for
        .or_else(|| file_cfg.and_then(|cfg| cfg.trust_forwarded_for))
        .unwrap_or(defaults.trust_forwarded_for);

    let geo_table = cli
        .geo_table
        .clone()
        .or_else(|| file_cfg.and_then(|cfg| cfg.geo_table.clone()));

    let max_body_bytes = cli
        .max_body_bytes
        .or_else(|| file_cfg.and_then(|cfg| cfg.max_body_bytes))
        .unwrap_or(defaults.max_body_bytes);
    if max_body_bytes == 0 {
        return Err(anyhow!("max_body_bytes must be greater than zero"));
    }

    Ok(IngestConfig {
        host,
        port,
        log_root,
        route,
        trust_forwarded_for,
        geo_table,
        max_body_bytes,
    })
}

fn resolve_relative(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

impl RawFileIngestConfig {
    fn into_runtime_config(self, base: &Path) -> FileIngestConfig {
        FileIngestConfig {
            host: self.host,
            port: self.port,
            log_root: self
                .log_root
                .map(|value| resolve_relative(base, Path::new(&value))),
            route: self.route,
            trust_forwarded_for: self.trust_forwarded_for,
            max_body_bytes: self.max_body_bytes,
            geo_table: self
                .geo
                .and_then(|geo| geo.table)
                .map(|value| resolve_relative(base, Path::new(&value))),
        }
    }
}
