use std::{io, path::PathBuf};

use anyhow::Result;
use beacon_ingest::config::{self, CliIngestOptions, EnvIngestOptions};
use clap::{ArgAction, Parser};
use tracing_subscriber::EnvFilter;

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "beacon-ingest", version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Path to the TOML configuration file (reads the [ingest] table)
    #[arg(long = "config", value_name = "FILE", env = "BEACON_CONFIG")]
    config_path: Option<PathBuf>,

    /// Optional log filter (e.g. info, debug, beacon_ingest=trace)
    #[arg(long = "log-level", value_name = "LEVEL")]
    log_level: Option<String>,

    /// Host to bind
    #[arg(long = "host", value_name = "HOST")]
    host: Option<String>,

    /// Port to bind
    #[arg(long = "port", value_name = "PORT")]
    port: Option<u16>,

    /// Directory under which tracking/YYYY/MM/ partitions are created
    #[arg(long = "log-root", value_name = "DIR")]
    log_root: Option<PathBuf>,

    /// Route accepting tracking events
    #[arg(long = "route", value_name = "PATH")]
    route: Option<String>,

    /// Take the caller IP from the first X-Forwarded-For hop
    #[arg(long = "trust-forwarded-for", action = ArgAction::SetTrue)]
    trust_forwarded_for: bool,

    /// JSON geolocation table; geolocation is skipped when absent
    #[arg(long = "geo-table", value_name = "FILE")]
    geo_table: Option<PathBuf>,

    /// Largest accepted request body in bytes; larger bodies get a 400
    #[arg(long = "max-body-bytes", value_name = "BYTES")]
    max_body_bytes: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(args.log_level.as_deref());
    tracing::info!(
        "{}",
        beacon_build_info::formatted_banner("beacon-ingest", SERVER_VERSION)
    );

    let cli = CliIngestOptions {
        host: args.host,
        port: args.port,
        log_root: args.log_root,
        route: args.route,
        trust_forwarded_for: args.trust_forwarded_for.then_some(true),
        geo_table: args.geo_table,
        max_body_bytes: args.max_body_bytes,
    };

    let file_cfg = config::load_file_config(args.config_path.as_deref())?;
    let resolved = config::resolve(&cli, &EnvIngestOptions::from_env(), file_cfg.as_ref())?;

    beacon_ingest::run_http_server(resolved).await
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr);

    let _ = builder.try_init();
}
