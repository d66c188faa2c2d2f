//! Build metadata baked in by `build.rs`, used for startup banners.

use once_cell::sync::Lazy;

#[derive(Debug)]
struct BuildMeta {
    build_id: &'static str,
    build_time: &'static str,
    git_label: &'static str,
}

static META: Lazy<BuildMeta> = Lazy::new(|| BuildMeta {
    build_id: option_env!("BEACON_BUILD_ID").unwrap_or("unknown build"),
    build_time: option_env!("BEACON_BUILD_TIME").unwrap_or("unknown time"),
    git_label: option_env!("BEACON_BUILD_GIT").unwrap_or("unknown git"),
});

/// Full build identifier, e.g. `2026-10-17 09:12:44 UTC | v0.1.0-3-g8a4f1d2`.
pub fn build_id() -> &'static str {
    META.build_id
}

pub fn build_timestamp() -> &'static str {
    META.build_time
}

pub fn git_label() -> &'static str {
    META.git_label
}

/// One-line banner logged by binaries at startup.
pub fn formatted_banner(package: &str, version: &str) -> String {
    format!("{} {} | {}", package, version, build_id())
}
