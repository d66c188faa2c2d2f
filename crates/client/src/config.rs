use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read beacon config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse beacon config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid beacon config: {0}")]
    Invalid(String),
}

/// Tunables for the beacon. Every field has a default, so a partial TOML
/// document only overrides what it names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeaconConfig {
    pub endpoint: String,
    pub session_timeout_secs: u64,
    pub check_interval_secs: u64,
    pub scroll_step: u32,
    pub click_text_limit: usize,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8080/api/track".to_string(),
            session_timeout_secs: 30 * 60,
            check_interval_secs: 60,
            scroll_step: 25,
            click_text_limit: 50,
        }
    }
}

impl BeaconConfig {
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("endpoint must not be empty".into()));
        }
        if self.scroll_step == 0 || self.scroll_step > 100 {
            return Err(ConfigError::Invalid(format!(
                "scroll_step must be within 1..=100, got {}",
                self.scroll_step
            )));
        }
        if self.check_interval_secs == 0 {
            return Err(ConfigError::Invalid("check_interval_secs must be positive".into()));
        }
        Ok(())
    }
}
