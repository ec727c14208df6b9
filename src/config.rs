use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

pub const CONFIG_ENV: &str = "FORMRELAY_CONFIG";

const DEFAULT_SERVER_URL: &str = "http://localhost:8080/xforms-server";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read client config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse server URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("request_retries must be at least 1")]
    NoAttempts,
}

/// Which batches are worth sending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeferredMode {
    /// Every batch is sent.
    #[default]
    AlwaysActivate,
    /// Batches made only of events inside deferred regions are held.
    Deferred,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server_url: String,
    pub incremental_delay_ms: u64,
    pub force_incremental_delay_ms: u64,
    pub short_delay_ms: u64,
    pub progress_delay_ms: u64,
    /// Total attempts per request, the first one included.
    pub request_retries: u32,
    pub request_timeout_ms: u64,
    pub deferred_mode: DeferredMode,
    pub deferred_hold_timeout_ms: Option<u64>,
    pub heartbeat_interval_ms: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            incremental_delay_ms: 500,
            force_incremental_delay_ms: 2000,
            short_delay_ms: 10,
            progress_delay_ms: 500,
            request_retries: 3,
            request_timeout_ms: 30_000,
            deferred_mode: DeferredMode::AlwaysActivate,
            deferred_hold_timeout_ms: None,
            heartbeat_interval_ms: None,
        }
    }
}

impl ClientConfig {
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config = if let Some(path) = config_path {
            if path.exists() {
                let contents = fs::read_to_string(path)?;
                serde_yaml::from_str(&contents)?
            } else {
                Self::default()
            }
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from the file named by `FORMRELAY_CONFIG`, if any.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(std::env::var_os(CONFIG_ENV).map(PathBuf::from))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.server_url)?;
        if self.request_retries == 0 {
            return Err(ConfigError::NoAttempts);
        }
        Ok(())
    }

    pub fn server_url(&self) -> Result<Url, ConfigError> {
        Ok(Url::parse(&self.server_url)?)
    }

    pub fn incremental_delay(&self) -> Duration {
        Duration::from_millis(self.incremental_delay_ms)
    }

    pub fn force_incremental_delay(&self) -> Duration {
        Duration::from_millis(self.force_incremental_delay_ms)
    }

    pub fn short_delay(&self) -> Duration {
        Duration::from_millis(self.short_delay_ms)
    }

    pub fn progress_delay(&self) -> Duration {
        Duration::from_millis(self.progress_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn deferred_hold_timeout(&self) -> Option<Duration> {
        self.deferred_hold_timeout_ms.map(Duration::from_millis)
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.heartbeat_interval_ms.map(Duration::from_millis)
    }
}
