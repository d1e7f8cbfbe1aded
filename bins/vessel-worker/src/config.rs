// Worker configuration, read from the environment
use anyhow::{bail, Context, Result};
use std::time::Duration;
use vessel_common::config::{StoreConfig, DATA_DIR_ENV, DEFAULT_DATA_DIR};

pub const POLL_INTERVAL_ENV: &str = "VESSEL_POLL_INTERVAL_SECS";
pub const MAX_CONCURRENT_CHECKS_ENV: &str = "VESSEL_MAX_CONCURRENT_CHECKS";
pub const LOG_FORMAT_ENV: &str = "VESSEL_LOG_FORMAT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub store: StoreConfig,
    pub poll_interval: Duration,
    pub max_concurrent_checks: usize,
    pub log_format: LogFormat,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let data_dir = get(DATA_DIR_ENV).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());

        let poll_secs: u64 = match get(POLL_INTERVAL_ENV) {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("{} must be a whole number of seconds, got '{}'", POLL_INTERVAL_ENV, raw))?,
            None => 5,
        };
        if poll_secs == 0 {
            bail!("{} must be at least 1", POLL_INTERVAL_ENV);
        }

        let max_concurrent_checks: usize = match get(MAX_CONCURRENT_CHECKS_ENV) {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("{} must be a positive integer, got '{}'", MAX_CONCURRENT_CHECKS_ENV, raw))?,
            None => 8,
        };
        if max_concurrent_checks == 0 {
            bail!("{} must be at least 1", MAX_CONCURRENT_CHECKS_ENV);
        }

        let log_format = match get(LOG_FORMAT_ENV).as_deref().map(str::to_lowercase).as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => bail!("{} must be 'text' or 'json', got '{}'", LOG_FORMAT_ENV, other),
        };

        Ok(Self {
            store: StoreConfig::new(data_dir),
            poll_interval: Duration::from_secs(poll_secs),
            max_concurrent_checks,
            log_format,
        })
    }
}
