// Runtime configuration.
// Loads settings from config.toml with environment overrides for the API base.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::Deserialize;

use crate::error::{Result, RunwatchError};
use crate::github::GITHUB_API_BASE;

/// Upper bound for every `*_secs` setting: one day.
const MAX_SECS: u64 = 24 * 60 * 60;

/// Settings for the client, cache and poller.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Base URL of the GitHub REST API.
    pub api_base: String,
    /// How long a check is trusted before the upstream is asked again.
    pub freshness_window_secs: u64,
    /// Interval between scheduled polls of each displayed repository.
    pub poll_interval_secs: u64,
    /// Number of recent runs requested per repository.
    pub page_size: u32,
    /// Upper bound on a single upstream request.
    pub request_timeout_secs: u64,
    /// First delay after an upstream failure; 0 retries on every invocation.
    pub backoff_base_secs: u64,
    /// Where record files live; defaults to the platform cache directory.
    pub cache_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: GITHUB_API_BASE.to_string(),
            freshness_window_secs: 60,
            poll_interval_secs: 60,
            page_size: 5,
            request_timeout_secs: 10,
            backoff_base_secs: 5,
            cache_dir: None,
        }
    }
}

impl Config {
    /// Default location of the config file (~/.config/runwatch/config.toml on Linux).
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "runwatch").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from an explicit path, or the default path if it exists, then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };

        if let Ok(api_base) = std::env::var("RUNWATCH_API_BASE") {
            if !api_base.trim().is_empty() {
                config.api_base = api_base;
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| RunwatchError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.page_size) {
            return Err(RunwatchError::Config(format!(
                "page_size must be between 1 and 100, got {}",
                self.page_size
            )));
        }
        if self.freshness_window_secs == 0 {
            return Err(RunwatchError::Config(
                "freshness_window_secs must be greater than zero".to_string(),
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(RunwatchError::Config(
                "poll_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(RunwatchError::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        for (field, secs) in [
            ("freshness_window_secs", self.freshness_window_secs),
            ("poll_interval_secs", self.poll_interval_secs),
            ("request_timeout_secs", self.request_timeout_secs),
            ("backoff_base_secs", self.backoff_base_secs),
        ] {
            if secs > MAX_SECS {
                return Err(RunwatchError::Config(format!(
                    "{} must be at most {}, got {}",
                    field, MAX_SECS, secs
                )));
            }
        }
        Ok(())
    }

    pub fn freshness_window(&self) -> Duration {
        Duration::from_secs(self.freshness_window_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_secs(self.backoff_base_secs)
    }
}
