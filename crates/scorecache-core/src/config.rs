//! Sync configuration management.
//!
//! This module handles loading and saving the feed and cache settings:
//! upstream URL and key, cache TTL, live-poll cadence and the prefetch
//! window. Configuration is stored at `~/.config/scorecache/config.json`
//! and individual fields can be overridden from the environment.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::{CachePolicy, PollerPolicy, PrefetchPolicy};

/// Application name used for config directory paths
const APP_NAME: &str = "scorecache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const ENV_FEED_URL: &str = "SCORECACHE_FEED_URL";
pub const ENV_API_KEY: &str = "SCORECACHE_API_KEY";
pub const ENV_TIMEZONE: &str = "SCORECACHE_TZ";

const DEFAULT_FEED_URL: &str = "https://api.sportsfeed.example.com/v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub feed_base_url: String,
    pub api_key: Option<String>,
    pub default_timezone: Option<String>,
    pub cache_ttl_secs: u64,
    pub live_poll_secs: u64,
    /// Poll cycles between checks for a full day refetch.
    pub full_refresh_every: u32,
    pub prefetch_days: u32,
    pub prefetch_batch_size: usize,
    pub prefetch_pause_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            feed_base_url: DEFAULT_FEED_URL.to_string(),
            api_key: None,
            default_timezone: None,
            cache_ttl_secs: 120,
            live_poll_secs: 30,
            full_refresh_every: 2,
            prefetch_days: 7,
            prefetch_batch_size: 3,
            prefetch_pause_ms: 1500,
            request_timeout_secs: 15,
        }
    }
}

impl SyncConfig {
    /// Load from the config file (defaults if absent), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Apply overrides from a variable lookup. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = get(ENV_FEED_URL) {
            self.feed_base_url = url;
        }
        if let Some(key) = get(ENV_API_KEY) {
            self.api_key = Some(key);
        }
        if let Some(tz) = get(ENV_TIMEZONE) {
            self.default_timezone = Some(tz);
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy {
            ttl: Duration::from_secs(self.cache_ttl_secs),
            fetch_timeout: self.request_timeout(),
        }
    }

    pub fn poller_policy(&self) -> PollerPolicy {
        PollerPolicy {
            interval: Duration::from_secs(self.live_poll_secs.max(1)),
            full_refresh_every: self.full_refresh_every.max(1),
        }
    }

    pub fn prefetch_policy(&self) -> PrefetchPolicy {
        PrefetchPolicy {
            window_days: self.prefetch_days,
            batch_size: self.prefetch_batch_size.max(1),
            pause: Duration::from_millis(self.prefetch_pause_ms),
        }
    }
}
