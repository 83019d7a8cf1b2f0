//! Configuration loading from TOML with environment variable overrides.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every section carries defaults so a partial file still parses; the
//! database URL may be overridden at runtime via `ALCHEMY_ARB_DATABASE_URL`.

use anyhow::{bail, Context, Result};
use chrono::NaiveTime;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::market::albion::DEFAULT_BASE_URL;

/// Env var that overrides `storage.database_url`.
pub const DATABASE_URL_ENV: &str = "ALCHEMY_ARB_DATABASE_URL";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub engine: EngineConfig,
    pub cache: CacheConfig,
    pub scheduler: SchedulerConfig,
    pub feed: FeedConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "ALCHEMY-ARB".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub database_url: String,
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://alchemy_arb.db".to_string(),
            max_connections: 8,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    /// Minutes between scheduled opportunity scans.
    pub interval_minutes: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { interval_minutes: 2 }
    }
}

impl EngineConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes * 60)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub quote_ttl_secs: u64,
    pub opportunities_ttl_secs: u64,
    pub weekly_averages_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            quote_ttl_secs: 300,
            opportunities_ttl_secs: 120,
            weekly_averages_ttl_secs: 3600,
        }
    }
}

impl CacheConfig {
    pub fn quote_ttl(&self) -> Duration {
        Duration::from_secs(self.quote_ttl_secs)
    }

    pub fn opportunities_ttl(&self) -> Duration {
        Duration::from_secs(self.opportunities_ttl_secs)
    }

    pub fn weekly_averages_ttl(&self) -> Duration {
        Duration::from_secs(self.weekly_averages_ttl_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SchedulerConfig {
    /// `HH:MM` (UTC) of the nightly rollover.
    pub rollover_time: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            rollover_time: "00:00".to_string(),
        }
    }
}

impl SchedulerConfig {
    /// Parse `rollover_time` into a wall-clock time.
    pub fn rollover_at(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(&self.rollover_time, "%H:%M")
            .with_context(|| format!("Invalid rollover_time: {}", self.rollover_time))
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FeedConfig {
    pub enabled: bool,
    pub base_url: String,
    pub poll_interval_minutes: u64,
    /// Pause between per-item requests, to stay polite with the public API.
    pub request_delay_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval_minutes: 5,
            request_delay_ms: 1000,
        }
    }
}

impl FeedConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_minutes * 60)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 5000,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file, apply env overrides and validate.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let mut config = Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string (no env overrides).
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Apply runtime overrides from the environment.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = Self::resolve_env(DATABASE_URL_ENV) {
            self.storage.database_url = url;
        }
    }

    /// Reject values that would stall the scheduler or the pool.
    pub fn validate(&self) -> Result<()> {
        if self.engine.interval_minutes == 0 {
            bail!("engine.interval_minutes must be at least 1");
        }
        if self.storage.max_connections == 0 {
            bail!("storage.max_connections must be at least 1");
        }
        if self.feed.enabled && self.feed.poll_interval_minutes == 0 {
            bail!("feed.poll_interval_minutes must be at least 1");
        }
        self.scheduler.rollover_at()?;
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
