//! Configuration loading and resolution
//!
//! Each setting is resolved in priority order:
//! 1. Command-line argument or environment variable (filled in by the binary)
//! 2. TOML config file
//! 3. Compiled default
//!
//! The API credential has no default. Missing it is a startup error.

use crate::{Error, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// ProPublica Campaign Finance API root (cycle is appended)
pub const DEFAULT_API_BASE_URL: &str = "https://api.propublica.org/campaign-finance/v1";
/// Environment variable holding the API credential
pub const API_KEY_ENV: &str = "PRO_PUBLICA_API_KEY";
pub const DEFAULT_CYCLE: u16 = 2024;
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5780";
/// US Eastern (standard time); the regulator publishes on Eastern dates
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = -5;
pub const DEFAULT_FALLBACK_ROWS: u32 = 12;

/// Notification relay settings
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct NotifyConfig {
    /// HTTP endpoint of the mail relay; notifications are only logged when unset
    pub relay_url: Option<String>,
    /// Bearer token for the relay
    pub relay_token: Option<String>,
    pub from: Option<String>,
    pub recipients: Vec<String>,
}

/// Contents of `config.toml`; every field is optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub cycle: Option<u16>,
    pub api_key: Option<String>,
    pub api_base_url: Option<String>,
    pub database_path: Option<PathBuf>,
    pub bind_addr: Option<String>,
    pub utc_offset_hours: Option<i32>,
    pub fallback_rows: Option<u32>,
    pub fallback_days: Option<u32>,
    pub notify: NotifyConfig,
}

/// Highest-priority values (command line / environment)
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub cycle: Option<u16>,
    pub api_key: Option<String>,
    pub api_base_url: Option<String>,
    pub database_path: Option<PathBuf>,
    pub bind_addr: Option<String>,
    pub utc_offset_hours: Option<i32>,
    pub today: Option<NaiveDate>,
    pub fallback_rows: Option<u32>,
    pub fallback_days: Option<u32>,
}

/// Fully resolved application configuration, built once at startup
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Two-year reporting cycle used to scope API queries
    pub cycle: u16,
    pub api_key: String,
    pub api_base_url: String,
    pub database_path: PathBuf,
    pub bind_addr: String,
    pub utc_offset_hours: i32,
    pub today_override: Option<NaiveDate>,
    /// Rows shown when a date-scoped listing is empty
    pub fallback_rows: u32,
    /// Trailing received-date window tried before `fallback_rows`; 0 disables it
    pub fallback_days: u32,
    pub notify: NotifyConfig,
}

impl AppConfig {
    /// Merge overrides, file values and defaults
    ///
    /// Fails with [`Error::Config`] when no API key is available.
    pub fn resolve(overrides: ConfigOverrides, file: TomlConfig) -> Result<Self> {
        let api_key = overrides
            .api_key
            .or(file.api_key)
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                Error::Config(format!(
                    "missing API key: set {} or api_key in config.toml",
                    API_KEY_ENV
                ))
            })?;

        let api_base_url = overrides
            .api_base_url
            .or(file.api_base_url)
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        if !(api_base_url.starts_with("http://") || api_base_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "api_base_url must be an http(s) URL: {}",
                api_base_url
            )));
        }

        Ok(Self {
            cycle: overrides.cycle.or(file.cycle).unwrap_or(DEFAULT_CYCLE),
            api_key,
            api_base_url,
            database_path: overrides
                .database_path
                .or(file.database_path)
                .unwrap_or_else(default_database_path),
            bind_addr: overrides
                .bind_addr
                .or(file.bind_addr)
                .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            utc_offset_hours: overrides
                .utc_offset_hours
                .or(file.utc_offset_hours)
                .unwrap_or(DEFAULT_UTC_OFFSET_HOURS),
            today_override: overrides.today,
            fallback_rows: overrides
                .fallback_rows
                .or(file.fallback_rows)
                .unwrap_or(DEFAULT_FALLBACK_ROWS),
            fallback_days: overrides.fallback_days.or(file.fallback_days).unwrap_or(0),
            notify: file.notify,
        })
    }

    /// Business date ("today") for this deployment
    pub fn today(&self) -> NaiveDate {
        crate::time::business_today(self.utc_offset_hours, self.today_override)
    }

    /// Cycle-scoped API root, e.g. `https://.../v1/2024`
    pub fn api_root(&self) -> String {
        format!("{}/{}", self.api_base_url.trim_end_matches('/'), self.cycle)
    }
}

/// Load the TOML config file
///
/// An explicitly named file must exist. When no path is given the platform
/// default is tried, and its absence only produces a warning.
pub fn load_toml_config(path: Option<&Path>) -> Result<TomlConfig> {
    let (path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => match default_config_path() {
            Some(p) => (p, false),
            None => {
                warn!("Could not determine config directory, using defaults");
                return Ok(TomlConfig::default());
            }
        },
    };

    if !path.exists() {
        if explicit {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        warn!("No config file at {}, using defaults", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(&path)?;
    let config = toml::from_str::<TomlConfig>(&content)
        .map_err(|e| Error::Config(format!("Invalid config file {}: {}", path.display(), e)))?;
    info!("Loaded config file: {}", path.display());
    Ok(config)
}

/// `<config_dir>/ietrack/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("ietrack").join("config.toml"))
}

/// OS-dependent default database location
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("ietrack"))
        .unwrap_or_else(|| PathBuf::from("./ietrack_data"))
        .join("ietrack.db")
}
