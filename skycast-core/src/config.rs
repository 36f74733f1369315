use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};

use crate::model::Coordinates;

/// Geographic bounding box of the national provider's coverage area.
/// Points inside it try the national source first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CoverageBounds {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl CoverageBounds {
    pub fn contains(&self, coords: Coordinates) -> bool {
        coords.lat >= self.lat_min
            && coords.lat <= self.lat_max
            && coords.lon >= self.lon_min
            && coords.lon <= self.lon_max
    }
}

impl Default for CoverageBounds {
    /// Finland and nearby waters.
    fn default() -> Self {
        Self { lat_min: 55.0, lat_max: 70.0, lon_min: 19.0, lon_max: 32.0 }
    }
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API key for the commercial provider. The national open-data
    /// endpoint needs none.
    pub commercial_api_key: Option<String>,

    /// Base URL overrides, mainly for pointing the adapters at a mock
    /// server in tests.
    pub commercial_base_url: String,
    pub national_base_url: String,

    /// Daily call ceiling and the warning mark at which the quota
    /// predicate starts failing.
    pub daily_quota_limit: u32,
    pub daily_quota_warning: u32,

    /// Minimum interval between the start of two searches.
    pub rate_limit_ms: u64,

    /// Per-request network timeout; a timed-out call counts as the
    /// source being unavailable.
    pub request_timeout_secs: u64,

    pub coverage: CoverageBounds,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            commercial_api_key: None,
            commercial_base_url: crate::source::commercial::DEFAULT_BASE_URL.to_string(),
            national_base_url: crate::source::national::DEFAULT_BASE_URL.to_string(),
            daily_quota_limit: crate::quota::COMMERCIAL_DAILY_LIMIT,
            daily_quota_warning: crate::quota::COMMERCIAL_WARNING_THRESHOLD,
            rate_limit_ms: 2000,
            request_timeout_secs: 10,
            coverage: CoverageBounds::default(),
        }
    }
}

impl Config {
    pub fn commercial_api_key(&self) -> Result<&str> {
        self.commercial_api_key.as_deref().ok_or_else(|| {
            anyhow!(
                "No API key configured for the commercial provider.\n\
                 Hint: run `skycast configure` and enter your API key."
            )
        })
    }

    pub fn set_commercial_api_key(&mut self, api_key: String) {
        self.commercial_api_key = Some(api_key);
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }

    pub fn rate_limit(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.rate_limit_ms)
    }

    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            // First run: no config file, return empty.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "skycast", "skycast")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }
}
