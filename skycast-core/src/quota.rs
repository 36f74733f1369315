//! Daily API usage accounting per provider.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::{NaiveDate, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::source::SourceId;

/// Hard ceiling for the commercial provider's free tier.
pub const COMMERCIAL_DAILY_LIMIT: u32 = 1000;
/// The predicate turns false at the warning mark, before the hard
/// ceiling, so a search never burns the last calls of the day.
pub const COMMERCIAL_WARNING_THRESHOLD: u32 = 900;

const DAY_FORMAT: &str = "%Y-%m-%d";

/// Call counter keyed by calendar day (UTC) and provider. An explicitly
/// constructed value shared by reference with whoever meters calls;
/// there is no module-global state.
///
/// Sources without a configured threshold are unmetered and always pass
/// the predicate. Counts for past days are pruned on write.
#[derive(Debug)]
pub struct QuotaTracker {
    thresholds: HashMap<SourceId, u32>,
    counts: HashMap<(NaiveDate, SourceId), u32>,
}

impl Default for QuotaTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl QuotaTracker {
    /// Tracker with the default commercial threshold; the national
    /// open-data endpoint is unmetered.
    pub fn new() -> Self {
        let mut thresholds = HashMap::new();
        thresholds.insert(SourceId::Commercial, COMMERCIAL_WARNING_THRESHOLD);
        Self { thresholds, counts: HashMap::new() }
    }

    pub fn with_threshold(mut self, source: SourceId, threshold: u32) -> Self {
        self.thresholds.insert(source, threshold);
        self
    }

    /// True when `source` may still be called today.
    pub fn is_under_limit(&self, source: SourceId) -> bool {
        self.is_under_limit_on(Utc::now().date_naive(), source)
    }

    /// Count one call against today's ceiling.
    pub fn record_call(&mut self, source: SourceId) {
        self.record_call_on(Utc::now().date_naive(), source);
    }

    pub fn used_today(&self, source: SourceId) -> u32 {
        self.used_on(Utc::now().date_naive(), source)
    }

    pub fn threshold(&self, source: SourceId) -> Option<u32> {
        self.thresholds.get(&source).copied()
    }

    fn is_under_limit_on(&self, day: NaiveDate, source: SourceId) -> bool {
        match self.thresholds.get(&source) {
            Some(&threshold) => self.used_on(day, source) < threshold,
            None => true,
        }
    }

    fn record_call_on(&mut self, day: NaiveDate, source: SourceId) {
        self.counts.retain(|(counted_day, _), _| *counted_day == day);
        *self.counts.entry((day, source)).or_insert(0) += 1;
    }

    fn used_on(&self, day: NaiveDate, source: SourceId) -> u32 {
        self.counts.get(&(day, source)).copied().unwrap_or(0)
    }

    /// Load today's counters from disk, or start fresh when the file is
    /// missing or belongs to a past day.
    pub fn load() -> Result<Self> {
        let path = Self::usage_file_path()?;
        if !path.exists() {
            return Ok(Self::new());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read usage file: {}", path.display()))?;

        let file: UsageFile = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse usage file: {}", path.display()))?;

        let mut tracker = Self::new();
        let today = Utc::now().date_naive();
        if let Ok(day) = NaiveDate::parse_from_str(&file.day, DAY_FORMAT) {
            if day == today {
                for (name, used) in file.calls {
                    if let Ok(source) = SourceId::try_from(name.as_str()) {
                        tracker.counts.insert((day, source), used);
                    }
                }
            }
        }
        Ok(tracker)
    }

    /// Persist today's counters, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::usage_file_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create usage directory: {}", parent.display())
            })?;
        }

        let today = Utc::now().date_naive();
        let calls = self
            .counts
            .iter()
            .filter(|((day, _), _)| *day == today)
            .map(|((_, source), used)| (source.to_string(), *used))
            .collect();

        let file = UsageFile { day: today.format(DAY_FORMAT).to_string(), calls };
        let toml = toml::to_string_pretty(&file).context("Failed to serialize usage to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write usage file: {}", path.display()))?;

        Ok(())
    }

    fn usage_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "skycast", "skycast")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("usage.toml"))
    }
}

/// On-disk shape: one day's counters, keyed by source name.
#[derive(Debug, Serialize, Deserialize)]
struct UsageFile {
    day: String,
    calls: HashMap<String, u32>,
}
