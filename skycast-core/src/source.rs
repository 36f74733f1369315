//! Source adapters: one per weather provider, all normalizing to the
//! same hourly contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::error::SourceError;
use crate::model::{Coordinates, CurrentConditions, DailyRecord, HourlyRecord};

pub mod commercial;
pub mod national;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    /// Regional open-data service, authoritative inside its coverage
    /// area, no API key and no metering.
    National,
    /// Global vendor with broad coverage and a metered daily quota.
    Commercial,
}

impl SourceId {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::National => "national",
            SourceId::Commercial => "commercial",
        }
    }

    pub const fn all() -> &'static [SourceId] {
        &[SourceId::National, SourceId::Commercial]
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for SourceId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "national" => Ok(SourceId::National),
            "commercial" => Ok(SourceId::Commercial),
            _ => Err(anyhow::anyhow!(
                "Unknown source '{value}'. Supported sources: national, commercial."
            )),
        }
    }
}

/// A geocoded place as resolved by the commercial provider.
#[derive(Debug, Clone)]
pub struct LocatedPlace {
    pub name: String,
    pub coordinates: Coordinates,
}

/// Conditions, daily outlook and timezone offset; always fetched from
/// the commercial provider since the national source carries no
/// multi-day forecast.
#[derive(Debug, Clone)]
pub struct ForecastOverview {
    pub current: CurrentConditions,
    pub daily: Vec<DailyRecord>,
    pub timezone_offset_seconds: i32,
}

/// The contract both adapters share: 24 hours of forecast for a point,
/// or `SourceUnavailable` on any transport, decode or empty-result
/// condition. `QuotaExceeded` is raised before any network call when the
/// provider's daily ceiling is reached.
#[async_trait]
pub trait HourlySource: Send + Sync + Debug {
    fn id(&self) -> SourceId;

    async fn fetch_hourly(&self, coords: Coordinates) -> Result<Vec<HourlyRecord>, SourceError>;
}

/// Commercial-only operations the orchestrator needs on top of the
/// hourly contract: geocoding and the overview data every bundle
/// carries. Lookups that miss return `Ok(None)` so the orchestrator can
/// distinguish "no such place" from an outage.
#[async_trait]
pub trait OverviewSource: HourlySource {
    async fn geocode(&self, place: &str) -> Result<Option<LocatedPlace>, SourceError>;

    async fn locate(&self, coords: Coordinates) -> Result<Option<LocatedPlace>, SourceError>;

    async fn fetch_overview(&self, coords: Coordinates)
    -> Result<ForecastOverview, SourceError>;
}
