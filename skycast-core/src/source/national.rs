use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, DurationRound, SecondsFormat, Utc};
use reqwest::Client;

use crate::align::align_time_series;
use crate::error::SourceError;
use crate::model::{Coordinates, HourlyRecord};
use crate::xml::parse_time_series;

use super::{HourlySource, SourceId};

pub const DEFAULT_BASE_URL: &str = "https://opendata.fmi.fi/wfs";

const STORED_QUERY_ID: &str = "fmi::forecast::harmonie::surface::point::timevaluepair";
const QUERY_PARAMETERS: &str = "temperature,precipitation1h";
const FORECAST_WINDOW_HOURS: i64 = 24;

/// Adapter for the national meteorological open-data service: WFS
/// time-value-pair XML, piped through the parser and the aligner. No API
/// key, no metering.
#[derive(Debug, Clone)]
pub struct NationalSource {
    http: Client,
    base_url: String,
}

impl NationalSource {
    pub fn new(base_url: impl Into<String>, timeout: std::time::Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client for the national source")?;

        Ok(Self { http, base_url: base_url.into() })
    }

    /// The request window is 24 hours anchored to the current hour:
    /// start = now truncated to the hour, end = start + 24 h, both UTC.
    fn request_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = now.duration_trunc(Duration::hours(1)).unwrap_or(now);
        (start, start + Duration::hours(FORECAST_WINDOW_HOURS))
    }

    async fn fetch_xml(
        &self,
        coords: Coordinates,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<String, SourceError> {
        let latlon = format!("{},{}", coords.lat, coords.lon);
        let start = start.to_rfc3339_opts(SecondsFormat::Secs, true);
        let end = end.to_rfc3339_opts(SecondsFormat::Secs, true);

        let res = self
            .http
            .get(&self.base_url)
            .query(&[
                ("service", "WFS"),
                ("version", "2.0.0"),
                ("request", "GetFeature"),
                ("storedquery_id", STORED_QUERY_ID),
                ("latlon", latlon.as_str()),
                ("timestep", "60"),
                ("parameters", QUERY_PARAMETERS),
                ("starttime", start.as_str()),
                ("endtime", end.as_str()),
            ])
            .send()
            .await
            .map_err(|e| self.unavailable(e))?;

        let status = res.status();
        if !status.is_success() {
            return Err(self.unavailable(format!("request failed with status {status}")));
        }

        res.text().await.map_err(|e| self.unavailable(e))
    }

    fn unavailable(&self, reason: impl std::fmt::Display) -> SourceError {
        SourceError::unavailable(SourceId::National, reason)
    }
}

#[async_trait]
impl HourlySource for NationalSource {
    fn id(&self) -> SourceId {
        SourceId::National
    }

    async fn fetch_hourly(&self, coords: Coordinates) -> Result<Vec<HourlyRecord>, SourceError> {
        let (start, end) = Self::request_window(Utc::now());
        tracing::debug!(%coords, %start, %end, "fetching national time series");

        let xml = self.fetch_xml(coords, start, end).await?;

        // Parse failures become "unavailable" here so the orchestrator
        // never reasons about XML details.
        let parsed = parse_time_series(&xml).map_err(|e| self.unavailable(e))?;
        let hourly = align_time_series(&parsed.temperature, &parsed.precipitation);

        if hourly.is_empty() {
            return Err(self.unavailable("no usable records after alignment"));
        }

        tracing::debug!(records = hourly.len(), "national forecast fetched");
        Ok(hourly)
    }
}
