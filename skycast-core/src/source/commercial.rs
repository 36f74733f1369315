use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::align::MAX_HOURLY_RECORDS;
use crate::error::SourceError;
use crate::model::{Coordinates, CurrentConditions, DailyRecord, HourlyRecord};
use crate::quota::QuotaTracker;

use super::{ForecastOverview, HourlySource, LocatedPlace, OverviewSource, SourceId};

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";

const CURRENT_PATH: &str = "/data/2.5/weather";
const ONE_CALL_PATH: &str = "/data/3.0/onecall";
const MAX_DAILY_RECORDS: usize = 7;

/// Adapter for the global commercial JSON API. Every forecast fetch is
/// metered as two calls (current-conditions lookup + forecast lookup)
/// against the shared quota tracker, and the quota predicate is
/// consulted before any network I/O.
#[derive(Debug, Clone)]
pub struct CommercialSource {
    api_key: String,
    http: Client,
    base_url: String,
    quota: Arc<Mutex<QuotaTracker>>,
}

impl CommercialSource {
    pub fn new(
        api_key: String,
        base_url: impl Into<String>,
        timeout: std::time::Duration,
        quota: Arc<Mutex<QuotaTracker>>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client for the commercial source")?;

        Ok(Self { api_key, http, base_url: base_url.into(), quota })
    }

    fn check_quota(&self) -> Result<(), SourceError> {
        let quota = self.quota.lock().unwrap_or_else(PoisonError::into_inner);
        if quota.is_under_limit(SourceId::Commercial) {
            Ok(())
        } else {
            Err(SourceError::QuotaExceeded(SourceId::Commercial))
        }
    }

    fn record_calls(&self, count: u32) {
        let mut quota = self.quota.lock().unwrap_or_else(PoisonError::into_inner);
        for _ in 0..count {
            quota.record_call(SourceId::Commercial);
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, SourceError> {
        let url = format!("{}{path}", self.base_url);

        let res =
            self.http.get(&url).query(query).send().await.map_err(|e| self.unavailable(e))?;

        let status = res.status();
        let body = res.text().await.map_err(|e| self.unavailable(e))?;

        if !status.is_success() {
            return Err(self.unavailable(format!(
                "request failed with status {status}: {}",
                truncate_body(&body)
            )));
        }

        serde_json::from_str(&body)
            .map_err(|e| self.unavailable(format!("unexpected response shape: {e}")))
    }

    async fn get_current(&self, query: &[(&str, &str)]) -> Result<OwCurrentResponse, SourceError> {
        self.get_json(CURRENT_PATH, query).await
    }

    async fn get_one_call(&self, coords: Coordinates) -> Result<OwOneCallResponse, SourceError> {
        let lat = coords.lat.to_string();
        let lon = coords.lon.to_string();
        self.get_json(
            ONE_CALL_PATH,
            &[
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("appid", self.api_key.as_str()),
                ("units", "metric"),
                ("exclude", "minutely,alerts"),
            ],
        )
        .await
    }

    /// Geocoding via the current-weather endpoint; a 404 means the
    /// place does not exist rather than the provider being down.
    async fn lookup_place(
        &self,
        query: &[(&str, &str)],
    ) -> Result<Option<LocatedPlace>, SourceError> {
        self.check_quota()?;

        let url = format!("{}{CURRENT_PATH}", self.base_url);
        let res =
            self.http.get(&url).query(query).send().await.map_err(|e| self.unavailable(e))?;

        let status = res.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = res.text().await.map_err(|e| self.unavailable(e))?;
        if !status.is_success() {
            return Err(self.unavailable(format!(
                "request failed with status {status}: {}",
                truncate_body(&body)
            )));
        }

        let parsed: OwCurrentResponse = serde_json::from_str(&body)
            .map_err(|e| self.unavailable(format!("unexpected response shape: {e}")))?;

        Ok(Some(LocatedPlace {
            name: parsed.name,
            coordinates: Coordinates::new(parsed.coord.lat, parsed.coord.lon),
        }))
    }

    fn unavailable(&self, reason: impl std::fmt::Display) -> SourceError {
        SourceError::unavailable(SourceId::Commercial, reason)
    }
}

#[async_trait]
impl HourlySource for CommercialSource {
    fn id(&self) -> SourceId {
        SourceId::Commercial
    }

    async fn fetch_hourly(&self, coords: Coordinates) -> Result<Vec<HourlyRecord>, SourceError> {
        self.check_quota()?;

        let parsed = self.get_one_call(coords).await?;
        // Metered as two calls: the current-conditions lookup and the
        // forecast lookup.
        self.record_calls(2);

        let hourly: Vec<HourlyRecord> = parsed
            .hourly
            .iter()
            .take(MAX_HOURLY_RECORDS)
            .map(|h| HourlyRecord {
                timestamp: h.dt,
                temperature_c: h.temp,
                precipitation_mm: h.rain.as_ref().map_or(0.0, |r| r.one_hour),
            })
            .collect();

        if hourly.is_empty() {
            return Err(self.unavailable("forecast contained no hourly entries"));
        }

        tracing::debug!(records = hourly.len(), "commercial forecast fetched");
        Ok(hourly)
    }
}

#[async_trait]
impl OverviewSource for CommercialSource {
    async fn geocode(&self, place: &str) -> Result<Option<LocatedPlace>, SourceError> {
        self.lookup_place(&[
            ("q", place),
            ("appid", self.api_key.as_str()),
            ("units", "metric"),
        ])
        .await
    }

    async fn locate(&self, coords: Coordinates) -> Result<Option<LocatedPlace>, SourceError> {
        let lat = coords.lat.to_string();
        let lon = coords.lon.to_string();
        self.lookup_place(&[
            ("lat", lat.as_str()),
            ("lon", lon.as_str()),
            ("appid", self.api_key.as_str()),
            ("units", "metric"),
        ])
        .await
    }

    async fn fetch_overview(
        &self,
        coords: Coordinates,
    ) -> Result<ForecastOverview, SourceError> {
        self.check_quota()?;

        let lat = coords.lat.to_string();
        let lon = coords.lon.to_string();
        let current = self
            .get_current(&[
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("appid", self.api_key.as_str()),
                ("units", "metric"),
            ])
            .await?;
        let one_call = self.get_one_call(coords).await?;
        self.record_calls(2);

        let daily = one_call
            .daily
            .iter()
            .take(MAX_DAILY_RECORDS)
            .map(|d| DailyRecord {
                timestamp: d.dt,
                temp_min_c: d.temp.min,
                temp_max_c: d.temp.max,
                condition: condition_text(&d.weather),
            })
            .collect();

        Ok(ForecastOverview {
            current: CurrentConditions {
                temperature_c: current.main.temp,
                humidity_pct: current.main.humidity,
                wind_speed_mps: current.wind.speed,
                condition: condition_text(&current.weather),
                condition_code: current.weather.first().map_or(0, |w| w.id),
            },
            daily,
            timezone_offset_seconds: one_call.timezone_offset,
        })
    }
}

fn condition_text(weather: &[OwWeather]) -> String {
    weather.first().map_or_else(|| "unknown".to_string(), |w| w.description.clone())
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() <= MAX {
        return body.to_string();
    }
    // Error bodies are arbitrary text; back off to a char boundary.
    let mut cut = MAX;
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &body[..cut])
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    id: i32,
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    humidity: u8,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct OwCoord {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    name: String,
    coord: OwCoord,
    main: OwMain,
    wind: OwWind,
    weather: Vec<OwWeather>,
}

#[derive(Debug, Deserialize)]
struct OwRain {
    #[serde(rename = "1h", default)]
    one_hour: f64,
}

#[derive(Debug, Deserialize)]
struct OwHourly {
    dt: i64,
    temp: f64,
    #[serde(default)]
    rain: Option<OwRain>,
}

#[derive(Debug, Deserialize)]
struct OwDailyTemp {
    min: f64,
    max: f64,
}

#[derive(Debug, Deserialize)]
struct OwDaily {
    dt: i64,
    temp: OwDailyTemp,
    #[serde(default)]
    weather: Vec<OwWeather>,
}

#[derive(Debug, Deserialize)]
struct OwOneCallResponse {
    timezone_offset: i32,
    #[serde(default)]
    hourly: Vec<OwHourly>,
    #[serde(default)]
    daily: Vec<OwDaily>,
}
