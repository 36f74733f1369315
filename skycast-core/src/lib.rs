//! Core library for the `skycast` CLI.
//!
//! This crate defines:
//! - The normalized weather data model shared by all providers
//! - Parsing and alignment of the national WFS time-series feed
//! - One source adapter per provider (national XML, commercial JSON)
//! - The reconciliation orchestrator with its fallback/priority policy
//! - Quota accounting and configuration/credentials handling
//!
//! It is used by `skycast-cli`, but can also be reused by other binaries
//! or services.

pub mod align;
pub mod config;
pub mod error;
pub mod model;
pub mod quota;
pub mod search;
pub mod source;
pub mod xml;

pub use align::align_time_series;
pub use config::{Config, CoverageBounds};
pub use error::{ParseError, SearchError, SourceError};
pub use model::{
    Coordinates, CurrentConditions, DailyRecord, HourlyRecord, RawTimeSeriesPoint,
    TemperatureUnit, WeatherBundle, format_temperature,
};
pub use quota::QuotaTracker;
pub use search::{SearchQuery, SourceMode, WeatherService};
pub use source::{HourlySource, OverviewSource, SourceId};
pub use xml::parse_time_series;
