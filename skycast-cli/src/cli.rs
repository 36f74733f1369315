use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, FixedOffset};
use clap::{Parser, Subcommand};

use skycast_core::source::commercial::CommercialSource;
use skycast_core::source::national::NationalSource;
use skycast_core::{
    Config, QuotaTracker, SearchQuery, SourceId, SourceMode, TemperatureUnit, WeatherBundle,
    WeatherService, format_temperature,
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "skycast", version, about = "Dual-source weather lookup")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the API key for the commercial provider.
    Configure,

    /// Show weather for a location.
    Show {
        /// Place name, or "lat,lon" when --coords is given.
        location: String,

        /// Interpret LOCATION as "lat,lon" coordinates.
        #[arg(long)]
        coords: bool,

        /// Query both providers concurrently and keep the secondary
        /// series for comparison.
        #[arg(long)]
        multi_source: bool,

        /// Temperature unit: celsius, fahrenheit or kelvin.
        #[arg(long, default_value = "celsius")]
        unit: String,
    },

    /// Show today's metered API usage per provider.
    Usage,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::Show { location, coords, multi_source, unit } => {
                show(location, coords, multi_source, &unit).await
            }
            Command::Usage => usage(),
        }
    }
}

fn configure() -> Result<()> {
    let mut config = Config::load()?;

    let api_key = inquire::Password::new("Commercial provider API key:")
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;
    config.set_commercial_api_key(api_key);
    config.save()?;

    println!("Configuration saved to {}", Config::config_file_path()?.display());
    Ok(())
}

async fn show(location: String, coords: bool, multi_source: bool, unit: &str) -> Result<()> {
    let unit = TemperatureUnit::try_from(unit)?;
    let config = Config::load()?;
    let api_key = config.commercial_api_key()?.to_string();

    let quota = Arc::new(Mutex::new(
        QuotaTracker::load()?.with_threshold(SourceId::Commercial, config.daily_quota_warning),
    ));

    let national =
        NationalSource::new(config.national_base_url.clone(), config.request_timeout())?;
    let commercial = CommercialSource::new(
        api_key,
        config.commercial_base_url.clone(),
        config.request_timeout(),
        quota.clone(),
    )?;

    let service =
        WeatherService::new(Box::new(national), Box::new(commercial), config.coverage)
            .with_rate_limit(config.rate_limit());

    let query = if coords {
        parse_coords(&location)?
    } else {
        SearchQuery::Place(location)
    };
    let mode = if multi_source { SourceMode::Multi } else { SourceMode::Single };

    let result = service.search(&query, mode).await;

    // Calls may have been metered even when the search failed.
    quota.lock().unwrap_or_else(PoisonError::into_inner).save()?;

    print_bundle(&result?, unit);
    Ok(())
}

fn usage() -> Result<()> {
    let tracker = QuotaTracker::load()?;

    for source in SourceId::all() {
        match tracker.threshold(*source) {
            Some(threshold) => {
                println!("{source}: {}/{threshold} calls today", tracker.used_today(*source));
            }
            None => println!("{source}: unmetered"),
        }
    }
    Ok(())
}

fn parse_coords(input: &str) -> Result<SearchQuery> {
    let (lat, lon) = input
        .split_once(',')
        .ok_or_else(|| anyhow!("Expected coordinates as \"lat,lon\", got '{input}'"))?;

    let lat: f64 = lat.trim().parse().with_context(|| format!("Invalid latitude '{lat}'"))?;
    let lon: f64 = lon.trim().parse().with_context(|| format!("Invalid longitude '{lon}'"))?;

    Ok(SearchQuery::Coords(skycast_core::Coordinates::new(lat, lon)))
}

fn print_bundle(bundle: &WeatherBundle, unit: TemperatureUnit) {
    println!(
        "{} ({})  [data from {}]",
        bundle.location_name, bundle.coordinates, bundle.primary_source
    );
    println!(
        "Now: {}  {}  humidity {}%  wind {:.1} m/s",
        format_temperature(bundle.current.temperature_c, unit),
        bundle.current.condition,
        bundle.current.humidity_pct,
        bundle.current.wind_speed_mps,
    );

    println!("\nNext {} hours:", bundle.hourly.len());
    for record in &bundle.hourly {
        println!(
            "  {}  {:>7}  {:.1} mm",
            format_local(record.timestamp, bundle.timezone_offset_seconds, "%H:%M"),
            format_temperature(record.temperature_c, unit),
            record.precipitation_mm,
        );
    }

    if let (Some(comparison), Some(source)) =
        (&bundle.comparison_hourly, bundle.comparison_source)
    {
        println!("\nComparison series from {source}: {} records", comparison.len());
    }

    println!("\n7-day outlook:");
    for day in &bundle.daily {
        println!(
            "  {}  {} / {}  {}",
            format_local(day.timestamp, bundle.timezone_offset_seconds, "%a %d %b"),
            format_temperature(day.temp_min_c, unit),
            format_temperature(day.temp_max_c, unit),
            day.condition,
        );
    }
}

/// Render an epoch timestamp in the searched location's timezone.
fn format_local(timestamp: i64, offset_seconds: i32, fmt: &str) -> String {
    match (DateTime::from_timestamp(timestamp, 0), FixedOffset::east_opt(offset_seconds)) {
        (Some(dt), Some(offset)) => dt.with_timezone(&offset).format(fmt).to_string(),
        _ => "?".to_string(),
    }
}
