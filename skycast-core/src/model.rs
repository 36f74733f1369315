use serde::{Deserialize, Serialize};

use crate::source::SourceId;

/// One hour of forecast on the unified timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HourlyRecord {
    /// Unix epoch seconds, UTC.
    pub timestamp: i64,
    pub temperature_c: f64,
    /// One-hour accumulation; 0.0 when the source reported nothing.
    pub precipitation_mm: f64,
}

/// Intermediate (time, value) pair produced by the XML parser and
/// consumed by the aligner. `time` is the ISO-8601 text exactly as the
/// endpoint emitted it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTimeSeriesPoint {
    pub time: String,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.lat, self.lon)
    }
}

/// Instantaneous conditions, always sourced from the commercial provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub temperature_c: f64,
    pub humidity_pct: u8,
    pub wind_speed_mps: f64,
    /// Textual condition, e.g. "light rain".
    pub condition: String,
    /// Provider condition code, e.g. 500 for light rain.
    pub condition_code: i32,
}

/// One day of the 7-day outlook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyRecord {
    /// Unix epoch seconds, UTC.
    pub timestamp: i64,
    pub temp_min_c: f64,
    pub temp_max_c: f64,
    pub condition: String,
}

/// The normalized output of one completed search: everything the
/// rendering layer needs, independent of which providers supplied it.
///
/// `comparison_hourly`/`comparison_source` are only present in
/// multi-source mode when both providers produced data; the national
/// series is then the primary one and the commercial series rides along
/// for comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherBundle {
    pub location_name: String,
    pub coordinates: Coordinates,
    pub current: CurrentConditions,
    /// At most 24 records, strictly increasing timestamps.
    pub hourly: Vec<HourlyRecord>,
    /// At most 7 records.
    pub daily: Vec<DailyRecord>,
    pub timezone_offset_seconds: i32,
    pub primary_source: SourceId,
    pub comparison_hourly: Option<Vec<HourlyRecord>>,
    pub comparison_source: Option<SourceId>,
}

/// Display unit for temperatures. Data is carried in Celsius everywhere;
/// conversion happens only at the presentation edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
    Kelvin,
}

impl TemperatureUnit {
    pub fn convert(&self, temp_celsius: f64) -> f64 {
        match self {
            TemperatureUnit::Celsius => temp_celsius,
            TemperatureUnit::Fahrenheit => temp_celsius * 9.0 / 5.0 + 32.0,
            TemperatureUnit::Kelvin => temp_celsius + 273.15,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "°C",
            TemperatureUnit::Fahrenheit => "°F",
            TemperatureUnit::Kelvin => "K",
        }
    }
}

impl TryFrom<&str> for TemperatureUnit {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "celsius" | "c" => Ok(TemperatureUnit::Celsius),
            "fahrenheit" | "f" => Ok(TemperatureUnit::Fahrenheit),
            "kelvin" | "k" => Ok(TemperatureUnit::Kelvin),
            _ => Err(anyhow::anyhow!(
                "Unknown temperature unit '{value}'. Supported units: celsius, fahrenheit, kelvin."
            )),
        }
    }
}

/// Format a Celsius temperature in the requested unit: whole degrees for
/// °C/°F, one decimal for Kelvin.
pub fn format_temperature(temp_celsius: f64, unit: TemperatureUnit) -> String {
    let converted = unit.convert(temp_celsius);
    match unit {
        TemperatureUnit::Kelvin => format!("{:.1}{}", converted, unit.symbol()),
        _ => format!("{}{}", converted.round(), unit.symbol()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_validity() {
        assert!(Coordinates::new(60.17, 24.94).is_valid());
        assert!(Coordinates::new(-90.0, 180.0).is_valid());
        assert!(!Coordinates::new(90.5, 0.0).is_valid());
        assert!(!Coordinates::new(0.0, -180.5).is_valid());
        assert!(!Coordinates::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn temperature_conversion() {
        assert_eq!(TemperatureUnit::Celsius.convert(20.0), 20.0);
        assert_eq!(TemperatureUnit::Fahrenheit.convert(0.0), 32.0);
        assert_eq!(TemperatureUnit::Fahrenheit.convert(100.0), 212.0);
        assert_eq!(TemperatureUnit::Kelvin.convert(0.0), 273.15);
    }

    #[test]
    fn temperature_formatting() {
        assert_eq!(format_temperature(19.6, TemperatureUnit::Celsius), "20°C");
        assert_eq!(format_temperature(0.0, TemperatureUnit::Fahrenheit), "32°F");
        assert_eq!(format_temperature(0.0, TemperatureUnit::Kelvin), "273.1K");
    }

    #[test]
    fn temperature_unit_parse() {
        assert_eq!(
            TemperatureUnit::try_from("Fahrenheit").unwrap(),
            TemperatureUnit::Fahrenheit
        );
        assert_eq!(TemperatureUnit::try_from("k").unwrap(), TemperatureUnit::Kelvin);
        assert!(TemperatureUnit::try_from("rankine").is_err());
    }
}
