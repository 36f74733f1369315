//! Merging two independently-keyed time series onto one hourly timeline.

use std::collections::BTreeMap;

use chrono::DateTime;

use crate::model::{HourlyRecord, RawTimeSeriesPoint};

/// An aligned series is truncated to the first 24 hours from "now".
pub const MAX_HOURLY_RECORDS: usize = 24;

/// Merge temperature and precipitation points onto the union of their
/// timestamps.
///
/// Keys are compared as the raw ISO-8601 text: lexicographic order is
/// chronological order for these timestamps, and the `BTreeMap` gives us
/// both the union and the sort in one pass. A record is synthesized even
/// when only one quantity has a value at a timestamp; the missing one
/// defaults to 0.0 rather than being interpolated or dropped. Points
/// whose timestamp fails to parse are skipped.
///
/// Empty input yields an empty output. That is not an error here; the
/// adapter decides that zero records means the source failed.
pub fn align_time_series(
    temperature: &[RawTimeSeriesPoint],
    precipitation: &[RawTimeSeriesPoint],
) -> Vec<HourlyRecord> {
    let mut merged: BTreeMap<&str, (Option<f64>, Option<f64>)> = BTreeMap::new();

    for point in temperature {
        merged.entry(point.time.as_str()).or_default().0 = Some(point.value);
    }
    for point in precipitation {
        merged.entry(point.time.as_str()).or_default().1 = Some(point.value);
    }

    merged
        .into_iter()
        .filter_map(|(time, (temp, precip))| {
            let timestamp = parse_epoch_seconds(time)?;
            Some(HourlyRecord {
                timestamp,
                temperature_c: temp.unwrap_or(0.0),
                precipitation_mm: precip.unwrap_or(0.0),
            })
        })
        .take(MAX_HOURLY_RECORDS)
        .collect()
}

fn parse_epoch_seconds(time: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(time).ok().map(|dt| dt.timestamp())
}
