/*
 *  forecast.rs
 *
 *  SkyPane - weather worth watching
 *  (c) 2025-26 SkyPane contributors
 *
 *  Forecast normalization - converts raw provider records (whose field
 *  shapes vary between hourly and daily responses) into uniform items
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use chrono::{DateTime, FixedOffset, Local, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Forecast window selector as persisted in settings ("8h", "3d", ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForecastRange {
    Hours3,
    Hours8,
    Hours24,
    Days2,
    Days3,
    Days5,
    Days7,
}

impl Default for ForecastRange {
    fn default() -> Self {
        ForecastRange::Days3
    }
}

impl ForecastRange {
    /// True for the daily-granularity selectors ("2d", "3d", "5d", "7d").
    pub fn is_daily(&self) -> bool {
        matches!(
            self,
            ForecastRange::Days2 | ForecastRange::Days3 | ForecastRange::Days5 | ForecastRange::Days7
        )
    }

    /// Number of items requested (the parsed leading integer).
    pub fn count(&self) -> u32 {
        match self {
            ForecastRange::Hours3 => 3,
            ForecastRange::Hours8 => 8,
            ForecastRange::Hours24 => 24,
            ForecastRange::Days2 => 2,
            ForecastRange::Days3 => 3,
            ForecastRange::Days5 => 5,
            ForecastRange::Days7 => 7,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ForecastRange::Hours3 => "3h",
            ForecastRange::Hours8 => "8h",
            ForecastRange::Hours24 => "24h",
            ForecastRange::Days2 => "2d",
            ForecastRange::Days3 => "3d",
            ForecastRange::Days5 => "5d",
            ForecastRange::Days7 => "7d",
        }
    }
}

impl fmt::Display for ForecastRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ForecastRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "3h" => Ok(ForecastRange::Hours3),
            "8h" => Ok(ForecastRange::Hours8),
            "24h" => Ok(ForecastRange::Hours24),
            "2d" => Ok(ForecastRange::Days2),
            "3d" => Ok(ForecastRange::Days3),
            "5d" => Ok(ForecastRange::Days5),
            "7d" => Ok(ForecastRange::Days7),
            other => Err(format!("unknown forecast range: {other}")),
        }
    }
}

// persists in its settings-string form ("8h", "3d", ...)
impl Serialize for ForecastRange {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ForecastRange {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One normalized time-bucketed weather reading.
///
/// Produced fresh on every fetch and never mutated afterwards; a fetch
/// yields a chronological sequence that fully replaces the previous one.
/// Optional fields stay `None` when the raw record omits them - absence
/// means "not shown", never a fabricated zero.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastItem {
    /// Epoch seconds.
    pub timestamp: i64,
    /// Short human label: "3 PM" for hourly, "Mon" for daily.
    pub label: String,
    /// Instantaneous temperature for hourly records, the daily maximum
    /// for daily ones.
    pub temperature: f64,
    pub temperature_high: Option<f64>,
    pub temperature_low: Option<f64>,
    /// Free-text condition label, verbatim from the provider.
    pub condition: String,
    pub humidity_percent: Option<f64>,
    pub wind_speed: Option<f64>,
    pub precipitation_probability_percent: Option<f64>,
    pub feels_like: Option<f64>,
}

/// Walk a dotted path of object keys, returning the first number found.
fn num_at(record: &Value, path: &[&str]) -> Option<f64> {
    let mut v = record;
    for key in path {
        v = v.get(key)?;
    }
    v.as_f64()
}

/// Fallback-chain extraction: try each known shape in order, take the
/// first defined numeric value. Raw records are duck-typed upstream - a
/// field may arrive bare, as `{Value}`, `{Average}`, or nested deeper.
fn num_fallback(record: &Value, paths: &[&[&str]]) -> Option<f64> {
    paths.iter().find_map(|p| num_at(record, p))
}

fn label_for(timestamp: i64, daily: bool, offset: Option<FixedOffset>) -> String {
    let utc = DateTime::<Utc>::from_timestamp(timestamp, 0).unwrap_or_default();
    let fmt = if daily { "%a" } else { "%-I %p" };
    match offset {
        Some(off) => utc.with_timezone(&off).format(fmt).to_string(),
        None => utc.with_timezone(&Local).format(fmt).to_string(),
    }
}

fn normalize_one(record: &Value, daily: bool, offset: Option<FixedOffset>) -> Option<ForecastItem> {
    let timestamp = record.get("Timestamp").and_then(Value::as_i64)?;
    let condition = record
        .get("Label")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    if daily {
        let high = num_fallback(record, &[&["MaxTemp"]])?;
        let low = num_fallback(record, &[&["MinTemp"]]);
        Some(ForecastItem {
            timestamp,
            label: label_for(timestamp, true, offset),
            temperature: high,
            temperature_high: Some(high),
            temperature_low: low,
            condition,
            humidity_percent: num_fallback(record, &[&["RelativeHumidity", "Average"], &["RelativeHumidity"]]),
            wind_speed: num_fallback(record, &[&["WindSpeed", "Average"], &["WindSpeed", "Value"], &["WindSpeed"]]),
            precipitation_probability_percent: num_fallback(record, &[&["PrecipitationProbability"], &["Precip"]]),
            feels_like: num_fallback(record, &[&["RealFeelTemperature", "Maximum", "Value"], &["RealFeelTemperature", "Value"]]),
        })
    } else {
        let temp = num_fallback(record, &[&["Temp"]])?;
        Some(ForecastItem {
            timestamp,
            label: label_for(timestamp, false, offset),
            temperature: temp,
            temperature_high: None,
            temperature_low: None,
            condition,
            humidity_percent: num_fallback(record, &[&["RelativeHumidity"]]),
            wind_speed: num_fallback(record, &[&["WindSpeed", "Value"], &["WindSpeed"]]),
            precipitation_probability_percent: num_fallback(record, &[&["PrecipitationProbability"]]),
            feels_like: num_fallback(record, &[&["RealFeelTemperature", "Value"], &["RealFeelTemperature"]]),
        })
    }
}

/// Normalize raw provider records into [`ForecastItem`]s.
///
/// Provider ordering is preserved and the output is truncated to the
/// range's requested count. Records missing their timestamp or primary
/// temperature are skipped with a warning rather than aborting the fetch.
pub fn normalize(
    records: &[Value],
    range: ForecastRange,
    offset: Option<FixedOffset>,
) -> Vec<ForecastItem> {
    let daily = range.is_daily();
    let mut items = Vec::with_capacity(range.count() as usize);
    for record in records {
        if items.len() as u32 >= range.count() {
            break;
        }
        match normalize_one(record, daily, offset) {
            Some(item) => items.push(item),
            None => warn!("Skipping malformed forecast record: {}", record),
        }
    }
    items
}
