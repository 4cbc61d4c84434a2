/*
 *  config.rs
 *
 *  SkyPane - weather worth watching
 *  (c) 2025-26 SkyPane contributors
 *
 *  Display settings model, CLI/YAML layering and the live settings store
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

use clap::{ArgAction, Parser, ValueHint};
use dirs_next::home_dir;
use serde::{Deserialize, Serialize};
use std::{fs, path::{Path, PathBuf}};
use thiserror::Error;
use tokio::sync::watch;

use crate::forecast::ForecastRange;

/// Error type for config loading/validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationMode {
    /// User-entered city/place text.
    Manual,
    /// Device/IP geolocation on the provider side.
    Auto,
}

/// One configured location, rotated through by the cycle scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationConfig {
    /// Stable opaque identifier, user-invisible.
    pub id: String,
    pub mode: LocationMode,
    /// City/place text; required for manual entries.
    #[serde(default)]
    pub query: Option<String>,
    /// Optional display name override.
    #[serde(default)]
    pub label: Option<String>,
}

impl LocationConfig {
    /// Display name: override label, else the query text, else a stock
    /// caption depending on mode.
    pub fn display_name(&self) -> &str {
        if let Some(label) = self.label.as_deref().filter(|s| !s.is_empty()) {
            label
        } else if let Some(query) = self.query.as_deref().filter(|s| !s.is_empty()) {
            query
        } else if self.mode == LocationMode::Auto {
            "Current Location"
        } else {
            "Local Weather"
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    Fade,
    Slide,
    Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    Metric,
    Imperial,
}

impl UnitSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitSystem::Metric => "metric",
            UnitSystem::Imperial => "imperial",
        }
    }

    /// Temperature suffix for presentation.
    pub fn unit_label(&self) -> &'static str {
        match self {
            UnitSystem::Metric => "\u{00B0}C",
            UnitSystem::Imperial => "\u{00B0}F",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeFormat {
    #[serde(rename = "12h")]
    Hour12,
    #[serde(rename = "24h")]
    Hour24,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateFormat {
    #[serde(rename = "MMM DD, YYYY")]
    MonthDayYear,
    #[serde(rename = "MM/DD/YYYY")]
    NumericMdy,
    #[serde(rename = "DD/MM/YYYY")]
    NumericDmy,
    #[serde(rename = "YYYY-MM-DD")]
    Iso,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundType {
    /// Derived from the weather (image probe with gradient fallback).
    Dynamic,
    Solid,
    /// Explicit user media URL (image or video).
    Image,
}

/// The full persisted settings surface.
///
/// The scheduler treats each field as an opaque input; only `unit` and
/// `forecast_range` changes trigger a re-fetch, the rest are re-read by
/// presentation on every render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub locations: Vec<LocationConfig>,
    pub cycle_duration_secs: u32,
    pub transition: Transition,
    pub forecast_range: ForecastRange,
    pub unit: UnitSystem,
    pub time_format: TimeFormat,
    pub date_format: DateFormat,
    pub background_type: BackgroundType,
    pub background_color: String,
    pub background_url: String,
    pub background_opacity: u8,
    pub glass_opacity: u8,
    pub font_color: String,
    pub ui_scale: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            locations: Vec::new(),
            cycle_duration_secs: 10,
            transition: Transition::Fade,
            forecast_range: ForecastRange::Days3,
            unit: UnitSystem::Metric,
            time_format: TimeFormat::Hour12,
            date_format: DateFormat::MonthDayYear,
            background_type: BackgroundType::Dynamic,
            background_color: "#1a1a1a".to_string(),
            background_url: String::new(),
            background_opacity: 80,
            glass_opacity: 65,
            font_color: "#ffffff".to_string(),
            ui_scale: 1.0,
        }
    }
}

/// Non-persisted runtime options layered from CLI/YAML: things the host
/// environment supplies rather than the user-facing settings surface.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub log_level: Option<String>,
    /// Base URL of the host weather service.
    pub provider_url: String,
    /// Base URL under which condition background photos live.
    pub asset_base_url: String,
    /// Reported screen aspect ratio (width / height).
    pub aspect_ratio: f64,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            log_level: None,
            provider_url: "http://127.0.0.1:8089".to_string(),
            asset_base_url: "http://127.0.0.1:8089/assets".to_string(),
            aspect_ratio: 16.0 / 9.0,
        }
    }
}

/// On-disk YAML shape. All fields optional so file and CLI can layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct FileConfig {
    log_level: Option<String>,
    provider_url: Option<String>,
    asset_base_url: Option<String>,
    aspect_ratio: Option<f64>,
    settings: Option<Settings>,
}

/// CLI overrides. All fields are Options so we can layer them over YAML.
#[derive(Debug, Parser, Clone)]
#[command(name = "skypane", about = "SkyPane weather display", disable_help_flag = false)]
pub struct Cli {
    /// Path to a YAML config file (overrides search)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub log_level: Option<String>,
    /// Base URL of the host weather service
    #[arg(long)]
    pub provider_url: Option<String>,
    /// Base URL for condition background photos
    #[arg(long)]
    pub asset_base_url: Option<String>,
    /// Screen aspect ratio (width / height)
    #[arg(long)]
    pub aspect_ratio: Option<f64>,
    /// dump fully merged config (after overrides) and exit
    #[arg(long, action = ArgAction::SetTrue)]
    pub dump_config: bool,
}

/// Public entry point: parse CLI, read YAML, merge, validate.
pub fn load() -> Result<(Settings, RuntimeOptions), ConfigError> {
    let cli = Cli::parse();
    load_with(cli)
}

pub fn load_with(cli: Cli) -> Result<(Settings, RuntimeOptions), ConfigError> {
    // 1) defaults (from `Default` impls)
    let mut settings = Settings::default();
    let mut runtime = RuntimeOptions::default();

    // 2) YAML file (explicit path or search)
    let file = if let Some(p) = cli.config.as_ref() {
        if p.exists() {
            Some(read_yaml(p)?)
        } else {
            return Err(ConfigError::Validation(format!(
                "Config file not found: {}",
                p.display()
            )));
        }
    } else {
        find_config_file().map(|p| read_yaml(&p)).transpose()?
    };

    if let Some(f) = file {
        if let Some(s) = f.settings        { settings = s; }
        if f.log_level.is_some()           { runtime.log_level = f.log_level; }
        if let Some(u) = f.provider_url    { runtime.provider_url = u; }
        if let Some(u) = f.asset_base_url  { runtime.asset_base_url = u; }
        if let Some(r) = f.aspect_ratio    { runtime.aspect_ratio = r; }
    }

    // 3) CLI overrides (highest precedence)
    if cli.log_level.is_some()           { runtime.log_level = cli.log_level.clone(); }
    if let Some(u) = cli.provider_url    { runtime.provider_url = u; }
    if let Some(u) = cli.asset_base_url  { runtime.asset_base_url = u; }
    if let Some(r) = cli.aspect_ratio    { runtime.aspect_ratio = r; }

    // 4) Validate
    validate(&settings, &runtime)?;

    if cli.dump_config {
        // Pretty YAML of effective settings (nice for debugging)
        let s = serde_yaml::to_string(&settings)?;
        println!("{s}");
        std::process::exit(0);
    }

    Ok((settings, runtime))
}

/// Try common locations in order (first hit wins).
fn find_config_file() -> Option<PathBuf> {
    // XDG-style: ~/.config/skypane/config.yaml
    if let Some(home) = home_dir() {
        let p = home.join(".config/skypane/config.yaml");
        if p.exists() { return Some(p) }
        let p = home.join(".config/skypane.yaml");
        if p.exists() { return Some(p) }
    }
    // project local
    for candidate in &["skypane.yaml", "config.yaml", "config/skypane.yaml"] {
        let p = PathBuf::from(candidate);
        if p.exists() { return Some(p) }
    }
    None
}

fn read_yaml(path: &Path) -> Result<FileConfig, ConfigError> {
    let s = fs::read_to_string(path)?;
    let cfg: FileConfig = serde_yaml::from_str(&s)?;
    Ok(cfg)
}

/// Settings invariants (ranges, required fields).
pub fn validate(settings: &Settings, runtime: &RuntimeOptions) -> Result<(), ConfigError> {
    if settings.cycle_duration_secs < 5 {
        return Err(ConfigError::Validation("cycle_duration_secs must be >= 5".into()));
    }
    if settings.background_opacity > 100 || settings.glass_opacity > 100 {
        return Err(ConfigError::Validation("opacity values must be 0..=100".into()));
    }
    for loc in &settings.locations {
        if loc.mode == LocationMode::Manual
            && loc.query.as_deref().map_or(true, str::is_empty)
        {
            return Err(ConfigError::Validation(format!(
                "manual location '{}' has no query text", loc.id
            )));
        }
    }
    if runtime.aspect_ratio <= 0.0 {
        return Err(ConfigError::Validation("aspect_ratio must be > 0".into()));
    }
    Ok(())
}

/// Live settings store: the external key/value surface the host persists,
/// projected into process memory and fanned out over a watch channel so
/// the scheduler can react to changes without polling.
#[derive(Debug)]
pub struct SettingsStore {
    tx: watch::Sender<Settings>,
}

impl SettingsStore {
    pub fn new(initial: Settings) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> Settings {
        self.tx.borrow().clone()
    }

    /// Apply a mutation and notify subscribers.
    pub fn update(&self, f: impl FnOnce(&mut Settings)) {
        self.tx.send_modify(f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_store() {
        let s = Settings::default();
        assert!(s.locations.is_empty());
        assert_eq!(s.cycle_duration_secs, 10);
        assert_eq!(s.transition, Transition::Fade);
        assert_eq!(s.forecast_range, ForecastRange::Days3);
        assert_eq!(s.unit, UnitSystem::Metric);
        assert_eq!(s.background_type, BackgroundType::Dynamic);
        assert_eq!(s.background_opacity, 80);
        assert_eq!(s.glass_opacity, 65);
    }

    #[test]
    fn test_settings_yaml_round_trip() {
        let yaml = r##"
locations:
  - id: loc-1
    mode: manual
    query: Paris
  - id: loc-2
    mode: auto
cycle_duration_secs: 15
transition: slide
forecast_range: "8h"
unit: imperial
time_format: 24h
date_format: YYYY-MM-DD
background_type: solid
background_color: "#000033"
"##;
        let s: Settings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(s.locations.len(), 2);
        assert_eq!(s.locations[0].query.as_deref(), Some("Paris"));
        assert_eq!(s.locations[1].mode, LocationMode::Auto);
        assert_eq!(s.forecast_range, ForecastRange::Hours8);
        assert_eq!(s.unit, UnitSystem::Imperial);
        assert_eq!(s.time_format, TimeFormat::Hour24);
        assert_eq!(s.date_format, DateFormat::Iso);
        // unlisted keys keep their defaults
        assert_eq!(s.background_opacity, 80);
    }

    #[test]
    fn test_display_name_precedence() {
        let mut loc = LocationConfig {
            id: "x".into(),
            mode: LocationMode::Manual,
            query: Some("Paris".into()),
            label: Some("HQ Lobby".into()),
        };
        assert_eq!(loc.display_name(), "HQ Lobby");
        loc.label = None;
        assert_eq!(loc.display_name(), "Paris");
        loc.query = None;
        assert_eq!(loc.display_name(), "Local Weather");
        loc.mode = LocationMode::Auto;
        assert_eq!(loc.display_name(), "Current Location");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let runtime = RuntimeOptions::default();

        let mut s = Settings::default();
        s.cycle_duration_secs = 4;
        assert!(validate(&s, &runtime).is_err());

        let mut s = Settings::default();
        s.glass_opacity = 101;
        assert!(validate(&s, &runtime).is_err());

        let mut s = Settings::default();
        s.locations.push(LocationConfig {
            id: "bad".into(),
            mode: LocationMode::Manual,
            query: None,
            label: None,
        });
        assert!(validate(&s, &runtime).is_err());

        assert!(validate(&Settings::default(), &runtime).is_ok());
    }

    #[test]
    fn test_store_fans_out_changes() {
        let store = SettingsStore::new(Settings::default());
        let rx = store.subscribe();
        store.update(|s| s.unit = UnitSystem::Imperial);
        assert_eq!(rx.borrow().unit, UnitSystem::Imperial);
        assert_eq!(store.current().unit, UnitSystem::Imperial);
    }
}
