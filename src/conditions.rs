/*
 *  conditions.rs
 *
 *  SkyPane - weather worth watching
 *  (c) 2025-26 SkyPane contributors
 *
 *  Condition text classification - maps free-text provider conditions
 *  to icon glyphs, gradient pairs and background image candidates
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

use std::collections::HashMap;

use crate::forecast::ForecastItem;

/// Semantic weather category derived from free-text condition strings.
///
/// Providers return prose ("Partly cloudy with light drizzle"); everything
/// downstream only cares about a small closed alphabet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Clear,
    PartlyCloudy,
    Cloudy,
    Rain,
    Storm,
    Snow,
    Fog,
    Night,
    Unknown,
}

fn matches_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

/// Classify a condition string into a [`Category`].
///
/// Case-insensitive substring matching, first rule wins. Empty input is
/// `Unknown`. Sky-state keywords are checked before the generic night
/// keywords, so "clear night" classifies as `Clear` (deterministic
/// resolution of the night/clear overlap).
pub fn classify(condition: &str) -> Category {
    if condition.is_empty() {
        return Category::Unknown;
    }
    let c = condition.to_lowercase();

    if matches_any(&c, &["storm", "thunder", "lightning"]) {
        Category::Storm
    } else if matches_any(&c, &["rain", "drizzle", "shower", "wet"]) {
        Category::Rain
    } else if matches_any(&c, &["snow", "ice", "hail", "blizzard", "frost", "flurry"]) {
        Category::Snow
    } else if matches_any(&c, &["fog", "mist", "haze"]) {
        Category::Fog
    } else if c.contains("partly") {
        Category::PartlyCloudy
    } else if matches_any(&c, &["cloud", "overcast", "grey", "gray", "gloomy"]) {
        Category::Cloudy
    } else if matches_any(&c, &["sunny", "clear", "fine"]) {
        Category::Clear
    } else if matches_any(&c, &["night", "moon"]) {
        Category::Night
    } else {
        Category::Unknown
    }
}

/// Icon glyph for a condition string.
///
/// Keeps its own keyword ladder (slightly different ordering and keyword
/// sets than the gradient/image ladders, faithful to the display design):
/// "partly" is checked after the weather groups but before generic
/// clear/sun, and the snow group here is snow/flurry/frost only.
pub fn icon_glyph(condition: &str) -> &'static str {
    if condition.is_empty() {
        return "\u{2753}"; // question mark
    }
    let c = condition.to_lowercase();

    if matches_any(&c, &["storm", "thunder"]) {
        "\u{26C8}\u{FE0F}" // thunder cloud and rain
    } else if matches_any(&c, &["rain", "drizzle", "shower"]) {
        "\u{1F327}\u{FE0F}"
    } else if matches_any(&c, &["snow", "flurry", "frost"]) {
        "\u{2744}\u{FE0F}"
    } else if matches_any(&c, &["fog", "mist"]) {
        "\u{1F32B}\u{FE0F}"
    } else if matches_any(&c, &["cloud", "overcast"]) {
        "\u{2601}\u{FE0F}"
    } else if c.contains("partly") {
        "\u{26C5}"
    } else if matches_any(&c, &["clear", "sun"]) {
        "\u{2600}\u{FE0F}"
    } else {
        "\u{1F321}\u{FE0F}" // thermometer
    }
}

/// Two-stop vertical gradient used when no background image is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gradient {
    pub top: &'static str,
    pub bottom: &'static str,
}

/// Teal-to-indigo default when no keyword matches (or no condition exists).
pub const DEFAULT_GRADIENT: Gradient = Gradient { top: "#30cfd0", bottom: "#330867" };

/// Gradient pair for a condition string.
///
/// Note the ordering differs from [`classify`]: sunny/clear is checked
/// first here, so a "clear night" gets the daytime-sky gradient rather
/// than the night one.
pub fn gradient(condition: &str) -> Gradient {
    if condition.is_empty() {
        return DEFAULT_GRADIENT;
    }
    let c = condition.to_lowercase();

    if matches_any(&c, &["sunny", "clear", "fine"]) {
        Gradient { top: "#2980B9", bottom: "#6DD5FA" }
    } else if matches_any(&c, &["storm", "thunder", "lightning"]) {
        Gradient { top: "#141E30", bottom: "#243B55" }
    } else if matches_any(&c, &["snow", "ice", "hail", "blizzard", "frost", "flurry"]) {
        Gradient { top: "#E6DADA", bottom: "#274046" }
    } else if matches_any(&c, &["rain", "drizzle", "shower", "wet"]) {
        Gradient { top: "#3a7bd5", bottom: "#3a6073" }
    } else if matches_any(&c, &["fog", "mist", "haze"]) {
        Gradient { top: "#757F9A", bottom: "#D7DDE8" }
    } else if matches_any(&c, &["cloud", "overcast", "grey", "gloomy"]) {
        Gradient { top: "#606c88", bottom: "#3f4c6b" }
    } else if matches_any(&c, &["night", "moon"]) {
        Gradient { top: "#000000", bottom: "#434343" }
    } else {
        DEFAULT_GRADIENT
    }
}

/// Background image candidate for a condition string.
///
/// Returns the asset filename to probe, or `None` when no mapping exists
/// (fog, night and unknown conditions fall through to the gradient).
/// The cloud group is deliberately fine-grained: overcast, broken,
/// scattered and few clouds each map to their own photo.
pub fn background_image(condition: &str) -> Option<&'static str> {
    if condition.is_empty() {
        return None;
    }
    let c = condition.to_lowercase();

    if matches_any(&c, &["storm", "thunder", "lightning"]) {
        Some("lightning-strike-cloudy-sky-night-time.jpg")
    } else if matches_any(&c, &["rain", "drizzle", "shower"]) {
        Some("light-moderate-rain.jpg")
    } else if matches_any(&c, &["snow", "flurry", "frost", "ice", "blizzard"]) {
        Some("snow.jpg")
    } else if matches_any(&c, &["overcast", "gloomy"]) {
        Some("overcast-cloud.jpg")
    } else if matches_any(&c, &["broken", "break"]) {
        Some("broken-cloud.jpg")
    } else if c.contains("scattered") {
        Some("scattered-clouds.jpg")
    } else if c.contains("few") {
        Some("few-cloud.jpg")
    } else if matches_any(&c, &["cloud", "grey"]) {
        Some("broken-cloud.jpg")
    } else if matches_any(&c, &["sunny", "fine"]) {
        Some("summer-grass-beautiful-day.jpg")
    } else if c.contains("clear") {
        Some("clear-sky.jpg")
    } else {
        None
    }
}

/// Most frequent condition text across the visible forecast window.
///
/// Ties resolve to the condition seen first in display order. Items with
/// empty condition text are ignored. Used to bias the dynamic background
/// toward the overall vibe of the period rather than a single instant.
pub fn dominant_condition(items: &[ForecastItem]) -> Option<&str> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for item in items {
        if !item.condition.is_empty() {
            *counts.entry(item.condition.as_str()).or_insert(0) += 1;
        }
    }

    let mut dominant: Option<&str> = None;
    let mut max_count = 0usize;
    // iterate in display order so ties keep the earliest condition
    for item in items {
        if let Some(&n) = counts.get(item.condition.as_str()) {
            if n > max_count {
                max_count = n;
                dominant = Some(item.condition.as_str());
            }
        }
    }
    dominant
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::ForecastItem;

    fn item(condition: &str) -> ForecastItem {
        ForecastItem {
            timestamp: 0,
            label: String::new(),
            temperature: 0.0,
            temperature_high: None,
            temperature_low: None,
            condition: condition.to_string(),
            humidity_percent: None,
            wind_speed: None,
            precipitation_probability_percent: None,
            feels_like: None,
        }
    }

    #[test]
    fn test_classify_keyword_groups() {
        assert_eq!(classify("Thunderstorm"), Category::Storm);
        assert_eq!(classify("light DRIZZLE"), Category::Rain);
        assert_eq!(classify("Snow flurries"), Category::Snow);
        assert_eq!(classify("Freezing fog"), Category::Fog);
        assert_eq!(classify("Partly cloudy"), Category::PartlyCloudy);
        assert_eq!(classify("Overcast"), Category::Cloudy);
        assert_eq!(classify("Fine"), Category::Clear);
        assert_eq!(classify("Moonlit"), Category::Night);
        assert_eq!(classify("Dust devils"), Category::Unknown);
        assert_eq!(classify(""), Category::Unknown);
    }

    #[test]
    fn test_classify_first_match_wins() {
        // storm outranks rain even when both keywords appear
        assert_eq!(classify("Thunderstorm with heavy rain"), Category::Storm);
        // rain outranks cloud
        assert_eq!(classify("Cloudy with showers"), Category::Rain);
        // partly checked before generic cloud
        assert_eq!(classify("Partly cloudy"), Category::PartlyCloudy);
    }

    #[test]
    fn test_thunder_consistent_across_ladders() {
        // any string containing "thunder" must land on the storm entry of
        // every ladder, regardless of case or surrounding text
        for s in ["thunder", "THUNDERSTORM", "Isolated thunder showers possible"] {
            assert_eq!(classify(s), Category::Storm);
            assert_eq!(icon_glyph(s), "\u{26C8}\u{FE0F}");
            assert_eq!(gradient(s), Gradient { top: "#141E30", bottom: "#243B55" });
            assert_eq!(background_image(s), Some("lightning-strike-cloudy-sky-night-time.jpg"));
        }
    }

    #[test]
    fn test_clear_night_prefers_sky_state() {
        // the night/clear overlap resolves toward the explicit sky state
        assert_eq!(classify("Clear night"), Category::Clear);
        assert_eq!(gradient("Clear night").top, "#2980B9");
        // a string with only night words still reaches the night rung
        assert_eq!(gradient("Night time").top, "#000000");
    }

    #[test]
    fn test_gradient_defaults() {
        assert_eq!(gradient(""), DEFAULT_GRADIENT);
        assert_eq!(gradient("volcanic ash"), DEFAULT_GRADIENT);
    }

    #[test]
    fn test_background_image_cloud_detail() {
        assert_eq!(background_image("Overcast"), Some("overcast-cloud.jpg"));
        assert_eq!(background_image("Broken clouds"), Some("broken-cloud.jpg"));
        assert_eq!(background_image("Scattered clouds"), Some("scattered-clouds.jpg"));
        assert_eq!(background_image("Few clouds"), Some("few-cloud.jpg"));
        assert_eq!(background_image("Cloudy"), Some("broken-cloud.jpg"));
        // fog has no photo mapping; resolver falls back to the gradient
        assert_eq!(background_image("Fog"), None);
        assert_eq!(background_image(""), None);
    }

    #[test]
    fn test_icon_partly_before_clear() {
        assert_eq!(icon_glyph("Partly sunny"), "\u{26C5}");
        assert_eq!(icon_glyph("Sunny"), "\u{2600}\u{FE0F}");
        assert_eq!(icon_glyph("no idea"), "\u{1F321}\u{FE0F}");
    }

    #[test]
    fn test_dominant_condition_counts_and_ties() {
        let items = vec![item("Rain"), item("Sunny"), item("Rain")];
        assert_eq!(dominant_condition(&items), Some("Rain"));

        // tie resolves to first in display order
        let items = vec![item("Sunny"), item("Rain")];
        assert_eq!(dominant_condition(&items), Some("Sunny"));

        // empty conditions are ignored entirely
        let items = vec![item(""), item(""), item("Snow")];
        assert_eq!(dominant_condition(&items), Some("Snow"));
        assert_eq!(dominant_condition(&[]), None);
    }
}
