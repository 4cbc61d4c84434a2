/*
 *  background.rs
 *
 *  SkyPane - weather worth watching
 *  (c) 2025-26 SkyPane contributors
 *
 *  Background resolution - explicit media > solid color > probed
 *  condition photo > procedural gradient
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

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::conditions::{self, Gradient};
use crate::config::{BackgroundType, Settings};
use crate::forecast::ForecastItem;

/// The effective background for the display.
#[derive(Debug, Clone, PartialEq)]
pub enum BackgroundSpec {
    /// Explicit user media, returned verbatim.
    Media { url: String, is_video: bool },
    Solid { color: String },
    /// Weather-derived photo that passed its availability probe.
    Image { url: String },
    /// Procedural fallback.
    Gradient { gradient: Gradient },
}

/// Background plus the uniform opacity post-multiplier. Opacity never
/// participates in the precedence decision.
#[derive(Debug, Clone, PartialEq)]
pub struct Background {
    pub spec: BackgroundSpec,
    pub opacity: u8,
}

/// Video detection by URL extension, query/fragment stripped.
pub fn is_video_url(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
    [".mp4", ".webm", ".ogg", ".mov"].iter().any(|ext| path.ends_with(ext))
}

/// Availability check for a candidate background photo. Purely a probe:
/// failures are expected and never propagate as errors.
#[async_trait]
pub trait ImageProbe: Send + Sync + 'static {
    async fn probe(&self, url: &str) -> bool;
}

/// Probe over HTTP: a successful GET means the asset exists.
#[derive(Debug)]
pub struct HttpImageProbe {
    client: Client,
}

impl HttpImageProbe {
    pub fn new() -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(500))
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for HttpImageProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageProbe for HttpImageProbe {
    async fn probe(&self, url: &str) -> bool {
        match self.client.get(url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("Background probe failed for {}: {}", url, e);
                false
            }
        }
    }
}

struct ProbeOutcome {
    epoch: u64,
    ok: bool,
}

/// Resolves the effective background from settings plus weather state.
///
/// Dynamic-mode photo candidates are verified off the render path: a
/// change of candidate bumps the probe epoch and spawns a new probe task;
/// outcomes carrying a stale epoch are dropped, so a superseded in-flight
/// probe can never overwrite the current resolution. There is no network
/// abort - cancellation is purely logical.
pub struct BackgroundResolver {
    probe: Arc<dyn ImageProbe>,
    asset_base_url: String,
    epoch: u64,
    /// Full URL of the current dynamic photo candidate.
    target_url: Option<String>,
    /// Probe verdict for `target_url`; false until a success arrives.
    probe_ok: bool,
    pending: Option<JoinHandle<()>>,
    outcome_tx: mpsc::UnboundedSender<ProbeOutcome>,
    outcome_rx: mpsc::UnboundedReceiver<ProbeOutcome>,
}

impl BackgroundResolver {
    pub fn new(probe: Arc<dyn ImageProbe>, asset_base_url: &str) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        Self {
            probe,
            asset_base_url: asset_base_url.trim_end_matches('/').to_string(),
            epoch: 0,
            target_url: None,
            probe_ok: false,
            pending: None,
            outcome_tx,
            outcome_rx,
        }
    }

    /// Decide the effective background. Identical inputs with no probe
    /// completion in between yield identical output.
    pub fn resolve(
        &mut self,
        settings: &Settings,
        current_condition: &str,
        items: &[ForecastItem],
    ) -> Background {
        self.drain_outcomes();

        let spec = match settings.background_type {
            // 1. explicit user media overrides all weather-driven logic
            BackgroundType::Image if !settings.background_url.is_empty() => {
                BackgroundSpec::Media {
                    url: settings.background_url.clone(),
                    is_video: is_video_url(&settings.background_url),
                }
            }
            // 2. solid color, verbatim
            BackgroundType::Solid => BackgroundSpec::Solid {
                color: settings.background_color.clone(),
            },
            // 3. dynamic: probed photo if available, gradient otherwise
            _ => self.resolve_dynamic(current_condition, items),
        };

        Background { spec, opacity: settings.background_opacity }
    }

    fn resolve_dynamic(&mut self, current_condition: &str, items: &[ForecastItem]) -> BackgroundSpec {
        // photo target biases toward the dominant condition of the window
        let photo_condition = conditions::dominant_condition(items)
            .unwrap_or(current_condition);
        let candidate = conditions::background_image(photo_condition)
            .map(|file| format!("{}/{}", self.asset_base_url, file));
        self.retarget(candidate);

        if self.probe_ok {
            if let Some(url) = &self.target_url {
                return BackgroundSpec::Image { url: url.clone() };
            }
        }

        // gradient target prefers what is happening right now
        let gradient_condition = if !current_condition.is_empty() {
            current_condition
        } else {
            items.first().map(|i| i.condition.as_str()).unwrap_or("")
        };
        BackgroundSpec::Gradient { gradient: conditions::gradient(gradient_condition) }
    }

    /// Start a new probe when the candidate changes; bumping the epoch
    /// invalidates whatever is still in flight.
    fn retarget(&mut self, candidate: Option<String>) {
        if candidate == self.target_url {
            return;
        }
        self.epoch += 1;
        self.probe_ok = false;
        self.target_url = candidate;

        if let Some(url) = self.target_url.clone() {
            debug!("Probing background image {} (epoch {})", url, self.epoch);
            let probe = Arc::clone(&self.probe);
            let tx = self.outcome_tx.clone();
            let epoch = self.epoch;
            self.pending = Some(tokio::spawn(async move {
                let ok = probe.probe(&url).await;
                let _ = tx.send(ProbeOutcome { epoch, ok });
            }));
        } else {
            self.pending = None;
        }
    }

    fn drain_outcomes(&mut self) {
        while let Ok(outcome) = self.outcome_rx.try_recv() {
            if outcome.epoch == self.epoch {
                self.probe_ok = outcome.ok;
            } else {
                debug!("Dropping stale probe outcome (epoch {})", outcome.epoch);
            }
        }
    }

    /// Await the most recent probe task. Deterministic sequencing for
    /// tests and shutdown; rendering never needs to call this.
    pub async fn settle(&mut self) {
        if let Some(handle) = self.pending.take() {
            let _ = handle.await;
        }
        self.drain_outcomes();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapProbe {
        verdicts: HashMap<String, bool>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl ImageProbe for MapProbe {
        async fn probe(&self, url: &str) -> bool {
            if let Some(d) = self.delay {
                tokio::time::sleep(d).await;
            }
            *self.verdicts.get(url).unwrap_or(&false)
        }
    }

    fn probe_with(entries: &[(&str, bool)], delay: Option<Duration>) -> Arc<dyn ImageProbe> {
        Arc::new(MapProbe {
            verdicts: entries.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            delay,
        })
    }

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

    const BASE: &str = "http://assets.local";

    #[test]
    fn test_video_url_detection() {
        assert!(is_video_url("http://x/clip.mp4"));
        assert!(is_video_url("http://x/CLIP.MOV"));
        assert!(is_video_url("http://x/clip.webm?cache=1"));
        assert!(is_video_url("http://x/clip.ogg#t=10"));
        assert!(!is_video_url("http://x/photo.jpg"));
        assert!(!is_video_url("http://x/clip.mp4.jpg"));
        assert!(!is_video_url(""));
    }

    #[tokio::test]
    async fn test_explicit_media_overrides_weather() {
        let mut resolver = BackgroundResolver::new(probe_with(&[], None), BASE);
        let mut settings = Settings::default();
        settings.background_type = BackgroundType::Image;
        settings.background_url = "http://media/loop.mp4".to_string();
        settings.background_opacity = 55;

        let bg = resolver.resolve(&settings, "Thunderstorm", &[]);
        assert_eq!(bg.opacity, 55);
        assert_eq!(
            bg.spec,
            BackgroundSpec::Media { url: "http://media/loop.mp4".into(), is_video: true }
        );
    }

    #[tokio::test]
    async fn test_solid_color_verbatim() {
        let mut resolver = BackgroundResolver::new(probe_with(&[], None), BASE);
        let mut settings = Settings::default();
        settings.background_type = BackgroundType::Solid;
        settings.background_color = "#224466".to_string();

        let bg = resolver.resolve(&settings, "Rain", &[]);
        assert_eq!(bg.spec, BackgroundSpec::Solid { color: "#224466".into() });
    }

    #[tokio::test]
    async fn test_dynamic_image_after_successful_probe() {
        let url = format!("{}/light-moderate-rain.jpg", BASE);
        let mut resolver =
            BackgroundResolver::new(probe_with(&[(url.as_str(), true)], None), BASE);
        let settings = Settings::default();

        // first pass: probe not yet settled, gradient shown
        let bg = resolver.resolve(&settings, "Rain", &[]);
        assert!(matches!(bg.spec, BackgroundSpec::Gradient { .. }));

        resolver.settle().await;
        let bg = resolver.resolve(&settings, "Rain", &[]);
        assert_eq!(bg.spec, BackgroundSpec::Image { url });
    }

    #[tokio::test]
    async fn test_probe_failure_falls_back_to_gradient() {
        let mut resolver = BackgroundResolver::new(probe_with(&[], None), BASE);
        let settings = Settings::default();

        resolver.resolve(&settings, "Rain", &[]);
        resolver.settle().await;
        let bg = resolver.resolve(&settings, "Rain", &[]);
        assert_eq!(
            bg.spec,
            BackgroundSpec::Gradient { gradient: conditions::gradient("Rain") }
        );
    }

    #[tokio::test]
    async fn test_dominant_condition_drives_photo_target() {
        let url = format!("{}/snow.jpg", BASE);
        let mut resolver =
            BackgroundResolver::new(probe_with(&[(url.as_str(), true)], None), BASE);
        let settings = Settings::default();
        let items = vec![item("Snow"), item("Sunny"), item("Snow")];

        // current says sunny, but the window is mostly snow
        resolver.resolve(&settings, "Sunny", &items);
        resolver.settle().await;
        let bg = resolver.resolve(&settings, "Sunny", &items);
        assert_eq!(bg.spec, BackgroundSpec::Image { url });
    }

    #[tokio::test]
    async fn test_no_condition_yields_default_gradient() {
        let mut resolver = BackgroundResolver::new(probe_with(&[], None), BASE);
        let settings = Settings::default();
        let bg = resolver.resolve(&settings, "", &[]);
        assert_eq!(
            bg.spec,
            BackgroundSpec::Gradient { gradient: conditions::DEFAULT_GRADIENT }
        );
    }

    #[tokio::test]
    async fn test_resolve_is_idempotent_between_probe_events() {
        let mut resolver = BackgroundResolver::new(probe_with(&[], None), BASE);
        let settings = Settings::default();
        let items = vec![item("Cloudy")];

        let a = resolver.resolve(&settings, "Cloudy", &items);
        let b = resolver.resolve(&settings, "Cloudy", &items);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_stale_probe_outcome_is_dropped() {
        let rain_url = format!("{}/light-moderate-rain.jpg", BASE);
        let snow_url = format!("{}/snow.jpg", BASE);
        // rain probe would succeed, but slowly; snow probe fails fast
        let probe = probe_with(
            &[(rain_url.as_str(), true), (snow_url.as_str(), false)],
            Some(Duration::from_millis(30)),
        );
        let mut resolver = BackgroundResolver::new(probe, BASE);
        let settings = Settings::default();

        // start probing rain, then retarget to snow before it completes
        resolver.resolve(&settings, "Rain", &[]);
        resolver.resolve(&settings, "Snow", &[]);
        resolver.settle().await;
        // give the superseded rain probe time to deliver its stale success
        tokio::time::sleep(Duration::from_millis(60)).await;

        let bg = resolver.resolve(&settings, "Snow", &[]);
        // the stale rain success must not have marked the snow target ok
        assert_eq!(
            bg.spec,
            BackgroundSpec::Gradient { gradient: conditions::gradient("Snow") }
        );
    }
}
