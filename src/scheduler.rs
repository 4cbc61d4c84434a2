/*
 *  scheduler.rs
 *
 *  SkyPane - weather worth watching
 *  (c) 2025-26 SkyPane contributors
 *
 *  Cycle scheduler - owns the timed rotation across configured
 *  locations, pre-fetching the next location's data during the outgoing
 *  transition and committing only once the data is ready
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

use chrono::{DateTime, FixedOffset, Utc};
use log::{debug, error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::{LocationConfig, LocationMode, Settings, SettingsStore, Transition, UnitSystem};
use crate::forecast::{self, ForecastItem, ForecastRange};
use crate::provider::{ForecastQuery, ProviderError, WeatherProvider};

/// Default minimum fade duration before a rotation commit.
pub const MIN_FADE: Duration = Duration::from_millis(600);

const CLOCK_TICK: Duration = Duration::from_secs(1);

/// The complete weather state for the displayed location.
///
/// Replaced atomically on each successful fetch, never partially
/// updated; a failed fetch leaves the prior snapshot in place.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherSnapshot {
    pub items: Vec<ForecastItem>,
    pub current_condition: String,
    pub resolved_location: String,
    pub timezone_id: Option<String>,
    pub utc_offset: Option<FixedOffset>,
}

/// Scheduler phase. The error flag lives beside the phase, not inside
/// it: a failed fetch coexists with the last-good snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No locations configured; nothing is fetched.
    Idle,
    /// First fetch in flight, nothing to show yet.
    Loading,
    /// Snapshot present, rotation timer armed.
    Displaying,
    /// Fade-out running while the next location pre-fetches.
    Transitioning,
}

/// Read-only projection handed to the presentation layer over a watch
/// channel. The scheduler is the only writer.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayState {
    pub phase: Phase,
    pub snapshot: Option<WeatherSnapshot>,
    pub location_index: usize,
    pub location_label: String,
    /// User-visible fetch failure, cleared by the next success.
    pub error: Option<String>,
    /// Wall clock, refreshed once a second independent of fetching.
    pub clock: DateTime<Utc>,
}

impl DisplayState {
    fn initial() -> Self {
        Self {
            phase: Phase::Idle,
            snapshot: None,
            location_index: 0,
            location_label: String::new(),
            error: None,
            clock: Utc::now(),
        }
    }
}

#[derive(Debug)]
pub enum SchedulerCommand {
    /// User-triggered retry of the current location.
    Retry,
    Stop,
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerOptions {
    /// Minimum visible transition gap for non-instant rotations.
    pub min_fade: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self { min_fade: MIN_FADE }
    }
}

struct FetchOutcome {
    token: u64,
    index: usize,
    label: String,
    result: Result<WeatherSnapshot, ProviderError>,
}

/// Handle to a running scheduler: command channel plus the state
/// projection. Dropping the handle sends a best-effort stop.
#[derive(Debug)]
pub struct SchedulerHandle {
    cmd_tx: mpsc::Sender<SchedulerCommand>,
    state_rx: watch::Receiver<DisplayState>,
    task: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn subscribe(&self) -> watch::Receiver<DisplayState> {
        self.state_rx.clone()
    }

    pub async fn retry(&self) {
        let _ = self.cmd_tx.send(SchedulerCommand::Retry).await;
    }

    /// Orderly shutdown: stop the loop and join the task.
    pub async fn shutdown(mut self) {
        let _ = self.cmd_tx.send(SchedulerCommand::Stop).await;
        if let Some(task) = self.task.take() {
            task.await
                .unwrap_or_else(|e| error!("Scheduler task failed to join: {}", e));
        }
        info!("Cycle scheduler stopped.");
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        // Drop is not async; try_send is the best we can do here
        if let Some(task) = &self.task {
            if !task.is_finished() {
                let _ = self.cmd_tx.try_send(SchedulerCommand::Stop);
            }
        }
    }
}

pub struct CycleScheduler {
    provider: Arc<dyn WeatherProvider>,
    settings_rx: watch::Receiver<Settings>,
    settings: Settings,
    state_tx: watch::Sender<DisplayState>,
    cmd_rx: mpsc::Receiver<SchedulerCommand>,
    options: SchedulerOptions,
    current_index: usize,
    /// Monotonically increasing fetch token; only the response carrying
    /// the most recently issued token may commit (last-issued-wins).
    next_token: u64,
    latest_token: u64,
    fetches: JoinSet<FetchOutcome>,
}

impl CycleScheduler {
    /// Spawn the scheduler loop, returning its handle.
    pub fn spawn(
        provider: Arc<dyn WeatherProvider>,
        store: &SettingsStore,
        options: SchedulerOptions,
    ) -> SchedulerHandle {
        let settings_rx = store.subscribe();
        let settings = store.current();
        let (state_tx, state_rx) = watch::channel(DisplayState::initial());
        let (cmd_tx, cmd_rx) = mpsc::channel(8);

        let scheduler = CycleScheduler {
            provider,
            settings_rx,
            settings,
            state_tx,
            cmd_rx,
            options,
            current_index: 0,
            next_token: 0,
            latest_token: 0,
            fetches: JoinSet::new(),
        };

        let task = tokio::spawn(scheduler.run());
        SchedulerHandle { cmd_tx, state_rx, task: Some(task) }
    }

    async fn run(mut self) {
        let mut cycle = self.new_cycle_interval();
        let mut clock = tokio::time::interval(CLOCK_TICK);
        clock.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // first paint: fetch location[0] if anything is configured
        if self.settings.locations.is_empty() {
            info!("No locations configured; scheduler idle.");
        } else {
            let label = self.settings.locations[0].display_name().to_string();
            self.state_tx.send_modify(|s| {
                s.phase = Phase::Loading;
                s.location_label = label;
            });
            self.issue_fetch(0, false);
        }

        loop {
            tokio::select! {
                _ = clock.tick() => {
                    self.state_tx.send_modify(|s| s.clock = Utc::now());
                }
                _ = cycle.tick() => {
                    self.on_cycle_tick();
                }
                changed = self.settings_rx.changed() => {
                    if changed.is_err() {
                        // settings store dropped; nothing left to drive us
                        break;
                    }
                    let fresh = self.settings_rx.borrow_and_update().clone();
                    if self.apply_settings(fresh) {
                        cycle = self.new_cycle_interval();
                    }
                }
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(SchedulerCommand::Retry) => self.on_retry(),
                        Some(SchedulerCommand::Stop) | None => {
                            info!("Cycle scheduler received stop signal. Exiting.");
                            break;
                        }
                    }
                }
                Some(joined) = self.fetches.join_next() => {
                    match joined {
                        Ok(outcome) => self.on_fetch_outcome(outcome),
                        Err(e) => error!("Fetch task panicked: {}", e),
                    }
                }
            }
        }
        // timers and in-flight fetch tasks drop with self
    }

    fn new_cycle_interval(&self) -> tokio::time::Interval {
        let period = Duration::from_secs(u64::from(self.settings.cycle_duration_secs.max(1)));
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval
    }

    fn location(&self, index: usize) -> Option<&LocationConfig> {
        self.settings.locations.get(index)
    }

    /// Tag and launch a fetch for `index`. Non-zero fade couples the
    /// commit to a minimum fade-out so outgoing content is never
    /// replaced mid-fade and incoming content is never shown half-loaded.
    fn issue_fetch(&mut self, index: usize, with_fade: bool) {
        let Some(location) = self.location(index).cloned() else {
            return;
        };
        self.next_token += 1;
        let token = self.next_token;
        self.latest_token = token;

        let label = location.display_name().to_string();
        let unit = self.settings.unit;
        let range = self.settings.forecast_range;
        let fade = if with_fade { self.options.min_fade } else { Duration::ZERO };
        let provider = Arc::clone(&self.provider);

        debug!("Issuing fetch #{} for '{}' (index {})", token, label, index);
        self.fetches.spawn(async move {
            let (result, _) = tokio::join!(
                fetch_snapshot(provider, location, unit, range),
                tokio::time::sleep(fade),
            );
            FetchOutcome { token, index, label, result }
        });
    }

    /// Invalidate whatever is in flight without issuing a replacement.
    fn invalidate_inflight(&mut self) {
        self.next_token += 1;
        self.latest_token = self.next_token;
    }

    fn on_cycle_tick(&mut self) {
        let count = self.settings.locations.len();
        match count {
            0 => {}
            1 => {
                // no rotation for a single location, but a lingering
                // fetch failure heals itself on the next tick
                if self.state_tx.borrow().error.is_some() {
                    self.issue_fetch(self.current_index, false);
                }
            }
            _ => {
                let next = (self.current_index + 1) % count;
                let with_fade = self.settings.transition != Transition::Instant;
                // a fade-out needs something on screen to fade; with no
                // snapshot yet (first fetch failed) stay in Loading
                if with_fade && self.state_tx.borrow().snapshot.is_some() {
                    self.state_tx.send_modify(|s| s.phase = Phase::Transitioning);
                }
                self.issue_fetch(next, with_fade);
            }
        }
    }

    fn on_retry(&mut self) {
        if self.settings.locations.is_empty() {
            return;
        }
        info!("Manual retry for location index {}", self.current_index);
        if self.state_tx.borrow().snapshot.is_none() {
            self.state_tx.send_modify(|s| s.phase = Phase::Loading);
        }
        self.issue_fetch(self.current_index, false);
    }

    /// React to a settings change. Returns true when the cycle interval
    /// must be re-armed.
    fn apply_settings(&mut self, fresh: Settings) -> bool {
        let old = std::mem::replace(&mut self.settings, fresh);
        let new = &self.settings;
        let rearm = old.cycle_duration_secs != new.cycle_duration_secs;

        let mut refetch_current = old.unit != new.unit || old.forecast_range != new.forecast_range;

        if old.locations != new.locations {
            if new.locations.is_empty() {
                info!("All locations removed; scheduler idle.");
                self.current_index = 0;
                self.invalidate_inflight();
                self.state_tx.send_modify(|s| {
                    s.phase = Phase::Idle;
                    s.snapshot = None;
                    s.location_index = 0;
                    s.location_label.clear();
                    s.error = None;
                });
                return rearm;
            }
            if old.locations.is_empty() {
                self.current_index = 0;
                let label = new.locations[0].display_name().to_string();
                self.state_tx.send_modify(|s| {
                    s.phase = Phase::Loading;
                    s.location_label = label;
                });
                self.issue_fetch(0, false);
                return rearm;
            }
            if self.current_index >= new.locations.len() {
                self.current_index = 0;
                refetch_current = true;
            } else if old.locations.get(self.current_index) != new.locations.get(self.current_index) {
                // the entry under the cursor was edited in place
                refetch_current = true;
            }
        }

        if refetch_current {
            debug!("Settings change triggers re-fetch of current location");
            self.issue_fetch(self.current_index, false);
        }
        rearm
    }

    fn on_fetch_outcome(&mut self, outcome: FetchOutcome) {
        if outcome.token != self.latest_token {
            debug!(
                "Discarding superseded fetch response #{} (latest is #{})",
                outcome.token, self.latest_token
            );
            return;
        }
        match outcome.result {
            Ok(snapshot) => {
                info!(
                    "Weather data fetched for '{}' ({} items)",
                    snapshot.resolved_location,
                    snapshot.items.len()
                );
                self.current_index = outcome.index;
                self.state_tx.send_modify(|s| {
                    s.snapshot = Some(snapshot);
                    s.phase = Phase::Displaying;
                    s.location_index = outcome.index;
                    s.location_label = outcome.label;
                    s.error = None;
                });
            }
            Err(e) => {
                // keep the previous location's data (stale but valid);
                // the next scheduled tick retries the same target
                error!("Weather fetch failed for '{}': {}", outcome.label, e);
                self.state_tx.send_modify(|s| {
                    s.error = Some("Unable to load weather data".to_string());
                    s.phase = if s.snapshot.is_some() { Phase::Displaying } else { Phase::Loading };
                });
            }
        }
    }
}

/// One complete fetch: current conditions first (for the timezone
/// offset), then the forecast window, normalized into a snapshot.
async fn fetch_snapshot(
    provider: Arc<dyn WeatherProvider>,
    location: LocationConfig,
    unit: UnitSystem,
    range: ForecastRange,
) -> Result<WeatherSnapshot, ProviderError> {
    let query = ForecastQuery {
        unit,
        city: match location.mode {
            LocationMode::Manual => location.query.clone(),
            LocationMode::Auto => None,
        },
    };

    let current = provider.current_conditions(&query).await?;
    let offset = current
        .utc_offset_seconds
        .and_then(FixedOffset::east_opt);

    let records = if range.is_daily() {
        provider.daily_forecast(&query, range.count()).await?
    } else {
        provider.hourly_forecast(&query, range.count()).await?
    };
    let items = forecast::normalize(&records, range, offset);

    let resolved_location = current
        .localized_city
        .clone()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| location.display_name().to_string());

    Ok(WeatherSnapshot {
        items,
        current_condition: current.condition_text,
        resolved_location,
        timezone_id: current.timezone_id,
        utc_offset: offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::CurrentConditions;
    use async_trait::async_trait;
    use serde_json::{Value, json};

    struct StaticProvider;

    #[async_trait]
    impl WeatherProvider for StaticProvider {
        async fn hourly_forecast(
            &self,
            _query: &ForecastQuery,
            hours: u32,
        ) -> Result<Vec<Value>, ProviderError> {
            Ok((0..hours as i64)
                .map(|h| json!({ "Timestamp": 1_717_416_000 + h * 3600, "Label": "Clear", "Temp": 20.0 }))
                .collect())
        }

        async fn daily_forecast(
            &self,
            _query: &ForecastQuery,
            days: u32,
        ) -> Result<Vec<Value>, ProviderError> {
            Ok((0..days as i64)
                .map(|d| json!({
                    "Timestamp": 1_717_416_000 + d * 86_400,
                    "Label": "Sunny",
                    "MaxTemp": 21.0,
                    "MinTemp": 11.0,
                }))
                .collect())
        }

        async fn current_conditions(
            &self,
            _query: &ForecastQuery,
        ) -> Result<CurrentConditions, ProviderError> {
            Ok(CurrentConditions {
                condition_text: "Sunny".to_string(),
                localized_city: Some("Paris".to_string()),
                timezone_id: Some("Europe/Paris".to_string()),
                utc_offset_seconds: Some(7200),
            })
        }
    }

    fn paris() -> LocationConfig {
        LocationConfig {
            id: "p1".into(),
            mode: LocationMode::Manual,
            query: Some("Paris".into()),
            label: None,
        }
    }

    #[tokio::test]
    async fn test_fetch_snapshot_assembles_state() {
        let snapshot = fetch_snapshot(
            Arc::new(StaticProvider),
            paris(),
            UnitSystem::Metric,
            ForecastRange::Days3,
        )
        .await
        .unwrap();

        assert_eq!(snapshot.items.len(), 3);
        assert_eq!(snapshot.current_condition, "Sunny");
        assert_eq!(snapshot.resolved_location, "Paris");
        assert_eq!(snapshot.timezone_id.as_deref(), Some("Europe/Paris"));
        assert_eq!(snapshot.utc_offset, FixedOffset::east_opt(7200));
        assert_eq!(snapshot.items[0].temperature_high, Some(21.0));
        assert_eq!(snapshot.items[0].temperature_low, Some(11.0));
    }

    #[tokio::test]
    async fn test_auto_location_omits_city() {
        struct AssertingProvider;

        #[async_trait]
        impl WeatherProvider for AssertingProvider {
            async fn hourly_forecast(
                &self,
                query: &ForecastQuery,
                _hours: u32,
            ) -> Result<Vec<Value>, ProviderError> {
                assert_eq!(query.city, None);
                Ok(vec![])
            }
            async fn daily_forecast(
                &self,
                _query: &ForecastQuery,
                _days: u32,
            ) -> Result<Vec<Value>, ProviderError> {
                unreachable!("hourly range requested")
            }
            async fn current_conditions(
                &self,
                query: &ForecastQuery,
            ) -> Result<CurrentConditions, ProviderError> {
                assert_eq!(query.city, None);
                Ok(CurrentConditions::default())
            }
        }

        let auto = LocationConfig {
            id: "a1".into(),
            mode: LocationMode::Auto,
            query: Some("ignored for auto".into()),
            label: None,
        };
        let snapshot = fetch_snapshot(
            Arc::new(AssertingProvider),
            auto,
            UnitSystem::Imperial,
            ForecastRange::Hours8,
        )
        .await
        .unwrap();
        // no localized city from the provider: fall back to stock label
        assert_eq!(snapshot.resolved_location, "ignored for auto");
    }
}
