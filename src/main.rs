/*
 *  main.rs
 *
 *  SkyPane - weather worth watching
 *  (c) 2025-26 SkyPane contributors
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

use std::sync::Arc;

use clap::Parser;
use env_logger::Env;
use log::{error, info};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use skypane::background::{Background, BackgroundResolver, BackgroundSpec, HttpImageProbe};
use skypane::config::{self, Cli, RuntimeOptions, SettingsStore};
use skypane::layout::select_layout;
use skypane::provider::HttpWeatherProvider;
use skypane::scheduler::{CycleScheduler, DisplayState, Phase, SchedulerOptions};
use skypane::timefmt;

include!(concat!(env!("OUT_DIR"), "/build_info.rs"));

async fn signal_handler() -> Result<(), Box<dyn std::error::Error>> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT received. Initiating graceful shutdown.");
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received. Initiating graceful shutdown.");
        }
        _ = sighup.recv() => {
            info!("SIGHUP received. Initiating graceful shutdown.");
        }
    }
    Ok(())
}

fn describe_background(bg: &Background) -> String {
    match &bg.spec {
        BackgroundSpec::Media { url, is_video: true } => format!("video {}", url),
        BackgroundSpec::Media { url, is_video: false } => format!("media {}", url),
        BackgroundSpec::Solid { color } => format!("solid {}", color),
        BackgroundSpec::Image { url } => format!("image {}", url),
        BackgroundSpec::Gradient { gradient } => {
            format!("gradient {} -> {}", gradient.top, gradient.bottom)
        }
    }
}

/// Log one frame's worth of presentation decisions. A real renderer
/// would paint from the same inputs; the decisions live in the library.
fn present(
    state: &DisplayState,
    resolver: &mut BackgroundResolver,
    store: &SettingsStore,
    runtime: &RuntimeOptions,
) {
    let settings = store.current();
    let layout = select_layout(runtime.aspect_ratio);

    match state.phase {
        Phase::Idle => {
            info!("[{}] no locations configured", layout);
            return;
        }
        Phase::Loading => {
            info!("[{}] loading '{}'...", layout, state.location_label);
        }
        Phase::Transitioning => {
            info!("[{}] fading out '{}'...", layout, state.location_label);
        }
        Phase::Displaying => {}
    }

    if let Some(err) = &state.error {
        error!("[{}] {}", layout, err);
    }

    let Some(snapshot) = &state.snapshot else {
        return;
    };

    let background = resolver.resolve(&settings, &snapshot.current_condition, &snapshot.items);
    let clock = timefmt::format_time(state.clock, settings.time_format, snapshot.utc_offset);
    let date = timefmt::format_date(state.clock, settings.date_format, snapshot.utc_offset);

    info!(
        "[{}] {} | {} {} | {} | bg: {}",
        layout,
        snapshot.resolved_location,
        date,
        clock,
        snapshot.current_condition,
        describe_background(&background),
    );
    for item in &snapshot.items {
        let temps = match (item.temperature_high, item.temperature_low) {
            (Some(hi), Some(lo)) => format!("{:.0}{u}/{:.0}{u}", hi, lo, u = settings.unit.unit_label()),
            _ => format!("{:.0}{}", item.temperature, settings.unit.unit_label()),
        };
        info!("  {} {} {}", item.label, temps, item.condition);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let (settings, runtime) = config::load_with(cli)?;

    env_logger::Builder::from_env(
        Env::default().default_filter_or(runtime.log_level.as_deref().unwrap_or("info")),
    )
    .init();

    info!("v.{} built {}", env!("CARGO_PKG_VERSION"), BUILD_DATE);
    info!(
        "{} location(s), {}s cycle, provider {}",
        settings.locations.len(),
        settings.cycle_duration_secs,
        runtime.provider_url
    );

    let provider = Arc::new(HttpWeatherProvider::new(&runtime.provider_url)?);
    let store = SettingsStore::new(settings);
    let handle = CycleScheduler::spawn(provider, &store, SchedulerOptions::default());
    let mut state_rx = handle.subscribe();
    let mut resolver =
        BackgroundResolver::new(Arc::new(HttpImageProbe::new()), &runtime.asset_base_url);
    let mut last: Option<DisplayState> = None;

    loop {
        tokio::select! {
            result = signal_handler() => {
                if let Err(e) = result {
                    error!("Signal handler failed: {}", e);
                }
                break;
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    error!("Scheduler state channel closed unexpectedly.");
                    break;
                }
                let state = state_rx.borrow_and_update().clone();
                // the clock field updates every second; only repaint on
                // a material change
                let material = last.as_ref().is_none_or(|prev| {
                    prev.phase != state.phase
                        || prev.snapshot != state.snapshot
                        || prev.error != state.error
                        || prev.location_index != state.location_index
                });
                if material {
                    present(&state, &mut resolver, &store, &runtime);
                }
                last = Some(state);
            }
        }
    }

    handle.shutdown().await;
    info!("SkyPane exited cleanly.");
    Ok(())
}
