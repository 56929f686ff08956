// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Replay a recorded drive through the tracking engine.
//!
//! The recording is JSON lines, one sample per line:
//!
//! ```text
//! {"kind":"location","latitude":52.23,"longitude":21.01,"accuracy":8.0,"timestamp":1700000000000}
//! {"kind":"motion","motion_state":"IN_VEHICLE","confidence":90,"timestamp":1700000001000}
//! ```
//!
//! Tracking events are printed to stdout as JSON lines.

use anyhow::{Context, Result};
use clap::Parser;
use fleet_tracker::config::{EnvironmentConfig, TrackingConfig};
use fleet_tracker::geofence::SimulatedGeofenceMonitor;
use fleet_tracker::health::HealthChecker;
use fleet_tracker::loads::StaticLoadRepository;
use fleet_tracker::logging::LoggingConfig;
use fleet_tracker::manager::{TrackingDependencies, TrackingEvent, TrackingManager};
use fleet_tracker::models::{Location, MotionEvent, Stop};
use fleet_tracker::queue::LocationQueue;
use fleet_tracker::sources::{ChannelLocationSource, ChannelMotionSource};
use fleet_tracker::transport::HttpTrackingApi;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::broadcast;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "fleet-tracker-replay")]
#[command(about = "Replay a recorded GPS/motion track through the tracking engine")]
struct Args {
    /// JSON-lines recording of location and motion samples
    #[arg(short, long)]
    input: PathBuf,

    /// Load to track
    #[arg(short, long)]
    load_id: String,

    /// JSON array of stops for the load
    #[arg(short, long)]
    stops: Option<PathBuf>,

    /// Tracking thresholds file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Playback speed relative to recorded time; 0 replays without pauses
    #[arg(long, default_value_t = 0.0)]
    speed: f64,

    /// Seconds to keep the session open after the last sample
    #[arg(long, default_value_t = 5)]
    linger_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ReplayRecord {
    Location(Location),
    Motion(MotionEvent),
}

impl ReplayRecord {
    fn timestamp(&self) -> i64 {
        match self {
            ReplayRecord::Location(l) => l.timestamp,
            ReplayRecord::Motion(m) => m.timestamp,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    LoggingConfig::from_env().init()?;

    let args = Args::parse();
    let env = EnvironmentConfig::from_env()?;
    info!("{}", env.summary());

    let config_path = args.config.clone().or_else(|| env.tracking_config_path.clone());
    let config = TrackingConfig::load(config_path.as_deref())?;
    let records = read_recording(&args.input).await?;
    let stops = match &args.stops {
        Some(path) => read_stops(path).await?,
        None => Vec::new(),
    };
    info!(
        replay.samples = records.len(),
        replay.stops = stops.len(),
        "Recording loaded"
    );

    let queue = LocationQueue::new(&env.database.url).await?;
    let locations = Arc::new(ChannelLocationSource::new(config.events.stage_buffer));
    let motions = Arc::new(ChannelMotionSource::new(config.events.stage_buffer));
    let geofences = Arc::new(SimulatedGeofenceMonitor::new());
    let deps = TrackingDependencies {
        location_source: locations.clone(),
        motion_source: motions.clone(),
        loads: Arc::new(StaticLoadRepository::with_load(&args.load_id, stops)),
        geofence_monitor: geofences.clone(),
        api: Arc::new(HttpTrackingApi::new(&env.api)?),
    };

    let sync_config = config.sync.clone();
    let mut manager = TrackingManager::new(config, queue.clone(), deps);
    let health = HealthChecker::new(queue, manager.link_status(), &sync_config);

    let events = manager.start_tracking(&args.load_id).await?;
    let printer = tokio::spawn(print_events(events));

    let mut previous: Option<i64> = None;
    for record in records {
        if args.speed > 0.0 {
            if let Some(prev) = previous {
                let gap_ms = (record.timestamp() - prev).max(0) as f64 / args.speed;
                tokio::time::sleep(Duration::from_millis(gap_ms as u64)).await;
            }
        }
        previous = Some(record.timestamp());

        let delivered = match record {
            ReplayRecord::Location(location) => {
                geofences.feed(&location).await;
                locations.push(location).await
            }
            ReplayRecord::Motion(event) => motions.push(event).await,
        };
        if !delivered {
            warn!("Tracking stopped before the recording ended");
            break;
        }
    }

    tokio::time::sleep(Duration::from_secs(args.linger_secs)).await;
    manager.stop_tracking().await?;
    printer.await?;

    println!("{}", serde_json::to_string(&health.check().await)?);
    Ok(())
}

async fn read_recording(path: &Path) -> Result<Vec<ReplayRecord>> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read recording: {}", path.display()))?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("Invalid sample on line {} of {}", n + 1, path.display()))
        })
        .collect()
}

async fn read_stops(path: &Path) -> Result<Vec<Stop>> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read stops: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse stops: {}", path.display()))
}

async fn print_events(mut events: broadcast::Receiver<TrackingEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "Failed to serialize event"),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(events.skipped = skipped, "Event printer lagging");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
