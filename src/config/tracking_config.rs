// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Tracking thresholds and scheduling parameters for every pipeline stage

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default file name looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "fleet_tracker.toml";

/// Main tracking configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub location: LocationFilterConfig,
    pub motion: MotionConfig,
    pub parking: ParkingConfig,
    pub geofence: GeofenceConfig,
    pub sync: SyncConfig,
    pub ping: PingConfig,
    pub events: EventsConfig,
}

/// Send-decision thresholds for incoming fixes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationFilterConfig {
    /// Fixes with a worse accuracy radius are never sent
    pub max_accuracy_m: f64,
    /// Minimum displacement from the last sent fix
    pub min_distance_m: f64,
    /// Minimum time since the last sent fix
    pub min_interval_ms: i64,
}

/// Activity-recognition analysis parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Length of the sliding analysis window
    pub analysis_window_ms: i64,
    /// Share of window time spent in a vehicle required to call a fold "driving"
    pub driving_percentage_threshold: f64,
    /// Samples below this confidence never count as driving
    pub min_confidence: u8,
    /// Consecutive driving folds before `InVehicle` fires
    pub consecutive_driving_required: u32,
    /// Consecutive non-driving folds before a trip is considered over
    pub consecutive_non_driving_required: u32,
}

/// Parking detection window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParkingConfig {
    /// Fixes older than this relative to the newest are evicted
    pub tracking_time_ms: i64,
    /// Minimum time span the window must cover before a decision
    pub trigger_time_ms: i64,
    pub parking_radius_m: f64,
    /// Silence after which the vehicle is reported parked
    pub timeout_ms: u64,
}

/// Stop geofence registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeofenceConfig {
    /// Radius used for stops that come without one
    pub default_radius_m: f64,
    /// Forward exit transitions in addition to entries
    pub notify_on_exit: bool,
}

/// Durable queue delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub interval_secs: u64,
    pub batch_size: u32,
    /// Unsent records older than this are purged
    pub retention_hours: u64,
    /// Lower bound between two event-driven cycles
    pub min_cycle_gap_ms: u64,
}

/// Keep-alive ping schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PingConfig {
    pub interval_secs: u64,
}

/// Channel sizing for the tracking pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Capacity of the broadcast stream exposed to observers
    pub broadcast_capacity: usize,
    /// Buffer between internal pipeline stages
    pub stage_buffer: usize,
}

impl TrackingConfig {
    /// Load tracking configuration from file or use defaults
    ///
    /// Lookup order: explicit path, `fleet_tracker.toml` in the working
    /// directory, `<config dir>/fleet-tracker/config.toml`, embedded defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(config_path) = path {
            return Self::load_from_file(config_path);
        }

        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            return Self::load_from_file(Path::new(DEFAULT_CONFIG_FILE));
        }

        if let Some(user_path) = user_config_path() {
            if user_path.exists() {
                return Self::load_from_file(&user_path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read tracking config file: {}", path.display()))?;

        let config: TrackingConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse tracking config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.location.max_accuracy_m <= 0.0 {
            return Err(anyhow::anyhow!("location.max_accuracy_m must be positive"));
        }
        if self.location.min_distance_m < 0.0 || self.location.min_interval_ms < 0 {
            return Err(anyhow::anyhow!("location thresholds cannot be negative"));
        }
        if self.motion.analysis_window_ms <= 0 {
            return Err(anyhow::anyhow!("motion.analysis_window_ms must be positive"));
        }
        if !(0.0..=100.0).contains(&self.motion.driving_percentage_threshold) {
            return Err(anyhow::anyhow!(
                "motion.driving_percentage_threshold must be within 0..=100"
            ));
        }
        if self.motion.consecutive_driving_required == 0
            || self.motion.consecutive_non_driving_required == 0
        {
            return Err(anyhow::anyhow!("motion debounce counts must be at least 1"));
        }
        if self.parking.trigger_time_ms > self.parking.tracking_time_ms {
            return Err(anyhow::anyhow!(
                "parking.trigger_time_ms cannot exceed parking.tracking_time_ms"
            ));
        }
        if self.parking.parking_radius_m <= 0.0 || self.parking.timeout_ms == 0 {
            return Err(anyhow::anyhow!("parking radius and timeout must be positive"));
        }
        if self.geofence.default_radius_m <= 0.0 {
            return Err(anyhow::anyhow!("geofence.default_radius_m must be positive"));
        }
        if self.sync.interval_secs == 0 || self.sync.batch_size == 0 {
            return Err(anyhow::anyhow!("sync interval and batch size must be positive"));
        }
        if self.ping.interval_secs == 0 {
            return Err(anyhow::anyhow!("ping.interval_secs must be positive"));
        }
        if self.events.broadcast_capacity == 0 || self.events.stage_buffer == 0 {
            return Err(anyhow::anyhow!("event channel sizes must be positive"));
        }
        Ok(())
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("fleet-tracker").join("config.toml"))
}

impl ParkingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.retention_hours as i64)
    }

    pub fn min_cycle_gap(&self) -> Duration {
        Duration::from_millis(self.min_cycle_gap_ms)
    }
}

impl PingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for LocationFilterConfig {
    fn default() -> Self {
        Self {
            max_accuracy_m: 50.0,
            min_distance_m: 25.0,
            min_interval_ms: 30_000,
        }
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            analysis_window_ms: 5 * 60 * 1000,
            driving_percentage_threshold: 60.0,
            min_confidence: 50,
            consecutive_driving_required: 3,
            consecutive_non_driving_required: 5,
        }
    }
}

impl Default for ParkingConfig {
    fn default() -> Self {
        Self {
            tracking_time_ms: 5 * 60 * 1000,
            trigger_time_ms: 2 * 60 * 1000,
            parking_radius_m: 50.0,
            timeout_ms: 10 * 60 * 1000,
        }
    }
}

impl Default for GeofenceConfig {
    fn default() -> Self {
        Self {
            default_radius_m: 150.0,
            notify_on_exit: false,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            batch_size: 100,
            retention_hours: 72,
            min_cycle_gap_ms: 5_000,
        }
    }
}

impl Default for PingConfig {
    fn default() -> Self {
        Self { interval_secs: 300 }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 256,
            stage_buffer: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        let config = TrackingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.location.max_accuracy_m, 50.0);
        assert_eq!(config.motion.consecutive_driving_required, 3);
        assert!(!config.geofence.notify_on_exit);
    }

    #[test]
    fn test_partial_config_file_keeps_defaults() -> Result<()> {
        let mut temp_file = NamedTempFile::new()?;
        writeln!(
            temp_file,
            r#"
[location]
max_accuracy_m = 30.0

[parking]
tracking_time_ms = 1000
trigger_time_ms = 100
parking_radius_m = 1000.0

[sync]
batch_size = 25
"#
        )?;

        let config = TrackingConfig::load_from_file(temp_file.path())?;

        assert_eq!(config.location.max_accuracy_m, 30.0);
        assert_eq!(config.location.min_distance_m, 25.0);
        assert_eq!(config.parking.trigger_time_ms, 100);
        assert_eq!(config.parking.timeout_ms, 10 * 60 * 1000);
        assert_eq!(config.sync.batch_size, 25);
        assert_eq!(config.ping, PingConfig::default());
        Ok(())
    }

    #[test]
    fn test_invalid_parking_window_rejected() {
        let mut config = TrackingConfig::default();
        config.parking.trigger_time_ms = config.parking.tracking_time_ms + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_file_is_an_error() -> Result<()> {
        let mut temp_file = NamedTempFile::new()?;
        writeln!(temp_file, "[motion]\nconsecutive_driving_required = 0")?;
        assert!(TrackingConfig::load_from_file(temp_file.path()).is_err());
        Ok(())
    }
}
