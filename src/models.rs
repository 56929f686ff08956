// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Data Models
//!
//! Core value types shared by every stage of the tracking pipeline.
//!
//! ## Core Models
//!
//! - [`Location`]: a single raw fix from the OS location provider
//! - [`LocationRecord`]: a fix persisted in the local delivery queue
//! - [`MotionEvent`]: a classified activity-recognition sample
//! - [`Stop`] / [`Load`]: server-defined stops of the active load
//! - [`GeofenceEvent`]: arrival or departure at a stop
//! - [`ParkingLocation`] / [`ParkingStatus`]: parking detection window entries and results

use serde::{Deserialize, Serialize};

/// A single GPS fix as delivered by the platform location provider
///
/// # Examples
///
/// ```rust
/// use fleet_tracker::models::Location;
///
/// let fix = Location::new(52.2297, 21.0122, 8.0, 1_700_000_000_000)
///     .with_speed(13.4)
///     .with_battery(87, false);
/// assert_eq!(fix.battery_level, Some(87));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in degrees (WGS84)
    pub latitude: f64,
    /// Longitude in degrees (WGS84)
    pub longitude: f64,
    /// Horizontal accuracy radius in meters
    pub accuracy: f64,
    /// Altitude above the WGS84 ellipsoid in meters
    pub altitude: Option<f64>,
    /// Ground speed in meters per second
    pub speed: Option<f64>,
    /// Bearing in degrees, clockwise from true north
    pub bearing: Option<f64>,
    /// Wall-clock time of the fix in milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Device battery level, 0-100
    pub battery_level: Option<u8>,
    /// Whether the device was charging when the fix was taken
    pub is_charging: Option<bool>,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64, accuracy: f64, timestamp: i64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy,
            altitude: None,
            speed: None,
            bearing: None,
            timestamp,
            battery_level: None,
            is_charging: None,
        }
    }

    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn with_bearing(mut self, bearing: f64) -> Self {
        self.bearing = Some(bearing);
        self
    }

    pub fn with_battery(mut self, level: u8, charging: bool) -> Self {
        self.battery_level = Some(level.min(100));
        self.is_charging = Some(charging);
        self
    }

    /// Coordinates are finite, inside WGS84 bounds, and carry a usable accuracy
    pub fn has_valid_coordinates(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
            && self.accuracy.is_finite()
            && self.accuracy >= 0.0
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// Plain latitude/longitude pair in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

/// A location persisted in the local delivery queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    /// Monotonic local identity, never reused
    pub id: i64,
    pub location: Location,
    pub sent: bool,
}

/// Transport mode reported by activity recognition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MotionState {
    Stationary,
    Walking,
    Running,
    InVehicle,
    OnBicycle,
    Unknown,
}

impl MotionState {
    /// Classification order used when a sample carries several flags
    pub const PRIORITY: [MotionState; 6] = [
        MotionState::InVehicle,
        MotionState::OnBicycle,
        MotionState::Running,
        MotionState::Walking,
        MotionState::Stationary,
        MotionState::Unknown,
    ];

    /// Pick a single state from raw activity flags; the first match in
    /// [`MotionState::PRIORITY`] wins and no flags at all means `Unknown`.
    pub fn classify(flags: &ActivityFlags) -> Self {
        Self::PRIORITY
            .into_iter()
            .find(|state| flags.is_set(*state))
            .unwrap_or(MotionState::Unknown)
    }

    pub fn is_vehicle(&self) -> bool {
        matches!(self, MotionState::InVehicle)
    }
}

/// Raw, possibly overlapping activity flags from the platform recognizer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityFlags {
    pub stationary: bool,
    pub walking: bool,
    pub running: bool,
    pub automotive: bool,
    pub cycling: bool,
    pub unknown: bool,
}

impl ActivityFlags {
    fn is_set(&self, state: MotionState) -> bool {
        match state {
            MotionState::Stationary => self.stationary,
            MotionState::Walking => self.walking,
            MotionState::Running => self.running,
            MotionState::InVehicle => self.automotive,
            MotionState::OnBicycle => self.cycling,
            MotionState::Unknown => self.unknown,
        }
    }
}

/// A single activity-recognition sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionEvent {
    pub motion_state: MotionState,
    /// Recognizer confidence, 0-100
    pub confidence: u8,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl MotionEvent {
    pub fn new(motion_state: MotionState, confidence: u8, timestamp: i64) -> Self {
        Self {
            motion_state,
            confidence: confidence.min(100),
            timestamp,
        }
    }

    pub fn from_flags(flags: &ActivityFlags, confidence: u8, timestamp: i64) -> Self {
        Self::new(MotionState::classify(flags), confidence, timestamp)
    }
}

/// Kind of stop on a load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopType {
    Pickup,
    Delivery,
    Waypoint,
}

/// A server-defined stop of the active load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Geofence radius in meters; non-positive values fall back to the configured default
    pub radius: f64,
    pub stop_type: StopType,
}

/// The load the driver is currently connected to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Load {
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeofenceEventKind {
    Entered,
    Exited,
}

/// Arrival or departure at a stop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeofenceEvent {
    pub stop_id: String,
    pub stop_type: StopType,
    pub kind: GeofenceEventKind,
}

/// Lightweight projection of a [`Location`] kept in the parking window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParkingLocation {
    pub latitude: f64,
    pub longitude: f64,
    /// Milliseconds since the Unix epoch
    pub time: i64,
    /// Accuracy radius in meters
    pub error: f64,
}

impl ParkingLocation {
    pub fn new(latitude: f64, longitude: f64, time: i64, error: f64) -> Self {
        Self {
            latitude,
            longitude,
            time,
            error,
        }
    }
}

impl From<&Location> for ParkingLocation {
    fn from(location: &Location) -> Self {
        Self::new(
            location.latitude,
            location.longitude,
            location.timestamp,
            location.accuracy,
        )
    }
}

/// Why the vehicle was considered parked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InReason {
    /// Every recent fix stayed inside the parking radius
    Radius,
    /// No fix arrived within the silence window
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParkingStatus {
    InParking(InReason),
}
