// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Location Processor
//!
//! Decides for every incoming fix whether it is worth persisting and sending,
//! and keeps the running statistics shown on the tracking status screen.
//!
//! The processor is a pure filter over in-memory state: it never touches the
//! queue or the network. Delivery results are reported back to it through
//! [`LocationProcessor::update_sent_locations`] and
//! [`LocationProcessor::update_send_error`].

use crate::config::LocationFilterConfig;
use crate::geometry;
use crate::models::{Coordinate, Location};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a fix was accepted or filtered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessReason {
    /// First usable fix of the session
    FirstFix,
    /// Far enough or late enough after the last sent fix
    Accepted,
    InvalidCoordinates,
    LowAccuracy,
    TooClose,
}

impl ProcessReason {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ProcessReason::FirstFix | ProcessReason::Accepted)
    }
}

impl fmt::Display for ProcessReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ProcessReason::FirstFix => "first fix",
            ProcessReason::Accepted => "accepted",
            ProcessReason::InvalidCoordinates => "invalid coordinates",
            ProcessReason::LowAccuracy => "low accuracy",
            ProcessReason::TooClose => "too close to last sent location",
        };
        f.write_str(text)
    }
}

/// Rolling counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub total_saved: u64,
    pub total_sent: u64,
    pub total_filtered: u64,
}

/// Point-in-time view of a fix with a reason or error attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSnapshot {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub timestamp: i64,
    pub detail: String,
}

impl LocationSnapshot {
    fn of(location: &Location, detail: impl Into<String>) -> Self {
        Self {
            latitude: location.latitude,
            longitude: location.longitude,
            accuracy: location.accuracy,
            timestamp: location.timestamp,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackingStats {
    pub totals: Totals,
    pub last_filtered: Option<LocationSnapshot>,
    pub last_sent: Option<LocationSnapshot>,
    pub last_send_error: Option<LocationSnapshot>,
}

/// Outcome of [`LocationProcessor::process`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationProcessResult {
    pub should_send: bool,
    pub reason: ProcessReason,
    pub totals: Totals,
    pub tracking_stats: TrackingStats,
    /// Reference coordinate for the displacement filter after this fix
    pub last_coordinate: Option<Coordinate>,
    /// Accuracy radius of the processed fix
    pub coordinate_error_m: f64,
}

pub struct LocationProcessor {
    config: LocationFilterConfig,
    stats: TrackingStats,
    last_sent: Option<Location>,
}

impl LocationProcessor {
    pub fn new(config: LocationFilterConfig) -> Self {
        Self {
            config,
            stats: TrackingStats::default(),
            last_sent: None,
        }
    }

    pub fn process(&mut self, location: &Location) -> LocationProcessResult {
        let reason = self.evaluate(location);
        self.record(location, reason)
    }

    /// Classify `location` without touching counters or the reference fix
    pub fn evaluate(&self, location: &Location) -> ProcessReason {
        self.decide(location)
    }

    /// Commit a decision from [`Self::evaluate`].
    ///
    /// An accepted fix should only be recorded once it is persisted, so a
    /// failed write leaves the displacement reference where it was.
    pub fn record(&mut self, location: &Location, reason: ProcessReason) -> LocationProcessResult {
        if reason.is_accepted() {
            self.stats.totals.total_saved += 1;
            self.last_sent = Some(*location);
        } else {
            self.stats.totals.total_filtered += 1;
            self.stats.last_filtered = Some(LocationSnapshot::of(location, reason.to_string()));
        }

        LocationProcessResult {
            should_send: reason.is_accepted(),
            reason,
            totals: self.stats.totals,
            tracking_stats: self.stats.clone(),
            last_coordinate: self.last_sent.as_ref().map(Location::coordinate),
            coordinate_error_m: location.accuracy,
        }
    }

    fn decide(&self, location: &Location) -> ProcessReason {
        if !location.has_valid_coordinates() {
            return ProcessReason::InvalidCoordinates;
        }

        if location.accuracy > self.config.max_accuracy_m {
            return ProcessReason::LowAccuracy;
        }

        let Some(last) = self.last_sent.as_ref() else {
            return ProcessReason::FirstFix;
        };

        let distance = geometry::distance_meters(last.coordinate(), location.coordinate());
        let elapsed = location.timestamp - last.timestamp;

        // Both conditions must hold: a slow crawl still reports once per interval,
        // a fast mover reports on every displacement step.
        if distance < self.config.min_distance_m && elapsed < self.config.min_interval_ms {
            return ProcessReason::TooClose;
        }

        ProcessReason::Accepted
    }

    /// Record locations the backend acknowledged
    pub fn update_sent_locations(&mut self, sent: &[Location]) {
        self.stats.totals.total_sent += sent.len() as u64;
        if let Some(last) = sent.last() {
            self.stats.last_sent = Some(LocationSnapshot::of(last, "sent"));
        }
    }

    /// Record a failed delivery attempt for `location`
    pub fn update_send_error(&mut self, location: &Location, error: &str) {
        self.stats.last_send_error = Some(LocationSnapshot::of(location, error));
    }

    pub fn stats(&self) -> &TrackingStats {
        &self.stats
    }
}
