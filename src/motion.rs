// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Motion Analysis
//!
//! Folds activity-recognition samples into a sliding time window, derives
//! per-state time shares, and debounces the "driving" signal that starts and
//! ends trips.
//!
//! [`MotionTracker`] only classifies. [`TripStateMachine`] turns its output,
//! together with parking detections, into the trip lifecycle:
//!
//! ```text
//! Idle -> CheckingMotion -> TripRecording -> CheckingMotion -> Idle
//! ```

use crate::config::MotionConfig;
use crate::models::{MotionEvent, MotionState, ParkingStatus};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tracing::debug;

/// Time-weighted breakdown of the current window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionStatistics {
    /// Span between the oldest and newest sample in the window
    pub window_duration_ms: i64,
    /// Time attributed to each state; a sample lasts until the next one
    pub time_by_state: BTreeMap<MotionState, i64>,
    pub vehicle_time_percentage: f64,
    pub average_confidence: f64,
    pub event_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionAnalysisResult {
    pub driving_detected: bool,
    pub vehicle_time_percentage: f64,
    pub average_confidence: f64,
    pub events_analyzed: usize,
    pub consecutive_driving_count: u32,
    pub consecutive_non_driving_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MotionTrackerEvent {
    /// Debounced trigger: enough consecutive driving folds
    InVehicle(MotionAnalysisResult),
    /// Informational snapshot emitted on every other fold
    CheckingMotion {
        statistics: MotionStatistics,
        analysis: MotionAnalysisResult,
    },
}

impl MotionTrackerEvent {
    pub fn analysis(&self) -> &MotionAnalysisResult {
        match self {
            MotionTrackerEvent::InVehicle(analysis) => analysis,
            MotionTrackerEvent::CheckingMotion { analysis, .. } => analysis,
        }
    }
}

pub struct MotionTracker {
    config: MotionConfig,
    window: VecDeque<MotionEvent>,
    consecutive_driving: u32,
    consecutive_non_driving: u32,
}

impl MotionTracker {
    pub fn new(config: MotionConfig) -> Self {
        Self {
            config,
            window: VecDeque::new(),
            consecutive_driving: 0,
            consecutive_non_driving: 0,
        }
    }

    /// Fold one sample into the window.
    ///
    /// Returns `None` when the sample is older than the newest one already
    /// folded; the window stays strictly time-ordered.
    pub fn fold(&mut self, event: MotionEvent) -> Option<MotionTrackerEvent> {
        if let Some(newest) = self.window.back() {
            if event.timestamp < newest.timestamp {
                debug!(
                    event.timestamp = event.timestamp,
                    newest.timestamp = newest.timestamp,
                    "Dropping out-of-order motion event"
                );
                return None;
            }
        }

        let cutoff = event.timestamp - self.config.analysis_window_ms;
        while self.window.front().is_some_and(|e| e.timestamp < cutoff) {
            self.window.pop_front();
        }
        self.window.push_back(event);

        let statistics = self.statistics();
        let driving = event.motion_state.is_vehicle()
            && event.confidence >= self.config.min_confidence
            && statistics.vehicle_time_percentage >= self.config.driving_percentage_threshold;

        if driving {
            self.consecutive_driving += 1;
            self.consecutive_non_driving = 0;
        } else {
            self.consecutive_non_driving += 1;
            self.consecutive_driving = 0;
        }

        let analysis = MotionAnalysisResult {
            driving_detected: driving,
            vehicle_time_percentage: statistics.vehicle_time_percentage,
            average_confidence: statistics.average_confidence,
            events_analyzed: statistics.event_count,
            consecutive_driving_count: self.consecutive_driving,
            consecutive_non_driving_count: self.consecutive_non_driving,
        };

        if driving && self.consecutive_driving == self.config.consecutive_driving_required {
            Some(MotionTrackerEvent::InVehicle(analysis))
        } else {
            Some(MotionTrackerEvent::CheckingMotion {
                statistics,
                analysis,
            })
        }
    }

    /// Recompute statistics over the current window
    pub fn statistics(&self) -> MotionStatistics {
        let mut time_by_state: BTreeMap<MotionState, i64> = BTreeMap::new();

        for (current, next) in self.window.iter().zip(self.window.iter().skip(1)) {
            *time_by_state.entry(current.motion_state).or_insert(0) +=
                next.timestamp - current.timestamp;
        }
        if let Some(last) = self.window.back() {
            time_by_state.entry(last.motion_state).or_insert(0);
        }

        let window_duration_ms = match (self.window.front(), self.window.back()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => 0,
        };

        let vehicle_time_percentage = if window_duration_ms > 0 {
            let vehicle = time_by_state.get(&MotionState::InVehicle).copied().unwrap_or(0);
            vehicle as f64 / window_duration_ms as f64 * 100.0
        } else if self.window.is_empty() {
            0.0
        } else {
            // All samples share one timestamp: fall back to sample counts
            let vehicle = self
                .window
                .iter()
                .filter(|e| e.motion_state.is_vehicle())
                .count();
            vehicle as f64 / self.window.len() as f64 * 100.0
        };

        let average_confidence = if self.window.is_empty() {
            0.0
        } else {
            self.window.iter().map(|e| e.confidence as f64).sum::<f64>() / self.window.len() as f64
        };

        MotionStatistics {
            window_duration_ms,
            time_by_state,
            vehicle_time_percentage,
            average_confidence,
            event_count: self.window.len(),
        }
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.consecutive_driving = 0;
        self.consecutive_non_driving = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripState {
    Idle,
    CheckingMotion,
    TripRecording,
}

/// Trip lifecycle driven by motion analysis and parking detection
pub struct TripStateMachine {
    state: TripState,
    non_driving_required: u32,
}

impl TripStateMachine {
    pub fn new(config: &MotionConfig) -> Self {
        Self {
            state: TripState::Idle,
            non_driving_required: config.consecutive_non_driving_required,
        }
    }

    pub fn state(&self) -> TripState {
        self.state
    }

    /// Apply a motion fold; returns the new state when it changed
    pub fn on_motion(&mut self, event: &MotionTrackerEvent) -> Option<TripState> {
        let next = match (self.state, event) {
            (_, MotionTrackerEvent::InVehicle(_)) => TripState::TripRecording,
            (TripState::Idle, MotionTrackerEvent::CheckingMotion { analysis, .. })
                if analysis.consecutive_driving_count > 0 =>
            {
                TripState::CheckingMotion
            }
            (TripState::CheckingMotion, MotionTrackerEvent::CheckingMotion { analysis, .. })
                if analysis.consecutive_non_driving_count >= self.non_driving_required =>
            {
                TripState::Idle
            }
            (TripState::TripRecording, MotionTrackerEvent::CheckingMotion { analysis, .. })
                if analysis.consecutive_non_driving_count > 0 =>
            {
                TripState::CheckingMotion
            }
            (state, _) => state,
        };
        self.transition(next)
    }

    /// A parking detection ends whatever trip or check is in progress
    pub fn on_parking(&mut self, _status: ParkingStatus) -> Option<TripState> {
        self.transition(TripState::Idle)
    }

    fn transition(&mut self, next: TripState) -> Option<TripState> {
        if next == self.state {
            return None;
        }
        debug!(from = ?self.state, to = ?next, "Trip state transition");
        self.state = next;
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InReason;

    const T0: i64 = 1_700_000_000_000;

    fn config(required: u32) -> MotionConfig {
        MotionConfig {
            analysis_window_ms: 60_000,
            driving_percentage_threshold: 60.0,
            min_confidence: 50,
            consecutive_driving_required: required,
            consecutive_non_driving_required: 2,
        }
    }

    fn vehicle(t: i64) -> MotionEvent {
        MotionEvent::new(MotionState::InVehicle, 90, T0 + t)
    }

    fn still(t: i64) -> MotionEvent {
        MotionEvent::new(MotionState::Stationary, 90, T0 + t)
    }

    #[test]
    fn test_in_vehicle_fires_after_n_consecutive_samples() {
        let mut tracker = MotionTracker::new(config(3));

        assert!(matches!(
            tracker.fold(vehicle(0)),
            Some(MotionTrackerEvent::CheckingMotion { .. })
        ));
        assert!(matches!(
            tracker.fold(vehicle(1_000)),
            Some(MotionTrackerEvent::CheckingMotion { .. })
        ));
        match tracker.fold(vehicle(2_000)) {
            Some(MotionTrackerEvent::InVehicle(analysis)) => {
                assert!(analysis.driving_detected);
                assert_eq!(analysis.consecutive_driving_count, 3);
                assert_eq!(analysis.events_analyzed, 3);
            }
            other => panic!("expected InVehicle, got {other:?}"),
        }
        // Fires once per run
        assert!(matches!(
            tracker.fold(vehicle(3_000)),
            Some(MotionTrackerEvent::CheckingMotion { .. })
        ));
    }

    #[test]
    fn test_interrupted_run_does_not_fire() {
        let mut tracker = MotionTracker::new(config(3));
        let events = [vehicle(0), vehicle(1_000), still(2_000)];
        for event in events {
            let out = tracker.fold(event).unwrap();
            assert!(!matches!(out, MotionTrackerEvent::InVehicle(_)));
        }
        let out = tracker.fold(still(3_000)).unwrap();
        assert_eq!(out.analysis().consecutive_non_driving_count, 2);
        assert_eq!(out.analysis().consecutive_driving_count, 0);
    }

    #[test]
    fn test_low_confidence_vehicle_is_not_driving() {
        let mut tracker = MotionTracker::new(config(1));
        let out = tracker
            .fold(MotionEvent::new(MotionState::InVehicle, 20, T0))
            .unwrap();
        assert!(!out.analysis().driving_detected);
    }

    #[test]
    fn test_window_evicts_old_events() {
        let mut tracker = MotionTracker::new(config(3));
        tracker.fold(still(0));
        tracker.fold(still(30_000));
        tracker.fold(still(60_000));
        assert_eq!(tracker.window_len(), 3);
        tracker.fold(still(60_001));
        assert_eq!(tracker.window_len(), 3);
        tracker.fold(still(200_000));
        assert_eq!(tracker.window_len(), 1);
    }

    #[test]
    fn test_out_of_order_event_is_dropped() {
        let mut tracker = MotionTracker::new(config(3));
        tracker.fold(still(10_000));
        assert!(tracker.fold(still(5_000)).is_none());
        assert_eq!(tracker.window_len(), 1);
    }

    #[test]
    fn test_time_weighted_statistics() {
        let mut tracker = MotionTracker::new(config(3));
        tracker.fold(still(0));
        tracker.fold(vehicle(10_000));
        tracker.fold(vehicle(40_000));
        let stats = tracker.statistics();
        assert_eq!(stats.window_duration_ms, 40_000);
        assert_eq!(stats.time_by_state[&MotionState::Stationary], 10_000);
        assert_eq!(stats.time_by_state[&MotionState::InVehicle], 30_000);
        assert!((stats.vehicle_time_percentage - 75.0).abs() < 1e-9);
        assert!((stats.average_confidence - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_vehicle_sample_in_mostly_still_window_is_not_driving() {
        let mut tracker = MotionTracker::new(config(1));
        tracker.fold(still(0));
        let out = tracker.fold(vehicle(50_000)).unwrap();
        assert_eq!(out.analysis().vehicle_time_percentage, 0.0);
        assert!(!out.analysis().driving_detected);
    }

    #[test]
    fn test_trip_lifecycle() {
        let cfg = config(2);
        let mut tracker = MotionTracker::new(cfg.clone());
        let mut trip = TripStateMachine::new(&cfg);
        assert_eq!(trip.state(), TripState::Idle);

        let e = tracker.fold(vehicle(0)).unwrap();
        assert_eq!(trip.on_motion(&e), Some(TripState::CheckingMotion));

        let e = tracker.fold(vehicle(1_000)).unwrap();
        assert_eq!(trip.on_motion(&e), Some(TripState::TripRecording));

        let e = tracker.fold(vehicle(2_000)).unwrap();
        assert_eq!(trip.on_motion(&e), None);

        let e = tracker.fold(still(3_000)).unwrap();
        assert_eq!(trip.on_motion(&e), Some(TripState::CheckingMotion));

        let e = tracker.fold(still(4_000)).unwrap();
        assert_eq!(trip.on_motion(&e), Some(TripState::Idle));
    }

    #[test]
    fn test_parking_ends_trip() {
        let cfg = config(1);
        let mut tracker = MotionTracker::new(cfg.clone());
        let mut trip = TripStateMachine::new(&cfg);

        let e = tracker.fold(vehicle(0)).unwrap();
        assert_eq!(trip.on_motion(&e), Some(TripState::TripRecording));
        assert_eq!(
            trip.on_parking(ParkingStatus::InParking(InReason::Radius)),
            Some(TripState::Idle)
        );
        assert_eq!(
            trip.on_parking(ParkingStatus::InParking(InReason::Timeout)),
            None
        );
    }
}
