// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Stop Geofencing
//!
//! [`GeofenceTracker`] registers one circular region per stop of the active
//! load with the platform [`GeofenceMonitor`] and turns region transitions
//! into [`GeofenceEvent`]s. Entering a stop's region marks the stop reached.
//!
//! [`SimulatedGeofenceMonitor`] evaluates regions against fixes fed to it and
//! stands in for the platform monitor on desktop replays and in tests.

use crate::config::GeofenceConfig;
use crate::error::GeofenceError;
use crate::geometry;
use crate::loads::LoadRepository;
use crate::models::{Coordinate, GeofenceEvent, GeofenceEventKind, Location, Stop};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// A circular region registered with the platform
#[derive(Debug, Clone, PartialEq)]
pub struct GeofenceRegion {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius: f64,
    pub notify_on_entry: bool,
    pub notify_on_exit: bool,
}

impl GeofenceRegion {
    pub fn for_stop(stop: &Stop, config: &GeofenceConfig) -> Self {
        let radius = if stop.radius > 0.0 && stop.radius.is_finite() {
            stop.radius
        } else {
            config.default_radius_m
        };
        Self {
            id: stop.id.clone(),
            latitude: stop.latitude,
            longitude: stop.longitude,
            radius,
            notify_on_entry: true,
            notify_on_exit: config.notify_on_exit,
        }
    }

    pub fn validate(&self) -> Result<(), GeofenceError> {
        let invalid = |reason: &str| GeofenceError::InvalidRegion {
            id: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.id.is_empty() {
            return Err(invalid("empty id"));
        }
        if !(-90.0..=90.0).contains(&self.latitude) || !(-180.0..=180.0).contains(&self.longitude)
        {
            return Err(invalid("coordinates out of range"));
        }
        if !(self.radius > 0.0 && self.radius.is_finite()) {
            return Err(invalid("radius must be positive"));
        }
        Ok(())
    }

    fn contains(&self, location: &Location) -> bool {
        geometry::distance_meters(
            Coordinate::new(self.latitude, self.longitude),
            location.coordinate(),
        ) <= self.radius
    }
}

/// A raw callback from the platform monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionTransition {
    pub region_id: String,
    pub kind: GeofenceEventKind,
}

/// Platform geofencing capability
#[async_trait]
pub trait GeofenceMonitor: Send + Sync {
    async fn add_region(&self, region: GeofenceRegion) -> Result<(), GeofenceError>;

    async fn remove_regions(&self, region_ids: &[String]) -> Result<(), GeofenceError>;

    /// Open the transition stream; a new call replaces the previous stream
    async fn transitions(&self) -> Result<mpsc::Receiver<RegionTransition>, GeofenceError>;
}

pub struct GeofenceTracker {
    monitor: Arc<dyn GeofenceMonitor>,
    loads: Arc<dyn LoadRepository>,
    config: GeofenceConfig,
    load_id: Option<String>,
    stops: HashMap<String, Stop>,
    reached: BTreeSet<String>,
}

impl GeofenceTracker {
    pub fn new(
        monitor: Arc<dyn GeofenceMonitor>,
        loads: Arc<dyn LoadRepository>,
        config: GeofenceConfig,
    ) -> Self {
        Self {
            monitor,
            loads,
            config,
            load_id: None,
            stops: HashMap::new(),
            reached: BTreeSet::new(),
        }
    }

    /// Register a region for every stop of `load_id`; returns how many were registered.
    ///
    /// Stops the monitor refuses are logged and skipped. Calling again for the
    /// load already being tracked changes nothing.
    pub async fn start(&mut self, load_id: &str) -> Result<usize, GeofenceError> {
        if self.load_id.as_deref() == Some(load_id) {
            debug!(load.id = %load_id, "Geofences already registered");
            return Ok(self.stops.len());
        }
        self.stop().await?;

        let stops = self
            .loads
            .get_stops_by_load_id(load_id)
            .await
            .map_err(|e| GeofenceError::Stops {
                load_id: load_id.to_string(),
                reason: e.to_string(),
            })?;

        for stop in stops {
            let region = GeofenceRegion::for_stop(&stop, &self.config);
            let registered = match region.validate() {
                Ok(()) => self.monitor.add_region(region).await,
                Err(e) => Err(e),
            };
            match registered {
                Ok(()) => {
                    self.stops.insert(stop.id.clone(), stop);
                }
                Err(e) => warn!(stop.id = %stop.id, error = %e, "Skipping stop geofence"),
            }
        }

        self.load_id = Some(load_id.to_string());
        info!(
            load.id = %load_id,
            geofence.regions = self.stops.len(),
            "Stop geofences registered"
        );
        Ok(self.stops.len())
    }

    /// Unregister every region; a no-op when nothing is registered.
    ///
    /// On failure the regions stay known to the tracker so `stop` can be
    /// retried.
    pub async fn stop(&mut self) -> Result<(), GeofenceError> {
        if !self.stops.is_empty() {
            let ids: Vec<String> = self.stops.keys().cloned().collect();
            self.monitor.remove_regions(&ids).await?;
            debug!(geofence.removed = ids.len(), "Stop geofences removed");
        }

        self.stops.clear();
        self.load_id = None;
        self.reached.clear();
        Ok(())
    }

    /// Translate a platform callback; transitions for unknown regions are ignored
    pub fn handle_transition(&mut self, transition: &RegionTransition) -> Option<GeofenceEvent> {
        let stop = self.stops.get(&transition.region_id)?;

        match transition.kind {
            GeofenceEventKind::Entered => {
                self.reached.insert(stop.id.clone());
            }
            GeofenceEventKind::Exited if !self.config.notify_on_exit => return None,
            GeofenceEventKind::Exited => {}
        }

        Some(GeofenceEvent {
            stop_id: stop.id.clone(),
            stop_type: stop.stop_type,
            kind: transition.kind,
        })
    }

    pub fn load_id(&self) -> Option<&str> {
        self.load_id.as_deref()
    }

    pub fn registered_count(&self) -> usize {
        self.stops.len()
    }

    /// Stop ids reached so far, sorted
    pub fn reached_stops(&self) -> Vec<String> {
        self.reached.iter().cloned().collect()
    }

    pub fn all_stops_reached(&self) -> bool {
        !self.stops.is_empty() && self.reached.len() == self.stops.len()
    }
}

#[derive(Default)]
struct SimulatedState {
    regions: HashMap<String, (GeofenceRegion, bool)>,
    rejected: HashSet<String>,
    refuse_removal: bool,
    sink: Option<mpsc::Sender<RegionTransition>>,
}

/// Geofence monitor driven by fixes pushed to [`SimulatedGeofenceMonitor::feed`]
#[derive(Default)]
pub struct SimulatedGeofenceMonitor {
    state: Mutex<SimulatedState>,
}

impl SimulatedGeofenceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the monitor refuse registration of `region_id`
    pub async fn reject_region(&self, region_id: &str) {
        self.state.lock().await.rejected.insert(region_id.to_string());
    }

    /// Make `remove_regions` fail until called again with `false`
    pub async fn refuse_removal(&self, refuse: bool) {
        self.state.lock().await.refuse_removal = refuse;
    }

    pub async fn region_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.lock().await.regions.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Evaluate every region against a fix and emit the resulting transitions
    pub async fn feed(&self, location: &Location) {
        let (sink, transitions) = {
            let mut state = self.state.lock().await;
            let mut transitions = Vec::new();
            for (region, inside) in state.regions.values_mut() {
                let now_inside = region.contains(location);
                if now_inside == *inside {
                    continue;
                }
                *inside = now_inside;
                let kind = if now_inside {
                    GeofenceEventKind::Entered
                } else {
                    GeofenceEventKind::Exited
                };
                let wanted = match kind {
                    GeofenceEventKind::Entered => region.notify_on_entry,
                    GeofenceEventKind::Exited => region.notify_on_exit,
                };
                if wanted {
                    transitions.push(RegionTransition {
                        region_id: region.id.clone(),
                        kind,
                    });
                }
            }
            (state.sink.clone(), transitions)
        };

        let Some(sink) = sink else {
            return;
        };
        for transition in transitions {
            if sink.send(transition).await.is_err() {
                break;
            }
        }
    }
}

#[async_trait]
impl GeofenceMonitor for SimulatedGeofenceMonitor {
    async fn add_region(&self, region: GeofenceRegion) -> Result<(), GeofenceError> {
        let mut state = self.state.lock().await;
        if state.rejected.contains(&region.id) {
            return Err(GeofenceError::Registration {
                id: region.id,
                reason: "rejected by monitor".to_string(),
            });
        }
        state.regions.insert(region.id.clone(), (region, false));
        Ok(())
    }

    async fn remove_regions(&self, region_ids: &[String]) -> Result<(), GeofenceError> {
        let mut state = self.state.lock().await;
        if state.refuse_removal {
            return Err(GeofenceError::Registration {
                id: region_ids.join(","),
                reason: "removal refused by monitor".to_string(),
            });
        }
        for id in region_ids {
            state.regions.remove(id);
        }
        Ok(())
    }

    async fn transitions(&self) -> Result<mpsc::Receiver<RegionTransition>, GeofenceError> {
        let (tx, rx) = mpsc::channel(32);
        self.state.lock().await.sink = Some(tx);
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loads::StaticLoadRepository;
    use crate::models::StopType;

    fn stop(id: &str, latitude: f64, radius: f64) -> Stop {
        Stop {
            id: id.to_string(),
            latitude,
            longitude: 21.0,
            radius,
            stop_type: StopType::Delivery,
        }
    }

    fn tracker_with(
        stops: Vec<Stop>,
        config: GeofenceConfig,
    ) -> (GeofenceTracker, Arc<SimulatedGeofenceMonitor>) {
        let monitor = Arc::new(SimulatedGeofenceMonitor::new());
        let loads = Arc::new(StaticLoadRepository::with_load("load-1", stops));
        (GeofenceTracker::new(monitor.clone(), loads, config), monitor)
    }

    #[test]
    fn test_region_radius_falls_back_to_default() {
        let config = GeofenceConfig::default();
        let region = GeofenceRegion::for_stop(&stop("a", 52.0, 0.0), &config);
        assert_eq!(region.radius, config.default_radius_m);
        assert!(region.notify_on_entry);

        let region = GeofenceRegion::for_stop(&stop("b", 52.0, 80.0), &config);
        assert_eq!(region.radius, 80.0);
    }

    #[tokio::test]
    async fn test_start_is_idempotent() -> anyhow::Result<()> {
        let (mut tracker, monitor) = tracker_with(
            vec![stop("a", 52.0, 100.0), stop("b", 52.1, 100.0)],
            GeofenceConfig::default(),
        );

        assert_eq!(tracker.start("load-1").await?, 2);
        assert_eq!(tracker.start("load-1").await?, 2);
        assert_eq!(monitor.region_ids().await, vec!["a", "b"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() -> anyhow::Result<()> {
        let (mut tracker, monitor) =
            tracker_with(vec![stop("a", 52.0, 100.0)], GeofenceConfig::default());

        tracker.stop().await?;
        tracker.start("load-1").await?;
        tracker.stop().await?;
        tracker.stop().await?;
        assert!(monitor.region_ids().await.is_empty());
        assert_eq!(tracker.registered_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_removal_keeps_regions_for_retry() -> anyhow::Result<()> {
        let (mut tracker, monitor) = tracker_with(
            vec![stop("a", 52.0, 100.0), stop("b", 52.1, 100.0)],
            GeofenceConfig::default(),
        );
        tracker.start("load-1").await?;

        monitor.refuse_removal(true).await;
        assert!(tracker.stop().await.is_err());
        assert_eq!(tracker.registered_count(), 2);
        assert_eq!(tracker.load_id(), Some("load-1"));

        monitor.refuse_removal(false).await;
        tracker.stop().await?;
        assert_eq!(tracker.registered_count(), 0);
        assert!(monitor.region_ids().await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_registration_skips_only_that_stop() -> anyhow::Result<()> {
        let (mut tracker, monitor) = tracker_with(
            vec![
                stop("a", 52.0, 100.0),
                stop("b", 52.1, 100.0),
                stop("c", 95.0, 100.0),
            ],
            GeofenceConfig::default(),
        );
        monitor.reject_region("b").await;

        assert_eq!(tracker.start("load-1").await?, 1);
        assert_eq!(monitor.region_ids().await, vec!["a"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_entering_marks_stop_reached() -> anyhow::Result<()> {
        let (mut tracker, monitor) = tracker_with(
            vec![stop("a", 52.0, 100.0), stop("b", 52.1, 100.0)],
            GeofenceConfig::default(),
        );
        let mut transitions = monitor.transitions().await?;
        tracker.start("load-1").await?;

        monitor.feed(&Location::new(52.0, 21.0, 5.0, 1)).await;
        let transition = transitions.recv().await.unwrap();
        let event = tracker.handle_transition(&transition).unwrap();
        assert_eq!(event.stop_id, "a");
        assert_eq!(event.kind, GeofenceEventKind::Entered);
        assert_eq!(tracker.reached_stops(), vec!["a"]);
        assert!(!tracker.all_stops_reached());

        // Leaving "a" is not reported with exit notifications off
        monitor.feed(&Location::new(52.1, 21.0, 5.0, 2)).await;
        let transition = transitions.recv().await.unwrap();
        assert_eq!(transition.region_id, "b");
        tracker.handle_transition(&transition);
        assert!(tracker.all_stops_reached());
        assert!(transitions.try_recv().is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_exit_reported_when_enabled() -> anyhow::Result<()> {
        let config = GeofenceConfig {
            notify_on_exit: true,
            ..GeofenceConfig::default()
        };
        let (mut tracker, monitor) = tracker_with(vec![stop("a", 52.0, 100.0)], config);
        let mut transitions = monitor.transitions().await?;
        tracker.start("load-1").await?;

        monitor.feed(&Location::new(52.0, 21.0, 5.0, 1)).await;
        monitor.feed(&Location::new(52.5, 21.0, 5.0, 2)).await;

        let entered = transitions.recv().await.unwrap();
        let exited = transitions.recv().await.unwrap();
        assert_eq!(exited.kind, GeofenceEventKind::Exited);
        assert!(tracker.handle_transition(&entered).is_some());
        assert_eq!(
            tracker.handle_transition(&exited).map(|e| e.kind),
            Some(GeofenceEventKind::Exited)
        );
        Ok(())
    }

    #[test]
    fn test_unknown_region_is_ignored() {
        let (mut tracker, _) = tracker_with(vec![], GeofenceConfig::default());
        assert!(tracker
            .handle_transition(&RegionTransition {
                region_id: "ghost".to_string(),
                kind: GeofenceEventKind::Entered,
            })
            .is_none());
    }
}
