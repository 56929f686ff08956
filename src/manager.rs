// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Tracking Manager
//!
//! Owns a tracking session for one load. `start_tracking` spawns one task per
//! source and wires them with channels:
//!
//! ```text
//! LocationSource -> [location task] -> queue -> (notify) -> [sync task] -> TrackingApi
//!                        |                                       |
//!                        +-> [parking task] -+                   +-> reports -> [location task]
//!                                            v
//! MotionSource ---> [motion task] <-- parking statuses
//! GeofenceMonitor -> [geofence task]
//!                                          [ping task] -> TrackingApi
//! ```
//!
//! Every task publishes to one broadcast channel of [`TrackingEvent`]s.
//! `stop_tracking` flips the shutdown watch channel and waits for every task;
//! nothing is published after shutdown has been signalled.
//!
//! A failed queue write ends the session: the location task publishes
//! [`TrackingEvent::StorageFailed`], signals shutdown itself, and the next
//! `stop_tracking` returns [`TrackingError::Storage`].

use crate::config::TrackingConfig;
use crate::error::{QueueError, TrackingError};
use crate::geofence::{GeofenceMonitor, GeofenceTracker, RegionTransition};
use crate::health::LinkStatus;
use crate::loads::LoadRepository;
use crate::location_processor::{LocationProcessor, ProcessReason, Totals};
use crate::logging::AppLogger;
use crate::models::{GeofenceEvent, Location, MotionEvent, ParkingLocation, ParkingStatus};
use crate::motion::{MotionTracker, MotionTrackerEvent, TripState, TripStateMachine};
use crate::parking::ParkingMonitor;
use crate::queue::LocationQueue;
use crate::sources::{LocationSource, MotionSource};
use crate::sync::{PingReport, PingService, SyncReport, SyncService};
use crate::transport::TrackingApi;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Everything observable about a running session
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackingEvent {
    LocationProcessed {
        location: Location,
        should_send: bool,
        reason: ProcessReason,
        totals: Totals,
    },
    Motion {
        event: MotionTrackerEvent,
    },
    TripStateChanged {
        state: TripState,
    },
    Geofence {
        event: GeofenceEvent,
        all_stops_reached: bool,
    },
    Parking {
        status: ParkingStatus,
    },
    Sync {
        report: SyncReport,
    },
    Ping {
        report: PingReport,
    },
    /// The fix could not be persisted; the session is ending
    StorageFailed {
        location: Location,
        error: String,
    },
}

/// Platform collaborators injected into the manager
#[derive(Clone)]
pub struct TrackingDependencies {
    pub location_source: Arc<dyn LocationSource>,
    pub motion_source: Arc<dyn MotionSource>,
    pub loads: Arc<dyn LoadRepository>,
    pub geofence_monitor: Arc<dyn GeofenceMonitor>,
    pub api: Arc<dyn TrackingApi>,
}

struct Session {
    id: Uuid,
    load_id: String,
    events: broadcast::Sender<TrackingEvent>,
    shutdown: Arc<watch::Sender<bool>>,
    location_task: JoinHandle<Result<(), QueueError>>,
    tasks: Vec<JoinHandle<()>>,
}

pub struct TrackingManager {
    config: TrackingConfig,
    queue: LocationQueue,
    deps: TrackingDependencies,
    link_status: Arc<RwLock<LinkStatus>>,
    session: Option<Session>,
}

impl TrackingManager {
    pub fn new(config: TrackingConfig, queue: LocationQueue, deps: TrackingDependencies) -> Self {
        Self {
            config,
            queue,
            deps,
            link_status: Arc::new(RwLock::new(LinkStatus::default())),
            session: None,
        }
    }

    /// Shared delivery status, for [`crate::health::HealthChecker`]
    pub fn link_status(&self) -> Arc<RwLock<LinkStatus>> {
        self.link_status.clone()
    }

    pub fn queue(&self) -> &LocationQueue {
        &self.queue
    }

    pub fn is_tracking(&self) -> bool {
        self.session.is_some()
    }

    pub fn current_load_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.load_id.as_str())
    }

    /// Start tracking `load_id` and subscribe to its events.
    ///
    /// Starting the load already being tracked only adds a subscriber.
    /// Starting a different load ends the current session first.
    pub async fn start_tracking(
        &mut self,
        load_id: &str,
    ) -> Result<broadcast::Receiver<TrackingEvent>, TrackingError> {
        if let Some(session) = &self.session {
            if session.load_id == load_id && !*session.shutdown.borrow() {
                debug!(load.id = %load_id, "Tracking already active");
                return Ok(session.events.subscribe());
            }
            self.stop_tracking().await?;
        }

        self.config
            .validate()
            .map_err(|e| TrackingError::Configuration(e.to_string()))?;

        let pending = self.queue.pending_count().await?;

        let locations = self
            .deps
            .location_source
            .start()
            .await
            .map_err(|e| TrackingError::Source {
                source_name: "location",
                reason: e.to_string(),
            })?;

        let motions = match self.deps.motion_source.start().await {
            Ok(rx) => rx,
            Err(e) => {
                if let Err(stop_err) = self.deps.location_source.stop().await {
                    warn!(error = %stop_err, "Failed to stop location source");
                }
                return Err(TrackingError::Source {
                    source_name: "motion",
                    reason: e.to_string(),
                });
            }
        };

        let session_id = Uuid::new_v4();
        let buffer = self.config.events.stage_buffer;
        let (events, events_rx) = broadcast::channel(self.config.events.broadcast_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shutdown_tx = Arc::new(shutdown_tx);
        let (fix_tx, fix_rx) = mpsc::channel(buffer);
        let (parking_tx, parking_rx) = mpsc::channel(buffer);
        let (sync_tx, sync_rx) = mpsc::channel(buffer);
        let (ping_tx, ping_rx) = mpsc::channel(buffer);
        let nudge = Arc::new(Notify::new());

        let mut tasks = Vec::with_capacity(5);

        let location_task = LocationTask {
            processor: LocationProcessor::new(self.config.location.clone()),
            queue: self.queue.clone(),
            nudge: nudge.clone(),
            parking: fix_tx,
            link_status: self.link_status.clone(),
            events: events.clone(),
            end_session: shutdown_tx.clone(),
        };
        let location_task = tokio::spawn(location_task.run(
            locations,
            sync_rx,
            ping_rx,
            shutdown_rx.clone(),
        ));

        let motion_task = MotionTask {
            tracker: MotionTracker::new(self.config.motion.clone()),
            trip: TripStateMachine::new(&self.config.motion),
            events: events.clone(),
        };
        tasks.push(tokio::spawn(motion_task.run(
            motions,
            parking_rx,
            shutdown_rx.clone(),
        )));

        tasks.push(tokio::spawn(
            ParkingMonitor::new(self.config.parking.clone()).run(
                fix_rx,
                parking_tx,
                shutdown_rx.clone(),
            ),
        ));

        let mut geofences = GeofenceTracker::new(
            self.deps.geofence_monitor.clone(),
            self.deps.loads.clone(),
            self.config.geofence.clone(),
        );
        match self.deps.geofence_monitor.transitions().await {
            Ok(transitions) => {
                if let Err(e) = geofences.start(load_id).await {
                    warn!(load.id = %load_id, error = %e, "Stop geofences unavailable");
                }
                tasks.push(tokio::spawn(run_geofence_relay(
                    geofences,
                    transitions,
                    events.clone(),
                    shutdown_rx.clone(),
                )));
            }
            Err(e) => warn!(error = %e, "Geofence monitor unavailable; stops will not be tracked"),
        }

        let sync = SyncService::new(
            self.queue.clone(),
            self.deps.api.clone(),
            self.deps.loads.clone(),
            self.config.sync.clone(),
        );
        tasks.push(tokio::spawn(sync.run(nudge, sync_tx, shutdown_rx.clone())));

        let ping = PingService::new(
            self.deps.api.clone(),
            self.deps.loads.clone(),
            self.config.ping.clone(),
        );
        tasks.push(tokio::spawn(ping.run(ping_tx, shutdown_rx)));

        AppLogger::log_tracking_lifecycle(&session_id.to_string(), load_id, "started");
        info!(
            session.id = %session_id,
            load.id = %load_id,
            queue.pending = pending,
            "Tracking started"
        );

        self.session = Some(Session {
            id: session_id,
            load_id: load_id.to_string(),
            events,
            shutdown: shutdown_tx,
            location_task,
            tasks,
        });
        Ok(events_rx)
    }

    /// Stop the current session and wait for its tasks; a no-op when idle
    pub async fn stop_tracking(&mut self) -> Result<(), TrackingError> {
        let Some(session) = self.session.take() else {
            debug!("Tracking not active");
            return Ok(());
        };

        let _ = session.shutdown.send(true);

        if let Err(e) = self.deps.location_source.stop().await {
            warn!(error = %e, "Failed to stop location source");
        }
        if let Err(e) = self.deps.motion_source.stop().await {
            warn!(error = %e, "Failed to stop motion source");
        }

        let mut first_error = match session.location_task.await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(TrackingError::Storage(e)),
            Err(e) => {
                error!(error = %e, "Tracking task ended abnormally");
                Some(TrackingError::Task(e))
            }
        };
        for task in session.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Tracking task ended abnormally");
                first_error.get_or_insert(TrackingError::Task(e));
            }
        }

        AppLogger::log_tracking_lifecycle(&session.id.to_string(), &session.load_id, "stopped");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Filter, persist and fan out fixes; also the single writer of processor stats
struct LocationTask {
    processor: LocationProcessor,
    queue: LocationQueue,
    nudge: Arc<Notify>,
    parking: mpsc::Sender<ParkingLocation>,
    link_status: Arc<RwLock<LinkStatus>>,
    events: broadcast::Sender<TrackingEvent>,
    end_session: Arc<watch::Sender<bool>>,
}

impl LocationTask {
    async fn run(
        mut self,
        mut locations: mpsc::Receiver<Location>,
        mut sync_reports: mpsc::Receiver<SyncReport>,
        mut ping_reports: mpsc::Receiver<PingReport>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), QueueError> {
        let mut locations_open = true;

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                next = locations.recv(), if locations_open => match next {
                    Some(location) => self.on_location(location, &shutdown).await?,
                    None => {
                        debug!("Location stream closed");
                        locations_open = false;
                    }
                },
                Some(report) = sync_reports.recv() => self.on_sync(report, &shutdown).await,
                Some(report) = ping_reports.recv() => self.on_ping(report, &shutdown).await,
                else => break,
            }
        }

        debug!("Location task stopped");
        Ok(())
    }

    async fn on_location(
        &mut self,
        location: Location,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<(), QueueError> {
        let reason = self.processor.evaluate(&location);

        if reason.is_accepted() {
            match self.queue.insert(&location).await {
                Ok(id) => {
                    debug!(queue.id = id, "Location queued");
                    self.nudge.notify_one();
                }
                Err(e) => {
                    AppLogger::log_storage_operation("insert", false, &e.to_string());
                    error!(error = %e, "Location queue unavailable; ending session");
                    publish(
                        &self.events,
                        shutdown,
                        TrackingEvent::StorageFailed {
                            location,
                            error: e.to_string(),
                        },
                    );
                    let _ = self.end_session.send(true);
                    return Err(e);
                }
            }
        }
        let result = self.processor.record(&location, reason);

        if !matches!(
            result.reason,
            ProcessReason::InvalidCoordinates | ProcessReason::LowAccuracy
        ) && self.parking.send(ParkingLocation::from(&location)).await.is_err()
        {
            debug!("Parking monitor gone; fix not forwarded");
        }

        publish(
            &self.events,
            shutdown,
            TrackingEvent::LocationProcessed {
                location,
                should_send: result.should_send,
                reason: result.reason,
                totals: result.totals,
            },
        );
        Ok(())
    }

    async fn on_sync(&mut self, report: SyncReport, shutdown: &watch::Receiver<bool>) {
        if *shutdown.borrow() {
            return;
        }
        match &report {
            SyncReport::Delivered { locations, .. } => self.processor.update_sent_locations(locations),
            SyncReport::Failed {
                location: Some(location),
                error,
                ..
            } => self.processor.update_send_error(location, error),
            _ => {}
        }
        let now_ms = chrono::Utc::now().timestamp_millis();
        self.link_status.write().await.record_sync(&report, now_ms);
        publish(&self.events, shutdown, TrackingEvent::Sync { report });
    }

    async fn on_ping(&mut self, report: PingReport, shutdown: &watch::Receiver<bool>) {
        if *shutdown.borrow() {
            return;
        }
        let now_ms = chrono::Utc::now().timestamp_millis();
        self.link_status.write().await.record_ping(&report, now_ms);
        publish(&self.events, shutdown, TrackingEvent::Ping { report });
    }
}

/// Motion window and trip state; parking detections end trips
struct MotionTask {
    tracker: MotionTracker,
    trip: TripStateMachine,
    events: broadcast::Sender<TrackingEvent>,
}

impl MotionTask {
    async fn run(
        mut self,
        mut motions: mpsc::Receiver<MotionEvent>,
        mut parking: mpsc::Receiver<ParkingStatus>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut motions_open = true;

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                next = motions.recv(), if motions_open => match next {
                    Some(event) => self.on_motion(event, &shutdown),
                    None => {
                        debug!("Motion stream closed");
                        motions_open = false;
                    }
                },
                Some(status) = parking.recv() => self.on_parking(status, &shutdown),
                else => break,
            }
        }

        debug!("Motion task stopped");
    }

    fn on_motion(&mut self, event: MotionEvent, shutdown: &watch::Receiver<bool>) {
        let Some(folded) = self.tracker.fold(event) else {
            return;
        };
        let from = self.trip.state();
        let changed = self.trip.on_motion(&folded);
        let vehicle_pct = folded.analysis().vehicle_time_percentage;

        publish(&self.events, shutdown, TrackingEvent::Motion { event: folded });
        if let Some(state) = changed {
            AppLogger::log_trip_transition(&format!("{from:?}"), &format!("{state:?}"), vehicle_pct);
            publish(&self.events, shutdown, TrackingEvent::TripStateChanged { state });
        }
    }

    fn on_parking(&mut self, status: ParkingStatus, shutdown: &watch::Receiver<bool>) {
        let from = self.trip.state();
        let changed = self.trip.on_parking(status);
        publish(&self.events, shutdown, TrackingEvent::Parking { status });
        if let Some(state) = changed {
            self.tracker.reset();
            AppLogger::log_trip_transition(&format!("{from:?}"), &format!("{state:?}"), 0.0);
            publish(&self.events, shutdown, TrackingEvent::TripStateChanged { state });
        }
    }
}

/// Relay region transitions until shutdown, then unregister the regions
async fn run_geofence_relay(
    mut geofences: GeofenceTracker,
    mut transitions: mpsc::Receiver<RegionTransition>,
    events: broadcast::Sender<TrackingEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let transition = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            next = transitions.recv() => match next {
                Some(transition) => transition,
                None => {
                    // Monitor went away; keep regions until shutdown
                    let _ = shutdown.changed().await;
                    break;
                }
            },
        };

        if let Some(event) = geofences.handle_transition(&transition) {
            AppLogger::log_geofence_event(
                &event.stop_id,
                &format!("{:?}", event.kind),
                geofences.reached_stops().len(),
                geofences.registered_count(),
            );
            publish(
                &events,
                &shutdown,
                TrackingEvent::Geofence {
                    event,
                    all_stops_reached: geofences.all_stops_reached(),
                },
            );
        }
    }

    if let Err(e) = geofences.stop().await {
        warn!(error = %e, "Failed to remove stop geofences");
    }
    debug!("Geofence relay stopped");
}

/// Broadcast unless shutdown was signalled; no subscribers is not an error
fn publish(
    events: &broadcast::Sender<TrackingEvent>,
    shutdown: &watch::Receiver<bool>,
    event: TrackingEvent,
) {
    if *shutdown.borrow() {
        return;
    }
    let _ = events.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::geofence::SimulatedGeofenceMonitor;
    use crate::loads::StaticLoadRepository;
    use crate::sources::{ChannelLocationSource, ChannelMotionSource};
    use crate::transport::CoordinateDto;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::time::Duration;

    struct NullApi;

    #[async_trait]
    impl TrackingApi for NullApi {
        async fn post_coordinates(&self, _: &str, _: &[CoordinateDto]) -> Result<(), TransportError> {
            Ok(())
        }

        async fn ping(&self, _: &str) -> Result<(), TransportError> {
            Ok(())
        }

        fn driver_unique_id(&self) -> &str {
            "driver-test"
        }
    }

    /// Accepts every request and never answers
    struct HangingApi;

    #[async_trait]
    impl TrackingApi for HangingApi {
        async fn post_coordinates(&self, _: &str, _: &[CoordinateDto]) -> Result<(), TransportError> {
            std::future::pending().await
        }

        async fn ping(&self, _: &str) -> Result<(), TransportError> {
            std::future::pending().await
        }

        fn driver_unique_id(&self) -> &str {
            "driver-test"
        }
    }

    async fn manager() -> Result<(TrackingManager, Arc<ChannelLocationSource>)> {
        manager_with_api(Arc::new(NullApi)).await
    }

    async fn manager_with_api(
        api: Arc<dyn TrackingApi>,
    ) -> Result<(TrackingManager, Arc<ChannelLocationSource>)> {
        let locations = Arc::new(ChannelLocationSource::new(16));
        let deps = TrackingDependencies {
            location_source: locations.clone(),
            motion_source: Arc::new(ChannelMotionSource::new(16)),
            loads: Arc::new(StaticLoadRepository::with_load("load-1", vec![])),
            geofence_monitor: Arc::new(SimulatedGeofenceMonitor::new()),
            api,
        };
        let queue = LocationQueue::new("sqlite::memory:").await?;
        Ok((TrackingManager::new(TrackingConfig::default(), queue, deps), locations))
    }

    struct TaskHarness {
        task: LocationTask,
        events: broadcast::Receiver<TrackingEvent>,
        shutdown_tx: Arc<watch::Sender<bool>>,
        shutdown: watch::Receiver<bool>,
        _parking: mpsc::Receiver<ParkingLocation>,
    }

    async fn location_task() -> Result<TaskHarness> {
        let (events, events_rx) = broadcast::channel(16);
        let (parking_tx, parking_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shutdown_tx = Arc::new(shutdown_tx);
        let task = LocationTask {
            processor: LocationProcessor::new(TrackingConfig::default().location),
            queue: LocationQueue::new("sqlite::memory:").await?,
            nudge: Arc::new(Notify::new()),
            parking: parking_tx,
            link_status: Arc::new(RwLock::new(LinkStatus::default())),
            events,
            end_session: shutdown_tx.clone(),
        };
        Ok(TaskHarness {
            task,
            events: events_rx,
            shutdown_tx,
            shutdown: shutdown_rx,
            _parking: parking_rx,
        })
    }

    fn fix() -> Location {
        Location::new(52.0, 21.0, 5.0, chrono::Utc::now().timestamp_millis())
    }

    #[tokio::test]
    async fn test_start_and_stop_are_idempotent() -> Result<()> {
        let (mut manager, locations) = manager().await?;

        manager.stop_tracking().await?;
        let _first = manager.start_tracking("load-1").await?;
        let _second = manager.start_tracking("load-1").await?;
        assert!(manager.is_tracking());
        assert!(locations.is_started());

        manager.stop_tracking().await?;
        manager.stop_tracking().await?;
        assert!(!manager.is_tracking());
        assert!(!locations.is_started());
        Ok(())
    }

    #[tokio::test]
    async fn test_switching_load_restarts_session() -> Result<()> {
        let (mut manager, _) = manager().await?;
        manager.start_tracking("load-1").await?;
        manager.start_tracking("load-2").await?;
        assert_eq!(manager.current_load_id(), Some("load-2"));
        manager.stop_tracking().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_stop_cancels_in_flight_network_calls() -> Result<()> {
        let (mut manager, _) = manager_with_api(Arc::new(HangingApi)).await?;
        manager.start_tracking("load-1").await?;
        tokio::time::sleep(Duration::from_millis(200)).await;

        tokio::time::timeout(Duration::from_secs(3), manager.stop_tracking()).await??;
        assert!(!manager.is_tracking());
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_insert_ends_session() -> Result<()> {
        let (mut manager, locations) = manager().await?;
        let mut events = manager.start_tracking("load-1").await?;
        manager.queue().close().await;

        assert!(locations.push(fix()).await);
        let failed = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match events.recv().await {
                    Ok(TrackingEvent::StorageFailed { .. }) => return true,
                    Ok(TrackingEvent::LocationProcessed { .. }) => return false,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return false,
                }
            }
        })
        .await?;
        assert!(failed);

        // The ingestion task is gone, so fixes are refused from now on
        tokio::time::timeout(Duration::from_secs(5), async {
            while locations.push(fix()).await {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await?;

        let result = manager.stop_tracking().await;
        assert!(matches!(result, Err(TrackingError::Storage(_))));
        assert!(!manager.is_tracking());
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_insert_is_not_counted_as_saved() -> Result<()> {
        let mut harness = location_task().await?;
        harness.task.queue.close().await;

        let location = fix();
        let result = harness.task.on_location(location, &harness.shutdown).await;

        assert!(matches!(result, Err(QueueError::Database(_))));
        assert_eq!(harness.task.processor.stats().totals, Totals::default());
        // The reference fix did not move: the same fix is still the first one
        assert_eq!(harness.task.processor.evaluate(&location), ProcessReason::FirstFix);
        assert!(*harness.shutdown.borrow());
        assert!(matches!(
            harness.events.try_recv(),
            Ok(TrackingEvent::StorageFailed { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_reports_after_shutdown_are_ignored() -> Result<()> {
        let mut harness = location_task().await?;
        harness.shutdown_tx.send(true)?;

        let location = fix();
        harness
            .task
            .on_sync(
                SyncReport::Delivered {
                    load_id: "load-1".to_string(),
                    locations: vec![location],
                },
                &harness.shutdown,
            )
            .await;
        harness
            .task
            .on_ping(
                PingReport::Failed {
                    load_id: Some("load-1".to_string()),
                    error: "late".to_string(),
                },
                &harness.shutdown,
            )
            .await;

        assert_eq!(harness.task.processor.stats().totals.total_sent, 0);
        let status = harness.task.link_status.read().await;
        assert!(status.last_sync_success_ms.is_none());
        assert!(status.last_ping_failure_ms.is_none());
        assert!(harness.events.try_recv().is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_reports_update_link_status_while_running() -> Result<()> {
        let mut harness = location_task().await?;

        harness
            .task
            .on_sync(
                SyncReport::Delivered {
                    load_id: "load-1".to_string(),
                    locations: vec![fix()],
                },
                &harness.shutdown,
            )
            .await;

        assert_eq!(harness.task.processor.stats().totals.total_sent, 1);
        assert!(harness.task.link_status.read().await.last_sync_success_ms.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_closed_queue_fails_start() -> Result<()> {
        let (mut manager, locations) = manager().await?;
        manager.queue().close().await;

        let result = manager.start_tracking("load-1").await;
        assert!(matches!(result, Err(TrackingError::Storage(_))));
        assert!(!locations.is_started());
        Ok(())
    }
}
