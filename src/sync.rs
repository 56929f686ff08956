// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Delivery Services
//!
//! [`SyncService`] drains the [`LocationQueue`] to the backend: each cycle
//! posts the oldest unsent batch as one request and removes it only after a
//! 2xx response. A failed cycle leaves the queue untouched; the next cycle is
//! the retry. Cycles run on a fixed interval and additionally whenever a new
//! fix is persisted, never closer together than `min_cycle_gap_ms`.
//!
//! [`PingService`] sends the keep-alive: once right away, then every
//! `ping.interval_secs`.
//!
//! Both services skip a cycle, without failing, when no load is connected or
//! no API token is configured.

use crate::config::{PingConfig, SyncConfig};
use crate::error::TransportError;
use crate::loads::LoadRepository;
use crate::logging::AppLogger;
use crate::models::{Load, Location};
use crate::queue::LocationQueue;
use crate::transport::{CoordinateDto, TrackingApi};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch, Notify};
use tokio::time::{interval, sleep_until, MissedTickBehavior};
use tracing::{debug, warn};

/// Why a cycle did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoConnectedLoad,
    MissingCredentials,
}

/// Outcome of one sync cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncReport {
    /// Batch acknowledged and removed from the queue
    Delivered {
        load_id: String,
        locations: Vec<Location>,
    },
    NothingPending,
    Skipped { reason: SkipReason },
    /// Batch, if any, is still queued
    Failed {
        load_id: Option<String>,
        /// Oldest fix of the batch that was attempted
        location: Option<Location>,
        error: String,
    },
}

impl SyncReport {
    pub fn outcome(&self) -> &'static str {
        match self {
            SyncReport::Delivered { .. } => "delivered",
            SyncReport::NothingPending => "nothing_pending",
            SyncReport::Skipped { .. } => "skipped",
            SyncReport::Failed { .. } => "failed",
        }
    }

    fn failed(load_id: Option<&str>, location: Option<Location>, error: impl ToString) -> Self {
        SyncReport::Failed {
            load_id: load_id.map(str::to_string),
            location,
            error: error.to_string(),
        }
    }
}

/// Outcome of one keep-alive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PingReport {
    Delivered { load_id: String },
    Skipped { reason: SkipReason },
    Failed { load_id: Option<String>, error: String },
}

/// Connected load or the report explaining why the cycle stops here
async fn connected_load(loads: &dyn LoadRepository) -> Result<Load, (Option<SkipReason>, String)> {
    match loads.get_connected_load().await {
        Ok(Some(load)) => Ok(load),
        Ok(None) => Err((Some(SkipReason::NoConnectedLoad), "no connected load".to_string())),
        Err(e) => Err((None, format!("failed to read connected load: {e}"))),
    }
}

pub struct SyncService {
    queue: LocationQueue,
    api: Arc<dyn TrackingApi>,
    loads: Arc<dyn LoadRepository>,
    config: SyncConfig,
}

impl SyncService {
    pub fn new(
        queue: LocationQueue,
        api: Arc<dyn TrackingApi>,
        loads: Arc<dyn LoadRepository>,
        config: SyncConfig,
    ) -> Self {
        Self {
            queue,
            api,
            loads,
            config,
        }
    }

    /// One purge + upload pass
    pub async fn run_cycle(&self) -> SyncReport {
        let started = Instant::now();
        let report = self.cycle().await;

        let (load_id, count) = match &report {
            SyncReport::Delivered { load_id, locations } => (Some(load_id.as_str()), locations.len()),
            SyncReport::Failed { load_id, .. } => (load_id.as_deref(), 0),
            _ => (None, 0),
        };
        AppLogger::log_sync_cycle(
            load_id,
            report.outcome(),
            count,
            started.elapsed().as_millis() as u64,
        );
        if let SyncReport::Failed { error, .. } = &report {
            warn!(sync.error = %error, "Sync cycle failed; batch stays queued");
        }
        report
    }

    async fn cycle(&self) -> SyncReport {
        let cutoff = (chrono::Utc::now() - self.config.retention()).timestamp_millis();
        if let Err(e) = self.queue.purge_older_than(cutoff).await {
            return SyncReport::failed(None, None, e);
        }

        let load = match connected_load(self.loads.as_ref()).await {
            Ok(load) => load,
            Err((Some(reason), _)) => return SyncReport::Skipped { reason },
            Err((None, error)) => return SyncReport::failed(None, None, error),
        };

        let batch = match self.queue.unsent_batch(self.config.batch_size).await {
            Ok(batch) => batch,
            Err(e) => return SyncReport::failed(Some(&load.id), None, e),
        };
        let Some(oldest) = batch.first().map(|r| r.location) else {
            return SyncReport::NothingPending;
        };

        let driver = self.api.driver_unique_id();
        let coordinates: Vec<CoordinateDto> = batch
            .iter()
            .map(|r| CoordinateDto::from_location(&r.location, driver))
            .collect();

        match self.api.post_coordinates(&load.id, &coordinates).await {
            Ok(()) => {}
            Err(TransportError::MissingCredentials) => {
                return SyncReport::Skipped {
                    reason: SkipReason::MissingCredentials,
                }
            }
            Err(e) => return SyncReport::failed(Some(&load.id), Some(oldest), e),
        }

        let ids: Vec<i64> = batch.iter().map(|r| r.id).collect();
        if let Err(e) = self.queue.mark_sent_and_delete(&ids).await {
            // Delivered but still queued: the batch will be posted again
            return SyncReport::failed(Some(&load.id), Some(oldest), e);
        }

        SyncReport::Delivered {
            load_id: load.id,
            locations: batch.into_iter().map(|r| r.location).collect(),
        }
    }

    /// Run cycles until shutdown; reports go to `reports`
    ///
    /// The first cycle runs immediately to drain anything left from a
    /// previous session.
    pub async fn run(
        self,
        nudge: Arc<Notify>,
        reports: mpsc::Sender<SyncReport>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let min_gap = self.config.min_cycle_gap();
        let mut last_cycle: Option<tokio::time::Instant> = None;

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
                _ = nudge.notified() => {
                    if let Some(last) = last_cycle {
                        tokio::select! {
                            biased;
                            _ = shutdown.changed() => break,
                            _ = sleep_until(last + min_gap) => {}
                        }
                    }
                }
            }

            // A cycle dropped before mark-and-delete leaves its batch queued
            let report = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                report = self.run_cycle() => report,
            };
            last_cycle = Some(tokio::time::Instant::now());

            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                sent = reports.send(report) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }

        debug!("Sync service stopped");
    }
}

pub struct PingService {
    api: Arc<dyn TrackingApi>,
    loads: Arc<dyn LoadRepository>,
    config: PingConfig,
}

impl PingService {
    pub fn new(api: Arc<dyn TrackingApi>, loads: Arc<dyn LoadRepository>, config: PingConfig) -> Self {
        Self { api, loads, config }
    }

    pub async fn ping_once(&self) -> PingReport {
        let load = match connected_load(self.loads.as_ref()).await {
            Ok(load) => load,
            Err((Some(reason), detail)) => {
                AppLogger::log_ping_skipped(None, &detail);
                return PingReport::Skipped { reason };
            }
            Err((None, error)) => {
                AppLogger::log_ping(None, false, Some(&error));
                return PingReport::Failed {
                    load_id: None,
                    error,
                };
            }
        };

        let report = match self.api.ping(&load.id).await {
            Ok(()) => PingReport::Delivered {
                load_id: load.id.clone(),
            },
            Err(TransportError::MissingCredentials) => PingReport::Skipped {
                reason: SkipReason::MissingCredentials,
            },
            Err(e) => PingReport::Failed {
                load_id: Some(load.id.clone()),
                error: e.to_string(),
            },
        };

        match &report {
            PingReport::Skipped { .. } => {
                AppLogger::log_ping_skipped(Some(&load.id), "missing credentials")
            }
            PingReport::Failed { error, .. } => {
                AppLogger::log_ping(Some(&load.id), false, Some(error))
            }
            PingReport::Delivered { .. } => AppLogger::log_ping(Some(&load.id), true, None),
        }
        report
    }

    /// Ping immediately, then on every interval tick until shutdown
    pub async fn run(self, reports: mpsc::Sender<PingReport>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }

            let report = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                report = self.ping_once() => report,
            };
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                sent = reports.send(report) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }

        debug!("Ping service stopped");
    }
}
