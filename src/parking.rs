// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Parking Detection
//!
//! [`ParkingTracker`] keeps a time-bounded window of recent fixes and reports
//! the vehicle parked once every fix in a long-enough window stays inside the
//! parking radius around the window's spherical center.
//!
//! [`ParkingMonitor`] drives a tracker from a channel of fixes and adds the
//! silence timeout: when no fix arrives for `timeout_ms` the vehicle is
//! reported parked as well. Either detection clears the window.

use crate::config::ParkingConfig;
use crate::geometry;
use crate::models::{Coordinate, InReason, ParkingLocation, ParkingStatus};
use std::collections::VecDeque;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, info};

pub struct ParkingTracker {
    config: ParkingConfig,
    window: VecDeque<ParkingLocation>,
}

impl ParkingTracker {
    pub fn new(config: ParkingConfig) -> Self {
        Self {
            config,
            window: VecDeque::new(),
        }
    }

    /// Insert a fix and test the window; `true` means parked by radius.
    ///
    /// A positive result clears the window so the next detection starts fresh.
    pub fn add_coordinate(&mut self, location: ParkingLocation) -> bool {
        if let Some(newest) = self.window.back() {
            if location.time < newest.time {
                debug!(
                    fix.time = location.time,
                    newest.time = newest.time,
                    "Dropping out-of-order parking fix"
                );
                return false;
            }
        }

        let cutoff = location.time - self.config.tracking_time_ms;
        while self.window.front().is_some_and(|p| p.time < cutoff) {
            self.window.pop_front();
        }
        self.window.push_back(location);

        if self.is_parked() {
            self.window.clear();
            return true;
        }
        false
    }

    fn is_parked(&self) -> bool {
        if self.window.len() < 2 {
            return false;
        }

        let (Some(oldest), Some(newest)) = (self.window.front(), self.window.back()) else {
            return false;
        };
        if newest.time - oldest.time < self.config.trigger_time_ms {
            return false;
        }

        let points: Vec<ParkingLocation> = self.window.iter().copied().collect();
        let Some((center, center_error)) = geometry::center_with_error(&points) else {
            return false;
        };

        points.iter().all(|p| {
            geometry::is_in_radius(
                center,
                center_error,
                Coordinate::new(p.latitude, p.longitude),
                p.error,
                self.config.parking_radius_m,
            )
        })
    }

    /// Silence timeout elapsed: report parked and start over
    pub fn on_timeout(&mut self) -> ParkingStatus {
        self.window.clear();
        ParkingStatus::InParking(InReason::Timeout)
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn clear(&mut self) {
        self.window.clear();
    }
}

/// Task driver combining radius detection with the silence timeout
pub struct ParkingMonitor {
    tracker: ParkingTracker,
    silence: std::time::Duration,
}

impl ParkingMonitor {
    pub fn new(config: ParkingConfig) -> Self {
        let silence = config.timeout();
        Self {
            tracker: ParkingTracker::new(config),
            silence,
        }
    }

    /// Run until the fix channel closes or shutdown is signalled.
    ///
    /// The timeout is armed by the first fix after start or after any
    /// detection, so a silent vehicle is reported once, not once per period.
    pub async fn run(
        mut self,
        mut fixes: mpsc::Receiver<ParkingLocation>,
        statuses: mpsc::Sender<ParkingStatus>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let silence = self.silence;
        let mut armed = false;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let recv = async {
                if armed {
                    timeout(silence, fixes.recv()).await
                } else {
                    Ok(fixes.recv().await)
                }
            };

            let next = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                next = recv => next,
            };

            let status = match next {
                Ok(Some(fix)) => {
                    armed = true;
                    if self.tracker.add_coordinate(fix) {
                        armed = false;
                        Some(ParkingStatus::InParking(InReason::Radius))
                    } else {
                        None
                    }
                }
                Ok(None) => break,
                Err(_elapsed) => {
                    armed = false;
                    Some(self.tracker.on_timeout())
                }
            };

            if let Some(status) = status {
                if *shutdown.borrow() {
                    break;
                }
                info!(parking.status = ?status, "Parking detected");
                if statuses.send(status).await.is_err() {
                    break;
                }
            }
        }

        debug!("Parking monitor stopped");
    }
}
