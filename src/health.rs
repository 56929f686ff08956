// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Health checks for the tracking pipeline

use crate::config::SyncConfig;
use crate::queue::LocationQueue;
use crate::sync::{PingReport, SyncReport};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::error;

/// Overall health status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub service: ServiceInfo,
    pub checks: Vec<ComponentHealth>,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub response_time_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub uptime_seconds: u64,
}

/// Individual component health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
}

impl ComponentHealth {
    fn new(name: &str, status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
            metadata: None,
        }
    }
}

/// Last outcomes of the delivery loops, written by the tracking pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkStatus {
    pub last_sync_success_ms: Option<i64>,
    pub last_sync_failure_ms: Option<i64>,
    pub last_sync_error: Option<String>,
    pub last_ping_success_ms: Option<i64>,
    pub last_ping_failure_ms: Option<i64>,
    pub last_ping_error: Option<String>,
}

impl LinkStatus {
    pub fn record_sync(&mut self, report: &SyncReport, now_ms: i64) {
        match report {
            SyncReport::Delivered { .. } | SyncReport::NothingPending => {
                self.last_sync_success_ms = Some(now_ms);
            }
            SyncReport::Failed { error, .. } => {
                self.last_sync_failure_ms = Some(now_ms);
                self.last_sync_error = Some(error.clone());
            }
            SyncReport::Skipped { .. } => {}
        }
    }

    pub fn record_ping(&mut self, report: &PingReport, now_ms: i64) {
        match report {
            PingReport::Delivered { .. } => self.last_ping_success_ms = Some(now_ms),
            PingReport::Failed { error, .. } => {
                self.last_ping_failure_ms = Some(now_ms);
                self.last_ping_error = Some(error.clone());
            }
            PingReport::Skipped { .. } => {}
        }
    }
}

/// Failure more recent than the last success
fn failing(success: Option<i64>, failure: Option<i64>) -> bool {
    match (success, failure) {
        (_, None) => false,
        (None, Some(_)) => true,
        (Some(ok), Some(failed)) => failed > ok,
    }
}

/// Health checker for the tracking pipeline
pub struct HealthChecker {
    start_time: Instant,
    queue: LocationQueue,
    link: Arc<RwLock<LinkStatus>>,
    /// Backlog older than this marks the queue degraded
    stale_backlog_ms: i64,
}

impl HealthChecker {
    pub fn new(queue: LocationQueue, link: Arc<RwLock<LinkStatus>>, sync: &SyncConfig) -> Self {
        Self {
            start_time: Instant::now(),
            queue,
            link,
            stale_backlog_ms: (sync.interval_secs as i64).saturating_mul(10_000),
        }
    }

    /// Run every check and fold them into one status
    pub async fn check(&self) -> HealthResponse {
        let started = Instant::now();
        let now_ms = chrono::Utc::now().timestamp_millis();

        let mut checks = vec![self.check_queue(now_ms).await];
        let link = self.link.read().await.clone();
        checks.push(Self::check_sync(&link));
        checks.push(Self::check_ping(&link));

        let status = checks
            .iter()
            .map(|c| c.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);

        HealthResponse {
            status,
            service: ServiceInfo {
                name: "fleet-tracker".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                uptime_seconds: self.start_time.elapsed().as_secs(),
            },
            checks,
            timestamp: now_ms,
            response_time_ms: started.elapsed().as_millis() as u64,
        }
    }

    async fn check_queue(&self, now_ms: i64) -> ComponentHealth {
        let backlog = async {
            let pending = self.queue.pending_count().await?;
            let oldest = self.queue.oldest_pending_timestamp().await?;
            Ok::<_, crate::error::QueueError>((pending, oldest))
        };

        match backlog.await {
            Ok((pending, oldest)) => {
                let age_ms = oldest.map(|ts| now_ms - ts).unwrap_or(0);
                let (status, message) = if age_ms > self.stale_backlog_ms {
                    (
                        HealthStatus::Degraded,
                        format!("{pending} locations pending, oldest {}s old", age_ms / 1000),
                    )
                } else {
                    (HealthStatus::Healthy, format!("{pending} locations pending"))
                };
                let mut check = ComponentHealth::new("queue", status, message);
                check.metadata = Some(serde_json::json!({
                    "pending": pending,
                    "oldest_pending_age_ms": age_ms,
                }));
                check
            }
            Err(e) => {
                error!("Queue health check failed: {}", e);
                ComponentHealth::new(
                    "queue",
                    HealthStatus::Unhealthy,
                    format!("Queue check failed: {e}"),
                )
            }
        }
    }

    fn check_sync(link: &LinkStatus) -> ComponentHealth {
        if failing(link.last_sync_success_ms, link.last_sync_failure_ms) {
            ComponentHealth::new(
                "sync",
                HealthStatus::Degraded,
                link.last_sync_error.clone().unwrap_or_default(),
            )
        } else {
            ComponentHealth::new("sync", HealthStatus::Healthy, "Last sync cycle succeeded")
        }
    }

    fn check_ping(link: &LinkStatus) -> ComponentHealth {
        if failing(link.last_ping_success_ms, link.last_ping_failure_ms) {
            ComponentHealth::new(
                "ping",
                HealthStatus::Degraded,
                link.last_ping_error.clone().unwrap_or_default(),
            )
        } else {
            ComponentHealth::new("ping", HealthStatus::Healthy, "Last ping succeeded")
        }
    }
}
