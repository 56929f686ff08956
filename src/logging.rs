// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Logging configuration with structured output

use anyhow::{anyhow, Result};
use serde_json::json;
use std::env;
use std::io;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const SERVICE_NAME: &str = "fleet-tracker";

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty, compact)
    pub format: LogFormat,
    /// Include source file and line numbers
    pub include_location: bool,
    /// Include thread information
    pub include_thread: bool,
    /// Service name for structured logging
    pub service_name: String,
    /// Service version
    pub service_version: String,
    /// Environment (development, field-test, production)
    pub environment: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line, for log shipping from devices
    Json,
    /// Human-readable output for development
    Pretty,
    /// Single-line output for constrained consoles
    Compact,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            include_location: false,
            include_thread: false,
            service_name: SERVICE_NAME.to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Create logging configuration from environment variables
    pub fn from_env() -> Self {
        let level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("compact") => LogFormat::Compact,
            _ => LogFormat::Pretty,
        };

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        let is_production = environment == "production";

        Self {
            level,
            format,
            include_location: is_production || env::var("LOG_INCLUDE_LOCATION").is_ok(),
            include_thread: is_production || env::var("LOG_INCLUDE_THREAD").is_ok(),
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| SERVICE_NAME.to_string()),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment,
        }
    }

    /// Initialize the global tracing subscriber
    pub fn init(&self) -> Result<()> {
        let env_filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let registry = tracing_subscriber::registry().with(env_filter);

        let installed = match self.format {
            LogFormat::Json => registry
                .with(
                    fmt::layer()
                        .with_file(self.include_location)
                        .with_line_number(self.include_location)
                        .with_thread_ids(self.include_thread)
                        .with_thread_names(self.include_thread)
                        .with_target(true)
                        .with_writer(io::stdout)
                        .json(),
                )
                .try_init(),
            LogFormat::Pretty => registry
                .with(
                    fmt::layer()
                        .with_file(self.include_location)
                        .with_line_number(self.include_location)
                        .with_thread_ids(self.include_thread)
                        .with_thread_names(self.include_thread)
                        .with_target(true)
                        .with_writer(io::stdout),
                )
                .try_init(),
            LogFormat::Compact => registry
                .with(
                    fmt::layer()
                        .compact()
                        .with_target(false)
                        .with_writer(io::stdout),
                )
                .try_init(),
        };
        installed.map_err(|e| anyhow!("Failed to install tracing subscriber: {e}"))?;

        self.log_startup_info();
        Ok(())
    }

    fn log_startup_info(&self) {
        info!(
            service.name = %self.service_name,
            service.version = %self.service_version,
            environment = %self.environment,
            log.level = %self.level,
            log.format = ?self.format,
            "Fleet tracker starting up"
        );

        let config_summary = json!({
            "service": {
                "name": self.service_name,
                "version": self.service_version,
                "environment": self.environment
            },
            "logging": {
                "level": self.level,
                "format": format!("{:?}", self.format),
                "features": {
                    "location": self.include_location,
                    "thread": self.include_thread
                }
            }
        });

        info!("Logging configured: {}", config_summary);
    }
}

/// Initialize logging from environment
pub fn init_from_env() -> Result<()> {
    LoggingConfig::from_env().init()
}

/// Structured log lines for tracking-domain events
pub struct AppLogger;

impl AppLogger {
    pub fn log_tracking_lifecycle(session_id: &str, load_id: &str, event: &str) {
        info!(
            session.id = %session_id,
            load.id = %load_id,
            tracking.event = %event,
            "Tracking lifecycle"
        );
    }

    pub fn log_sync_cycle(load_id: Option<&str>, outcome: &str, delivered: usize, duration_ms: u64) {
        info!(
            load.id = load_id.unwrap_or("none"),
            sync.outcome = %outcome,
            sync.delivered = delivered,
            sync.duration_ms = duration_ms,
            "Sync cycle"
        );
    }

    pub fn log_ping(load_id: Option<&str>, success: bool, error: Option<&str>) {
        let load_id = load_id.unwrap_or("none");
        if success {
            info!(load.id = %load_id, ping.success = true, "Keep-alive ping");
        } else {
            warn!(
                load.id = %load_id,
                ping.success = false,
                ping.error = error.unwrap_or(""),
                "Keep-alive ping"
            );
        }
    }

    pub fn log_ping_skipped(load_id: Option<&str>, reason: &str) {
        info!(
            load.id = %load_id.unwrap_or("none"),
            ping.skipped = %reason,
            "Keep-alive ping skipped"
        );
    }

    pub fn log_trip_transition(from: &str, to: &str, vehicle_time_percentage: f64) {
        info!(
            trip.from = %from,
            trip.to = %to,
            motion.vehicle_pct = vehicle_time_percentage,
            "Trip state changed"
        );
    }

    pub fn log_geofence_event(stop_id: &str, kind: &str, stops_reached: usize, stops_total: usize) {
        info!(
            stop.id = %stop_id,
            geofence.kind = %kind,
            geofence.reached = stops_reached,
            geofence.total = stops_total,
            "Geofence event"
        );
    }

    pub fn log_storage_operation(operation: &str, success: bool, detail: &str) {
        if success {
            info!(
                db.operation = %operation,
                db.success = true,
                db.detail = %detail,
                "Queue operation"
            );
        } else {
            warn!(
                db.operation = %operation,
                db.success = false,
                db.detail = %detail,
                "Queue operation"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_config_from_env() {
        env::set_var("LOG_FORMAT", "json");
        env::set_var("ENVIRONMENT", "production");
        env::set_var("SERVICE_NAME", "fleet-tracker-test");

        let config = LoggingConfig::from_env();

        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.environment, "production");
        assert_eq!(config.service_name, "fleet-tracker-test");
        assert!(config.include_location);

        env::remove_var("LOG_FORMAT");
        env::remove_var("ENVIRONMENT");
        env::remove_var("SERVICE_NAME");
    }

    #[test]
    fn test_default_logging_config() {
        let config = LoggingConfig::default();

        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.service_name, "fleet-tracker");
        assert!(!config.include_location);
    }
}
