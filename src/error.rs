// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Error types
//!
//! Only lifecycle failures leave the engine as errors. Everything that happens
//! inside a running pipeline (a failed POST, a noisy fix, a stop that could
//! not be registered) is logged, counted and retried instead.

use thiserror::Error;

/// Failures of `start_tracking` / `stop_tracking`
#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("location queue unavailable: {0}")]
    Storage(#[from] QueueError),

    #[error("failed to open {source_name} source: {reason}")]
    Source {
        source_name: &'static str,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("tracking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Local queue failures
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to prepare database directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt location record {id}: {reason}")]
    CorruptRecord { id: i64, reason: String },
}

/// Backend transport failures
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned HTTP {status}")]
    Status { status: u16 },

    #[error("backend rejected credentials (HTTP {status})")]
    Unauthorized { status: u16 },

    #[error("no API token configured")]
    MissingCredentials,

    #[error("invalid API URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Geofence registration failures
#[derive(Debug, Error)]
pub enum GeofenceError {
    #[error("invalid region {id}: {reason}")]
    InvalidRegion { id: String, reason: String },

    #[error("geofence monitor rejected region {id}: {reason}")]
    Registration { id: String, reason: String },

    #[error("failed to load stops for load {load_id}: {reason}")]
    Stops { load_id: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_messages_carry_status() {
        assert_eq!(
            TransportError::Status { status: 503 }.to_string(),
            "backend returned HTTP 503"
        );
        assert!(TransportError::Unauthorized { status: 403 }
            .to_string()
            .contains("403"));
    }

    #[test]
    fn test_storage_error_wraps_queue_error() {
        let err: TrackingError = QueueError::CorruptRecord {
            id: 7,
            reason: "battery level 300".to_string(),
        }
        .into();
        assert!(err.to_string().contains("location queue unavailable"));
        assert!(err.to_string().contains("record 7"));
    }
}
