// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Fleet Tracker
//!
//! On-device tracking engine for fleet logistics. It turns a noisy stream of
//! GPS fixes and activity-recognition samples into confirmed location
//! reports, trip lifecycle changes, stop arrivals and parking detections, and
//! keeps every accepted fix in a durable queue until the backend has
//! acknowledged it.
//!
//! ## Features
//!
//! - **Send filter**: accuracy ceiling plus a distance-or-time displacement rule
//! - **Trip detection**: time-weighted motion window with debounced driving trigger
//! - **Stop geofences**: one region per stop of the active load
//! - **Parking detection**: sliding-window radius test plus a silence timeout
//! - **Durable delivery**: SQLite queue, batched upload, keep-alive ping
//!
//! ## Architecture
//!
//! Data flows one way: sources -> processor / motion / geofence / parking ->
//! queue -> network. Platform capabilities sit behind traits
//! ([`sources::LocationSource`], [`sources::MotionSource`],
//! [`loads::LoadRepository`], [`geofence::GeofenceMonitor`],
//! [`transport::TrackingApi`]) and are injected into the
//! [`manager::TrackingManager`].
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use fleet_tracker::config::{EnvironmentConfig, TrackingConfig};
//! use fleet_tracker::geofence::SimulatedGeofenceMonitor;
//! use fleet_tracker::loads::StaticLoadRepository;
//! use fleet_tracker::manager::{TrackingDependencies, TrackingManager};
//! use fleet_tracker::models::Location;
//! use fleet_tracker::queue::LocationQueue;
//! use fleet_tracker::sources::{ChannelLocationSource, ChannelMotionSource};
//! use fleet_tracker::transport::HttpTrackingApi;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let env = EnvironmentConfig::from_env()?;
//!     let config = TrackingConfig::load(env.tracking_config_path.as_deref())?;
//!     let queue = LocationQueue::new(&env.database.url).await?;
//!
//!     let locations = Arc::new(ChannelLocationSource::new(64));
//!     let deps = TrackingDependencies {
//!         location_source: locations.clone(),
//!         motion_source: Arc::new(ChannelMotionSource::new(64)),
//!         loads: Arc::new(StaticLoadRepository::with_load("load-42", vec![])),
//!         geofence_monitor: Arc::new(SimulatedGeofenceMonitor::new()),
//!         api: Arc::new(HttpTrackingApi::new(&env.api)?),
//!     };
//!
//!     let mut manager = TrackingManager::new(config, queue, deps);
//!     let mut events = manager.start_tracking("load-42").await?;
//!
//!     locations.push(Location::new(52.2297, 21.0122, 8.0, 1_700_000_000_000)).await;
//!     println!("{:?}", events.recv().await?);
//!
//!     manager.stop_tracking().await?;
//!     Ok(())
//! }
//! ```

/// Configuration management
pub mod config;

/// Error types
pub mod error;

/// Spherical geometry helpers
pub mod geometry;

/// Stop geofencing
pub mod geofence;

/// Health checks for the delivery pipeline
pub mod health;

/// Active load and stops
pub mod loads;

/// Send filter and tracking statistics
pub mod location_processor;

/// Structured logging
pub mod logging;

/// Session supervisor
pub mod manager;

/// Core data models
pub mod models;

/// Motion analysis and trip state
pub mod motion;

/// Parking detection
pub mod parking;

/// Durable location queue
pub mod queue;

/// Location and motion sources
pub mod sources;

/// Queue upload and keep-alive services
pub mod sync;

/// Backend HTTP transport
pub mod transport;
