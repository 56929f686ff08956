// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Configuration management for the tracking engine
//!
//! Two layers: [`TrackingConfig`] holds algorithm thresholds and schedules
//! (TOML file or defaults), [`EnvironmentConfig`] holds deployment values such
//! as the backend URL and database location (environment / `.env`).

pub mod environment;
pub mod tracking_config;

pub use environment::{ApiConfig, DatabaseConfig, EnvironmentConfig};
pub use tracking_config::{
    EventsConfig, GeofenceConfig, LocationFilterConfig, MotionConfig, ParkingConfig, PingConfig,
    SyncConfig, TrackingConfig,
};
