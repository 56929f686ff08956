// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Access to the driver's active load and its stops

use crate::models::{Load, Stop};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[async_trait]
pub trait LoadRepository: Send + Sync {
    /// Stops of a load, in route order
    async fn get_stops_by_load_id(&self, load_id: &str) -> Result<Vec<Stop>>;

    /// The load the driver is connected to right now, if any
    async fn get_connected_load(&self) -> Result<Option<Load>>;
}

/// In-memory repository for replay and tests
#[derive(Default)]
pub struct StaticLoadRepository {
    connected: RwLock<Option<Load>>,
    stops: RwLock<HashMap<String, Vec<Stop>>>,
}

impl StaticLoadRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository already connected to `load_id` with the given stops
    pub fn with_load(load_id: &str, stops: Vec<Stop>) -> Self {
        let mut by_load = HashMap::new();
        by_load.insert(load_id.to_string(), stops);
        Self {
            connected: RwLock::new(Some(Load {
                id: load_id.to_string(),
            })),
            stops: RwLock::new(by_load),
        }
    }

    pub async fn set_stops(&self, load_id: &str, stops: Vec<Stop>) {
        self.stops.write().await.insert(load_id.to_string(), stops);
    }

    pub async fn connect(&self, load_id: &str) {
        *self.connected.write().await = Some(Load {
            id: load_id.to_string(),
        });
    }

    pub async fn disconnect(&self) {
        *self.connected.write().await = None;
    }
}

#[async_trait]
impl LoadRepository for StaticLoadRepository {
    async fn get_stops_by_load_id(&self, load_id: &str) -> Result<Vec<Stop>> {
        Ok(self
            .stops
            .read()
            .await
            .get(load_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_connected_load(&self) -> Result<Option<Load>> {
        Ok(self.connected.read().await.clone())
    }
}
