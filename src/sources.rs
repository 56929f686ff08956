// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Sensor Sources
//!
//! Platform location and activity-recognition providers are consumed as
//! channels. `start` opens a fresh stream; `stop` ends it, which closes the
//! receiver handed out by the matching `start`.

use crate::models::{Location, MotionEvent};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

#[async_trait]
pub trait LocationSource: Send + Sync {
    async fn start(&self) -> Result<mpsc::Receiver<Location>>;
    async fn stop(&self) -> Result<()>;
}

#[async_trait]
pub trait MotionSource: Send + Sync {
    async fn start(&self) -> Result<mpsc::Receiver<MotionEvent>>;
    async fn stop(&self) -> Result<()>;
}

/// Source fed by hand, used for replay and tests
///
/// Values pushed while the source is stopped are discarded, the same way a
/// platform provider delivers nothing before it is started.
pub struct ChannelSource<T> {
    buffer: usize,
    sink: Mutex<Option<mpsc::Sender<T>>>,
}

pub type ChannelLocationSource = ChannelSource<Location>;
pub type ChannelMotionSource = ChannelSource<MotionEvent>;

impl<T: Send + 'static> ChannelSource<T> {
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer: buffer.max(1),
            sink: Mutex::new(None),
        }
    }

    /// Deliver one value; returns `false` if the source is not started
    pub async fn push(&self, value: T) -> bool {
        let sink = match self.sink.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        match sink {
            Some(sender) => sender.send(value).await.is_ok(),
            None => false,
        }
    }

    pub fn is_started(&self) -> bool {
        self.sink.lock().map(|guard| guard.is_some()).unwrap_or(false)
    }

    fn open(&self) -> Result<mpsc::Receiver<T>> {
        let (tx, rx) = mpsc::channel(self.buffer);
        let mut sink = self
            .sink
            .lock()
            .map_err(|_| anyhow!("source state poisoned"))?;
        if sink.is_some() {
            debug!("Restarting channel source; previous stream closes");
        }
        *sink = Some(tx);
        Ok(rx)
    }

    fn close(&self) -> Result<()> {
        let mut sink = self
            .sink
            .lock()
            .map_err(|_| anyhow!("source state poisoned"))?;
        sink.take();
        Ok(())
    }
}

#[async_trait]
impl LocationSource for ChannelSource<Location> {
    async fn start(&self) -> Result<mpsc::Receiver<Location>> {
        self.open()
    }

    async fn stop(&self) -> Result<()> {
        self.close()
    }
}

#[async_trait]
impl MotionSource for ChannelSource<MotionEvent> {
    async fn start(&self) -> Result<mpsc::Receiver<MotionEvent>> {
        self.open()
    }

    async fn stop(&self) -> Result<()> {
        self.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MotionState;

    #[tokio::test]
    async fn test_push_before_start_is_discarded() -> Result<()> {
        let source = ChannelLocationSource::new(4);
        assert!(!source.push(Location::new(52.0, 21.0, 5.0, 0)).await);

        let mut rx = LocationSource::start(&source).await?;
        assert!(source.push(Location::new(52.0, 21.0, 5.0, 1)).await);
        assert_eq!(rx.recv().await.map(|l| l.timestamp), Some(1));
        Ok(())
    }

    #[tokio::test]
    async fn test_stop_closes_stream() -> Result<()> {
        let source = ChannelMotionSource::new(4);
        let mut rx = MotionSource::start(&source).await?;
        assert!(source.push(MotionEvent::new(MotionState::Walking, 80, 1)).await);
        MotionSource::stop(&source).await?;

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
        assert!(!source.is_started());
        Ok(())
    }
}
