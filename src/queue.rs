// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Local Location Queue
//!
//! Durable SQLite store of accepted fixes waiting for delivery. A fix is
//! written here before any network attempt, so nothing accepted is lost across
//! restarts or outages.
//!
//! Rows only leave the table in two ways: a delivered batch is flagged
//! `sent = 1` and deleted inside one transaction, or the retention purge drops
//! rows older than the retention window.

use crate::error::QueueError;
use crate::models::{Location, LocationRecord};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Queue of unsent locations backed by SQLite
#[derive(Clone)]
pub struct LocationQueue {
    pool: Pool<Sqlite>,
}

impl LocationQueue {
    /// Open (creating if needed) the queue database and run migrations
    pub async fn new(database_url: &str) -> Result<Self, QueueError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let in_memory = database_url.contains(":memory:");

        if !in_memory {
            if let Some(parent) = options.get_filename().parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }

        // An in-memory database lives only as long as its connection
        let pool = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new().connect_with(options).await?
        };

        let queue = Self { pool };
        queue.migrate().await?;

        let leftovers = queue.remove_leftover_sent().await?;
        if leftovers > 0 {
            warn!(
                queue.removed = leftovers,
                "Removed delivered rows left behind by an interrupted batch"
            );
        }

        info!(
            queue.in_memory = in_memory,
            queue.pending = queue.pending_count().await?,
            "Location queue opened"
        );
        Ok(queue)
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<(), QueueError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS locations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                accuracy REAL NOT NULL,
                altitude REAL,
                speed REAL,
                bearing REAL,
                timestamp INTEGER NOT NULL,
                battery_level INTEGER,
                is_charging INTEGER,
                sent INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_locations_sent ON locations(sent, id)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_locations_timestamp ON locations(timestamp)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Persist an accepted fix as unsent; returns its queue id
    pub async fn insert(&self, location: &Location) -> Result<i64, QueueError> {
        let result = sqlx::query(
            r#"
            INSERT INTO locations (latitude, longitude, accuracy, altitude, speed, bearing,
                                   timestamp, battery_level, is_charging, sent)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0)
            "#,
        )
        .bind(location.latitude)
        .bind(location.longitude)
        .bind(location.accuracy)
        .bind(location.altitude)
        .bind(location.speed)
        .bind(location.bearing)
        .bind(location.timestamp)
        .bind(location.battery_level.map(i64::from))
        .bind(location.is_charging)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Oldest unsent records in insertion order
    pub async fn unsent_batch(&self, limit: u32) -> Result<Vec<LocationRecord>, QueueError> {
        let rows = sqlx::query(
            r#"
            SELECT id, latitude, longitude, accuracy, altitude, speed, bearing,
                   timestamp, battery_level, is_charging, sent
            FROM locations
            WHERE sent = 0
            ORDER BY id ASC
            LIMIT ?1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_record).collect()
    }

    /// Flag a delivered batch as sent and delete it in one transaction
    ///
    /// Either every id is gone afterwards or, on failure, none of them is
    /// touched and the batch is offered again on the next cycle.
    pub async fn mark_sent_and_delete(&self, ids: &[i64]) -> Result<u64, QueueError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;

        for id in ids {
            sqlx::query("UPDATE locations SET sent = 1 WHERE id = ?1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        let deleted = sqlx::query("DELETE FROM locations WHERE sent = 1")
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        debug!(queue.deleted = deleted, "Delivered batch removed from queue");
        Ok(deleted)
    }

    /// Drop records whose fix is older than `cutoff_ms`, sent or not
    pub async fn purge_older_than(&self, cutoff_ms: i64) -> Result<u64, QueueError> {
        let purged = sqlx::query("DELETE FROM locations WHERE timestamp < ?1")
            .bind(cutoff_ms)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if purged > 0 {
            warn!(
                queue.purged = purged,
                queue.cutoff_ms = cutoff_ms,
                "Purged locations past retention"
            );
        }
        Ok(purged)
    }

    /// Number of fixes waiting for delivery
    pub async fn pending_count(&self) -> Result<u64, QueueError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM locations WHERE sent = 0")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    /// Timestamp of the oldest undelivered fix
    pub async fn oldest_pending_timestamp(&self) -> Result<Option<i64>, QueueError> {
        let oldest: Option<i64> =
            sqlx::query_scalar("SELECT MIN(timestamp) FROM locations WHERE sent = 0")
                .fetch_one(&self.pool)
                .await?;
        Ok(oldest)
    }

    async fn remove_leftover_sent(&self) -> Result<u64, QueueError> {
        let removed = sqlx::query("DELETE FROM locations WHERE sent = 1")
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(removed)
    }

    /// Close the pool, waiting for in-flight statements
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn row_to_record(row: SqliteRow) -> Result<LocationRecord, QueueError> {
    let id: i64 = row.try_get("id")?;

    let battery_level = match row.try_get::<Option<i64>, _>("battery_level")? {
        Some(level) => Some(u8::try_from(level).map_err(|_| QueueError::CorruptRecord {
            id,
            reason: format!("battery level {level} out of range"),
        })?),
        None => None,
    };

    let location = Location {
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        accuracy: row.try_get("accuracy")?,
        altitude: row.try_get("altitude")?,
        speed: row.try_get("speed")?,
        bearing: row.try_get("bearing")?,
        timestamp: row.try_get("timestamp")?,
        battery_level,
        is_charging: row.try_get("is_charging")?,
    };

    Ok(LocationRecord {
        id,
        location,
        sent: row.try_get("sent")?,
    })
}
