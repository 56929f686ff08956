// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Backend Transport
//!
//! The two calls the engine makes to the tracking backend: a batched
//! coordinate upload and a keep-alive ping. [`TrackingApi`] is the seam the
//! sync and ping services depend on; [`HttpTrackingApi`] is the reqwest
//! implementation.
//!
//! Any non-2xx response is a failure. There is no retry inside a call; the
//! caller's next cycle is the retry.

use crate::config::ApiConfig;
use crate::error::TransportError;
use crate::models::Location;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const MPS_TO_KNOTS: f64 = 1.943_844;

/// User-equivalent range error used to turn an accuracy radius into HDOP
const UERE_M: f64 = 5.0;

/// Wire form of a single fix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateDto {
    pub lat: f64,
    pub lon: f64,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub valid: bool,
    /// Knots
    pub speed: Option<f64>,
    /// Degrees clockwise from north
    pub bearing: Option<f64>,
    /// Meters
    pub altitude: Option<f64>,
    /// Meters
    pub accuracy: f64,
    pub batt: Option<u8>,
    pub charge: Option<bool>,
    pub hdop: f64,
    #[serde(rename = "driverUniqueId")]
    pub driver_unique_id: String,
}

impl CoordinateDto {
    pub fn from_location(location: &Location, driver_unique_id: &str) -> Self {
        Self {
            lat: location.latitude,
            lon: location.longitude,
            timestamp: location.timestamp,
            valid: location.has_valid_coordinates(),
            speed: location.speed.map(|mps| mps * MPS_TO_KNOTS),
            bearing: location.bearing,
            altitude: location.altitude,
            accuracy: location.accuracy,
            batt: location.battery_level,
            charge: location.is_charging,
            hdop: location.accuracy / UERE_M,
            driver_unique_id: driver_unique_id.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CoordinatesRequest<'a> {
    load_id: &'a str,
    coordinates: &'a [CoordinateDto],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PingRequest<'a> {
    load_id: &'a str,
    driver_unique_id: &'a str,
    timestamp: i64,
}

/// Backend calls used by the sync and ping services
#[async_trait]
pub trait TrackingApi: Send + Sync {
    /// Upload a batch of coordinates for a load as one request
    async fn post_coordinates(
        &self,
        load_id: &str,
        coordinates: &[CoordinateDto],
    ) -> Result<(), TransportError>;

    /// Tell the backend the device is alive for this load
    async fn ping(&self, load_id: &str) -> Result<(), TransportError>;

    /// Identifier stamped on every uploaded coordinate
    fn driver_unique_id(&self) -> &str;
}

/// reqwest-backed [`TrackingApi`]
pub struct HttpTrackingApi {
    client: Client,
    base_url: String,
    token: Option<String>,
    driver_unique_id: String,
}

impl HttpTrackingApi {
    pub fn new(config: &ApiConfig) -> Result<Self, TransportError> {
        url::Url::parse(&config.base_url)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            driver_unique_id: config.driver_unique_id.clone(),
        })
    }

    fn token(&self) -> Result<&str, TransportError> {
        self.token.as_deref().ok_or(TransportError::MissingCredentials)
    }

    async fn post_json<T: Serialize + ?Sized + Sync>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<(), TransportError> {
        let token = self.token()?;
        let url = format!("{}/{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        debug!(http.url = %url, http.status = status.as_u16(), "Backend response");
        check_status(status)
    }
}

fn check_status(status: StatusCode) -> Result<(), TransportError> {
    if status.is_success() {
        return Ok(());
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(TransportError::Unauthorized {
            status: status.as_u16(),
        }),
        _ => Err(TransportError::Status {
            status: status.as_u16(),
        }),
    }
}

#[async_trait]
impl TrackingApi for HttpTrackingApi {
    async fn post_coordinates(
        &self,
        load_id: &str,
        coordinates: &[CoordinateDto],
    ) -> Result<(), TransportError> {
        self.post_json(
            "coordinates",
            &CoordinatesRequest {
                load_id,
                coordinates,
            },
        )
        .await
    }

    async fn ping(&self, load_id: &str) -> Result<(), TransportError> {
        self.post_json(
            "ping",
            &PingRequest {
                load_id,
                driver_unique_id: &self.driver_unique_id,
                timestamp: chrono::Utc::now().timestamp_millis(),
            },
        )
        .await
    }

    fn driver_unique_id(&self) -> &str {
        &self.driver_unique_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dto_conversion() {
        let location = Location::new(52.2297, 21.0122, 10.0, 1_700_000_000_000)
            .with_speed(10.0)
            .with_bearing(90.0)
            .with_altitude(100.0)
            .with_battery(55, false);

        let dto = CoordinateDto::from_location(&location, "driver-7");
        assert!(dto.valid);
        assert!((dto.speed.unwrap() - 19.43844).abs() < 1e-9);
        assert_eq!(dto.hdop, 2.0);
        assert_eq!(dto.batt, Some(55));
        assert_eq!(dto.charge, Some(false));

        let json = serde_json::to_value(&dto).unwrap();
        assert_eq!(json["driverUniqueId"], "driver-7");
        assert_eq!(json["lat"], 52.2297);
        assert_eq!(json["timestamp"], 1_700_000_000_000i64);
    }

    #[test]
    fn test_status_mapping() {
        assert!(check_status(StatusCode::OK).is_ok());
        assert!(check_status(StatusCode::NO_CONTENT).is_ok());
        assert!(matches!(
            check_status(StatusCode::UNAUTHORIZED),
            Err(TransportError::Unauthorized { status: 401 })
        ));
        assert!(matches!(
            check_status(StatusCode::FORBIDDEN),
            Err(TransportError::Unauthorized { status: 403 })
        ));
        assert!(matches!(
            check_status(StatusCode::SERVICE_UNAVAILABLE),
            Err(TransportError::Status { status: 503 })
        ));
        assert!(matches!(
            check_status(StatusCode::MOVED_PERMANENTLY),
            Err(TransportError::Status { status: 301 })
        ));
    }

    #[test]
    fn test_missing_token_is_reported_before_any_request() {
        let api = HttpTrackingApi::new(&ApiConfig {
            base_url: "http://localhost:9/api/".to_string(),
            token: None,
            driver_unique_id: "driver-7".to_string(),
            request_timeout_secs: 5,
        })
        .unwrap();
        assert!(matches!(api.token(), Err(TransportError::MissingCredentials)));
        assert_eq!(api.base_url, "http://localhost:9/api");
    }
}
