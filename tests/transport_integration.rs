// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! HTTP transport tests against a mocked tracking backend

use anyhow::Result;
use fleet_tracker::config::ApiConfig;
use fleet_tracker::error::TransportError;
use fleet_tracker::models::Location;
use fleet_tracker::transport::{CoordinateDto, HttpTrackingApi, TrackingApi};
use mockito::{Matcher, Server};
use serde_json::json;

fn api_config(base_url: String, token: Option<&str>) -> ApiConfig {
    ApiConfig {
        base_url,
        token: token.map(str::to_string),
        driver_unique_id: "driver-42".to_string(),
        request_timeout_secs: 5,
    }
}

fn sample_coordinates() -> Vec<CoordinateDto> {
    let location = Location::new(52.2297, 21.0122, 10.0, 1_700_000_000_000)
        .with_speed(5.0)
        .with_battery(80, true);
    vec![CoordinateDto::from_location(&location, "driver-42")]
}

#[tokio::test]
async fn test_post_coordinates_sends_batch_with_bearer_token() -> Result<()> {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/coordinates")
        .match_header("authorization", "Bearer secret-token")
        .match_body(Matcher::PartialJson(json!({
            "loadId": "load-7",
            "coordinates": [{
                "lat": 52.2297,
                "lon": 21.0122,
                "timestamp": 1_700_000_000_000i64,
                "valid": true,
                "batt": 80,
                "charge": true,
                "driverUniqueId": "driver-42"
            }]
        })))
        .with_status(200)
        .create_async()
        .await;

    let api = HttpTrackingApi::new(&api_config(
        format!("{}/api", server.url()),
        Some("secret-token"),
    ))?;
    api.post_coordinates("load-7", &sample_coordinates()).await?;

    mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn test_server_error_is_not_success() -> Result<()> {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/coordinates")
        .with_status(503)
        .create_async()
        .await;

    let api = HttpTrackingApi::new(&api_config(format!("{}/api", server.url()), Some("t")))?;
    let result = api.post_coordinates("load-7", &sample_coordinates()).await;

    assert!(matches!(result, Err(TransportError::Status { status: 503 })));
    Ok(())
}

#[tokio::test]
async fn test_rejected_token_is_unauthorized() -> Result<()> {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/ping")
        .with_status(401)
        .create_async()
        .await;

    let api = HttpTrackingApi::new(&api_config(format!("{}/api", server.url()), Some("stale")))?;
    let result = api.ping("load-7").await;

    assert!(matches!(result, Err(TransportError::Unauthorized { status: 401 })));
    Ok(())
}

#[tokio::test]
async fn test_missing_token_never_reaches_backend() -> Result<()> {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let api = HttpTrackingApi::new(&api_config(format!("{}/api", server.url()), None))?;

    assert!(matches!(
        api.ping("load-7").await,
        Err(TransportError::MissingCredentials)
    ));
    assert!(matches!(
        api.post_coordinates("load-7", &sample_coordinates()).await,
        Err(TransportError::MissingCredentials)
    ));

    mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn test_ping_carries_load_and_driver() -> Result<()> {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/ping")
        .match_body(Matcher::PartialJson(json!({
            "loadId": "load-7",
            "driverUniqueId": "driver-42"
        })))
        .with_status(204)
        .create_async()
        .await;

    let api = HttpTrackingApi::new(&api_config(format!("{}/api/", server.url()), Some("t")))?;
    api.ping("load-7").await?;

    mock.assert_async().await;
    Ok(())
}
