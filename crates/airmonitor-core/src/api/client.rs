//! API client for the Airly REST API (v2).
//!
//! This module provides the `ApiClient` struct for fetching nearby
//! installations and their current measurements.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{header, Client};
use serde::{de::DeserializeOwned, Deserialize};
use tracing::{debug, warn};

use crate::models::{Coordinates, Installation, Measurement, MeasurementItem};

use super::error::RateLimitWindow;
use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Default base URL for the Airly API
pub const DEFAULT_API_URL: &str = "https://airapi.airly.eu";

/// Header carrying the Airly API key
const API_KEY_HEADER: &str = "apikey";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

// Internal API response type - use Measurement from models for domain code
#[derive(Debug, Deserialize)]
struct MeasurementsResponse {
    current: MeasurementItem,
}

/// API client for Airly.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client sending `api_key` with every request
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        let mut key = header::HeaderValue::from_str(api_key).context("Invalid API key")?;
        key.set_sensitive(true);
        headers.insert(API_KEY_HEADER, key);

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn nearest_installations_url(
        &self,
        position: Coordinates,
        max_distance_km: f64,
        max_results: u32,
    ) -> String {
        format!(
            "{}/v2/installations/nearest?lat={}&lng={}&maxDistanceKM={}&maxResults={}",
            self.base_url, position.latitude, position.longitude, max_distance_km, max_results
        )
    }

    fn measurements_url(&self, installation_id: &str) -> String {
        format!(
            "{}/v2/measurements/installation?installationId={}",
            self.base_url, installation_id
        )
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Ok(response)) for success, Ok(Err(window)) for rate limit
    /// (should retry), or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<std::result::Result<reqwest::Response, RateLimitWindow>> {
        if response.status().is_success() {
            Ok(Ok(response))
        } else if response.status().as_u16() == 429 {
            Ok(Err(RateLimitWindow::from_headers(response.headers())))
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(ApiError::from)
                .with_context(|| format!("Failed to send GET request to {}", url))?;

            match Self::check_response_for_retry(response).await? {
                Ok(response) => {
                    return response
                        .json()
                        .await
                        .with_context(|| format!("Failed to parse JSON response from {}", url));
                }
                Err(window) => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited(window).into());
                    }
                    warn!(url = url, retry = retries, backoff_ms = backoff_ms, limit = %window, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }

    // ===== Data Fetching Methods =====

    /// Fetch the installations closest to `position`
    pub async fn nearest_installations(
        &self,
        position: Coordinates,
        max_distance_km: f64,
        max_results: u32,
    ) -> Result<Vec<Installation>> {
        let url = self.nearest_installations_url(position, max_distance_km, max_results);
        let installations: Vec<Installation> = self.get(&url).await?;
        debug!(count = installations.len(), "Fetched nearest installations");
        Ok(installations)
    }

    /// Fetch the current measurements of `installation`
    pub async fn installation_measurements(
        &self,
        installation: &Installation,
    ) -> Result<Measurement> {
        let url = self.measurements_url(&installation.id);
        let response: MeasurementsResponse = self.get(&url).await?;
        Ok(Measurement::new(response.current, installation.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_urls() {
        let client = ApiClient::new("https://airapi.airly.eu/", "key").unwrap();

        assert_eq!(
            client.nearest_installations_url(Coordinates::new(50.06, 19.94), 10.0, 3),
            "https://airapi.airly.eu/v2/installations/nearest?lat=50.06&lng=19.94&maxDistanceKM=10&maxResults=3"
        );
        assert_eq!(
            client.measurements_url("8077"),
            "https://airapi.airly.eu/v2/measurements/installation?installationId=8077"
        );
    }

    #[test]
    fn test_invalid_api_key_is_rejected() {
        assert!(ApiClient::new(DEFAULT_API_URL, "bad\nkey").is_err());
    }

    #[test]
    fn test_parse_measurements_response() {
        let json = r##"{
            "current": {
                "fromDateTime": "2019-11-24T10:45:42.413Z",
                "tillDateTime": "2019-11-24T11:45:42.413Z",
                "values": [{"name": "PM25", "value": 12.5}],
                "indexes": [{"name": "AIRLY_CAQI", "value": 22.95, "level": "LOW", "description": "Air is quite good.", "advice": "Don't miss this day!", "color": "#D1CF1E"}],
                "standards": []
            },
            "history": [],
            "forecast": []
        }"##;

        let resp: MeasurementsResponse =
            serde_json::from_str(json).expect("Failed to parse measurements test JSON");
        assert_eq!(resp.current.value("PM25"), Some(12.5));
        assert_eq!(resp.current.indexes.len(), 1);
        assert!(resp.current.standards.is_empty());
    }

    #[test]
    fn test_parse_nearest_installations_response() {
        let json = r#"[
            {"id": 8077, "location": {"latitude": 50.062006, "longitude": 19.940984}, "address": {"city": "Kraków"}, "elevation": 220.38, "airly": true, "sponsor": null},
            {"id": 204, "location": {"latitude": 50.06, "longitude": 19.93}, "airly": false}
        ]"#;

        let installations: Vec<Installation> = serde_json::from_str(json).unwrap();
        let ids: Vec<&str> = installations.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["8077", "204"]);
    }
}
