//! Fetch-and-cache orchestration.
//!
//! `AirMonitor` ties the API client, the location provider and the snapshot
//! cache together: a refresh fetches the nearest installations and their
//! measurements, then replaces the cached snapshot with the result.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::api::ApiClient;
use crate::cache::{CacheError, SnapshotCache};
use crate::config::Config;
use crate::location::{self, LocationProvider};
use crate::models::{Installation, Measurement};

/// Measurements together with where they came from.
#[derive(Debug, Clone)]
pub struct Readings {
    pub measurements: Vec<Measurement>,
    /// True when the live refresh failed and the cached snapshot was used.
    pub from_cache: bool,
}

pub struct AirMonitor {
    api: ApiClient,
    cache: Arc<SnapshotCache>,
    location: Box<dyn LocationProvider>,
    max_distance_km: f64,
    max_results: u32,
}

impl AirMonitor {
    pub fn new(
        api: ApiClient,
        cache: Arc<SnapshotCache>,
        location: Box<dyn LocationProvider>,
    ) -> Self {
        let defaults = Config::default();
        Self {
            api,
            cache,
            location,
            max_distance_km: defaults.max_distance_km,
            max_results: defaults.max_results,
        }
    }

    /// Build a monitor from configuration, opening the snapshot database.
    pub fn from_config(config: &Config, api_key: &str) -> Result<Self> {
        let api = ApiClient::new(&config.api_url, api_key)?;
        let path = config.database_path()?;
        let cache = SnapshotCache::open(&path)
            .with_context(|| format!("Failed to open snapshot cache at {}", path.display()))?;

        Ok(Self::new(api, Arc::new(cache), location::from_config(config.position()))
            .with_search(config.max_distance_km, config.max_results))
    }

    /// Override the search radius and result count.
    pub fn with_search(mut self, max_distance_km: f64, max_results: u32) -> Self {
        self.max_distance_km = max_distance_km;
        self.max_results = max_results;
        self
    }

    pub fn cache(&self) -> &Arc<SnapshotCache> {
        &self.cache
    }

    /// Run a blocking cache operation off the async executor.
    async fn with_cache<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&SnapshotCache) -> std::result::Result<T, CacheError> + Send + 'static,
    {
        let cache = Arc::clone(&self.cache);
        let result = tokio::task::spawn_blocking(move || f(&cache))
            .await
            .context("Cache task failed")?;
        Ok(result?)
    }

    /// Fetch the nearest installations and their measurements, then replace
    /// the cached snapshot.
    ///
    /// Installations whose measurement request fails are skipped. If every
    /// request fails the refresh is an error and the snapshot is kept.
    pub async fn refresh(&self) -> Result<Vec<Measurement>> {
        let position = self
            .location
            .last_known()?
            .ok_or_else(|| anyhow::anyhow!("No last known location"))?;

        let installations = self
            .api
            .nearest_installations(position, self.max_distance_km, self.max_results)
            .await
            .context("Failed to fetch nearest installations")?;

        let mut measurements = Vec::with_capacity(installations.len());
        for installation in &installations {
            match self.api.installation_measurements(installation).await {
                Ok(measurement) => measurements.push(measurement),
                Err(e) => {
                    warn!(installation = %installation.id, error = %e, "Skipping installation without measurements");
                }
            }
        }

        // Keep the previous snapshot rather than replacing it with nothing
        if !installations.is_empty() && measurements.is_empty() {
            return Err(anyhow::anyhow!(
                "No measurements could be fetched for {} installations",
                installations.len()
            ));
        }

        self.store(installations, measurements.clone()).await?;
        info!(
            count = measurements.len(),
            latitude = position.latitude,
            longitude = position.longitude,
            "Refreshed measurements"
        );
        Ok(measurements)
    }

    async fn store(
        &self,
        installations: Vec<Installation>,
        measurements: Vec<Measurement>,
    ) -> Result<()> {
        self.with_cache(move |cache| {
            cache.save_installations(&installations)?;
            cache.save_measurements(&measurements)
        })
        .await
        .context("Failed to save snapshot")
    }

    /// The cached snapshot, without touching the network.
    pub async fn cached(&self) -> Result<Vec<Measurement>> {
        self.with_cache(|cache| cache.measurements())
            .await
            .context("Failed to load cached measurements")
    }

    /// Refresh, falling back to the cached snapshot when the refresh fails.
    pub async fn measurements_or_cached(&self) -> Result<Readings> {
        match self.refresh().await {
            Ok(measurements) => Ok(Readings {
                measurements,
                from_cache: false,
            }),
            Err(e) => {
                warn!(error = %format!("{:#}", e), "Refresh failed, using cached measurements");
                Ok(Readings {
                    measurements: self.cached().await?,
                    from_cache: true,
                })
            }
        }
    }
}
