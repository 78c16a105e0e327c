//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! the Airly API endpoint, the position used to search for installations,
//! the search radius and the snapshot database location.
//!
//! Configuration is stored at `~/.config/airmonitor/config.json`. The API
//! key is never written there; it comes from `AIRLY_API_KEY` or the OS
//! keychain.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::client::DEFAULT_API_URL;
use crate::cache::database::DATABASE_FILE;
use crate::credentials::ApiKeyStore;
use crate::models::Coordinates;

/// Application name used for config/data/cache directory paths
pub const APP_NAME: &str = "airmonitor";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable holding the Airly API key
pub const API_KEY_ENV: &str = "AIRLY_API_KEY";

/// Search radius for nearby installations
const DEFAULT_MAX_DISTANCE_KM: f64 = 10.0;

/// Number of nearby installations to show
const DEFAULT_MAX_RESULTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_url: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub max_distance_km: f64,
    pub max_results: u32,
    pub database_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            latitude: None,
            longitude: None,
            max_distance_km: DEFAULT_MAX_DISTANCE_KM,
            max_results: DEFAULT_MAX_RESULTS,
            database_path: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Configured search position, if both coordinates are set.
    pub fn position(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates::new(latitude, longitude)),
            _ => None,
        }
    }

    /// Snapshot database file, defaulting to the per-user data directory.
    pub fn database_path(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.database_path {
            return Ok(path.clone());
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME).join(DATABASE_FILE))
    }

    /// Directory for log files.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// API key from the environment, falling back to the keychain.
    pub fn api_key(&self) -> Result<Option<String>> {
        match std::env::var(API_KEY_ENV) {
            Ok(key) if !key.trim().is_empty() => Ok(Some(key.trim().to_string())),
            _ => ApiKeyStore::get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.max_results, 3);
        assert_eq!(config.position(), None);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("airmonitor").join("config.json");
        let config = Config {
            latitude: Some(50.06),
            longitude: Some(19.94),
            database_path: Some(dir.path().join("air.db")),
            ..Default::default()
        };

        config.save_to(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();

        assert_eq!(loaded, config);
        assert_eq!(loaded.position(), Some(Coordinates::new(50.06, 19.94)));
        assert_eq!(loaded.database_path().unwrap(), dir.path().join("air.db"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"latitude": 52.23}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.latitude, Some(52.23));
        assert_eq!(config.max_distance_km, 10.0);
        // Longitude missing, so no usable position
        assert_eq!(config.position(), None);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(Config::load_from(&path).is_err());
    }
}
