//! Core library for AirMonitor.
//!
//! Fetches the air-quality installations nearest to a position from the
//! Airly API and keeps the latest results in a local SQLite snapshot so they
//! remain available offline.

pub mod api;
pub mod cache;
pub mod config;
pub mod credentials;
pub mod location;
pub mod models;
pub mod monitor;
pub mod utils;

pub use api::{ApiClient, ApiError};
pub use cache::{CacheError, SnapshotCache};
pub use config::Config;
pub use credentials::ApiKeyStore;
pub use monitor::{AirMonitor, Readings};
