//! Local snapshot cache for offline data access.
//!
//! This module provides the `SnapshotCache`, which mirrors the latest fetched
//! installations and measurements into a SQLite file. Every save replaces the
//! previous snapshot wholesale; nothing is diffed or kept as history.
//!
//! Cached tables:
//! - Installations
//! - Measurements (one per installation)
//! - Measurement items, holding JSON id lists of their leaf records
//! - Measurement values, air quality indexes, air quality standards

pub mod database;
pub mod error;
mod schema;

pub use database::SnapshotCache;
pub use error::CacheError;
