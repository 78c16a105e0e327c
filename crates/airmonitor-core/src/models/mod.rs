//! Data models for Airly entities.
//!
//! This module contains the domain types mirrored by the snapshot cache:
//!
//! - `Installation`: a monitoring station with its location and address
//! - `Measurement`: the current readings of one installation
//! - `MeasurementItem`: a reading window with values, indexes and standards
//! - Leaf records: `MeasurementValue`, `AirQualityIndex`, `AirQualityStandard`

pub mod installation;
pub mod measurement;

pub use installation::{Address, Coordinates, Installation, Location, Sponsor};
pub use measurement::{
    AirQualityIndex, AirQualityStandard, Measurement, MeasurementItem, MeasurementValue,
};
