//! Measurement models.
//!
//! A `Measurement` pairs an installation with its current `MeasurementItem`.
//! Leaf records carry an `id` that is only set once the record has been
//! written to the snapshot cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Installation;

/// Current readings for one installation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub installation: Installation,
    pub current: MeasurementItem,
}

impl Measurement {
    pub fn new(current: MeasurementItem, installation: Installation) -> Self {
        Self {
            installation,
            current,
        }
    }
}

/// Readings for a single time window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementItem {
    #[serde(rename = "fromDateTime")]
    pub from_date_time: Option<DateTime<Utc>>,
    #[serde(rename = "tillDateTime")]
    pub till_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub values: Vec<MeasurementValue>,
    #[serde(default)]
    pub indexes: Vec<AirQualityIndex>,
    #[serde(default)]
    pub standards: Vec<AirQualityStandard>,
}

impl MeasurementItem {
    /// The headline index. Airly lists CAQI first.
    pub fn primary_index(&self) -> Option<&AirQualityIndex> {
        self.indexes.first()
    }

    /// Look up a value by name (e.g. "PM25"), ignoring case.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|v| v.name.eq_ignore_ascii_case(name))
            .map(|v| v.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    pub value: f64,
}

impl MeasurementValue {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            id: None,
            name: name.into(),
            value,
        }
    }
}

// Note: API returns a null value and level "UNKNOWN" when a sensor has no data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirQualityIndex {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    pub value: Option<f64>,
    pub level: Option<String>,
    pub description: Option<String>,
    pub advice: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirQualityStandard {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    pub pollutant: String,
    pub limit: f64,
    pub percent: f64,
}
