//! Table definitions and record mapping for the snapshot cache.
//!
//! SQLite has no array columns, so a measurement item stores the row ids of
//! its values, indexes and standards as JSON arrays of integers.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row, Transaction};

use super::error::{CacheError, Result};
use crate::models::{
    AirQualityIndex, AirQualityStandard, Installation, Location, MeasurementValue,
};

pub const INSTALLATIONS: &str = "installations";
pub const MEASUREMENTS: &str = "measurements";
pub const MEASUREMENT_ITEMS: &str = "measurement_items";
pub const MEASUREMENT_VALUES: &str = "measurement_values";
pub const AIR_QUALITY_INDEXES: &str = "air_quality_indexes";
pub const AIR_QUALITY_STANDARDS: &str = "air_quality_standards";

/// Tables flushed by every measurement save, leaves first.
pub const READING_TABLES: [&str; 5] = [
    MEASUREMENT_VALUES,
    AIR_QUALITY_INDEXES,
    AIR_QUALITY_STANDARDS,
    MEASUREMENT_ITEMS,
    MEASUREMENTS,
];

pub const CREATE_TABLES: &str = "
    CREATE TABLE IF NOT EXISTS installations (
        id TEXT PRIMARY KEY NOT NULL,
        latitude REAL NOT NULL,
        longitude REAL NOT NULL,
        elevation REAL,
        airly INTEGER NOT NULL DEFAULT 0,
        address TEXT NOT NULL,
        sponsor TEXT
    );
    CREATE TABLE IF NOT EXISTS measurements (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        current_measurement_item_id INTEGER NOT NULL,
        installation_id TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS measurement_items (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        from_date_time TEXT,
        till_date_time TEXT,
        measurement_value_ids TEXT NOT NULL,
        air_quality_index_ids TEXT NOT NULL,
        air_quality_standard_ids TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS measurement_values (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        value REAL NOT NULL
    );
    CREATE TABLE IF NOT EXISTS air_quality_indexes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        value REAL,
        level TEXT,
        description TEXT,
        advice TEXT,
        color TEXT
    );
    CREATE TABLE IF NOT EXISTS air_quality_standards (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        pollutant TEXT NOT NULL,
        limit_value REAL NOT NULL,
        percent REAL NOT NULL
    );
";

pub const SELECT_INSTALLATION_COLUMNS: &str =
    "SELECT id, latitude, longitude, elevation, airly, address, sponsor FROM installations";

pub const SELECT_MEASUREMENTS: &str =
    "SELECT current_measurement_item_id, installation_id FROM measurements ORDER BY id";

pub const SELECT_MEASUREMENT_ITEM: &str = "SELECT id, from_date_time, till_date_time, \
     measurement_value_ids, air_quality_index_ids, air_quality_standard_ids \
     FROM measurement_items WHERE id = ?1";

// Membership scans over the stored id list
pub const SELECT_VALUES_IN: &str = "SELECT id, name, value FROM measurement_values \
     WHERE id IN (SELECT value FROM json_each(?1)) ORDER BY id";

pub const SELECT_INDEXES_IN: &str =
    "SELECT id, name, value, level, description, advice, color FROM air_quality_indexes \
     WHERE id IN (SELECT value FROM json_each(?1)) ORDER BY id";

pub const SELECT_STANDARDS_IN: &str =
    "SELECT id, name, pollutant, limit_value, percent FROM air_quality_standards \
     WHERE id IN (SELECT value FROM json_each(?1)) ORDER BY id";

// ============================================================================
// Records
// ============================================================================

/// A row of the `measurements` table.
#[derive(Debug, Clone)]
pub struct MeasurementRecord {
    pub item_id: i64,
    pub installation_id: String,
}

impl MeasurementRecord {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            item_id: row.get(0)?,
            installation_id: row.get(1)?,
        })
    }
}

/// A row of the `measurement_items` table, id lists still serialized.
#[derive(Debug, Clone)]
pub struct MeasurementItemRecord {
    pub id: i64,
    pub from_date_time: Option<DateTime<Utc>>,
    pub till_date_time: Option<DateTime<Utc>>,
    pub value_ids: String,
    pub index_ids: String,
    pub standard_ids: String,
}

impl MeasurementItemRecord {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            from_date_time: row.get(1)?,
            till_date_time: row.get(2)?,
            value_ids: row.get(3)?,
            index_ids: row.get(4)?,
            standard_ids: row.get(5)?,
        })
    }
}

/// Serialize leaf row ids for a measurement item.
pub fn encode_ids(ids: &[i64]) -> Result<String> {
    Ok(serde_json::to_string(ids)?)
}

/// Parse a stored id list, attributing failures to the owning item.
pub fn decode_ids(item_id: i64, text: &str) -> Result<Vec<i64>> {
    serde_json::from_str(text).map_err(|source| CacheError::CorruptIdList { item_id, source })
}

// ============================================================================
// Installations
// ============================================================================

pub fn insert_installation(tx: &Transaction<'_>, installation: &Installation) -> Result<()> {
    let address = serde_json::to_string(&installation.address)?;
    let sponsor = installation
        .sponsor
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    let mut stmt = tx.prepare_cached(
        "INSERT INTO installations (id, latitude, longitude, elevation, airly, address, sponsor)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    stmt.execute(params![
        &installation.id,
        installation.location.latitude,
        installation.location.longitude,
        installation.elevation,
        installation.airly,
        address,
        sponsor,
    ])?;
    Ok(())
}

/// Raw installation columns; address and sponsor are decoded separately so
/// that malformed JSON surfaces as a serialization error.
pub struct InstallationRecord {
    id: String,
    latitude: f64,
    longitude: f64,
    elevation: Option<f64>,
    airly: bool,
    address: String,
    sponsor: Option<String>,
}

impl InstallationRecord {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            latitude: row.get(1)?,
            longitude: row.get(2)?,
            elevation: row.get(3)?,
            airly: row.get(4)?,
            address: row.get(5)?,
            sponsor: row.get(6)?,
        })
    }

    pub fn into_installation(self) -> Result<Installation> {
        let sponsor = self
            .sponsor
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(Installation {
            id: self.id,
            location: Location::new(self.latitude, self.longitude),
            address: serde_json::from_str(&self.address)?,
            elevation: self.elevation,
            airly: self.airly,
            sponsor,
        })
    }
}

// ============================================================================
// Leaf records
// ============================================================================

/// Insert measurement values, returning the assigned row ids in input order.
pub fn insert_values(tx: &Transaction<'_>, values: &[MeasurementValue]) -> Result<Vec<i64>> {
    let mut stmt =
        tx.prepare_cached("INSERT INTO measurement_values (name, value) VALUES (?1, ?2)")?;
    let mut ids = Vec::with_capacity(values.len());
    for v in values {
        ids.push(stmt.insert(params![&v.name, v.value])?);
    }
    Ok(ids)
}

pub fn insert_indexes(tx: &Transaction<'_>, indexes: &[AirQualityIndex]) -> Result<Vec<i64>> {
    let mut stmt = tx.prepare_cached(
        "INSERT INTO air_quality_indexes (name, value, level, description, advice, color)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    let mut ids = Vec::with_capacity(indexes.len());
    for i in indexes {
        ids.push(stmt.insert(params![
            &i.name,
            i.value,
            &i.level,
            &i.description,
            &i.advice,
            &i.color,
        ])?);
    }
    Ok(ids)
}

pub fn insert_standards(
    tx: &Transaction<'_>,
    standards: &[AirQualityStandard],
) -> Result<Vec<i64>> {
    let mut stmt = tx.prepare_cached(
        "INSERT INTO air_quality_standards (name, pollutant, limit_value, percent)
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    let mut ids = Vec::with_capacity(standards.len());
    for s in standards {
        ids.push(stmt.insert(params![&s.name, &s.pollutant, s.limit, s.percent])?);
    }
    Ok(ids)
}

pub fn value_from_row(row: &Row<'_>) -> rusqlite::Result<MeasurementValue> {
    Ok(MeasurementValue {
        id: Some(row.get(0)?),
        name: row.get(1)?,
        value: row.get(2)?,
    })
}

pub fn index_from_row(row: &Row<'_>) -> rusqlite::Result<AirQualityIndex> {
    Ok(AirQualityIndex {
        id: Some(row.get(0)?),
        name: row.get(1)?,
        value: row.get(2)?,
        level: row.get(3)?,
        description: row.get(4)?,
        advice: row.get(5)?,
        color: row.get(6)?,
    })
}

pub fn standard_from_row(row: &Row<'_>) -> rusqlite::Result<AirQualityStandard> {
    Ok(AirQualityStandard {
        id: Some(row.get(0)?),
        name: row.get(1)?,
        pollutant: row.get(2)?,
        limit: row.get(3)?,
        percent: row.get(4)?,
    })
}
