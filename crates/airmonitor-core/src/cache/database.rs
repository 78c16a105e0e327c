use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::debug;

use super::error::{CacheError, Result};
use super::schema::{self, InstallationRecord, MeasurementItemRecord, MeasurementRecord};
use crate::models::{Installation, Measurement, MeasurementItem};

/// File name of the snapshot database inside the data directory.
pub const DATABASE_FILE: &str = "AirMonitorDatabase.db";

/// SQLite-backed snapshot of the latest fetch.
///
/// All access goes through one connection behind a mutex, so calls from
/// different threads are serialized. Each save runs in a single transaction
/// while the lock is held.
pub struct SnapshotCache {
    path: Option<PathBuf>,
    conn: Mutex<Option<Connection>>,
}

impl SnapshotCache {
    /// Open (or create) the snapshot database at `path` and ensure its tables exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::unavailable(path, e))?;
        }

        let conn = Connection::open_with_flags(path, Self::open_flags())
            .map_err(|e| CacheError::unavailable(path, e))?;

        let cache = Self {
            path: Some(path.to_path_buf()),
            conn: Mutex::new(Some(conn)),
        };
        cache.initialize()?;
        debug!(path = %path.display(), "Opened snapshot cache");
        Ok(cache)
    }

    /// Create an in-memory snapshot cache (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory_with_flags(Self::open_flags())
            .map_err(|e| CacheError::unavailable(Path::new(":memory:"), e))?;

        let cache = Self {
            path: None,
            conn: Mutex::new(Some(conn)),
        };
        cache.initialize()?;
        Ok(cache)
    }

    fn open_flags() -> OpenFlags {
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX
    }

    /// Location of the database file, `None` for in-memory caches.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Create any missing tables. Safe to call repeatedly.
    pub fn initialize(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute_batch(schema::CREATE_TABLES)?;
            Ok(())
        })
    }

    /// Release the connection. Later calls are no-ops; other operations
    /// fail with `CacheError::Closed`.
    pub fn close(&self) -> Result<()> {
        let conn = self.lock().take();
        if let Some(conn) = conn {
            conn.close().map_err(|(_, e)| CacheError::Database(e))?;
            debug!("Closed snapshot cache");
        }
        Ok(())
    }

    // A poisoned lock only means another caller panicked mid-call; any
    // transaction it held was rolled back when dropped.
    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut guard = self.lock();
        let conn = guard.as_mut().ok_or(CacheError::Closed)?;
        f(conn)
    }

    // ===== Installations =====

    /// Replace all stored installations with `installations`.
    pub fn save_installations(&self, installations: &[Installation]) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute(&format!("DELETE FROM {}", schema::INSTALLATIONS), [])?;
            for installation in installations {
                schema::insert_installation(&tx, installation)?;
            }
            tx.commit()?;

            debug!(count = installations.len(), "Saved installations");
            Ok(())
        })
    }

    /// All stored installations, in storage order.
    pub fn installations(&self) -> Result<Vec<Installation>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("{} ORDER BY rowid", schema::SELECT_INSTALLATION_COLUMNS))?;
            let records = stmt
                .query_map([], InstallationRecord::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            records
                .into_iter()
                .map(InstallationRecord::into_installation)
                .collect()
        })
    }

    /// Look up one installation by id.
    pub fn installation(&self, id: &str) -> Result<Option<Installation>> {
        self.with_conn(|conn| Self::find_installation(conn, id))
    }

    fn find_installation(conn: &Connection, id: &str) -> Result<Option<Installation>> {
        let record = conn
            .query_row(
                &format!("{} WHERE id = ?1", schema::SELECT_INSTALLATION_COLUMNS),
                params![id],
                InstallationRecord::from_row,
            )
            .optional()?;

        record.map(InstallationRecord::into_installation).transpose()
    }

    // ===== Measurements =====

    /// Replace every measurement, item and leaf record with `measurements`.
    ///
    /// Leaves are inserted before their item so the item can record the ids
    /// they were assigned. Installation ids are stored as given; nothing
    /// checks that the installation has been saved.
    ///
    /// Several measurements for the same installation are all stored and all
    /// read back. Callers that want one reading per installation must
    /// deduplicate before saving.
    pub fn save_measurements(&self, measurements: &[Measurement]) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            for table in schema::READING_TABLES {
                tx.execute(&format!("DELETE FROM {}", table), [])?;
            }

            for measurement in measurements {
                let item = &measurement.current;
                let value_ids = schema::insert_values(&tx, &item.values)?;
                let index_ids = schema::insert_indexes(&tx, &item.indexes)?;
                let standard_ids = schema::insert_standards(&tx, &item.standards)?;

                tx.execute(
                    "INSERT INTO measurement_items (from_date_time, till_date_time,
                        measurement_value_ids, air_quality_index_ids, air_quality_standard_ids)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        item.from_date_time,
                        item.till_date_time,
                        schema::encode_ids(&value_ids)?,
                        schema::encode_ids(&index_ids)?,
                        schema::encode_ids(&standard_ids)?,
                    ],
                )?;
                let item_id = tx.last_insert_rowid();

                tx.execute(
                    "INSERT INTO measurements (current_measurement_item_id, installation_id)
                     VALUES (?1, ?2)",
                    params![item_id, &measurement.installation.id],
                )?;
            }
            tx.commit()?;

            debug!(count = measurements.len(), "Saved measurements");
            Ok(())
        })
    }

    /// Rebuild every stored measurement with its installation and leaf records.
    pub fn measurements(&self) -> Result<Vec<Measurement>> {
        self.with_conn(|conn| {
            let records = {
                let mut stmt = conn.prepare(schema::SELECT_MEASUREMENTS)?;
                let rows = stmt.query_map([], MeasurementRecord::from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };

            let mut measurements = Vec::with_capacity(records.len());
            for record in records {
                let current = Self::load_item(conn, record.item_id)?;
                let installation = Self::find_installation(conn, &record.installation_id)?
                    .ok_or_else(|| {
                        CacheError::not_found(schema::INSTALLATIONS, &record.installation_id)
                    })?;
                measurements.push(Measurement::new(current, installation));
            }

            debug!(count = measurements.len(), "Loaded measurements");
            Ok(measurements)
        })
    }

    /// True when no measurement is cached.
    pub fn is_empty(&self) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM {}", schema::MEASUREMENTS),
                [],
                |row| row.get(0),
            )?;
            Ok(count == 0)
        })
    }

    fn load_item(conn: &Connection, item_id: i64) -> Result<MeasurementItem> {
        let record = conn
            .query_row(
                schema::SELECT_MEASUREMENT_ITEM,
                params![item_id],
                MeasurementItemRecord::from_row,
            )
            .optional()?
            .ok_or_else(|| CacheError::not_found(schema::MEASUREMENT_ITEMS, item_id))?;

        // Validate before handing the lists to json_each
        schema::decode_ids(record.id, &record.value_ids)?;
        schema::decode_ids(record.id, &record.index_ids)?;
        schema::decode_ids(record.id, &record.standard_ids)?;

        let values = conn
            .prepare_cached(schema::SELECT_VALUES_IN)?
            .query_map(params![&record.value_ids], schema::value_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let indexes = conn
            .prepare_cached(schema::SELECT_INDEXES_IN)?
            .query_map(params![&record.index_ids], schema::index_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let standards = conn
            .prepare_cached(schema::SELECT_STANDARDS_IN)?
            .query_map(params![&record.standard_ids], schema::standard_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(MeasurementItem {
            from_date_time: record.from_date_time,
            till_date_time: record.till_date_time,
            values,
            indexes,
            standards,
        })
    }
}

impl Drop for SnapshotCache {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            debug!(error = %e, "Failed to close snapshot cache cleanly");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Address, AirQualityIndex, AirQualityStandard, Location, MeasurementValue, Sponsor,
    };

    fn installation(id: &str, latitude: f64, longitude: f64) -> Installation {
        Installation {
            id: id.to_string(),
            location: Location::new(latitude, longitude),
            address: Address::default(),
            elevation: None,
            airly: true,
            sponsor: None,
        }
    }

    fn full_item() -> MeasurementItem {
        MeasurementItem {
            from_date_time: "2019-11-24T10:45:42Z".parse().ok(),
            till_date_time: "2019-11-24T11:45:42Z".parse().ok(),
            values: vec![
                MeasurementValue::new("PM25", 12.5),
                MeasurementValue::new("PM10", 18.9),
            ],
            indexes: vec![AirQualityIndex {
                id: None,
                name: "AIRLY_CAQI".to_string(),
                value: Some(22.9),
                level: Some("LOW".to_string()),
                description: Some("Air is quite good.".to_string()),
                advice: None,
                color: Some("#D1CF1E".to_string()),
            }],
            standards: vec![AirQualityStandard {
                id: None,
                name: "WHO".to_string(),
                pollutant: "PM25".to_string(),
                limit: 25.0,
                percent: 50.0,
            }],
        }
    }

    /// Leaf ids are reassigned on every save, so compare without them.
    fn without_ids(mut item: MeasurementItem) -> MeasurementItem {
        item.values.iter_mut().for_each(|v| v.id = None);
        item.indexes.iter_mut().for_each(|i| i.id = None);
        item.standards.iter_mut().for_each(|s| s.id = None);
        item
    }

    fn count(cache: &SnapshotCache, table: &str) -> i64 {
        cache
            .with_conn(|conn| {
                Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?)
            })
            .unwrap()
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let cache = SnapshotCache::open_in_memory().unwrap();
        cache.initialize().unwrap();
        cache.initialize().unwrap();

        let tables = count(&cache, "sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'");
        assert_eq!(tables, 6);
        assert!(cache.installations().unwrap().is_empty());
        assert!(cache.is_empty().unwrap());
    }

    #[test]
    fn test_installations_round_trip() {
        let cache = SnapshotCache::open_in_memory().unwrap();
        let mut first = installation("8077", 50.062006, 19.940984);
        first.elevation = Some(220.38);
        first.address = Address {
            city: Some("Kraków".to_string()),
            street: Some("Mikołajska".to_string()),
            number: Some("4".to_string()),
            ..Default::default()
        };
        first.sponsor = Some(Sponsor {
            name: Some("Sponsor".to_string()),
            link: Some("https://airly.eu".to_string()),
            ..Default::default()
        });
        let mut second = installation("A1", 50.0, 19.0);
        second.airly = false;
        let saved = vec![first, second];

        cache.save_installations(&saved).unwrap();
        assert_eq!(cache.installations().unwrap(), saved);
        assert_eq!(cache.installation("A1").unwrap(), Some(saved[1].clone()));
        assert_eq!(cache.installation("missing").unwrap(), None);

        cache.save_installations(&[]).unwrap();
        assert!(cache.installations().unwrap().is_empty());
    }

    #[test]
    fn test_save_installations_replaces_previous() {
        let cache = SnapshotCache::open_in_memory().unwrap();
        cache
            .save_installations(&[installation("A1", 50.0, 19.0), installation("B2", 51.0, 20.0)])
            .unwrap();
        cache
            .save_installations(&[installation("C3", 52.0, 21.0)])
            .unwrap();

        let ids: Vec<String> = cache
            .installations()
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec!["C3".to_string()]);
    }

    #[test]
    fn test_duplicate_installation_ids_are_rejected() {
        let cache = SnapshotCache::open_in_memory().unwrap();
        cache.save_installations(&[installation("A1", 50.0, 19.0)]).unwrap();

        let result = cache.save_installations(&[
            installation("B2", 51.0, 20.0),
            installation("B2", 51.0, 20.0),
        ]);
        assert!(matches!(result, Err(CacheError::Database(_))));

        // The failed save rolled back; the previous snapshot is intact
        let ids: Vec<String> = cache.installations().unwrap().into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec!["A1".to_string()]);
    }

    #[test]
    fn test_single_measurement_scenario() {
        let cache = SnapshotCache::open_in_memory().unwrap();
        let station = installation("A1", 50.0, 19.0);
        cache.save_installations(&[station.clone()]).unwrap();

        let item = MeasurementItem {
            values: vec![MeasurementValue::new("PM25", 12.5)],
            ..Default::default()
        };
        cache
            .save_measurements(&[Measurement::new(item, station)])
            .unwrap();

        let measurements = cache.measurements().unwrap();
        assert_eq!(measurements.len(), 1);
        let m = &measurements[0];
        assert_eq!(m.installation.id, "A1");
        assert_eq!(m.current.values.len(), 1);
        assert_eq!(m.current.values[0].name, "PM25");
        assert_eq!(m.current.values[0].value, 12.5);
        assert!(m.current.values[0].id.is_some());
        assert!(m.current.indexes.is_empty());
        assert!(m.current.standards.is_empty());
    }

    #[test]
    fn test_measurements_round_trip() {
        let cache = SnapshotCache::open_in_memory().unwrap();
        let a = installation("A1", 50.0, 19.0);
        let b = installation("B2", 51.0, 20.0);
        cache.save_installations(&[a.clone(), b.clone()]).unwrap();

        let second_item = MeasurementItem {
            values: vec![MeasurementValue::new("NO2", 40.1)],
            ..Default::default()
        };
        let saved = vec![
            Measurement::new(full_item(), a),
            Measurement::new(second_item, b),
        ];
        cache.save_measurements(&saved).unwrap();

        let loaded = cache.measurements().unwrap();
        assert_eq!(loaded.len(), saved.len());
        for (loaded, saved) in loaded.into_iter().zip(saved) {
            assert_eq!(loaded.installation, saved.installation);
            assert_eq!(without_ids(loaded.current), saved.current);
        }
        assert!(!cache.is_empty().unwrap());
    }

    #[test]
    fn test_save_measurements_flushes_everything() {
        let cache = SnapshotCache::open_in_memory().unwrap();
        let a = installation("A1", 50.0, 19.0);
        cache.save_installations(&[a.clone()]).unwrap();
        cache
            .save_measurements(&[Measurement::new(full_item(), a.clone())])
            .unwrap();
        cache
            .save_measurements(&[Measurement::new(full_item(), a)])
            .unwrap();

        // Second save left no residue from the first
        assert_eq!(cache.measurements().unwrap().len(), 1);
        assert_eq!(count(&cache, schema::MEASUREMENT_VALUES), 2);
        assert_eq!(count(&cache, schema::MEASUREMENT_ITEMS), 1);

        cache.save_measurements(&[]).unwrap();
        assert!(cache.measurements().unwrap().is_empty());
        for table in schema::READING_TABLES {
            assert_eq!(count(&cache, table), 0, "{} not flushed", table);
        }
        // Installations are untouched by measurement saves
        assert_eq!(cache.installations().unwrap().len(), 1);
    }

    #[test]
    fn test_repeated_installation_keeps_every_measurement() {
        let cache = SnapshotCache::open_in_memory().unwrap();
        let a = installation("A1", 50.0, 19.0);
        cache.save_installations(&[a.clone()]).unwrap();

        let later = MeasurementItem {
            values: vec![MeasurementValue::new("PM25", 30.0)],
            ..Default::default()
        };
        cache
            .save_measurements(&[
                Measurement::new(full_item(), a.clone()),
                Measurement::new(later, a),
            ])
            .unwrap();

        let loaded = cache.measurements().unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded.iter().all(|m| m.installation.id == "A1"));
        assert_eq!(loaded[0].current.value("PM25"), Some(12.5));
        assert_eq!(loaded[1].current.value("PM25"), Some(30.0));
        assert_eq!(count(&cache, schema::MEASUREMENTS), 2);
        assert_eq!(count(&cache, schema::MEASUREMENT_ITEMS), 2);
    }

    #[test]
    fn test_stored_id_lists_reference_existing_leaves() {
        let cache = SnapshotCache::open_in_memory().unwrap();
        let a = installation("A1", 50.0, 19.0);
        let b = installation("B2", 51.0, 20.0);
        cache.save_installations(&[a.clone(), b.clone()]).unwrap();
        cache
            .save_measurements(&[
                Measurement::new(full_item(), a),
                Measurement::new(full_item(), b),
            ])
            .unwrap();

        let items: Vec<(i64, String, String, String)> = cache
            .with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, measurement_value_ids, air_quality_index_ids, air_quality_standard_ids
                     FROM measurement_items",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .unwrap();
        assert_eq!(items.len(), 2);

        let mut all_value_ids = Vec::new();
        for (item_id, values, indexes, standards) in items {
            for (table, text) in [
                (schema::MEASUREMENT_VALUES, &values),
                (schema::AIR_QUALITY_INDEXES, &indexes),
                (schema::AIR_QUALITY_STANDARDS, &standards),
            ] {
                let ids = schema::decode_ids(item_id, text).unwrap();
                let existing = count(
                    &cache,
                    &format!("{} WHERE id IN (SELECT value FROM json_each('{}'))", table, text),
                );
                assert_eq!(existing as usize, ids.len());
            }
            all_value_ids.extend(schema::decode_ids(item_id, &values).unwrap());
        }

        // Each item owns its own leaves
        all_value_ids.sort_unstable();
        all_value_ids.dedup();
        assert_eq!(all_value_ids.len(), 4);
    }

    #[test]
    fn test_missing_installation_is_not_found() {
        let cache = SnapshotCache::open_in_memory().unwrap();
        // Linking to an unsaved installation is accepted on write...
        cache
            .save_measurements(&[Measurement::new(full_item(), installation("ghost", 0.0, 0.0))])
            .unwrap();

        // ...and surfaces on read
        let err = cache.measurements().unwrap_err();
        match err {
            CacheError::NotFound { table, key } => {
                assert_eq!(table, schema::INSTALLATIONS);
                assert_eq!(key, "ghost");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_item_is_not_found() {
        let cache = SnapshotCache::open_in_memory().unwrap();
        let a = installation("A1", 50.0, 19.0);
        cache.save_installations(&[a.clone()]).unwrap();
        cache.save_measurements(&[Measurement::new(full_item(), a)]).unwrap();
        cache
            .with_conn(|conn| Ok(conn.execute("DELETE FROM measurement_items", [])?))
            .unwrap();

        let err = cache.measurements().unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_corrupt_id_list_is_reported() {
        let cache = SnapshotCache::open_in_memory().unwrap();
        let a = installation("A1", 50.0, 19.0);
        cache.save_installations(&[a.clone()]).unwrap();
        cache.save_measurements(&[Measurement::new(full_item(), a)]).unwrap();
        cache
            .with_conn(|conn| {
                Ok(conn.execute(
                    "UPDATE measurement_items SET air_quality_index_ids = 'not json'",
                    [],
                )?)
            })
            .unwrap();

        let err = cache.measurements().unwrap_err();
        assert!(matches!(err, CacheError::CorruptIdList { .. }));
    }

    #[test]
    fn test_close_is_idempotent() {
        let cache = SnapshotCache::open_in_memory().unwrap();
        cache.close().unwrap();
        cache.close().unwrap();

        assert!(matches!(cache.installations(), Err(CacheError::Closed)));
        assert!(matches!(cache.save_measurements(&[]), Err(CacheError::Closed)));
        assert!(matches!(cache.initialize(), Err(CacheError::Closed)));
    }

    #[test]
    fn test_file_cache_persists_between_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(DATABASE_FILE);
        let a = installation("A1", 50.0, 19.0);

        {
            let cache = SnapshotCache::open(&path).unwrap();
            assert_eq!(cache.path(), Some(path.as_path()));
            cache.save_installations(&[a.clone()]).unwrap();
            cache.save_measurements(&[Measurement::new(full_item(), a.clone())]).unwrap();
        }

        let reopened = SnapshotCache::open(&path).unwrap();
        reopened.initialize().unwrap();
        assert_eq!(reopened.installations().unwrap(), vec![a]);
        assert_eq!(reopened.measurements().unwrap().len(), 1);
    }

    #[test]
    fn test_open_unavailable_location() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let result = SnapshotCache::open(blocker.join(DATABASE_FILE));
        assert!(matches!(result, Err(CacheError::Unavailable { .. })));
    }

    #[test]
    fn test_shared_across_threads() {
        let cache = std::sync::Arc::new(SnapshotCache::open_in_memory().unwrap());
        let handles: Vec<_> = (0..4)
            .map(|n| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    let station = installation(&format!("S{}", n), 50.0, 19.0);
                    cache.save_installations(&[station.clone()]).unwrap();
                    cache.save_measurements(&[Measurement::new(full_item(), station)]).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Every save replaced the whole snapshot. Installation and measurement
        // saves from different threads may interleave, so only counts are checked.
        assert_eq!(cache.installations().unwrap().len(), 1);
        assert_eq!(count(&cache, schema::MEASUREMENTS), 1);
        assert_eq!(count(&cache, schema::MEASUREMENT_VALUES), 2);
    }
}
