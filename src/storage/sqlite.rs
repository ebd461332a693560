//! SQLite domain store
//!
//! Composite writes run inside a [`rusqlite::Transaction`]; returning early
//! with `?` drops the transaction, which rolls it back.

use std::path::Path;

use log::{debug, info};
use rusqlite::{Connection, params};

use crate::error::StoreError;
use crate::protocol::messages::DailySchedule;
use crate::storage::store::DomainStore;

pub const IN_MEMORY: &str = ":memory:";

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS rpis (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        name        TEXT NOT NULL UNIQUE,
        location    TEXT NOT NULL DEFAULT '',
        created_at  TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    CREATE TABLE IF NOT EXISTS peripherals (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        name        TEXT NOT NULL UNIQUE,
        created_at  TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    CREATE TABLE IF NOT EXISTS rpi_peripheral_edges (
        rpi_id          INTEGER NOT NULL REFERENCES rpis(id),
        peripheral_id   INTEGER NOT NULL UNIQUE REFERENCES peripherals(id)
    );

    CREATE TABLE IF NOT EXISTS soil_moisture_sensors (
        peripheral_id   INTEGER PRIMARY KEY REFERENCES peripherals(id),
        floor           REAL NOT NULL,
        ceiling         REAL NOT NULL
    );

    CREATE TABLE IF NOT EXISTS soil_moisture_measurements (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        sensor_id   INTEGER NOT NULL REFERENCES soil_moisture_sensors(peripheral_id),
        measurement REAL NOT NULL,
        recorded_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    CREATE TABLE IF NOT EXISTS irrigation_systems (
        peripheral_id   INTEGER PRIMARY KEY REFERENCES peripherals(id)
    );

    CREATE TABLE IF NOT EXISTS irrigation_schedules (
        id                      INTEGER PRIMARY KEY AUTOINCREMENT,
        irrigation_system_id    INTEGER NOT NULL REFERENCES irrigation_systems(peripheral_id),
        day_of_week_index       INTEGER NOT NULL,
        water_time_military     TEXT NOT NULL,
        water_duration_ms       INTEGER NOT NULL
    );
";

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path`. `":memory:"` gives
    /// a private in-memory database.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = if path == IN_MEMORY {
            Connection::open_in_memory()?
        } else {
            Connection::open(Path::new(path))?
        };
        conn.execute_batch(SCHEMA)?;
        info!("Opened domain store at {}", path);
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::open(IN_MEMORY)
    }

    /// Ids outside the signed key space cannot name a row, so they simply
    /// do not exist.
    fn exists(&self, sql: &str, id: u64) -> Result<bool, StoreError> {
        let Ok(key) = i64::try_from(id) else {
            return Ok(false);
        };
        Ok(self.conn.query_row(sql, params![key], |row| row.get(0))?)
    }

    fn exists_named(&self, sql: &str, name: &str) -> Result<bool, StoreError> {
        Ok(self.conn.query_row(sql, params![name], |row| row.get(0))?)
    }

    fn insert_peripheral(
        &mut self,
        name: &str,
        rpi_id: Option<u64>,
        kind_table: &str,
        extra: Option<(f64, f64)>,
    ) -> Result<u64, StoreError> {
        let owner = rpi_id.map(sql_int).transpose()?;
        let tx = self.conn.transaction()?;

        tx.execute("INSERT INTO peripherals (name) VALUES (?1)", params![name])?;
        let peripheral_id = tx.last_insert_rowid();

        match extra {
            Some((floor, ceil)) => {
                tx.execute(
                    &format!("INSERT INTO {kind_table} (peripheral_id, floor, ceiling) VALUES (?1, ?2, ?3)"),
                    params![peripheral_id, floor, ceil],
                )?;
            }
            None => {
                tx.execute(
                    &format!("INSERT INTO {kind_table} (peripheral_id) VALUES (?1)"),
                    params![peripheral_id],
                )?;
            }
        }

        if let Some(owner) = owner {
            tx.execute(
                "INSERT INTO rpi_peripheral_edges (rpi_id, peripheral_id) VALUES (?1, ?2)",
                params![owner, peripheral_id],
            )?;
        }

        tx.commit()?;
        row_id(peripheral_id)
    }
}

/// Converts an identifier to SQLite's signed integer key space.
fn sql_int(id: u64) -> Result<i64, StoreError> {
    i64::try_from(id).map_err(|_| StoreError::IdOutOfRange(id))
}

fn row_id(id: i64) -> Result<u64, StoreError> {
    u64::try_from(id).map_err(|_| StoreError::InvalidRowId(id))
}

impl DomainStore for SqliteStore {
    fn contains_rpi(&mut self, id: u64) -> Result<bool, StoreError> {
        self.exists("SELECT EXISTS(SELECT 1 FROM rpis WHERE id = ?1)", id)
    }

    fn contains_rpi_named(&mut self, name: &str) -> Result<bool, StoreError> {
        self.exists_named("SELECT EXISTS(SELECT 1 FROM rpis WHERE name = ?1)", name)
    }

    fn contains_peripheral(&mut self, id: u64) -> Result<bool, StoreError> {
        self.exists(
            "SELECT EXISTS(SELECT 1 FROM peripherals WHERE id = ?1)",
            id,
        )
    }

    fn contains_peripheral_named(&mut self, name: &str) -> Result<bool, StoreError> {
        self.exists_named(
            "SELECT EXISTS(SELECT 1 FROM peripherals WHERE name = ?1)",
            name,
        )
    }

    fn contains_soil_moisture_sensor(&mut self, id: u64) -> Result<bool, StoreError> {
        self.exists(
            "SELECT EXISTS(SELECT 1 FROM soil_moisture_sensors WHERE peripheral_id = ?1)",
            id,
        )
    }

    fn contains_irrigation_system(&mut self, id: u64) -> Result<bool, StoreError> {
        self.exists(
            "SELECT EXISTS(SELECT 1 FROM irrigation_systems WHERE peripheral_id = ?1)",
            id,
        )
    }

    fn insert_rpi(&mut self, name: &str, location: &str) -> Result<u64, StoreError> {
        self.conn.execute(
            "INSERT INTO rpis (name, location) VALUES (?1, ?2)",
            params![name, location],
        )?;
        row_id(self.conn.last_insert_rowid())
    }

    fn insert_soil_moisture_sensor(
        &mut self,
        name: &str,
        rpi_id: Option<u64>,
        floor: f64,
        ceil: f64,
    ) -> Result<u64, StoreError> {
        debug!(
            "Inserting soil moisture sensor {{name={}, floor={}, ceil={}}}",
            name, floor, ceil
        );
        self.insert_peripheral(name, rpi_id, "soil_moisture_sensors", Some((floor, ceil)))
    }

    fn insert_irrigation_system(&mut self, name: &str, rpi_id: Option<u64>) -> Result<u64, StoreError> {
        self.insert_peripheral(name, rpi_id, "irrigation_systems", None)
    }

    fn insert_soil_moisture_measurement(&mut self, sensor_id: u64, value: f64) -> Result<u64, StoreError> {
        self.conn.execute(
            "INSERT INTO soil_moisture_measurements (sensor_id, measurement) VALUES (?1, ?2)",
            params![sql_int(sensor_id)?, value],
        )?;
        row_id(self.conn.last_insert_rowid())
    }

    fn update_peripheral_ownership(
        &mut self,
        peripheral_id: u64,
        rpi_id: u64,
        orphan: bool,
    ) -> Result<(), StoreError> {
        let peripheral_id = sql_int(peripheral_id)?;
        let rpi_id = sql_int(rpi_id)?;
        let tx = self.conn.transaction()?;

        let removed = tx.execute(
            "DELETE FROM rpi_peripheral_edges WHERE peripheral_id = ?1",
            params![peripheral_id],
        )?;
        if removed == 0 {
            debug!("Peripheral {} had no owning rpi", peripheral_id);
        }

        if !orphan {
            tx.execute(
                "INSERT INTO rpi_peripheral_edges (rpi_id, peripheral_id) VALUES (?1, ?2)",
                params![rpi_id, peripheral_id],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn replace_irrigation_schedule(
        &mut self,
        irrigation_system_id: u64,
        schedules: &[DailySchedule],
    ) -> Result<(), StoreError> {
        let system_id = sql_int(irrigation_system_id)?;
        let tx = self.conn.transaction()?;

        tx.execute(
            "DELETE FROM irrigation_schedules WHERE irrigation_system_id = ?1",
            params![system_id],
        )?;
        for entry in schedules {
            tx.execute(
                "INSERT INTO irrigation_schedules
                    (irrigation_system_id, day_of_week_index, water_time_military, water_duration_ms)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    system_id,
                    entry.day_of_week_index,
                    entry.water_time_military,
                    sql_int(entry.water_duration_ms)?
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
impl SqliteStore {
    fn count(&self, table: &str) -> i64 {
        self.conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    fn owner_of(&self, peripheral_id: u64) -> Option<i64> {
        use rusqlite::OptionalExtension;
        self.conn
            .query_row(
                "SELECT rpi_id FROM rpi_peripheral_edges WHERE peripheral_id = ?1",
                params![sql_int(peripheral_id).unwrap()],
                |row| row.get(0),
            )
            .optional()
            .unwrap()
    }
}
