// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fieldwatch-rs

//! Database module - append-only store of every computed reading

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::config::DatabaseConfig;
use crate::telemetry::{GeneratorBatch, GeneratorRecord};

/// Database manager
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create the database
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&config.path)?;

        // Configure SQLite for sustained append throughput
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;
            PRAGMA temp_store = MEMORY;
        "#,
        )?;

        let db = Self { conn: Arc::new(Mutex::new(conn)) };
        db.create_tables()?;

        info!("Database opened at {:?}", config.path);
        Ok(db)
    }

    #[cfg(test)]
    pub(crate) fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn: Arc::new(Mutex::new(conn)) };
        db.create_tables()?;
        Ok(db)
    }

    fn create_tables(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS readings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                generator_id INTEGER NOT NULL,
                timestamp TEXT NOT NULL,
                phase_a_current REAL,
                phase_b_current REAL,
                phase_c_current REAL,
                frequency REAL,
                reactive_power REAL,
                active_power REAL,
                line_voltage REAL,
                excitation_voltage REAL,
                excitation_current REAL,
                estimated_excitation_current REAL,
                deviation_ratio REAL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_readings_generator ON readings(generator_id);
            CREATE INDEX IF NOT EXISTS idx_readings_timestamp ON readings(timestamp);
            CREATE INDEX IF NOT EXISTS idx_readings_generator_timestamp
                ON readings(generator_id, timestamp);
        "#,
        )?;

        Ok(())
    }

    /// Append one generator's reading
    pub fn append_reading(&self, record: &GeneratorRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        Self::insert_reading(&conn, record)?;
        Ok(())
    }

    /// Append a whole cycle's batch in one transaction
    pub fn append_batch(&self, batch: &GeneratorBatch) -> Result<usize> {
        let conn = self.conn.lock().unwrap();

        let tx = conn.unchecked_transaction()?;
        let mut count = 0;
        for record in &batch.generators {
            Self::insert_reading(&tx, record)?;
            count += 1;
        }
        tx.commit()?;

        Ok(count)
    }

    fn insert_reading(conn: &Connection, record: &GeneratorRecord) -> Result<()> {
        let timestamp = record.last_update.unwrap_or_else(Utc::now).to_rfc3339();

        conn.execute(
            r#"INSERT INTO readings (
                generator_id, timestamp, phase_a_current, phase_b_current,
                phase_c_current, frequency, reactive_power, active_power,
                line_voltage, excitation_voltage, excitation_current,
                estimated_excitation_current, deviation_ratio
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"#,
            params![
                record.generator_id,
                timestamp,
                record.phase_a_current,
                record.phase_b_current,
                record.phase_c_current,
                record.frequency,
                record.reactive_power,
                record.active_power,
                record.line_voltage,
                record.excitation_voltage,
                record.excitation_current,
                record.estimated_excitation_current,
                record.deviation_ratio,
            ],
        )?;

        Ok(())
    }

    /// Readings for one generator inside a time range, oldest first
    pub fn query_by_time_range(
        &self,
        generator_id: u16,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StoredReading>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            r#"SELECT id, generator_id, timestamp, phase_a_current, phase_b_current,
                      phase_c_current, frequency, reactive_power, active_power,
                      line_voltage, excitation_voltage, excitation_current,
                      estimated_excitation_current, deviation_ratio
               FROM readings
               WHERE generator_id = ?1 AND timestamp >= ?2 AND timestamp <= ?3
               ORDER BY timestamp ASC"#,
        )?;

        let rows = stmt.query_map(
            params![generator_id, start.to_rfc3339(), end.to_rfc3339()],
            Self::map_row,
        )?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Most recent reading for one generator
    pub fn query_latest(&self, generator_id: u16) -> Result<Option<StoredReading>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            r#"SELECT id, generator_id, timestamp, phase_a_current, phase_b_current,
                      phase_c_current, frequency, reactive_power, active_power,
                      line_voltage, excitation_voltage, excitation_current,
                      estimated_excitation_current, deviation_ratio
               FROM readings
               WHERE generator_id = ?1
               ORDER BY timestamp DESC LIMIT 1"#,
        )?;

        let mut rows = stmt.query_map(params![generator_id], Self::map_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredReading> {
        Ok(StoredReading {
            id: row.get(0)?,
            generator_id: row.get(1)?,
            timestamp: row.get(2)?,
            phase_a_current: row.get(3)?,
            phase_b_current: row.get(4)?,
            phase_c_current: row.get(5)?,
            frequency: row.get(6)?,
            reactive_power: row.get(7)?,
            active_power: row.get(8)?,
            line_voltage: row.get(9)?,
            excitation_voltage: row.get(10)?,
            excitation_current: row.get(11)?,
            estimated_excitation_current: row.get(12)?,
            deviation_ratio: row.get(13)?,
        })
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DatabaseStats> {
        let conn = self.conn.lock().unwrap();

        let reading_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM readings", [], |row| row.get(0))?;

        let generator_count: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT generator_id) FROM readings",
            [],
            |row| row.get(0),
        )?;

        let size_bytes: i64 = conn
            .query_row(
                "SELECT page_count * page_size as size FROM pragma_page_count(), pragma_page_size()",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        Ok(DatabaseStats {
            reading_count: reading_count as usize,
            generator_count: generator_count as usize,
            size_bytes: size_bytes as u64,
        })
    }

    /// Delete readings older than the retention window and reclaim space
    pub fn cleanup(&self, retention_days: u32) -> Result<usize> {
        let conn = self.conn.lock().unwrap();

        let cutoff = Utc::now() - chrono::Duration::days(retention_days as i64);
        let deleted = conn.execute(
            "DELETE FROM readings WHERE timestamp < ?1",
            params![cutoff.to_rfc3339()],
        )?;

        conn.execute("VACUUM", [])?;

        info!("Cleaned up {} readings older than {} days", deleted, retention_days);
        Ok(deleted)
    }
}

#[derive(Debug, Clone)]
pub struct StoredReading {
    pub id: i64,
    pub generator_id: u16,
    pub timestamp: String,
    pub phase_a_current: f64,
    pub phase_b_current: f64,
    pub phase_c_current: f64,
    pub frequency: f64,
    pub reactive_power: f64,
    pub active_power: f64,
    pub line_voltage: f64,
    pub excitation_voltage: f64,
    pub excitation_current: f64,
    pub estimated_excitation_current: f64,
    pub deviation_ratio: f64,
}

#[derive(Debug, Clone)]
pub struct DatabaseStats {
    pub reading_count: usize,
    pub generator_count: usize,
    pub size_bytes: u64,
}
