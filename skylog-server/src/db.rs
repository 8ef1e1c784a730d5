//! SQLite persistence — WAL mode, schema derived from record descriptors.
//!
//! One writer connection owns the primary database handle; replay workers
//! and CLI queries open their own (read-only where possible) connections.
//! Pragmas per the appliance profile: `journal_mode=WAL`, `synchronous=OFF`.

use std::collections::HashMap;
use std::path::Path;

use rusqlite::{params, params_from_iter, Connection, OpenFlags, Result as SqlResult};
use serde::Serialize;

use skylog_core::record;
use skylog_core::summary::FlightLog;

/// Sessions qualify as flights only past these floors (short taxi-only
/// sessions stay out of the logbook listing).
const FLIGHT_FILTER: &str = "duration > 1 AND distance > 1 AND ((max_alt - start_alt) > 350)";

const FLIGHTS_PAGE_SIZE: i64 = 10;

/// A marshalled batch bound for one table.
#[derive(Debug, Default)]
pub struct TableBatch {
    pub insert_sql: String,
    pub cols_per_row: usize,
    pub rows: Vec<Vec<String>>,
}

/// Handle on the flight-log database.
pub struct FlightDb {
    conn: Connection,
}

impl FlightDb {
    /// Open or create the database. Tables are created from the registered
    /// record shapes when the file does not exist yet.
    pub fn open(path: &str) -> SqlResult<Self> {
        let (conn, fresh) = if path == ":memory:" {
            (Connection::open_in_memory()?, true)
        } else {
            if let Some(parent) = Path::new(path).parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            let fresh = !Path::new(path).exists();
            (Connection::open(path)?, fresh)
        };

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=OFF;")?;
        if fresh {
            create_tables(&conn)?;
        }

        Ok(FlightDb { conn })
    }

    /// Open an existing database read-only (replay workers, archive queries).
    pub fn open_readonly(path: &str) -> SqlResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(FlightDb { conn })
    }

    /// Open in-memory database (for testing).
    pub fn open_memory() -> SqlResult<Self> {
        Self::open(":memory:")
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Immediate single-row insert; returns the autoincrement id. Used for
    /// the `timestamp` and `startup` tables, whose ids must be resolved
    /// synchronously.
    pub fn insert_row(&self, insert_sql: &str, values: &[String]) -> SqlResult<i64> {
        self.conn
            .execute(insert_sql, params_from_iter(values.iter()))?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Write one cycle's batches in a single transaction, chunked within the
    /// placeholder and byte budgets. Any statement error rolls the whole
    /// cycle back. Returns rows written.
    pub fn write_batches(
        &mut self,
        batches: &HashMap<&'static str, TableBatch>,
    ) -> SqlResult<usize> {
        let tx = self.conn.transaction()?;
        let mut written = 0usize;
        for batch in batches.values() {
            for chunk in record::chunk_batch(&batch.insert_sql, batch.cols_per_row, &batch.rows) {
                tx.execute(&chunk.sql, params_from_iter(chunk.params.iter()))?;
                written += chunk.rows;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    /// Persist the session summary into its startup row.
    pub fn update_flight_log(&mut self, log: &FlightLog, session_id: i64) -> SqlResult<usize> {
        let tx = self.conn.transaction()?;
        let n = tx.execute(
            "UPDATE startup SET
                 start_airport_id = ?1, start_airport_name = ?2, start_timestamp = ?3,
                 start_localtime = ?4, start_tz = ?5, start_lat = ?6, start_lng = ?7,
                 start_alt = ?8, end_airport_id = ?9, end_airport_name = ?10,
                 end_timestamp = ?11, end_localtime = ?12, end_tz = ?13, end_lat = ?14,
                 end_lng = ?15, max_alt = ?16, duration = ?17, distance = ?18,
                 groundspeed = ?19, route = ?20
             WHERE id = ?21",
            params![
                log.start_airport_id,
                log.start_airport_name,
                log.start_timestamp,
                log.start_localtime,
                log.start_tz,
                log.start_lat,
                log.start_lng,
                log.start_alt,
                log.end_airport_id,
                log.end_airport_name,
                log.end_timestamp,
                log.end_localtime,
                log.end_tz,
                log.end_lat,
                log.end_lng,
                log.max_alt,
                log.duration,
                log.distance,
                log.groundspeed,
                log.route,
                session_id,
            ],
        )?;
        tx.commit()?;
        Ok(n)
    }

    /// Delete all rows belonging to one flight, then its startup row.
    pub fn delete_flight(&mut self, flight: i64) -> SqlResult<usize> {
        let tx = self.conn.transaction()?;
        let mut deleted = 0usize;
        for table in ["events", "messages", "es_messages", "traffic", "mySituation"] {
            let sql = format!("DELETE FROM {table} WHERE startup_id = ?1");
            deleted += tx.execute(&sql, params![flight])?;
        }
        deleted += tx.execute("DELETE FROM startup WHERE id = ?1", params![flight])?;
        tx.commit()?;
        Ok(deleted)
    }

    // -----------------------------------------------------------------------
    // Archive queries
    // -----------------------------------------------------------------------

    pub fn flight_exists(&self, flight: i64) -> SqlResult<bool> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM startup WHERE id = ?1",
            params![flight],
            |r| r.get(0),
        )?;
        Ok(n > 0)
    }

    fn count(&self, sql: &str) -> i64 {
        self.conn.query_row(sql, [], |r| r.get(0)).unwrap_or(0)
    }

    pub fn stats(&self) -> DbStats {
        DbStats {
            flights: self.count("SELECT COUNT(*) FROM startup"),
            situations: self.count("SELECT COUNT(*) FROM mySituation"),
            events: self.count("SELECT COUNT(*) FROM events"),
            traffic: self.count("SELECT COUNT(*) FROM traffic"),
            uat_messages: self.count("SELECT COUNT(*) FROM messages"),
            es_messages: self.count("SELECT COUNT(*) FROM es_messages"),
            buckets: self.count("SELECT COUNT(*) FROM timestamp"),
        }
    }

    /// Flights that look like real flights, most recent first, paged.
    pub fn list_flights(&self, page: i64) -> SqlResult<(i64, Vec<FlightRow>)> {
        let offset = (page.max(1) - 1) * FLIGHTS_PAGE_SIZE;
        let total = self.count(&format!(
            "SELECT COUNT(*) FROM startup WHERE {FLIGHT_FILTER}"
        ));

        let sql = format!(
            "SELECT id, start_airport_id, start_localtime, end_airport_id, end_localtime,
                    duration, distance, max_alt, route
             FROM startup WHERE {FLIGHT_FILTER}
             ORDER BY id DESC LIMIT {FLIGHTS_PAGE_SIZE} OFFSET ?1"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![offset], |r| {
                Ok(FlightRow {
                    id: r.get(0)?,
                    start_airport_id: r.get(1)?,
                    start_localtime: r.get(2)?,
                    end_airport_id: r.get(3)?,
                    end_localtime: r.get(4)?,
                    duration: r.get(5)?,
                    distance: r.get(6)?,
                    max_alt: r.get(7)?,
                    route: r.get(8)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok((total, rows))
    }

    /// Events for one flight, oldest first, capped at 1000.
    pub fn events_for_flight(&self, flight: i64) -> SqlResult<Vec<EventRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT event, lat, lng, localtime, airport_id, airport_name, timestamp, timestamp_id
             FROM events WHERE startup_id = ?1
             ORDER BY timestamp_id ASC LIMIT 1000",
        )?;
        let rows = stmt
            .query_map(params![flight], |r| {
                Ok(EventRow {
                    event: r.get(0)?,
                    lat: r.get(1)?,
                    lng: r.get(2)?,
                    localtime: r.get(3)?,
                    airport_id: r.get(4)?,
                    airport_name: r.get(5)?,
                    timestamp: r.get(6)?,
                    bucket_ms: r.get(7)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// The situation track of one flight, for export.
    pub fn export_situation(&self, flight: i64) -> SqlResult<Vec<SituationRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT Lat, Lng, Alt, Pressure_alt, GroundSpeed, TrueCourse, GPSTime, timestamp_id
             FROM mySituation WHERE startup_id = ?1
             ORDER BY timestamp_id ASC",
        )?;
        let rows = stmt
            .query_map(params![flight], |r| {
                Ok(SituationRow {
                    lat: r.get(0)?,
                    lng: r.get(1)?,
                    alt: r.get(2)?,
                    pressure_alt: r.get(3)?,
                    ground_speed: r.get(4)?,
                    true_course: r.get(5)?,
                    gps_time: r.get(6)?,
                    bucket_ms: r.get(7)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    // -----------------------------------------------------------------------
    // Replay tracks
    // -----------------------------------------------------------------------

    /// Raw message rows for replay, in bucket order. `table` must be one of
    /// the two message tables.
    pub fn message_track(
        &self,
        table: &str,
        flight: i64,
        after_ms: i64,
    ) -> SqlResult<Vec<(i64, String)>> {
        if table != "messages" && table != "es_messages" {
            return Err(rusqlite::Error::InvalidQuery);
        }
        let sql = format!(
            "SELECT timestamp_id, data FROM {table}
             WHERE startup_id = ?1 AND timestamp_id > ?2
             ORDER BY timestamp_id ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![flight, after_ms], |r| Ok((r.get(0)?, r.get(1)?)))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Ownship fields needed to reconstruct situation during replay.
    pub fn situation_track(&self, flight: i64, after_ms: i64) -> SqlResult<Vec<ReplaySituation>> {
        let mut stmt = self.conn.prepare(
            "SELECT Lat, Lng, Pressure_alt, Alt, NACp, GroundSpeed, TrueCourse, timestamp_id
             FROM mySituation
             WHERE startup_id = ?1 AND timestamp_id > ?2
             ORDER BY timestamp_id ASC",
        )?;
        let rows = stmt
            .query_map(params![flight, after_ms], |r| {
                Ok(ReplaySituation {
                    lat: r.get(0)?,
                    lng: r.get(1)?,
                    pressure_alt: r.get(2)?,
                    alt: r.get(3)?,
                    nacp: r.get::<_, i64>(4)? as u8,
                    ground_speed: r.get(5)?,
                    true_course: r.get(6)?,
                    bucket_ms: r.get(7)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }
}

fn create_tables(conn: &Connection) -> SqlResult<()> {
    for spec in record::registry() {
        conn.execute(&spec.create_stmt(), [])?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct DbStats {
    pub flights: i64,
    pub situations: i64,
    pub events: i64,
    pub traffic: i64,
    pub uat_messages: i64,
    pub es_messages: i64,
    pub buckets: i64,
}

#[derive(Debug, Serialize)]
pub struct FlightRow {
    pub id: i64,
    pub start_airport_id: String,
    pub start_localtime: String,
    pub end_airport_id: String,
    pub end_localtime: String,
    pub duration: i64,
    pub distance: f64,
    pub max_alt: f64,
    pub route: String,
}

#[derive(Debug, Serialize)]
pub struct EventRow {
    pub event: String,
    pub lat: f64,
    pub lng: f64,
    pub localtime: String,
    pub airport_id: String,
    pub airport_name: String,
    pub timestamp: i64,
    pub bucket_ms: i64,
}

#[derive(Debug, Serialize)]
pub struct SituationRow {
    pub lat: f64,
    pub lng: f64,
    pub alt: f64,
    pub pressure_alt: f64,
    pub ground_speed: f64,
    pub true_course: f64,
    pub gps_time: String,
    pub bucket_ms: i64,
}

#[derive(Debug, Clone)]
pub struct ReplaySituation {
    pub lat: f64,
    pub lng: f64,
    pub pressure_alt: f64,
    pub alt: f64,
    pub nacp: u8,
    pub ground_speed: f64,
    pub true_course: f64,
    pub bucket_ms: i64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
