//! Record descriptors — the schema layer.
//!
//! Each persisted shape registers an ordered field table: column name, SQLite
//! column type, and a textual marshalling of each value. Table DDL, INSERT
//! templates, and chunked bulk-insert statements are all derived from these
//! descriptors, so the write pipeline stays shape-agnostic.
//!
//! Descriptors list only persistable scalar fields; a field named `id` is
//! never listed (every table gets its own autoincrement primary key). Tables
//! other than `timestamp` and `startup` additionally carry `timestamp_id`
//! and `startup_id` linking columns, appended by the pipeline at write time.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::buckets::TimeBucket;
use crate::summary::FlightLog;
use crate::types::{
    Dump1090TermMessage, EsMessage, FlightEventRecord, SettingsSnapshot, SituationData,
    StatusSnapshot, TrafficInfo, UatMessage,
};

/// SQLITE_MAX_VARIABLE_NUMBER.
pub const MAX_PLACEHOLDERS: usize = 999;
/// Ceiling on the byte length of a single bulk INSERT.
pub const MAX_QUERY_BYTES: usize = 750_000;

// ---------------------------------------------------------------------------
// Column descriptors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// bool / int / uint.
    Integer,
    /// f32 / f64.
    Real,
    /// Plain strings.
    Text,
    /// Structured values persisted via their string form (times, etc).
    Stringly,
}

impl ColumnType {
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
            ColumnType::Stringly => "STRING",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: ColumnType,
}

impl FieldSpec {
    pub const fn new(name: &'static str, ty: ColumnType) -> Self {
        FieldSpec { name, ty }
    }
}

/// A shape that can be persisted: a table name, an ordered field table, and
/// a marshaller producing one textual value per field.
pub trait LogRecord {
    const TABLE: &'static str;
    fn fields() -> &'static [FieldSpec];
    fn values(&self) -> Vec<String>;
}

/// Tables other than `timestamp` and `startup` carry linking columns.
pub fn has_link_columns(table: &str) -> bool {
    table != "timestamp" && table != "startup"
}

// ---------------------------------------------------------------------------
// Marshalling
// ---------------------------------------------------------------------------

pub fn marshal_bool(v: bool) -> String {
    if v {
        "1".to_string()
    } else {
        "0".to_string()
    }
}

pub fn marshal_int(v: i64) -> String {
    v.to_string()
}

pub fn marshal_uint(v: u64) -> String {
    v.to_string()
}

/// Floats keep a 10-digit fraction so archives are byte-stable.
pub fn marshal_float(v: f64) -> String {
    format!("{v:.10}")
}

pub fn marshal_time(v: &DateTime<Utc>) -> String {
    v.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn marshal_opt_time(v: &Option<DateTime<Utc>>) -> String {
    v.as_ref().map(marshal_time).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Statement derivation
// ---------------------------------------------------------------------------

/// CREATE TABLE statement for a descriptor set.
pub fn create_table_stmt(table: &str, fields: &[FieldSpec]) -> String {
    let mut cols: Vec<String> = fields
        .iter()
        .map(|f| format!("{} {}", f.name, f.ty.sql_type()))
        .collect();
    if has_link_columns(table) {
        cols.push("timestamp_id INTEGER".to_string());
        cols.push("startup_id INTEGER".to_string());
    }
    format!(
        "CREATE TABLE {} (id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT, {})",
        table,
        cols.join(", ")
    )
}

/// Single-row INSERT template for a descriptor set.
pub fn insert_template(table: &str, fields: &[FieldSpec]) -> String {
    let mut names: Vec<&str> = fields.iter().map(|f| f.name).collect();
    if has_link_columns(table) {
        names.push("timestamp_id");
        names.push("startup_id");
    }
    let placeholders = vec!["?"; names.len()].join(",");
    format!(
        "INSERT INTO {} ({}) VALUES({})",
        table,
        names.join(","),
        placeholders
    )
}

/// Number of bound columns per row for a table, linking columns included.
pub fn columns_per_row(table: &str, fields: &[FieldSpec]) -> usize {
    fields.len() + if has_link_columns(table) { 2 } else { 0 }
}

// ---------------------------------------------------------------------------
// Batch chunking
// ---------------------------------------------------------------------------

/// One executable INSERT carrying a bounded number of rows.
#[derive(Debug)]
pub struct BatchChunk {
    pub sql: String,
    pub params: Vec<String>,
    pub rows: usize,
}

/// Split a batch of marshalled rows into multi-row INSERT statements, each
/// within the placeholder and byte budgets. The statement byte accounting
/// includes the bound value lengths, keeping far clear of the engine's
/// query-size ceiling.
pub fn chunk_batch(insert_sql: &str, cols_per_row: usize, rows: &[Vec<String>]) -> Vec<BatchChunk> {
    let max_rows_per_chunk = MAX_PLACEHOLDERS / cols_per_row.max(1);
    let row_group = format!(", ({})", vec!["?"; cols_per_row].join(","));

    let mut chunks = Vec::new();
    let mut remaining = rows;

    while !remaining.is_empty() {
        let mut sql = String::new();
        let mut params: Vec<String> = Vec::new();
        let mut query_size = 0usize;
        let mut n = 0usize;

        while !remaining.is_empty() && n < max_rows_per_chunk && query_size < MAX_QUERY_BYTES {
            if sql.is_empty() {
                sql.push_str(insert_sql);
                query_size += insert_sql.len();
            } else {
                sql.push_str(&row_group);
                query_size += row_group.len();
            }
            let row = &remaining[0];
            for v in row {
                query_size += v.len();
            }
            params.extend(row.iter().cloned());
            remaining = &remaining[1..];
            n += 1;
        }

        chunks.push(BatchChunk {
            sql,
            params,
            rows: n,
        });
    }

    chunks
}

// ---------------------------------------------------------------------------
// Registered shapes
// ---------------------------------------------------------------------------

/// Table name + field table, for schema creation and template derivation.
#[derive(Debug, Clone, Copy)]
pub struct TableSpec {
    pub table: &'static str,
    pub fields: &'static [FieldSpec],
}

impl TableSpec {
    pub fn of<R: LogRecord>() -> Self {
        TableSpec {
            table: R::TABLE,
            fields: R::fields(),
        }
    }

    pub fn create_stmt(&self) -> String {
        create_table_stmt(self.table, self.fields)
    }

    pub fn insert_stmt(&self) -> String {
        insert_template(self.table, self.fields)
    }

    pub fn cols_per_row(&self) -> usize {
        columns_per_row(self.table, self.fields)
    }
}

/// Every shape the pipeline persists, in table-creation order.
pub fn registry() -> Vec<TableSpec> {
    vec![
        TableSpec::of::<TimestampRecord>(),
        TableSpec::of::<SituationData>(),
        TableSpec::of::<StatusSnapshot>(),
        TableSpec::of::<SettingsSnapshot>(),
        TableSpec::of::<TrafficInfo>(),
        TableSpec::of::<UatMessage>(),
        TableSpec::of::<EsMessage>(),
        TableSpec::of::<Dump1090TermMessage>(),
        TableSpec::of::<FlightLog>(),
        TableSpec::of::<FlightEventRecord>(),
    ]
}

// ---------------------------------------------------------------------------
// Descriptor implementations
// ---------------------------------------------------------------------------

/// Persisted form of a [`TimeBucket`].
#[derive(Debug, Clone)]
pub struct TimestampRecord {
    pub time_type_preference: i64,
    pub mono_clock_value: DateTime<Utc>,
    pub gps_clock_value: Option<DateTime<Utc>>,
    pub preferred_time_value: DateTime<Utc>,
    pub startup_id: i64,
}

impl TimestampRecord {
    pub fn from_bucket(bucket: &TimeBucket, session_id: i64) -> Self {
        TimestampRecord {
            time_type_preference: bucket.kind.as_i64(),
            mono_clock_value: bucket.mono_time,
            gps_clock_value: bucket.gps_time,
            preferred_time_value: bucket.preferred_time,
            startup_id: session_id,
        }
    }
}

impl LogRecord for TimestampRecord {
    const TABLE: &'static str = "timestamp";

    fn fields() -> &'static [FieldSpec] {
        use ColumnType::*;
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::new("Time_type_preference", Integer),
            FieldSpec::new("MonoClock_value", Stringly),
            FieldSpec::new("GPSClock_value", Stringly),
            FieldSpec::new("PreferredTime_value", Stringly),
            FieldSpec::new("StartupID", Integer),
        ];
        FIELDS
    }

    fn values(&self) -> Vec<String> {
        vec![
            marshal_int(self.time_type_preference),
            marshal_time(&self.mono_clock_value),
            marshal_opt_time(&self.gps_clock_value),
            marshal_time(&self.preferred_time_value),
            marshal_int(self.startup_id),
        ]
    }
}

impl LogRecord for SituationData {
    const TABLE: &'static str = "mySituation";

    fn fields() -> &'static [FieldSpec] {
        use ColumnType::*;
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::new("Lat", Real),
            FieldSpec::new("Lng", Real),
            FieldSpec::new("Alt", Real),
            FieldSpec::new("Pressure_alt", Real),
            FieldSpec::new("GroundSpeed", Real),
            FieldSpec::new("TrueCourse", Real),
            FieldSpec::new("VerticalSpeed", Real),
            FieldSpec::new("NACp", Integer),
            FieldSpec::new("Satellites", Integer),
            FieldSpec::new("GPSFixQuality", Integer),
            FieldSpec::new("GPSTime", Stringly),
            FieldSpec::new("GPSValid", Integer),
        ];
        FIELDS
    }

    fn values(&self) -> Vec<String> {
        vec![
            marshal_float(self.lat),
            marshal_float(self.lng),
            marshal_float(self.alt),
            marshal_float(self.pressure_alt),
            marshal_float(self.ground_speed),
            marshal_float(self.true_course),
            marshal_float(self.vertical_speed),
            marshal_uint(self.nacp as u64),
            marshal_uint(self.satellites as u64),
            marshal_uint(self.gps_fix_quality as u64),
            marshal_opt_time(&self.gps_time),
            marshal_bool(self.gps_valid),
        ]
    }
}

impl LogRecord for StatusSnapshot {
    const TABLE: &'static str = "status";

    fn fields() -> &'static [FieldSpec] {
        use ColumnType::*;
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::new("UAT_messages_total", Integer),
            FieldSpec::new("ES_messages_total", Integer),
            FieldSpec::new("UAT_traffic_tracking", Integer),
            FieldSpec::new("ES_traffic_tracking", Integer),
            FieldSpec::new("GPS_satellites_locked", Integer),
            FieldSpec::new("Uptime_ms", Integer),
            FieldSpec::new("CPU_temp", Real),
            FieldSpec::new("Errors", Text),
        ];
        FIELDS
    }

    fn values(&self) -> Vec<String> {
        vec![
            marshal_uint(self.uat_messages_total),
            marshal_uint(self.es_messages_total),
            marshal_uint(self.uat_traffic_tracking as u64),
            marshal_uint(self.es_traffic_tracking as u64),
            marshal_uint(self.gps_satellites_locked as u64),
            marshal_uint(self.uptime_ms),
            marshal_float(self.cpu_temp),
            self.errors.clone(),
        ]
    }
}

impl LogRecord for SettingsSnapshot {
    const TABLE: &'static str = "settings";

    fn fields() -> &'static [FieldSpec] {
        use ColumnType::*;
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::new("ReplayLog", Integer),
            FieldSpec::new("FlightLogLevel", Integer),
            FieldSpec::new("UAT_Enabled", Integer),
            FieldSpec::new("ES_Enabled", Integer),
            FieldSpec::new("GPS_Enabled", Integer),
            FieldSpec::new("DEBUG", Integer),
        ];
        FIELDS
    }

    fn values(&self) -> Vec<String> {
        vec![
            marshal_bool(self.replay_log),
            marshal_int(self.flight_log_level),
            marshal_bool(self.uat_enabled),
            marshal_bool(self.es_enabled),
            marshal_bool(self.gps_enabled),
            marshal_bool(self.debug),
        ]
    }
}

impl LogRecord for TrafficInfo {
    const TABLE: &'static str = "traffic";

    fn fields() -> &'static [FieldSpec] {
        use ColumnType::*;
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::new("Icao_addr", Integer),
            FieldSpec::new("Tail", Text),
            FieldSpec::new("Lat", Real),
            FieldSpec::new("Lng", Real),
            FieldSpec::new("Alt", Integer),
            FieldSpec::new("Speed", Real),
            FieldSpec::new("Course", Real),
            FieldSpec::new("Vvel", Integer),
            FieldSpec::new("Squawk", Text),
            FieldSpec::new("OnGround", Integer),
            FieldSpec::new("Last_seen_ms", Integer),
        ];
        FIELDS
    }

    fn values(&self) -> Vec<String> {
        vec![
            marshal_uint(self.icao_addr as u64),
            self.tail.clone(),
            marshal_float(self.lat),
            marshal_float(self.lng),
            marshal_int(self.alt as i64),
            marshal_float(self.speed),
            marshal_float(self.course),
            marshal_int(self.vvel as i64),
            self.squawk.clone(),
            marshal_bool(self.on_ground),
            marshal_uint(self.last_seen_ms),
        ]
    }
}

impl LogRecord for UatMessage {
    const TABLE: &'static str = "messages";

    fn fields() -> &'static [FieldSpec] {
        use ColumnType::*;
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::new("data", Text),
            FieldSpec::new("signal_level", Real),
            FieldSpec::new("message_class", Integer),
        ];
        FIELDS
    }

    fn values(&self) -> Vec<String> {
        vec![
            self.data.clone(),
            marshal_float(self.signal_level),
            marshal_uint(self.message_class as u64),
        ]
    }
}

impl LogRecord for EsMessage {
    const TABLE: &'static str = "es_messages";

    fn fields() -> &'static [FieldSpec] {
        use ColumnType::*;
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::new("data", Text),
            FieldSpec::new("signal_level", Real),
        ];
        FIELDS
    }

    fn values(&self) -> Vec<String> {
        vec![self.data.clone(), marshal_float(self.signal_level)]
    }
}

impl LogRecord for Dump1090TermMessage {
    const TABLE: &'static str = "dump1090_terminal";

    fn fields() -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[FieldSpec::new("text", ColumnType::Text)];
        FIELDS
    }

    fn values(&self) -> Vec<String> {
        vec![self.text.clone()]
    }
}

impl LogRecord for FlightEventRecord {
    const TABLE: &'static str = "events";

    fn fields() -> &'static [FieldSpec] {
        use ColumnType::*;
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::new("event", Text),
            FieldSpec::new("lat", Real),
            FieldSpec::new("lng", Real),
            FieldSpec::new("localtime", Text),
            FieldSpec::new("airport_id", Text),
            FieldSpec::new("airport_name", Text),
            FieldSpec::new("timestamp", Integer),
        ];
        FIELDS
    }

    fn values(&self) -> Vec<String> {
        vec![
            self.event.clone(),
            marshal_float(self.lat),
            marshal_float(self.lng),
            self.localtime.clone(),
            self.airport_id.clone(),
            self.airport_name.clone(),
            marshal_int(self.timestamp),
        ]
    }
}

impl LogRecord for FlightLog {
    const TABLE: &'static str = "startup";

    fn fields() -> &'static [FieldSpec] {
        use ColumnType::*;
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::new("start_airport_id", Text),
            FieldSpec::new("start_airport_name", Text),
            FieldSpec::new("start_timestamp", Integer),
            FieldSpec::new("start_localtime", Text),
            FieldSpec::new("start_tz", Text),
            FieldSpec::new("start_lat", Real),
            FieldSpec::new("start_lng", Real),
            FieldSpec::new("start_alt", Real),
            FieldSpec::new("end_airport_id", Text),
            FieldSpec::new("end_airport_name", Text),
            FieldSpec::new("end_timestamp", Integer),
            FieldSpec::new("end_localtime", Text),
            FieldSpec::new("end_tz", Text),
            FieldSpec::new("end_lat", Real),
            FieldSpec::new("end_lng", Real),
            FieldSpec::new("max_alt", Real),
            FieldSpec::new("duration", Integer),
            FieldSpec::new("distance", Real),
            FieldSpec::new("groundspeed", Integer),
            FieldSpec::new("route", Text),
        ];
        FIELDS
    }

    fn values(&self) -> Vec<String> {
        vec![
            self.start_airport_id.clone(),
            self.start_airport_name.clone(),
            marshal_int(self.start_timestamp),
            self.start_localtime.clone(),
            self.start_tz.clone(),
            marshal_float(self.start_lat),
            marshal_float(self.start_lng),
            marshal_float(self.start_alt),
            self.end_airport_id.clone(),
            self.end_airport_name.clone(),
            marshal_int(self.end_timestamp),
            self.end_localtime.clone(),
            self.end_tz.clone(),
            marshal_float(self.end_lat),
            marshal_float(self.end_lng),
            marshal_float(self.max_alt),
            marshal_int(self.duration),
            marshal_float(self.distance),
            marshal_int(self.groundspeed),
            self.route.clone(),
        ]
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
