//! The data logging pipeline.
//!
//! Producers call the [`DataLog`] handle; rows flow through a bounded
//! ingress channel into the timestamper task (which assigns the current
//! 250 ms bucket and stamps `bucket_ms`), then into the write queue. The
//! writer task owns the database handle and drains the queue once per
//! second into a single chunked, transactional bulk insert. `timestamp` and
//! `startup` rows bypass the batch so their autoincrement ids resolve
//! synchronously.
//!
//! The flight-state inferrer and session summary live here too: every
//! situation sample drives the state machine, and transitions append event
//! rows and close out legs on the summary. A watchdog reconciles the
//! `replay_log` setting with the running state once per second, and the
//! shutdown path drains the queue before the database handle closes, so a
//! clean stop loses nothing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use skylog_core::buckets::BucketLedger;
use skylog_core::clock::ApplianceClock;
use skylog_core::flight::{FlightState, FlightStateMachine, LegEffect};
use skylog_core::record::{self, LogRecord, TableSpec, TimestampRecord};
use skylog_core::summary::FlightLog;
use skylog_core::types::{
    Dump1090TermMessage, EsMessage, FlightEventRecord, FlightLogLevel, Result, SettingsSnapshot,
    SituationData, SkylogError, StatusSnapshot, TrafficInfo, UatMessage,
};
use skylog_core::FlightThresholds;

use crate::airports;
use crate::config::Config;
use crate::db::{FlightDb, TableBatch};
use crate::replay::ReplayControls;

/// Producers never block: over-capacity sends are dropped.
pub const INGRESS_CAPACITY: usize = 10_240;
const WRITE_QUEUE_CAPACITY: usize = 10_240;
const UPDATE_SIGNAL_CAPACITY: usize = 1_024;

/// A write cycle longer than this raises a system error.
const WRITE_BEHIND_WARN: Duration = Duration::from_secs(10);

/// The session summary is re-persisted this often while logging.
const SUMMARY_UPDATE_PERIOD_SECS: i64 = 60;

static TZ_FINDER: LazyLock<tzf_rs::DefaultFinder> = LazyLock::new(tzf_rs::DefaultFinder::new);

// ---------------------------------------------------------------------------
// Settings + shared state
// ---------------------------------------------------------------------------

/// Pipeline-relevant settings, derived from [`Config`] and mutable at
/// runtime (the watchdog watches `replay_log`).
#[derive(Debug, Clone)]
pub struct LogSettings {
    pub replay_log: bool,
    pub level: FlightLogLevel,
    pub debug: bool,
    pub uat_enabled: bool,
    pub es_enabled: bool,
    pub gps_enabled: bool,
    pub db_path: String,
    pub airport_db_path: String,
    pub thresholds: FlightThresholds,
}

impl LogSettings {
    pub fn from_config(config: &Config) -> Self {
        LogSettings {
            replay_log: config.logging.replay_log,
            level: config.logging.flight_log_level,
            debug: config.logging.debug,
            uat_enabled: true,
            es_enabled: true,
            gps_enabled: true,
            db_path: config.database.path.clone(),
            airport_db_path: config.database.airport_path.clone(),
            thresholds: config.flight.thresholds(),
        }
    }

    pub fn snapshot(&self) -> SettingsSnapshot {
        SettingsSnapshot {
            replay_log: self.replay_log,
            flight_log_level: self.level.as_i64(),
            uat_enabled: self.uat_enabled,
            es_enabled: self.es_enabled,
            gps_enabled: self.gps_enabled,
            debug: self.debug,
        }
    }
}

/// Everything the pipeline components share. One instance per process,
/// owned by whoever runs the watchdog; no hidden globals.
pub struct SharedState {
    pub clock: ApplianceClock,
    pub settings: RwLock<LogSettings>,
    /// Process-wide ownship situation; replay overwrites it.
    pub ownship: Mutex<SituationData>,
    /// Session summary, mutated by the state inferrer, persisted by the
    /// writer on the update signal.
    pub flightlog: Mutex<FlightLog>,
    pub flight_state: Mutex<FlightStateMachine>,
    /// Bucket ledger. Appended by the timestamper only; consumers copy the
    /// bucket index, never hold one across a potential append.
    pub buckets: Mutex<BucketLedger>,
    pub replay: ReplayControls,

    pub pipeline_running: AtomicBool,
    pub ready_to_write: AtomicBool,
    pub session_id: AtomicI64,
    pub last_situation_log_ms: AtomicU64,

    /// Operator-visible error strings (exposed by the management surface).
    pub system_errors: Mutex<Vec<String>>,

    ingress: Mutex<Option<mpsc::Sender<IngressMsg>>>,
    update_signal: Mutex<Option<mpsc::Sender<()>>>,
}

impl SharedState {
    pub fn new(settings: LogSettings) -> Arc<Self> {
        let clock = ApplianceClock::new();
        let ledger = BucketLedger::new(clock.ms_since_start(), clock.mono_time());
        let machine = FlightStateMachine::new(settings.thresholds);
        Arc::new(SharedState {
            clock,
            settings: RwLock::new(settings),
            ownship: Mutex::new(SituationData::default()),
            flightlog: Mutex::new(FlightLog::default()),
            flight_state: Mutex::new(machine),
            buckets: Mutex::new(ledger),
            replay: ReplayControls::default(),
            pipeline_running: AtomicBool::new(false),
            ready_to_write: AtomicBool::new(false),
            session_id: AtomicI64::new(0),
            last_situation_log_ms: AtomicU64::new(0),
            system_errors: Mutex::new(Vec::new()),
            ingress: Mutex::new(None),
            update_signal: Mutex::new(None),
        })
    }

    pub fn add_system_error(&self, message: String) {
        warn!("{message}");
        self.system_errors.lock().unwrap().push(message);
    }
}

// ---------------------------------------------------------------------------
// Channel payloads
// ---------------------------------------------------------------------------

enum IngressMsg {
    Row {
        table: &'static str,
        values: Vec<String>,
    },
    GpsTime(DateTime<Utc>),
}

/// One marshalled row, stamped and bound for a table.
#[derive(Debug)]
pub struct LogRow {
    pub table: &'static str,
    pub values: Vec<String>,
    /// `ms_since_start` at ingress time; persisted as `timestamp_id`.
    pub bucket_ms: u64,
}

enum WriteJob {
    Row(LogRow),
    /// A freshly appended bucket whose row must be inserted immediately so
    /// the ledger can learn its id.
    NewBucket { index: usize, values: Vec<String> },
}

// ---------------------------------------------------------------------------
// Producer API
// ---------------------------------------------------------------------------

/// Cheap-to-clone producer handle. All `log_*` calls are non-blocking and
/// best-effort; rows are silently dropped when the pipeline is not accepting
/// writes or the ingress queue is full.
#[derive(Clone)]
pub struct DataLog {
    shared: Arc<SharedState>,
}

impl DataLog {
    pub fn new(shared: Arc<SharedState>) -> Self {
        DataLog { shared }
    }

    pub fn shared(&self) -> &Arc<SharedState> {
        &self.shared
    }

    fn ready(&self) -> bool {
        self.shared.settings.read().unwrap().replay_log
            && self.shared.ready_to_write.load(Ordering::SeqCst)
            && !self.shared.replay.replay_mode()
    }

    fn push(&self, table: &'static str, values: Vec<String>) {
        let guard = self.shared.ingress.lock().unwrap();
        if let Some(tx) = guard.as_ref() {
            let _ = tx.try_send(IngressMsg::Row { table, values });
        }
    }

    fn signal_summary_update(&self) {
        let guard = self.shared.update_signal.lock().unwrap();
        if let Some(tx) = guard.as_ref() {
            let _ = tx.try_send(());
        }
    }

    /// Feed one ownship situation sample: drives the flight-state machine,
    /// maintains the session summary, and (subject to the sampling gate)
    /// logs the row.
    pub fn log_situation(&self, sit: &SituationData) {
        if !self.ready() {
            return;
        }

        *self.shared.ownship.lock().unwrap() = sit.clone();

        let mut flog = self.shared.flightlog.lock().unwrap();
        if !flog.started() {
            if sit.gps_valid && self.shared.clock.has_real_time() {
                self.start_flight_log(&mut flog, sit);
            } else {
                // No trustworthy clock or position yet; the sample is useless.
                return;
            }
        }

        flog.duration = (self.shared.clock.ms_since_start() / 1000) as i64;

        let transition = {
            let mut machine = self.shared.flight_state.lock().unwrap();
            machine.advance(sit.ground_speed)
        };
        if let Some(t) = transition {
            if t.restart {
                warn!(state = ?t.state, "restart or delayed start detected while already moving");
            }
            match t.leg {
                LegEffect::TouchAndGo => self.stop_flight_log(&mut flog, sit, false),
                LegEffect::FullStop => self.stop_flight_log(&mut flog, sit, true),
                LegEffect::None => {}
            }
            if let Some(event) = t.event {
                self.add_flight_event(sit, event.name());
            }
        }

        flog.note_altitude(sit.alt);
        flog.note_groundspeed(sit.ground_speed);

        let now_ms = self.shared.clock.ms_since_start();
        let level = self.shared.settings.read().unwrap().level;
        if let Some(min_interval) = level.situation_interval_ms() {
            let since =
                now_ms.saturating_sub(self.shared.last_situation_log_ms.load(Ordering::SeqCst));
            if since < min_interval {
                return;
            }
        }

        // Only bother writing rows while we are actually moving.
        let state = self.shared.flight_state.lock().unwrap().state();
        if matches!(state, FlightState::Flying | FlightState::Taxiing) {
            self.push(SituationData::TABLE, sit.values());
            flog.note_position(sit.lat, sit.lng);
        }

        if flog.duration % SUMMARY_UPDATE_PERIOD_SECS == 0 {
            self.signal_summary_update();
        }

        self.shared
            .last_situation_log_ms
            .store(now_ms, Ordering::SeqCst);
    }

    pub fn log_status(&self, status: &StatusSnapshot) {
        if self.ready() {
            self.push(StatusSnapshot::TABLE, status.values());
        }
    }

    /// Snapshot the current settings into the archive.
    pub fn log_settings(&self) {
        if !self.ready() {
            return;
        }
        let snapshot = self.shared.settings.read().unwrap().snapshot();
        self.push(SettingsSnapshot::TABLE, snapshot.values());
    }

    pub fn log_traffic(&self, traffic: &TrafficInfo) {
        if self.ready() && self.level() == FlightLogLevel::Debug {
            self.push(TrafficInfo::TABLE, traffic.values());
        }
    }

    pub fn log_uat(&self, msg: &UatMessage) {
        if self.ready() && self.level() > FlightLogLevel::Debrief && self.flying() {
            self.push(UatMessage::TABLE, msg.values());
        }
    }

    pub fn log_es(&self, msg: &EsMessage) {
        if self.ready() && self.level() > FlightLogLevel::Debrief && self.flying() {
            self.push(EsMessage::TABLE, msg.values());
        }
    }

    pub fn log_dump1090_terminal(&self, msg: &Dump1090TermMessage) {
        let gated = {
            let s = self.shared.settings.read().unwrap();
            s.debug && s.level == FlightLogLevel::Debug
        };
        if gated && self.ready() {
            self.push(Dump1090TermMessage::TABLE, msg.values());
        }
    }

    /// A GPS time fix: synchronizes the real-time clock and opens a
    /// GPS-kind bucket.
    pub fn set_clock_from_gps(&self, time: DateTime<Utc>) {
        self.shared.clock.set_real_time(time);
        let guard = self.shared.ingress.lock().unwrap();
        if let Some(tx) = guard.as_ref() {
            let _ = tx.try_send(IngressMsg::GpsTime(time));
        }
    }

    fn level(&self) -> FlightLogLevel {
        self.shared.settings.read().unwrap().level
    }

    fn flying(&self) -> bool {
        self.shared.flight_state.lock().unwrap().state() == FlightState::Flying
    }

    // -----------------------------------------------------------------------
    // Session summary + events
    // -----------------------------------------------------------------------

    /// Runs once per session, the first time a situation arrives with a
    /// valid position and a synchronized clock.
    fn start_flight_log(&self, flog: &mut FlightLog, sit: &SituationData) {
        flog.start_lat = sit.lat;
        flog.start_lng = sit.lng;
        flog.start_alt = sit.alt;
        flog.max_alt = sit.alt;

        if let Some(now) = self.shared.clock.real_time_now() {
            flog.start_timestamp = now.timestamp_millis();
            flog.start_tz = zone_name(sit.lat, sit.lng);
            if let Some(local) = to_local(now, &flog.start_tz) {
                flog.start_localtime = local.format("%Y-%m-%d %H:%M:%S %Z").to_string();
            }
        }

        match self.find_airport(sit.lat, sit.lng) {
            Some(apt) => {
                flog.start_airport_id = apt.faa_id.clone();
                flog.start_airport_name = apt.name;
                flog.route = apt.faa_id;
            }
            None => debug!("no airport near session start"),
        }

        info!(
            session = self.shared.session_id.load(Ordering::SeqCst),
            airport = %flog.start_airport_id,
            "flight log opened"
        );
        self.signal_summary_update();
    }

    /// Runs on every landing. Touch-and-goes keep the session open; the
    /// route string records the stop either way.
    fn stop_flight_log(&self, flog: &mut FlightLog, sit: &SituationData, full_stop: bool) {
        flog.end_lat = sit.lat;
        flog.end_lng = sit.lng;

        if let Some(now) = self.shared.clock.real_time_now() {
            flog.end_timestamp = now.timestamp();
            flog.end_tz = zone_name(sit.lat, sit.lng);
            if let Some(local) = to_local(now, &flog.end_tz) {
                flog.end_localtime = local.format("%Y-%m-%d %H:%M:%S %Z").to_string();
            }
        }

        if let Some(apt) = self.find_airport(sit.lat, sit.lng) {
            flog.end_airport_id = apt.faa_id.clone();
            flog.end_airport_name = apt.name;
            flog.append_route_stop(&apt.faa_id, full_stop);
        }

        let name = if full_stop { "Landing" } else { "Landing (T/G)" };
        self.add_flight_event(sit, name);
        self.signal_summary_update();
    }

    /// Append an event row stamped with position, localtime, and the
    /// nearest airport.
    fn add_flight_event(&self, sit: &SituationData, name: &str) {
        let mut event = FlightEventRecord {
            event: name.to_string(),
            lat: sit.lat,
            lng: sit.lng,
            ..Default::default()
        };

        if let Some(now) = self.shared.clock.real_time_now() {
            event.timestamp = now.timestamp();
            let tz = zone_name(sit.lat, sit.lng);
            if let Some(local) = to_local(now, &tz) {
                event.localtime = local.format("%H:%M:%S %Z").to_string();
            }
        }

        if let Some(apt) = self.find_airport(sit.lat, sit.lng) {
            event.airport_id = apt.faa_id;
            event.airport_name = apt.name;
        }

        debug!(event = %event.event, "flight event");
        self.push(FlightEventRecord::TABLE, event.values());
    }

    fn find_airport(&self, lat: f64, lng: f64) -> Option<airports::Airport> {
        let path = self.shared.settings.read().unwrap().airport_db_path.clone();
        match airports::find_airport(&path, lat, lng) {
            Ok(found) => found,
            Err(e) => {
                debug!(error = %e, "airport lookup failed");
                None
            }
        }
    }
}

fn zone_name(lat: f64, lng: f64) -> String {
    TZ_FINDER.get_tz_name(lng, lat).to_string()
}

fn to_local(time: DateTime<Utc>, tz_name: &str) -> Option<DateTime<chrono_tz::Tz>> {
    tz_name
        .parse::<chrono_tz::Tz>()
        .ok()
        .map(|tz| time.with_timezone(&tz))
}

// ---------------------------------------------------------------------------
// Pipeline tasks
// ---------------------------------------------------------------------------

/// Consume from ingress, assign buckets, stamp rows, forward to the write
/// queue. Exits when the ingress channel closes.
async fn timestamper(
    shared: Arc<SharedState>,
    mut ingress: mpsc::Receiver<IngressMsg>,
    writeq: mpsc::Sender<WriteJob>,
) {
    while let Some(msg) = ingress.recv().await {
        let session = shared.session_id.load(Ordering::SeqCst);
        let bucket_job = match msg {
            IngressMsg::Row { table, values } => {
                let job = {
                    let mut ledger = shared.buckets.lock().unwrap();
                    ledger
                        .check_bucket(
                            shared.clock.ms_since_start(),
                            shared.clock.mono_time(),
                            shared.clock.has_real_time(),
                        )
                        .map(|index| WriteJob::NewBucket {
                            index,
                            values: TimestampRecord::from_bucket(
                                ledger.get(index).expect("bucket just appended"),
                                session,
                            )
                            .values(),
                        })
                };
                if let Some(job) = job {
                    if writeq.send(job).await.is_err() {
                        return;
                    }
                }
                let row = LogRow {
                    table,
                    values,
                    bucket_ms: shared.clock.ms_since_start(),
                };
                if writeq.send(WriteJob::Row(row)).await.is_err() {
                    return;
                }
                continue;
            }
            IngressMsg::GpsTime(time) => {
                let mut ledger = shared.buckets.lock().unwrap();
                let index = ledger.set_bucket_from_gps(
                    shared.clock.ms_since_start(),
                    shared.clock.mono_time(),
                    time,
                );
                WriteJob::NewBucket {
                    index,
                    values: TimestampRecord::from_bucket(
                        ledger.get(index).expect("bucket just appended"),
                        session,
                    )
                    .values(),
                }
            }
        };
        if writeq.send(bucket_job).await.is_err() {
            return;
        }
    }
    debug!("timestamper drained; write queue closing");
}

type InsertPlans = HashMap<&'static str, (String, usize)>;

fn build_plans() -> InsertPlans {
    record::registry()
        .into_iter()
        .map(|spec| (spec.table, (spec.insert_stmt(), spec.cols_per_row())))
        .collect()
}

/// Owns the database. Batches rows per table and commits one transaction
/// per 1 Hz tick; bucket rows are inserted immediately; the summary-update
/// signal triggers the startup-row UPDATE.
async fn writer(
    shared: Arc<SharedState>,
    mut db: FlightDb,
    mut writeq: mpsc::Receiver<WriteJob>,
    mut update_signal: mpsc::Receiver<()>,
) {
    let plans = build_plans();
    let timestamp_insert = plans[TimestampRecord::TABLE].0.clone();

    let mut tick = tokio::time::interval(Duration::from_secs(1));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut queued: Vec<LogRow> = Vec::new();
    let mut update_open = true;

    loop {
        tokio::select! {
            job = writeq.recv() => match job {
                Some(WriteJob::Row(row)) => queued.push(row),
                Some(WriteJob::NewBucket { index, values }) => {
                    match db.insert_row(&timestamp_insert, &values) {
                        Ok(id) => shared.buckets.lock().unwrap().set_db_id(index, id),
                        Err(e) => warn!(error = %e, "timestamp insert failed"),
                    }
                }
                None => {
                    // Ingress closed and the timestamper has drained: run the
                    // final cycle, then release the database.
                    flush_cycle(&shared, &mut db, &mut queued, &plans);
                    break;
                }
            },
            signal = update_signal.recv(), if update_open => match signal {
                Some(()) => {
                    let flog = snapshot_flightlog(&shared);
                    let session = shared.session_id.load(Ordering::SeqCst);
                    if let Err(e) = db.update_flight_log(&flog, session) {
                        warn!(error = %e, "flight log update failed");
                    }
                }
                None => update_open = false,
            },
            _ = tick.tick() => flush_cycle(&shared, &mut db, &mut queued, &plans),
        }
    }

    shared.pipeline_running.store(false, Ordering::SeqCst);
    info!("data log writer stopped; database closed");
}

fn snapshot_flightlog(shared: &SharedState) -> FlightLog {
    shared.flightlog.lock().unwrap().clone()
}

/// Drain the queued rows into per-table batches and commit them in one
/// transaction. A failed cycle is dropped; the pipeline keeps accepting rows.
fn flush_cycle(
    shared: &SharedState,
    db: &mut FlightDb,
    queued: &mut Vec<LogRow>,
    plans: &InsertPlans,
) {
    if queued.is_empty() {
        return;
    }

    let started = Instant::now();
    let n_rows = queued.len();
    let session = shared.session_id.load(Ordering::SeqCst);

    let mut batches: HashMap<&'static str, TableBatch> = HashMap::new();
    for row in queued.drain(..) {
        let Some((insert_sql, cols)) = plans.get(row.table) else {
            continue;
        };
        let batch = batches.entry(row.table).or_insert_with(|| TableBatch {
            insert_sql: insert_sql.clone(),
            cols_per_row: *cols,
            rows: Vec::new(),
        });
        let mut values = row.values;
        if record::has_link_columns(row.table) {
            values.push(row.bucket_ms.to_string());
            values.push(session.to_string());
        }
        batch.rows.push(values);
    }

    match db.write_batches(&batches) {
        Ok(written) => debug!(rows = written, "write cycle committed"),
        Err(e) => error!(error = %e, rows = n_rows, "bulk insert failed; batch dropped"),
    }

    if let Some(message) = behind_schedule(started.elapsed()) {
        shared.add_system_error(message);
    }
}

/// Behind-schedule check for one write cycle.
pub fn behind_schedule(elapsed: Duration) -> Option<String> {
    if elapsed > WRITE_BEHIND_WARN {
        Some(format!(
            "WARNING! SQLite logging is behind. Last write took {:.1} seconds.",
            elapsed.as_secs_f64()
        ))
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Open the database, create the session row, and launch the timestamper
/// and writer tasks. Fatal open errors surface to the caller; the pipeline
/// is left stopped.
pub async fn start_pipeline(shared: &Arc<SharedState>) -> Result<()> {
    let (db_path, thresholds) = {
        let s = shared.settings.read().unwrap();
        (s.db_path.clone(), s.thresholds)
    };

    let db = FlightDb::open(&db_path).map_err(|e| SkylogError::Database(e.to_string()))?;

    // The first row of a session is its startup record; everything else
    // links to its id.
    let startup = TableSpec::of::<FlightLog>();
    let session = db
        .insert_row(&startup.insert_stmt(), &FlightLog::default().values())
        .map_err(|e| SkylogError::Database(e.to_string()))?;

    shared.session_id.store(session, Ordering::SeqCst);
    *shared.flightlog.lock().unwrap() = FlightLog::default();
    *shared.flight_state.lock().unwrap() = FlightStateMachine::new(thresholds);
    *shared.buckets.lock().unwrap() =
        BucketLedger::new(shared.clock.ms_since_start(), shared.clock.mono_time());
    shared.last_situation_log_ms.store(0, Ordering::SeqCst);

    let (ingress_tx, ingress_rx) = mpsc::channel(INGRESS_CAPACITY);
    let (writeq_tx, writeq_rx) = mpsc::channel(WRITE_QUEUE_CAPACITY);
    let (update_tx, update_rx) = mpsc::channel(UPDATE_SIGNAL_CAPACITY);

    *shared.ingress.lock().unwrap() = Some(ingress_tx);
    *shared.update_signal.lock().unwrap() = Some(update_tx);

    tokio::spawn(writer(shared.clone(), db, writeq_rx, update_rx));
    tokio::spawn(timestamper(shared.clone(), ingress_rx, writeq_tx));

    shared.pipeline_running.store(true, Ordering::SeqCst);
    shared.ready_to_write.store(true, Ordering::SeqCst);
    info!(session, db = %db_path, "data logging started");
    Ok(())
}

/// Ordered shutdown: stop accepting rows, close the ingress channel, let
/// the timestamper drain into the write queue, let the writer commit the
/// final transaction and close the database, then return. Nothing queued is
/// lost on a clean stop.
pub async fn stop_pipeline(shared: &Arc<SharedState>) {
    shared.ready_to_write.store(false, Ordering::SeqCst);
    *shared.ingress.lock().unwrap() = None;
    *shared.update_signal.lock().unwrap() = None;

    while shared.pipeline_running.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    info!("data log shutdown complete");
}

/// Reconcile desired state (`settings.replay_log`) with actual state once
/// per second. Rising edge starts the pipeline; falling edge performs the
/// ordered shutdown. A failed start leaves the pipeline stopped until the
/// setting is toggled off and on again.
pub fn spawn_watchdog(shared: Arc<SharedState>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(1));
        let mut faulted = false;
        loop {
            tick.tick().await;
            let want = shared.settings.read().unwrap().replay_log;
            let running = shared.pipeline_running.load(Ordering::SeqCst);

            if want && !running && !faulted {
                info!("watchdog starting data logging");
                if let Err(e) = start_pipeline(&shared).await {
                    error!(error = %e, "data logging failed to start");
                    shared.add_system_error(format!("data logging failed to start: {e}"));
                    faulted = true;
                }
            } else if !want {
                faulted = false;
                if running {
                    info!("watchdog stopping data logging");
                    stop_pipeline(&shared).await;
                }
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
