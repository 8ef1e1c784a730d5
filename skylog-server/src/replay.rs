//! Replay of archived sessions as if they were live.
//!
//! A dispatcher task serializes replay requests. Each run spawns three
//! workers — UAT messages, 1090-ES messages, and the situation track — that
//! pace themselves against the recorded `bucket_ms` gaps scaled by the
//! replay speed. Delays are consumed by a 1 ms sleep loop that honors
//! `abort` promptly and spins while `pause` is set, so control inputs take
//! effect within a couple of milliseconds. Message workers decimate
//! inversely with speed (at 10x, nine of ten messages drop); the situation
//! worker instead writes straight into the shared ownship record, which the
//! heartbeat sender picks up naturally.
//!
//! Each worker opens its own read-only database connection; the archive is
//! append-only while a replay runs. `replay_mode` returns to false exactly
//! when all three workers have flagged completion.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use skylog_core::types::{Result, SkylogError};

use crate::db::{FlightDb, ReplaySituation};
use crate::pipeline::SharedState;

/// Current replay position, serialized for the status observer.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ReplayStatus {
    pub flight: i64,
    pub speed: i64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayState {
    Idle,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamKind {
    Uat,
    Es,
    Situation,
}

/// Cooperative control flags shared by the dispatcher and the three
/// workers. Workers poll these on every loop iteration and every 1 ms tick.
#[derive(Default)]
pub struct ReplayControls {
    replay_mode: AtomicBool,
    pause: AtomicBool,
    abort: AtomicBool,
    speed: AtomicI64,
    uat_complete: AtomicBool,
    es_complete: AtomicBool,
    situation_complete: AtomicBool,
    status: Mutex<ReplayStatus>,
}

impl ReplayControls {
    pub fn replay_mode(&self) -> bool {
        self.replay_mode.load(Ordering::SeqCst)
    }

    pub fn paused(&self) -> bool {
        self.pause.load(Ordering::SeqCst)
    }

    pub fn aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    /// Effective speed; never below 1.
    pub fn speed(&self) -> i64 {
        self.speed.load(Ordering::SeqCst).max(1)
    }

    pub fn set_speed(&self, speed: i64) {
        self.speed.store(speed, Ordering::SeqCst);
        self.status.lock().unwrap().speed = speed;
    }

    pub fn pause(&self) {
        self.pause.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.pause.store(false, Ordering::SeqCst);
    }

    pub fn abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    pub fn status(&self) -> ReplayStatus {
        *self.status.lock().unwrap()
    }

    fn set_timestamp(&self, timestamp: i64) {
        self.status.lock().unwrap().timestamp = timestamp;
    }

    /// Arm the controls for a new run.
    fn arm(&self, flight: i64, speed: i64, start_ms: i64) {
        self.pause.store(false, Ordering::SeqCst);
        self.abort.store(false, Ordering::SeqCst);
        self.speed.store(speed, Ordering::SeqCst);
        self.uat_complete.store(false, Ordering::SeqCst);
        self.es_complete.store(false, Ordering::SeqCst);
        self.situation_complete.store(false, Ordering::SeqCst);
        *self.status.lock().unwrap() = ReplayStatus {
            flight,
            speed,
            timestamp: start_ms,
        };
        self.replay_mode.store(true, Ordering::SeqCst);
    }

    /// Worker completion rendezvous: the run ends only when all three
    /// streams have finished or aborted.
    fn finish(&self, kind: StreamKind) {
        match kind {
            StreamKind::Uat => self.uat_complete.store(true, Ordering::SeqCst),
            StreamKind::Es => self.es_complete.store(true, Ordering::SeqCst),
            StreamKind::Situation => self.situation_complete.store(true, Ordering::SeqCst),
        }
        if self.uat_complete.load(Ordering::SeqCst)
            && self.es_complete.load(Ordering::SeqCst)
            && self.situation_complete.load(Ordering::SeqCst)
        {
            *self.status.lock().unwrap() = ReplayStatus::default();
            self.replay_mode.store(false, Ordering::SeqCst);
        }
    }
}

/// One replay request as accepted by the control surface.
#[derive(Debug, Clone, Copy)]
pub struct ReplayRequest {
    pub flight: i64,
    pub speed: i64,
    pub start_ms: i64,
}

/// A message re-emitted to live consumers during replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayedMessage {
    Uat(String),
    Es(String),
}

// ---------------------------------------------------------------------------
// Control handle
// ---------------------------------------------------------------------------

/// Handle on the replay engine: enqueue runs, drive pause/resume/speed,
/// observe status.
#[derive(Clone)]
pub struct Replay {
    shared: Arc<SharedState>,
    db_path: String,
    requests: mpsc::Sender<ReplayRequest>,
}

impl Replay {
    /// Spawn the dispatcher task and return the control handle. Relayed
    /// messages are delivered on `relay`.
    pub fn spawn(
        shared: Arc<SharedState>,
        db_path: String,
        relay: mpsc::Sender<RelayedMessage>,
    ) -> Replay {
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(dispatcher(shared.clone(), db_path.clone(), rx, relay));
        Replay {
            shared,
            db_path,
            requests: tx,
        }
    }

    /// Start (or restart) playback of an archived flight. Validates the
    /// arguments before any state changes.
    pub async fn play(&self, flight: i64, speed: i64, start_ms: i64) -> Result<()> {
        if speed < 1 {
            return Err(SkylogError::InvalidArgument(format!(
                "replay speed must be >= 1, got {speed}"
            )));
        }
        let exists = FlightDb::open_readonly(&self.db_path)
            .and_then(|db| db.flight_exists(flight))
            .map_err(|e| SkylogError::Database(e.to_string()))?;
        if !exists {
            return Err(SkylogError::UnknownFlight(flight));
        }

        self.requests
            .send(ReplayRequest {
                flight,
                speed,
                start_ms,
            })
            .await
            .map_err(|_| SkylogError::PipelineStopped)
    }

    pub fn pause(&self) -> Result<()> {
        self.require_active()?;
        self.shared.replay.pause();
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        self.require_active()?;
        self.shared.replay.resume();
        Ok(())
    }

    /// Change speed mid-replay; effective on the next computed delay.
    pub fn set_speed(&self, speed: i64) -> Result<()> {
        if speed < 1 {
            return Err(SkylogError::InvalidArgument(format!(
                "replay speed must be >= 1, got {speed}"
            )));
        }
        self.require_active()?;
        self.shared.replay.set_speed(speed);
        Ok(())
    }

    /// Abort the current run. Workers exit on their next poll.
    pub fn stop(&self) -> Result<()> {
        self.require_active()?;
        self.shared.replay.abort();
        Ok(())
    }

    /// Seek: abort the current run and restart it at a new offset.
    pub async fn jump(&self, start_ms: i64) -> Result<()> {
        self.require_active()?;
        let status = self.shared.replay.status();
        self.play(status.flight, status.speed, start_ms).await
    }

    pub fn state(&self) -> ReplayState {
        if !self.shared.replay.replay_mode() {
            ReplayState::Idle
        } else if self.shared.replay.paused() {
            ReplayState::Paused
        } else {
            ReplayState::Playing
        }
    }

    pub fn status(&self) -> ReplayStatus {
        self.shared.replay.status()
    }

    fn require_active(&self) -> Result<()> {
        if self.shared.replay.replay_mode() {
            Ok(())
        } else {
            Err(SkylogError::NoReplay)
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatcher + workers
// ---------------------------------------------------------------------------

/// Serialize replay requests: abort any active run, wait for quiescence,
/// then launch the three workers.
async fn dispatcher(
    shared: Arc<SharedState>,
    db_path: String,
    mut requests: mpsc::Receiver<ReplayRequest>,
    relay: mpsc::Sender<RelayedMessage>,
) {
    while let Some(req) = requests.recv().await {
        if shared.replay.replay_mode() {
            shared.replay.abort();
            while shared.replay.replay_mode() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }

        shared.replay.arm(req.flight, req.speed, req.start_ms);
        info!(
            flight = req.flight,
            speed = req.speed,
            start_ms = req.start_ms,
            "replay starting"
        );

        tokio::spawn(message_worker(
            shared.clone(),
            db_path.clone(),
            req,
            relay.clone(),
            StreamKind::Uat,
        ));
        tokio::spawn(message_worker(
            shared.clone(),
            db_path.clone(),
            req,
            relay.clone(),
            StreamKind::Es,
        ));
        tokio::spawn(situation_worker(shared.clone(), db_path.clone(), req));
    }
}

/// Wait out one scaled inter-row delay. Aborts cut the wait short; pauses
/// suspend it without consuming it.
async fn scaled_wait(controls: &ReplayControls, wait_ms: i64) {
    let mut counter: i64 = 0;
    while !controls.aborted() && counter < wait_ms {
        tokio::time::sleep(Duration::from_millis(1)).await;
        if controls.paused() {
            continue;
        }
        counter += 1;
    }
}

/// Spin while paused, checking for abort.
async fn pause_point(controls: &ReplayControls) {
    while controls.paused() && !controls.aborted() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

/// Replay one message table. Pairwise loop: the gap between consecutive
/// rows, scaled by speed, paces the emission; pairs are decimated so the
/// effective message rate stays roughly constant as speed rises.
async fn message_worker(
    shared: Arc<SharedState>,
    db_path: String,
    req: ReplayRequest,
    relay: mpsc::Sender<RelayedMessage>,
    kind: StreamKind,
) {
    let controls = &shared.replay;
    let table = match kind {
        StreamKind::Uat => "messages",
        _ => "es_messages",
    };

    let rows = match FlightDb::open_readonly(&db_path)
        .and_then(|db| db.message_track(table, req.flight, req.start_ms))
    {
        Ok(rows) => rows,
        Err(e) => {
            warn!(table, error = %e, "replay query failed");
            controls.finish(kind);
            return;
        }
    };

    let mut ts1: i64 = 0;
    let mut pair_count: i64 = 0;

    for (ts2, data) in rows {
        if ts1 == 0 {
            ts1 = ts2;
            continue;
        }
        if data.is_empty() {
            continue;
        }

        let speed = controls.speed();
        let wait_ms = (ts2 - ts1) / speed;

        // Drop messages inversely proportional to speed (no drops at 1x,
        // 90% at 10x). Dropped pairs consume no wall time.
        if pair_count % speed == 0 {
            scaled_wait(controls, wait_ms).await;
            if !controls.aborted() {
                let msg = match kind {
                    StreamKind::Uat => RelayedMessage::Uat(data),
                    _ => RelayedMessage::Es(data),
                };
                let _ = relay.send(msg).await;
            }
        }
        pair_count += 1;
        ts1 = ts2;

        pause_point(controls).await;
        if controls.aborted() {
            break;
        }
    }

    debug!(table, "replay stream complete");
    controls.finish(kind);
}

/// Replay the situation track into the shared ownship record. No external
/// emission: the heartbeat sender reads ownship on its own schedule. Pairs
/// closer than 20 ms of scaled time are treated as duplicates/noise and not
/// materialized.
async fn situation_worker(shared: Arc<SharedState>, db_path: String, req: ReplayRequest) {
    let controls = &shared.replay;

    let rows = match FlightDb::open_readonly(&db_path)
        .and_then(|db| db.situation_track(req.flight, req.start_ms))
    {
        Ok(rows) => rows,
        Err(e) => {
            warn!(error = %e, "situation replay query failed");
            controls.finish(StreamKind::Situation);
            return;
        }
    };

    let mut ts1: i64 = 0;

    for row in rows {
        if ts1 == 0 {
            ts1 = row.bucket_ms;
            // The first row is the starting ownship position.
            apply_situation(&shared, &row);
            continue;
        }

        let speed = controls.speed();
        let wait_ms = (row.bucket_ms - ts1) / speed;

        if wait_ms > 20 {
            scaled_wait(controls, wait_ms).await;
            if !controls.aborted() {
                apply_situation(&shared, &row);
            }
        }

        controls.set_timestamp(row.bucket_ms);
        ts1 = row.bucket_ms;

        pause_point(controls).await;
        if controls.aborted() {
            break;
        }
    }

    debug!("situation replay complete");
    controls.finish(StreamKind::Situation);
}

fn apply_situation(shared: &SharedState, row: &ReplaySituation) {
    let mut ownship = shared.ownship.lock().unwrap();
    ownship.lat = row.lat;
    ownship.lng = row.lng;
    ownship.pressure_alt = row.pressure_alt;
    ownship.alt = row.alt;
    ownship.nacp = row.nacp;
    ownship.ground_speed = row.ground_speed;
    ownship.true_course = row.true_course;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::TableBatch;
    use crate::pipeline::LogSettings;
    use skylog_core::record::{LogRecord, TableSpec};
    use skylog_core::summary::FlightLog;
    use skylog_core::types::{FlightLogLevel, SituationData, UatMessage};
    use skylog_core::FlightThresholds;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicU32;
    use std::time::Instant;

    static TEST_SEQ: AtomicU32 = AtomicU32::new(0);

    fn temp_db_path() -> String {
        let n = TEST_SEQ.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir()
            .join(format!("skylog-replay-{}-{n}.sqlite", std::process::id()))
            .to_string_lossy()
            .into_owned()
    }

    fn cleanup(path: &str) {
        let _ = std::fs::remove_file(path);
        let _ = std::fs::remove_file(format!("{path}-wal"));
        let _ = std::fs::remove_file(format!("{path}-shm"));
    }

    fn settings(db_path: &str) -> LogSettings {
        LogSettings {
            replay_log: false,
            level: FlightLogLevel::Demo,
            debug: false,
            uat_enabled: true,
            es_enabled: true,
            gps_enabled: true,
            db_path: db_path.to_string(),
            airport_db_path: String::new(),
            thresholds: FlightThresholds::default(),
        }
    }

    /// Seed an archive with one flight carrying UAT rows at the given
    /// bucket offsets.
    fn seed_archive(path: &str, uat_buckets: &[i64], situation_buckets: &[i64]) -> i64 {
        let mut db = FlightDb::open(path).unwrap();
        let startup = TableSpec::of::<FlightLog>();
        let flight = db
            .insert_row(&startup.insert_stmt(), &FlightLog::default().values())
            .unwrap();

        let mut batches: HashMap<&'static str, TableBatch> = HashMap::new();
        let uat_spec = TableSpec::of::<UatMessage>();
        let sit_spec = TableSpec::of::<SituationData>();

        for &ms in uat_buckets {
            let m = UatMessage {
                data: format!("m{ms}"),
                ..Default::default()
            };
            let batch = batches.entry(UatMessage::TABLE).or_insert_with(|| TableBatch {
                insert_sql: uat_spec.insert_stmt(),
                cols_per_row: uat_spec.cols_per_row(),
                rows: Vec::new(),
            });
            let mut values = m.values();
            values.push(ms.to_string());
            values.push(flight.to_string());
            batch.rows.push(values);
        }
        for &ms in situation_buckets {
            let s = SituationData {
                lat: ms as f64 / 1000.0,
                lng: -82.0,
                ground_speed: 100.0,
                ..Default::default()
            };
            let batch = batches.entry(SituationData::TABLE).or_insert_with(|| TableBatch {
                insert_sql: sit_spec.insert_stmt(),
                cols_per_row: sit_spec.cols_per_row(),
                rows: Vec::new(),
            });
            let mut values = s.values();
            values.push(ms.to_string());
            values.push(flight.to_string());
            batch.rows.push(values);
        }
        if !batches.is_empty() {
            db.write_batches(&batches).unwrap();
        }
        flight
    }

    async fn wait_idle(shared: &SharedState, timeout_ms: u64) -> bool {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        while Instant::now() < deadline {
            if !shared.replay.replay_mode() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_replay_times_gaps_by_speed() {
        let path = temp_db_path();
        let flight = seed_archive(&path, &[1000, 5000], &[]);
        let shared = SharedState::new(settings(&path));
        let (relay_tx, mut relay_rx) = mpsc::channel(64);
        let replay = Replay::spawn(shared.clone(), path.clone(), relay_tx);

        let started = Instant::now();
        replay.play(flight, 4, 0).await.unwrap();

        // The second row arrives after (5000-1000)/4 ≈ 1000 ms.
        let msg = tokio::time::timeout(Duration::from_secs(5), relay_rx.recv())
            .await
            .expect("replay emitted nothing")
            .unwrap();
        let elapsed = started.elapsed();
        assert_eq!(msg, RelayedMessage::Uat("m5000".into()));
        assert!(
            elapsed >= Duration::from_millis(800),
            "emitted too early: {elapsed:?}"
        );
        assert!(
            elapsed <= Duration::from_millis(3000),
            "emitted too late: {elapsed:?}"
        );

        assert!(wait_idle(&shared, 2000).await, "replay_mode stuck");
        cleanup(&path);
    }

    #[tokio::test]
    async fn test_decimation_drops_pairs() {
        let path = temp_db_path();
        // Nine rows 100 ms apart: eight pairs, of which pairs 0 and 4 emit
        // at 4x speed.
        let buckets: Vec<i64> = (0..9).map(|i| 1000 + i * 100).collect();
        let flight = seed_archive(&path, &buckets, &[]);
        let shared = SharedState::new(settings(&path));
        let (relay_tx, mut relay_rx) = mpsc::channel(64);
        let replay = Replay::spawn(shared.clone(), path.clone(), relay_tx);

        replay.play(flight, 4, 0).await.unwrap();
        assert!(wait_idle(&shared, 5000).await, "replay_mode stuck");

        let mut received = Vec::new();
        while let Ok(msg) = relay_rx.try_recv() {
            received.push(msg);
        }
        assert_eq!(
            received,
            vec![
                RelayedMessage::Uat("m1100".into()),
                RelayedMessage::Uat("m1500".into()),
            ]
        );
        cleanup(&path);
    }

    #[tokio::test]
    async fn test_stop_aborts_long_sleep() {
        let path = temp_db_path();
        // A 60 s recorded gap at 1x: only an abort gets us out.
        let flight = seed_archive(&path, &[1000, 61_000], &[]);
        let shared = SharedState::new(settings(&path));
        let (relay_tx, mut relay_rx) = mpsc::channel(64);
        let replay = Replay::spawn(shared.clone(), path.clone(), relay_tx);

        replay.play(flight, 1, 0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(replay.state(), ReplayState::Playing);

        replay.stop().unwrap();
        assert!(
            wait_idle(&shared, 500).await,
            "workers did not abort promptly"
        );
        assert_eq!(replay.state(), ReplayState::Idle);
        assert!(relay_rx.try_recv().is_err(), "aborted sleep must not emit");
        cleanup(&path);
    }

    #[tokio::test]
    async fn test_pause_suspends_emission() {
        let path = temp_db_path();
        let flight = seed_archive(&path, &[1000, 2500], &[]);
        let shared = SharedState::new(settings(&path));
        let (relay_tx, mut relay_rx) = mpsc::channel(64);
        let replay = Replay::spawn(shared.clone(), path.clone(), relay_tx);

        replay.play(flight, 1, 0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        replay.pause().unwrap();
        assert_eq!(replay.state(), ReplayState::Paused);

        // Paused across what would have been the emission time.
        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert!(relay_rx.try_recv().is_err(), "paused replay must not emit");

        replay.resume().unwrap();
        let msg = tokio::time::timeout(Duration::from_secs(5), relay_rx.recv())
            .await
            .expect("resume did not continue playback")
            .unwrap();
        assert_eq!(msg, RelayedMessage::Uat("m2500".into()));

        assert!(wait_idle(&shared, 2000).await);
        cleanup(&path);
    }

    #[tokio::test]
    async fn test_situation_replay_updates_ownship() {
        let path = temp_db_path();
        let flight = seed_archive(&path, &[], &[1000, 1200, 1400]);
        let shared = SharedState::new(settings(&path));
        let (relay_tx, _relay_rx) = mpsc::channel(64);
        let replay = Replay::spawn(shared.clone(), path.clone(), relay_tx);

        replay.play(flight, 1, 0).await.unwrap();
        assert!(wait_idle(&shared, 3000).await, "replay_mode stuck");

        let ownship = shared.ownship.lock().unwrap();
        assert_eq!(ownship.lat, 1.4);
        assert_eq!(ownship.ground_speed, 100.0);
        cleanup(&path);
    }

    #[tokio::test]
    async fn test_play_validates_arguments() {
        let path = temp_db_path();
        let flight = seed_archive(&path, &[], &[]);
        let shared = SharedState::new(settings(&path));
        let (relay_tx, _relay_rx) = mpsc::channel(64);
        let replay = Replay::spawn(shared.clone(), path.clone(), relay_tx);

        assert!(matches!(
            replay.play(flight + 7, 1, 0).await,
            Err(SkylogError::UnknownFlight(_))
        ));
        assert!(matches!(
            replay.play(flight, 0, 0).await,
            Err(SkylogError::InvalidArgument(_))
        ));
        assert!(matches!(replay.pause(), Err(SkylogError::NoReplay)));
        assert!(matches!(replay.stop(), Err(SkylogError::NoReplay)));
        cleanup(&path);
    }

    #[tokio::test]
    async fn test_completion_rendezvous() {
        let controls = ReplayControls::default();
        controls.arm(3, 2, 0);
        assert!(controls.replay_mode());

        controls.finish(StreamKind::Uat);
        assert!(controls.replay_mode());
        controls.finish(StreamKind::Es);
        assert!(controls.replay_mode());
        controls.finish(StreamKind::Situation);
        assert!(!controls.replay_mode());
        assert_eq!(controls.status().flight, 0);
    }
}
