//! Shared types, error enum, and telemetry record shapes for skylog-core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All errors produced by the flight logging core.
#[derive(Debug, Error)]
pub enum SkylogError {
    #[error("database error: {0}")]
    Database(String),
    #[error("unknown flight: {0}")]
    UnknownFlight(i64),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("logging pipeline is not running")]
    PipelineStopped,
    #[error("no replay in progress")]
    NoReplay,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SkylogError>;

// ---------------------------------------------------------------------------
// Log levels
// ---------------------------------------------------------------------------

/// Situation sampling level. Higher levels admit more data.
///
/// `Logbook` keeps one situation row per 30 s, `Debrief` samples at 2 Hz,
/// `Demo` is ungated, and `Debug` additionally admits traffic rows and raw
/// demodulator output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FlightLogLevel {
    Logbook,
    Debrief,
    Demo,
    Debug,
}

impl FlightLogLevel {
    pub fn as_i64(self) -> i64 {
        match self {
            FlightLogLevel::Logbook => 1,
            FlightLogLevel::Debrief => 2,
            FlightLogLevel::Demo => 3,
            FlightLogLevel::Debug => 4,
        }
    }

    pub fn from_i64(v: i64) -> Option<Self> {
        match v {
            1 => Some(FlightLogLevel::Logbook),
            2 => Some(FlightLogLevel::Debrief),
            3 => Some(FlightLogLevel::Demo),
            4 => Some(FlightLogLevel::Debug),
            _ => None,
        }
    }

    /// Minimum milliseconds between logged situation rows, if gated.
    pub fn situation_interval_ms(self) -> Option<u64> {
        match self {
            FlightLogLevel::Logbook => Some(30_000),
            FlightLogLevel::Debrief => Some(500),
            FlightLogLevel::Demo | FlightLogLevel::Debug => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Telemetry record shapes
// ---------------------------------------------------------------------------

/// Ownship GPS/baro situation sample.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SituationData {
    pub lat: f64,
    pub lng: f64,
    /// GPS altitude, feet MSL.
    pub alt: f64,
    /// Pressure altitude, feet.
    pub pressure_alt: f64,
    /// Groundspeed, knots.
    pub ground_speed: f64,
    /// True course, degrees.
    pub true_course: f64,
    /// Vertical speed, feet per minute.
    pub vertical_speed: f64,
    /// Navigation accuracy category (position).
    pub nacp: u8,
    pub satellites: u16,
    pub gps_fix_quality: u8,
    pub gps_time: Option<DateTime<Utc>>,
    /// True when the position solution is usable.
    pub gps_valid: bool,
}

/// Receiver status snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusSnapshot {
    pub uat_messages_total: u64,
    pub es_messages_total: u64,
    pub uat_traffic_tracking: u32,
    pub es_traffic_tracking: u32,
    pub gps_satellites_locked: u16,
    pub uptime_ms: u64,
    pub cpu_temp: f64,
    pub errors: String,
}

/// Settings snapshot, logged so an archived session records the
/// configuration it was captured under.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsSnapshot {
    pub replay_log: bool,
    pub flight_log_level: i64,
    pub uat_enabled: bool,
    pub es_enabled: bool,
    pub gps_enabled: bool,
    pub debug: bool,
}

/// Traffic target report (merged UAT/1090-ES view).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficInfo {
    pub icao_addr: u32,
    pub tail: String,
    pub lat: f64,
    pub lng: f64,
    /// Altitude, feet.
    pub alt: i32,
    pub speed: f64,
    pub course: f64,
    /// Vertical velocity, feet per minute.
    pub vvel: i32,
    pub squawk: String,
    pub on_ground: bool,
    pub last_seen_ms: u64,
}

/// Raw UAT (978 MHz) downlink message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UatMessage {
    /// Hex-encoded frame payload.
    pub data: String,
    pub signal_level: f64,
    pub message_class: u8,
}

/// Raw 1090-ES downlink message, JSON as produced by the demodulator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EsMessage {
    pub data: String,
    pub signal_level: f64,
}

/// A line of dump1090 terminal output, kept for debugging sessions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Dump1090TermMessage {
    pub text: String,
}

/// A semantic flight event (`Startup`, `Takeoff`, `Landing`, ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlightEventRecord {
    pub event: String,
    pub lat: f64,
    pub lng: f64,
    pub localtime: String,
    pub airport_id: String,
    pub airport_name: String,
    /// Wall-clock time of the event, seconds since epoch.
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_roundtrip() {
        for v in 1..=4 {
            let level = FlightLogLevel::from_i64(v).unwrap();
            assert_eq!(level.as_i64(), v);
        }
        assert!(FlightLogLevel::from_i64(0).is_none());
        assert!(FlightLogLevel::from_i64(5).is_none());
    }

    #[test]
    fn test_log_level_ordering() {
        assert!(FlightLogLevel::Logbook < FlightLogLevel::Debrief);
        assert!(FlightLogLevel::Debrief < FlightLogLevel::Demo);
        assert!(FlightLogLevel::Demo < FlightLogLevel::Debug);
    }

    #[test]
    fn test_situation_gate_intervals() {
        assert_eq!(
            FlightLogLevel::Logbook.situation_interval_ms(),
            Some(30_000)
        );
        assert_eq!(FlightLogLevel::Debrief.situation_interval_ms(), Some(500));
        assert_eq!(FlightLogLevel::Demo.situation_interval_ms(), None);
        assert_eq!(FlightLogLevel::Debug.situation_interval_ms(), None);
    }
}
