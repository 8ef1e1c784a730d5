//! Configuration file management for skylog.
//!
//! A small sectioned config file (YAML-shaped, parsed leniently line by
//! line) with logging toggles, database paths, and flight-state
//! thresholds. CLI flags override file values. The file lives at
//! `~/.skylog/config.yaml` unless `SKYLOG_CONFIG` points elsewhere.
//!
//! Values are written and read bare, without quoting. Unknown sections and
//! keys are ignored; unparseable or out-of-range values keep their
//! defaults, so a damaged config never stops the appliance from booting.

use std::fmt::Write as _;
use std::path::PathBuf;

use tracing::debug;

use skylog_core::types::{FlightLogLevel, SkylogError};
use skylog_core::FlightThresholds;

/// Full configuration structure.
#[derive(Debug, Clone)]
pub struct Config {
    pub logging: LoggingConfig,
    pub database: DatabaseConfig,
    pub flight: FlightConfig,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Master switch for the logging pipeline (the watchdog reconciles it).
    pub replay_log: bool,
    pub flight_log_level: FlightLogLevel,
    pub debug: bool,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: String,
    pub airport_path: String,
}

/// Flight-state thresholds, knots.
#[derive(Debug, Clone)]
pub struct FlightConfig {
    pub start_taxiing_speed: f64,
    pub stop_taxiing_speed: f64,
    pub start_flying_speed: f64,
    pub stop_flying_speed: f64,
}

impl FlightConfig {
    pub fn thresholds(&self) -> FlightThresholds {
        FlightThresholds {
            start_taxiing: self.start_taxiing_speed,
            stop_taxiing: self.stop_taxiing_speed,
            start_flying: self.start_flying_speed,
            stop_flying: self.stop_flying_speed,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let t = FlightThresholds::default();
        Config {
            logging: LoggingConfig {
                replay_log: true,
                flight_log_level: FlightLogLevel::Debrief,
                debug: false,
            },
            database: DatabaseConfig {
                path: "data/skylog.sqlite".into(),
                airport_path: "data/airports.sqlite".into(),
            },
            flight: FlightConfig {
                start_taxiing_speed: t.start_taxiing,
                stop_taxiing_speed: t.stop_taxiing,
                start_flying_speed: t.start_flying,
                stop_flying_speed: t.stop_flying,
            },
        }
    }
}

/// Config file location: `$SKYLOG_CONFIG` if set, else
/// `~/.skylog/config.yaml`.
pub fn config_file() -> PathBuf {
    if let Some(path) = std::env::var_os("SKYLOG_CONFIG") {
        return PathBuf::from(path);
    }
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".skylog")
        .join("config.yaml")
}

/// Load the config file, falling back to defaults when it is missing or
/// unreadable.
pub fn load_config() -> Config {
    match std::fs::read_to_string(config_file()) {
        Ok(text) => parse_config(&text),
        Err(_) => Config::default(),
    }
}

/// Write the config file, creating its directory first. Returns the path
/// written.
pub fn save_config(config: &Config) -> Result<PathBuf, SkylogError> {
    let path = config_file();
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| SkylogError::Config(e.to_string()))?;
    }
    std::fs::write(&path, serialize_config(config))
        .map_err(|e| SkylogError::Config(e.to_string()))?;
    Ok(path)
}

/// Lenient line-oriented parse. An unindented line ending in `:` opens a
/// section; indented `key: value` lines set fields within it.
fn parse_config(text: &str) -> Config {
    let mut config = Config::default();
    let mut section = "";

    for raw in text.lines() {
        let line = raw.trim_end();
        let body = line.trim_start();
        if body.is_empty() || body.starts_with('#') {
            continue;
        }

        let Some((key, value)) = body.split_once(':') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());

        let indented = line.len() != body.len();
        if !indented {
            // Section header, or a stray top-level key we don't have.
            section = if value.is_empty() { key } else { "" };
            continue;
        }

        apply_key(&mut config, section, key, value);
    }

    config
}

fn apply_key(config: &mut Config, section: &str, key: &str, value: &str) {
    match (section, key) {
        ("logging", "replay_log") => set_bool(&mut config.logging.replay_log, value),
        ("logging", "debug") => set_bool(&mut config.logging.debug, value),
        ("logging", "flight_log_level") => {
            if let Some(level) = value.parse().ok().and_then(FlightLogLevel::from_i64) {
                config.logging.flight_log_level = level;
            }
        }
        ("database", "path") => set_path(&mut config.database.path, value),
        ("database", "airport_path") => set_path(&mut config.database.airport_path, value),
        ("flight", "start_taxiing_speed") => {
            set_knots(&mut config.flight.start_taxiing_speed, value)
        }
        ("flight", "stop_taxiing_speed") => set_knots(&mut config.flight.stop_taxiing_speed, value),
        ("flight", "start_flying_speed") => set_knots(&mut config.flight.start_flying_speed, value),
        ("flight", "stop_flying_speed") => set_knots(&mut config.flight.stop_flying_speed, value),
        _ => debug!(section, key, "unknown config key ignored"),
    }
}

fn set_bool(slot: &mut bool, value: &str) {
    if let Ok(v) = value.parse() {
        *slot = v;
    }
}

fn set_knots(slot: &mut f64, value: &str) {
    if let Ok(v) = value.parse::<f64>() {
        if v.is_finite() && v >= 0.0 {
            *slot = v;
        }
    }
}

fn set_path(slot: &mut String, value: &str) {
    if !value.is_empty() {
        *slot = value.to_string();
    }
}

fn serialize_config(config: &Config) -> String {
    let mut out = String::from("# skylog configuration\n\n");

    let _ = writeln!(out, "logging:");
    let _ = writeln!(out, "  replay_log: {}", config.logging.replay_log);
    let _ = writeln!(
        out,
        "  flight_log_level: {}",
        config.logging.flight_log_level.as_i64()
    );
    let _ = writeln!(out, "  debug: {}", config.logging.debug);

    let _ = writeln!(out, "\ndatabase:");
    let _ = writeln!(out, "  path: {}", config.database.path);
    let _ = writeln!(out, "  airport_path: {}", config.database.airport_path);

    let _ = writeln!(out, "\nflight:");
    let _ = writeln!(
        out,
        "  start_taxiing_speed: {}",
        config.flight.start_taxiing_speed
    );
    let _ = writeln!(
        out,
        "  stop_taxiing_speed: {}",
        config.flight.stop_taxiing_speed
    );
    let _ = writeln!(
        out,
        "  start_flying_speed: {}",
        config.flight.start_flying_speed
    );
    let _ = writeln!(
        out,
        "  stop_flying_speed: {}",
        config.flight.stop_flying_speed
    );

    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.logging.replay_log);
        assert_eq!(config.logging.flight_log_level, FlightLogLevel::Debrief);
        assert_eq!(config.flight.start_flying_speed, 55.0);
    }

    #[test]
    fn test_parse_config() {
        let text = "
logging:
  replay_log: false
  flight_log_level: 4
  debug: true

database:
  path: /tmp/test.sqlite
  airport_path: /tmp/airports.sqlite

flight:
  start_taxiing_speed: 6
  start_flying_speed: 60
";
        let config = parse_config(text);
        assert!(!config.logging.replay_log);
        assert_eq!(config.logging.flight_log_level, FlightLogLevel::Debug);
        assert!(config.logging.debug);
        assert_eq!(config.database.path, "/tmp/test.sqlite");
        assert_eq!(config.flight.start_taxiing_speed, 6.0);
        assert_eq!(config.flight.start_flying_speed, 60.0);
        // Untouched keys keep defaults.
        assert_eq!(config.flight.stop_flying_speed, 45.0);
    }

    #[test]
    fn test_parse_ignores_unknowns_and_garbage() {
        let text = "
antenna:
  gain: 38

logging:
  replay_log: maybe
  flight_log_level: 9
  volume: 11

not even a key value line
";
        let config = parse_config(text);
        // Unknown section, unknown key, bad bool, out-of-range level: all
        // ignored, defaults intact.
        assert!(config.logging.replay_log);
        assert_eq!(config.logging.flight_log_level, FlightLogLevel::Debrief);
    }

    #[test]
    fn test_parse_rejects_bad_thresholds() {
        let text = "
flight:
  start_flying_speed: -10
  stop_flying_speed: NaN
";
        let config = parse_config(text);
        assert_eq!(config.flight.start_flying_speed, 55.0);
        assert_eq!(config.flight.stop_flying_speed, 45.0);
    }

    #[test]
    fn test_top_level_key_closes_section() {
        // A stray top-level `key: value` line must not leave the previous
        // section open.
        let text = "
logging:
  debug: true
orphan: 42
  replay_log: false
";
        let config = parse_config(text);
        assert!(config.logging.debug);
        assert!(config.logging.replay_log, "replay_log set outside a section");
    }

    #[test]
    fn test_roundtrip() {
        let mut config = Config::default();
        config.logging.replay_log = false;
        config.logging.flight_log_level = FlightLogLevel::Logbook;
        config.database.path = "test.sqlite".into();
        config.flight.stop_flying_speed = 40.0;

        let text = serialize_config(&config);
        let parsed = parse_config(&text);
        assert!(!parsed.logging.replay_log);
        assert_eq!(parsed.logging.flight_log_level, FlightLogLevel::Logbook);
        assert_eq!(parsed.database.path, "test.sqlite");
        assert_eq!(parsed.flight.stop_flying_speed, 40.0);
    }
}
