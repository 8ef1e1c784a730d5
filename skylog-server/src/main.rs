//! skylog: flight data logging and replay daemon + archive CLI.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;

use clap::{Parser, Subcommand};
use comfy_table::{Cell, Table};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

mod airports;
mod config;
mod db;
mod feed;
mod pipeline;
mod replay;

use config::Config;
use db::FlightDb;
use pipeline::{DataLog, LogSettings, SharedState};
use replay::{RelayedMessage, Replay, ReplayState};
use skylog_core::types::FlightLogLevel;

#[derive(Parser)]
#[command(name = "skylog", version, about = "Flight data logging and replay core")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the logging pipeline and consume the telemetry feed from stdin
    Run {
        /// SQLite database path (overrides config)
        #[arg(long)]
        db: Option<String>,

        /// Airport database path (overrides config)
        #[arg(long)]
        airport_db: Option<String>,

        /// Flight log level 1-4 (logbook, debrief, demo, debug)
        #[arg(long)]
        level: Option<i64>,
    },

    /// Show database statistics
    Stats {
        #[arg(long)]
        db: Option<String>,
    },

    /// List logged flights, most recent first
    Flights {
        #[arg(long)]
        db: Option<String>,

        /// Page number (10 flights per page)
        #[arg(long, default_value = "1")]
        page: i64,
    },

    /// Show the event log for one flight
    Events {
        flight: i64,

        #[arg(long)]
        db: Option<String>,
    },

    /// Export a flight's situation track
    Export {
        flight: i64,

        #[arg(long)]
        db: Option<String>,

        /// Output format (csv, json)
        #[arg(short, long, default_value = "csv")]
        format: String,

        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Replay an archived flight as if it were live
    Replay {
        flight: i64,

        /// Time compression factor
        #[arg(long, default_value = "1")]
        speed: i64,

        /// Start offset in bucket milliseconds
        #[arg(long, default_value = "0")]
        start: i64,

        #[arg(long)]
        db: Option<String>,
    },

    /// Delete one flight's data
    Delete {
        flight: i64,

        #[arg(long)]
        db: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config::load_config();

    match cli.command {
        Commands::Run {
            db,
            airport_db,
            level,
        } => cmd_run(config, db, airport_db, level).await,
        Commands::Stats { db } => cmd_stats(&db_path(&config, db)),
        Commands::Flights { db, page } => cmd_flights(&db_path(&config, db), page),
        Commands::Events { flight, db } => cmd_events(&db_path(&config, db), flight),
        Commands::Export {
            flight,
            db,
            format,
            output,
        } => cmd_export(&db_path(&config, db), flight, &format, output),
        Commands::Replay {
            flight,
            speed,
            start,
            db,
        } => cmd_replay(config, db, flight, speed, start).await,
        Commands::Delete { flight, db } => cmd_delete(&db_path(&config, db), flight),
    }
}

fn db_path(config: &Config, flag: Option<String>) -> String {
    flag.unwrap_or_else(|| config.database.path.clone())
}

fn open_or_exit(db_path: &str) -> FlightDb {
    FlightDb::open_readonly(db_path).unwrap_or_else(|e| {
        eprintln!("Error opening database {db_path}: {e}");
        std::process::exit(1);
    })
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

async fn cmd_run(
    mut config: Config,
    db: Option<String>,
    airport_db: Option<String>,
    level: Option<i64>,
) {
    if let Some(path) = db {
        config.database.path = path;
    }
    if let Some(path) = airport_db {
        config.database.airport_path = path;
    }
    if let Some(value) = level {
        match FlightLogLevel::from_i64(value) {
            Some(level) => config.logging.flight_log_level = level,
            None => {
                eprintln!("Error: invalid flight log level {value} (expected 1-4)");
                std::process::exit(1);
            }
        }
    }

    let settings = LogSettings::from_config(&config);
    let shared = SharedState::new(settings);
    let watchdog = pipeline::spawn_watchdog(shared.clone());
    let datalog = DataLog::new(shared.clone());

    // Give the watchdog a moment to bring the pipeline up, then snapshot
    // the session's settings into the archive.
    for _ in 0..40 {
        if shared.pipeline_running.load(Ordering::SeqCst) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    datalog.log_settings();

    eprintln!("Reading telemetry from stdin — EOF or Ctrl+C stops logging");
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let stats = tokio::select! {
        stats = feed::consume(stdin, &datalog) => stats,
        _ = tokio::signal::ctrl_c() => feed::FeedStats::default(),
    };

    // Ordered shutdown: nothing queued is lost.
    shared.settings.write().unwrap().replay_log = false;
    pipeline::stop_pipeline(&shared).await;
    watchdog.abort();

    eprintln!(
        "Feed closed: {} records accepted, {} malformed",
        stats.accepted, stats.malformed
    );
    if let Ok(db) = FlightDb::open_readonly(&config.database.path) {
        let s = db.stats();
        eprintln!(
            "Database {}: {} flights, {} situations, {} events, {} UAT, {} ES",
            config.database.path, s.flights, s.situations, s.events, s.uat_messages, s.es_messages
        );
    }
}

// ---------------------------------------------------------------------------
// archive queries
// ---------------------------------------------------------------------------

fn cmd_stats(db_path: &str) {
    let db = open_or_exit(db_path);
    let stats = db.stats();

    println!();
    println!("Database: {db_path}");
    println!();
    println!("  Flights:        {}", stats.flights);
    println!("  Situations:     {}", stats.situations);
    println!("  Events:         {}", stats.events);
    println!("  Traffic:        {}", stats.traffic);
    println!("  UAT messages:   {}", stats.uat_messages);
    println!("  ES messages:    {}", stats.es_messages);
    println!("  Time buckets:   {}", stats.buckets);
    println!();
}

fn cmd_flights(db_path: &str, page: i64) {
    let db = open_or_exit(db_path);
    let (count, flights) = db.list_flights(page).unwrap_or_else(|e| {
        eprintln!("Error listing flights: {e}");
        std::process::exit(1);
    });

    println!();
    println!("{count} logged flights (page {page}, database: {db_path})");

    if flights.is_empty() {
        return;
    }

    println!();
    let mut table = Table::new();
    table.set_header(vec![
        "ID", "Start", "Route", "Duration", "Dist (nm)", "Max alt", "Landed",
    ]);
    for f in &flights {
        table.add_row(vec![
            Cell::new(f.id),
            Cell::new(&f.start_localtime),
            Cell::new(&f.route),
            Cell::new(format_duration(f.duration)),
            Cell::new(format!("{:.1}", f.distance)),
            Cell::new(format!("{:.0}", f.max_alt)),
            Cell::new(&f.end_localtime),
        ]);
    }
    println!("{table}");
}

fn format_duration(seconds: i64) -> String {
    format!("{}:{:02}:{:02}", seconds / 3600, (seconds / 60) % 60, seconds % 60)
}

fn cmd_events(db_path: &str, flight: i64) {
    let db = open_or_exit(db_path);
    if !db.flight_exists(flight).unwrap_or(false) {
        eprintln!("Flight {flight} not found in database");
        std::process::exit(1);
    }

    let events = db.events_for_flight(flight).unwrap_or_else(|e| {
        eprintln!("Error reading events: {e}");
        std::process::exit(1);
    });

    println!();
    println!("Flight {flight}: {} events", events.len());
    if events.is_empty() {
        return;
    }

    println!();
    let mut table = Table::new();
    table.set_header(vec!["Time", "Event", "Airport", "Lat", "Lng"]);
    for e in &events {
        let airport = if e.airport_id.is_empty() {
            "-".to_string()
        } else {
            format!("{} ({})", e.airport_id, e.airport_name)
        };
        table.add_row(vec![
            Cell::new(&e.localtime),
            Cell::new(&e.event),
            Cell::new(airport),
            Cell::new(format!("{:.4}", e.lat)),
            Cell::new(format!("{:.4}", e.lng)),
        ]);
    }
    println!("{table}");
}

fn cmd_export(db_path: &str, flight: i64, format: &str, output: Option<PathBuf>) {
    let db = open_or_exit(db_path);
    if !db.flight_exists(flight).unwrap_or(false) {
        eprintln!("Flight {flight} not found in database");
        std::process::exit(1);
    }

    let rows = db.export_situation(flight).unwrap_or_else(|e| {
        eprintln!("Error exporting flight {flight}: {e}");
        std::process::exit(1);
    });

    let content = match format {
        "csv" => {
            let mut lines =
                vec!["lat,lng,alt,pressure_alt,ground_speed,true_course,gps_time,bucket_ms"
                    .to_string()];
            for r in &rows {
                lines.push(format!(
                    "{},{},{},{},{},{},{},{}",
                    r.lat,
                    r.lng,
                    r.alt,
                    r.pressure_alt,
                    r.ground_speed,
                    r.true_course,
                    r.gps_time,
                    r.bucket_ms,
                ));
            }
            lines.join("\n") + "\n"
        }
        "json" => serde_json::to_string_pretty(&rows).unwrap_or("[]".into()),
        _ => {
            eprintln!("Unknown format: {format}. Use 'csv' or 'json'.");
            std::process::exit(1);
        }
    };

    match output {
        Some(path) => {
            std::fs::write(&path, &content).unwrap_or_else(|e| {
                eprintln!("Error writing {}: {e}", path.display());
                std::process::exit(1);
            });
            eprintln!(
                "Exported {} rows to {} ({format})",
                rows.len(),
                path.display()
            );
        }
        None => print!("{content}"),
    }
}

fn cmd_delete(db_path: &str, flight: i64) {
    let mut db = FlightDb::open(db_path).unwrap_or_else(|e| {
        eprintln!("Error opening database {db_path}: {e}");
        std::process::exit(1);
    });
    if !db.flight_exists(flight).unwrap_or(false) {
        eprintln!("Flight {flight} not found in database");
        std::process::exit(1);
    }

    match db.delete_flight(flight) {
        Ok(rows) => println!("Deleted flight {flight} ({rows} rows)"),
        Err(e) => {
            eprintln!("Error deleting flight {flight}: {e}");
            std::process::exit(1);
        }
    }
}

// ---------------------------------------------------------------------------
// replay
// ---------------------------------------------------------------------------

async fn cmd_replay(config: Config, db: Option<String>, flight: i64, speed: i64, start: i64) {
    let db_path = db_path(&config, db);

    let mut settings = LogSettings::from_config(&config);
    settings.replay_log = false; // archive playback only, no live logging
    settings.db_path = db_path.clone();
    let shared = SharedState::new(settings);

    let (relay_tx, mut relay_rx) = mpsc::channel(256);
    let replay = Replay::spawn(shared.clone(), db_path, relay_tx);

    if let Err(e) = replay.play(flight, speed, start).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    // Wait for the dispatcher to arm the run before watching for idle.
    for _ in 0..100 {
        if replay.state() != ReplayState::Idle {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    eprintln!("Replaying flight {flight} at {speed}x — Ctrl+C stops");
    loop {
        tokio::select! {
            msg = relay_rx.recv() => match msg {
                Some(RelayedMessage::Uat(data)) => {
                    println!("{}", serde_json::json!({"kind": "uat", "data": data}));
                }
                Some(RelayedMessage::Es(data)) => {
                    println!("{}", serde_json::json!({"kind": "es", "data": data}));
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                eprintln!("Stopping replay");
                let _ = replay.stop();
            }
            _ = tokio::time::sleep(Duration::from_millis(200)) => {
                if replay.state() == ReplayState::Idle {
                    break;
                }
            }
        }
    }

    let ownship = shared.ownship.lock().unwrap();
    eprintln!(
        "Replay finished; last position {:.4}, {:.4} at {:.0} ft",
        ownship.lat, ownship.lng, ownship.alt
    );
}
