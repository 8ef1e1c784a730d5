//! Line-delimited JSON telemetry intake.
//!
//! The demodulators and the GPS daemon run as separate processes and pipe
//! telemetry into `skylog run` as one JSON object per line, tagged by
//! `type`. Malformed lines are counted and skipped; the feed never takes
//! the pipeline down.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

use skylog_core::types::{
    Dump1090TermMessage, EsMessage, SituationData, StatusSnapshot, TrafficInfo, UatMessage,
};

use crate::pipeline::DataLog;

/// One feed line.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedRecord {
    Situation(SituationData),
    Status(StatusSnapshot),
    Traffic(TrafficInfo),
    Uat(UatMessage),
    Es(EsMessage),
    Dump1090(Dump1090TermMessage),
    GpsTime { time: DateTime<Utc> },
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FeedStats {
    pub accepted: u64,
    pub malformed: u64,
}

/// Consume the feed until EOF, dispatching each record to the producer API.
pub async fn consume<R>(reader: R, datalog: &DataLog) -> FeedStats
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut stats = FeedStats::default();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "feed read error");
                break;
            }
        };

        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        match serde_json::from_str::<FeedRecord>(trimmed) {
            Ok(record) => {
                dispatch(datalog, record);
                stats.accepted += 1;
            }
            Err(e) => {
                stats.malformed += 1;
                debug!(error = %e, "malformed feed line skipped");
            }
        }
    }

    stats
}

fn dispatch(datalog: &DataLog, record: FeedRecord) {
    match record {
        FeedRecord::Situation(sit) => datalog.log_situation(&sit),
        FeedRecord::Status(status) => datalog.log_status(&status),
        FeedRecord::Traffic(traffic) => datalog.log_traffic(&traffic),
        FeedRecord::Uat(msg) => datalog.log_uat(&msg),
        FeedRecord::Es(msg) => datalog.log_es(&msg),
        FeedRecord::Dump1090(msg) => datalog.log_dump1090_terminal(&msg),
        FeedRecord::GpsTime { time } => datalog.set_clock_from_gps(time),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{LogSettings, SharedState};
    use skylog_core::types::FlightLogLevel;
    use skylog_core::FlightThresholds;

    fn offline_datalog() -> DataLog {
        // Pipeline not started: every log_* call is a gated no-op, which is
        // all the parser tests need.
        let settings = LogSettings {
            replay_log: true,
            level: FlightLogLevel::Demo,
            debug: false,
            uat_enabled: true,
            es_enabled: true,
            gps_enabled: true,
            db_path: ":memory:".into(),
            airport_db_path: String::new(),
            thresholds: FlightThresholds::default(),
        };
        DataLog::new(SharedState::new(settings))
    }

    #[tokio::test]
    async fn test_feed_counts_accepted_and_malformed() {
        let feed = concat!(
            r#"{"type":"situation","lat":35.4,"lng":-82.5,"alt":2200.0,"pressure_alt":2100.0,"ground_speed":0.0,"true_course":0.0,"vertical_speed":0.0,"nacp":10,"satellites":9,"gps_fix_quality":2,"gps_time":null,"gps_valid":true}"#,
            "\n",
            "# comment line\n",
            "\n",
            r#"{"type":"uat","data":"3c0b...","signal_level":-11.0,"message_class":0}"#,
            "\n",
            "not json at all\n",
            r#"{"type":"gps_time","time":"2024-06-01T15:30:00Z"}"#,
            "\n",
        );

        let datalog = offline_datalog();
        let stats = consume(feed.as_bytes(), &datalog).await;
        assert_eq!(stats.accepted, 3);
        assert_eq!(stats.malformed, 1);

        // The GPS time line synchronized the clock even with the pipeline
        // stopped.
        assert!(datalog.shared().clock.has_real_time());
    }

    #[tokio::test]
    async fn test_feed_unknown_type_is_malformed() {
        let datalog = offline_datalog();
        let stats = consume(
            r#"{"type":"barometer","value":29.92}"#.as_bytes(),
            &datalog,
        )
        .await;
        assert_eq!(stats.accepted, 0);
        assert_eq!(stats.malformed, 1);
    }
}
