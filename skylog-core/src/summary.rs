//! Per-session flight summary — the `startup` row.
//!
//! One `FlightLog` lives for the duration of a logging session. The state
//! inferrer mutates it (positions, altitudes, leg close-outs); the writer
//! persists it on demand when the summary-update signal fires.

use crate::geo;

#[derive(Debug, Clone, Default)]
pub struct FlightLog {
    pub start_airport_id: String,
    pub start_airport_name: String,
    /// Session start, milliseconds since epoch. Zero until the session has
    /// been opened with a valid GPS position and real-time clock.
    pub start_timestamp: i64,
    pub start_localtime: String,
    pub start_tz: String,
    pub start_lat: f64,
    pub start_lng: f64,
    pub start_alt: f64,

    pub end_airport_id: String,
    pub end_airport_name: String,
    /// Most recent leg close-out, seconds since epoch.
    pub end_timestamp: i64,
    pub end_localtime: String,
    pub end_tz: String,
    pub end_lat: f64,
    pub end_lng: f64,

    pub max_alt: f64,
    /// Session duration, seconds.
    pub duration: i64,
    /// Cumulative distance, nautical miles.
    pub distance: f64,
    /// Best observed groundspeed, knots.
    pub groundspeed: i64,

    /// `ID1 => ID2 (t/g) => ID3` style stop list.
    pub route: String,

    // Previous sample position for distance accumulation. Not persisted.
    pub last_point: Option<(f64, f64)>,
}

impl FlightLog {
    /// True once the start-of-session stamp has run.
    pub fn started(&self) -> bool {
        self.start_timestamp != 0
    }

    pub fn note_altitude(&mut self, alt: f64) {
        if alt > self.max_alt {
            self.max_alt = alt;
        }
    }

    pub fn note_groundspeed(&mut self, gs: f64) {
        let gs = gs as i64;
        if gs > self.groundspeed {
            self.groundspeed = gs;
        }
    }

    /// Accumulate great-circle distance from the previous noted position.
    pub fn note_position(&mut self, lat: f64, lng: f64) {
        if let Some((plat, plng)) = self.last_point {
            let segment_km = geo::great_circle_km(plat, plng, lat, lng);
            self.distance += geo::km_to_nm(segment_km);
        }
        self.last_point = Some((lat, lng));
    }

    /// Append a stop to the route string. Touch-and-goes are annotated.
    pub fn append_route_stop(&mut self, airport_id: &str, full_stop: bool) {
        self.route.push_str(" => ");
        self.route.push_str(airport_id);
        if !full_stop {
            self.route.push_str(" (t/g)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_started_by_default() {
        let log = FlightLog::default();
        assert!(!log.started());
    }

    #[test]
    fn test_max_altitude_is_monotonic() {
        let mut log = FlightLog::default();
        log.note_altitude(1200.0);
        log.note_altitude(5500.0);
        log.note_altitude(3000.0);
        assert_eq!(log.max_alt, 5500.0);
    }

    #[test]
    fn test_best_groundspeed() {
        let mut log = FlightLog::default();
        log.note_groundspeed(95.4);
        log.note_groundspeed(120.9);
        log.note_groundspeed(80.0);
        assert_eq!(log.groundspeed, 120);
    }

    #[test]
    fn test_distance_accumulation() {
        let mut log = FlightLog::default();
        // First point establishes the baseline, no distance yet.
        log.note_position(35.0, -82.0);
        assert_eq!(log.distance, 0.0);

        // ~60 nm per degree of latitude.
        log.note_position(36.0, -82.0);
        assert!((log.distance - 60.0).abs() < 1.0, "got {}", log.distance);

        log.note_position(37.0, -82.0);
        assert!((log.distance - 120.0).abs() < 2.0, "got {}", log.distance);
    }

    #[test]
    fn test_route_building() {
        let mut log = FlightLog::default();
        log.route = "AVL".to_string();
        log.append_route_stop("CLT", false);
        log.append_route_stop("GSP", true);
        assert_eq!(log.route, "AVL => CLT (t/g) => GSP");
    }
}
