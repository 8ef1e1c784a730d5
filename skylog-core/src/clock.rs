//! Process clock: monotonic elapsed time plus an optional real-time
//! reference synchronized from GPS.
//!
//! The appliance boots without a trustworthy wall clock. Until the first GPS
//! time fix arrives, only monotonic time is available; rows logged in that
//! window carry monotonic-derived pseudo wall times. Once `set_real_time()`
//! has been called, `real_time_now()` extrapolates the fix forward using the
//! monotonic clock, so it stays correct even if the fix was a while ago.

use std::sync::Mutex;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};

pub struct ApplianceClock {
    started: Instant,
    /// Host wall clock at start. Only used to give MONO buckets a plausible
    /// wall value; never trusted for session timestamps.
    boot_wall: DateTime<Utc>,
    real_ref: Mutex<Option<(Instant, DateTime<Utc>)>>,
}

impl ApplianceClock {
    pub fn new() -> Self {
        ApplianceClock {
            started: Instant::now(),
            boot_wall: Utc::now(),
            real_ref: Mutex::new(None),
        }
    }

    /// Milliseconds elapsed since process start.
    pub fn ms_since_start(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn now_mono(&self) -> Instant {
        Instant::now()
    }

    /// Monotonic-derived wall time: boot wall guess plus elapsed monotonic
    /// time. Immune to host clock steps after start.
    pub fn mono_time(&self) -> DateTime<Utc> {
        self.boot_wall + Duration::milliseconds(self.ms_since_start() as i64)
    }

    /// Record a trusted wall-clock fix (from GPS).
    pub fn set_real_time(&self, now: DateTime<Utc>) {
        let mut r = self.real_ref.lock().unwrap();
        *r = Some((Instant::now(), now));
    }

    /// True once the wall clock has been synchronized at least once.
    pub fn has_real_time(&self) -> bool {
        self.real_ref.lock().unwrap().is_some()
    }

    /// Current wall time, extrapolated from the last GPS fix. `None` until
    /// the first fix.
    pub fn real_time_now(&self) -> Option<DateTime<Utc>> {
        let r = self.real_ref.lock().unwrap();
        r.map(|(at, fix)| fix + Duration::milliseconds(at.elapsed().as_millis() as i64))
    }
}

impl Default for ApplianceClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_real_time_at_start() {
        let clock = ApplianceClock::new();
        assert!(!clock.has_real_time());
        assert!(clock.real_time_now().is_none());
    }

    #[test]
    fn test_real_time_after_fix() {
        let clock = ApplianceClock::new();
        let fix = "2024-06-01T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        clock.set_real_time(fix);

        assert!(clock.has_real_time());
        let now = clock.real_time_now().unwrap();
        assert!(now >= fix);
        assert!(now - fix < Duration::seconds(1));
    }

    #[test]
    fn test_ms_since_start_advances() {
        let clock = ApplianceClock::new();
        let a = clock.ms_since_start();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = clock.ms_since_start();
        assert!(b >= a + 5);
    }

    #[test]
    fn test_mono_time_tracks_elapsed() {
        let clock = ApplianceClock::new();
        let a = clock.mono_time();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = clock.mono_time();
        assert!(b > a);
    }
}
