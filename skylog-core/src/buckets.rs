//! Timestamp bucketing: an append-only ledger of 250 ms time slots.
//!
//! Every logged row is stamped against the bucket that was current when it
//! entered the pipeline. Buckets default to monotonic time; once a GPS clock
//! fix has been seen, subsequent buckets extrapolate GPS time forward across
//! the monotonic gap, so archived sessions keep a coherent wall-clock spine
//! even when GPS updates are sparse.
//!
//! Pure state machine: callers pass in clock readings, the ledger returns
//! facts. The server's timestamper task owns the ledger; anything else that
//! needs the current bucket copies its index out, never holds one across a
//! potential append.

use chrono::{DateTime, Duration, Utc};

/// Width of one bucket.
pub const BUCKET_RESOLUTION_MS: u64 = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketKind {
    /// Monotonic clock only; no wall-clock reference.
    Mono,
    /// Direct GPS time fix.
    Gps,
    /// GPS time extrapolated via the monotonic clock.
    GpsExtrap,
}

impl BucketKind {
    /// Persisted preference value: 0 = mono, 1 = gps, 2 = extrapolated.
    pub fn as_i64(self) -> i64 {
        match self {
            BucketKind::Mono => 0,
            BucketKind::Gps => 1,
            BucketKind::GpsExtrap => 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimeBucket {
    /// Database row id, 0 until the bucket row has been persisted.
    pub db_id: i64,
    pub kind: BucketKind,
    /// `ms_since_start` at creation.
    pub mono_ms: u64,
    /// Monotonic-derived wall value at creation.
    pub mono_time: DateTime<Utc>,
    pub gps_time: Option<DateTime<Utc>>,
    pub preferred_time: DateTime<Utc>,
}

/// Append-only vector of buckets. The active bucket is the last one.
pub struct BucketLedger {
    buckets: Vec<TimeBucket>,
}

impl BucketLedger {
    /// Seed the ledger with an initial MONO bucket.
    pub fn new(now_ms: u64, now_mono: DateTime<Utc>) -> Self {
        BucketLedger {
            buckets: vec![TimeBucket {
                db_id: 0,
                kind: BucketKind::Mono,
                mono_ms: now_ms,
                mono_time: now_mono,
                gps_time: None,
                preferred_time: now_mono,
            }],
        }
    }

    /// Verify the active bucket is still within resolution; append a new one
    /// if it has expired. Returns the index of the appended bucket, or `None`
    /// if the active bucket is still valid.
    ///
    /// If the GPS clock is valid and the previous bucket carried GPS time,
    /// the new bucket extrapolates it forward by the monotonic gap.
    pub fn check_bucket(
        &mut self,
        now_ms: u64,
        now_mono: DateTime<Utc>,
        gps_clock_valid: bool,
    ) -> Option<usize> {
        let last = self.current();
        if now_ms.saturating_sub(last.mono_ms) < BUCKET_RESOLUTION_MS {
            return None;
        }

        let mut bucket = TimeBucket {
            db_id: 0,
            kind: BucketKind::Mono,
            mono_ms: now_ms,
            mono_time: now_mono,
            gps_time: None,
            preferred_time: now_mono,
        };

        if gps_clock_valid && matches!(last.kind, BucketKind::Gps | BucketKind::GpsExtrap) {
            let gap = Duration::milliseconds(now_ms.saturating_sub(last.mono_ms) as i64);
            let extrapolated = last.preferred_time + gap;
            bucket.kind = BucketKind::GpsExtrap;
            bucket.preferred_time = extrapolated;
            bucket.gps_time = Some(extrapolated);
        }

        self.buckets.push(bucket);
        Some(self.buckets.len() - 1)
    }

    /// Append a bucket from a direct GPS time fix. Returns its index.
    pub fn set_bucket_from_gps(
        &mut self,
        now_ms: u64,
        now_mono: DateTime<Utc>,
        gps_time: DateTime<Utc>,
    ) -> usize {
        self.buckets.push(TimeBucket {
            db_id: 0,
            kind: BucketKind::Gps,
            mono_ms: now_ms,
            mono_time: now_mono,
            gps_time: Some(gps_time),
            preferred_time: gps_time,
        });
        self.buckets.len() - 1
    }

    pub fn current_index(&self) -> usize {
        self.buckets.len() - 1
    }

    pub fn current(&self) -> &TimeBucket {
        self.buckets.last().expect("ledger is never empty")
    }

    pub fn get(&self, index: usize) -> Option<&TimeBucket> {
        self.buckets.get(index)
    }

    /// Record the database id assigned to a persisted bucket row.
    pub fn set_db_id(&mut self, index: usize, id: i64) {
        if let Some(b) = self.buckets.get_mut(index) {
            b.db_id = id;
        }
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
