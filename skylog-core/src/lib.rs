//! skylog-core: pure flight-logging logic for the skylog appliance.
//!
//! No async, no I/O, no database — just algorithms and descriptors. This
//! crate is shared by `skylog-server` (the logging/replay daemon + CLI) and
//! anything that needs to reason about archived flight data offline.

pub mod buckets;
pub mod clock;
pub mod flight;
pub mod geo;
pub mod record;
pub mod summary;
pub mod types;

// Re-export commonly used types at crate root
pub use buckets::{BucketKind, BucketLedger, TimeBucket, BUCKET_RESOLUTION_MS};
pub use clock::ApplianceClock;
pub use flight::{FlightEventKind, FlightState, FlightStateMachine, FlightThresholds, LegEffect};
pub use record::{FieldSpec, LogRecord};
pub use summary::FlightLog;
pub use types::*;
