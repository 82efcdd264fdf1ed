//! Environment abstraction for deterministic testing.
//!
//! The dispatcher only needs one system resource: the wall clock used to
//! stamp new messages. Production uses the local time of day, simulations
//! plug in a virtual clock so rendered `[hh:mm]` stamps are reproducible.

use chrono::NaiveDateTime;

/// Abstract environment providing wall-clock time.
///
/// # Invariants
///
/// - `wall_clock()` is only used for display; ordering of messages comes
///   from history ids, never from timestamps
pub trait Environment: Clone + Send + Sync + 'static {
    /// Current local date and time.
    fn wall_clock(&self) -> NaiveDateTime;
}
