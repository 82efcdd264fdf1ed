//! Virtual wall clock for simulations.

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use sixchan_server::Environment;
use tokio::time::Instant;

/// Environment whose wall clock follows simulated time.
///
/// The clock starts at a fixed date and advances with tokio's (turmoil's)
/// virtual time, so rendered `[hh:mm]` stamps depend only on how long the
/// simulation has run.
#[derive(Debug, Clone)]
pub struct SimEnv {
    epoch: NaiveDateTime,
    start: Instant,
}

impl SimEnv {
    /// Clock starting at 2024-01-01 12:00 now.
    ///
    /// Must be called inside a simulated host.
    pub fn new() -> Self {
        let epoch = NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap_or_default();
        Self::starting_at(epoch)
    }

    /// Clock starting at `epoch` now.
    pub fn starting_at(epoch: NaiveDateTime) -> Self {
        Self { epoch, start: Instant::now() }
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SimEnv {
    fn wall_clock(&self) -> NaiveDateTime {
        let elapsed = TimeDelta::from_std(self.start.elapsed()).unwrap_or(TimeDelta::MAX);
        self.epoch.checked_add_signed(elapsed).unwrap_or(NaiveDateTime::MAX)
    }
}
