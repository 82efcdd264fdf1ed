//! Production Environment implementation using the system clock.

use chrono::{Local, NaiveDateTime};

use crate::env::Environment;

/// Production environment reading the local system clock.
#[derive(Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    fn wall_clock(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}
