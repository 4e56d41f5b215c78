// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for testable time handling

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A clock that provides the current time.
///
/// Monotonic time (`now`) feeds durations; wall-clock UTC (`now_utc`)
/// feeds every persisted timestamp and TTL comparison.
pub trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> Instant;
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Real system clock
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fake clock for testing with controllable time
#[derive(Clone)]
pub struct FakeClock {
    current: Arc<Mutex<Instant>>,
    utc: Arc<Mutex<DateTime<Utc>>>,
}

impl FakeClock {
    pub fn new() -> Self {
        // Arbitrary but deterministic starting wall-clock
        let epoch = Utc.with_ymd_and_hms(2026, 1, 2, 12, 0, 0).single().unwrap_or_else(Utc::now);
        Self { current: Arc::new(Mutex::new(Instant::now())), utc: Arc::new(Mutex::new(epoch)) }
    }

    /// Advance both the monotonic and wall-clock time by `duration`.
    pub fn advance(&self, duration: Duration) {
        *self.current.lock() += duration;
        let mut utc = self.utc.lock();
        if let Ok(chrono_dur) = chrono::Duration::from_std(duration) {
            *utc += chrono_dur;
        }
    }

    /// Set the wall-clock to a specific instant.
    pub fn set_utc(&self, at: DateTime<Utc>) {
        *self.utc.lock() = at;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        *self.current.lock()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        *self.utc.lock()
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
