// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daily run quota.
//!
//! Counts the user's runs since midnight UTC. Checked before the run row
//! is inserted, so a denied request leaves no trace; an allowed request is
//! "incremented" by the insert itself.

use chrono::{DateTime, Utc};
use hangar_core::{Clock, CoreError, UserId};
use hangar_storage::Store;
use std::sync::Arc;

pub struct QuotaChecker<S, C> {
    store: Arc<S>,
    clock: C,
    max_runs_per_day: u32,
}

impl<S: Store, C: Clock> QuotaChecker<S, C> {
    pub fn new(store: Arc<S>, clock: C, max_runs_per_day: u32) -> Self {
        Self { store, clock, max_runs_per_day }
    }

    /// `true` iff the user is still under today's limit.
    pub async fn check(&self, user_id: UserId) -> Result<bool, CoreError> {
        let today = start_of_utc_day(self.clock.now_utc());
        let used = self.store.count_runs_since(user_id, today).await?;
        Ok(used < u64::from(self.max_runs_per_day))
    }
}

fn start_of_utc_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or(now)
}

#[cfg(test)]
#[path = "quota_tests.rs"]
mod tests;
