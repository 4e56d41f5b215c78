// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Monotonic counter registry backing `/metrics`.
//!
//! Keys are flat strings, optionally carrying one label in the
//! `name{label="value"}` form. No gauges, no histograms: the sweepers and
//! services only ever count.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct Metrics {
    counters: Arc<Mutex<BTreeMap<String, u64>>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(&self, name: &str) {
        self.add(name, 1);
    }

    pub fn add(&self, name: &str, count: u64) {
        *self.counters.lock().entry(name.to_string()).or_insert(0) += count;
    }

    /// Increment `name{label="value"}`.
    pub fn incr_labeled(&self, name: &str, label: &str, value: &str) {
        self.add(&format!("{name}{{{label}=\"{value}\"}}"), 1);
    }

    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counters.lock().clone()
    }

    pub fn get(&self, key: &str) -> u64 {
        self.counters.lock().get(key).copied().unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
