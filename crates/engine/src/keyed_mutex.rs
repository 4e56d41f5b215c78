// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-key FIFO serialization primitive.
//!
//! `acquire(key)` blocks until every earlier holder of the same key has
//! released; distinct keys never contend. Fairness comes from the fair
//! async mutex underneath: waiters are granted strictly in arrival order.
//! Not re-entrant — a holder must not acquire its own key again.
//!
//! When a key's queue drains the map entry is discarded, so the map only
//! grows with *live* contention, not with every key ever seen.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

#[derive(Clone, Default)]
pub struct KeyedMutex {
    locks: LockMap,
}

impl KeyedMutex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `key`, waiting behind earlier acquirers.
    pub async fn acquire(&self, key: &str) -> KeyedGuard {
        let lock = {
            let mut map = self.locks.lock();
            map.entry(key.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
        };
        let permit = lock.lock_owned().await;
        KeyedGuard { permit: Some(permit), locks: self.locks.clone(), key: key.to_string() }
    }

    /// Number of keys with live holders or waiters (test observability).
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}

/// Releases the key on drop.
pub struct KeyedGuard {
    permit: Option<OwnedMutexGuard<()>>,
    locks: LockMap,
    key: String,
}

impl Drop for KeyedGuard {
    fn drop(&mut self) {
        // Release before the cleanup check so a queued waiter is counted
        // through its Arc clone, not the mutex queue.
        self.permit.take();
        let mut map = self.locks.lock();
        if let Some(lock) = map.get(&self.key) {
            if Arc::strong_count(lock) == 1 {
                map.remove(&self.key);
            }
        }
    }
}

#[cfg(test)]
#[path = "keyed_mutex_tests.rs"]
mod tests;
