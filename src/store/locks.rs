//! Keyed pessimistic row locks.
//!
//! A [`RowLocks`] table hands out at most one [`RowGuard`] per key at a time.
//! Waiters block until the holder drops its guard or the wait budget runs out.
//! Different keys never contend.

use std::{
    collections::HashSet,
    hash::Hash,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Lock wait timed out")]
pub struct LockTimeout;

#[derive(Debug)]
pub struct RowLocks<K> {
    held: Mutex<HashSet<K>>,
    released: Condvar,
}

impl<K: Eq + Hash + Clone> Default for RowLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone> RowLocks<K> {
    pub fn new() -> Self {
        Self {
            held: Mutex::new(HashSet::new()),
            released: Condvar::new(),
        }
    }

    /// Blocks until `key` is free, then holds it until the returned guard is dropped.
    pub fn lock(self: &Arc<Self>, key: K, timeout: Duration) -> Result<RowGuard<K>, LockTimeout> {
        let held = self.held_keys();
        let (mut held, wait) = self
            .released
            .wait_timeout_while(held, timeout, |held| held.contains(&key))
            .unwrap_or_else(PoisonError::into_inner);
        if wait.timed_out() {
            return Err(LockTimeout);
        }
        held.insert(key.clone());
        Ok(RowGuard {
            locks: Arc::clone(self),
            key,
        })
    }

    pub fn is_locked(&self, key: &K) -> bool {
        self.held_keys().contains(key)
    }

    // The set is only touched by insert/remove, so a poisoned mutex still holds a valid set.
    fn held_keys(&self) -> MutexGuard<'_, HashSet<K>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive hold on one key. Releasing wakes every waiter of the table.
#[derive(Debug)]
pub struct RowGuard<K: Eq + Hash + Clone> {
    locks: Arc<RowLocks<K>>,
    key: K,
}

impl<K: Eq + Hash + Clone> RowGuard<K> {
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K: Eq + Hash + Clone> Drop for RowGuard<K> {
    fn drop(&mut self) {
        self.locks.held_keys().remove(&self.key);
        self.locks.released.notify_all();
    }
}
