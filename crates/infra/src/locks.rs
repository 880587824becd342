//! Per-entity mutual exclusion for read-validate-commit cycles.
//!
//! Every unit of work names up front all the entities it will write, and
//! acquires them through one [`LockManager`] call. Keys are taken in their
//! `Ord` order, so two units of work over overlapping sets (e.g. transfers
//! A→B and B→A confirmed at once) can never wait on each other in a cycle.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use fleetstock_inventory::{StockKey, TransferId};
use fleetstock_payables::InvoiceId;

use crate::store::{IdempotencyKey, StoreError};

/// Lockable entity. Variant order is part of the global acquisition order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockKey {
    Stock(StockKey),
    Transfer(TransferId),
    Invoice(InvoiceId),
    InvoiceBranch(u32),
    Idempotency(IdempotencyKey),
}

impl core::fmt::Display for LockKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            LockKey::Stock(key) => write!(f, "stock {}@{}", key.item_id, key.warehouse_id),
            LockKey::Transfer(id) => write!(f, "transfer {id}"),
            LockKey::Invoice(id) => write!(f, "invoice {id}"),
            LockKey::InvoiceBranch(branch) => write!(f, "invoice branch {branch}"),
            LockKey::Idempotency(key) => write!(f, "idempotency key '{key}'"),
        }
    }
}

/// Blocking lock table keyed by [`LockKey`].
#[derive(Debug)]
pub struct LockManager {
    held: Mutex<HashSet<LockKey>>,
    released: Condvar,
    timeout: Duration,
}

impl LockManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            held: Mutex::new(HashSet::new()),
            released: Condvar::new(),
            timeout,
        }
    }

    /// Acquire every key (duplicates collapse), waiting at most the configured
    /// timeout overall. On timeout nothing stays held.
    pub fn acquire<I>(&self, keys: I) -> Result<LockGuard<'_>, StoreError>
    where
        I: IntoIterator<Item = LockKey>,
    {
        let ordered: BTreeSet<LockKey> = keys.into_iter().collect();
        let deadline = Instant::now() + self.timeout;
        let mut guard = LockGuard {
            manager: self,
            keys: Vec::with_capacity(ordered.len()),
        };

        let mut held = self.held.lock().map_err(|_| StoreError::Poisoned)?;
        for key in ordered {
            while held.contains(&key) {
                let now = Instant::now();
                if now >= deadline {
                    drop(held);
                    tracing::warn!(lock = %key, timeout_ms = self.timeout.as_millis() as u64, "lock wait timed out");
                    // `guard` releases what was already taken.
                    return Err(StoreError::LockTimeout(key.to_string()));
                }
                let (next, _) = self
                    .released
                    .wait_timeout(held, deadline - now)
                    .map_err(|_| StoreError::Poisoned)?;
                held = next;
            }
            held.insert(key.clone());
            guard.keys.push(key);
        }

        Ok(guard)
    }

    fn release(&self, keys: &[LockKey]) {
        if keys.is_empty() {
            return;
        }
        let mut held = self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        for key in keys {
            held.remove(key);
        }
        drop(held);
        self.released.notify_all();
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new(Duration::from_millis(crate::config::DEFAULT_LOCK_TIMEOUT_MS))
    }
}

/// Keys held by one unit of work; released on drop.
#[derive(Debug)]
pub struct LockGuard<'a> {
    manager: &'a LockManager,
    keys: Vec<LockKey>,
}

impl LockGuard<'_> {
    pub fn keys(&self) -> &[LockKey] {
        &self.keys
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.manager.release(&self.keys);
    }
}
