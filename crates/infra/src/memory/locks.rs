//! Row-lock table for the in-memory store.

use std::collections::{HashMap, HashSet};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use stockbook_core::{DomainError, DomainResult, ProductId, PurchaseOrderId, SaleOrderId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum RowKey {
    Product(ProductId),
    PurchaseOrder(PurchaseOrderId),
    SaleOrder(SaleOrderId),
}

/// Exclusive row locks owned by transactions.
///
/// Locks are re-entrant per transaction and held until commit or rollback.
/// A waiter that exceeds the timeout fails with `Conflict`.
#[derive(Debug, Default)]
pub(crate) struct RowLocks {
    held: Mutex<HashMap<RowKey, u64>>,
    released: Condvar,
}

impl RowLocks {
    pub(crate) fn acquire(&self, key: RowKey, owner: u64, timeout: Duration) -> DomainResult<()> {
        let deadline = Instant::now() + timeout;
        let mut held = self
            .held
            .lock()
            .map_err(|_| DomainError::storage("row lock table poisoned"))?;
        loop {
            match held.get(&key) {
                None => {
                    held.insert(key, owner);
                    return Ok(());
                }
                Some(current) if *current == owner => return Ok(()),
                Some(_) => {}
            }
            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(?key, owner, "row lock wait timed out");
                return Err(DomainError::conflict(format!(
                    "timed out waiting for lock on {key:?}"
                )));
            }
            let (guard, _) = self
                .released
                .wait_timeout(held, deadline - now)
                .map_err(|_| DomainError::storage("row lock table poisoned"))?;
            held = guard;
        }
    }

    /// Release every lock in `keys` owned by `owner` and wake waiters.
    ///
    /// Never fails: it runs on rollback and from `Drop`.
    pub(crate) fn release_all(&self, owner: u64, keys: &HashSet<RowKey>) {
        if keys.is_empty() {
            return;
        }
        let mut held = self.lock_unpoisoned();
        for key in keys {
            if held.get(key) == Some(&owner) {
                held.remove(key);
            }
        }
        drop(held);
        self.released.notify_all();
    }

    fn lock_unpoisoned(&self) -> MutexGuard<'_, HashMap<RowKey, u64>> {
        match self.held.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn locks_are_reentrant_for_the_owner() {
        let locks = RowLocks::default();
        let key = RowKey::Product(ProductId::new());
        locks.acquire(key, 1, Duration::from_millis(10)).unwrap();
        locks.acquire(key, 1, Duration::from_millis(10)).unwrap();
    }

    #[test]
    fn contended_lock_times_out_as_conflict() {
        let locks = RowLocks::default();
        let key = RowKey::Product(ProductId::new());
        locks.acquire(key, 1, Duration::from_millis(10)).unwrap();
        let err = locks.acquire(key, 2, Duration::from_millis(20)).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn release_wakes_a_waiter() {
        let locks = Arc::new(RowLocks::default());
        let key = RowKey::SaleOrder(SaleOrderId::new());
        locks.acquire(key, 1, Duration::from_millis(10)).unwrap();

        let waiter = {
            let locks = locks.clone();
            thread::spawn(move || locks.acquire(key, 2, Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(20));
        locks.release_all(1, &HashSet::from([key]));
        waiter.join().unwrap().unwrap();
    }
}
