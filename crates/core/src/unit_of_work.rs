//! Unit-of-work contract.
//!
//! Every engine operation receives an explicit transaction value (`&mut Tx`)
//! scoped to that one call. Workflows never begin or finish transactions
//! themselves; the caller boundary does, through `run_in_transaction`.

use std::sync::Arc;

use crate::error::DomainResult;

/// One open transaction against the store.
///
/// Dropping a unit of work without calling `commit` must behave like
/// `rollback`: nothing it wrote becomes visible and every row lock it holds
/// is released.
pub trait UnitOfWork {
    fn commit(self) -> DomainResult<()>;

    fn rollback(self) -> DomainResult<()>;
}

/// A store that hands out transactions.
pub trait TransactionalStore: Send + Sync {
    type Tx: UnitOfWork;

    fn begin(&self) -> DomainResult<Self::Tx>;
}

impl<S> TransactionalStore for Arc<S>
where
    S: TransactionalStore + ?Sized,
{
    type Tx = S::Tx;

    fn begin(&self) -> DomainResult<Self::Tx> {
        (**self).begin()
    }
}

/// Run `op` inside a fresh transaction.
///
/// Commits when `op` succeeds; rolls back and returns the operation's error
/// otherwise. A failed rollback is logged, never allowed to mask the
/// original error.
pub fn run_in_transaction<S, T, F>(store: &S, op: F) -> DomainResult<T>
where
    S: TransactionalStore + ?Sized,
    F: FnOnce(&mut S::Tx) -> DomainResult<T>,
{
    let mut tx = store.begin()?;
    match op(&mut tx) {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback() {
                tracing::warn!(error = %rollback_err, "rollback failed after operation error");
            }
            Err(err)
        }
    }
}
