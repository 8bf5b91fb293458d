//! Stock ledger: the only writer of movements and of the cached aggregate.

use serde::{Deserialize, Serialize};
use stockbook_core::{DomainError, DomainResult, LocationId, ProductId};

use crate::catalog::Product;
use crate::log::MovementLog;
use crate::movement::{MovementReason, MovementReference, NewMovement, StockMovement, Tracking};
use crate::store::InventoryStore;

/// Whether a movement may drive stock below zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalancePolicy {
    /// Reject any movement that leaves stock negative.
    #[default]
    Strict,
    /// Allow a negative result. Used for explicit corrections and backorders.
    CorrectiveOverride,
}

/// Cached versus log-derived stock for one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub product_id: ProductId,
    pub cached: i64,
    pub derived: i64,
    /// `cached - derived`, clamped to the `i64` range.
    pub drift: i64,
}

impl Reconciliation {
    pub fn is_consistent(&self) -> bool {
        self.drift == 0
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StockLedger {
    log: MovementLog,
}

impl StockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `movement` and update the product's cached stock, both inside
    /// the caller's transaction.
    pub fn apply_movement<S>(
        &self,
        store: &mut S,
        movement: NewMovement,
        policy: BalancePolicy,
    ) -> DomainResult<StockMovement>
    where
        S: InventoryStore + ?Sized,
    {
        let product = store
            .lock_product(movement.product_id)?
            .ok_or_else(|| DomainError::not_found("product", movement.product_id))?;
        let next = next_stock(&product, movement.delta, policy)?;
        let row = self.log.record(store, movement)?;
        store.store_stock(product.id(), next)?;
        tracing::info!(
            product_id = %product.id(),
            delta = row.delta,
            stock = next,
            reason = row.reason.as_str(),
            "stock updated"
        );
        Ok(row)
    }

    /// Apply several movements in one go.
    ///
    /// Every touched product is locked up front in ascending id order, so two
    /// batches over the same products cannot deadlock. The first failure is
    /// returned and the caller's transaction is expected to roll back.
    pub fn apply_batch<S>(
        &self,
        store: &mut S,
        movements: Vec<NewMovement>,
        policy: BalancePolicy,
    ) -> DomainResult<Vec<StockMovement>>
    where
        S: InventoryStore + ?Sized,
    {
        let mut ids: Vec<ProductId> = movements.iter().map(|m| m.product_id).collect();
        ids.sort();
        ids.dedup();
        for id in ids {
            if store.lock_product(id)?.is_none() {
                return Err(DomainError::not_found("product", id));
            }
        }
        movements
            .into_iter()
            .map(|m| self.apply_movement(store, m, policy))
            .collect()
    }

    pub fn current_stock<S>(&self, store: &mut S, product_id: ProductId) -> DomainResult<i64>
    where
        S: InventoryStore + ?Sized,
    {
        store
            .product(product_id)?
            .map(|p| p.stock_actual())
            .ok_or_else(|| DomainError::not_found("product", product_id))
    }

    /// Manual goods-in.
    pub fn register_entry<S>(
        &self,
        store: &mut S,
        product_id: ProductId,
        quantity: i64,
        location_id: Option<LocationId>,
        tracking: Tracking,
        note: Option<String>,
    ) -> DomainResult<StockMovement>
    where
        S: InventoryStore + ?Sized,
    {
        positive(quantity, "entry")?;
        let movement = NewMovement::new(
            product_id,
            quantity,
            MovementReason::ManualEntry,
            MovementReference::Manual,
        )
        .at_location(location_id)
        .with_tracking(tracking)
        .with_note(note);
        self.apply_movement(store, movement, BalancePolicy::Strict)
    }

    /// Manual goods-out. Fails with `InsufficientStock` rather than going negative.
    pub fn register_exit<S>(
        &self,
        store: &mut S,
        product_id: ProductId,
        quantity: i64,
        location_id: Option<LocationId>,
        note: Option<String>,
    ) -> DomainResult<StockMovement>
    where
        S: InventoryStore + ?Sized,
    {
        positive(quantity, "exit")?;
        let movement = NewMovement::new(
            product_id,
            -quantity,
            MovementReason::ManualExit,
            MovementReference::Manual,
        )
        .at_location(location_id)
        .with_note(note);
        self.apply_movement(store, movement, BalancePolicy::Strict)
    }

    /// Signed adjustment after a physical count. May leave stock negative.
    pub fn register_correction<S>(
        &self,
        store: &mut S,
        product_id: ProductId,
        delta: i64,
        note: Option<String>,
    ) -> DomainResult<StockMovement>
    where
        S: InventoryStore + ?Sized,
    {
        let movement = NewMovement::new(
            product_id,
            delta,
            MovementReason::Correction,
            MovementReference::Manual,
        )
        .with_note(note);
        self.apply_movement(store, movement, BalancePolicy::CorrectiveOverride)
    }

    pub fn record_opening_balance<S>(
        &self,
        store: &mut S,
        product_id: ProductId,
        quantity: i64,
        location_id: Option<LocationId>,
    ) -> DomainResult<StockMovement>
    where
        S: InventoryStore + ?Sized,
    {
        positive(quantity, "opening balance")?;
        let movement = NewMovement::new(
            product_id,
            quantity,
            MovementReason::OpeningBalance,
            MovementReference::Manual,
        )
        .at_location(location_id);
        self.apply_movement(store, movement, BalancePolicy::Strict)
    }

    /// Compare the cached aggregate with the log and rewrite the cache when
    /// they disagree. The log always wins.
    pub fn reconcile<S>(&self, store: &mut S, product_id: ProductId) -> DomainResult<Reconciliation>
    where
        S: InventoryStore + ?Sized,
    {
        let product = store
            .lock_product(product_id)?
            .ok_or_else(|| DomainError::not_found("product", product_id))?;
        let derived = self.log.derived_stock(store, product_id)?;
        let cached = product.stock_actual();
        let report = Reconciliation {
            product_id,
            cached,
            derived,
            drift: cached.saturating_sub(derived),
        };
        if !report.is_consistent() {
            tracing::warn!(
                product_id = %product_id,
                cached,
                derived,
                "stock cache drifted from movement log; rewriting"
            );
            store.store_stock(product_id, derived)?;
        }
        Ok(report)
    }
}

fn next_stock(product: &Product, delta: i64, policy: BalancePolicy) -> DomainResult<i64> {
    let current = product.stock_actual();
    let next = current
        .checked_add(delta)
        .ok_or_else(|| DomainError::validation("stock quantity overflows"))?;
    if next < 0 && policy == BalancePolicy::Strict {
        return Err(DomainError::InsufficientStock {
            product_id: product.id(),
            available: current,
            requested: -delta,
        });
    }
    Ok(next)
}

fn positive(quantity: i64, what: &str) -> DomainResult<()> {
    if quantity <= 0 {
        return Err(DomainError::validation(format!(
            "{what} quantity must be positive, got {quantity}"
        )));
    }
    Ok(())
}
