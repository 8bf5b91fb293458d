//! Sale order lifecycle and its stock effects.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use stockbook_core::{CustomerId, DomainError, DomainResult, SaleOrderId};
use stockbook_inventory::{
    BalancePolicy, MovementLog, MovementReason, MovementReference, NewMovement, ReferenceScope,
    StockLedger,
};

use crate::order::{NewSaleLine, SaleOrder, SaleOrderStatus};
use crate::store::SalesStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesPolicy {
    /// Let sales drive stock below zero instead of failing with
    /// `InsufficientStock`.
    pub allow_backorder: bool,
}

impl SalesPolicy {
    fn balance(&self) -> BalancePolicy {
        if self.allow_backorder {
            BalancePolicy::CorrectiveOverride
        } else {
            BalancePolicy::Strict
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SalesOrderWorkflow {
    ledger: StockLedger,
    log: MovementLog,
    policy: SalesPolicy,
}

impl SalesOrderWorkflow {
    pub fn new(policy: SalesPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> SalesPolicy {
        self.policy
    }

    /// Create an order in any status. A Pagada order with `apply_to_stock`
    /// takes its stock right away, all lines or none.
    pub fn create<S>(
        &self,
        store: &mut S,
        customer_id: CustomerId,
        lines: Vec<NewSaleLine>,
        status: SaleOrderStatus,
        apply_to_stock: bool,
    ) -> DomainResult<SaleOrder>
    where
        S: SalesStore + ?Sized,
    {
        if store.customer(customer_id)?.is_none() {
            return Err(DomainError::not_found("customer", customer_id));
        }
        for line in &lines {
            if store.product(line.product_id)?.is_none() {
                return Err(DomainError::not_found("product", line.product_id));
            }
        }
        let order = SaleOrder::new(customer_id, lines, status)?;
        store.insert_sale_order(&order)?;
        if apply_to_stock {
            self.sync_stock(store, &order, status)?;
        }
        tracing::info!(
            sale_order_id = %order.id(),
            status = order.status().as_str(),
            total = order.total(),
            "sale order created"
        );
        Ok(order)
    }

    /// Move the order to `next`, bringing its tagged stock in line.
    pub fn update_status<S>(
        &self,
        store: &mut S,
        id: SaleOrderId,
        next: SaleOrderStatus,
    ) -> DomainResult<SaleOrder>
    where
        S: SalesStore + ?Sized,
    {
        let mut order = lock(store, id)?;
        let previous = order.status();
        if !order.transition(next)? {
            return Ok(order);
        }
        self.sync_stock(store, &order, next)?;
        store.update_sale_order(&order)?;
        tracing::info!(
            sale_order_id = %id,
            from = previous.as_str(),
            to = next.as_str(),
            "sale order status changed"
        );
        Ok(order)
    }

    /// Cancel, releasing the order's stock when `revert_stock` is set.
    /// Cancelling twice is a no-op.
    pub fn cancel<S>(
        &self,
        store: &mut S,
        id: SaleOrderId,
        revert_stock: bool,
    ) -> DomainResult<SaleOrder>
    where
        S: SalesStore + ?Sized,
    {
        let mut order = lock(store, id)?;
        if !order.cancel()? {
            return Ok(order);
        }
        if revert_stock {
            self.sync_stock(store, &order, SaleOrderStatus::Cancelada)?;
        }
        store.update_sale_order(&order)?;
        tracing::info!(sale_order_id = %id, revert_stock, "sale order cancelled");
        Ok(order)
    }

    /// Soft delete. The order stays listable as Eliminada.
    pub fn delete<S>(
        &self,
        store: &mut S,
        id: SaleOrderId,
        revert_stock: bool,
    ) -> DomainResult<SaleOrder>
    where
        S: SalesStore + ?Sized,
    {
        let mut order = lock(store, id)?;
        if !order.delete() {
            return Ok(order);
        }
        if revert_stock {
            self.sync_stock(store, &order, SaleOrderStatus::Eliminada)?;
        }
        store.update_sale_order(&order)?;
        tracing::info!(sale_order_id = %id, revert_stock, "sale order deleted");
        Ok(order)
    }

    pub fn get<S>(&self, store: &mut S, id: SaleOrderId) -> DomainResult<SaleOrder>
    where
        S: SalesStore + ?Sized,
    {
        store
            .sale_order(id)?
            .ok_or_else(|| DomainError::not_found("sale order", id))
    }

    pub fn list<S>(
        &self,
        store: &mut S,
        status: Option<SaleOrderStatus>,
    ) -> DomainResult<Vec<SaleOrder>>
    where
        S: SalesStore + ?Sized,
    {
        store.sale_orders(status)
    }

    /// Apply the difference between what `status` requires and what is
    /// already tagged to the order. Re-running with the same status writes
    /// nothing.
    fn sync_stock<S>(
        &self,
        store: &mut S,
        order: &SaleOrder,
        status: SaleOrderStatus,
    ) -> DomainResult<()>
    where
        S: SalesStore + ?Sized,
    {
        let current = self
            .log
            .net_by_product(store, ReferenceScope::SaleOrder(order.id()))?;
        let target = order.stock_target(status)?;
        let products: BTreeSet<_> = current.keys().chain(target.keys()).copied().collect();
        let tag = MovementReference::SaleOrder {
            sale_order_id: order.id(),
        };

        let mut movements = Vec::new();
        for product_id in products {
            let have = current.get(&product_id).copied().unwrap_or(0);
            let want = target.get(&product_id).copied().unwrap_or(0);
            let delta = want
                .checked_sub(have)
                .ok_or_else(|| DomainError::validation("sale stock adjustment overflows"))?;
            if delta == 0 {
                continue;
            }
            let reason = if delta < 0 {
                MovementReason::SaleDispatch
            } else {
                MovementReason::SaleReversal
            };
            movements.push(NewMovement::new(product_id, delta, reason, tag));
        }
        self.ledger
            .apply_batch(store, movements, self.policy.balance())?;
        Ok(())
    }
}

fn lock<S>(store: &mut S, id: SaleOrderId) -> DomainResult<SaleOrder>
where
    S: SalesStore + ?Sized,
{
    store
        .lock_sale_order(id)?
        .ok_or_else(|| DomainError::not_found("sale order", id))
}
