//! Purchase order lifecycle.

use stockbook_core::{DomainError, DomainResult, PurchaseOrderId, SupplierId};
use stockbook_inventory::{
    BalancePolicy, MovementLog, MovementReason, MovementReference, NewMovement, ReferenceScope,
    StockLedger,
};

use crate::order::{NewPurchaseLine, PurchaseOrder, PurchaseOrderStatus};
use crate::reception::Reception;
use crate::store::PurchasingStore;
use crate::supplier_product::SupplierCatalog;

#[derive(Debug, Default, Clone, Copy)]
pub struct PurchaseOrderWorkflow {
    ledger: StockLedger,
    log: MovementLog,
    catalog: SupplierCatalog,
}

impl PurchaseOrderWorkflow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an order as Pending, or as Completed for an on-the-spot
    /// purchase. A Completed order with `apply_to_stock` is received in
    /// full immediately. Every line refreshes the supplier's price for
    /// its product.
    pub fn create<S>(
        &self,
        store: &mut S,
        supplier_id: SupplierId,
        lines: Vec<NewPurchaseLine>,
        initial_status: PurchaseOrderStatus,
        apply_to_stock: bool,
    ) -> DomainResult<PurchaseOrder>
    where
        S: PurchasingStore + ?Sized,
    {
        if store.supplier(supplier_id)?.is_none() {
            return Err(DomainError::not_found("supplier", supplier_id));
        }
        for line in &lines {
            if store.product(line.product_id)?.is_none() {
                return Err(DomainError::not_found("product", line.product_id));
            }
        }

        let mut order = PurchaseOrder::new(supplier_id, lines, initial_status)?;
        let received = if initial_status == PurchaseOrderStatus::Completed && apply_to_stock {
            order.receive_in_full()
        } else {
            Vec::new()
        };
        store.insert_purchase_order(&order)?;
        for line in order.lines() {
            self.catalog.record_purchase(
                store,
                supplier_id,
                line.product_id,
                line.unit_cost,
                order.created_at(),
            )?;
        }

        let tag = MovementReference::PurchaseOrder {
            purchase_order_id: order.id(),
        };
        let movements = received
            .into_iter()
            .map(|(product_id, qty)| {
                NewMovement::new(product_id, qty, MovementReason::PurchaseCreation, tag)
            })
            .collect();
        self.ledger
            .apply_batch(store, movements, BalancePolicy::Strict)?;

        tracing::info!(
            purchase_order_id = %order.id(),
            status = order.status().as_str(),
            lines = order.lines().len(),
            "purchase order created"
        );
        Ok(order)
    }

    /// Force the order to Completed regardless of what is still pending.
    pub fn complete<S>(&self, store: &mut S, id: PurchaseOrderId) -> DomainResult<PurchaseOrder>
    where
        S: PurchasingStore + ?Sized,
    {
        let mut order = lock(store, id)?;
        if order.complete()? {
            store.update_purchase_order(&order)?;
            tracing::info!(purchase_order_id = %id, "purchase order completed");
        }
        Ok(order)
    }

    /// Cancel, optionally reversing everything ever applied under the
    /// order's tag. Repeating a cancel is a no-op.
    pub fn cancel<S>(
        &self,
        store: &mut S,
        id: PurchaseOrderId,
        revert_stock: bool,
    ) -> DomainResult<PurchaseOrder>
    where
        S: PurchasingStore + ?Sized,
    {
        let mut order = lock(store, id)?;
        if !order.cancel()? {
            return Ok(order);
        }
        if revert_stock {
            self.revert(store, id)?;
        }
        store.update_purchase_order(&order)?;
        tracing::info!(purchase_order_id = %id, revert_stock, "purchase order cancelled");
        Ok(order)
    }

    /// Soft delete: the order becomes Eliminada and stays listable.
    pub fn delete<S>(
        &self,
        store: &mut S,
        id: PurchaseOrderId,
        revert_stock: bool,
    ) -> DomainResult<PurchaseOrder>
    where
        S: PurchasingStore + ?Sized,
    {
        let mut order = lock(store, id)?;
        if !order.delete()? {
            return Ok(order);
        }
        if revert_stock {
            self.revert(store, id)?;
        }
        store.update_purchase_order(&order)?;
        tracing::info!(purchase_order_id = %id, revert_stock, "purchase order deleted");
        Ok(order)
    }

    pub fn get<S>(&self, store: &mut S, id: PurchaseOrderId) -> DomainResult<PurchaseOrder>
    where
        S: PurchasingStore + ?Sized,
    {
        store
            .purchase_order(id)?
            .ok_or_else(|| DomainError::not_found("purchase order", id))
    }

    pub fn list<S>(
        &self,
        store: &mut S,
        status: Option<PurchaseOrderStatus>,
    ) -> DomainResult<Vec<PurchaseOrder>>
    where
        S: PurchasingStore + ?Sized,
    {
        store.purchase_orders(status)
    }

    pub fn receptions<S>(&self, store: &mut S, id: PurchaseOrderId) -> DomainResult<Vec<Reception>>
    where
        S: PurchasingStore + ?Sized,
    {
        self.get(store, id)?;
        store.receptions_for(id)
    }

    /// Bring the order's tagged net back to zero. Reversals carry the same
    /// tag, so running this twice never reverses twice.
    fn revert<S>(&self, store: &mut S, id: PurchaseOrderId) -> DomainResult<()>
    where
        S: PurchasingStore + ?Sized,
    {
        let net = self
            .log
            .net_by_product(store, ReferenceScope::PurchaseOrder(id))?;
        let tag = MovementReference::PurchaseOrder {
            purchase_order_id: id,
        };
        let movements = net
            .into_iter()
            .map(|(product_id, qty)| {
                NewMovement::new(product_id, -qty, MovementReason::PurchaseReversal, tag)
            })
            .collect();
        self.ledger
            .apply_batch(store, movements, BalancePolicy::Strict)?;
        Ok(())
    }
}

pub(crate) fn lock<S>(store: &mut S, id: PurchaseOrderId) -> DomainResult<PurchaseOrder>
where
    S: PurchasingStore + ?Sized,
{
    store
        .lock_purchase_order(id)?
        .ok_or_else(|| DomainError::not_found("purchase order", id))
}
