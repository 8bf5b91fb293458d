//! Goods receptions against purchase orders.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use stockbook_core::{DomainError, DomainResult, PurchaseOrderId, ReceptionId};
use stockbook_inventory::{
    BalancePolicy, MovementReason, MovementReference, NewMovement, StockLedger,
};

use crate::reception::{Reception, ReceptionHeader, ReceptionLine, ReceptionLineInput};
use crate::store::PurchasingStore;
use crate::supplier_product::SupplierCatalog;
use crate::workflow::lock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveOptions {
    /// Post the received quantities to stock.
    pub apply_to_stock: bool,
    /// Move the order to Incomplete/Completed based on what has arrived.
    pub update_status: bool,
}

impl Default for ReceiveOptions {
    fn default() -> Self {
        Self {
            apply_to_stock: true,
            update_status: true,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ReceptionProcessor {
    ledger: StockLedger,
    catalog: SupplierCatalog,
}

impl ReceptionProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a (possibly partial) reception.
    ///
    /// Lines are checked in order against what is still pending, so a line
    /// number repeated within one reception counts cumulatively. Any failing
    /// line fails the whole call; the caller's transaction then discards
    /// every change made so far.
    pub fn receive<S>(
        &self,
        store: &mut S,
        purchase_order_id: PurchaseOrderId,
        header: ReceptionHeader,
        lines: Vec<ReceptionLineInput>,
        options: ReceiveOptions,
    ) -> DomainResult<Reception>
    where
        S: PurchasingStore + ?Sized,
    {
        let mut order = lock(store, purchase_order_id)?;
        order.ensure_receivable()?;
        if lines.is_empty() {
            return Err(DomainError::validation("reception needs at least one line"));
        }

        let mut received = Vec::with_capacity(lines.len());
        for input in &lines {
            let tracking = input.tracking().normalized().map_err(|err| match err {
                DomainError::Validation(msg) => {
                    DomainError::validation(format!("line {}: {msg}", input.line_no))
                }
                other => other,
            })?;
            if let Some(location_id) = input.location_id {
                if store.location(location_id)?.is_none() {
                    return Err(DomainError::not_found("location", location_id));
                }
            }
            let product_id = order.record_receipt(input.line_no, input.received_qty)?;
            received.push(ReceptionLine {
                line_no: input.line_no,
                product_id,
                received_qty: input.received_qty,
                location_id: input.location_id,
                tracking,
            });
        }

        let reception = Reception {
            id: ReceptionId::new(),
            purchase_order_id,
            header,
            lines: received,
            created_at: Utc::now(),
        };
        let units = reception.total_received()?;
        if units == 0 {
            return Err(DomainError::validation(
                "reception must receive at least one unit",
            ));
        }
        store.insert_reception(&reception)?;
        for line in reception.lines.iter().filter(|l| l.received_qty > 0) {
            let unit_cost = order
                .line(line.line_no)
                .map(|l| l.unit_cost)
                .ok_or_else(|| DomainError::not_found("purchase order line", line.line_no))?;
            self.catalog.record_purchase(
                store,
                order.supplier_id(),
                line.product_id,
                unit_cost,
                reception.created_at,
            )?;
        }

        if options.apply_to_stock {
            let tag = MovementReference::Reception {
                purchase_order_id,
                reception_id: reception.id,
            };
            let movements = reception
                .lines
                .iter()
                .filter(|l| l.received_qty > 0)
                .map(|l| {
                    NewMovement::new(l.product_id, l.received_qty, MovementReason::PurchaseReceipt, tag)
                        .at_location(l.location_id)
                        .with_tracking(l.tracking.clone())
                })
                .collect();
            self.ledger
                .apply_batch(store, movements, BalancePolicy::Strict)?;
        }

        if options.update_status {
            let next = order.status_after_receipt();
            order.set_status(next);
        }
        store.update_purchase_order(&order)?;

        tracing::info!(
            purchase_order_id = %purchase_order_id,
            reception_id = %reception.id,
            units,
            status = order.status().as_str(),
            "reception registered"
        );
        Ok(reception)
    }

    pub fn receptions_for<S>(
        &self,
        store: &mut S,
        purchase_order_id: PurchaseOrderId,
    ) -> DomainResult<Vec<Reception>>
    where
        S: PurchasingStore + ?Sized,
    {
        if store.purchase_order(purchase_order_id)?.is_none() {
            return Err(DomainError::not_found("purchase order", purchase_order_id));
        }
        store.receptions_for(purchase_order_id)
    }

    pub fn get<S>(&self, store: &mut S, id: ReceptionId) -> DomainResult<Reception>
    where
        S: PurchasingStore + ?Sized,
    {
        store
            .reception(id)?
            .ok_or_else(|| DomainError::not_found("reception", id))
    }
}
