//! Append-only movement log.

use std::collections::BTreeMap;

use chrono::Utc;
use stockbook_core::{DomainError, DomainResult, MovementId, ProductId};

use crate::movement::{NewMovement, ReferenceScope, StockMovement};
use crate::store::InventoryStore;

/// Records and reads stock movements. Rows are never updated or deleted.
#[derive(Debug, Default, Clone, Copy)]
pub struct MovementLog;

impl MovementLog {
    /// Validate and append one movement.
    ///
    /// Only the ledger calls this, so every appended row is paired with a
    /// `stock_actual` update in the same transaction.
    pub(crate) fn record<S>(&self, store: &mut S, movement: NewMovement) -> DomainResult<StockMovement>
    where
        S: InventoryStore + ?Sized,
    {
        if movement.delta == 0 {
            return Err(DomainError::validation("movement delta cannot be zero"));
        }
        let tracking = movement.tracking.normalized()?;
        if store.product(movement.product_id)?.is_none() {
            return Err(DomainError::not_found("product", movement.product_id));
        }
        if let Some(location_id) = movement.location_id {
            if store.location(location_id)?.is_none() {
                return Err(DomainError::not_found("location", location_id));
            }
        }

        let row = StockMovement {
            id: MovementId::new(),
            product_id: movement.product_id,
            location_id: movement.location_id,
            delta: movement.delta,
            reason: movement.reason,
            reference: movement.reference,
            tracking,
            note: movement
                .note
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            recorded_at: Utc::now(),
        };
        store.append_movement(&row)?;
        tracing::debug!(
            movement_id = %row.id,
            product_id = %row.product_id,
            delta = row.delta,
            reason = row.reason.as_str(),
            reference = row.reference.kind(),
            "movement recorded"
        );
        Ok(row)
    }

    /// A product's movements, oldest first.
    pub fn history<S>(&self, store: &mut S, product_id: ProductId) -> DomainResult<Vec<StockMovement>>
    where
        S: InventoryStore + ?Sized,
    {
        store.movements_for_product(product_id)
    }

    /// Sum of a product's deltas. Equals `stock_actual` when the ledger is consistent.
    pub fn derived_stock<S>(&self, store: &mut S, product_id: ProductId) -> DomainResult<i64>
    where
        S: InventoryStore + ?Sized,
    {
        let movements = store.movements_for_product(product_id)?;
        sum_deltas(movements.iter().map(|m| m.delta))
    }

    /// Net delta per product over every movement tagged to an order.
    ///
    /// Products whose movements cancel out are omitted.
    pub fn net_by_product<S>(
        &self,
        store: &mut S,
        scope: ReferenceScope,
    ) -> DomainResult<BTreeMap<ProductId, i64>>
    where
        S: InventoryStore + ?Sized,
    {
        let mut net: BTreeMap<ProductId, i64> = BTreeMap::new();
        for movement in store.movements_in_scope(scope)? {
            let entry = net.entry(movement.product_id).or_insert(0);
            *entry = entry
                .checked_add(movement.delta)
                .ok_or_else(|| DomainError::validation("movement total overflows"))?;
        }
        net.retain(|_, qty| *qty != 0);
        Ok(net)
    }
}

fn sum_deltas(mut deltas: impl Iterator<Item = i64>) -> DomainResult<i64> {
    deltas.try_fold(0i64, |acc, d| {
        acc.checked_add(d)
            .ok_or_else(|| DomainError::validation("movement total overflows"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::movement::{MovementReason, MovementReference, Tracking};
    use crate::testing::MemoryInventory;
    use stockbook_core::{LocationId, SaleOrderId};

    #[test]
    fn zero_delta_is_rejected() {
        let mut store = MemoryInventory::default();
        let p = Catalog.add_product(&mut store, "P-1", "Bolt").unwrap();
        let err = MovementLog
            .record(
                &mut store,
                NewMovement::new(p.id(), 0, MovementReason::ManualEntry, MovementReference::Manual),
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert!(store.movements.is_empty());
    }

    #[test]
    fn unknown_location_is_not_found() {
        let mut store = MemoryInventory::default();
        let p = Catalog.add_product(&mut store, "P-1", "Bolt").unwrap();
        let err = MovementLog
            .record(
                &mut store,
                NewMovement::new(p.id(), 3, MovementReason::ManualEntry, MovementReference::Manual)
                    .at_location(Some(LocationId::new())),
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { entity: "location", .. }));
    }

    #[test]
    fn tracking_is_normalized_on_record() {
        let mut store = MemoryInventory::default();
        let p = Catalog.add_product(&mut store, "P-1", "Bolt").unwrap();
        let row = MovementLog
            .record(
                &mut store,
                NewMovement::new(p.id(), 3, MovementReason::ManualEntry, MovementReference::Manual)
                    .with_tracking(Tracking {
                        lot: Some(" L-7 ".into()),
                        serial: Some("".into()),
                        expiry: None,
                    }),
            )
            .unwrap();
        assert_eq!(row.tracking.lot.as_deref(), Some("L-7"));
        assert_eq!(row.tracking.serial, None);
    }

    #[test]
    fn net_by_product_drops_products_that_cancel_out() {
        let mut store = MemoryInventory::default();
        let a = Catalog.add_product(&mut store, "A", "A").unwrap();
        let b = Catalog.add_product(&mut store, "B", "B").unwrap();
        let so = SaleOrderId::new();
        let tag = MovementReference::SaleOrder { sale_order_id: so };
        for (product, delta) in [(a.id(), -4), (b.id(), -2), (b.id(), 2)] {
            MovementLog
                .record(
                    &mut store,
                    NewMovement::new(product, delta, MovementReason::SaleDispatch, tag),
                )
                .unwrap();
        }
        let net = MovementLog
            .net_by_product(&mut store, ReferenceScope::SaleOrder(so))
            .unwrap();
        assert_eq!(net.len(), 1);
        assert_eq!(net.get(&a.id()), Some(&-4));
    }
}
