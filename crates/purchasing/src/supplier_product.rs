//! Which suppliers carry which products, and at what price.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_core::{DomainError, DomainResult, ProductId, SupplierId};
use stockbook_inventory::Product;

use crate::store::PurchasingStore;
use crate::supplier::Supplier;

/// Link between a supplier and a product it sells. One row per pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierProduct {
    pub supplier_id: SupplierId,
    pub product_id: ProductId,
    /// Last agreed price per unit in minor currency units.
    pub last_price: u64,
    pub last_purchase_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SupplierCatalog;

impl SupplierCatalog {
    /// Link `supplier_id` to `product_id`, or refresh the existing link.
    ///
    /// An existing purchase date is kept when `purchased_at` is `None`.
    pub fn link<S>(
        &self,
        store: &mut S,
        supplier_id: SupplierId,
        product_id: ProductId,
        price: u64,
        purchased_at: Option<DateTime<Utc>>,
    ) -> DomainResult<SupplierProduct>
    where
        S: PurchasingStore + ?Sized,
    {
        if price == 0 {
            return Err(DomainError::validation("supplier price must be positive"));
        }
        if store.supplier(supplier_id)?.is_none() {
            return Err(DomainError::not_found("supplier", supplier_id));
        }
        if store.product(product_id)?.is_none() {
            return Err(DomainError::not_found("product", product_id));
        }
        let link = refreshed(
            store.supplier_product(supplier_id, product_id)?,
            supplier_id,
            product_id,
            price,
            purchased_at,
        );
        store.upsert_supplier_product(&link)?;
        tracing::debug!(
            supplier_id = %supplier_id,
            product_id = %product_id,
            price,
            "supplier product linked"
        );
        Ok(link)
    }

    /// Change the price of an existing link.
    pub fn update_price<S>(
        &self,
        store: &mut S,
        supplier_id: SupplierId,
        product_id: ProductId,
        price: u64,
        purchased_at: Option<DateTime<Utc>>,
    ) -> DomainResult<SupplierProduct>
    where
        S: PurchasingStore + ?Sized,
    {
        if price == 0 {
            return Err(DomainError::validation("supplier price must be positive"));
        }
        let existing = store
            .supplier_product(supplier_id, product_id)?
            .ok_or_else(|| {
                DomainError::not_found("supplier product", format!("{supplier_id}/{product_id}"))
            })?;
        let link = refreshed(Some(existing), supplier_id, product_id, price, purchased_at);
        store.upsert_supplier_product(&link)?;
        Ok(link)
    }

    /// Products a supplier carries, ordered by sku.
    pub fn products_for_supplier<S>(
        &self,
        store: &mut S,
        supplier_id: SupplierId,
    ) -> DomainResult<Vec<(Product, SupplierProduct)>>
    where
        S: PurchasingStore + ?Sized,
    {
        if store.supplier(supplier_id)?.is_none() {
            return Err(DomainError::not_found("supplier", supplier_id));
        }
        let mut rows = Vec::new();
        for link in store.supplier_products_for_supplier(supplier_id)? {
            let product = store
                .product(link.product_id)?
                .ok_or_else(|| DomainError::not_found("product", link.product_id))?;
            rows.push((product, link));
        }
        rows.sort_by(|a, b| a.0.sku().cmp(b.0.sku()));
        Ok(rows)
    }

    /// Suppliers carrying a product, ordered by name.
    pub fn suppliers_for_product<S>(
        &self,
        store: &mut S,
        product_id: ProductId,
    ) -> DomainResult<Vec<(Supplier, SupplierProduct)>>
    where
        S: PurchasingStore + ?Sized,
    {
        if store.product(product_id)?.is_none() {
            return Err(DomainError::not_found("product", product_id));
        }
        let mut rows = Vec::new();
        for link in store.supplier_products_for_product(product_id)? {
            let supplier = store
                .supplier(link.supplier_id)?
                .ok_or_else(|| DomainError::not_found("supplier", link.supplier_id))?;
            rows.push((supplier, link));
        }
        rows.sort_by(|a, b| a.0.name.cmp(&b.0.name).then(a.0.id.cmp(&b.0.id)));
        Ok(rows)
    }

    /// Refresh price and date after a purchase. Callers have already
    /// checked that both sides exist.
    pub(crate) fn record_purchase<S>(
        &self,
        store: &mut S,
        supplier_id: SupplierId,
        product_id: ProductId,
        unit_cost: u64,
        at: DateTime<Utc>,
    ) -> DomainResult<()>
    where
        S: PurchasingStore + ?Sized,
    {
        let link = refreshed(
            store.supplier_product(supplier_id, product_id)?,
            supplier_id,
            product_id,
            unit_cost,
            Some(at),
        );
        store.upsert_supplier_product(&link)
    }
}

fn refreshed(
    existing: Option<SupplierProduct>,
    supplier_id: SupplierId,
    product_id: ProductId,
    price: u64,
    purchased_at: Option<DateTime<Utc>>,
) -> SupplierProduct {
    let last_purchase_at = purchased_at.or(existing.and_then(|l| l.last_purchase_at));
    SupplierProduct {
        supplier_id,
        product_id,
        last_price: price,
        last_purchase_at,
    }
}
