use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use stockbook_core::{DomainError, DomainResult, ProductId};

use crate::catalog::Product;
use crate::store::InventoryStore;

/// Min/max stock bounds for one product. Zero means "no bound".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Threshold {
    pub product_id: ProductId,
    pub min_value: i64,
    pub max_value: i64,
}

impl Threshold {
    pub fn new(product_id: ProductId, min_value: i64, max_value: i64) -> DomainResult<Self> {
        if min_value < 0 || max_value < 0 {
            return Err(DomainError::threshold(format!(
                "thresholds cannot be negative (min {min_value}, max {max_value})"
            )));
        }
        if min_value > 0 && max_value > 0 && max_value < min_value {
            return Err(DomainError::threshold(format!(
                "max {max_value} is below min {min_value}"
            )));
        }
        Ok(Self {
            product_id,
            min_value,
            max_value,
        })
    }

    pub fn unset(product_id: ProductId) -> Self {
        Self {
            product_id,
            min_value: 0,
            max_value: 0,
        }
    }

    pub fn flags(&self, stock: i64) -> StockFlags {
        StockFlags {
            stock,
            below_min: self.min_value > 0 && stock < self.min_value,
            above_max: self.max_value > 0 && stock > self.max_value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockFlags {
    pub stock: i64,
    pub below_min: bool,
    pub above_max: bool,
}

/// One line of the inventory overview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRow {
    pub product: Product,
    pub threshold: Threshold,
    pub flags: StockFlags,
}

/// Reads stock through the cached aggregate and flags it against thresholds.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThresholdMonitor;

impl ThresholdMonitor {
    /// Configured thresholds, or `{0, 0}` when none are set.
    pub fn get_thresholds<S>(&self, store: &mut S, product_id: ProductId) -> DomainResult<Threshold>
    where
        S: InventoryStore + ?Sized,
    {
        require_product(store, product_id)?;
        Ok(store
            .thresholds(product_id)?
            .unwrap_or_else(|| Threshold::unset(product_id)))
    }

    pub fn set_thresholds<S>(
        &self,
        store: &mut S,
        product_id: ProductId,
        min_value: i64,
        max_value: i64,
    ) -> DomainResult<Threshold>
    where
        S: InventoryStore + ?Sized,
    {
        let threshold = Threshold::new(product_id, min_value, max_value)?;
        require_product(store, product_id)?;
        store.store_thresholds(&threshold)?;
        tracing::info!(product_id = %product_id, min_value, max_value, "thresholds set");
        Ok(threshold)
    }

    pub fn clear<S>(&self, store: &mut S, product_id: ProductId) -> DomainResult<()>
    where
        S: InventoryStore + ?Sized,
    {
        require_product(store, product_id)?;
        store.delete_thresholds(product_id)
    }

    pub fn evaluate<S>(&self, store: &mut S, product_id: ProductId) -> DomainResult<StockFlags>
    where
        S: InventoryStore + ?Sized,
    {
        let product = require_product(store, product_id)?;
        let threshold = store
            .thresholds(product_id)?
            .unwrap_or_else(|| Threshold::unset(product_id));
        Ok(threshold.flags(product.stock_actual()))
    }

    /// Every product with its stock, thresholds and flags, ordered by sku.
    pub fn overview<S>(&self, store: &mut S) -> DomainResult<Vec<InventoryRow>>
    where
        S: InventoryStore + ?Sized,
    {
        self.overview_of(store, None)
    }

    /// Like `overview`, restricted to `only` when given.
    pub fn overview_of<S>(
        &self,
        store: &mut S,
        only: Option<&BTreeSet<ProductId>>,
    ) -> DomainResult<Vec<InventoryRow>>
    where
        S: InventoryStore + ?Sized,
    {
        let mut products = store.products()?;
        if let Some(only) = only {
            products.retain(|p| only.contains(&p.id()));
        }
        products.sort_by(|a, b| a.sku().cmp(b.sku()));
        let mut rows = Vec::with_capacity(products.len());
        for product in products {
            let threshold = store
                .thresholds(product.id())?
                .unwrap_or_else(|| Threshold::unset(product.id()));
            let flags = threshold.flags(product.stock_actual());
            rows.push(InventoryRow {
                product,
                threshold,
                flags,
            });
        }
        Ok(rows)
    }
}

fn require_product<S>(store: &mut S, product_id: ProductId) -> DomainResult<Product>
where
    S: InventoryStore + ?Sized,
{
    store
        .product(product_id)?
        .ok_or_else(|| DomainError::not_found("product", product_id))
}
