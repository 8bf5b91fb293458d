//! Single-threaded `InventoryStore` fake for unit tests.

use std::collections::HashMap;

use stockbook_core::{DomainError, DomainResult, LocationId, ProductId};

use crate::catalog::{Location, Product};
use crate::movement::{ReferenceScope, StockMovement};
use crate::store::InventoryStore;
use crate::threshold::Threshold;

#[derive(Debug, Default)]
pub(crate) struct MemoryInventory {
    pub products: HashMap<ProductId, Product>,
    pub locations: HashMap<LocationId, Location>,
    pub movements: Vec<StockMovement>,
    pub thresholds: HashMap<ProductId, Threshold>,
}

impl InventoryStore for MemoryInventory {
    fn product(&mut self, id: ProductId) -> DomainResult<Option<Product>> {
        Ok(self.products.get(&id).cloned())
    }

    fn lock_product(&mut self, id: ProductId) -> DomainResult<Option<Product>> {
        self.product(id)
    }

    fn products(&mut self) -> DomainResult<Vec<Product>> {
        let mut all: Vec<Product> = self.products.values().cloned().collect();
        all.sort_by(|a, b| a.sku().cmp(b.sku()));
        Ok(all)
    }

    fn insert_product(&mut self, product: &Product) -> DomainResult<()> {
        if self.products.values().any(|p| p.sku() == product.sku()) {
            return Err(DomainError::conflict(format!(
                "sku {} already exists",
                product.sku()
            )));
        }
        self.products.insert(product.id(), product.clone());
        Ok(())
    }

    fn store_stock(&mut self, id: ProductId, stock_actual: i64) -> DomainResult<()> {
        let current = self
            .products
            .get(&id)
            .ok_or_else(|| DomainError::not_found("product", id))?;
        let updated = Product::restore(
            id,
            current.sku().to_string(),
            current.name().to_string(),
            stock_actual,
        );
        self.products.insert(id, updated);
        Ok(())
    }

    fn location(&mut self, id: LocationId) -> DomainResult<Option<Location>> {
        Ok(self.locations.get(&id).cloned())
    }

    fn insert_location(&mut self, location: &Location) -> DomainResult<()> {
        self.locations.insert(location.id, location.clone());
        Ok(())
    }

    fn append_movement(&mut self, movement: &StockMovement) -> DomainResult<()> {
        self.movements.push(movement.clone());
        Ok(())
    }

    fn movements_for_product(&mut self, id: ProductId) -> DomainResult<Vec<StockMovement>> {
        Ok(self
            .movements
            .iter()
            .filter(|m| m.product_id == id)
            .cloned()
            .collect())
    }

    fn movements_in_scope(&mut self, scope: ReferenceScope) -> DomainResult<Vec<StockMovement>> {
        Ok(self
            .movements
            .iter()
            .filter(|m| m.reference.falls_within(scope))
            .cloned()
            .collect())
    }

    fn thresholds(&mut self, id: ProductId) -> DomainResult<Option<Threshold>> {
        Ok(self.thresholds.get(&id).copied())
    }

    fn store_thresholds(&mut self, threshold: &Threshold) -> DomainResult<()> {
        self.thresholds.insert(threshold.product_id, *threshold);
        Ok(())
    }

    fn delete_thresholds(&mut self, id: ProductId) -> DomainResult<()> {
        self.thresholds.remove(&id);
        Ok(())
    }
}
