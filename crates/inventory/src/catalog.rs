use serde::{Deserialize, Serialize};

use stockbook_core::{DomainError, DomainResult, Entity, LocationId, ProductId};

use crate::store::InventoryStore;

/// A stocked product (one SKU) with its cached stock aggregate.
///
/// `stock_actual` is a cache of the movement log. It is only written by the
/// ledger, in the same transaction as the movement that changes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    sku: String,
    name: String,
    stock_actual: i64,
}

impl Product {
    /// A new product with zero stock. Opening stock is recorded as a movement.
    pub fn new(sku: impl Into<String>, name: impl Into<String>) -> DomainResult<Self> {
        let sku = sku.into().trim().to_string();
        let name = name.into().trim().to_string();
        if sku.is_empty() {
            return Err(DomainError::validation("sku cannot be empty"));
        }
        if name.is_empty() {
            return Err(DomainError::validation("product name cannot be empty"));
        }
        Ok(Self {
            id: ProductId::new(),
            sku,
            name,
            stock_actual: 0,
        })
    }

    /// Rebuild a product from a stored row.
    pub fn restore(id: ProductId, sku: String, name: String, stock_actual: i64) -> Self {
        Self {
            id,
            sku,
            name,
            stock_actual,
        }
    }

    pub fn id(&self) -> ProductId {
        self.id
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stock_actual(&self) -> i64 {
        self.stock_actual
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> ProductId {
        self.id
    }
}

/// Named storage bucket. Movements may reference one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
    pub description: Option<String>,
}

impl Location {
    pub fn new(name: impl Into<String>, description: Option<String>) -> DomainResult<Self> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(DomainError::validation("location name cannot be empty"));
        }
        Ok(Self {
            id: LocationId::new(),
            name,
            description,
        })
    }
}

impl Entity for Location {
    type Id = LocationId;

    fn id(&self) -> LocationId {
        self.id
    }
}

/// Registers products and locations.
#[derive(Debug, Default, Clone, Copy)]
pub struct Catalog;

impl Catalog {
    pub fn add_product<S>(&self, store: &mut S, sku: &str, name: &str) -> DomainResult<Product>
    where
        S: InventoryStore + ?Sized,
    {
        let product = Product::new(sku, name)?;
        store.insert_product(&product)?;
        tracing::info!(product_id = %product.id(), sku = product.sku(), "product registered");
        Ok(product)
    }

    pub fn add_location<S>(
        &self,
        store: &mut S,
        name: &str,
        description: Option<String>,
    ) -> DomainResult<Location>
    where
        S: InventoryStore + ?Sized,
    {
        let location = Location::new(name, description)?;
        store.insert_location(&location)?;
        Ok(location)
    }

    pub fn product<S>(&self, store: &mut S, id: ProductId) -> DomainResult<Product>
    where
        S: InventoryStore + ?Sized,
    {
        store
            .product(id)?
            .ok_or_else(|| DomainError::not_found("product", id))
    }
}
