//! Storage port for the inventory module.
//!
//! Implemented by transaction types of the storage backends. Every method
//! runs inside the caller's transaction; nothing here commits.

use stockbook_core::{DomainResult, LocationId, ProductId};

use crate::catalog::{Location, Product};
use crate::movement::{ReferenceScope, StockMovement};
use crate::threshold::Threshold;

pub trait InventoryStore {
    /// Read a product as last committed (or as written by this transaction).
    fn product(&mut self, id: ProductId) -> DomainResult<Option<Product>>;

    /// Read a product and hold its row lock until the transaction ends.
    ///
    /// Concurrent writers to the same product wait here, which serializes
    /// read-modify-write cycles on `stock_actual`.
    fn lock_product(&mut self, id: ProductId) -> DomainResult<Option<Product>>;

    /// All products, ordered by sku.
    fn products(&mut self) -> DomainResult<Vec<Product>>;

    /// Insert a new product. Duplicate skus are a `Conflict`.
    fn insert_product(&mut self, product: &Product) -> DomainResult<()>;

    /// Overwrite the cached stock aggregate. Callers must hold the row lock.
    fn store_stock(&mut self, id: ProductId, stock_actual: i64) -> DomainResult<()>;

    fn location(&mut self, id: LocationId) -> DomainResult<Option<Location>>;

    fn insert_location(&mut self, location: &Location) -> DomainResult<()>;

    /// Append one row to the movement log. There is no update or delete.
    fn append_movement(&mut self, movement: &StockMovement) -> DomainResult<()>;

    /// A product's movements in recording order.
    fn movements_for_product(&mut self, id: ProductId) -> DomainResult<Vec<StockMovement>>;

    /// Movements tagged to an order, in recording order.
    fn movements_in_scope(&mut self, scope: ReferenceScope) -> DomainResult<Vec<StockMovement>>;

    fn thresholds(&mut self, id: ProductId) -> DomainResult<Option<Threshold>>;

    fn store_thresholds(&mut self, threshold: &Threshold) -> DomainResult<()>;

    fn delete_thresholds(&mut self, id: ProductId) -> DomainResult<()>;
}
