use stockbook_core::{DomainResult, ProductId, PurchaseOrderId, ReceptionId, SupplierId};
use stockbook_inventory::InventoryStore;

use crate::order::{PurchaseOrder, PurchaseOrderStatus};
use crate::reception::Reception;
use crate::supplier::Supplier;
use crate::supplier_product::SupplierProduct;

/// Storage port for purchasing. Extends the inventory port so workflows can
/// move stock in the same transaction that changes the order.
pub trait PurchasingStore: InventoryStore {
    fn supplier(&mut self, id: SupplierId) -> DomainResult<Option<Supplier>>;

    fn insert_supplier(&mut self, supplier: &Supplier) -> DomainResult<()>;

    fn purchase_order(&mut self, id: PurchaseOrderId) -> DomainResult<Option<PurchaseOrder>>;

    /// Read an order and hold its row lock until the transaction ends.
    fn lock_purchase_order(&mut self, id: PurchaseOrderId)
    -> DomainResult<Option<PurchaseOrder>>;

    /// Orders newest first, optionally filtered by status.
    fn purchase_orders(
        &mut self,
        status: Option<PurchaseOrderStatus>,
    ) -> DomainResult<Vec<PurchaseOrder>>;

    fn insert_purchase_order(&mut self, order: &PurchaseOrder) -> DomainResult<()>;

    /// Persist status and line quantities. Callers must hold the row lock.
    fn update_purchase_order(&mut self, order: &PurchaseOrder) -> DomainResult<()>;

    fn insert_reception(&mut self, reception: &Reception) -> DomainResult<()>;

    fn reception(&mut self, id: ReceptionId) -> DomainResult<Option<Reception>>;

    /// An order's receptions, oldest first.
    fn receptions_for(&mut self, id: PurchaseOrderId) -> DomainResult<Vec<Reception>>;

    fn supplier_product(
        &mut self,
        supplier_id: SupplierId,
        product_id: ProductId,
    ) -> DomainResult<Option<SupplierProduct>>;

    /// Insert or replace the link for the pair.
    fn upsert_supplier_product(&mut self, link: &SupplierProduct) -> DomainResult<()>;

    fn supplier_products_for_supplier(
        &mut self,
        supplier_id: SupplierId,
    ) -> DomainResult<Vec<SupplierProduct>>;

    fn supplier_products_for_product(
        &mut self,
        product_id: ProductId,
    ) -> DomainResult<Vec<SupplierProduct>>;
}
