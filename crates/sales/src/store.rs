use stockbook_core::{CustomerId, DomainResult, SaleOrderId};
use stockbook_inventory::InventoryStore;

use crate::customer::Customer;
use crate::order::{SaleOrder, SaleOrderStatus};

/// Storage port for sales, layered on the inventory port.
pub trait SalesStore: InventoryStore {
    fn customer(&mut self, id: CustomerId) -> DomainResult<Option<Customer>>;

    fn insert_customer(&mut self, customer: &Customer) -> DomainResult<()>;

    fn sale_order(&mut self, id: SaleOrderId) -> DomainResult<Option<SaleOrder>>;

    /// Read an order and hold its row lock until the transaction ends.
    fn lock_sale_order(&mut self, id: SaleOrderId) -> DomainResult<Option<SaleOrder>>;

    /// Orders newest first, optionally filtered by status.
    fn sale_orders(&mut self, status: Option<SaleOrderStatus>) -> DomainResult<Vec<SaleOrder>>;

    fn insert_sale_order(&mut self, order: &SaleOrder) -> DomainResult<()>;

    fn update_sale_order(&mut self, order: &SaleOrder) -> DomainResult<()>;
}
