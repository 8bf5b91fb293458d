//! Engine facade: one transaction per operation.
//!
//! Every public method opens a unit of work on the backing store, runs the
//! matching domain service against it, and commits on success. Any error
//! rolls the whole operation back, so a failed call leaves no trace in any
//! table.
//!
//! ```text
//! caller
//!   ↓
//! 1. begin transaction
//!   ↓
//! 2. workflow / ledger call (row locks taken as rows are touched)
//!   ↓
//! 3. commit, or rollback on error
//! ```
//!
//! Retrying a `Conflict` is left to the caller.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::instrument;

use stockbook_core::{
    CustomerId, DomainResult, LocationId, ProductId, PurchaseOrderId, ReceptionId, SaleOrderId,
    SupplierId, TransactionalStore, run_in_transaction,
};
use stockbook_inventory::{
    BalancePolicy, Catalog, InventoryRow, InventoryStore, Location, MovementLog, NewMovement, Product,
    Reconciliation, StockFlags, StockLedger, StockMovement, Threshold, ThresholdMonitor, Tracking,
};
use stockbook_purchasing::{
    NewPurchaseLine, PurchaseOrder, PurchaseOrderStatus, PurchaseOrderWorkflow, PurchasingStore,
    ReceiveOptions, Reception, ReceptionHeader, ReceptionLineInput, ReceptionProcessor, Supplier,
    SupplierCatalog, SupplierProduct, Suppliers,
};
use stockbook_sales::{
    Customer, Customers, NewSaleLine, SaleOrder, SaleOrderStatus, SalesOrderWorkflow, SalesPolicy,
    SalesStore,
};

use crate::config::EngineConfig;

/// Transactional entry point over any store whose transactions implement
/// every port.
#[derive(Debug, Clone)]
pub struct InventoryEngine<S> {
    store: S,
    catalog: Catalog,
    log: MovementLog,
    ledger: StockLedger,
    thresholds: ThresholdMonitor,
    suppliers: Suppliers,
    supplier_catalog: SupplierCatalog,
    customers: Customers,
    purchases: PurchaseOrderWorkflow,
    receptions: ReceptionProcessor,
    sales: SalesOrderWorkflow,
}

impl<S> InventoryEngine<S>
where
    S: TransactionalStore,
    S::Tx: PurchasingStore + SalesStore,
{
    pub fn new(store: S, config: &EngineConfig) -> Self {
        Self {
            store,
            catalog: Catalog,
            log: MovementLog,
            ledger: StockLedger::new(),
            thresholds: ThresholdMonitor,
            suppliers: Suppliers,
            supplier_catalog: SupplierCatalog,
            customers: Customers,
            purchases: PurchaseOrderWorkflow::new(),
            receptions: ReceptionProcessor::new(),
            sales: SalesOrderWorkflow::new(SalesPolicy {
                allow_backorder: config.allow_backorder,
            }),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn sales_policy(&self) -> SalesPolicy {
        self.sales.policy()
    }

    // ---- catalog ----

    #[instrument(skip(self), err)]
    pub fn add_product(&self, sku: &str, name: &str) -> DomainResult<Product> {
        run_in_transaction(&self.store, |tx| self.catalog.add_product(tx, sku, name))
    }

    pub fn product(&self, id: ProductId) -> DomainResult<Product> {
        run_in_transaction(&self.store, |tx| self.catalog.product(tx, id))
    }

    #[instrument(skip(self, description), err)]
    pub fn add_location(&self, name: &str, description: Option<String>) -> DomainResult<Location> {
        run_in_transaction(&self.store, |tx| {
            self.catalog.add_location(tx, name, description)
        })
    }

    #[instrument(skip(self), err)]
    pub fn add_supplier(&self, name: &str) -> DomainResult<Supplier> {
        run_in_transaction(&self.store, |tx| self.suppliers.add(tx, name))
    }

    pub fn supplier(&self, id: SupplierId) -> DomainResult<Supplier> {
        run_in_transaction(&self.store, |tx| self.suppliers.get(tx, id))
    }

    #[instrument(skip(self), err)]
    pub fn add_customer(&self, name: &str) -> DomainResult<Customer> {
        run_in_transaction(&self.store, |tx| self.customers.add(tx, name))
    }

    pub fn customer(&self, id: CustomerId) -> DomainResult<Customer> {
        run_in_transaction(&self.store, |tx| self.customers.get(tx, id))
    }

    // ---- ledger ----

    /// Apply one movement. Manual callers normally use the `register_*`
    /// helpers instead.
    #[instrument(skip(self, movement), fields(product_id = %movement.product_id, delta = movement.delta), err)]
    pub fn apply_movement(
        &self,
        movement: NewMovement,
        policy: BalancePolicy,
    ) -> DomainResult<StockMovement> {
        run_in_transaction(&self.store, |tx| {
            self.ledger.apply_movement(tx, movement, policy)
        })
    }

    pub fn current_stock(&self, product_id: ProductId) -> DomainResult<i64> {
        run_in_transaction(&self.store, |tx| self.ledger.current_stock(tx, product_id))
    }

    #[instrument(skip(self, tracking, note), err)]
    pub fn register_entry(
        &self,
        product_id: ProductId,
        quantity: i64,
        location_id: Option<LocationId>,
        tracking: Tracking,
        note: Option<String>,
    ) -> DomainResult<StockMovement> {
        run_in_transaction(&self.store, |tx| {
            self.ledger
                .register_entry(tx, product_id, quantity, location_id, tracking, note)
        })
    }

    #[instrument(skip(self, note), err)]
    pub fn register_exit(
        &self,
        product_id: ProductId,
        quantity: i64,
        location_id: Option<LocationId>,
        note: Option<String>,
    ) -> DomainResult<StockMovement> {
        run_in_transaction(&self.store, |tx| {
            self.ledger
                .register_exit(tx, product_id, quantity, location_id, note)
        })
    }

    #[instrument(skip(self, note), err)]
    pub fn register_correction(
        &self,
        product_id: ProductId,
        delta: i64,
        note: Option<String>,
    ) -> DomainResult<StockMovement> {
        run_in_transaction(&self.store, |tx| {
            self.ledger.register_correction(tx, product_id, delta, note)
        })
    }

    #[instrument(skip(self), err)]
    pub fn record_opening_balance(
        &self,
        product_id: ProductId,
        quantity: i64,
        location_id: Option<LocationId>,
    ) -> DomainResult<StockMovement> {
        run_in_transaction(&self.store, |tx| {
            self.ledger
                .record_opening_balance(tx, product_id, quantity, location_id)
        })
    }

    /// Movements of one product in recording order.
    pub fn history(&self, product_id: ProductId) -> DomainResult<Vec<StockMovement>> {
        run_in_transaction(&self.store, |tx| {
            self.catalog.product(tx, product_id)?;
            self.log.history(tx, product_id)
        })
    }

    #[instrument(skip(self), err)]
    pub fn reconcile(&self, product_id: ProductId) -> DomainResult<Reconciliation> {
        run_in_transaction(&self.store, |tx| self.ledger.reconcile(tx, product_id))
    }

    /// Reconcile every product, returning only the ones that had drifted.
    #[instrument(skip(self), err)]
    pub fn reconcile_all(&self) -> DomainResult<Vec<Reconciliation>> {
        let ids: Vec<ProductId> = run_in_transaction(&self.store, |tx| {
            Ok(tx.products()?.iter().map(|p| p.id()).collect())
        })?;
        let mut drifted = Vec::new();
        for id in ids {
            let report = self.reconcile(id)?;
            if !report.is_consistent() {
                drifted.push(report);
            }
        }
        Ok(drifted)
    }

    // ---- thresholds ----

    pub fn thresholds(&self, product_id: ProductId) -> DomainResult<Threshold> {
        run_in_transaction(&self.store, |tx| {
            self.thresholds.get_thresholds(tx, product_id)
        })
    }

    #[instrument(skip(self), err)]
    pub fn set_thresholds(
        &self,
        product_id: ProductId,
        min_value: i64,
        max_value: i64,
    ) -> DomainResult<Threshold> {
        run_in_transaction(&self.store, |tx| {
            self.thresholds
                .set_thresholds(tx, product_id, min_value, max_value)
        })
    }

    #[instrument(skip(self), err)]
    pub fn clear_thresholds(&self, product_id: ProductId) -> DomainResult<()> {
        run_in_transaction(&self.store, |tx| self.thresholds.clear(tx, product_id))
    }

    pub fn evaluate(&self, product_id: ProductId) -> DomainResult<StockFlags> {
        run_in_transaction(&self.store, |tx| self.thresholds.evaluate(tx, product_id))
    }

    pub fn overview(&self) -> DomainResult<Vec<InventoryRow>> {
        run_in_transaction(&self.store, |tx| self.thresholds.overview(tx))
    }

    /// Overview limited to the products `supplier_id` is linked to.
    pub fn overview_for_supplier(
        &self,
        supplier_id: SupplierId,
    ) -> DomainResult<Vec<InventoryRow>> {
        run_in_transaction(&self.store, |tx| {
            let linked: BTreeSet<ProductId> = self
                .supplier_catalog
                .products_for_supplier(tx, supplier_id)?
                .into_iter()
                .map(|(product, _)| product.id())
                .collect();
            self.thresholds.overview_of(tx, Some(&linked))
        })
    }

    // ---- supplier products ----

    #[instrument(skip(self), err)]
    pub fn link_supplier_product(
        &self,
        supplier_id: SupplierId,
        product_id: ProductId,
        price: u64,
        purchased_at: Option<DateTime<Utc>>,
    ) -> DomainResult<SupplierProduct> {
        run_in_transaction(&self.store, |tx| {
            self.supplier_catalog
                .link(tx, supplier_id, product_id, price, purchased_at)
        })
    }

    #[instrument(skip(self), err)]
    pub fn update_supplier_price(
        &self,
        supplier_id: SupplierId,
        product_id: ProductId,
        price: u64,
        purchased_at: Option<DateTime<Utc>>,
    ) -> DomainResult<SupplierProduct> {
        run_in_transaction(&self.store, |tx| {
            self.supplier_catalog
                .update_price(tx, supplier_id, product_id, price, purchased_at)
        })
    }

    pub fn products_for_supplier(
        &self,
        supplier_id: SupplierId,
    ) -> DomainResult<Vec<(Product, SupplierProduct)>> {
        run_in_transaction(&self.store, |tx| {
            self.supplier_catalog.products_for_supplier(tx, supplier_id)
        })
    }

    pub fn suppliers_for_product(
        &self,
        product_id: ProductId,
    ) -> DomainResult<Vec<(Supplier, SupplierProduct)>> {
        run_in_transaction(&self.store, |tx| {
            self.supplier_catalog.suppliers_for_product(tx, product_id)
        })
    }

    // ---- purchasing ----

    #[instrument(skip(self, lines), fields(lines = lines.len()), err)]
    pub fn create_purchase_order(
        &self,
        supplier_id: SupplierId,
        lines: Vec<NewPurchaseLine>,
        initial_status: PurchaseOrderStatus,
        apply_to_stock: bool,
    ) -> DomainResult<PurchaseOrder> {
        run_in_transaction(&self.store, |tx| {
            self.purchases
                .create(tx, supplier_id, lines, initial_status, apply_to_stock)
        })
    }

    #[instrument(skip(self), err)]
    pub fn complete_purchase_order(&self, id: PurchaseOrderId) -> DomainResult<PurchaseOrder> {
        run_in_transaction(&self.store, |tx| self.purchases.complete(tx, id))
    }

    #[instrument(skip(self), err)]
    pub fn cancel_purchase_order(
        &self,
        id: PurchaseOrderId,
        revert_stock: bool,
    ) -> DomainResult<PurchaseOrder> {
        run_in_transaction(&self.store, |tx| self.purchases.cancel(tx, id, revert_stock))
    }

    #[instrument(skip(self), err)]
    pub fn delete_purchase_order(
        &self,
        id: PurchaseOrderId,
        revert_stock: bool,
    ) -> DomainResult<PurchaseOrder> {
        run_in_transaction(&self.store, |tx| self.purchases.delete(tx, id, revert_stock))
    }

    pub fn purchase_order(&self, id: PurchaseOrderId) -> DomainResult<PurchaseOrder> {
        run_in_transaction(&self.store, |tx| self.purchases.get(tx, id))
    }

    pub fn purchase_orders(
        &self,
        status: Option<PurchaseOrderStatus>,
    ) -> DomainResult<Vec<PurchaseOrder>> {
        run_in_transaction(&self.store, |tx| self.purchases.list(tx, status))
    }

    #[instrument(skip(self, header, lines), fields(lines = lines.len()), err)]
    pub fn receive(
        &self,
        purchase_order_id: PurchaseOrderId,
        header: ReceptionHeader,
        lines: Vec<ReceptionLineInput>,
        options: ReceiveOptions,
    ) -> DomainResult<Reception> {
        run_in_transaction(&self.store, |tx| {
            self.receptions
                .receive(tx, purchase_order_id, header, lines, options)
        })
    }

    pub fn receptions_for(&self, purchase_order_id: PurchaseOrderId) -> DomainResult<Vec<Reception>> {
        run_in_transaction(&self.store, |tx| {
            self.receptions.receptions_for(tx, purchase_order_id)
        })
    }

    pub fn reception(&self, id: ReceptionId) -> DomainResult<Reception> {
        run_in_transaction(&self.store, |tx| self.receptions.get(tx, id))
    }

    // ---- sales ----

    #[instrument(skip(self, lines), fields(lines = lines.len()), err)]
    pub fn create_sale_order(
        &self,
        customer_id: CustomerId,
        lines: Vec<NewSaleLine>,
        status: SaleOrderStatus,
        apply_to_stock: bool,
    ) -> DomainResult<SaleOrder> {
        run_in_transaction(&self.store, |tx| {
            self.sales
                .create(tx, customer_id, lines, status, apply_to_stock)
        })
    }

    #[instrument(skip(self), err)]
    pub fn update_sale_status(
        &self,
        id: SaleOrderId,
        next: SaleOrderStatus,
    ) -> DomainResult<SaleOrder> {
        run_in_transaction(&self.store, |tx| self.sales.update_status(tx, id, next))
    }

    #[instrument(skip(self), err)]
    pub fn cancel_sale_order(&self, id: SaleOrderId, revert_stock: bool) -> DomainResult<SaleOrder> {
        run_in_transaction(&self.store, |tx| self.sales.cancel(tx, id, revert_stock))
    }

    #[instrument(skip(self), err)]
    pub fn delete_sale_order(&self, id: SaleOrderId, revert_stock: bool) -> DomainResult<SaleOrder> {
        run_in_transaction(&self.store, |tx| self.sales.delete(tx, id, revert_stock))
    }

    pub fn sale_order(&self, id: SaleOrderId) -> DomainResult<SaleOrder> {
        run_in_transaction(&self.store, |tx| self.sales.get(tx, id))
    }

    pub fn sale_orders(&self, status: Option<SaleOrderStatus>) -> DomainResult<Vec<SaleOrder>> {
        run_in_transaction(&self.store, |tx| self.sales.list(tx, status))
    }
}
