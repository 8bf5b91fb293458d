//! In-memory transactional store.
//!
//! Committed data lives in one shared table set. Each transaction buffers
//! its writes privately and publishes them in one step on commit, so other
//! transactions only ever see committed state. Writers serialize on row
//! locks (`RowLocks`), which are released after the commit is published.
//!
//! Intended for tests/dev. Not optimized for performance.

mod locks;

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard};
use std::time::Duration;

use stockbook_core::{
    CustomerId, DomainError, DomainResult, Entity, LocationId, ProductId, PurchaseOrderId,
    ReceptionId, SaleOrderId, SupplierId, TransactionalStore, UnitOfWork,
};
use stockbook_inventory::{
    InventoryStore, Location, Product, ReferenceScope, StockMovement, Threshold,
};
use stockbook_purchasing::{
    PurchaseOrder, PurchaseOrderStatus, PurchasingStore, Reception, Supplier, SupplierProduct,
};
use stockbook_sales::{Customer, SaleOrder, SaleOrderStatus, SalesStore};

use crate::config::EngineConfig;
use locks::{RowKey, RowLocks};

#[derive(Debug, Default, Clone)]
struct Tables {
    products: HashMap<ProductId, Product>,
    locations: HashMap<LocationId, Location>,
    suppliers: HashMap<SupplierId, Supplier>,
    customers: HashMap<CustomerId, Customer>,
    movements: Vec<StockMovement>,
    purchase_orders: HashMap<PurchaseOrderId, PurchaseOrder>,
    receptions: Vec<Reception>,
    sale_orders: HashMap<SaleOrderId, SaleOrder>,
    thresholds: HashMap<ProductId, Threshold>,
    supplier_products: HashMap<(SupplierId, ProductId), SupplierProduct>,
}

/// Writes buffered by one transaction.
#[derive(Debug, Default)]
struct Pending {
    products: HashMap<ProductId, Product>,
    locations: HashMap<LocationId, Location>,
    suppliers: HashMap<SupplierId, Supplier>,
    customers: HashMap<CustomerId, Customer>,
    movements: Vec<StockMovement>,
    purchase_orders: HashMap<PurchaseOrderId, PurchaseOrder>,
    receptions: Vec<Reception>,
    sale_orders: HashMap<SaleOrderId, SaleOrder>,
    /// `None` marks a deletion.
    thresholds: HashMap<ProductId, Option<Threshold>>,
    supplier_products: HashMap<(SupplierId, ProductId), SupplierProduct>,
}

#[derive(Debug)]
struct Shared {
    tables: RwLock<Tables>,
    locks: RowLocks,
    lock_timeout: Duration,
    next_tx: AtomicU64,
}

/// Shared handle to the in-memory store. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    shared: Arc<Shared>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(EngineConfig::default().lock_timeout)
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::with_lock_timeout(config.lock_timeout)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: RwLock::new(Tables::default()),
                locks: RowLocks::default(),
                lock_timeout,
                next_tx: AtomicU64::new(1),
            }),
        }
    }

    /// Number of committed movement rows. Handy for assertions.
    pub fn movement_count(&self) -> usize {
        self.shared
            .tables
            .read()
            .map(|t| t.movements.len())
            .unwrap_or_default()
    }
}

impl TransactionalStore for InMemoryStore {
    type Tx = MemoryTx;

    fn begin(&self) -> DomainResult<MemoryTx> {
        let tx_id = self.shared.next_tx.fetch_add(1, Ordering::Relaxed);
        Ok(MemoryTx {
            shared: self.shared.clone(),
            tx_id,
            held: HashSet::new(),
            pending: Pending::default(),
        })
    }
}

/// One open transaction. Dropping it without commit discards its writes
/// and releases its row locks.
#[derive(Debug)]
pub struct MemoryTx {
    shared: Arc<Shared>,
    tx_id: u64,
    held: HashSet<RowKey>,
    pending: Pending,
}

impl MemoryTx {
    fn tables(&self) -> DomainResult<RwLockReadGuard<'_, Tables>> {
        self.shared
            .tables
            .read()
            .map_err(|_| DomainError::storage("lock poisoned"))
    }

    fn lock_row(&mut self, key: RowKey) -> DomainResult<()> {
        if self.held.contains(&key) {
            return Ok(());
        }
        self.shared
            .locks
            .acquire(key, self.tx_id, self.shared.lock_timeout)?;
        self.held.insert(key);
        Ok(())
    }

    fn release(&mut self) {
        let held = std::mem::take(&mut self.held);
        self.shared.locks.release_all(self.tx_id, &held);
    }

    fn publish(&mut self) -> DomainResult<()> {
        let pending = std::mem::take(&mut self.pending);
        let mut tables = self
            .shared
            .tables
            .write()
            .map_err(|_| DomainError::storage("lock poisoned"))?;

        // Another transaction may have committed the same sku since ours
        // checked it.
        for product in pending.products.values() {
            let clash = tables
                .products
                .values()
                .any(|p| p.sku() == product.sku() && p.id() != product.id());
            if clash {
                return Err(DomainError::conflict(format!(
                    "sku {} already exists",
                    product.sku()
                )));
            }
        }

        tables.products.extend(pending.products);
        tables.locations.extend(pending.locations);
        tables.suppliers.extend(pending.suppliers);
        tables.customers.extend(pending.customers);
        tables.movements.extend(pending.movements);
        tables.purchase_orders.extend(pending.purchase_orders);
        tables.receptions.extend(pending.receptions);
        tables.sale_orders.extend(pending.sale_orders);
        tables.supplier_products.extend(pending.supplier_products);
        for (id, threshold) in pending.thresholds {
            match threshold {
                Some(t) => {
                    tables.thresholds.insert(id, t);
                }
                None => {
                    tables.thresholds.remove(&id);
                }
            }
        }
        Ok(())
    }

    fn read_product(&self, id: ProductId) -> DomainResult<Option<Product>> {
        let tables = self.tables()?;
        Ok(lookup(&self.pending.products, &tables.products, &id))
    }
}

impl UnitOfWork for MemoryTx {
    fn commit(mut self) -> DomainResult<()> {
        let result = self.publish();
        self.release();
        result
    }

    fn rollback(mut self) -> DomainResult<()> {
        self.pending = Pending::default();
        self.release();
        Ok(())
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        self.release();
    }
}

fn lookup<K, V>(pending: &HashMap<K, V>, committed: &HashMap<K, V>, key: &K) -> Option<V>
where
    K: Eq + Hash,
    V: Clone,
{
    pending.get(key).or_else(|| committed.get(key)).cloned()
}

/// Committed rows overlaid with this transaction's writes.
fn merged<K, V>(pending: &HashMap<K, V>, committed: &HashMap<K, V>) -> Vec<V>
where
    K: Eq + Hash,
    V: Clone,
{
    let mut all: Vec<V> = committed
        .iter()
        .filter(|(k, _)| !pending.contains_key(k))
        .map(|(_, v)| v.clone())
        .collect();
    all.extend(pending.values().cloned());
    all
}

fn stage<E>(table: &mut HashMap<E::Id, E>, entity: &E)
where
    E: Entity + Clone,
{
    table.insert(entity.id(), entity.clone());
}

impl InventoryStore for MemoryTx {
    fn product(&mut self, id: ProductId) -> DomainResult<Option<Product>> {
        self.read_product(id)
    }

    fn lock_product(&mut self, id: ProductId) -> DomainResult<Option<Product>> {
        if self.read_product(id)?.is_none() {
            return Ok(None);
        }
        self.lock_row(RowKey::Product(id))?;
        self.read_product(id)
    }

    fn products(&mut self) -> DomainResult<Vec<Product>> {
        let tables = self.tables()?;
        let mut all = merged(&self.pending.products, &tables.products);
        all.sort_by(|a, b| a.sku().cmp(b.sku()));
        Ok(all)
    }

    fn insert_product(&mut self, product: &Product) -> DomainResult<()> {
        let taken = {
            let tables = self.tables()?;
            merged(&self.pending.products, &tables.products)
                .iter()
                .any(|p| p.sku() == product.sku())
        };
        if taken {
            return Err(DomainError::conflict(format!(
                "sku {} already exists",
                product.sku()
            )));
        }
        stage(&mut self.pending.products, product);
        Ok(())
    }

    fn store_stock(&mut self, id: ProductId, stock_actual: i64) -> DomainResult<()> {
        let current = self
            .read_product(id)?
            .ok_or_else(|| DomainError::not_found("product", id))?;
        let updated = Product::restore(
            id,
            current.sku().to_string(),
            current.name().to_string(),
            stock_actual,
        );
        self.pending.products.insert(id, updated);
        Ok(())
    }

    fn location(&mut self, id: LocationId) -> DomainResult<Option<Location>> {
        let tables = self.tables()?;
        Ok(lookup(&self.pending.locations, &tables.locations, &id))
    }

    fn insert_location(&mut self, location: &Location) -> DomainResult<()> {
        stage(&mut self.pending.locations, location);
        Ok(())
    }

    fn append_movement(&mut self, movement: &StockMovement) -> DomainResult<()> {
        self.pending.movements.push(movement.clone());
        Ok(())
    }

    fn movements_for_product(&mut self, id: ProductId) -> DomainResult<Vec<StockMovement>> {
        let tables = self.tables()?;
        Ok(tables
            .movements
            .iter()
            .chain(self.pending.movements.iter())
            .filter(|m| m.product_id == id)
            .cloned()
            .collect())
    }

    fn movements_in_scope(&mut self, scope: ReferenceScope) -> DomainResult<Vec<StockMovement>> {
        let tables = self.tables()?;
        Ok(tables
            .movements
            .iter()
            .chain(self.pending.movements.iter())
            .filter(|m| m.reference.falls_within(scope))
            .cloned()
            .collect())
    }

    fn thresholds(&mut self, id: ProductId) -> DomainResult<Option<Threshold>> {
        if let Some(staged) = self.pending.thresholds.get(&id) {
            return Ok(*staged);
        }
        let tables = self.tables()?;
        Ok(tables.thresholds.get(&id).copied())
    }

    fn store_thresholds(&mut self, threshold: &Threshold) -> DomainResult<()> {
        self.pending
            .thresholds
            .insert(threshold.product_id, Some(*threshold));
        Ok(())
    }

    fn delete_thresholds(&mut self, id: ProductId) -> DomainResult<()> {
        self.pending.thresholds.insert(id, None);
        Ok(())
    }
}

impl PurchasingStore for MemoryTx {
    fn supplier(&mut self, id: SupplierId) -> DomainResult<Option<Supplier>> {
        let tables = self.tables()?;
        Ok(lookup(&self.pending.suppliers, &tables.suppliers, &id))
    }

    fn insert_supplier(&mut self, supplier: &Supplier) -> DomainResult<()> {
        stage(&mut self.pending.suppliers, supplier);
        Ok(())
    }

    fn purchase_order(&mut self, id: PurchaseOrderId) -> DomainResult<Option<PurchaseOrder>> {
        let tables = self.tables()?;
        Ok(lookup(&self.pending.purchase_orders, &tables.purchase_orders, &id))
    }

    fn lock_purchase_order(
        &mut self,
        id: PurchaseOrderId,
    ) -> DomainResult<Option<PurchaseOrder>> {
        if self.purchase_order(id)?.is_none() {
            return Ok(None);
        }
        self.lock_row(RowKey::PurchaseOrder(id))?;
        self.purchase_order(id)
    }

    fn purchase_orders(
        &mut self,
        status: Option<PurchaseOrderStatus>,
    ) -> DomainResult<Vec<PurchaseOrder>> {
        let tables = self.tables()?;
        let mut all: Vec<PurchaseOrder> =
            merged(&self.pending.purchase_orders, &tables.purchase_orders)
                .into_iter()
                .filter(|o| status.is_none_or(|s| o.status() == s))
                .collect();
        all.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id().cmp(&a.id()))
        });
        Ok(all)
    }

    fn insert_purchase_order(&mut self, order: &PurchaseOrder) -> DomainResult<()> {
        stage(&mut self.pending.purchase_orders, order);
        Ok(())
    }

    fn update_purchase_order(&mut self, order: &PurchaseOrder) -> DomainResult<()> {
        stage(&mut self.pending.purchase_orders, order);
        Ok(())
    }

    fn insert_reception(&mut self, reception: &Reception) -> DomainResult<()> {
        self.pending.receptions.push(reception.clone());
        Ok(())
    }

    fn reception(&mut self, id: ReceptionId) -> DomainResult<Option<Reception>> {
        let tables = self.tables()?;
        Ok(tables
            .receptions
            .iter()
            .chain(self.pending.receptions.iter())
            .find(|r| r.id == id)
            .cloned())
    }

    fn receptions_for(&mut self, id: PurchaseOrderId) -> DomainResult<Vec<Reception>> {
        let tables = self.tables()?;
        Ok(tables
            .receptions
            .iter()
            .chain(self.pending.receptions.iter())
            .filter(|r| r.purchase_order_id == id)
            .cloned()
            .collect())
    }

    fn supplier_product(
        &mut self,
        supplier_id: SupplierId,
        product_id: ProductId,
    ) -> DomainResult<Option<SupplierProduct>> {
        let tables = self.tables()?;
        Ok(lookup(
            &self.pending.supplier_products,
            &tables.supplier_products,
            &(supplier_id, product_id),
        ))
    }

    fn upsert_supplier_product(&mut self, link: &SupplierProduct) -> DomainResult<()> {
        self.pending
            .supplier_products
            .insert((link.supplier_id, link.product_id), link.clone());
        Ok(())
    }

    fn supplier_products_for_supplier(
        &mut self,
        supplier_id: SupplierId,
    ) -> DomainResult<Vec<SupplierProduct>> {
        let tables = self.tables()?;
        Ok(merged(&self.pending.supplier_products, &tables.supplier_products)
            .into_iter()
            .filter(|l| l.supplier_id == supplier_id)
            .collect())
    }

    fn supplier_products_for_product(
        &mut self,
        product_id: ProductId,
    ) -> DomainResult<Vec<SupplierProduct>> {
        let tables = self.tables()?;
        Ok(merged(&self.pending.supplier_products, &tables.supplier_products)
            .into_iter()
            .filter(|l| l.product_id == product_id)
            .collect())
    }
}

impl SalesStore for MemoryTx {
    fn customer(&mut self, id: CustomerId) -> DomainResult<Option<Customer>> {
        let tables = self.tables()?;
        Ok(lookup(&self.pending.customers, &tables.customers, &id))
    }

    fn insert_customer(&mut self, customer: &Customer) -> DomainResult<()> {
        stage(&mut self.pending.customers, customer);
        Ok(())
    }

    fn sale_order(&mut self, id: SaleOrderId) -> DomainResult<Option<SaleOrder>> {
        let tables = self.tables()?;
        Ok(lookup(&self.pending.sale_orders, &tables.sale_orders, &id))
    }

    fn lock_sale_order(&mut self, id: SaleOrderId) -> DomainResult<Option<SaleOrder>> {
        if self.sale_order(id)?.is_none() {
            return Ok(None);
        }
        self.lock_row(RowKey::SaleOrder(id))?;
        self.sale_order(id)
    }

    fn sale_orders(&mut self, status: Option<SaleOrderStatus>) -> DomainResult<Vec<SaleOrder>> {
        let tables = self.tables()?;
        let mut all: Vec<SaleOrder> = merged(&self.pending.sale_orders, &tables.sale_orders)
            .into_iter()
            .filter(|o| status.is_none_or(|s| o.status() == s))
            .collect();
        all.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id().cmp(&a.id()))
        });
        Ok(all)
    }

    fn insert_sale_order(&mut self, order: &SaleOrder) -> DomainResult<()> {
        stage(&mut self.pending.sale_orders, order);
        Ok(())
    }

    fn update_sale_order(&mut self, order: &SaleOrder) -> DomainResult<()> {
        stage(&mut self.pending.sale_orders, order);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncommitted_writes_are_private() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().unwrap();
        let product = Product::new("P-1", "Pin").unwrap();
        tx.insert_product(&product).unwrap();

        let mut other = store.begin().unwrap();
        assert!(other.product(product.id()).unwrap().is_none());
        drop(other);

        tx.commit().unwrap();
        let mut reader = store.begin().unwrap();
        assert!(reader.product(product.id()).unwrap().is_some());
    }

    #[test]
    fn dropped_transaction_discards_writes_and_locks() {
        let store = InMemoryStore::with_lock_timeout(Duration::from_millis(50));
        let product = Product::new("P-1", "Pin").unwrap();
        {
            let mut tx = store.begin().unwrap();
            tx.insert_product(&product).unwrap();
            tx.commit().unwrap();
        }
        {
            let mut tx = store.begin().unwrap();
            tx.lock_product(product.id()).unwrap();
            tx.store_stock(product.id(), 99).unwrap();
        }
        let mut tx = store.begin().unwrap();
        let locked = tx.lock_product(product.id()).unwrap().unwrap();
        assert_eq!(locked.stock_actual(), 0);
    }

    #[test]
    fn second_writer_times_out_on_a_held_row() {
        let store = InMemoryStore::with_lock_timeout(Duration::from_millis(30));
        let product = Product::new("P-1", "Pin").unwrap();
        let mut setup = store.begin().unwrap();
        setup.insert_product(&product).unwrap();
        setup.commit().unwrap();

        let mut first = store.begin().unwrap();
        first.lock_product(product.id()).unwrap();
        let mut second = store.begin().unwrap();
        let err = second.lock_product(product.id()).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn racing_duplicate_skus_conflict_on_commit() {
        let store = InMemoryStore::new();
        let mut a = store.begin().unwrap();
        let mut b = store.begin().unwrap();
        a.insert_product(&Product::new("DUP", "A").unwrap()).unwrap();
        b.insert_product(&Product::new("DUP", "B").unwrap()).unwrap();
        a.commit().unwrap();
        assert!(matches!(b.commit(), Err(DomainError::Conflict(_))));
    }
}
