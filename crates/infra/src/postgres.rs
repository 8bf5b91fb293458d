//! Postgres-backed store.
//!
//! Implements the storage ports on top of one sqlx transaction per unit of
//! work. Row locks are taken with `SELECT ... FOR UPDATE`, so concurrent
//! writers to the same product or order queue inside Postgres.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | DomainError |
//! |------------|----------------------|-------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (serialization failure / deadlock) | `40001` / `40P01` | `Conflict` |
//! | Database (lock timeout) | `55P03` | `Conflict` |
//! | Database (other) | Any other | `Storage` |
//! | PoolClosed / Io / other | N/A | `Storage` |
//!
//! ## Runtime
//!
//! The ports are synchronous. The store owns a multi-threaded tokio runtime
//! and drives every query with `block_on`, so it must not be called from
//! inside another async runtime.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgConnection, PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tokio::runtime::Runtime;
use tracing::instrument;
use uuid::Uuid;

use stockbook_core::{
    CustomerId, DomainError, DomainResult, LocationId, MovementId, ProductId, PurchaseOrderId,
    ReceptionId, SaleOrderId, SupplierId, TransactionalStore, UnitOfWork,
};
use stockbook_inventory::{
    InventoryStore, Location, MovementReference, Product, ReferenceScope, StockMovement,
    Threshold, Tracking,
};
use stockbook_purchasing::{
    PurchaseOrder, PurchaseOrderLine, PurchaseOrderStatus, PurchasingStore, Reception,
    ReceptionHeader, ReceptionLine, Supplier, SupplierProduct,
};
use stockbook_sales::{Customer, SaleOrder, SaleOrderLine, SaleOrderStatus, SalesStore};

use crate::config::{EngineConfig, PostgresConfig};

const SCHEMA: &str = include_str!("../migrations/0001_inventory.sql");

const MOVEMENT_COLUMNS: &str = "id, product_id, location_id, delta, reason, reference_kind, \
     purchase_order_id, reception_id, sale_order_id, lot, serial, expiry, note, recorded_at";

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    runtime: Arc<Runtime>,
    lock_timeout: Duration,
}

impl PostgresStore {
    /// Start the runtime and open the connection pool.
    #[instrument(skip(config), fields(max_connections = config.max_connections), err)]
    pub fn connect(config: &PostgresConfig) -> DomainResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| DomainError::storage(format!("failed to start runtime: {e}")))?;
        let pool = runtime
            .block_on(
                PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .connect(&config.database_url),
            )
            .map_err(|e| map_sqlx_error("connect", e))?;
        tracing::info!("postgres pool ready");
        Ok(Self {
            pool,
            runtime: Arc::new(runtime),
            lock_timeout: EngineConfig::default().lock_timeout,
        })
    }

    /// Bound how long a transaction waits on a row lock before failing
    /// with `Conflict`.
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Apply the schema. Safe to run repeatedly.
    #[instrument(skip(self), err)]
    pub fn migrate(&self) -> DomainResult<()> {
        self.runtime
            .block_on(sqlx::raw_sql(SCHEMA).execute(&self.pool))
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

impl TransactionalStore for PostgresStore {
    type Tx = PgTx;

    fn begin(&self) -> DomainResult<PgTx> {
        let set_timeout = format!(
            "SET LOCAL lock_timeout = {}",
            self.lock_timeout.as_millis()
        );
        let tx = self
            .runtime
            .block_on(async {
                let mut tx = self.pool.begin().await?;
                sqlx::raw_sql(&set_timeout).execute(&mut *tx).await?;
                Ok::<_, sqlx::Error>(tx)
            })
            .map_err(|e| map_sqlx_error("begin", e))?;
        Ok(PgTx {
            tx: Some(tx),
            runtime: self.runtime.clone(),
        })
    }
}

/// One open database transaction. Dropping it without commit rolls back.
pub struct PgTx {
    tx: Option<Transaction<'static, Postgres>>,
    runtime: Arc<Runtime>,
}

impl PgTx {
    fn exec<'a, T, F, Fut>(&'a mut self, operation: &'static str, f: F) -> DomainResult<T>
    where
        F: FnOnce(&'a mut PgConnection) -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        let conn: &'a mut PgConnection = match self.tx.as_mut() {
            Some(tx) => &mut **tx,
            None => return Err(DomainError::storage("transaction already finished")),
        };
        self.runtime
            .block_on(f(conn))
            .map_err(|e| map_sqlx_error(operation, e))
    }

    fn fetch_product(&mut self, id: ProductId, for_update: bool) -> DomainResult<Option<Product>> {
        let sql = if for_update {
            "SELECT id, sku, name, stock_actual FROM products WHERE id = $1 FOR UPDATE"
        } else {
            "SELECT id, sku, name, stock_actual FROM products WHERE id = $1"
        };
        let row = self.exec("product", |c| {
            sqlx::query(sql).bind(*id.as_uuid()).fetch_optional(c)
        })?;
        row.as_ref().map(product_from_row).transpose()
    }

    fn fetch_movements(
        &mut self,
        operation: &'static str,
        filter_column: &'static str,
        key: Uuid,
    ) -> DomainResult<Vec<StockMovement>> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements WHERE {filter_column} = $1 ORDER BY seq"
        );
        let rows = self.exec(operation, |c| sqlx::query(&sql).bind(key).fetch_all(c))?;
        rows.iter().map(movement_from_row).collect()
    }

    fn fetch_purchase_order(
        &mut self,
        id: PurchaseOrderId,
        for_update: bool,
    ) -> DomainResult<Option<PurchaseOrder>> {
        let sql = if for_update {
            "SELECT id, supplier_id, status, total, created_at FROM purchase_orders \
             WHERE id = $1 FOR UPDATE"
        } else {
            "SELECT id, supplier_id, status, total, created_at FROM purchase_orders WHERE id = $1"
        };
        let row = self.exec("purchase_order", |c| {
            sqlx::query(sql).bind(*id.as_uuid()).fetch_optional(c)
        })?;
        match row {
            Some(row) => Ok(Some(self.hydrate_purchase_order(&row)?)),
            None => Ok(None),
        }
    }

    fn hydrate_purchase_order(&mut self, row: &PgRow) -> DomainResult<PurchaseOrder> {
        let id: Uuid = col(row, "id")?;
        let lines = self.exec("purchase_order_lines", |c| {
            sqlx::query(
                "SELECT line_no, product_id, ordered_qty, received_qty, unit_cost, subtotal \
                 FROM purchase_order_lines WHERE purchase_order_id = $1 ORDER BY line_no",
            )
            .bind(id)
            .fetch_all(c)
        })?;
        let lines = lines
            .iter()
            .map(|l| {
                Ok(PurchaseOrderLine {
                    line_no: line_no_from_db(col(l, "line_no")?)?,
                    product_id: ProductId::from_uuid(col(l, "product_id")?),
                    ordered_qty: col(l, "ordered_qty")?,
                    received_qty: col(l, "received_qty")?,
                    unit_cost: amount_from_db(col(l, "unit_cost")?)?,
                    subtotal: amount_from_db(col(l, "subtotal")?)?,
                })
            })
            .collect::<DomainResult<Vec<_>>>()?;
        Ok(PurchaseOrder::restore(
            PurchaseOrderId::from_uuid(id),
            SupplierId::from_uuid(col(row, "supplier_id")?),
            parse_status::<PurchaseOrderStatus>(row)?,
            lines,
            amount_from_db(col(row, "total")?)?,
            col(row, "created_at")?,
        ))
    }

    fn fetch_sale_order(
        &mut self,
        id: SaleOrderId,
        for_update: bool,
    ) -> DomainResult<Option<SaleOrder>> {
        let sql = if for_update {
            "SELECT id, customer_id, status, total, created_at FROM sale_orders \
             WHERE id = $1 FOR UPDATE"
        } else {
            "SELECT id, customer_id, status, total, created_at FROM sale_orders WHERE id = $1"
        };
        let row = self.exec("sale_order", |c| {
            sqlx::query(sql).bind(*id.as_uuid()).fetch_optional(c)
        })?;
        match row {
            Some(row) => Ok(Some(self.hydrate_sale_order(&row)?)),
            None => Ok(None),
        }
    }

    fn hydrate_sale_order(&mut self, row: &PgRow) -> DomainResult<SaleOrder> {
        let id: Uuid = col(row, "id")?;
        let lines = self.exec("sale_order_lines", |c| {
            sqlx::query(
                "SELECT line_no, product_id, quantity, unit_price, subtotal \
                 FROM sale_order_lines WHERE sale_order_id = $1 ORDER BY line_no",
            )
            .bind(id)
            .fetch_all(c)
        })?;
        let lines = lines
            .iter()
            .map(|l| {
                Ok(SaleOrderLine {
                    line_no: line_no_from_db(col(l, "line_no")?)?,
                    product_id: ProductId::from_uuid(col(l, "product_id")?),
                    quantity: col(l, "quantity")?,
                    unit_price: amount_from_db(col(l, "unit_price")?)?,
                    subtotal: amount_from_db(col(l, "subtotal")?)?,
                })
            })
            .collect::<DomainResult<Vec<_>>>()?;
        Ok(SaleOrder::restore(
            SaleOrderId::from_uuid(id),
            CustomerId::from_uuid(col(row, "customer_id")?),
            parse_status::<SaleOrderStatus>(row)?,
            lines,
            amount_from_db(col(row, "total")?)?,
            col(row, "created_at")?,
        ))
    }

    fn hydrate_reception(&mut self, row: &PgRow) -> DomainResult<Reception> {
        let id: Uuid = col(row, "id")?;
        let lines = self.exec("reception_lines", |c| {
            sqlx::query(
                "SELECT line_no, product_id, received_qty, location_id, lot, serial, expiry \
                 FROM reception_lines WHERE reception_id = $1 ORDER BY position",
            )
            .bind(id)
            .fetch_all(c)
        })?;
        let lines = lines
            .iter()
            .map(|l| {
                Ok(ReceptionLine {
                    line_no: line_no_from_db(col(l, "line_no")?)?,
                    product_id: ProductId::from_uuid(col(l, "product_id")?),
                    received_qty: col(l, "received_qty")?,
                    location_id: col::<Option<Uuid>>(l, "location_id")?.map(LocationId::from_uuid),
                    tracking: Tracking {
                        lot: col(l, "lot")?,
                        serial: col(l, "serial")?,
                        expiry: col(l, "expiry")?,
                    },
                })
            })
            .collect::<DomainResult<Vec<_>>>()?;
        Ok(Reception {
            id: ReceptionId::from_uuid(id),
            purchase_order_id: PurchaseOrderId::from_uuid(col(row, "purchase_order_id")?),
            header: ReceptionHeader {
                document_type: col(row, "document_type")?,
                document_number: col(row, "document_number")?,
                document_date: col(row, "document_date")?,
            },
            lines,
            created_at: col(row, "created_at")?,
        })
    }
}

impl UnitOfWork for PgTx {
    fn commit(mut self) -> DomainResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| DomainError::storage("transaction already finished"))?;
        self.runtime
            .block_on(tx.commit())
            .map_err(|e| map_sqlx_error("commit", e))
    }

    fn rollback(mut self) -> DomainResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| DomainError::storage("transaction already finished"))?;
        self.runtime
            .block_on(tx.rollback())
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

impl InventoryStore for PgTx {
    fn product(&mut self, id: ProductId) -> DomainResult<Option<Product>> {
        self.fetch_product(id, false)
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    fn lock_product(&mut self, id: ProductId) -> DomainResult<Option<Product>> {
        self.fetch_product(id, true)
    }

    fn products(&mut self) -> DomainResult<Vec<Product>> {
        let rows = self.exec("products", |c| {
            sqlx::query("SELECT id, sku, name, stock_actual FROM products ORDER BY sku")
                .fetch_all(c)
        })?;
        rows.iter().map(product_from_row).collect()
    }

    fn insert_product(&mut self, product: &Product) -> DomainResult<()> {
        self.exec("insert_product", |c| {
            sqlx::query(
                "INSERT INTO products (id, sku, name, stock_actual) VALUES ($1, $2, $3, $4)",
            )
            .bind(*product.id().as_uuid())
            .bind(product.sku())
            .bind(product.name())
            .bind(product.stock_actual())
            .execute(c)
        })?;
        Ok(())
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    fn store_stock(&mut self, id: ProductId, stock_actual: i64) -> DomainResult<()> {
        let result = self.exec("store_stock", |c| {
            sqlx::query("UPDATE products SET stock_actual = $2 WHERE id = $1")
                .bind(*id.as_uuid())
                .bind(stock_actual)
                .execute(c)
        })?;
        if result.rows_affected() == 0 {
            return Err(DomainError::not_found("product", id));
        }
        Ok(())
    }

    fn location(&mut self, id: LocationId) -> DomainResult<Option<Location>> {
        let row = self.exec("location", |c| {
            sqlx::query("SELECT id, name, description FROM locations WHERE id = $1")
                .bind(*id.as_uuid())
                .fetch_optional(c)
        })?;
        row.map(|r| {
            Ok(Location {
                id: LocationId::from_uuid(col(&r, "id")?),
                name: col(&r, "name")?,
                description: col(&r, "description")?,
            })
        })
        .transpose()
    }

    fn insert_location(&mut self, location: &Location) -> DomainResult<()> {
        self.exec("insert_location", |c| {
            sqlx::query("INSERT INTO locations (id, name, description) VALUES ($1, $2, $3)")
                .bind(*location.id.as_uuid())
                .bind(location.name.as_str())
                .bind(location.description.as_deref())
                .execute(c)
        })?;
        Ok(())
    }

    #[instrument(skip(self, movement), fields(product_id = %movement.product_id, delta = movement.delta), err)]
    fn append_movement(&mut self, movement: &StockMovement) -> DomainResult<()> {
        let reference = movement.reference;
        self.exec("append_movement", |c| {
            sqlx::query(
                "INSERT INTO stock_movements (id, product_id, location_id, delta, reason, \
                 reference_kind, purchase_order_id, reception_id, sale_order_id, lot, serial, \
                 expiry, note, recorded_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
            )
            .bind(*movement.id.as_uuid())
            .bind(*movement.product_id.as_uuid())
            .bind(movement.location_id.map(Uuid::from))
            .bind(movement.delta)
            .bind(movement.reason.as_str())
            .bind(reference.kind())
            .bind(reference.purchase_order_id().map(Uuid::from))
            .bind(reference.reception_id().map(Uuid::from))
            .bind(reference.sale_order_id().map(Uuid::from))
            .bind(movement.tracking.lot.as_deref())
            .bind(movement.tracking.serial.as_deref())
            .bind(movement.tracking.expiry)
            .bind(movement.note.as_deref())
            .bind(movement.recorded_at)
            .execute(c)
        })?;
        Ok(())
    }

    fn movements_for_product(&mut self, id: ProductId) -> DomainResult<Vec<StockMovement>> {
        self.fetch_movements("movements_for_product", "product_id", *id.as_uuid())
    }

    fn movements_in_scope(&mut self, scope: ReferenceScope) -> DomainResult<Vec<StockMovement>> {
        match scope {
            ReferenceScope::PurchaseOrder(id) => {
                self.fetch_movements("movements_in_scope", "purchase_order_id", *id.as_uuid())
            }
            ReferenceScope::SaleOrder(id) => {
                self.fetch_movements("movements_in_scope", "sale_order_id", *id.as_uuid())
            }
        }
    }

    fn thresholds(&mut self, id: ProductId) -> DomainResult<Option<Threshold>> {
        let row = self.exec("thresholds", |c| {
            sqlx::query(
                "SELECT product_id, min_value, max_value FROM stock_thresholds \
                 WHERE product_id = $1",
            )
            .bind(*id.as_uuid())
            .fetch_optional(c)
        })?;
        row.map(|r| {
            Ok(Threshold {
                product_id: ProductId::from_uuid(col(&r, "product_id")?),
                min_value: col(&r, "min_value")?,
                max_value: col(&r, "max_value")?,
            })
        })
        .transpose()
    }

    fn store_thresholds(&mut self, threshold: &Threshold) -> DomainResult<()> {
        self.exec("store_thresholds", |c| {
            sqlx::query(
                "INSERT INTO stock_thresholds (product_id, min_value, max_value) \
                 VALUES ($1, $2, $3) \
                 ON CONFLICT (product_id) DO UPDATE \
                 SET min_value = EXCLUDED.min_value, max_value = EXCLUDED.max_value",
            )
            .bind(*threshold.product_id.as_uuid())
            .bind(threshold.min_value)
            .bind(threshold.max_value)
            .execute(c)
        })?;
        Ok(())
    }

    fn delete_thresholds(&mut self, id: ProductId) -> DomainResult<()> {
        self.exec("delete_thresholds", |c| {
            sqlx::query("DELETE FROM stock_thresholds WHERE product_id = $1")
                .bind(*id.as_uuid())
                .execute(c)
        })?;
        Ok(())
    }
}

impl PurchasingStore for PgTx {
    fn supplier(&mut self, id: SupplierId) -> DomainResult<Option<Supplier>> {
        let row = self.exec("supplier", |c| {
            sqlx::query("SELECT id, name FROM suppliers WHERE id = $1")
                .bind(*id.as_uuid())
                .fetch_optional(c)
        })?;
        row.map(|r| {
            Ok(Supplier {
                id: SupplierId::from_uuid(col(&r, "id")?),
                name: col(&r, "name")?,
            })
        })
        .transpose()
    }

    fn insert_supplier(&mut self, supplier: &Supplier) -> DomainResult<()> {
        self.exec("insert_supplier", |c| {
            sqlx::query("INSERT INTO suppliers (id, name) VALUES ($1, $2)")
                .bind(*supplier.id.as_uuid())
                .bind(supplier.name.as_str())
                .execute(c)
        })?;
        Ok(())
    }

    fn purchase_order(&mut self, id: PurchaseOrderId) -> DomainResult<Option<PurchaseOrder>> {
        self.fetch_purchase_order(id, false)
    }

    #[instrument(skip(self), fields(purchase_order_id = %id), err)]
    fn lock_purchase_order(
        &mut self,
        id: PurchaseOrderId,
    ) -> DomainResult<Option<PurchaseOrder>> {
        self.fetch_purchase_order(id, true)
    }

    fn purchase_orders(
        &mut self,
        status: Option<PurchaseOrderStatus>,
    ) -> DomainResult<Vec<PurchaseOrder>> {
        let filter = status.map(|s| s.as_str());
        let rows = self.exec("purchase_orders", |c| {
            sqlx::query(
                "SELECT id, supplier_id, status, total, created_at FROM purchase_orders \
                 WHERE ($1::text IS NULL OR status = $1) \
                 ORDER BY created_at DESC, id DESC",
            )
            .bind(filter)
            .fetch_all(c)
        })?;
        rows.iter()
            .map(|row| self.hydrate_purchase_order(row))
            .collect()
    }

    fn insert_purchase_order(&mut self, order: &PurchaseOrder) -> DomainResult<()> {
        let total = amount_to_db(order.total())?;
        self.exec("insert_purchase_order", |c| {
            sqlx::query(
                "INSERT INTO purchase_orders (id, supplier_id, status, total, created_at) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(*order.id().as_uuid())
            .bind(*order.supplier_id().as_uuid())
            .bind(order.status().as_str())
            .bind(total)
            .bind(order.created_at())
            .execute(c)
        })?;
        for line in order.lines() {
            let line_no = line_no_to_db(line.line_no)?;
            let unit_cost = amount_to_db(line.unit_cost)?;
            let subtotal = amount_to_db(line.subtotal)?;
            self.exec("insert_purchase_order_line", |c| {
                sqlx::query(
                    "INSERT INTO purchase_order_lines (purchase_order_id, line_no, product_id, \
                     ordered_qty, received_qty, unit_cost, subtotal) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7)",
                )
                .bind(*order.id().as_uuid())
                .bind(line_no)
                .bind(*line.product_id.as_uuid())
                .bind(line.ordered_qty)
                .bind(line.received_qty)
                .bind(unit_cost)
                .bind(subtotal)
                .execute(c)
            })?;
        }
        Ok(())
    }

    fn update_purchase_order(&mut self, order: &PurchaseOrder) -> DomainResult<()> {
        self.exec("update_purchase_order", |c| {
            sqlx::query("UPDATE purchase_orders SET status = $2 WHERE id = $1")
                .bind(*order.id().as_uuid())
                .bind(order.status().as_str())
                .execute(c)
        })?;
        for line in order.lines() {
            let line_no = line_no_to_db(line.line_no)?;
            self.exec("update_purchase_order_line", |c| {
                sqlx::query(
                    "UPDATE purchase_order_lines SET received_qty = $3 \
                     WHERE purchase_order_id = $1 AND line_no = $2",
                )
                .bind(*order.id().as_uuid())
                .bind(line_no)
                .bind(line.received_qty)
                .execute(c)
            })?;
        }
        Ok(())
    }

    fn insert_reception(&mut self, reception: &Reception) -> DomainResult<()> {
        self.exec("insert_reception", |c| {
            sqlx::query(
                "INSERT INTO receptions (id, purchase_order_id, document_type, document_number, \
                 document_date, created_at) VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(*reception.id.as_uuid())
            .bind(*reception.purchase_order_id.as_uuid())
            .bind(reception.header.document_type.as_deref())
            .bind(reception.header.document_number.as_deref())
            .bind(reception.header.document_date)
            .bind(reception.created_at)
            .execute(c)
        })?;
        for (position, line) in reception.lines.iter().enumerate() {
            let position = i32::try_from(position)
                .map_err(|_| DomainError::validation("too many reception lines"))?;
            let line_no = line_no_to_db(line.line_no)?;
            self.exec("insert_reception_line", |c| {
                sqlx::query(
                    "INSERT INTO reception_lines (reception_id, position, line_no, product_id, \
                     received_qty, location_id, lot, serial, expiry) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
                )
                .bind(*reception.id.as_uuid())
                .bind(position)
                .bind(line_no)
                .bind(*line.product_id.as_uuid())
                .bind(line.received_qty)
                .bind(line.location_id.map(Uuid::from))
                .bind(line.tracking.lot.as_deref())
                .bind(line.tracking.serial.as_deref())
                .bind(line.tracking.expiry)
                .execute(c)
            })?;
        }
        Ok(())
    }

    fn reception(&mut self, id: ReceptionId) -> DomainResult<Option<Reception>> {
        let row = self.exec("reception", |c| {
            sqlx::query(
                "SELECT id, purchase_order_id, document_type, document_number, document_date, \
                 created_at FROM receptions WHERE id = $1",
            )
            .bind(*id.as_uuid())
            .fetch_optional(c)
        })?;
        match row {
            Some(row) => Ok(Some(self.hydrate_reception(&row)?)),
            None => Ok(None),
        }
    }

    fn receptions_for(&mut self, id: PurchaseOrderId) -> DomainResult<Vec<Reception>> {
        let rows = self.exec("receptions_for", |c| {
            sqlx::query(
                "SELECT id, purchase_order_id, document_type, document_number, document_date, \
                 created_at FROM receptions WHERE purchase_order_id = $1 \
                 ORDER BY created_at, id",
            )
            .bind(*id.as_uuid())
            .fetch_all(c)
        })?;
        rows.iter().map(|row| self.hydrate_reception(row)).collect()
    }

    fn supplier_product(
        &mut self,
        supplier_id: SupplierId,
        product_id: ProductId,
    ) -> DomainResult<Option<SupplierProduct>> {
        let row = self.exec("supplier_product", |c| {
            sqlx::query(
                "SELECT supplier_id, product_id, last_price, last_purchase_at \
                 FROM supplier_products WHERE supplier_id = $1 AND product_id = $2",
            )
            .bind(*supplier_id.as_uuid())
            .bind(*product_id.as_uuid())
            .fetch_optional(c)
        })?;
        row.as_ref().map(supplier_product_from_row).transpose()
    }

    fn upsert_supplier_product(&mut self, link: &SupplierProduct) -> DomainResult<()> {
        let price = amount_to_db(link.last_price)?;
        self.exec("upsert_supplier_product", |c| {
            sqlx::query(
                "INSERT INTO supplier_products (supplier_id, product_id, last_price, \
                 last_purchase_at) VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (supplier_id, product_id) DO UPDATE \
                 SET last_price = EXCLUDED.last_price, \
                     last_purchase_at = EXCLUDED.last_purchase_at",
            )
            .bind(*link.supplier_id.as_uuid())
            .bind(*link.product_id.as_uuid())
            .bind(price)
            .bind(link.last_purchase_at)
            .execute(c)
        })?;
        Ok(())
    }

    fn supplier_products_for_supplier(
        &mut self,
        supplier_id: SupplierId,
    ) -> DomainResult<Vec<SupplierProduct>> {
        let rows = self.exec("supplier_products_for_supplier", |c| {
            sqlx::query(
                "SELECT supplier_id, product_id, last_price, last_purchase_at \
                 FROM supplier_products WHERE supplier_id = $1",
            )
            .bind(*supplier_id.as_uuid())
            .fetch_all(c)
        })?;
        rows.iter().map(supplier_product_from_row).collect()
    }

    fn supplier_products_for_product(
        &mut self,
        product_id: ProductId,
    ) -> DomainResult<Vec<SupplierProduct>> {
        let rows = self.exec("supplier_products_for_product", |c| {
            sqlx::query(
                "SELECT supplier_id, product_id, last_price, last_purchase_at \
                 FROM supplier_products WHERE product_id = $1",
            )
            .bind(*product_id.as_uuid())
            .fetch_all(c)
        })?;
        rows.iter().map(supplier_product_from_row).collect()
    }
}

impl SalesStore for PgTx {
    fn customer(&mut self, id: CustomerId) -> DomainResult<Option<Customer>> {
        let row = self.exec("customer", |c| {
            sqlx::query("SELECT id, name FROM customers WHERE id = $1")
                .bind(*id.as_uuid())
                .fetch_optional(c)
        })?;
        row.map(|r| {
            Ok(Customer {
                id: CustomerId::from_uuid(col(&r, "id")?),
                name: col(&r, "name")?,
            })
        })
        .transpose()
    }

    fn insert_customer(&mut self, customer: &Customer) -> DomainResult<()> {
        self.exec("insert_customer", |c| {
            sqlx::query("INSERT INTO customers (id, name) VALUES ($1, $2)")
                .bind(*customer.id.as_uuid())
                .bind(customer.name.as_str())
                .execute(c)
        })?;
        Ok(())
    }

    fn sale_order(&mut self, id: SaleOrderId) -> DomainResult<Option<SaleOrder>> {
        self.fetch_sale_order(id, false)
    }

    #[instrument(skip(self), fields(sale_order_id = %id), err)]
    fn lock_sale_order(&mut self, id: SaleOrderId) -> DomainResult<Option<SaleOrder>> {
        self.fetch_sale_order(id, true)
    }

    fn sale_orders(&mut self, status: Option<SaleOrderStatus>) -> DomainResult<Vec<SaleOrder>> {
        let filter = status.map(|s| s.as_str());
        let rows = self.exec("sale_orders", |c| {
            sqlx::query(
                "SELECT id, customer_id, status, total, created_at FROM sale_orders \
                 WHERE ($1::text IS NULL OR status = $1) \
                 ORDER BY created_at DESC, id DESC",
            )
            .bind(filter)
            .fetch_all(c)
        })?;
        rows.iter().map(|row| self.hydrate_sale_order(row)).collect()
    }

    fn insert_sale_order(&mut self, order: &SaleOrder) -> DomainResult<()> {
        let total = amount_to_db(order.total())?;
        self.exec("insert_sale_order", |c| {
            sqlx::query(
                "INSERT INTO sale_orders (id, customer_id, status, total, created_at) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(*order.id().as_uuid())
            .bind(*order.customer_id().as_uuid())
            .bind(order.status().as_str())
            .bind(total)
            .bind(order.created_at())
            .execute(c)
        })?;
        for line in order.lines() {
            let line_no = line_no_to_db(line.line_no)?;
            let unit_price = amount_to_db(line.unit_price)?;
            let subtotal = amount_to_db(line.subtotal)?;
            self.exec("insert_sale_order_line", |c| {
                sqlx::query(
                    "INSERT INTO sale_order_lines (sale_order_id, line_no, product_id, quantity, \
                     unit_price, subtotal) VALUES ($1, $2, $3, $4, $5, $6)",
                )
                .bind(*order.id().as_uuid())
                .bind(line_no)
                .bind(*line.product_id.as_uuid())
                .bind(line.quantity)
                .bind(unit_price)
                .bind(subtotal)
                .execute(c)
            })?;
        }
        Ok(())
    }

    fn update_sale_order(&mut self, order: &SaleOrder) -> DomainResult<()> {
        self.exec("update_sale_order", |c| {
            sqlx::query("UPDATE sale_orders SET status = $2 WHERE id = $1")
                .bind(*order.id().as_uuid())
                .bind(order.status().as_str())
                .execute(c)
        })?;
        Ok(())
    }
}

fn col<'r, T>(row: &'r PgRow, name: &str) -> DomainResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name).map_err(|e| map_sqlx_error("decode", e))
}

fn parse_status<T>(row: &PgRow) -> DomainResult<T>
where
    T: core::str::FromStr<Err = DomainError>,
{
    let raw: String = col(row, "status")?;
    raw.parse()
        .map_err(|e: DomainError| DomainError::storage(format!("corrupt status column: {e}")))
}

fn product_from_row(row: &PgRow) -> DomainResult<Product> {
    Ok(Product::restore(
        ProductId::from_uuid(col(row, "id")?),
        col(row, "sku")?,
        col(row, "name")?,
        col(row, "stock_actual")?,
    ))
}

fn supplier_product_from_row(row: &PgRow) -> DomainResult<SupplierProduct> {
    let last_purchase_at: Option<DateTime<Utc>> = col(row, "last_purchase_at")?;
    Ok(SupplierProduct {
        supplier_id: SupplierId::from_uuid(col(row, "supplier_id")?),
        product_id: ProductId::from_uuid(col(row, "product_id")?),
        last_price: amount_from_db(col(row, "last_price")?)?,
        last_purchase_at,
    })
}

fn movement_from_row(row: &PgRow) -> DomainResult<StockMovement> {
    let reason: String = col(row, "reason")?;
    let kind: String = col(row, "reference_kind")?;
    let reference = reference_from_columns(
        &kind,
        col(row, "purchase_order_id")?,
        col(row, "reception_id")?,
        col(row, "sale_order_id")?,
    )?;
    let recorded_at: DateTime<Utc> = col(row, "recorded_at")?;
    let expiry: Option<NaiveDate> = col(row, "expiry")?;
    Ok(StockMovement {
        id: MovementId::from_uuid(col(row, "id")?),
        product_id: ProductId::from_uuid(col(row, "product_id")?),
        location_id: col::<Option<Uuid>>(row, "location_id")?.map(LocationId::from_uuid),
        delta: col(row, "delta")?,
        reason: reason
            .parse()
            .map_err(|e: DomainError| DomainError::storage(format!("corrupt reason column: {e}")))?,
        reference,
        tracking: Tracking {
            lot: col(row, "lot")?,
            serial: col(row, "serial")?,
            expiry,
        },
        note: col(row, "note")?,
        recorded_at,
    })
}

fn reference_from_columns(
    kind: &str,
    purchase_order_id: Option<Uuid>,
    reception_id: Option<Uuid>,
    sale_order_id: Option<Uuid>,
) -> DomainResult<MovementReference> {
    let missing = || DomainError::storage(format!("movement reference '{kind}' is missing its id"));
    match kind {
        "manual" => Ok(MovementReference::Manual),
        "purchase_order" => Ok(MovementReference::PurchaseOrder {
            purchase_order_id: PurchaseOrderId::from_uuid(purchase_order_id.ok_or_else(missing)?),
        }),
        "reception" => Ok(MovementReference::Reception {
            purchase_order_id: PurchaseOrderId::from_uuid(purchase_order_id.ok_or_else(missing)?),
            reception_id: ReceptionId::from_uuid(reception_id.ok_or_else(missing)?),
        }),
        "sale_order" => Ok(MovementReference::SaleOrder {
            sale_order_id: SaleOrderId::from_uuid(sale_order_id.ok_or_else(missing)?),
        }),
        other => Err(DomainError::storage(format!(
            "unknown movement reference kind '{other}'"
        ))),
    }
}

fn amount_to_db(value: u64) -> DomainResult<i64> {
    i64::try_from(value).map_err(|_| DomainError::validation(format!("amount {value} is too large")))
}

fn amount_from_db(value: i64) -> DomainResult<u64> {
    u64::try_from(value).map_err(|_| DomainError::storage(format!("negative amount {value} in storage")))
}

fn line_no_to_db(value: u32) -> DomainResult<i32> {
    i32::try_from(value).map_err(|_| DomainError::validation(format!("line number {value} is too large")))
}

fn line_no_from_db(value: i32) -> DomainResult<u32> {
    u32::try_from(value).map_err(|_| DomainError::storage(format!("negative line number {value} in storage")))
}

/// Map sqlx errors to domain errors. See the module docs for the table.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> DomainError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // unique violation
                Some("23505") => DomainError::conflict(msg),
                // serialization failure, deadlock, lock_timeout
                Some("40001") | Some("40P01") | Some("55P03") => DomainError::conflict(msg),
                _ => DomainError::storage(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            DomainError::storage(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::RowNotFound => {
            DomainError::storage(format!("unexpected row not found in {}", operation))
        }
        _ => DomainError::storage(format!("sqlx error in {}: {}", operation, err)),
    }
}
