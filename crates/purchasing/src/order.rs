use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_core::{DomainError, DomainResult, Entity, ProductId, PurchaseOrderId, SupplierId};

/// Purchase order status lifecycle.
///
/// Pending → Incomplete → Completed through receptions; Cancelled and
/// Eliminada are reached explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PurchaseOrderStatus {
    Pending,
    Incomplete,
    Completed,
    Cancelled,
    /// Soft-deleted. Kept for listings.
    Eliminada,
}

impl PurchaseOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseOrderStatus::Pending => "Pending",
            PurchaseOrderStatus::Incomplete => "Incomplete",
            PurchaseOrderStatus::Completed => "Completed",
            PurchaseOrderStatus::Cancelled => "Cancelled",
            PurchaseOrderStatus::Eliminada => "Eliminada",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PurchaseOrderStatus::Completed
                | PurchaseOrderStatus::Cancelled
                | PurchaseOrderStatus::Eliminada
        )
    }
}

impl fmt::Display for PurchaseOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PurchaseOrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(PurchaseOrderStatus::Pending),
            "incomplete" => Ok(PurchaseOrderStatus::Incomplete),
            "completed" => Ok(PurchaseOrderStatus::Completed),
            "cancelled" => Ok(PurchaseOrderStatus::Cancelled),
            "eliminada" => Ok(PurchaseOrderStatus::Eliminada),
            other => Err(DomainError::validation(format!(
                "unknown purchase order status '{other}'"
            ))),
        }
    }
}

/// Requested line for a new purchase order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPurchaseLine {
    pub product_id: ProductId,
    pub ordered_qty: i64,
    /// Cost per unit in minor currency units.
    pub unit_cost: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderLine {
    pub line_no: u32,
    pub product_id: ProductId,
    pub ordered_qty: i64,
    pub received_qty: i64,
    pub unit_cost: u64,
    pub subtotal: u64,
}

impl PurchaseOrderLine {
    pub fn remaining(&self) -> i64 {
        self.ordered_qty - self.received_qty
    }

    pub fn is_fully_received(&self) -> bool {
        self.received_qty >= self.ordered_qty
    }
}

/// Aggregate root: PurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    id: PurchaseOrderId,
    supplier_id: SupplierId,
    status: PurchaseOrderStatus,
    lines: Vec<PurchaseOrderLine>,
    total: u64,
    created_at: DateTime<Utc>,
}

impl PurchaseOrder {
    /// Build a validated order. Only Pending and Completed are valid
    /// starting states.
    pub fn new(
        supplier_id: SupplierId,
        lines: Vec<NewPurchaseLine>,
        status: PurchaseOrderStatus,
    ) -> DomainResult<Self> {
        if !matches!(
            status,
            PurchaseOrderStatus::Pending | PurchaseOrderStatus::Completed
        ) {
            return Err(DomainError::validation(format!(
                "purchase order cannot be created as {status}"
            )));
        }
        if lines.is_empty() {
            return Err(DomainError::validation(
                "purchase order needs at least one line",
            ));
        }

        let mut built = Vec::with_capacity(lines.len());
        let mut total: u64 = 0;
        for (idx, line) in lines.into_iter().enumerate() {
            let line_no = u32::try_from(idx + 1)
                .map_err(|_| DomainError::validation("purchase order has too many lines"))?;
            if line.ordered_qty <= 0 {
                return Err(DomainError::validation(format!(
                    "line {line_no}: ordered quantity must be positive"
                )));
            }
            if line.unit_cost == 0 {
                return Err(DomainError::validation(format!(
                    "line {line_no}: unit cost must be positive"
                )));
            }
            let subtotal = (line.ordered_qty as u64)
                .checked_mul(line.unit_cost)
                .ok_or_else(|| {
                    DomainError::validation(format!("line {line_no}: subtotal overflows"))
                })?;
            total = total
                .checked_add(subtotal)
                .ok_or_else(|| DomainError::validation("purchase order total overflows"))?;
            built.push(PurchaseOrderLine {
                line_no,
                product_id: line.product_id,
                ordered_qty: line.ordered_qty,
                received_qty: 0,
                unit_cost: line.unit_cost,
                subtotal,
            });
        }

        Ok(Self {
            id: PurchaseOrderId::new(),
            supplier_id,
            status,
            lines: built,
            total,
            created_at: Utc::now(),
        })
    }

    /// Rebuild an order from stored rows.
    pub fn restore(
        id: PurchaseOrderId,
        supplier_id: SupplierId,
        status: PurchaseOrderStatus,
        lines: Vec<PurchaseOrderLine>,
        total: u64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            supplier_id,
            status,
            lines,
            total,
            created_at,
        }
    }

    pub fn id(&self) -> PurchaseOrderId {
        self.id
    }

    pub fn supplier_id(&self) -> SupplierId {
        self.supplier_id
    }

    pub fn status(&self) -> PurchaseOrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[PurchaseOrderLine] {
        &self.lines
    }

    pub fn line(&self, line_no: u32) -> Option<&PurchaseOrderLine> {
        self.lines.iter().find(|l| l.line_no == line_no)
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_fully_received(&self) -> bool {
        self.lines.iter().all(PurchaseOrderLine::is_fully_received)
    }

    /// Mark every line as fully received. Returns the quantity each line
    /// gained, for lines that gained anything.
    pub(crate) fn receive_in_full(&mut self) -> Vec<(ProductId, i64)> {
        let mut added = Vec::new();
        for line in &mut self.lines {
            let gained = line.remaining();
            if gained > 0 {
                line.received_qty = line.ordered_qty;
                added.push((line.product_id, gained));
            }
        }
        added
    }

    pub fn ensure_receivable(&self) -> DomainResult<()> {
        match self.status {
            PurchaseOrderStatus::Pending | PurchaseOrderStatus::Incomplete => Ok(()),
            state => Err(DomainError::invalid_state(
                "purchase order",
                self.id,
                state,
                "receive",
            )),
        }
    }

    /// Add `qty` to a line's received quantity, refusing to exceed what is
    /// still pending on it.
    pub fn record_receipt(&mut self, line_no: u32, qty: i64) -> DomainResult<ProductId> {
        if qty < 0 {
            return Err(DomainError::validation(format!(
                "line {line_no}: received quantity cannot be negative"
            )));
        }
        let order_id = self.id;
        let line = self
            .lines
            .iter_mut()
            .find(|l| l.line_no == line_no)
            .ok_or_else(|| {
                DomainError::not_found("purchase order line", format!("{order_id}#{line_no}"))
            })?;
        let remaining = line.remaining();
        if qty > remaining {
            return Err(DomainError::OverReceipt {
                order_id,
                line_no,
                product_id: line.product_id,
                requested: qty,
                remaining,
            });
        }
        line.received_qty += qty;
        Ok(line.product_id)
    }

    /// Status implied by the received quantities: Completed when every line
    /// is full, Incomplete when anything arrived, unchanged otherwise.
    pub fn status_after_receipt(&self) -> PurchaseOrderStatus {
        if self.is_fully_received() {
            PurchaseOrderStatus::Completed
        } else if self.lines.iter().any(|l| l.received_qty > 0) {
            PurchaseOrderStatus::Incomplete
        } else {
            self.status
        }
    }

    pub(crate) fn set_status(&mut self, status: PurchaseOrderStatus) {
        self.status = status;
    }

    /// Force Completed. Returns `false` when the order already was.
    pub fn complete(&mut self) -> DomainResult<bool> {
        match self.status {
            PurchaseOrderStatus::Completed => Ok(false),
            PurchaseOrderStatus::Cancelled | PurchaseOrderStatus::Eliminada => Err(
                DomainError::invalid_state("purchase order", self.id, self.status, "complete"),
            ),
            _ => {
                self.status = PurchaseOrderStatus::Completed;
                Ok(true)
            }
        }
    }

    /// Returns `false` when the order was already cancelled.
    pub fn cancel(&mut self) -> DomainResult<bool> {
        match self.status {
            PurchaseOrderStatus::Cancelled => Ok(false),
            PurchaseOrderStatus::Eliminada => Err(DomainError::invalid_state(
                "purchase order",
                self.id,
                self.status,
                "cancel",
            )),
            _ => {
                self.status = PurchaseOrderStatus::Cancelled;
                Ok(true)
            }
        }
    }

    /// Soft delete. Returns `false` when the order was already deleted.
    pub fn delete(&mut self) -> DomainResult<bool> {
        match self.status {
            PurchaseOrderStatus::Eliminada => Ok(false),
            PurchaseOrderStatus::Cancelled => Err(DomainError::invalid_state(
                "purchase order",
                self.id,
                self.status,
                "delete",
            )),
            _ => {
                self.status = PurchaseOrderStatus::Eliminada;
                Ok(true)
            }
        }
    }
}

impl Entity for PurchaseOrder {
    type Id = PurchaseOrderId;

    fn id(&self) -> PurchaseOrderId {
        self.id
    }
}
