use core::fmt;
use core::str::FromStr;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_core::{CustomerId, DomainError, DomainResult, Entity, ProductId, SaleOrderId};

/// Sale order status. Only `Pagada` holds stock; `Cancelada` and
/// `Eliminada` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SaleOrderStatus {
    Reservada,
    Pagada,
    Cancelada,
    Eliminada,
}

impl SaleOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleOrderStatus::Reservada => "Reservada",
            SaleOrderStatus::Pagada => "Pagada",
            SaleOrderStatus::Cancelada => "Cancelada",
            SaleOrderStatus::Eliminada => "Eliminada",
        }
    }

    pub fn affects_stock(&self) -> bool {
        matches!(self, SaleOrderStatus::Pagada)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SaleOrderStatus::Cancelada | SaleOrderStatus::Eliminada)
    }
}

impl fmt::Display for SaleOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SaleOrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reservada" => Ok(SaleOrderStatus::Reservada),
            "pagada" => Ok(SaleOrderStatus::Pagada),
            "cancelada" => Ok(SaleOrderStatus::Cancelada),
            "eliminada" => Ok(SaleOrderStatus::Eliminada),
            other => Err(DomainError::validation(format!(
                "unknown sale order status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSaleLine {
    pub product_id: ProductId,
    pub quantity: i64,
    /// Price in smallest currency unit (e.g., cents).
    pub unit_price: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleOrderLine {
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: u64,
    pub subtotal: u64,
}

/// Aggregate root: SaleOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleOrder {
    id: SaleOrderId,
    customer_id: CustomerId,
    status: SaleOrderStatus,
    lines: Vec<SaleOrderLine>,
    total: u64,
    created_at: DateTime<Utc>,
}

impl SaleOrder {
    pub fn new(
        customer_id: CustomerId,
        lines: Vec<NewSaleLine>,
        status: SaleOrderStatus,
    ) -> DomainResult<Self> {
        if lines.is_empty() {
            return Err(DomainError::validation("sale order needs at least one line"));
        }
        let mut built = Vec::with_capacity(lines.len());
        let mut total: u64 = 0;
        let mut per_product: BTreeMap<ProductId, i64> = BTreeMap::new();
        for (idx, line) in lines.into_iter().enumerate() {
            let line_no = u32::try_from(idx + 1)
                .map_err(|_| DomainError::validation("sale order has too many lines"))?;
            if line.quantity <= 0 {
                return Err(DomainError::validation(format!(
                    "line {line_no}: quantity must be positive"
                )));
            }
            if line.unit_price == 0 {
                return Err(DomainError::validation(format!(
                    "line {line_no}: unit price must be positive"
                )));
            }
            let subtotal = (line.quantity as u64)
                .checked_mul(line.unit_price)
                .ok_or_else(|| {
                    DomainError::validation(format!("line {line_no}: subtotal overflows"))
                })?;
            total = total
                .checked_add(subtotal)
                .ok_or_else(|| DomainError::validation("sale order total overflows"))?;
            let units = per_product.entry(line.product_id).or_insert(0);
            *units = units.checked_add(line.quantity).ok_or_else(|| {
                DomainError::validation(format!(
                    "line {line_no}: quantity for product {} overflows",
                    line.product_id
                ))
            })?;
            built.push(SaleOrderLine {
                line_no,
                product_id: line.product_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
                subtotal,
            });
        }
        Ok(Self {
            id: SaleOrderId::new(),
            customer_id,
            status,
            lines: built,
            total,
            created_at: Utc::now(),
        })
    }

    pub fn restore(
        id: SaleOrderId,
        customer_id: CustomerId,
        status: SaleOrderStatus,
        lines: Vec<SaleOrderLine>,
        total: u64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            customer_id,
            status,
            lines,
            total,
            created_at,
        }
    }

    pub fn id(&self) -> SaleOrderId {
        self.id
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn status(&self) -> SaleOrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[SaleOrderLine] {
        &self.lines
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Net stock delta per product this order should hold in `status`.
    ///
    /// `-qty` for every ordered product while Pagada, nothing otherwise.
    pub fn stock_target(
        &self,
        status: SaleOrderStatus,
    ) -> DomainResult<BTreeMap<ProductId, i64>> {
        let mut target = BTreeMap::new();
        if status.affects_stock() {
            for line in &self.lines {
                let entry = target.entry(line.product_id).or_insert(0i64);
                *entry = entry
                    .checked_sub(line.quantity)
                    .ok_or_else(|| DomainError::validation("sale quantity overflows"))?;
            }
        }
        Ok(target)
    }

    /// Check and apply a status change. Returns `false` for a same-status
    /// no-op.
    pub fn transition(&mut self, next: SaleOrderStatus) -> DomainResult<bool> {
        if self.status == next {
            return Ok(false);
        }
        if self.status.is_terminal() {
            return Err(DomainError::invalid_state(
                "sale order",
                self.id,
                self.status,
                "change status of",
            ));
        }
        self.status = next;
        Ok(true)
    }

    /// Returns `false` when the order was already cancelled.
    pub fn cancel(&mut self) -> DomainResult<bool> {
        match self.status {
            SaleOrderStatus::Cancelada => Ok(false),
            SaleOrderStatus::Eliminada => Err(DomainError::invalid_state(
                "sale order",
                self.id,
                self.status,
                "cancel",
            )),
            _ => {
                self.status = SaleOrderStatus::Cancelada;
                Ok(true)
            }
        }
    }

    /// Soft delete, allowed from any other state. Returns `false` when the
    /// order was already deleted.
    pub fn delete(&mut self) -> bool {
        if self.status == SaleOrderStatus::Eliminada {
            return false;
        }
        self.status = SaleOrderStatus::Eliminada;
        true
    }
}

impl Entity for SaleOrder {
    type Id = SaleOrderId;

    fn id(&self) -> SaleOrderId {
        self.id
    }
}
