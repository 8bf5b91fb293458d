use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockbook_core::{
    DomainError, DomainResult, Entity, LocationId, ProductId, PurchaseOrderId, ReceptionId,
};
use stockbook_inventory::Tracking;

/// Supplier document backing a reception (delivery note, invoice, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceptionHeader {
    pub document_type: Option<String>,
    pub document_number: Option<String>,
    pub document_date: Option<NaiveDate>,
}

/// Caller-supplied reception line, referencing a purchase order line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceptionLineInput {
    pub line_no: u32,
    pub received_qty: i64,
    pub location_id: Option<LocationId>,
    pub lot: Option<String>,
    pub serial: Option<String>,
    pub expiry: Option<NaiveDate>,
}

impl ReceptionLineInput {
    pub fn new(line_no: u32, received_qty: i64) -> Self {
        Self {
            line_no,
            received_qty,
            ..Self::default()
        }
    }

    pub fn tracking(&self) -> Tracking {
        Tracking {
            lot: self.lot.clone(),
            serial: self.serial.clone(),
            expiry: self.expiry,
        }
    }
}

/// Stored reception line with normalized tracking data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceptionLine {
    pub line_no: u32,
    pub product_id: ProductId,
    pub received_qty: i64,
    pub location_id: Option<LocationId>,
    pub tracking: Tracking,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reception {
    pub id: ReceptionId,
    pub purchase_order_id: PurchaseOrderId,
    pub header: ReceptionHeader,
    pub lines: Vec<ReceptionLine>,
    pub created_at: DateTime<Utc>,
}

impl Reception {
    pub fn total_received(&self) -> DomainResult<i64> {
        self.lines.iter().try_fold(0i64, |acc, l| {
            acc.checked_add(l.received_qty)
                .ok_or_else(|| DomainError::validation("reception total overflows"))
        })
    }
}

impl Entity for Reception {
    type Id = ReceptionId;

    fn id(&self) -> ReceptionId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reception(qtys: &[i64]) -> Reception {
        Reception {
            id: ReceptionId::new(),
            purchase_order_id: PurchaseOrderId::new(),
            header: ReceptionHeader::default(),
            lines: qtys
                .iter()
                .enumerate()
                .map(|(idx, qty)| ReceptionLine {
                    line_no: idx as u32 + 1,
                    product_id: ProductId::new(),
                    received_qty: *qty,
                    location_id: None,
                    tracking: Tracking::default(),
                })
                .collect(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn total_adds_up_every_line() {
        assert_eq!(reception(&[4, 0, 6]).total_received().unwrap(), 10);
    }

    #[test]
    fn total_past_i64_is_a_validation_error() {
        let err = reception(&[i64::MAX, i64::MAX]).total_received().unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
