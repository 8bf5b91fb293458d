use core::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockbook_core::{
    DomainError, DomainResult, LocationId, MovementId, ProductId, PurchaseOrderId, ReceptionId,
    SaleOrderId,
};

/// Why a movement happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementReason {
    OpeningBalance,
    ManualEntry,
    ManualExit,
    Correction,
    /// Full increase applied when a purchase order is created already completed.
    PurchaseCreation,
    PurchaseReceipt,
    PurchaseReversal,
    SaleDispatch,
    SaleReversal,
}

impl MovementReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementReason::OpeningBalance => "opening_balance",
            MovementReason::ManualEntry => "manual_entry",
            MovementReason::ManualExit => "manual_exit",
            MovementReason::Correction => "correction",
            MovementReason::PurchaseCreation => "purchase_creation",
            MovementReason::PurchaseReceipt => "purchase_receipt",
            MovementReason::PurchaseReversal => "purchase_reversal",
            MovementReason::SaleDispatch => "sale_dispatch",
            MovementReason::SaleReversal => "sale_reversal",
        }
    }
}

impl FromStr for MovementReason {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let reason = match s {
            "opening_balance" => MovementReason::OpeningBalance,
            "manual_entry" => MovementReason::ManualEntry,
            "manual_exit" => MovementReason::ManualExit,
            "correction" => MovementReason::Correction,
            "purchase_creation" => MovementReason::PurchaseCreation,
            "purchase_receipt" => MovementReason::PurchaseReceipt,
            "purchase_reversal" => MovementReason::PurchaseReversal,
            "sale_dispatch" => MovementReason::SaleDispatch,
            "sale_reversal" => MovementReason::SaleReversal,
            other => {
                return Err(DomainError::validation(format!(
                    "unknown movement reason '{other}'"
                )));
            }
        };
        Ok(reason)
    }
}

/// The originating document a movement is tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MovementReference {
    Manual,
    PurchaseOrder {
        purchase_order_id: PurchaseOrderId,
    },
    Reception {
        purchase_order_id: PurchaseOrderId,
        reception_id: ReceptionId,
    },
    SaleOrder {
        sale_order_id: SaleOrderId,
    },
}

impl MovementReference {
    pub fn purchase_order_id(&self) -> Option<PurchaseOrderId> {
        match self {
            MovementReference::PurchaseOrder { purchase_order_id }
            | MovementReference::Reception {
                purchase_order_id, ..
            } => Some(*purchase_order_id),
            _ => None,
        }
    }

    pub fn reception_id(&self) -> Option<ReceptionId> {
        match self {
            MovementReference::Reception { reception_id, .. } => Some(*reception_id),
            _ => None,
        }
    }

    pub fn sale_order_id(&self) -> Option<SaleOrderId> {
        match self {
            MovementReference::SaleOrder { sale_order_id } => Some(*sale_order_id),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MovementReference::Manual => "manual",
            MovementReference::PurchaseOrder { .. } => "purchase_order",
            MovementReference::Reception { .. } => "reception",
            MovementReference::SaleOrder { .. } => "sale_order",
        }
    }

    pub fn falls_within(&self, scope: ReferenceScope) -> bool {
        match scope {
            ReferenceScope::PurchaseOrder(id) => self.purchase_order_id() == Some(id),
            ReferenceScope::SaleOrder(id) => self.sale_order_id() == Some(id),
        }
    }
}

/// Every movement tagged to one order. A purchase order's scope includes the
/// movements of its receptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceScope {
    PurchaseOrder(PurchaseOrderId),
    SaleOrder(SaleOrderId),
}

/// Batch-tracking data carried by a movement. `lot` and `serial` are
/// mutually exclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tracking {
    pub lot: Option<String>,
    pub serial: Option<String>,
    pub expiry: Option<NaiveDate>,
}

impl Tracking {
    /// Trim identifiers, treat blank ones as unset, and enforce lot XOR serial.
    pub fn normalized(self) -> DomainResult<Self> {
        let lot = non_blank(self.lot);
        let serial = non_blank(self.serial);
        if lot.is_some() && serial.is_some() {
            return Err(DomainError::validation(
                "lot and serial cannot both be set on one line",
            ));
        }
        Ok(Self {
            lot,
            serial,
            expiry: self.expiry,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// An immutable movement-log row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: MovementId,
    pub product_id: ProductId,
    pub location_id: Option<LocationId>,
    pub delta: i64,
    pub reason: MovementReason,
    pub reference: MovementReference,
    pub tracking: Tracking,
    pub note: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// A movement request, before the log assigns it an id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMovement {
    pub product_id: ProductId,
    pub location_id: Option<LocationId>,
    pub delta: i64,
    pub reason: MovementReason,
    pub reference: MovementReference,
    pub tracking: Tracking,
    pub note: Option<String>,
}

impl NewMovement {
    pub fn new(
        product_id: ProductId,
        delta: i64,
        reason: MovementReason,
        reference: MovementReference,
    ) -> Self {
        Self {
            product_id,
            location_id: None,
            delta,
            reason,
            reference,
            tracking: Tracking::default(),
            note: None,
        }
    }

    pub fn at_location(mut self, location_id: Option<LocationId>) -> Self {
        self.location_id = location_id;
        self
    }

    pub fn with_tracking(mut self, tracking: Tracking) -> Self {
        self.tracking = tracking;
        self
    }

    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.note = note;
        self
    }
}
