//! Domain error model.

use thiserror::Error;

use crate::id::{ProductId, PurchaseOrderId};

/// Result type used across the engine.
pub type DomainResult<T> = Result<T, DomainError>;

/// Engine-level error.
///
/// Every variant carries enough context to identify the offending entity or
/// line. Any error returned from an operation aborts its transaction; the
/// only absorbed case is a repeated cancel/delete, which succeeds as a no-op.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input, or mutually exclusive fields both set.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A referenced entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// The operation is not valid for the entity's current lifecycle state.
    #[error("cannot {action} {entity} {id} in state {state}")]
    InvalidState {
        entity: &'static str,
        id: String,
        state: String,
        action: &'static str,
    },

    /// A reception line exceeds what is still pending on the order line.
    #[error(
        "over-receipt on purchase order {order_id} line {line_no} (product {product_id}): \
         requested {requested}, remaining {remaining}"
    )]
    OverReceipt {
        order_id: PurchaseOrderId,
        line_no: u32,
        product_id: ProductId,
        requested: i64,
        remaining: i64,
    },

    /// The movement would drive a product's stock below zero.
    #[error("insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: ProductId,
        available: i64,
        requested: i64,
    },

    /// Invalid min/max threshold combination.
    #[error("invalid thresholds: {0}")]
    Threshold(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// Lock wait timed out, deadlock, or a uniqueness conflict. Retrying the
    /// whole operation is the caller's call.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The storage backend failed.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_state(
        entity: &'static str,
        id: impl ToString,
        state: impl ToString,
        action: &'static str,
    ) -> Self {
        Self::InvalidState {
            entity,
            id: id.to_string(),
            state: state.to_string(),
            action,
        }
    }

    pub fn threshold(msg: impl Into<String>) -> Self {
        Self::Threshold(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Whether retrying the whole operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
