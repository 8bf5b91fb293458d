//! `stockbook-core` — shared building blocks for the inventory engine.
//!
//! Identifiers, the error taxonomy and the unit-of-work contract. No IO lives
//! here; storage backends implement the traits from `unit_of_work`.

pub mod entity;
pub mod error;
pub mod id;
pub mod unit_of_work;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{
    CustomerId, LocationId, MovementId, ProductId, PurchaseOrderId, ReceptionId, SaleOrderId,
    SupplierId,
};
pub use unit_of_work::{TransactionalStore, UnitOfWork, run_in_transaction};
