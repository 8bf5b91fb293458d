//! Inventory domain module: products, the movement log and the stock ledger.
//!
//! Business rules only. Storage is reached through the `InventoryStore` port,
//! always via a transaction handed in by the caller.

pub mod catalog;
pub mod ledger;
pub mod log;
pub mod movement;
pub mod store;
pub mod threshold;

#[cfg(test)]
mod testing;

pub use catalog::{Catalog, Location, Product};
pub use ledger::{BalancePolicy, Reconciliation, StockLedger};
pub use log::MovementLog;
pub use movement::{
    MovementReason, MovementReference, NewMovement, ReferenceScope, StockMovement, Tracking,
};
pub use store::InventoryStore;
pub use threshold::{InventoryRow, StockFlags, Threshold, ThresholdMonitor};
