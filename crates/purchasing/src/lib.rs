//! Purchasing domain module: purchase orders, goods receptions and the
//! supplier price list.
//!
//! Workflows own the lifecycle rules and drive stock through the inventory
//! ledger. Storage is reached only through `PurchasingStore`, inside a
//! transaction supplied by the caller.

pub mod order;
pub mod reception;
pub mod receiving;
pub mod store;
pub mod supplier;
pub mod supplier_product;
pub mod workflow;

pub use order::{NewPurchaseLine, PurchaseOrder, PurchaseOrderLine, PurchaseOrderStatus};
pub use reception::{Reception, ReceptionHeader, ReceptionLine, ReceptionLineInput};
pub use receiving::{ReceiveOptions, ReceptionProcessor};
pub use store::PurchasingStore;
pub use supplier::{Supplier, Suppliers};
pub use supplier_product::{SupplierCatalog, SupplierProduct};
pub use workflow::PurchaseOrderWorkflow;
