//! Sales domain module: customers and sale orders.
//!
//! A sale only consumes stock while it is `Pagada`. Every status change
//! brings the stock tagged to the order in line with its new status.

pub mod customer;
pub mod order;
pub mod store;
pub mod workflow;

pub use customer::{Customer, Customers};
pub use order::{NewSaleLine, SaleOrder, SaleOrderLine, SaleOrderStatus};
pub use store::SalesStore;
pub use workflow::{SalesOrderWorkflow, SalesPolicy};
