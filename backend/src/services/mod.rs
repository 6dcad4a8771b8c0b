//! Business logic services for LiteWMS

pub mod catalog;
pub mod stock;
pub mod transactions;

pub use catalog::CatalogService;
pub use stock::LockedStock;
pub use transactions::{StockOutcome, TransactionDetail, TransactionService};
