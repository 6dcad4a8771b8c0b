//! Domain models for the LiteWMS ledger

mod stock;
mod transaction;

pub use stock::*;
pub use transaction::*;
