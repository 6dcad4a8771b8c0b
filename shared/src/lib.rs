//! Shared types, models and ledger logic for LiteWMS
//!
//! This crate has no I/O: it holds the transaction model, validation rules
//! and the reversal engine. The backend supplies persistence and locking.

pub mod ledger;
pub mod models;
pub mod types;
pub mod validation;

pub use ledger::*;
pub use models::*;
pub use types::*;
pub use validation::*;
