//! HTTP request handlers

pub mod catalog;
pub mod health;
pub mod transactions;

pub use catalog::*;
pub use health::*;
pub use transactions::*;
