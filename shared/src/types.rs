//! Common types used across the platform

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::TransactionKind;

pub type WarehouseId = i64;
pub type CategoryId = i64;
pub type ItemId = i64;
pub type TransactionId = i64;

/// Variant attributes of a stocked item, e.g. `{"size": "L", "color": "red"}`.
///
/// An empty map means the item has no variant. Ordering is by key so two
/// maps with the same pairs always compare and hash equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Specs(pub BTreeMap<String, String>);

impl Specs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style helper, mostly used by tests and seed data
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

impl fmt::Display for Specs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "-");
        }
        let pairs: Vec<String> = self.0.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        write!(f, "{}", pairs.join(", "))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Specs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Filter for listing ledger entries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionFilter {
    /// Matches the primary warehouse or the transfer destination
    pub warehouse_id: Option<WarehouseId>,
    #[serde(rename = "type")]
    pub kind: Option<TransactionKind>,
    /// Calendar day (UTC) of the transaction date
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub offset: i64,
    #[serde(default = "TransactionFilter::default_limit")]
    pub limit: i64,
}

impl TransactionFilter {
    pub const DEFAULT_LIMIT: i64 = 100;
    pub const MAX_LIMIT: i64 = 1000;

    fn default_limit() -> i64 {
        Self::DEFAULT_LIMIT
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Limit bounded to `1..=MAX_LIMIT`
    pub fn effective_limit(&self) -> i64 {
        self.limit.clamp(1, Self::MAX_LIMIT)
    }

    pub fn effective_offset(&self) -> i64 {
        self.offset.max(0)
    }
}

impl Default for TransactionFilter {
    fn default() -> Self {
        Self {
            warehouse_id: None,
            kind: None,
            date: None,
            offset: 0,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}
