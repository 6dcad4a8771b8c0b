//! Stock positions and the per-key steps the ledger applies to them

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{CategoryId, Specs, WarehouseId};

/// Identifies one stock position: a catalogue item (category) with a given
/// variant, held in a given warehouse
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockKey {
    pub category_id: CategoryId,
    pub warehouse_id: WarehouseId,
    #[serde(default)]
    pub specs: Specs,
}

impl StockKey {
    pub fn new(category_id: CategoryId, warehouse_id: WarehouseId, specs: Specs) -> Self {
        Self {
            category_id,
            warehouse_id,
            specs,
        }
    }

    /// Same item and variant, held in another warehouse
    pub fn in_warehouse(&self, warehouse_id: WarehouseId) -> Self {
        Self {
            category_id: self.category_id,
            warehouse_id,
            specs: self.specs.clone(),
        }
    }

    /// True when both keys name the same item and variant
    pub fn same_item(&self, other: &StockKey) -> bool {
        self.category_id == other.category_id && self.specs == other.specs
    }
}

impl fmt::Display for StockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "category {} @ warehouse {} [{}]",
            self.category_id, self.warehouse_id, self.specs
        )
    }
}

/// Line of an IN or OUT movement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLine {
    pub key: StockKey,
    /// Magnitude; direction comes from the movement type
    pub quantity: i64,
}

/// Line of an ADJUST movement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustLine {
    pub key: StockKey,
    /// Signed correction
    pub delta: i64,
}

/// Line of a TRANSFER movement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLine {
    pub from: StockKey,
    pub to: StockKey,
    pub quantity: i64,
}

/// A signed change to one stock position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockStep {
    pub key: StockKey,
    pub delta: i64,
}

impl StockStep {
    pub fn new(key: StockKey, delta: i64) -> Self {
        Self { key, delta }
    }

    /// Step of `amount` in the direction of `sign`
    pub fn signed(key: StockKey, sign: i64, amount: i64) -> Result<Self, StepOverflow> {
        if sign >= 0 {
            return Ok(Self::new(key, amount));
        }
        match amount.checked_neg() {
            Some(delta) => Ok(Self::new(key, delta)),
            None => Err(StepOverflow(key)),
        }
    }
}

/// A line quantity that cannot be turned into a signed step
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Stock quantity overflow for {0}")]
pub struct StepOverflow(pub StockKey);

/// Net result of applying a batch of steps to one stock position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChange {
    pub key: StockKey,
    pub before: i64,
    pub after: i64,
    /// Amount discarded by clamping the quantity at zero
    pub clamped: i64,
}

impl StockChange {
    pub fn unchanged(key: StockKey, quantity: i64) -> Self {
        Self {
            key,
            before: quantity,
            after: quantity,
            clamped: 0,
        }
    }

    pub fn delta(&self) -> i64 {
        self.after - self.before
    }

    pub fn was_clamped(&self) -> bool {
        self.clamped > 0
    }
}
