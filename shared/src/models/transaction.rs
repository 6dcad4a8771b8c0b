//! Ledger entries and their stock movements

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::stock::{AdjustLine, StepOverflow, StockKey, StockLine, StockStep, TransferLine};
use crate::types::{TransactionId, WarehouseId};

/// Transaction types as stored in the `kind` column and accepted by filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    In,
    Out,
    Adjust,
    Transfer,
    Revert,
}

impl TransactionKind {
    pub const ALL: [TransactionKind; 5] = [
        TransactionKind::In,
        TransactionKind::Out,
        TransactionKind::Adjust,
        TransactionKind::Transfer,
        TransactionKind::Revert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::In => "IN",
            TransactionKind::Out => "OUT",
            TransactionKind::Adjust => "ADJUST",
            TransactionKind::Transfer => "TRANSFER",
            TransactionKind::Revert => "REVERT",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown transaction type '{0}' (expected IN, OUT, ADJUST, TRANSFER or REVERT)")]
pub struct ParseKindError(pub String);

impl FromStr for TransactionKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        TransactionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == upper)
            .ok_or_else(|| ParseKindError(s.to_string()))
    }
}

/// Which way a movement is applied to stock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The effect the transaction had when it was recorded
    Forward,
    /// Undo of the forward effect
    Inverse,
}

impl Direction {
    fn sign(self) -> i64 {
        match self {
            Direction::Forward => 1,
            Direction::Inverse => -1,
        }
    }
}

/// The stock effect of a ledger entry, one case per transaction type.
///
/// Each case carries exactly the keys it needs: a transfer line holds a
/// source and a destination key, every other line holds one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Movement {
    In { lines: Vec<StockLine> },
    Out { lines: Vec<StockLine> },
    Adjust { lines: Vec<AdjustLine> },
    Transfer { lines: Vec<TransferLine> },
    /// Records that entry `reverts`, whose movement was `undone`, had its
    /// effect taken back
    Revert {
        reverts: TransactionId,
        undone: Box<Movement>,
    },
}

impl Movement {
    pub fn revert_of(id: TransactionId, undone: &Movement) -> Self {
        Movement::Revert {
            reverts: id,
            undone: Box::new(undone.clone()),
        }
    }

    pub fn kind(&self) -> TransactionKind {
        match self {
            Movement::In { .. } => TransactionKind::In,
            Movement::Out { .. } => TransactionKind::Out,
            Movement::Adjust { .. } => TransactionKind::Adjust,
            Movement::Transfer { .. } => TransactionKind::Transfer,
            Movement::Revert { .. } => TransactionKind::Revert,
        }
    }

    /// Type of the innermost non-revert movement
    pub fn base_kind(&self) -> TransactionKind {
        match self {
            Movement::Revert { undone, .. } => undone.base_kind(),
            other => other.kind(),
        }
    }

    /// Signed per-key steps, in application order
    pub fn steps(&self, direction: Direction) -> Result<Vec<StockStep>, StepOverflow> {
        self.signed_lines(direction.sign())
            .into_iter()
            .map(|(key, sign, amount)| StockStep::signed(key.clone(), sign, amount))
            .collect()
    }

    /// `(key, sign, amount)` per step; the step is `sign * amount`
    fn signed_lines(&self, sign: i64) -> Vec<(&StockKey, i64, i64)> {
        match self {
            Movement::In { lines } => lines.iter().map(|l| (&l.key, sign, l.quantity)).collect(),
            Movement::Out { lines } => lines.iter().map(|l| (&l.key, -sign, l.quantity)).collect(),
            Movement::Adjust { lines } => lines.iter().map(|l| (&l.key, sign, l.delta)).collect(),
            Movement::Transfer { lines } => lines
                .iter()
                .flat_map(|l| [(&l.from, -sign, l.quantity), (&l.to, sign, l.quantity)])
                .collect(),
            Movement::Revert { undone, .. } => undone.signed_lines(-sign),
        }
    }

    /// Every stock position the movement touches
    pub fn keys(&self) -> BTreeSet<StockKey> {
        self.signed_lines(1)
            .into_iter()
            .map(|(key, _, _)| key.clone())
            .collect()
    }

    /// Positions that gain stock when the movement is applied forward
    pub fn receiving_keys(&self) -> BTreeSet<StockKey> {
        self.signed_lines(1)
            .into_iter()
            .filter(|(_, sign, amount)| sign * amount.signum() > 0)
            .map(|(key, _, _)| key.clone())
            .collect()
    }

    pub fn line_count(&self) -> usize {
        match self {
            Movement::In { lines } | Movement::Out { lines } => lines.len(),
            Movement::Adjust { lines } => lines.len(),
            Movement::Transfer { lines } => lines.len(),
            Movement::Revert { undone, .. } => undone.line_count(),
        }
    }

    /// Quantity of a single-line movement (the signed delta for ADJUST).
    /// `None` when the movement has several lines.
    pub fn quantity(&self) -> Option<i64> {
        match self {
            Movement::In { lines } | Movement::Out { lines } => match lines.as_slice() {
                [line] => Some(line.quantity),
                _ => None,
            },
            Movement::Adjust { lines } => match lines.as_slice() {
                [line] => Some(line.delta),
                _ => None,
            },
            Movement::Transfer { lines } => match lines.as_slice() {
                [line] => Some(line.quantity),
                _ => None,
            },
            Movement::Revert { undone, .. } => undone.quantity(),
        }
    }

    /// Copy of a single-line movement with its quantity replaced.
    /// `None` when the movement has several lines.
    pub fn with_quantity(&self, quantity: i64) -> Option<Movement> {
        if self.line_count() != 1 {
            return None;
        }
        let mut updated = self.clone();
        match &mut updated {
            Movement::In { lines } | Movement::Out { lines } => lines[0].quantity = quantity,
            Movement::Adjust { lines } => lines[0].delta = quantity,
            Movement::Transfer { lines } => lines[0].quantity = quantity,
            Movement::Revert { undone, .. } => {
                *undone = Box::new(undone.with_quantity(quantity)?);
            }
        }
        Some(updated)
    }

    /// Summary quantity: sum of line magnitudes, signed sum for ADJUST
    pub fn total_quantity(&self) -> i64 {
        match self {
            Movement::In { lines } | Movement::Out { lines } => {
                lines.iter().map(|l| l.quantity).sum()
            }
            Movement::Adjust { lines } => lines.iter().map(|l| l.delta).sum(),
            Movement::Transfer { lines } => lines.iter().map(|l| l.quantity).sum(),
            Movement::Revert { undone, .. } => undone.total_quantity(),
        }
    }

    /// Warehouse the entry is filed under (transfer source for TRANSFER)
    pub fn warehouse_id(&self) -> Option<WarehouseId> {
        match self {
            Movement::In { lines } | Movement::Out { lines } => {
                lines.first().map(|l| l.key.warehouse_id)
            }
            Movement::Adjust { lines } => lines.first().map(|l| l.key.warehouse_id),
            Movement::Transfer { lines } => lines.first().map(|l| l.from.warehouse_id),
            Movement::Revert { undone, .. } => undone.warehouse_id(),
        }
    }

    /// Transfer destination, if any
    pub fn related_warehouse_id(&self) -> Option<WarehouseId> {
        match self {
            Movement::Transfer { lines } => lines.first().map(|l| l.to.warehouse_id),
            Movement::Revert { undone, .. } => undone.related_warehouse_id(),
            _ => None,
        }
    }

    /// Id of the entry this one reverts
    pub fn reverts(&self) -> Option<TransactionId> {
        match self {
            Movement::Revert { reverts, .. } => Some(*reverts),
            _ => None,
        }
    }
}

/// A committed ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    #[serde(flatten)]
    pub movement: Movement,
    pub date: DateTime<Utc>,
    pub operator: String,
    pub notes: String,
    /// Set while a REVERT entry undoing this one exists
    pub reverted: bool,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn kind(&self) -> TransactionKind {
        self.movement.kind()
    }
}

/// Input for recording a new ledger entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransaction {
    #[serde(flatten)]
    pub movement: Movement,
    pub operator: String,
    #[serde(default)]
    pub notes: String,
    /// Defaults to the time of recording
    pub date: Option<DateTime<Utc>>,
}

/// Partial update of a ledger entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionPatch {
    pub quantity: Option<i64>,
    pub operator: Option<String>,
    pub notes: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

impl TransactionPatch {
    pub fn is_empty(&self) -> bool {
        self.quantity.is_none()
            && self.operator.is_none()
            && self.notes.is_none()
            && self.date.is_none()
    }
}
