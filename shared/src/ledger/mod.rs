//! Reversal engine: applies, undoes and re-applies the stock effect of
//! ledger entries.
//!
//! Every function here works against a [`StockLevels`] view and is
//! all-or-nothing: steps are staged and only written back when the whole
//! batch succeeds. Locking and persistence are the caller's job.

mod memory;

use thiserror::Error;

use crate::models::{
    Direction, Movement, NewTransaction, StepOverflow, StockChange, StockKey, StockStep,
    Transaction, TransactionPatch,
};
use crate::types::TransactionId;
use crate::validation::{
    validate_new_transaction, validate_notes, validate_operator, validate_quantity,
};

pub use memory::{InMemoryStock, MemoryLedger};

/// Read/write access to on-hand quantities
pub trait StockLevels {
    /// Current quantity, or `None` when the position does not exist
    fn on_hand(&self, key: &StockKey) -> Option<i64>;

    fn set_on_hand(&mut self, key: &StockKey, quantity: i64);
}

/// What to do when a step would take a position below zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegativeStock {
    /// Floor the quantity at zero and record the discarded amount
    Clamp,
    /// Fail the whole batch
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Transaction {0} not found")]
    NotFound(TransactionId),

    #[error("Stock position no longer exists: {0}")]
    UnknownStock(StockKey),

    #[error("Insufficient stock for {key}: on hand {on_hand}, requested {requested}")]
    InsufficientStock {
        key: StockKey,
        on_hand: i64,
        requested: i64,
    },

    #[error("Transaction {0} has already been reverted; delete its REVERT entry first")]
    AlreadyReverted(TransactionId),

    #[error("Quantity edits need a single-line transaction; transaction {id} has {lines} lines")]
    MultiLineQuantityEdit { id: TransactionId, lines: usize },

    #[error("Nothing to modify")]
    EmptyPatch,

    #[error("Stock quantity overflow for {0}")]
    Overflow(StockKey),

    #[error("Invalid input: {0}")]
    Invalid(&'static str),
}

impl From<StepOverflow> for LedgerError {
    fn from(err: StepOverflow) -> Self {
        LedgerError::Overflow(err.0)
    }
}

/// Apply `steps` as one batch.
///
/// Steps on the same position are netted first; the zero floor applies to
/// the net result. Returns one [`StockChange`] per touched position, in
/// first-touch order. Nothing is written to `levels` unless the whole batch
/// succeeds.
pub fn apply<L: StockLevels + ?Sized>(
    levels: &mut L,
    steps: &[StockStep],
    policy: NegativeStock,
) -> Result<Vec<StockChange>, LedgerError> {
    apply_stages(levels, &[steps], policy)
}

/// Apply several batches one after the other, as a single unit.
///
/// Each stage is netted and floored on its own, so a clamp in an early stage
/// is not undone by a later one. The returned changes span all stages:
/// `before` is the level ahead of the first stage, `after` the level after
/// the last, `clamped` the total discarded.
pub fn apply_stages<L: StockLevels + ?Sized>(
    levels: &mut L,
    stages: &[&[StockStep]],
    policy: NegativeStock,
) -> Result<Vec<StockChange>, LedgerError> {
    let mut staged: Vec<StockChange> = Vec::new();

    for steps in stages {
        let mut net: Vec<(usize, i64)> = Vec::new();

        for step in steps.iter() {
            let index = match staged.iter().position(|c| c.key == step.key) {
                Some(index) => index,
                None => {
                    let on_hand = levels
                        .on_hand(&step.key)
                        .ok_or_else(|| LedgerError::UnknownStock(step.key.clone()))?;
                    staged.push(StockChange::unchanged(step.key.clone(), on_hand));
                    staged.len() - 1
                }
            };
            match net.iter_mut().find(|(i, _)| *i == index) {
                Some((_, delta)) => {
                    *delta = delta
                        .checked_add(step.delta)
                        .ok_or_else(|| LedgerError::Overflow(step.key.clone()))?;
                }
                None => net.push((index, step.delta)),
            }
        }

        for (index, delta) in net {
            let change = &mut staged[index];
            let overflow = |key: &StockKey| LedgerError::Overflow(key.clone());
            let after = change
                .after
                .checked_add(delta)
                .ok_or_else(|| overflow(&change.key))?;
            if after >= 0 {
                change.after = after;
                continue;
            }
            match policy {
                NegativeStock::Reject => {
                    let requested = delta.checked_neg().ok_or_else(|| overflow(&change.key))?;
                    return Err(LedgerError::InsufficientStock {
                        key: change.key.clone(),
                        on_hand: change.after,
                        requested,
                    });
                }
                NegativeStock::Clamp => {
                    let clamped = after
                        .checked_neg()
                        .and_then(|discarded| change.clamped.checked_add(discarded))
                        .ok_or_else(|| overflow(&change.key))?;
                    change.clamped = clamped;
                    change.after = 0;
                }
            }
        }
    }

    for change in &staged {
        if change.after != change.before {
            levels.set_on_hand(&change.key, change.after);
        }
    }

    Ok(staged)
}

/// Forward effect of a new entry. Stock may not go negative.
pub fn record_effect<L: StockLevels + ?Sized>(
    levels: &mut L,
    input: &NewTransaction,
) -> Result<Vec<StockChange>, LedgerError> {
    validate_new_transaction(input).map_err(LedgerError::Invalid)?;
    apply(
        levels,
        &input.movement.steps(Direction::Forward)?,
        NegativeStock::Reject,
    )
}

/// Undo the effect of an entry that is about to be removed
pub fn delete_effect<L: StockLevels + ?Sized>(
    levels: &mut L,
    transaction: &Transaction,
) -> Result<Vec<StockChange>, LedgerError> {
    if transaction.reverted {
        return Err(LedgerError::AlreadyReverted(transaction.id));
    }
    apply(
        levels,
        &transaction.movement.steps(Direction::Inverse)?,
        NegativeStock::Clamp,
    )
}

/// Outcome of applying a patch to an entry
#[derive(Debug, Clone)]
pub struct Modification {
    pub transaction: Transaction,
    /// Empty when the quantity did not change
    pub changes: Vec<StockChange>,
}

/// Apply `patch` to `transaction`.
///
/// A quantity change undoes the old effect, flooring at zero the way a
/// delete does, then applies the new one. The other fields never touch
/// stock.
pub fn modify_effect<L: StockLevels + ?Sized>(
    levels: &mut L,
    transaction: &Transaction,
    patch: &TransactionPatch,
) -> Result<Modification, LedgerError> {
    if patch.is_empty() {
        return Err(LedgerError::EmptyPatch);
    }
    if let Some(operator) = &patch.operator {
        validate_operator(operator).map_err(LedgerError::Invalid)?;
    }
    if let Some(notes) = &patch.notes {
        validate_notes(notes).map_err(LedgerError::Invalid)?;
    }

    let mut updated = transaction.clone();
    let mut changes = Vec::new();

    if let Some(quantity) = patch.quantity {
        let current = transaction.movement.quantity().ok_or(LedgerError::MultiLineQuantityEdit {
            id: transaction.id,
            lines: transaction.movement.line_count(),
        })?;

        if quantity != current {
            if transaction.reverted {
                return Err(LedgerError::AlreadyReverted(transaction.id));
            }
            validate_quantity(transaction.movement.base_kind(), quantity)
                .map_err(LedgerError::Invalid)?;

            let movement = transaction.movement.with_quantity(quantity).ok_or(
                LedgerError::MultiLineQuantityEdit {
                    id: transaction.id,
                    lines: transaction.movement.line_count(),
                },
            )?;

            let undo = transaction.movement.steps(Direction::Inverse)?;
            let redo = movement.steps(Direction::Forward)?;
            changes = apply_stages(levels, &[undo.as_slice(), redo.as_slice()], NegativeStock::Clamp)?;
            updated.movement = movement;
        }
    }

    if let Some(operator) = &patch.operator {
        updated.operator = operator.trim().to_string();
    }
    if let Some(notes) = &patch.notes {
        updated.notes = notes.clone();
    }
    if let Some(date) = patch.date {
        updated.date = date;
    }

    Ok(Modification {
        transaction: updated,
        changes,
    })
}

/// Take back the effect of `transaction` while keeping it in the ledger.
///
/// Returns the movement of the REVERT entry to record alongside the stock
/// changes.
pub fn revert_effect<L: StockLevels + ?Sized>(
    levels: &mut L,
    transaction: &Transaction,
) -> Result<(Movement, Vec<StockChange>), LedgerError> {
    if transaction.reverted {
        return Err(LedgerError::AlreadyReverted(transaction.id));
    }
    let movement = Movement::revert_of(transaction.id, &transaction.movement);
    let changes = apply(
        levels,
        &movement.steps(Direction::Forward)?,
        NegativeStock::Clamp,
    )?;
    Ok((movement, changes))
}

/// Recompute stock from scratch: `opening` plus the forward effect of every
/// entry in commit (id) order, clamping at zero.
///
/// Positions that receive stock are created at zero when missing, the same
/// way recording does.
pub fn replay<'a, I>(opening: &InMemoryStock, entries: I) -> Result<InMemoryStock, LedgerError>
where
    I: IntoIterator<Item = &'a Transaction>,
{
    let mut ordered: Vec<&Transaction> = entries.into_iter().collect();
    ordered.sort_by_key(|t| t.id);

    let mut stock = opening.clone();
    for entry in ordered {
        for key in entry.movement.receiving_keys() {
            stock.ensure(&key);
        }
        apply(
            &mut stock,
            &entry.movement.steps(Direction::Forward)?,
            NegativeStock::Clamp,
        )?;
    }
    Ok(stock)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::{AdjustLine, StockLine, TransferLine};
    use crate::types::Specs;

    fn key(warehouse: i64) -> StockKey {
        StockKey::new(1, warehouse, Specs::new())
    }

    fn entry(id: TransactionId, movement: Movement) -> Transaction {
        Transaction {
            id,
            movement,
            date: Utc::now(),
            operator: "tester".to_string(),
            notes: String::new(),
            reverted: false,
            created_at: Utc::now(),
        }
    }

    fn inbound(warehouse: i64, quantity: i64) -> Movement {
        Movement::In {
            lines: vec![StockLine { key: key(warehouse), quantity }],
        }
    }

    fn outbound(warehouse: i64, quantity: i64) -> Movement {
        Movement::Out {
            lines: vec![StockLine { key: key(warehouse), quantity }],
        }
    }

    #[test]
    fn test_apply_unknown_key_leaves_stock_untouched() {
        let mut stock = InMemoryStock::new().with(key(1), 10);
        let steps = [StockStep::new(key(1), -4), StockStep::new(key(2), 4)];

        let err = apply(&mut stock, &steps, NegativeStock::Clamp).unwrap_err();
        assert_eq!(err, LedgerError::UnknownStock(key(2)));
        assert_eq!(stock.on_hand(&key(1)), Some(10));
    }

    #[test]
    fn test_apply_reject_is_all_or_nothing() {
        let mut stock = InMemoryStock::new().with(key(1), 10).with(key(2), 1);
        let steps = [StockStep::new(key(1), 5), StockStep::new(key(2), -3)];

        let err = apply(&mut stock, &steps, NegativeStock::Reject).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientStock { on_hand: 1, requested: 3, .. }
        ));
        assert_eq!(stock.on_hand(&key(1)), Some(10));
        assert_eq!(stock.on_hand(&key(2)), Some(1));
    }

    #[test]
    fn test_apply_clamp_records_discarded_amount() {
        let mut stock = InMemoryStock::new().with(key(1), 5);
        let changes = apply(&mut stock, &[StockStep::new(key(1), -8)], NegativeStock::Clamp).unwrap();

        assert_eq!(stock.on_hand(&key(1)), Some(0));
        assert_eq!(changes[0].before, 5);
        assert_eq!(changes[0].after, 0);
        assert_eq!(changes[0].clamped, 3);
        assert!(changes[0].was_clamped());
    }

    #[test]
    fn test_apply_merges_steps_on_same_key() {
        let mut stock = InMemoryStock::new().with(key(1), 50);
        let steps = [StockStep::new(key(1), 10), StockStep::new(key(1), -30)];
        let changes = apply(&mut stock, &steps, NegativeStock::Clamp).unwrap();

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].delta(), -20);
        assert_eq!(stock.on_hand(&key(1)), Some(30));
    }

    #[test]
    fn test_apply_floors_the_net_result_only() {
        // Undo IN 10 and apply IN 12 with only 5 left on hand
        let mut stock = InMemoryStock::new().with(key(1), 5);
        let steps = [StockStep::new(key(1), -10), StockStep::new(key(1), 12)];
        let changes = apply(&mut stock, &steps, NegativeStock::Clamp).unwrap();

        assert_eq!(stock.on_hand(&key(1)), Some(7));
        assert!(!changes[0].was_clamped());
    }

    #[test]
    fn test_delete_inbound_restores_stock() {
        // A = 100, IN 20 -> 120, delete -> 100
        let mut stock = InMemoryStock::new().with(key(1), 120);
        let changes = delete_effect(&mut stock, &entry(1, inbound(1, 20))).unwrap();
        assert_eq!(stock.on_hand(&key(1)), Some(100));
        assert_eq!(changes[0].delta(), -20);
    }

    #[test]
    fn test_delete_reverted_entry_is_refused() {
        let mut stock = InMemoryStock::new().with(key(1), 120);
        let mut reverted = entry(1, inbound(1, 20));
        reverted.reverted = true;

        assert_eq!(
            delete_effect(&mut stock, &reverted).unwrap_err(),
            LedgerError::AlreadyReverted(1)
        );
        assert_eq!(stock.on_hand(&key(1)), Some(120));
    }

    #[test]
    fn test_modify_outbound_quantity() {
        // A = 50, OUT 10 -> 40, modify to 30: +10 -> 50, -30 -> 20
        let mut stock = InMemoryStock::new().with(key(1), 40);
        let patch = TransactionPatch {
            quantity: Some(30),
            ..Default::default()
        };
        let result = modify_effect(&mut stock, &entry(2, outbound(1, 10)), &patch).unwrap();

        assert_eq!(stock.on_hand(&key(1)), Some(20));
        assert_eq!(result.transaction.movement.quantity(), Some(30));
        assert_eq!(result.changes[0].before, 40);
        assert_eq!(result.changes[0].after, 20);
    }

    #[test]
    fn test_modify_same_quantity_has_no_stock_effect() {
        let mut stock = InMemoryStock::new().with(key(1), 40);
        let patch = TransactionPatch {
            quantity: Some(10),
            notes: Some("recounted".to_string()),
            ..Default::default()
        };
        let result = modify_effect(&mut stock, &entry(2, outbound(1, 10)), &patch).unwrap();

        assert!(result.changes.is_empty());
        assert_eq!(result.transaction.notes, "recounted");
        assert_eq!(stock.on_hand(&key(1)), Some(40));
    }

    #[test]
    fn test_modify_reverted_metadata_only_is_allowed() {
        let mut stock = InMemoryStock::new().with(key(1), 40);
        let mut reverted = entry(2, outbound(1, 10));
        reverted.reverted = true;

        let notes_only = TransactionPatch {
            notes: Some("kept for audit".to_string()),
            ..Default::default()
        };
        assert!(modify_effect(&mut stock, &reverted, &notes_only).is_ok());

        let quantity = TransactionPatch {
            quantity: Some(3),
            ..Default::default()
        };
        assert_eq!(
            modify_effect(&mut stock, &reverted, &quantity).unwrap_err(),
            LedgerError::AlreadyReverted(2)
        );
    }

    #[test]
    fn test_modify_rejects_bad_input() {
        let mut stock = InMemoryStock::new().with(key(1), 40);
        let out = entry(2, outbound(1, 10));

        assert_eq!(
            modify_effect(&mut stock, &out, &TransactionPatch::default()).unwrap_err(),
            LedgerError::EmptyPatch
        );

        let negative = TransactionPatch {
            quantity: Some(-5),
            ..Default::default()
        };
        assert!(matches!(
            modify_effect(&mut stock, &out, &negative).unwrap_err(),
            LedgerError::Invalid(_)
        ));

        let multi = entry(
            3,
            Movement::In {
                lines: vec![
                    StockLine { key: key(1), quantity: 1 },
                    StockLine { key: StockKey::new(2, 1, Specs::new()), quantity: 1 },
                ],
            },
        );
        let quantity = TransactionPatch {
            quantity: Some(5),
            ..Default::default()
        };
        assert_eq!(
            modify_effect(&mut stock, &multi, &quantity).unwrap_err(),
            LedgerError::MultiLineQuantityEdit { id: 3, lines: 2 }
        );
        assert_eq!(stock.on_hand(&key(1)), Some(40));
    }

    #[test]
    fn test_modify_adjust_uses_signed_delta() {
        let mut stock = InMemoryStock::new().with(key(1), 7);
        let adjust = entry(
            4,
            Movement::Adjust {
                lines: vec![AdjustLine { key: key(1), delta: -3 }],
            },
        );
        let patch = TransactionPatch {
            quantity: Some(2),
            ..Default::default()
        };
        modify_effect(&mut stock, &adjust, &patch).unwrap();
        // 7 + 3 (undo -3) + 2
        assert_eq!(stock.on_hand(&key(1)), Some(12));
    }

    #[test]
    fn test_delete_transfer_restores_both_sides() {
        // TRANSFER 15 from A(20) to B(5): A=5, B=20; delete -> A=20, B=5
        let mut stock = InMemoryStock::new().with(key(1), 5).with(key(2), 20);
        let transfer = entry(
            3,
            Movement::Transfer {
                lines: vec![TransferLine { from: key(1), to: key(2), quantity: 15 }],
            },
        );
        delete_effect(&mut stock, &transfer).unwrap();
        assert_eq!(stock.on_hand(&key(1)), Some(20));
        assert_eq!(stock.on_hand(&key(2)), Some(5));
    }

    #[test]
    fn test_revert_then_delete_revert_entry() {
        let mut stock = InMemoryStock::new().with(key(1), 120);
        let original = entry(1, inbound(1, 20));

        let (movement, _) = revert_effect(&mut stock, &original).unwrap();
        assert_eq!(stock.on_hand(&key(1)), Some(100));

        let revert_entry = entry(2, movement);
        delete_effect(&mut stock, &revert_entry).unwrap();
        assert_eq!(stock.on_hand(&key(1)), Some(120));
    }

    #[test]
    fn test_record_effect_rejects_overdraw() {
        let mut stock = InMemoryStock::new().with(key(1), 3);
        let input = NewTransaction {
            movement: outbound(1, 4),
            operator: "tester".to_string(),
            notes: String::new(),
            date: None,
        };
        assert!(matches!(
            record_effect(&mut stock, &input).unwrap_err(),
            LedgerError::InsufficientStock { .. }
        ));
        assert_eq!(stock.on_hand(&key(1)), Some(3));
    }

    #[test]
    fn test_modify_floors_the_undo_before_reapplying() {
        // A = 0, IN 10 -> 10, OUT 5 -> 5, modify the IN to 12.
        // Undoing 10 from 5 floors at 0 (5 discarded), then +12.
        let mut stock = InMemoryStock::new().with(key(1), 5);
        let patch = TransactionPatch {
            quantity: Some(12),
            ..Default::default()
        };
        let result = modify_effect(&mut stock, &entry(1, inbound(1, 10)), &patch).unwrap();

        assert_eq!(stock.on_hand(&key(1)), Some(12));
        assert_eq!(result.changes.len(), 1);
        assert_eq!(result.changes[0].before, 5);
        assert_eq!(result.changes[0].after, 12);
        assert_eq!(result.changes[0].clamped, 5);
    }

    #[test]
    fn test_apply_stages_is_all_or_nothing() {
        let mut stock = InMemoryStock::new().with(key(1), 5).with(key(2), 1);
        let first = [StockStep::new(key(1), -8)];
        let second = [StockStep::new(key(2), -3)];

        let err = apply_stages(&mut stock, &[&first[..], &second[..]], NegativeStock::Reject).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientStock { on_hand: 5, requested: 8, .. }
        ));
        assert_eq!(stock.on_hand(&key(1)), Some(5));
        assert_eq!(stock.on_hand(&key(2)), Some(1));
    }

    #[test]
    fn test_record_effect_rejects_min_adjust_delta() {
        let mut stock = InMemoryStock::new().with(key(1), 0);
        let input = NewTransaction {
            movement: Movement::Adjust {
                lines: vec![AdjustLine { key: key(1), delta: i64::MIN }],
            },
            operator: "tester".to_string(),
            notes: String::new(),
            date: None,
        };
        assert!(matches!(
            record_effect(&mut stock, &input).unwrap_err(),
            LedgerError::Invalid(_)
        ));
        assert_eq!(stock.on_hand(&key(1)), Some(0));
    }

    #[test]
    fn test_modify_rejects_min_adjust_delta() {
        let mut stock = InMemoryStock::new().with(key(1), 1);
        let adjust = entry(
            1,
            Movement::Adjust {
                lines: vec![AdjustLine { key: key(1), delta: 1 }],
            },
        );
        let patch = TransactionPatch {
            quantity: Some(i64::MIN),
            ..Default::default()
        };
        assert!(matches!(
            modify_effect(&mut stock, &adjust, &patch).unwrap_err(),
            LedgerError::Invalid(_)
        ));
        assert_eq!(stock.on_hand(&key(1)), Some(1));
    }

    #[test]
    fn test_extreme_steps_report_overflow() {
        let mut stock = InMemoryStock::new().with(key(1), 0);
        let steps = [StockStep::new(key(1), i64::MIN)];

        for policy in [NegativeStock::Reject, NegativeStock::Clamp] {
            assert_eq!(
                apply(&mut stock, &steps, policy).unwrap_err(),
                LedgerError::Overflow(key(1))
            );
        }

        let stored = entry(
            2,
            Movement::Adjust {
                lines: vec![AdjustLine { key: key(1), delta: i64::MIN }],
            },
        );
        assert_eq!(
            delete_effect(&mut stock, &stored).unwrap_err(),
            LedgerError::Overflow(key(1))
        );
        assert_eq!(stock.on_hand(&key(1)), Some(0));
    }

    #[test]
    fn test_replay_matches_incremental_application() {
        let opening = InMemoryStock::new().with(key(1), 10);
        let entries = vec![
            entry(2, outbound(1, 4)),
            entry(1, inbound(1, 6)),
            entry(
                3,
                Movement::Transfer {
                    lines: vec![TransferLine { from: key(1), to: key(2), quantity: 5 }],
                },
            ),
        ];

        let replayed = replay(&opening, &entries).unwrap();
        assert_eq!(replayed.on_hand(&key(1)), Some(7));
        assert_eq!(replayed.on_hand(&key(2)), Some(5));
    }
}
