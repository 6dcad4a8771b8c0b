//! In-memory stock and ledger, used for replay and in tests

use std::collections::BTreeMap;

use chrono::Utc;

use super::{
    delete_effect, modify_effect, record_effect, revert_effect, LedgerError, Modification,
    StockLevels,
};
use crate::models::{NewTransaction, StockChange, StockKey, Transaction, TransactionPatch};
use crate::types::TransactionId;
use crate::validation::{validate_new_transaction, validate_operator, validate_notes};

/// On-hand quantities keyed by stock position
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InMemoryStock {
    levels: BTreeMap<StockKey, i64>,
}

impl InMemoryStock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: StockKey, quantity: i64) -> Self {
        self.levels.insert(key, quantity);
        self
    }

    /// Create the position at zero if it does not exist yet
    pub fn ensure(&mut self, key: &StockKey) {
        self.levels.entry(key.clone()).or_insert(0);
    }

    pub fn remove(&mut self, key: &StockKey) -> Option<i64> {
        self.levels.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StockKey, &i64)> {
        self.levels.iter()
    }
}

impl StockLevels for InMemoryStock {
    fn on_hand(&self, key: &StockKey) -> Option<i64> {
        self.levels.get(key).copied()
    }

    fn set_on_hand(&mut self, key: &StockKey, quantity: i64) {
        self.levels.insert(key.clone(), quantity);
    }
}

/// A ledger plus the stock it drives, with the same rules the database
/// backed service enforces
#[derive(Debug, Clone)]
pub struct MemoryLedger {
    stock: InMemoryStock,
    entries: BTreeMap<TransactionId, Transaction>,
    next_id: TransactionId,
}

impl MemoryLedger {
    pub fn new(opening: InMemoryStock) -> Self {
        Self {
            stock: opening,
            entries: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn stock(&self) -> &InMemoryStock {
        &self.stock
    }

    pub fn stock_mut(&mut self) -> &mut InMemoryStock {
        &mut self.stock
    }

    pub fn get(&self, id: TransactionId) -> Option<&Transaction> {
        self.entries.get(&id)
    }

    /// Entries in commit order
    pub fn entries(&self) -> impl Iterator<Item = &Transaction> {
        self.entries.values()
    }

    pub fn record(&mut self, input: NewTransaction) -> Result<TransactionId, LedgerError> {
        validate_new_transaction(&input).map_err(LedgerError::Invalid)?;

        let mut staged = self.stock.clone();
        for key in input.movement.receiving_keys() {
            staged.ensure(&key);
        }
        record_effect(&mut staged, &input)?;
        self.stock = staged;

        let now = Utc::now();
        let id = self.allocate_id();
        self.entries.insert(
            id,
            Transaction {
                id,
                movement: input.movement,
                date: input.date.unwrap_or(now),
                operator: input.operator.trim().to_string(),
                notes: input.notes,
                reverted: false,
                created_at: now,
            },
        );
        Ok(id)
    }

    pub fn delete(&mut self, id: TransactionId) -> Result<Vec<StockChange>, LedgerError> {
        let transaction = self.entries.get(&id).ok_or(LedgerError::NotFound(id))?;
        let changes = delete_effect(&mut self.stock, transaction)?;

        if let Some(original) = transaction.movement.reverts() {
            if let Some(entry) = self.entries.get_mut(&original) {
                entry.reverted = false;
            }
        }
        self.entries.remove(&id);
        Ok(changes)
    }

    pub fn modify(
        &mut self,
        id: TransactionId,
        patch: &TransactionPatch,
    ) -> Result<Modification, LedgerError> {
        let transaction = self.entries.get(&id).ok_or(LedgerError::NotFound(id))?;
        let modification = modify_effect(&mut self.stock, transaction, patch)?;
        self.entries.insert(id, modification.transaction.clone());
        Ok(modification)
    }

    /// Record a REVERT entry for `id` and flag `id` as reverted
    pub fn revert(
        &mut self,
        id: TransactionId,
        operator: &str,
        notes: &str,
    ) -> Result<(TransactionId, Vec<StockChange>), LedgerError> {
        validate_operator(operator).map_err(LedgerError::Invalid)?;
        validate_notes(notes).map_err(LedgerError::Invalid)?;

        let transaction = self.entries.get(&id).ok_or(LedgerError::NotFound(id))?;
        let (movement, changes) = revert_effect(&mut self.stock, transaction)?;

        let now = Utc::now();
        let revert_id = self.allocate_id();
        self.entries.insert(
            revert_id,
            Transaction {
                id: revert_id,
                movement,
                date: now,
                operator: operator.trim().to_string(),
                notes: notes.to_string(),
                reverted: false,
                created_at: now,
            },
        );
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.reverted = true;
        }
        Ok((revert_id, changes))
    }

    fn allocate_id(&mut self) -> TransactionId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}
