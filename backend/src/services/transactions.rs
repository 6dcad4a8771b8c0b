//! Ledger service: records, reverses, edits and reverts transactions while
//! keeping item quantities consistent

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{
    delete_effect, modify_effect, record_effect, revert_effect, validate_new_transaction,
    validate_notes, validate_operator, CategoryId, LedgerError, Movement, NewTransaction,
    StockChange, Transaction, TransactionFilter, TransactionId, TransactionPatch, WarehouseId,
};
use sqlx::{types::Json, FromRow, PgConnection, PgPool};

use crate::error::{AppError, AppResult};
use crate::services::stock::LockedStock;

/// Ledger service backed by PostgreSQL
#[derive(Clone)]
pub struct TransactionService {
    db: PgPool,
}

#[derive(Debug, FromRow)]
struct TransactionRow {
    id: TransactionId,
    movement: Json<Movement>,
    date: DateTime<Utc>,
    operator: String,
    notes: String,
    reverted: bool,
    created_at: DateTime<Utc>,
}

impl From<TransactionRow> for Transaction {
    fn from(row: TransactionRow) -> Self {
        Transaction {
            id: row.id,
            movement: row.movement.0,
            date: row.date,
            operator: row.operator,
            notes: row.notes,
            reverted: row.reverted,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct NameRow {
    id: i64,
    name: String,
}

/// Result of a mutating ledger operation
#[derive(Debug, Clone, Serialize)]
pub struct StockOutcome {
    /// The entry as committed (for delete: as it was before removal)
    pub transaction: Transaction,
    /// Net quantity change per touched position
    pub changes: Vec<StockChange>,
}

impl StockOutcome {
    pub fn clamped(&self) -> impl Iterator<Item = &StockChange> {
        self.changes.iter().filter(|c| c.was_clamped())
    }
}

/// A ledger entry with the names of what it refers to
#[derive(Debug, Clone, Serialize)]
pub struct TransactionDetail {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub warehouse_name: Option<String>,
    pub related_warehouse_name: Option<String>,
    pub category_names: BTreeMap<CategoryId, String>,
}

const SELECT_COLUMNS: &str =
    "SELECT id, movement, date, operator, notes, reverted, created_at FROM transactions";

impl TransactionService {
    /// Create a new TransactionService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// List entries, newest first
    pub async fn list(&self, filter: &TransactionFilter) -> AppResult<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            {SELECT_COLUMNS}
            WHERE ($1::BIGINT IS NULL OR warehouse_id = $1 OR related_warehouse_id = $1)
              AND ($2::TEXT IS NULL OR kind = $2)
              AND ($3::DATE IS NULL OR (date AT TIME ZONE 'UTC')::date = $3)
            ORDER BY date DESC, id DESC
            LIMIT $4 OFFSET $5
            "#
        ))
        .bind(filter.warehouse_id)
        .bind(filter.kind.map(|k| k.as_str()))
        .bind(filter.date)
        .bind(filter.effective_limit())
        .bind(filter.effective_offset())
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Transaction::from).collect())
    }

    pub async fn get(&self, id: TransactionId) -> AppResult<Transaction> {
        sqlx::query_as::<_, TransactionRow>(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .map(Transaction::from)
            .ok_or_else(|| AppError::NotFound(format!("Transaction {}", id)))
    }

    /// Entry plus warehouse and category names, for display
    pub async fn detail(&self, id: TransactionId) -> AppResult<TransactionDetail> {
        let transaction = self.get(id).await?;

        let warehouse_ids: Vec<WarehouseId> = [
            transaction.movement.warehouse_id(),
            transaction.movement.related_warehouse_id(),
        ]
        .into_iter()
        .flatten()
        .collect();
        let warehouses: BTreeMap<i64, String> =
            sqlx::query_as::<_, NameRow>("SELECT id, name FROM warehouses WHERE id = ANY($1)")
                .bind(&warehouse_ids)
                .fetch_all(&self.db)
                .await?
                .into_iter()
                .map(|row| (row.id, row.name))
                .collect();

        let category_ids: Vec<CategoryId> = transaction
            .movement
            .keys()
            .iter()
            .map(|key| key.category_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let category_names =
            sqlx::query_as::<_, NameRow>("SELECT id, name FROM categories WHERE id = ANY($1)")
                .bind(&category_ids)
                .fetch_all(&self.db)
                .await?
                .into_iter()
                .map(|row| (row.id, row.name))
                .collect();

        Ok(TransactionDetail {
            warehouse_name: transaction
                .movement
                .warehouse_id()
                .and_then(|id| warehouses.get(&id).cloned()),
            related_warehouse_name: transaction
                .movement
                .related_warehouse_id()
                .and_then(|id| warehouses.get(&id).cloned()),
            category_names,
            transaction,
        })
    }

    /// Record a new entry and apply its effect. Stock may not go negative.
    pub async fn record(&self, input: NewTransaction) -> AppResult<StockOutcome> {
        validate_new_transaction(&input).map_err(|e| AppError::ValidationError(e.to_string()))?;

        let mut tx = self.db.begin().await?;

        ensure_catalogue(&mut tx, &input.movement).await?;
        LockedStock::ensure_items(&mut tx, &input.movement.receiving_keys()).await?;

        let mut stock = LockedStock::lock(&mut tx, &input.movement.keys()).await?;
        let changes = record_effect(&mut stock, &input).map_err(|err| match err {
            LedgerError::UnknownStock(key) => AppError::NotFound(format!("Item {}", key)),
            other => AppError::from(other),
        })?;
        stock.flush(&mut tx).await?;

        let transaction = insert_entry(
            &mut tx,
            &input.movement,
            input.date.unwrap_or_else(Utc::now),
            input.operator.trim(),
            &input.notes,
            None,
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            transaction_id = transaction.id,
            kind = %transaction.kind(),
            operator = %transaction.operator,
            "Transaction recorded"
        );
        Ok(StockOutcome {
            transaction,
            changes,
        })
    }

    /// Remove an entry and undo its effect on stock
    pub async fn delete(&self, id: TransactionId, reason: Option<&str>) -> AppResult<StockOutcome> {
        let mut tx = self.db.begin().await?;

        let transaction = lock_entry(&mut tx, id).await?;
        let mut stock = LockedStock::lock(&mut tx, &transaction.movement.keys()).await?;
        let changes = delete_effect(&mut stock, &transaction)?;
        stock.flush(&mut tx).await?;

        if let Some(original) = transaction.movement.reverts() {
            sqlx::query("UPDATE transactions SET reverted = FALSE WHERE id = $1")
                .bind(original)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("DELETE FROM transactions WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let outcome = StockOutcome {
            transaction,
            changes,
        };
        log_clamped(id, &outcome);
        tracing::info!(
            transaction_id = id,
            kind = %outcome.transaction.kind(),
            reason = reason.unwrap_or(""),
            "Transaction deleted"
        );
        Ok(outcome)
    }

    /// Edit an entry. A quantity change moves stock by the difference; the
    /// other fields only change the record.
    pub async fn modify(&self, id: TransactionId, patch: &TransactionPatch) -> AppResult<StockOutcome> {
        let mut tx = self.db.begin().await?;

        let transaction = lock_entry(&mut tx, id).await?;
        let keys = if patch.quantity.is_some() {
            transaction.movement.keys()
        } else {
            BTreeSet::new()
        };
        let mut stock = LockedStock::lock(&mut tx, &keys).await?;
        let modification = modify_effect(&mut stock, &transaction, patch)?;
        stock.flush(&mut tx).await?;

        let updated = modification.transaction;
        sqlx::query(
            r#"
            UPDATE transactions
            SET movement = $2, quantity = $3, date = $4, operator = $5, notes = $6
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(Json(&updated.movement))
        .bind(updated.movement.total_quantity())
        .bind(updated.date)
        .bind(&updated.operator)
        .bind(&updated.notes)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let outcome = StockOutcome {
            transaction: updated,
            changes: modification.changes,
        };
        log_clamped(id, &outcome);
        tracing::info!(
            transaction_id = id,
            quantity_changed = !outcome.changes.is_empty(),
            "Transaction modified"
        );
        Ok(outcome)
    }

    /// Take back an entry's effect by recording a REVERT entry for it.
    /// The original stays in the ledger, flagged as reverted.
    pub async fn revert(&self, id: TransactionId, operator: &str, notes: &str) -> AppResult<StockOutcome> {
        validate_operator(operator).map_err(|e| AppError::validation("operator", e))?;
        validate_notes(notes).map_err(|e| AppError::validation("notes", e))?;

        let mut tx = self.db.begin().await?;

        let original = lock_entry(&mut tx, id).await?;
        let mut stock = LockedStock::lock(&mut tx, &original.movement.keys()).await?;
        let (movement, changes) = revert_effect(&mut stock, &original)?;
        stock.flush(&mut tx).await?;

        let transaction =
            insert_entry(&mut tx, &movement, Utc::now(), operator.trim(), notes, Some(id)).await?;

        sqlx::query("UPDATE transactions SET reverted = TRUE WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let outcome = StockOutcome {
            transaction,
            changes,
        };
        log_clamped(id, &outcome);
        tracing::info!(
            transaction_id = id,
            revert_id = outcome.transaction.id,
            operator = %outcome.transaction.operator,
            "Transaction reverted"
        );
        Ok(outcome)
    }
}

/// Load an entry and hold its row lock until the transaction ends
async fn lock_entry(conn: &mut PgConnection, id: TransactionId) -> AppResult<Transaction> {
    sqlx::query_as::<_, TransactionRow>(&format!("{SELECT_COLUMNS} WHERE id = $1 FOR UPDATE"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .map(Transaction::from)
        .ok_or_else(|| AppError::NotFound(format!("Transaction {}", id)))
}

async fn insert_entry(
    conn: &mut PgConnection,
    movement: &Movement,
    date: DateTime<Utc>,
    operator: &str,
    notes: &str,
    reverts: Option<TransactionId>,
) -> AppResult<Transaction> {
    let warehouse_id = movement
        .warehouse_id()
        .ok_or_else(|| AppError::Internal("movement has no lines".to_string()))?;

    let row = sqlx::query_as::<_, TransactionRow>(
        r#"
        INSERT INTO transactions (
            kind, warehouse_id, related_warehouse_id, movement, quantity,
            date, operator, notes, reverts_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id, movement, date, operator, notes, reverted, created_at
        "#,
    )
    .bind(movement.kind().as_str())
    .bind(warehouse_id)
    .bind(movement.related_warehouse_id())
    .bind(Json(movement))
    .bind(movement.total_quantity())
    .bind(date)
    .bind(operator)
    .bind(notes)
    .bind(reverts)
    .fetch_one(&mut *conn)
    .await?;

    Ok(row.into())
}

/// Every warehouse and category a new movement names must exist
async fn ensure_catalogue(conn: &mut PgConnection, movement: &Movement) -> AppResult<()> {
    let keys = movement.keys();
    let warehouses: BTreeSet<WarehouseId> = keys.iter().map(|k| k.warehouse_id).collect();
    let categories: BTreeSet<CategoryId> = keys.iter().map(|k| k.category_id).collect();

    let found: BTreeSet<i64> = sqlx::query_scalar::<_, i64>("SELECT id FROM warehouses WHERE id = ANY($1)")
        .bind(warehouses.iter().copied().collect::<Vec<_>>())
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .collect();
    if let Some(missing) = warehouses.difference(&found).next() {
        return Err(AppError::NotFound(format!("Warehouse {}", missing)));
    }

    let found: BTreeSet<i64> = sqlx::query_scalar::<_, i64>("SELECT id FROM categories WHERE id = ANY($1)")
        .bind(categories.iter().copied().collect::<Vec<_>>())
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .collect();
    if let Some(missing) = categories.difference(&found).next() {
        return Err(AppError::NotFound(format!("Category {}", missing)));
    }

    Ok(())
}

fn log_clamped(id: TransactionId, outcome: &StockOutcome) {
    for change in outcome.clamped() {
        tracing::warn!(
            transaction_id = id,
            position = %change.key,
            before = change.before,
            discarded = change.clamped,
            "Negative stock averted: quantity clamped at zero"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Specs, StockKey, StockLine};

    #[test]
    fn test_outcome_reports_clamped_changes() {
        let key = StockKey::new(1, 1, Specs::new());
        let outcome = StockOutcome {
            transaction: Transaction {
                id: 1,
                movement: Movement::In {
                    lines: vec![StockLine { key: key.clone(), quantity: 5 }],
                },
                date: Utc::now(),
                operator: "tester".to_string(),
                notes: String::new(),
                reverted: false,
                created_at: Utc::now(),
            },
            changes: vec![
                StockChange { key: key.clone(), before: 3, after: 0, clamped: 2 },
                StockChange { key: StockKey::new(1, 2, Specs::new()), before: 0, after: 4, clamped: 0 },
            ],
        };

        let clamped: Vec<_> = outcome.clamped().collect();
        assert_eq!(clamped.len(), 1);
        assert_eq!(clamped[0].key, key);
    }

    #[test]
    fn test_detail_flattens_transaction() {
        let key = StockKey::new(3, 1, Specs::new().with("size", "L"));
        let detail = TransactionDetail {
            transaction: Transaction {
                id: 7,
                movement: Movement::Out {
                    lines: vec![StockLine { key, quantity: 2 }],
                },
                date: Utc::now(),
                operator: "tester".to_string(),
                notes: String::new(),
                reverted: false,
                created_at: Utc::now(),
            },
            warehouse_name: Some("Main".to_string()),
            related_warehouse_name: None,
            category_names: BTreeMap::from([(3, "T-shirt".to_string())]),
        };

        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["type"], "OUT");
        assert_eq!(json["warehouse_name"], "Main");
        assert_eq!(json["category_names"]["3"], "T-shirt");
    }
}
