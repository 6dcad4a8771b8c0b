//! Row-locked view of item quantities for one database transaction

use std::collections::{BTreeMap, BTreeSet};

use shared::{ItemId, StockKey, StockLevels};
use sqlx::{types::Json, FromRow, PgConnection};

use crate::error::AppResult;

#[derive(Debug, FromRow)]
struct LockedItemRow {
    id: ItemId,
    quantity: i64,
}

#[derive(Debug)]
struct LockedItem {
    id: ItemId,
    loaded: i64,
    quantity: i64,
}

/// Item rows locked `FOR UPDATE` for the lifetime of the surrounding
/// transaction.
///
/// Positions with no item row are simply absent; the ledger engine reports
/// them as unknown stock.
#[derive(Debug, Default)]
pub struct LockedStock {
    items: BTreeMap<StockKey, LockedItem>,
}

impl LockedStock {
    /// Lock the item rows behind `keys`.
    ///
    /// Rows are locked in `StockKey` order so two writers touching
    /// overlapping positions cannot deadlock.
    pub async fn lock(conn: &mut PgConnection, keys: &BTreeSet<StockKey>) -> AppResult<Self> {
        let mut items = BTreeMap::new();

        for key in keys {
            let row = sqlx::query_as::<_, LockedItemRow>(
                r#"
                SELECT id, quantity
                FROM items
                WHERE warehouse_id = $1 AND category_id = $2 AND specs = $3
                FOR UPDATE
                "#,
            )
            .bind(key.warehouse_id)
            .bind(key.category_id)
            .bind(Json(&key.specs))
            .fetch_optional(&mut *conn)
            .await?;

            if let Some(row) = row {
                items.insert(
                    key.clone(),
                    LockedItem {
                        id: row.id,
                        loaded: row.quantity,
                        quantity: row.quantity,
                    },
                );
            }
        }

        tracing::debug!(requested = keys.len(), locked = items.len(), "Locked stock rows");
        Ok(Self { items })
    }

    /// Create zero-quantity item rows for positions that do not exist yet
    pub async fn ensure_items(conn: &mut PgConnection, keys: &BTreeSet<StockKey>) -> AppResult<()> {
        for key in keys {
            sqlx::query(
                r#"
                INSERT INTO items (warehouse_id, category_id, specs, quantity)
                VALUES ($1, $2, $3, 0)
                ON CONFLICT (warehouse_id, category_id, specs) DO NOTHING
                "#,
            )
            .bind(key.warehouse_id)
            .bind(key.category_id)
            .bind(Json(&key.specs))
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    /// Write back every quantity that differs from what was loaded
    pub async fn flush(&self, conn: &mut PgConnection) -> AppResult<usize> {
        let mut written = 0;
        for (key, item) in &self.items {
            if item.quantity == item.loaded {
                continue;
            }
            sqlx::query("UPDATE items SET quantity = $1, updated_at = NOW() WHERE id = $2")
                .bind(item.quantity)
                .bind(item.id)
                .execute(&mut *conn)
                .await?;
            tracing::debug!(item_id = item.id, %key, from = item.loaded, to = item.quantity, "Stock updated");
            written += 1;
        }
        Ok(written)
    }
}

impl StockLevels for LockedStock {
    fn on_hand(&self, key: &StockKey) -> Option<i64> {
        self.items.get(key).map(|item| item.quantity)
    }

    fn set_on_hand(&mut self, key: &StockKey, quantity: i64) {
        if let Some(item) = self.items.get_mut(key) {
            item.quantity = quantity;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{apply, NegativeStock, Specs, StockStep};

    fn locked(entries: &[(StockKey, i64)]) -> LockedStock {
        let items = entries
            .iter()
            .enumerate()
            .map(|(i, (key, quantity))| {
                (
                    key.clone(),
                    LockedItem {
                        id: i as ItemId + 1,
                        loaded: *quantity,
                        quantity: *quantity,
                    },
                )
            })
            .collect();
        LockedStock { items }
    }

    #[test]
    fn test_engine_runs_against_locked_rows() {
        let a = StockKey::new(1, 1, Specs::new());
        let b = StockKey::new(1, 2, Specs::new());
        let mut stock = locked(&[(a.clone(), 20), (b.clone(), 5)]);

        let steps = [StockStep::new(a.clone(), -15), StockStep::new(b.clone(), 15)];
        apply(&mut stock, &steps, NegativeStock::Reject).unwrap();

        assert_eq!(stock.on_hand(&a), Some(5));
        assert_eq!(stock.on_hand(&b), Some(20));
        assert_eq!(stock.items[&a].loaded, 20);
    }

    #[test]
    fn test_missing_row_is_unknown() {
        let stock = locked(&[]);
        assert_eq!(stock.on_hand(&StockKey::new(1, 1, Specs::new())), None);
    }
}
