//! Catalogue service: warehouses, categories and item rows

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{validate_name, CategoryId, ItemId, Movement, Specs, StockKey, WarehouseId};
use sqlx::{types::Json, FromRow, PgConnection, PgPool};

use crate::error::{AppError, AppResult};

/// Catalogue service for warehouses, categories and stock rows
#[derive(Clone)]
pub struct CatalogService {
    db: PgPool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Warehouse {
    pub id: WarehouseId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateWarehouseInput {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateWarehouseInput {
    pub name: String,
}

/// A variant attribute a category offers, e.g. size with S/M/L
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    pub name: String,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub attributes: Json<Vec<AttributeDefinition>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCategoryInput {
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<AttributeDefinition>,
}

/// Stock row for one (warehouse, category, specs) position
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Item {
    pub id: ItemId,
    pub warehouse_id: WarehouseId,
    pub category_id: CategoryId,
    pub specs: Json<Specs>,
    pub quantity: i64,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    pub fn key(&self) -> StockKey {
        StockKey::new(self.category_id, self.warehouse_id, self.specs.0.clone())
    }
}

/// Item row with its category name, for listings
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ItemWithCategory {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub item: Item,
    pub category_name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ItemFilter {
    pub warehouse_id: Option<WarehouseId>,
    pub category_id: Option<CategoryId>,
}

#[derive(Debug, Deserialize)]
pub struct CreateItemInput {
    pub warehouse_id: WarehouseId,
    pub category_id: CategoryId,
    #[serde(default)]
    pub specs: Specs,
    #[serde(default)]
    pub quantity: i64,
}

/// Only the variant of an item can be edited; quantities move through
/// ledger entries
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateItemInput {
    pub specs: Specs,
}

const ITEM_COLUMNS: &str = "id, warehouse_id, category_id, specs, quantity, updated_at";

impl CatalogService {
    /// Create a new CatalogService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_warehouses(&self) -> AppResult<Vec<Warehouse>> {
        let warehouses = sqlx::query_as::<_, Warehouse>(
            "SELECT id, name, created_at FROM warehouses ORDER BY id",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(warehouses)
    }

    pub async fn get_warehouse(&self, id: WarehouseId) -> AppResult<Warehouse> {
        sqlx::query_as::<_, Warehouse>("SELECT id, name, created_at FROM warehouses WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Warehouse {}", id)))
    }

    pub async fn create_warehouse(&self, input: CreateWarehouseInput) -> AppResult<Warehouse> {
        validate_name(&input.name).map_err(|e| AppError::validation("name", e))?;

        let warehouse = sqlx::query_as::<_, Warehouse>(
            "INSERT INTO warehouses (name) VALUES ($1) RETURNING id, name, created_at",
        )
        .bind(input.name.trim())
        .fetch_one(&self.db)
        .await?;

        tracing::info!(warehouse_id = warehouse.id, name = %warehouse.name, "Warehouse created");
        Ok(warehouse)
    }

    pub async fn update_warehouse(
        &self,
        id: WarehouseId,
        input: UpdateWarehouseInput,
    ) -> AppResult<Warehouse> {
        validate_name(&input.name).map_err(|e| AppError::validation("name", e))?;

        let warehouse = sqlx::query_as::<_, Warehouse>(
            "UPDATE warehouses SET name = $2 WHERE id = $1 RETURNING id, name, created_at",
        )
        .bind(id)
        .bind(input.name.trim())
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Warehouse {}", id)))?;

        tracing::info!(warehouse_id = id, name = %warehouse.name, "Warehouse renamed");
        Ok(warehouse)
    }

    /// Delete an empty warehouse. Warehouses that still hold item rows or
    /// appear in the ledger are refused.
    pub async fn delete_warehouse(&self, id: WarehouseId) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        sqlx::query_scalar::<_, i64>("SELECT id FROM warehouses WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Warehouse {}", id)))?;

        let items = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM items WHERE warehouse_id = $1")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        if items > 0 {
            return Err(AppError::Conflict(format!(
                "Warehouse {} still holds {} items",
                id, items
            )));
        }

        let entries = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM transactions WHERE warehouse_id = $1 OR related_warehouse_id = $1",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if entries > 0 {
            return Err(AppError::Conflict(format!(
                "Warehouse {} is referenced by {} ledger entries",
                id, entries
            )));
        }

        sqlx::query("DELETE FROM warehouses WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(warehouse_id = id, "Warehouse deleted");
        Ok(())
    }

    pub async fn list_categories(&self) -> AppResult<Vec<Category>> {
        let categories = sqlx::query_as::<_, Category>(
            "SELECT id, name, attributes, created_at FROM categories ORDER BY id",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(categories)
    }

    pub async fn create_category(&self, input: CreateCategoryInput) -> AppResult<Category> {
        validate_name(&input.name).map_err(|e| AppError::validation("name", e))?;
        for attribute in &input.attributes {
            validate_name(&attribute.name).map_err(|e| AppError::validation("attributes", e))?;
        }

        let category = sqlx::query_as::<_, Category>(
            r#"
            INSERT INTO categories (name, attributes)
            VALUES ($1, $2)
            RETURNING id, name, attributes, created_at
            "#,
        )
        .bind(input.name.trim())
        .bind(Json(&input.attributes))
        .fetch_one(&self.db)
        .await?;

        tracing::info!(category_id = category.id, name = %category.name, "Category created");
        Ok(category)
    }

    pub async fn list_items(&self, filter: &ItemFilter) -> AppResult<Vec<Item>> {
        let items = sqlx::query_as::<_, Item>(
            r#"
            SELECT id, warehouse_id, category_id, specs, quantity, updated_at
            FROM items
            WHERE ($1::BIGINT IS NULL OR warehouse_id = $1)
              AND ($2::BIGINT IS NULL OR category_id = $2)
            ORDER BY warehouse_id, category_id, id
            "#,
        )
        .bind(filter.warehouse_id)
        .bind(filter.category_id)
        .fetch_all(&self.db)
        .await?;
        Ok(items)
    }

    pub async fn list_items_with_category(
        &self,
        filter: &ItemFilter,
    ) -> AppResult<Vec<ItemWithCategory>> {
        let items = sqlx::query_as::<_, ItemWithCategory>(
            r#"
            SELECT i.id, i.warehouse_id, i.category_id, i.specs, i.quantity, i.updated_at,
                   c.name AS category_name
            FROM items i
            JOIN categories c ON c.id = i.category_id
            WHERE ($1::BIGINT IS NULL OR i.warehouse_id = $1)
              AND ($2::BIGINT IS NULL OR i.category_id = $2)
            ORDER BY i.warehouse_id, i.category_id, i.id
            "#,
        )
        .bind(filter.warehouse_id)
        .bind(filter.category_id)
        .fetch_all(&self.db)
        .await?;
        Ok(items)
    }

    pub async fn get_item(&self, id: ItemId) -> AppResult<Item> {
        sqlx::query_as::<_, Item>(
            "SELECT id, warehouse_id, category_id, specs, quantity, updated_at FROM items WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Item {}", id)))
    }

    /// Create a stock row, or add to the quantity of the row that already
    /// holds this position
    pub async fn create_item(&self, input: CreateItemInput) -> AppResult<Item> {
        if input.quantity < 0 {
            return Err(AppError::validation("quantity", "Quantity cannot be negative"));
        }
        self.get_warehouse(input.warehouse_id).await?;

        let category_exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM categories WHERE id = $1)")
                .bind(input.category_id)
                .fetch_one(&self.db)
                .await?;
        if !category_exists {
            return Err(AppError::NotFound(format!("Category {}", input.category_id)));
        }

        let item = sqlx::query_as::<_, Item>(
            r#"
            INSERT INTO items (warehouse_id, category_id, specs, quantity)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (warehouse_id, category_id, specs)
            DO UPDATE SET quantity = items.quantity + EXCLUDED.quantity, updated_at = NOW()
            RETURNING id, warehouse_id, category_id, specs, quantity, updated_at
            "#,
        )
        .bind(input.warehouse_id)
        .bind(input.category_id)
        .bind(Json(&input.specs))
        .bind(input.quantity)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(
            item_id = item.id,
            warehouse_id = item.warehouse_id,
            category_id = item.category_id,
            quantity = item.quantity,
            "Item stocked"
        );
        Ok(item)
    }

    /// Change the specs of an item no ledger entry refers to
    pub async fn update_item(&self, id: ItemId, input: UpdateItemInput) -> AppResult<Item> {
        let mut tx = self.db.begin().await?;

        let item = lock_item(&mut tx, id).await?;
        if item.specs.0 == input.specs {
            return Ok(item);
        }
        let entries = ledger_references(&mut tx, &item.key()).await?;
        if entries > 0 {
            return Err(AppError::Conflict(format!(
                "Item {} is referenced by {} ledger entries; its specs cannot change",
                id, entries
            )));
        }

        let taken = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM items
                WHERE warehouse_id = $1 AND category_id = $2 AND specs = $3 AND id <> $4
            )
            "#,
        )
        .bind(item.warehouse_id)
        .bind(item.category_id)
        .bind(Json(&input.specs))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if taken {
            return Err(AppError::Conflict(format!(
                "Another item in warehouse {} already has these specs",
                item.warehouse_id
            )));
        }

        let updated = sqlx::query_as::<_, Item>(&format!(
            "UPDATE items SET specs = $2, updated_at = NOW() WHERE id = $1 RETURNING {ITEM_COLUMNS}"
        ))
        .bind(id)
        .bind(Json(&input.specs))
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!(item_id = id, specs = %updated.specs.0, "Item specs changed");
        Ok(updated)
    }

    /// Delete an item row no ledger entry refers to
    pub async fn delete_item(&self, id: ItemId) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        let item = lock_item(&mut tx, id).await?;
        let entries = ledger_references(&mut tx, &item.key()).await?;
        if entries > 0 {
            return Err(AppError::Conflict(format!(
                "Item {} is referenced by {} ledger entries; delete or revert them first",
                id, entries
            )));
        }

        sqlx::query("DELETE FROM items WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(
            item_id = id,
            warehouse_id = item.warehouse_id,
            category_id = item.category_id,
            quantity = item.quantity,
            "Item deleted"
        );
        Ok(())
    }
}

/// Lock an item row. Ledger writes lock the same row, so no entry can start
/// referring to it until the caller commits.
async fn lock_item(conn: &mut PgConnection, id: ItemId) -> AppResult<Item> {
    sqlx::query_as::<_, Item>(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = $1 FOR UPDATE"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Item {}", id)))
}

/// Number of ledger entries whose movement touches `key`
async fn ledger_references(conn: &mut PgConnection, key: &StockKey) -> AppResult<usize> {
    let movements: Vec<Movement> = sqlx::query_scalar::<_, Json<Movement>>(
        "SELECT movement FROM transactions WHERE warehouse_id = $1 OR related_warehouse_id = $1",
    )
    .bind(key.warehouse_id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|movement| movement.0)
    .collect();

    Ok(count_touching(&movements, key))
}

fn count_touching(movements: &[Movement], key: &StockKey) -> usize {
    movements.iter().filter(|m| m.keys().contains(key)).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_item_input_defaults() {
        let input: CreateItemInput =
            serde_json::from_str(r#"{"warehouse_id": 1, "category_id": 2}"#).unwrap();
        assert!(input.specs.is_empty());
        assert_eq!(input.quantity, 0);
    }

    #[test]
    fn test_category_attributes_parse() {
        let input: CreateCategoryInput = serde_json::from_str(
            r#"{"name": "T-shirt", "attributes": [{"name": "size", "options": ["S", "M"]}]}"#,
        )
        .unwrap();
        assert_eq!(input.attributes[0].options, vec!["S", "M"]);
    }

    #[test]
    fn test_item_update_rejects_quantity() {
        let input: UpdateItemInput = serde_json::from_str(r#"{"specs": {"size": "XL"}}"#).unwrap();
        assert_eq!(input.specs, Specs::new().with("size", "XL"));

        assert!(serde_json::from_str::<UpdateItemInput>(r#"{"specs": {}, "quantity": 4}"#).is_err());
    }

    #[test]
    fn test_count_touching_sees_transfer_destinations_and_reverts() {
        use shared::{StockLine, TransferLine};

        let shirt = StockKey::new(1, 2, Specs::new().with("size", "L"));
        let other = StockKey::new(1, 2, Specs::new().with("size", "M"));
        let transfer = Movement::Transfer {
            lines: vec![TransferLine { from: shirt.in_warehouse(1), to: shirt.clone(), quantity: 3 }],
        };
        let inbound = Movement::In {
            lines: vec![StockLine { key: other.clone(), quantity: 5 }],
        };
        let movements = vec![transfer.clone(), inbound, Movement::revert_of(1, &transfer)];

        assert_eq!(count_touching(&movements, &shirt), 2);
        assert_eq!(count_touching(&movements, &other), 1);
        assert_eq!(count_touching(&movements, &shirt.in_warehouse(3)), 0);
    }
}
