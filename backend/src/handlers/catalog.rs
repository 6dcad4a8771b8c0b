//! HTTP handlers for warehouse, category and item endpoints

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::{ItemId, WarehouseId};

use crate::error::AppResult;
use crate::services::catalog::{
    Category, CreateCategoryInput, CreateItemInput, CreateWarehouseInput, Item, ItemFilter,
    ItemWithCategory, UpdateItemInput, UpdateWarehouseInput, Warehouse,
};
use super::transactions::bad_body;
use crate::services::CatalogService;
use crate::AppState;

/// List warehouses
pub async fn list_warehouses(State(state): State<AppState>) -> AppResult<Json<Vec<Warehouse>>> {
    let service = CatalogService::new(state.db);
    let warehouses = service.list_warehouses().await?;
    Ok(Json(warehouses))
}

/// Get a warehouse
pub async fn get_warehouse(
    State(state): State<AppState>,
    Path(id): Path<WarehouseId>,
) -> AppResult<Json<Warehouse>> {
    let service = CatalogService::new(state.db);
    let warehouse = service.get_warehouse(id).await?;
    Ok(Json(warehouse))
}

/// Create a warehouse
pub async fn create_warehouse(
    State(state): State<AppState>,
    Json(input): Json<CreateWarehouseInput>,
) -> AppResult<(StatusCode, Json<Warehouse>)> {
    let service = CatalogService::new(state.db);
    let warehouse = service.create_warehouse(input).await?;
    Ok((StatusCode::CREATED, Json(warehouse)))
}

/// Rename a warehouse
pub async fn update_warehouse(
    State(state): State<AppState>,
    Path(id): Path<WarehouseId>,
    Json(input): Json<UpdateWarehouseInput>,
) -> AppResult<Json<Warehouse>> {
    let service = CatalogService::new(state.db);
    let warehouse = service.update_warehouse(id, input).await?;
    Ok(Json(warehouse))
}

/// Delete an empty warehouse
pub async fn delete_warehouse(
    State(state): State<AppState>,
    Path(id): Path<WarehouseId>,
) -> AppResult<StatusCode> {
    let service = CatalogService::new(state.db);
    service.delete_warehouse(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// List categories
pub async fn list_categories(State(state): State<AppState>) -> AppResult<Json<Vec<Category>>> {
    let service = CatalogService::new(state.db);
    let categories = service.list_categories().await?;
    Ok(Json(categories))
}

/// Create a category
pub async fn create_category(
    State(state): State<AppState>,
    Json(input): Json<CreateCategoryInput>,
) -> AppResult<(StatusCode, Json<Category>)> {
    let service = CatalogService::new(state.db);
    let category = service.create_category(input).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// List items, optionally by warehouse and category
pub async fn list_items(
    State(state): State<AppState>,
    Query(filter): Query<ItemFilter>,
) -> AppResult<Json<Vec<Item>>> {
    let service = CatalogService::new(state.db);
    let items = service.list_items(&filter).await?;
    Ok(Json(items))
}

/// List items with their category names
pub async fn list_items_with_category(
    State(state): State<AppState>,
    Query(filter): Query<ItemFilter>,
) -> AppResult<Json<Vec<ItemWithCategory>>> {
    let service = CatalogService::new(state.db);
    let items = service.list_items_with_category(&filter).await?;
    Ok(Json(items))
}

/// Get an item
pub async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<ItemId>,
) -> AppResult<Json<Item>> {
    let service = CatalogService::new(state.db);
    let item = service.get_item(id).await?;
    Ok(Json(item))
}

/// Create an item or add to an existing one
pub async fn create_item(
    State(state): State<AppState>,
    Json(input): Json<CreateItemInput>,
) -> AppResult<Json<Item>> {
    let service = CatalogService::new(state.db);
    let item = service.create_item(input).await?;
    Ok(Json(item))
}

/// Change the specs of an item
pub async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<ItemId>,
    body: Result<Json<UpdateItemInput>, JsonRejection>,
) -> AppResult<Json<Item>> {
    let Json(input) = body.map_err(bad_body)?;
    let service = CatalogService::new(state.db);
    let item = service.update_item(id, input).await?;
    Ok(Json(item))
}

/// Delete an item no ledger entry refers to
pub async fn delete_item(
    State(state): State<AppState>,
    Path(id): Path<ItemId>,
) -> AppResult<StatusCode> {
    let service = CatalogService::new(state.db);
    service.delete_item(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
