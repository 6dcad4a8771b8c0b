//! Route definitions for LiteWMS

use axum::{
    routing::{get, post},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/warehouses", warehouse_routes())
        .nest("/categories", category_routes())
        .nest("/items", item_routes())
        .nest("/transactions", transaction_routes())
}

fn warehouse_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_warehouses).post(handlers::create_warehouse))
        .route(
            "/:id",
            get(handlers::get_warehouse)
                .put(handlers::update_warehouse)
                .delete(handlers::delete_warehouse),
        )
}

fn category_routes() -> Router<AppState> {
    Router::new().route("/", get(handlers::list_categories).post(handlers::create_category))
}

fn item_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_items).post(handlers::create_item))
        .route("/with-category", get(handlers::list_items_with_category))
        .route(
            "/:id",
            get(handlers::get_item)
                .put(handlers::update_item)
                .delete(handlers::delete_item),
        )
}

/// Ledger routes
fn transaction_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_transactions).post(handlers::record_transaction),
        )
        .route(
            "/:id",
            get(handlers::get_transaction)
                .patch(handlers::modify_transaction)
                .delete(handlers::delete_transaction),
        )
        .route("/:id/revert", post(handlers::revert_transaction))
}
