//! HTTP handlers for ledger endpoints

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use shared::{
    parse_transaction_date, NewTransaction, Transaction, TransactionFilter, TransactionId,
    TransactionPatch,
};

use crate::error::{AppError, AppResult};
use crate::services::{StockOutcome, TransactionDetail, TransactionService};
use crate::AppState;

/// Query parameters for deleting a transaction
#[derive(Debug, Default, Deserialize)]
pub struct DeleteTransactionQuery {
    pub reason: Option<String>,
}

/// Body for editing a transaction
#[derive(Debug, Default, Deserialize)]
pub struct ModifyTransactionInput {
    pub quantity: Option<i64>,
    pub operator: Option<String>,
    pub notes: Option<String>,
    /// `YYYY-MM-DD` or an ISO 8601 timestamp
    pub date: Option<String>,
}

impl ModifyTransactionInput {
    pub fn into_patch(self) -> AppResult<TransactionPatch> {
        let date = self
            .date
            .as_deref()
            .map(parse_transaction_date)
            .transpose()
            .map_err(|e| AppError::validation("date", e))?;

        Ok(TransactionPatch {
            quantity: self.quantity,
            operator: self.operator,
            notes: self.notes,
            date,
        })
    }
}

/// Body for reverting a transaction
#[derive(Debug, Deserialize)]
pub struct RevertTransactionInput {
    pub operator: String,
    #[serde(default)]
    pub notes: String,
}

fn bad_query(rejection: QueryRejection) -> AppError {
    AppError::ValidationError(rejection.body_text())
}

pub(crate) fn bad_body(rejection: JsonRejection) -> AppError {
    AppError::ValidationError(rejection.body_text())
}

/// List transactions
pub async fn list_transactions(
    State(state): State<AppState>,
    query: Result<Query<TransactionFilter>, QueryRejection>,
) -> AppResult<Json<Vec<Transaction>>> {
    let Query(filter) = query.map_err(bad_query)?;
    let service = TransactionService::new(state.db);
    let transactions = service.list(&filter).await?;
    Ok(Json(transactions))
}

/// Get a transaction with warehouse and category names
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<TransactionId>,
) -> AppResult<Json<TransactionDetail>> {
    let service = TransactionService::new(state.db);
    let detail = service.detail(id).await?;
    Ok(Json(detail))
}

/// Record a transaction
pub async fn record_transaction(
    State(state): State<AppState>,
    body: Result<Json<NewTransaction>, JsonRejection>,
) -> AppResult<(StatusCode, Json<StockOutcome>)> {
    let Json(input) = body.map_err(bad_body)?;
    let service = TransactionService::new(state.db);
    let outcome = service.record(input).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Edit a transaction
pub async fn modify_transaction(
    State(state): State<AppState>,
    Path(id): Path<TransactionId>,
    body: Result<Json<ModifyTransactionInput>, JsonRejection>,
) -> AppResult<Json<StockOutcome>> {
    let Json(input) = body.map_err(bad_body)?;
    let patch = input.into_patch()?;
    let service = TransactionService::new(state.db);
    let outcome = service.modify(id, &patch).await?;
    Ok(Json(outcome))
}

/// Delete a transaction and undo its effect
pub async fn delete_transaction(
    State(state): State<AppState>,
    Path(id): Path<TransactionId>,
    query: Result<Query<DeleteTransactionQuery>, QueryRejection>,
) -> AppResult<Json<StockOutcome>> {
    let Query(query) = query.map_err(bad_query)?;
    let service = TransactionService::new(state.db);
    let outcome = service.delete(id, query.reason.as_deref()).await?;
    Ok(Json(outcome))
}

/// Revert a transaction
pub async fn revert_transaction(
    State(state): State<AppState>,
    Path(id): Path<TransactionId>,
    body: Result<Json<RevertTransactionInput>, JsonRejection>,
) -> AppResult<(StatusCode, Json<StockOutcome>)> {
    let Json(input) = body.map_err(bad_body)?;
    let service = TransactionService::new(state.db);
    let outcome = service.revert(id, &input.operator, &input.notes).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}
