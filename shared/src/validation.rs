//! Validation utilities for LiteWMS ledger input

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::models::{Movement, NewTransaction, TransactionKind};

pub const MAX_NAME_LENGTH: usize = 100;
pub const MAX_NOTES_LENGTH: usize = 1000;
/// Largest quantity, or ADJUST delta magnitude, a single line may carry
pub const MAX_QUANTITY: i64 = 1_000_000_000_000;
pub const MAX_LINES: usize = 500;

// ============================================================================
// Movement Validations
// ============================================================================

/// Validate a single-line quantity for a movement of the given base type
pub fn validate_quantity(kind: TransactionKind, quantity: i64) -> Result<(), &'static str> {
    match kind {
        TransactionKind::Adjust if quantity == 0 => Err("Adjustment delta must be non-zero"),
        _ if kind != TransactionKind::Adjust && quantity <= 0 => Err("Quantity must be positive"),
        _ if quantity.unsigned_abs() > MAX_QUANTITY.unsigned_abs() => Err("Quantity is too large"),
        _ => Ok(()),
    }
}

/// Validate the shape of a movement before it is recorded
pub fn validate_movement(movement: &Movement) -> Result<(), &'static str> {
    if movement.line_count() == 0 {
        return Err("A transaction needs at least one line");
    }
    if movement.line_count() > MAX_LINES {
        return Err("Too many lines in one transaction");
    }

    match movement {
        Movement::In { lines } | Movement::Out { lines } => {
            for line in lines {
                validate_quantity(movement.kind(), line.quantity)?;
            }
            single_warehouse(lines.iter().map(|l| l.key.warehouse_id))
        }
        Movement::Adjust { lines } => {
            for line in lines {
                validate_quantity(TransactionKind::Adjust, line.delta)?;
            }
            single_warehouse(lines.iter().map(|l| l.key.warehouse_id))
        }
        Movement::Transfer { lines } => {
            for line in lines {
                validate_quantity(TransactionKind::Transfer, line.quantity)?;
                if !line.from.same_item(&line.to) {
                    return Err("Transfer lines must move the same item and variant");
                }
                if line.from.warehouse_id == line.to.warehouse_id {
                    return Err("Transfer source and destination must differ");
                }
            }
            single_warehouse(lines.iter().map(|l| l.from.warehouse_id))?;
            single_warehouse(lines.iter().map(|l| l.to.warehouse_id))
        }
        Movement::Revert { .. } => Err("Revert entries are created by reverting a transaction"),
    }
}

fn single_warehouse(ids: impl Iterator<Item = i64>) -> Result<(), &'static str> {
    let distinct: BTreeSet<i64> = ids.collect();
    if distinct.len() > 1 {
        return Err("All lines must belong to the same warehouse");
    }
    Ok(())
}

/// Validate input for recording a transaction
pub fn validate_new_transaction(input: &NewTransaction) -> Result<(), &'static str> {
    validate_movement(&input.movement)?;
    validate_operator(&input.operator)?;
    validate_notes(&input.notes)
}

// ============================================================================
// General Validations
// ============================================================================

/// Validate operator name (who performed the movement)
pub fn validate_operator(operator: &str) -> Result<(), &'static str> {
    let trimmed = operator.trim();
    if trimmed.is_empty() {
        return Err("Operator cannot be empty");
    }
    if trimmed.chars().count() > MAX_NAME_LENGTH {
        return Err("Operator name is too long");
    }
    Ok(())
}

pub fn validate_notes(notes: &str) -> Result<(), &'static str> {
    if notes.chars().count() > MAX_NOTES_LENGTH {
        return Err("Notes are too long");
    }
    Ok(())
}

/// Validate warehouse or category name
pub fn validate_name(name: &str) -> Result<(), &'static str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("Name cannot be empty");
    }
    if trimmed.chars().count() > MAX_NAME_LENGTH {
        return Err("Name is too long");
    }
    Ok(())
}

/// Parse a transaction date given as `YYYY-MM-DD`, a naive
/// `YYYY-MM-DDTHH:MM:SS` (taken as UTC) or RFC 3339
pub fn parse_transaction_date(input: &str) -> Result<DateTime<Utc>, &'static str> {
    let input = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S") {
        return Ok(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    Err("Date must be YYYY-MM-DD or an ISO 8601 timestamp")
}
