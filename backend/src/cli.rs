//! Command line surface of `litewms-admin`: argument parsing, confirmation
//! prompts and plain-text rendering of ledger entries

use std::fmt;
use std::io::{self, BufRead, Write};

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use shared::{
    parse_transaction_date, Movement, StockChange, Transaction, TransactionFilter, TransactionId,
    TransactionKind, TransactionPatch, WarehouseId,
};
use thiserror::Error;

use crate::error::AppError;
use crate::services::TransactionDetail;

/// Log filter used with `--verbose`
pub const VERBOSE_FILTER: &str = "litewms_admin=debug,litewms_backend=debug,sqlx=info";

const NOTES_WIDTH: usize = 30;

#[derive(Debug, Parser)]
#[command(name = "litewms-admin")]
#[command(about = "Inspect, correct and reverse LiteWMS ledger entries")]
#[command(version)]
pub struct Cli {
    /// Verbose log output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Skip the confirmation prompt
    #[arg(short, long, global = true)]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show one transaction in full
    Show { id: TransactionId },

    /// List recent transactions
    List {
        /// Only entries from or to this warehouse
        #[arg(short, long)]
        warehouse: Option<WarehouseId>,

        /// IN, OUT, ADJUST, TRANSFER or REVERT
        #[arg(short = 't', long = "type")]
        kind: Option<TransactionKind>,

        /// Only entries dated on this day (YYYY-MM-DD)
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Number of entries to show (default from config, 20)
        #[arg(short, long)]
        limit: Option<i64>,
    },

    /// Delete a transaction and undo its stock effect
    Delete {
        id: TransactionId,

        /// Reason, written to the log
        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Edit a transaction; a new quantity moves stock by the difference
    Modify {
        id: TransactionId,

        /// New quantity (signed delta for ADJUST)
        #[arg(short, long, allow_negative_numbers = true)]
        quantity: Option<i64>,

        /// New operator
        #[arg(short, long)]
        user: Option<String>,

        /// New notes
        #[arg(short, long)]
        notes: Option<String>,

        /// New date, YYYY-MM-DD or an ISO 8601 timestamp
        #[arg(short, long)]
        date: Option<String>,
    },

    /// Take back a transaction's effect with a REVERT entry
    Revert {
        id: TransactionId,

        /// Operator recording the revert
        #[arg(short, long)]
        user: String,

        /// Notes for the REVERT entry
        #[arg(short, long, default_value = "")]
        notes: String,
    },
}

/// The operator declined the confirmation prompt
#[derive(Debug, Error)]
#[error("Operation cancelled")]
pub struct Cancelled;

/// Build the filter for `list`
pub fn list_filter(
    warehouse: Option<WarehouseId>,
    kind: Option<TransactionKind>,
    date: Option<NaiveDate>,
    limit: i64,
) -> TransactionFilter {
    TransactionFilter {
        warehouse_id: warehouse,
        kind,
        date,
        ..TransactionFilter::default()
    }
    .with_limit(limit)
}

/// Build the patch for `modify`
pub fn modify_patch(
    quantity: Option<i64>,
    user: Option<String>,
    notes: Option<String>,
    date: Option<&str>,
) -> Result<TransactionPatch, AppError> {
    let date = date
        .map(parse_transaction_date)
        .transpose()
        .map_err(|e| AppError::validation("date", e))?;

    let patch = TransactionPatch {
        quantity,
        operator: user,
        notes,
        date,
    };
    if patch.is_empty() {
        return Err(AppError::ValidationError(
            "Nothing to modify: pass --quantity, --user, --notes or --date".to_string(),
        ));
    }
    Ok(patch)
}

/// Ask `question` and read one line; only `yes` confirms
pub fn confirm<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> io::Result<bool> {
    write!(output, "{} Type 'yes' to continue: ", question)?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(answer.trim() == "yes")
}

/// Message for a failed command. Storage and internal failures get the
/// full error chain.
pub fn describe_error(err: &anyhow::Error) -> String {
    if err.downcast_ref::<Cancelled>().is_some() {
        return err.to_string();
    }
    match err.downcast_ref::<AppError>() {
        Some(app) if !app.is_unexpected() => app.to_string(),
        _ => format!("{:?}", err),
    }
}

/// Process exit code for a failed command
pub fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<AppError>() {
        Some(app) if app.is_unexpected() => 2,
        Some(_) => 1,
        None if err.downcast_ref::<Cancelled>().is_some() => 1,
        None => 2,
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(width.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}

fn describe_lines(movement: &Movement) -> Vec<String> {
    match movement {
        Movement::In { lines } | Movement::Out { lines } => lines
            .iter()
            .map(|l| format!("{}  quantity {}", l.key, l.quantity))
            .collect(),
        Movement::Adjust { lines } => lines
            .iter()
            .map(|l| format!("{}  delta {:+}", l.key, l.delta))
            .collect(),
        Movement::Transfer { lines } => lines
            .iter()
            .map(|l| format!("{} -> warehouse {}  quantity {}", l.from, l.to.warehouse_id, l.quantity))
            .collect(),
        Movement::Revert { reverts, undone } => {
            let mut described = vec![format!("reverts transaction {} ({})", reverts, undone.kind())];
            described.extend(describe_lines(undone).into_iter().map(|l| format!("  {}", l)));
            described
        }
    }
}

/// Full view of one entry, as printed by `show` and before mutations
pub fn render_detail(detail: &TransactionDetail) -> String {
    DetailView(detail).to_string()
}

/// Table of entries, as printed by `list`
pub fn render_list(transactions: &[Transaction]) -> String {
    ListView(transactions).to_string()
}

/// Per-position stock changes of a committed operation
pub fn render_changes(changes: &[StockChange]) -> String {
    ChangesView(changes).to_string()
}

struct DetailView<'a>(&'a TransactionDetail);

impl fmt::Display for DetailView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let detail = self.0;
        let t = &detail.transaction;
        let rule = "=".repeat(60);

        writeln!(f, "{}", rule)?;
        writeln!(f, "Transaction {}", t.id)?;
        writeln!(f, "{}", rule)?;
        writeln!(f, "Type:      {}", t.kind())?;
        writeln!(f, "Date:      {}", t.date.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(f, "Operator:  {}", t.operator)?;
        writeln!(f, "Notes:     {}", t.notes)?;
        if let Some(id) = t.movement.warehouse_id() {
            let name = detail.warehouse_name.as_deref().unwrap_or("unknown");
            writeln!(f, "Warehouse: {} (ID: {})", name, id)?;
        }
        if let Some(id) = t.movement.related_warehouse_id() {
            let name = detail.related_warehouse_name.as_deref().unwrap_or("unknown");
            writeln!(f, "To:        {} (ID: {})", name, id)?;
        }
        writeln!(f, "Quantity:  {}", t.movement.total_quantity())?;
        writeln!(f, "Reverted:  {}", if t.reverted { "yes" } else { "no" })?;
        writeln!(f, "Lines:")?;
        for (idx, line) in describe_lines(&t.movement).iter().enumerate() {
            writeln!(f, "  {}. {}", idx + 1, line)?;
        }
        if !detail.category_names.is_empty() {
            let names: Vec<String> = detail
                .category_names
                .iter()
                .map(|(id, name)| format!("{} = {}", id, name))
                .collect();
            writeln!(f, "Categories: {}", names.join(", "))?;
        }
        writeln!(f, "{}", rule)
    }
}

struct ListView<'a>(&'a [Transaction]);

impl fmt::Display for ListView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(90);

        writeln!(f, "{}", rule)?;
        writeln!(f, "Transactions (showing {})", self.0.len())?;
        writeln!(f, "{}", rule)?;
        writeln!(
            f,
            "{:<6} {:<9} {:<12} {:>8}  {:<15} {:<3} {:<30}",
            "ID", "TYPE", "DATE", "QTY", "OPERATOR", "R", "NOTES"
        )?;
        writeln!(f, "{}", "-".repeat(90))?;
        for t in self.0 {
            writeln!(
                f,
                "{:<6} {:<9} {:<12} {:>8}  {:<15} {:<3} {:<30}",
                t.id,
                t.kind().as_str(),
                t.date.format("%Y-%m-%d").to_string(),
                t.movement.total_quantity(),
                truncate(&t.operator, 15),
                if t.reverted { "*" } else { "" },
                truncate(&t.notes, NOTES_WIDTH),
            )?;
        }
        writeln!(f, "{}", rule)
    }
}

struct ChangesView<'a>(&'a [StockChange]);

impl fmt::Display for ChangesView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for change in self.0 {
            write!(f, "  {}: {} -> {}", change.key, change.before, change.after)?;
            if change.was_clamped() {
                write!(f, " (clamped at zero, {} discarded)", change.clamped)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("仓库仓库仓库仓库", 5), "仓库...");
    }

    #[test]
    fn test_describe_error_hides_chain_for_refusals() {
        let err = anyhow::Error::from(AppError::AlreadyReverted(4));
        assert!(describe_error(&err).starts_with("Transaction 4 has already been reverted"));
        assert_eq!(exit_code(&err), 1);
    }

    #[test]
    fn test_describe_error_shows_chain_for_storage_failures() {
        let err = anyhow::Error::from(AppError::from(sqlx::Error::PoolTimedOut))
            .context("Could not delete transaction 4");
        let message = describe_error(&err);
        assert!(message.contains("Could not delete transaction 4"));
        assert!(message.contains("Caused by"));
        assert_eq!(exit_code(&err), 2);
    }

    #[test]
    fn test_configuration_failure_exits_with_two() {
        let err = anyhow::Error::from(AppError::Configuration("database.url is empty".to_string()));
        assert!(describe_error(&err).contains("database.url is empty"));
        assert_eq!(exit_code(&err), 2);
    }
}
