//! LiteWMS - ledger administration tool
//!
//! Show, list, delete, modify and revert transactions directly against the
//! database. Every mutation keeps item quantities in step with the ledger.

use std::io;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use litewms_backend::cli::{
    confirm, describe_error, exit_code, list_filter, modify_patch, render_changes, render_detail,
    render_list, Cancelled, Cli, Command, VERBOSE_FILTER,
};
use litewms_backend::services::{StockOutcome, TransactionService};
use litewms_backend::{db, init_tracing, AppError, Config};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match Config::load().map_err(AppError::from) {
        Ok(config) => config,
        Err(err) => {
            let err = anyhow::Error::from(err);
            eprintln!("Error: {}", describe_error(&err));
            return ExitCode::from(exit_code(&err));
        }
    };

    let filter = if cli.verbose {
        VERBOSE_FILTER
    } else {
        config.logging.filter.as_str()
    };
    init_tracing(filter, config.logging.format);

    match run(cli, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {}", describe_error(&err));
            ExitCode::from(exit_code(&err))
        }
    }
}

async fn run(cli: Cli, config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(&config.database)
        .await
        .context("Could not connect to the database")?;
    let service = TransactionService::new(pool);
    let ask = config.admin.require_confirmation && !cli.yes;

    match cli.command {
        Command::Show { id } => {
            let detail = service.detail(id).await?;
            print!("{}", render_detail(&detail));
        }
        Command::List {
            warehouse,
            kind,
            date,
            limit,
        } => {
            let limit = limit.unwrap_or(config.admin.default_list_limit);
            let filter = list_filter(warehouse, kind, date, limit);
            let transactions = service.list(&filter).await?;
            print!("{}", render_list(&transactions));
        }
        Command::Delete { id, reason } => {
            let detail = service.detail(id).await?;
            print!("{}", render_detail(&detail));
            confirm_or_cancel(ask, &format!("Delete transaction {} and undo its stock effect?", id))?;

            let outcome = service.delete(id, reason.as_deref()).await?;
            println!("Transaction {} deleted, stock restored", id);
            if let Some(reason) = reason {
                println!("Reason: {}", reason);
            }
            print_changes(&outcome);
        }
        Command::Modify {
            id,
            quantity,
            user,
            notes,
            date,
        } => {
            let patch = modify_patch(quantity, user, notes, date.as_deref())?;
            let detail = service.detail(id).await?;
            print!("{}", render_detail(&detail));
            confirm_or_cancel(ask, &format!("Apply these changes to transaction {}?", id))?;

            let outcome = service.modify(id, &patch).await?;
            println!("Transaction {} modified", id);
            print_changes(&outcome);
            print!("{}", render_detail(&service.detail(id).await?));
        }
        Command::Revert { id, user, notes } => {
            let detail = service.detail(id).await?;
            print!("{}", render_detail(&detail));
            confirm_or_cancel(ask, &format!("Record a REVERT entry for transaction {}?", id))?;

            let outcome = service.revert(id, &user, &notes).await?;
            println!(
                "Transaction {} reverted by transaction {}",
                id, outcome.transaction.id
            );
            print_changes(&outcome);
        }
    }

    Ok(())
}

fn confirm_or_cancel(ask: bool, question: &str) -> anyhow::Result<()> {
    if !ask {
        return Ok(());
    }
    let stdin = io::stdin();
    let confirmed = confirm(&mut stdin.lock(), &mut io::stdout(), question)
        .context("Could not read confirmation")?;
    if confirmed {
        Ok(())
    } else {
        Err(Cancelled.into())
    }
}

fn print_changes(outcome: &StockOutcome) {
    if outcome.changes.is_empty() {
        println!("No stock changes");
        return;
    }
    println!("Stock changes:");
    print!("{}", render_changes(&outcome.changes));
}
