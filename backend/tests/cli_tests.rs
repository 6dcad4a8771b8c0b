//! Admin CLI tests
//!
//! Tests for argument parsing, confirmation prompts and rendering

use std::collections::BTreeMap;
use std::io::Cursor;

use chrono::{NaiveDate, TimeZone, Utc};
use clap::Parser;
use litewms_backend::cli::{
    confirm, list_filter, modify_patch, render_changes, render_detail, render_list, Cli, Command,
};
use litewms_backend::services::TransactionDetail;
use shared::{
    Movement, Specs, StockChange, StockKey, StockLine, Transaction, TransactionKind, TransferLine,
};

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("litewms-admin").chain(args.iter().copied())).unwrap()
}

fn sample(id: i64, movement: Movement, notes: &str) -> Transaction {
    let date = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
    Transaction {
        id,
        movement,
        date,
        operator: "alice".to_string(),
        notes: notes.to_string(),
        reverted: false,
        created_at: date,
    }
}

// ============================================================================
// Argument Parsing
// ============================================================================

#[cfg(test)]
mod parsing_tests {
    use super::*;

    #[test]
    fn test_list_with_filters() {
        let cli = parse(&["list", "--warehouse", "2", "--type", "transfer", "--date", "2024-05-01"]);
        match cli.command {
            Command::List { warehouse, kind, date, limit } => {
                assert_eq!(warehouse, Some(2));
                assert_eq!(kind, Some(TransactionKind::Transfer));
                assert_eq!(date, NaiveDate::from_ymd_opt(2024, 5, 1));
                assert_eq!(limit, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_list_rejects_unknown_type() {
        let result = Cli::try_parse_from(["litewms-admin", "list", "--type", "SALE"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_modify_accepts_negative_adjust_quantity() {
        let cli = parse(&["modify", "7", "--quantity", "-3", "--notes", "recount"]);
        match cli.command {
            Command::Modify { id, quantity, notes, .. } => {
                assert_eq!(id, 7);
                assert_eq!(quantity, Some(-3));
                assert_eq!(notes.as_deref(), Some("recount"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = parse(&["delete", "4", "--reason", "duplicate", "--yes", "-v"]);
        assert!(cli.yes);
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Command::Delete { id: 4, ref reason } if reason.as_deref() == Some("duplicate")
        ));
    }

    #[test]
    fn test_revert_requires_user() {
        assert!(Cli::try_parse_from(["litewms-admin", "revert", "3"]).is_err());

        let cli = parse(&["revert", "3", "--user", "bob"]);
        assert!(matches!(
            cli.command,
            Command::Revert { id: 3, ref user, ref notes } if user == "bob" && notes.is_empty()
        ));
    }

    #[test]
    fn test_list_filter_uses_limit() {
        let filter = list_filter(Some(1), None, None, 20);
        assert_eq!(filter.warehouse_id, Some(1));
        assert_eq!(filter.effective_limit(), 20);
        assert_eq!(filter.effective_offset(), 0);
    }

    #[test]
    fn test_modify_patch_needs_a_field() {
        assert!(modify_patch(None, None, None, None).is_err());
        assert!(modify_patch(None, None, None, Some("yesterday")).is_err());

        let patch = modify_patch(Some(30), None, None, Some("2024-05-02")).unwrap();
        assert_eq!(patch.quantity, Some(30));
        assert_eq!(
            patch.date.map(|d| d.date_naive()),
            NaiveDate::from_ymd_opt(2024, 5, 2)
        );
    }
}

// ============================================================================
// Confirmation
// ============================================================================

#[cfg(test)]
mod confirm_tests {
    use super::*;

    #[test]
    fn test_only_yes_confirms() {
        for (answer, expected) in [("yes\n", true), ("  yes  \n", true), ("y\n", false), ("YES\n", false), ("", false)] {
            let mut input = Cursor::new(answer.as_bytes());
            let mut output = Vec::new();
            let confirmed = confirm(&mut input, &mut output, "Delete transaction 1?").unwrap();
            assert_eq!(confirmed, expected, "answer {:?}", answer);
            assert!(String::from_utf8(output).unwrap().starts_with("Delete transaction 1?"));
        }
    }
}

// ============================================================================
// Rendering
// ============================================================================

#[cfg(test)]
mod render_tests {
    use super::*;

    #[test]
    fn test_detail_shows_transfer_destination() {
        let from = StockKey::new(3, 1, Specs::new().with("size", "L"));
        let transfer = sample(
            12,
            Movement::Transfer {
                lines: vec![TransferLine { to: from.in_warehouse(2), from, quantity: 15 }],
            },
            "rebalance",
        );
        let detail = TransactionDetail {
            transaction: transfer,
            warehouse_name: Some("North".to_string()),
            related_warehouse_name: Some("South".to_string()),
            category_names: BTreeMap::from([(3, "T-shirt".to_string())]),
        };

        let text = render_detail(&detail);
        assert!(text.contains("Transaction 12"));
        assert!(text.contains("TRANSFER"));
        assert!(text.contains("Warehouse: North (ID: 1)"));
        assert!(text.contains("South (ID: 2)"));
        assert!(text.contains("size=L"));
        assert!(text.contains("3 = T-shirt"));
    }

    #[test]
    fn test_list_marks_reverted_and_truncates_notes() {
        let key = StockKey::new(1, 1, Specs::new());
        let mut inbound = sample(
            1,
            Movement::In { lines: vec![StockLine { key: key.clone(), quantity: 20 }] },
            &"n".repeat(80),
        );
        inbound.reverted = true;
        let revert = sample(2, Movement::revert_of(1, &inbound.movement), "");

        let text = render_list(&[revert, inbound]);
        assert!(text.contains("showing 2"));
        assert!(text.contains("REVERT"));
        assert!(text.contains("2024-05-01"));
        assert!(text.contains(&format!("{}...", "n".repeat(27))));
        assert!(!text.contains(&"n".repeat(31)));
    }

    #[test]
    fn test_changes_report_clamping() {
        let key = StockKey::new(1, 1, Specs::new());
        let text = render_changes(&[StockChange { key, before: 3, after: 0, clamped: 7 }]);
        assert!(text.contains("3 -> 0"));
        assert!(text.contains("7 discarded"));
    }
}
