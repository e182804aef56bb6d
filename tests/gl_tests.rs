// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use bursar::commands::gl::{
    self, NewAccount, NewJournalEntry, NewJournalLine, create_account, post_journal_entry,
    set_account_active, trial_balance,
};
use bursar::commands::Session;
use bursar::error::FinanceError;
use bursar::models::{AccountType, NormalBalance, Operator};
use bursar::{cli, db};
use chrono::NaiveDate;
use rusqlite::Connection;

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn account(conn: &mut Connection, code: &str, ty: AccountType) -> i64 {
    create_account(
        conn,
        &NewAccount {
            code: code.into(),
            name: format!("Account {code}"),
            account_type: ty,
            normal_balance: None,
            allow_contra: false,
        },
    )
    .unwrap()
    .id
}

fn line(account_id: i64, debit: i64, credit: i64) -> NewJournalLine {
    NewJournalLine {
        account_id,
        debit,
        credit,
    }
}

fn entry(lines: Vec<NewJournalLine>) -> NewJournalEntry {
    NewJournalEntry {
        entry_date: d("2025-05-01"),
        memo: "Tuition deposits".into(),
        source_ref: None,
        lines,
    }
}

fn entry_count(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM journal_entries", [], |r| r.get(0))
        .unwrap()
}

#[test]
fn normal_balance_defaults_from_type() {
    let mut conn = db::open_in_memory().unwrap();
    let a = create_account(
        &mut conn,
        &NewAccount {
            code: "2100".into(),
            name: "Student deposits".into(),
            account_type: AccountType::Liability,
            normal_balance: None,
            allow_contra: false,
        },
    )
    .unwrap();
    assert_eq!(a.normal_balance, NormalBalance::Credit);
    assert!(a.is_active);
}

#[test]
fn mismatched_normal_balance_needs_contra_flag() {
    let mut conn = db::open_in_memory().unwrap();
    let mut req = NewAccount {
        code: "2190".into(),
        name: "Deposit offsets".into(),
        account_type: AccountType::Liability,
        normal_balance: Some(NormalBalance::Debit),
        allow_contra: false,
    };
    let err = create_account(&mut conn, &req).unwrap_err();
    assert_eq!(err.kind(), "inconsistent_normal_balance");

    req.allow_contra = true;
    let a = create_account(&mut conn, &req).unwrap();
    assert_eq!(a.normal_balance, NormalBalance::Debit);

    let dup = create_account(&mut conn, &req).unwrap_err();
    assert!(matches!(dup, FinanceError::DuplicateCode { .. }));
}

#[test]
fn balanced_entry_posts_and_shows_in_trial_balance() {
    let mut conn = db::open_in_memory().unwrap();
    let cash = account(&mut conn, "1000", AccountType::Asset);
    let deposits = account(&mut conn, "2100", AccountType::Liability);
    let fees = account(&mut conn, "4000", AccountType::Revenue);

    let e = post_journal_entry(
        &mut conn,
        &entry(vec![line(cash, 30_000, 0), line(deposits, 0, 10_000), line(fees, 0, 20_000)]),
    )
    .unwrap();
    assert_eq!(e.total_debits(), 30_000);
    assert_eq!(e.total_credits(), 30_000);

    let tb = trial_balance(&conn).unwrap();
    assert_eq!(tb.total_debits, 30_000);
    assert_eq!(tb.total_credits, 30_000);
    let cash_row = tb.rows.iter().find(|r| r.account_code == "1000").unwrap();
    assert_eq!(cash_row.balance, 30_000);
    let fee_row = tb.rows.iter().find(|r| r.account_code == "4000").unwrap();
    assert_eq!(fee_row.balance, 20_000);
}

#[test]
fn unbalanced_entry_writes_nothing() {
    let mut conn = db::open_in_memory().unwrap();
    let cash = account(&mut conn, "1000", AccountType::Asset);
    let fees = account(&mut conn, "4000", AccountType::Revenue);
    let err = post_journal_entry(&mut conn, &entry(vec![line(cash, 10_000, 0), line(fees, 0, 9_999)]))
        .unwrap_err();
    assert!(matches!(
        err,
        FinanceError::UnbalancedEntry {
            debits: 10_000,
            credits: 9_999
        }
    ));
    assert_eq!(entry_count(&conn), 0);
    let lines: i64 = conn
        .query_row("SELECT COUNT(*) FROM journal_lines", [], |r| r.get(0))
        .unwrap();
    assert_eq!(lines, 0);
}

#[test]
fn malformed_lines_are_rejected() {
    let mut conn = db::open_in_memory().unwrap();
    let cash = account(&mut conn, "1000", AccountType::Asset);
    let fees = account(&mut conn, "4000", AccountType::Revenue);

    let cases = vec![
        vec![],
        vec![line(cash, 100, 100), line(fees, 0, 0)],
        vec![line(cash, 0, 0), line(fees, 0, 0)],
        vec![line(cash, -100, 0), line(fees, 0, -100)],
        vec![line(cash, 100, 0), line(999, 0, 100)],
    ];
    for lines in cases {
        assert!(post_journal_entry(&mut conn, &entry(lines)).is_err());
    }

    let err = post_journal_entry(&mut conn, &entry(vec![line(cash, 100, 0), line(999, 0, 100)]))
        .unwrap_err();
    assert!(matches!(err, FinanceError::InvalidJournalLine { index: 1, .. }));

    assert!(!set_account_active(&mut conn, fees, false).unwrap().is_active);
    let err = post_journal_entry(&mut conn, &entry(vec![line(cash, 100, 0), line(fees, 0, 100)]))
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_journal_line");
    assert_eq!(entry_count(&conn), 0);
}

#[test]
fn cli_post_takes_code_lines_in_currency_units() {
    let mut conn = db::open_in_memory().unwrap();
    account(&mut conn, "1000", AccountType::Asset);
    account(&mut conn, "4000", AccountType::Revenue);
    let session = Session::new(Operator::clerk("gl"), d("2025-05-02"));
    let matches = cli::build_cli().get_matches_from([
        "bursar",
        "gl",
        "post",
        "--memo",
        "Cash tuition",
        "--line",
        "1000:125.50:",
        "--line",
        "4000::125.50",
    ]);
    if let Some(("gl", m)) = matches.subcommand() {
        gl::handle(&mut conn, m, &session).unwrap();
    } else {
        panic!("gl command not parsed");
    }
    let e = gl::get_journal_entry(&conn, 1).unwrap();
    assert_eq!(e.entry_date, d("2025-05-02"));
    assert_eq!(e.total_debits(), 12_550);
}

#[test]
fn journal_listing_returns_entries_with_lines() {
    let mut conn = db::open_in_memory().unwrap();
    let cash = account(&mut conn, "1000", AccountType::Asset);
    let fees = account(&mut conn, "4000", AccountType::Revenue);
    post_journal_entry(&mut conn, &entry(vec![line(cash, 500, 0), line(fees, 0, 500)])).unwrap();

    let session = Session::new(Operator::clerk("gl"), d("2025-05-02"));
    let matches = cli::build_cli().get_matches_from(["bursar", "gl", "journal", "--jsonl"]);
    if let Some(("gl", m)) = matches.subcommand() {
        gl::handle(&mut conn, m, &session).unwrap();
    } else {
        panic!("gl command not parsed");
    }
    let entries = gl::list_journal_entries(&conn).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].lines.len(), 2);
}

#[test]
fn cli_deactivated_account_rejects_lines_until_reactivated() {
    let mut conn = db::open_in_memory().unwrap();
    let cash = account(&mut conn, "1000", AccountType::Asset);
    let fees = account(&mut conn, "4000", AccountType::Revenue);
    let session = Session::new(Operator::clerk("gl"), d("2025-05-02"));
    let run = |conn: &mut Connection, args: &[&str]| {
        let mut argv = vec!["bursar", "gl"];
        argv.extend_from_slice(args);
        let matches = cli::build_cli().get_matches_from(argv);
        if let Some(("gl", m)) = matches.subcommand() {
            gl::handle(conn, m, &session)
        } else {
            panic!("gl command not parsed");
        }
    };

    run(&mut conn, &["account-active", "--code", "4000", "--off"]).unwrap();
    assert!(!gl::load_account(&conn, fees).unwrap().is_active);
    let err = post_journal_entry(&mut conn, &entry(vec![line(cash, 100, 0), line(fees, 0, 100)]))
        .unwrap_err();
    assert!(matches!(err, FinanceError::InvalidJournalLine { index: 1, .. }));

    run(&mut conn, &["account-active", "--code", "4000"]).unwrap();
    post_journal_entry(&mut conn, &entry(vec![line(cash, 100, 0), line(fees, 0, 100)])).unwrap();
    assert_eq!(entry_count(&conn), 1);
}
