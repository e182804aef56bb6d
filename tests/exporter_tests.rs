// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use bursar::commands::fees::{NewFee, create_fee};
use bursar::commands::gl::{
    NewAccount, NewJournalEntry, NewJournalLine, create_account, post_journal_entry,
};
use bursar::commands::Session;
use bursar::models::{AccountType, FeeType, Operator};
use bursar::{cli, commands::exporter, db};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::json;
use tempfile::tempdir;

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn run_export(conn: &Connection, target: &str, format: &str, out: &str) -> anyhow::Result<()> {
    run_export_on(conn, target, format, out, d("2025-09-01"))
}

fn run_export_on(
    conn: &Connection,
    target: &str,
    format: &str,
    out: &str,
    today: NaiveDate,
) -> anyhow::Result<()> {
    let session = Session::new(Operator::clerk("export"), today);
    let matches = cli::build_cli().get_matches_from([
        "bursar", "export", target, "--format", format, "--out", out,
    ]);
    if let Some(("export", export_m)) = matches.subcommand() {
        exporter::handle(conn, export_m, &session)
    } else {
        panic!("no export subcommand");
    }
}

#[test]
fn export_fees_writes_pretty_json() {
    let mut conn = db::open_in_memory().unwrap();
    create_fee(
        &mut conn,
        &NewFee {
            student_id: 9,
            amount: 125_050,
            due_date: d("2025-09-30"),
            description: "Autumn tuition".into(),
            fee_type: Some(FeeType::Tuition),
            notes: None,
        },
        d("2025-09-01"),
    )
    .unwrap();

    let dir = tempdir().unwrap();
    let out_path = dir.path().join("fees.json");
    let out_str = out_path.to_string_lossy().to_string();
    run_export(&conn, "fees", "json", &out_str).unwrap();

    let parsed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out_path).unwrap()).unwrap();
    assert_eq!(
        parsed,
        json!([
            {
                "id": 1,
                "studentId": 9,
                "feeType": "tuition",
                "description": "Autumn tuition",
                "dueDate": "2025-09-30",
                "amount": 125050,
                "paidAmount": 0,
                "status": "pending"
            }
        ])
    );
}

#[test]
fn export_fees_derives_status_on_export_date() {
    let mut conn = db::open_in_memory().unwrap();
    create_fee(
        &mut conn,
        &NewFee {
            student_id: 2,
            amount: 30_000,
            due_date: d("2025-01-31"),
            description: "Spring tuition".into(),
            fee_type: Some(FeeType::Tuition),
            notes: None,
        },
        d("2025-01-01"),
    )
    .unwrap();

    let dir = tempdir().unwrap();
    let out_path = dir.path().join("fees.csv");
    let out_str = out_path.to_string_lossy().to_string();

    run_export_on(&conn, "fees", "csv", &out_str, d("2025-01-15")).unwrap();
    let mut rdr = csv::Reader::from_path(&out_path).unwrap();
    let row = rdr.records().next().unwrap().unwrap();
    assert_eq!(&row[7], "pending");

    run_export_on(&conn, "fees", "csv", &out_str, d("2025-03-01")).unwrap();
    let mut rdr = csv::Reader::from_path(&out_path).unwrap();
    let row = rdr.records().next().unwrap().unwrap();
    assert_eq!(&row[4], "2025-01-31");
    assert_eq!(&row[7], "overdue");
}

#[test]
fn export_journal_flattens_lines_to_csv() {
    let mut conn = db::open_in_memory().unwrap();
    let mut ids = Vec::new();
    for (code, ty) in [("1000", AccountType::Asset), ("4000", AccountType::Revenue)] {
        let a = create_account(
            &mut conn,
            &NewAccount {
                code: code.into(),
                name: format!("Account {code}"),
                account_type: ty,
                normal_balance: None,
                allow_contra: false,
            },
        )
        .unwrap();
        ids.push(a.id);
    }
    post_journal_entry(
        &mut conn,
        &NewJournalEntry {
            entry_date: d("2025-05-01"),
            memo: "Cash tuition".into(),
            source_ref: Some("till:7".into()),
            lines: vec![
                NewJournalLine {
                    account_id: ids[0],
                    debit: 4_200,
                    credit: 0,
                },
                NewJournalLine {
                    account_id: ids[1],
                    debit: 0,
                    credit: 4_200,
                },
            ],
        },
    )
    .unwrap();

    let dir = tempdir().unwrap();
    let out_path = dir.path().join("journal.csv");
    let out_str = out_path.to_string_lossy().to_string();
    run_export(&conn, "journal", "csv", &out_str).unwrap();

    let mut rdr = csv::Reader::from_path(&out_path).unwrap();
    let headers = rdr.headers().unwrap().clone();
    assert_eq!(
        headers.iter().collect::<Vec<_>>(),
        vec!["entry", "date", "memo", "source", "account", "debit", "credit"]
    );
    let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(&rows[0][4], "1000");
    assert_eq!(&rows[0][5], "42.00");
    assert_eq!(&rows[1][6], "42.00");
    assert_eq!(&rows[1][3], "till:7");
}

#[test]
fn export_rejects_unknown_format() {
    let conn = db::open_in_memory().unwrap();
    let dir = tempdir().unwrap();
    let out_path = dir.path().join("export.unknown");
    let out_str = out_path.to_string_lossy().to_string();

    assert!(run_export(&conn, "fees", "xml", &out_str).is_err());
    assert!(!out_path.exists());
}
