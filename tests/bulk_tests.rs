// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use bursar::commands::allocations::{NewAllocation, allocate};
use bursar::commands::fees::{self, BulkAction, NewFee, audit_log, bulk_action, create_fee, load_fee};
use bursar::commands::payments::{NewPayment, record_payment};
use bursar::commands::penalties::calculate_penalties;
use bursar::commands::Session;
use bursar::error::FinanceError;
use bursar::models::{AuditAction, FeeStatus, Operator, PaymentMethod};
use bursar::{cli, db};
use chrono::NaiveDate;
use rusqlite::Connection;

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn today() -> NaiveDate {
    d("2025-09-01")
}

fn fee(conn: &mut Connection, amount: i64) -> i64 {
    create_fee(
        conn,
        &NewFee {
            student_id: 1,
            amount,
            due_date: d("2025-09-30"),
            description: "Transport".into(),
            fee_type: None,
            notes: None,
        },
        today(),
    )
    .unwrap()
    .id
}

fn fee_exists(conn: &Connection, id: i64) -> bool {
    load_fee(conn, id).is_ok()
}

#[test]
fn delete_with_allocations_fails_whole_batch() {
    let mut conn = db::open_in_memory().unwrap();
    let a = fee(&mut conn, 10_000);
    let b = fee(&mut conn, 5_000);
    let p = record_payment(
        &mut conn,
        &NewPayment {
            student_id: 1,
            amount: 1_000,
            payment_date: today(),
            payment_method: PaymentMethod::Card,
            payment_number: "C-1".into(),
            status: None,
        },
    )
    .unwrap();
    allocate(
        &mut conn,
        &NewAllocation {
            payment_id: p.id,
            student_fee_id: a,
            amount: 1_000,
        },
        &Operator::clerk("desk"),
        today(),
    )
    .unwrap();

    let err = bulk_action(&mut conn, BulkAction::Delete, &[a, b], &Operator::bursar("ann"), today())
        .unwrap_err();
    match err {
        FinanceError::FeeHasAllocations { fee_ids } => assert_eq!(fee_ids, vec![a]),
        other => panic!("unexpected error {other:?}"),
    }
    assert!(fee_exists(&conn, a));
    assert!(fee_exists(&conn, b));
}

#[test]
fn unknown_id_fails_whole_batch() {
    let mut conn = db::open_in_memory().unwrap();
    let a = fee(&mut conn, 10_000);
    let err = bulk_action(&mut conn, BulkAction::MarkPaid, &[a, 404], &Operator::bursar("ann"), today())
        .unwrap_err();
    assert_eq!(err.kind(), "not_found");
    assert_eq!(load_fee(&conn, a).unwrap().paid_amount, 0);
}

#[test]
fn bulk_actions_require_elevated_operator() {
    let mut conn = db::open_in_memory().unwrap();
    let a = fee(&mut conn, 10_000);
    for action in [BulkAction::MarkPaid, BulkAction::Delete] {
        let err = bulk_action(&mut conn, action, &[a], &Operator::clerk("bob"), today()).unwrap_err();
        assert_eq!(err.kind(), "permission_denied");
    }
    assert!(fee_exists(&conn, a));
}

#[test]
fn mark_paid_is_audited_and_skips_paid_fees() {
    let mut conn = db::open_in_memory().unwrap();
    let a = fee(&mut conn, 10_000);
    let b = fee(&mut conn, 5_000);
    let ann = Operator::bursar("ann");

    let first = bulk_action(&mut conn, BulkAction::MarkPaid, &[a, b, a], &ann, today()).unwrap();
    assert_eq!(first.requested, 2);
    assert_eq!(first.affected, 2);
    assert_eq!(load_fee(&conn, b).unwrap().status, FeeStatus::Paid);

    let second = bulk_action(&mut conn, BulkAction::MarkPaid, &[a, b], &ann, today()).unwrap();
    assert_eq!(second.affected, 0);
    assert_eq!(audit_log(&conn, a).unwrap().len(), 1);
}

#[test]
fn delete_removes_fees_and_leaves_an_audit_trail() {
    let mut conn = db::open_in_memory().unwrap();
    let a = fee(&mut conn, 10_000);
    let out = bulk_action(&mut conn, BulkAction::Delete, &[a], &Operator::bursar("ann"), today()).unwrap();
    assert_eq!(out.affected, 1);
    assert!(!fee_exists(&conn, a));
    let trail = audit_log(&conn, a).unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].action, AuditAction::Delete);
}

#[test]
fn fees_with_late_fee_links_cannot_be_deleted() {
    let mut conn = db::open_in_memory().unwrap();
    let a = create_fee(
        &mut conn,
        &NewFee {
            student_id: 1,
            amount: 10_000,
            due_date: d("2025-08-01"),
            description: "Tuition".into(),
            fee_type: None,
            notes: None,
        },
        d("2025-07-01"),
    )
    .unwrap()
    .id;
    calculate_penalties(&mut conn, today()).unwrap();
    let err = bulk_action(&mut conn, BulkAction::Delete, &[a], &Operator::bursar("ann"), today())
        .unwrap_err();
    assert_eq!(err.kind(), "validation");
    assert!(fee_exists(&conn, a));
}

#[test]
fn cli_bulk_honours_elevated_flag() {
    let mut conn = db::open_in_memory().unwrap();
    let a = fee(&mut conn, 10_000);
    let b = fee(&mut conn, 10_000);
    let matches = cli::build_cli().get_matches_from([
        "bursar",
        "--operator",
        "ann",
        "--elevated",
        "fee",
        "bulk",
        "--action",
        "paid",
        "--ids",
        &format!("{a},{b}"),
    ]);
    let session = Session::new(
        Operator {
            name: matches.get_one::<String>("operator").unwrap().clone(),
            elevated: matches.get_flag("elevated"),
        },
        today(),
    );
    if let Some(("fee", m)) = matches.subcommand() {
        fees::handle(&mut conn, m, &session).unwrap();
    } else {
        panic!("fee command not parsed");
    }
    assert_eq!(load_fee(&conn, a).unwrap().status, FeeStatus::Paid);
    assert_eq!(audit_log(&conn, b).unwrap()[0].operator, "ann");
}
