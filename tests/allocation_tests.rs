// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use bursar::commands::allocations::{self, NewAllocation, allocate, allocations_for_fee};
use bursar::commands::fees::{NewFee, create_fee, load_fee};
use bursar::commands::payments::{NewPayment, payment_balance, record_payment, set_payment_status};
use bursar::commands::Session;
use bursar::error::FinanceError;
use bursar::models::{FeeStatus, Operator, PaymentMethod, PaymentStatus};
use bursar::{cli, db};
use chrono::NaiveDate;
use rusqlite::Connection;

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn today() -> NaiveDate {
    d("2025-09-10")
}

fn fee(conn: &mut Connection, student: i64, amount: i64) -> i64 {
    create_fee(
        conn,
        &NewFee {
            student_id: student,
            amount,
            due_date: d("2025-09-30"),
            description: "Tuition".into(),
            fee_type: None,
            notes: None,
        },
        today(),
    )
    .unwrap()
    .id
}

fn payment(conn: &mut Connection, student: i64, amount: i64, number: &str) -> i64 {
    record_payment(
        conn,
        &NewPayment {
            student_id: student,
            amount,
            payment_date: today(),
            payment_method: PaymentMethod::BankTransfer,
            payment_number: number.into(),
            status: None,
        },
    )
    .unwrap()
    .id
}

fn alloc(conn: &mut Connection, payment_id: i64, fee_id: i64, amount: i64) -> Result<i64, FinanceError> {
    allocate(
        conn,
        &NewAllocation {
            payment_id,
            student_fee_id: fee_id,
            amount,
        },
        &Operator::clerk("desk"),
        today(),
    )
    .map(|o| o.fee.paid_amount)
}

#[test]
fn two_payments_settle_one_fee() {
    let mut conn = db::open_in_memory().unwrap();
    let f = fee(&mut conn, 1, 50_000);
    let p1 = payment(&mut conn, 1, 20_000, "R-1");
    let p2 = payment(&mut conn, 1, 30_000, "R-2");

    assert_eq!(alloc(&mut conn, p1, f, 20_000).unwrap(), 20_000);
    assert_eq!(load_fee(&conn, f).unwrap().status, FeeStatus::Partial);

    assert_eq!(alloc(&mut conn, p2, f, 30_000).unwrap(), 50_000);
    let settled = load_fee(&conn, f).unwrap();
    assert_eq!(settled.status, FeeStatus::Paid);
    assert_eq!(settled.paid_amount, 50_000);
    assert_eq!(allocations_for_fee(&conn, f).unwrap().len(), 2);

    let p3 = payment(&mut conn, 1, 1_000, "R-3");
    let err = alloc(&mut conn, p3, f, 1).unwrap_err();
    assert!(matches!(err, FinanceError::FeeAlreadySettled { fee_id } if fee_id == f));
    assert_eq!(err.kind(), "fee_already_settled");
}

#[test]
fn one_payment_splits_across_fees() {
    let mut conn = db::open_in_memory().unwrap();
    let f1 = fee(&mut conn, 2, 10_000);
    let f2 = fee(&mut conn, 2, 25_000);
    let p = payment(&mut conn, 2, 30_000, "R-10");

    alloc(&mut conn, p, f1, 10_000).unwrap();
    alloc(&mut conn, p, f2, 15_000).unwrap();
    let bal = payment_balance(&conn, p).unwrap();
    assert_eq!(bal.allocated, 25_000);
    assert_eq!(bal.unallocated, 5_000);
    assert_eq!(load_fee(&conn, f1).unwrap().status, FeeStatus::Paid);
    assert_eq!(load_fee(&conn, f2).unwrap().status, FeeStatus::Partial);
}

#[test]
fn over_allocation_is_rejected_without_side_effects() {
    let mut conn = db::open_in_memory().unwrap();
    let f = fee(&mut conn, 1, 10_000);
    let p = payment(&mut conn, 1, 20_000, "R-1");

    let err = alloc(&mut conn, p, f, 15_000).unwrap_err();
    match err {
        FinanceError::OverAllocation { requested, remaining } => {
            assert_eq!(requested, 15_000);
            assert_eq!(remaining, 10_000);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(load_fee(&conn, f).unwrap().paid_amount, 0);
    assert!(allocations_for_fee(&conn, f).unwrap().is_empty());
}

#[test]
fn payment_balance_caps_allocation() {
    let mut conn = db::open_in_memory().unwrap();
    let f = fee(&mut conn, 1, 10_000);
    let p = payment(&mut conn, 1, 5_000, "R-1");

    let err = alloc(&mut conn, p, f, 6_000).unwrap_err();
    assert!(matches!(
        err,
        FinanceError::InsufficientPaymentBalance {
            requested: 6_000,
            available: 5_000
        }
    ));
    assert!(alloc(&mut conn, p, f, 0).is_err());
    assert!(alloc(&mut conn, p, f, -5).is_err());
}

#[test]
fn payment_and_fee_must_share_a_student() {
    let mut conn = db::open_in_memory().unwrap();
    let f = fee(&mut conn, 1, 10_000);
    let p = payment(&mut conn, 2, 10_000, "R-1");
    let err = alloc(&mut conn, p, f, 1_000).unwrap_err();
    assert_eq!(err.kind(), "validation");
}

#[test]
fn refund_is_refused_while_allocations_exist() {
    let mut conn = db::open_in_memory().unwrap();
    let f = fee(&mut conn, 1, 10_000);
    let p = payment(&mut conn, 1, 10_000, "R-1");
    alloc(&mut conn, p, f, 4_000).unwrap();
    let err = set_payment_status(&mut conn, p, PaymentStatus::Refunded).unwrap_err();
    assert_eq!(err.kind(), "payment_has_allocations");

    let unused = payment(&mut conn, 1, 500, "R-2");
    let refunded = set_payment_status(&mut conn, unused, PaymentStatus::Refunded).unwrap();
    assert_eq!(refunded.status, PaymentStatus::Refunded);
    // A refunded payment can no longer be allocated.
    assert!(alloc(&mut conn, unused, f, 100).is_err());
}

fn pending_payment(conn: &mut Connection, number: &str) -> i64 {
    record_payment(
        conn,
        &NewPayment {
            student_id: 1,
            amount: 3_000,
            payment_date: today(),
            payment_method: PaymentMethod::Cheque,
            payment_number: number.into(),
            status: Some(PaymentStatus::Pending),
        },
    )
    .unwrap()
    .id
}

#[test]
fn pending_payment_clears_before_allocation() {
    let mut conn = db::open_in_memory().unwrap();
    let f = fee(&mut conn, 1, 10_000);
    let p = pending_payment(&mut conn, "CHQ-1");
    assert!(alloc(&mut conn, p, f, 1_000).is_err());
    assert!(set_payment_status(&mut conn, p, PaymentStatus::Refunded).is_err());

    let cleared = set_payment_status(&mut conn, p, PaymentStatus::Completed).unwrap();
    assert_eq!(cleared.status, PaymentStatus::Completed);
    assert_eq!(alloc(&mut conn, p, f, 1_000).unwrap(), 1_000);

    let bounced = pending_payment(&mut conn, "CHQ-2");
    let failed = set_payment_status(&mut conn, bounced, PaymentStatus::Failed).unwrap();
    assert_eq!(failed.status, PaymentStatus::Failed);
    let err = set_payment_status(&mut conn, bounced, PaymentStatus::Completed).unwrap_err();
    assert_eq!(err.kind(), "invalid_transition");
}

#[test]
fn new_payment_cannot_start_refunded() {
    let mut conn = db::open_in_memory().unwrap();
    let err = record_payment(
        &mut conn,
        &NewPayment {
            student_id: 1,
            amount: 200,
            payment_date: today(),
            payment_method: PaymentMethod::Cash,
            payment_number: "R-9".into(),
            status: Some(PaymentStatus::Refunded),
        },
    )
    .unwrap_err();
    assert_eq!(err.kind(), "validation");
}

#[test]
fn duplicate_payment_number_is_rejected() {
    let mut conn = db::open_in_memory().unwrap();
    payment(&mut conn, 1, 100, "R-1");
    let err = record_payment(
        &mut conn,
        &NewPayment {
            student_id: 1,
            amount: 200,
            payment_date: today(),
            payment_method: PaymentMethod::Cash,
            payment_number: "R-1".into(),
            status: None,
        },
    )
    .unwrap_err();
    assert_eq!(err.kind(), "duplicate_code");
}

#[test]
fn cli_allocate_reports_over_allocation() {
    let mut conn = db::open_in_memory().unwrap();
    let f = fee(&mut conn, 1, 10_000);
    let p = payment(&mut conn, 1, 50_000, "R-1");
    let session = Session::new(Operator::clerk("desk"), today());

    let matches = cli::build_cli().get_matches_from([
        "bursar",
        "allocate",
        "add",
        "--payment",
        &p.to_string(),
        "--fee",
        &f.to_string(),
        "--amount",
        "150.00",
    ]);
    if let Some(("allocate", m)) = matches.subcommand() {
        let err = allocations::handle(&mut conn, m, &session).unwrap_err();
        let fe = err.downcast_ref::<FinanceError>().unwrap();
        assert_eq!(fe.kind(), "over_allocation");
    } else {
        panic!("allocate command not parsed");
    }
    assert_eq!(load_fee(&conn, f).unwrap().paid_amount, 0);
}
