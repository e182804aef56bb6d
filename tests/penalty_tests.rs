// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use bursar::commands::allocations::{NewAllocation, allocate};
use bursar::commands::fees::{self, FeeFilter, NewFee, create_fee, list_fees, load_fee};
use bursar::commands::payments::{NewPayment, record_payment};
use bursar::commands::penalties::calculate_penalties;
use bursar::commands::Session;
use bursar::config::{KEY_LATE_FEE_MODE, KEY_LATE_FEE_VALUE, KEY_PENALTY_POLICY, set_setting};
use bursar::models::{FeeStatus, FeeType, Operator, PaymentMethod, StudentFee};
use bursar::{cli, db};
use chrono::NaiveDate;
use rusqlite::Connection;

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn fee(conn: &mut Connection, student: i64, amount: i64, due: &str) -> i64 {
    create_fee(
        conn,
        &NewFee {
            student_id: student,
            amount,
            due_date: d(due),
            description: "Hostel".into(),
            fee_type: Some(FeeType::Hostel),
            notes: None,
        },
        d("2025-01-01"),
    )
    .unwrap()
    .id
}

fn late_fees(conn: &Connection) -> Vec<StudentFee> {
    list_fees(conn, &FeeFilter::default(), d("2025-01-01"))
        .unwrap()
        .into_iter()
        .filter(|f| f.fee_type == FeeType::Late)
        .collect()
}

#[test]
fn overdue_fee_is_penalized_once() {
    let mut conn = db::open_in_memory().unwrap();
    let overdue = fee(&mut conn, 1, 10_000, "2025-01-10");
    fee(&mut conn, 1, 10_000, "2025-03-01");

    let run = calculate_penalties(&mut conn, d("2025-02-01")).unwrap();
    assert_eq!(run.processed, 1);
    assert_eq!(run.applied, 1);
    assert_eq!(load_fee(&conn, overdue).unwrap().status, FeeStatus::Overdue);

    let late = late_fees(&conn);
    assert_eq!(late.len(), 1);
    assert_eq!(late[0].amount, 2_500);
    assert_eq!(late[0].penalty_of, Some(overdue));
    assert_eq!(late[0].due_date, d("2025-02-01"));
    assert_eq!(late[0].student_id, 1);

    let again = calculate_penalties(&mut conn, d("2025-02-01")).unwrap();
    assert_eq!(again.applied, 0);
    let later = calculate_penalties(&mut conn, d("2025-04-15")).unwrap();
    assert_eq!(later.applied, 1, "only the second fee is newly overdue");
    assert_eq!(late_fees(&conn).len(), 2);
}

#[test]
fn monthly_policy_penalizes_each_month() {
    let mut conn = db::open_in_memory().unwrap();
    set_setting(&conn, KEY_PENALTY_POLICY, "monthly").unwrap();
    fee(&mut conn, 1, 10_000, "2025-01-10");

    assert_eq!(calculate_penalties(&mut conn, d("2025-02-01")).unwrap().applied, 1);
    assert_eq!(calculate_penalties(&mut conn, d("2025-02-20")).unwrap().applied, 0);
    assert_eq!(calculate_penalties(&mut conn, d("2025-03-02")).unwrap().applied, 1);
    assert_eq!(late_fees(&conn).len(), 2);
}

#[test]
fn percentage_late_fee_uses_unpaid_balance_and_skips_paid_fees() {
    let mut conn = db::open_in_memory().unwrap();
    set_setting(&conn, KEY_LATE_FEE_MODE, "percentage").unwrap();
    set_setting(&conn, KEY_LATE_FEE_VALUE, "500").unwrap();

    let partial = fee(&mut conn, 1, 20_000, "2025-01-10");
    let paid = fee(&mut conn, 1, 5_000, "2025-01-10");
    let p = record_payment(
        &mut conn,
        &NewPayment {
            student_id: 1,
            amount: 13_000,
            payment_date: d("2025-01-05"),
            payment_method: PaymentMethod::Cash,
            payment_number: "P-1".into(),
            status: None,
        },
    )
    .unwrap();
    for (fee_id, amount) in [(partial, 8_000), (paid, 5_000)] {
        allocate(
            &mut conn,
            &NewAllocation {
                payment_id: p.id,
                student_fee_id: fee_id,
                amount,
            },
            &Operator::clerk("desk"),
            d("2025-01-05"),
        )
        .unwrap();
    }

    let run = calculate_penalties(&mut conn, d("2025-02-01")).unwrap();
    assert_eq!(run.processed, 1);
    assert_eq!(run.applied, 1);
    let late = late_fees(&conn);
    assert_eq!(late[0].penalty_of, Some(partial));
    // 5% of the 12,000 still owed
    assert_eq!(late[0].amount, 600);
}

#[test]
fn late_fees_are_never_penalized_themselves() {
    let mut conn = db::open_in_memory().unwrap();
    fee(&mut conn, 1, 10_000, "2025-01-10");
    calculate_penalties(&mut conn, d("2025-02-01")).unwrap();
    // Months later the late fee itself is overdue but is not a candidate.
    let run = calculate_penalties(&mut conn, d("2025-06-01")).unwrap();
    assert_eq!(run.processed, 1);
    assert_eq!(run.applied, 0);
}

#[test]
fn cli_penalty_run_uses_business_date() {
    let mut conn = db::open_in_memory().unwrap();
    fee(&mut conn, 4, 10_000, "2025-01-10");
    let matches = cli::build_cli().get_matches_from([
        "bursar",
        "--as-of",
        "2025-02-01",
        "fee",
        "penalties",
        "--json",
    ]);
    let as_of = matches.get_one::<String>("as_of").unwrap();
    let session = Session::new(Operator::clerk("cron"), bursar::utils::parse_date(as_of).unwrap());
    if let Some(("fee", m)) = matches.subcommand() {
        fees::handle(&mut conn, m, &session).unwrap();
    } else {
        panic!("fee command not parsed");
    }
    assert_eq!(late_fees(&conn).len(), 1);
}
