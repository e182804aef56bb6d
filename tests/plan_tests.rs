// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use bursar::commands::plans::{
    self, NewPlan, cancel_plan, create_plan, generate_installments, load_plan, mark_installment_paid,
};
use bursar::commands::Session;
use bursar::models::{InstallmentStatus, Operator, PlanFrequency, PlanStatus};
use bursar::{cli, db};
use chrono::NaiveDate;

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

#[test]
fn remainder_goes_to_first_installment() {
    let parts = generate_installments(1_000, d("2025-01-31"), PlanFrequency::Monthly, 3).unwrap();
    let amounts: Vec<i64> = parts.iter().map(|i| i.amount).collect();
    assert_eq!(amounts, vec![334, 333, 333]);
    let dues: Vec<NaiveDate> = parts.iter().map(|i| i.due_date).collect();
    assert_eq!(dues, vec![d("2025-01-31"), d("2025-02-28"), d("2025-03-31")]);
    assert!(parts.iter().all(|i| i.status == InstallmentStatus::Pending));
}

#[test]
fn quarterly_schedule_steps_three_months() {
    let parts = generate_installments(120_000, d("2025-09-01"), PlanFrequency::Quarterly, 4).unwrap();
    assert_eq!(parts.len(), 4);
    assert_eq!(parts[3].due_date, d("2026-06-01"));
    assert_eq!(parts.iter().map(|i| i.amount).sum::<i64>(), 120_000);
}

#[test]
fn installment_count_is_bounded() {
    assert!(generate_installments(1_000, d("2025-01-01"), PlanFrequency::Monthly, 0).is_err());
    assert!(generate_installments(1_000, d("2025-01-01"), PlanFrequency::Monthly, 13).is_err());
    assert!(generate_installments(1_000, d("2025-01-01"), PlanFrequency::Monthly, 12).is_ok());
    assert!(generate_installments(-1, d("2025-01-01"), PlanFrequency::Monthly, 1).is_err());
}

#[test]
fn small_total_puts_everything_on_first_installment() {
    let parts = generate_installments(5, d("2025-01-01"), PlanFrequency::Monthly, 12).unwrap();
    let amounts: Vec<i64> = parts.iter().map(|i| i.amount).collect();
    assert_eq!(amounts, vec![5, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);

    let mut conn = db::open_in_memory().unwrap();
    let plan = create_plan(
        &mut conn,
        &NewPlan {
            student_id: 8,
            total_amount: 2,
            start_date: d("2025-01-15"),
            frequency: PlanFrequency::Monthly,
            installments_count: 3,
        },
    )
    .unwrap();
    let stored: Vec<i64> = plan.installments.iter().map(|i| i.amount).collect();
    assert_eq!(stored, vec![2, 0, 0]);
    assert_eq!(plan.end_date, d("2025-03-15"));
}

#[test]
fn plan_completes_when_every_installment_is_paid() {
    let mut conn = db::open_in_memory().unwrap();
    let plan = create_plan(
        &mut conn,
        &NewPlan {
            student_id: 8,
            total_amount: 1_000,
            start_date: d("2025-01-31"),
            frequency: PlanFrequency::Monthly,
            installments_count: 3,
        },
    )
    .unwrap();
    assert_eq!(plan.end_date, d("2025-03-31"));
    assert_eq!(plan.status, PlanStatus::Active);

    for seq in 0..3 {
        mark_installment_paid(&mut conn, plan.id, seq).unwrap();
    }
    let done = load_plan(&conn, plan.id).unwrap();
    assert_eq!(done.status, PlanStatus::Completed);
    assert!(done.installments.iter().all(|i| i.status == InstallmentStatus::Paid));

    let err = cancel_plan(&mut conn, plan.id).unwrap_err();
    assert_eq!(err.kind(), "invalid_transition");
}

#[test]
fn paying_twice_or_out_of_range_fails() {
    let mut conn = db::open_in_memory().unwrap();
    let plan = create_plan(
        &mut conn,
        &NewPlan {
            student_id: 8,
            total_amount: 900,
            start_date: d("2025-01-01"),
            frequency: PlanFrequency::Monthly,
            installments_count: 3,
        },
    )
    .unwrap();
    mark_installment_paid(&mut conn, plan.id, 1).unwrap();
    assert!(mark_installment_paid(&mut conn, plan.id, 1).is_err());
    assert!(mark_installment_paid(&mut conn, plan.id, 3).is_err());

    let cancelled = cancel_plan(&mut conn, plan.id).unwrap();
    assert_eq!(cancelled.status, PlanStatus::Cancelled);
    assert!(mark_installment_paid(&mut conn, plan.id, 0).is_err());
}

#[test]
fn cli_plan_create_parses_count() {
    let mut conn = db::open_in_memory().unwrap();
    let session = Session::new(Operator::clerk("desk"), d("2025-01-01"));
    let matches = cli::build_cli().get_matches_from([
        "bursar",
        "plan",
        "create",
        "--student",
        "3",
        "--total",
        "1500.00",
        "--start",
        "2025-02-15",
        "--frequency",
        "quarterly",
        "--count",
        "2",
    ]);
    if let Some(("plan", m)) = matches.subcommand() {
        plans::handle(&mut conn, m, &session).unwrap();
    } else {
        panic!("plan command not parsed");
    }
    let plan = load_plan(&conn, 1).unwrap();
    assert_eq!(plan.total_amount, 150_000);
    assert_eq!(plan.installments.len(), 2);
    assert_eq!(plan.end_date, d("2025-05-15"));
}
