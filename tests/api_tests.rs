// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use bursar::commands::Session;
use bursar::commands::api::{Request, Response, execute, parse_request};
use bursar::models::{FeeStatus, Operator};
use bursar::{cli, db};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::json;
use tempfile::tempdir;

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn session() -> Session {
    Session::new(Operator::bursar("api"), d("2025-09-01"))
}

fn run(conn: &mut Connection, body: serde_json::Value) -> serde_json::Value {
    let req = parse_request(&body.to_string()).unwrap();
    let resp = execute(conn, &req, &session()).unwrap();
    serde_json::to_value(&resp).unwrap()
}

#[test]
fn unknown_fields_are_rejected() {
    let report = parse_request(
        &json!({
            "op": "create-fee",
            "studentId": 1,
            "amount": 1000,
            "dueDate": "2025-09-30",
            "description": "Tuition",
            "discount": 50
        })
        .to_string(),
    )
    .unwrap_err();
    assert_eq!(report.kind, "validation");
    assert!(report.message.contains("discount"));

    assert!(parse_request(r#"{"op":"drop-tables"}"#).is_err());

    let report = parse_request(r#"{"op":"calculate-penalties","bogus":1}"#).unwrap_err();
    assert_eq!(report.kind, "validation");
    assert!(report.message.contains("bogus"));
}

#[test]
fn bulk_request_accepts_ids_alias() {
    let mut conn = db::open_in_memory().unwrap();
    let fee = run(
        &mut conn,
        json!({
            "op": "create-fee",
            "studentId": 5,
            "amount": 2500,
            "dueDate": "2025-09-30",
            "description": "Trip"
        }),
    );
    let req = parse_request(
        &json!({"op": "bulk-fees", "action": "paid", "ids": [fee["id"]]}).to_string(),
    )
    .unwrap();
    match &req {
        Request::BulkFees(b) => assert_eq!(b.fee_ids, vec![fee["id"].as_i64().unwrap()]),
        other => panic!("unexpected request {other:?}"),
    }
    match execute(&mut conn, &req, &session()).unwrap() {
        Response::Bulk(out) => assert_eq!(out.affected, 1),
        other => panic!("unexpected response {other:?}"),
    }
}

#[test]
fn fee_payment_and_allocation_round_trip() {
    let mut conn = db::open_in_memory().unwrap();
    let fee = run(
        &mut conn,
        json!({
            "op": "create-fee",
            "studentId": 4,
            "amount": 50000,
            "dueDate": "2025-09-30",
            "description": "Tuition",
            "feeType": "tuition"
        }),
    );
    assert_eq!(fee["status"], "pending");
    let payment = run(
        &mut conn,
        json!({
            "op": "create-payment",
            "studentId": 4,
            "amount": 50000,
            "paymentDate": "2025-09-01",
            "paymentMethod": "bank_transfer",
            "paymentNumber": "WEB-77"
        }),
    );
    let out = run(
        &mut conn,
        json!({
            "op": "create-allocation",
            "paymentId": payment["id"],
            "studentFeeId": fee["id"],
            "amount": 50000
        }),
    );
    assert_eq!(out["fee"]["status"], "paid");
    assert_eq!(out["payment_unallocated"], 0);
}

#[test]
fn business_errors_come_back_as_reports() {
    let mut conn = db::open_in_memory().unwrap();
    let req = parse_request(
        &json!({
            "op": "create-account",
            "code": "2100",
            "name": "Deposits",
            "accountType": "liability",
            "normalBalance": "debit"
        })
        .to_string(),
    )
    .unwrap();
    let err = execute(&mut conn, &req, &session()).unwrap_err();
    let report = serde_json::to_value(err.report()).unwrap();
    assert_eq!(report["kind"], "inconsistent_normal_balance");
    assert_eq!(report["category"], "invariant");
}

#[test]
fn penalty_and_status_requests_dispatch() {
    let mut conn = db::open_in_memory().unwrap();
    let fee = run(
        &mut conn,
        json!({
            "op": "create-fee",
            "studentId": 1,
            "amount": 1000,
            "dueDate": "2025-08-01",
            "description": "Library"
        }),
    );
    let req = parse_request(r#"{"op":"calculate-penalties"}"#).unwrap();
    assert_eq!(req.op(), "calculate-penalties");
    match execute(&mut conn, &req, &session()).unwrap() {
        Response::Penalties(run) => assert_eq!(run.applied, 1),
        other => panic!("unexpected response {other:?}"),
    }

    let set = parse_request(
        &json!({"op": "set-fee-status", "feeId": fee["id"], "status": "paid"}).to_string(),
    )
    .unwrap();
    assert!(matches!(set, Request::SetFeeStatus(_)));
    match execute(&mut conn, &set, &session()).unwrap() {
        Response::Fee(f) => assert_eq!(f.status, FeeStatus::Paid),
        other => panic!("unexpected response {other:?}"),
    }
}

#[test]
fn exec_command_reads_request_file() {
    let mut conn = db::open_in_memory().unwrap();
    let dir = tempdir().unwrap();
    let path = dir.path().join("req.json");
    std::fs::write(
        &path,
        json!({
            "op": "create-payment-plan",
            "studentId": 2,
            "totalAmount": 1000,
            "startDate": "2025-01-31",
            "frequency": "monthly",
            "installmentsCount": 3
        })
        .to_string(),
    )
    .unwrap();
    let path_str = path.to_string_lossy().to_string();
    let matches = cli::build_cli().get_matches_from(["bursar", "exec", "--file", &path_str]);
    if let Some(("exec", m)) = matches.subcommand() {
        bursar::commands::api::handle(&mut conn, m, &session()).unwrap();
    } else {
        panic!("exec command not parsed");
    }
    let plan = bursar::commands::plans::load_plan(&conn, 1).unwrap();
    let amounts: Vec<i64> = plan.installments.iter().map(|i| i.amount).collect();
    assert_eq!(amounts, vec![334, 333, 333]);
}
