// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use super::Session;
use crate::db::with_write_tx;
use crate::error::{FinanceError, Result};
use crate::models::{Payment, PaymentMethod, PaymentStatus};
use crate::money::{fmt_cents, parse_amount, require_positive};
use crate::utils::{maybe_print_json, parse_date, parse_id, pretty_table, validate_code};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};

const PAYMENT_COLUMNS: &str =
    "id, student_id, amount, payment_date, payment_method, status, payment_number";

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches, _session: &Session) -> anyhow::Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => add(conn, sub)?,
        Some(("list", sub)) => list(conn, sub)?,
        Some(("status", sub)) => status(conn, sub)?,
        Some(("balance", sub)) => balance(conn, sub)?,
        _ => {}
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct NewPayment {
    pub student_id: i64,
    pub amount: i64,
    pub payment_date: NaiveDate,
    pub payment_method: PaymentMethod,
    pub payment_number: String,
    /// `pending` for money not yet cleared; `completed` when omitted.
    #[serde(default)]
    pub status: Option<PaymentStatus>,
}

/// Record money received. The payment starts out `completed` (or `pending`
/// when asked) and is not tied to any invoice until allocated.
pub fn record_payment(conn: &mut Connection, req: &NewPayment) -> Result<Payment> {
    if req.student_id <= 0 {
        return Err(FinanceError::validation(format!("Invalid student id {}", req.student_id)));
    }
    require_positive("amount", req.amount)?;
    let number = req.payment_number.trim();
    validate_code("payment number", number)?;
    let status = req.status.unwrap_or(PaymentStatus::Completed);
    if !matches!(status, PaymentStatus::Completed | PaymentStatus::Pending) {
        return Err(FinanceError::validation(format!(
            "A new payment must be pending or completed, not {}",
            status
        )));
    }
    let payment = with_write_tx(conn, "record_payment", |tx| {
        let taken: Option<i64> = tx
            .query_row(
                "SELECT id FROM payments WHERE payment_number=?1",
                params![number],
                |r| r.get(0),
            )
            .optional()?;
        if taken.is_some() {
            return Err(FinanceError::DuplicateCode {
                entity: "payment",
                code: number.to_string(),
            });
        }
        tx.execute(
            "INSERT INTO payments(student_id, amount, payment_date, payment_method, status, payment_number)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                req.student_id,
                req.amount,
                req.payment_date,
                req.payment_method,
                status,
                number
            ],
        )?;
        load_payment(tx, tx.last_insert_rowid())
    })?;
    tracing::info!(
        payment_id = payment.id,
        student_id = payment.student_id,
        amount = payment.amount,
        number = %payment.payment_number,
        status = %payment.status,
        "payment recorded"
    );
    Ok(payment)
}

fn payment_from_row(r: &Row<'_>) -> rusqlite::Result<Payment> {
    Ok(Payment {
        id: r.get(0)?,
        student_id: r.get(1)?,
        amount: r.get(2)?,
        payment_date: r.get(3)?,
        payment_method: r.get(4)?,
        status: r.get(5)?,
        payment_number: r.get(6)?,
    })
}

pub fn load_payment(conn: &Connection, id: i64) -> Result<Payment> {
    let sql = format!("SELECT {} FROM payments WHERE id=?1", PAYMENT_COLUMNS);
    conn.query_row(&sql, params![id], payment_from_row)
        .optional()?
        .ok_or(FinanceError::NotFound {
            entity: "payment",
            id,
        })
}

pub fn list_payments(conn: &Connection, student_id: Option<i64>) -> Result<Vec<Payment>> {
    let mut sql = format!("SELECT {} FROM payments", PAYMENT_COLUMNS);
    if student_id.is_some() {
        sql.push_str(" WHERE student_id=?1");
    }
    sql.push_str(" ORDER BY payment_date DESC, id DESC");
    let mut stmt = conn.prepare(&sql)?;
    let rows = match student_id {
        Some(s) => stmt.query_map(params![s], payment_from_row)?,
        None => stmt.query_map([], payment_from_row)?,
    };
    let mut data = Vec::new();
    for row in rows {
        data.push(row?);
    }
    Ok(data)
}

/// Sum already allocated from one payment.
pub fn allocated_from(conn: &Connection, payment_id: i64) -> Result<i64> {
    let total: i64 = conn.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM payment_allocations WHERE payment_id=?1",
        params![payment_id],
        |r| r.get(0),
    )?;
    Ok(total)
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentBalance {
    pub payment_id: i64,
    pub amount: i64,
    pub allocated: i64,
    pub unallocated: i64,
}

pub fn payment_balance(conn: &Connection, payment_id: i64) -> Result<PaymentBalance> {
    let payment = load_payment(conn, payment_id)?;
    let allocated = allocated_from(conn, payment_id)?;
    Ok(PaymentBalance {
        payment_id,
        amount: payment.amount,
        allocated,
        unallocated: payment.amount - allocated,
    })
}

fn transition_allowed(from: PaymentStatus, to: PaymentStatus) -> bool {
    use PaymentStatus::*;
    matches!(
        (from, to),
        (Pending, Completed) | (Pending, Failed) | (Completed, Refunded)
    )
}

/// Move a payment through `pending -> completed | failed` and
/// `completed -> refunded`. Refunds are refused while allocations exist.
pub fn set_payment_status(conn: &mut Connection, payment_id: i64, to: PaymentStatus) -> Result<Payment> {
    let payment = with_write_tx(conn, "set_payment_status", |tx| {
        let payment = load_payment(tx, payment_id)?;
        if !transition_allowed(payment.status, to) {
            return Err(FinanceError::InvalidTransition {
                entity: "payment",
                id: payment_id,
                from: payment.status.to_string(),
                to: to.to_string(),
            });
        }
        if to == PaymentStatus::Refunded && allocated_from(tx, payment_id)? > 0 {
            return Err(FinanceError::PaymentHasAllocations { payment_id });
        }
        tx.execute(
            "UPDATE payments SET status=?1 WHERE id=?2",
            params![to, payment_id],
        )?;
        load_payment(tx, payment_id)
    })?;
    tracing::info!(payment_id, status = %payment.status, "payment status changed");
    Ok(payment)
}

fn add(conn: &mut Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let req = NewPayment {
        student_id: parse_id(sub.get_one::<String>("student").unwrap())?,
        amount: parse_amount(sub.get_one::<String>("amount").unwrap())?,
        payment_date: parse_date(sub.get_one::<String>("date").unwrap())?,
        payment_method: sub.get_one::<String>("method").unwrap().parse()?,
        payment_number: sub.get_one::<String>("number").unwrap().to_string(),
        status: sub.get_flag("pending").then_some(PaymentStatus::Pending),
    };
    let p = record_payment(conn, &req)?;
    println!(
        "Recorded payment #{} ({}) of {} from student {}",
        p.id,
        p.payment_number,
        fmt_cents(p.amount),
        p.student_id
    );
    Ok(())
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let student = sub.get_one::<String>("student").map(|s| parse_id(s)).transpose()?;
    let data = list_payments(conn, student)?;
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
        let mut rows = Vec::with_capacity(data.len());
        for p in &data {
            let allocated = allocated_from(conn, p.id)?;
            rows.push(vec![
                p.id.to_string(),
                p.payment_number.clone(),
                p.student_id.to_string(),
                p.payment_date.to_string(),
                p.payment_method.to_string(),
                fmt_cents(p.amount),
                fmt_cents(p.amount - allocated),
                p.status.to_string(),
            ]);
        }
        println!(
            "{}",
            pretty_table(
                &["ID", "Number", "Student", "Date", "Method", "Amount", "Unallocated", "Status"],
                rows
            )
        );
    }
    Ok(())
}

fn status(conn: &mut Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let id = parse_id(sub.get_one::<String>("id").unwrap())?;
    let to = sub.get_one::<String>("status").unwrap().parse::<PaymentStatus>()?;
    let p = set_payment_status(conn, id, to)?;
    println!("Payment #{} is now {}", p.id, p.status);
    Ok(())
}

fn balance(conn: &Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let id = parse_id(sub.get_one::<String>("id").unwrap())?;
    let b = payment_balance(conn, id)?;
    if !maybe_print_json(sub.get_flag("json"), false, &b)? {
        println!(
            "{}",
            pretty_table(
                &["Payment", "Amount", "Allocated", "Unallocated"],
                vec![vec![
                    b.payment_id.to_string(),
                    fmt_cents(b.amount),
                    fmt_cents(b.allocated),
                    fmt_cents(b.unallocated),
                ]],
            )
        );
    }
    Ok(())
}
