// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Payment allocation engine.
//!
//! Callers choose the target fee explicitly; there is no automatic
//! oldest-first ordering. One payment may be split across many fees and one
//! fee may be settled by many payments.

use super::Session;
use super::fees::{Settlement, apply_settlement, load_fee};
use super::payments::{allocated_from, load_payment};
use crate::db::with_write_tx;
use crate::error::{FinanceError, Result};
use crate::models::{Operator, PaymentAllocation, PaymentStatus, StudentFee};
use crate::money::{fmt_cents, parse_amount, require_positive};
use crate::utils::{maybe_print_json, parse_id, pretty_table};
use chrono::NaiveDate;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches, session: &Session) -> anyhow::Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => add(conn, sub, session)?,
        Some(("list", sub)) => list(conn, sub)?,
        _ => {}
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct NewAllocation {
    pub payment_id: i64,
    pub student_fee_id: i64,
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AllocationOutcome {
    pub allocation: PaymentAllocation,
    pub fee: StudentFee,
    pub payment_unallocated: i64,
}

/// Apply `amount` of a payment to one fee.
///
/// Runs under the database write lock, so two concurrent allocations against
/// the same payment or fee see each other's effects and cannot jointly
/// overshoot either balance.
pub fn allocate(
    conn: &mut Connection,
    req: &NewAllocation,
    operator: &Operator,
    today: NaiveDate,
) -> Result<AllocationOutcome> {
    require_positive("allocation amount", req.amount)?;
    let outcome = with_write_tx(conn, "allocate", |tx| {
        let payment = load_payment(tx, req.payment_id)?;
        if payment.status != PaymentStatus::Completed {
            return Err(FinanceError::validation(format!(
                "Payment {} is {}; only completed payments can be allocated",
                payment.id, payment.status
            )));
        }
        let fee = load_fee(tx, req.student_fee_id)?;
        if fee.student_id != payment.student_id {
            return Err(FinanceError::validation(format!(
                "Payment {} belongs to student {}, fee {} to student {}",
                payment.id, payment.student_id, fee.id, fee.student_id
            )));
        }
        let available = payment.amount - allocated_from(tx, payment.id)?;
        if fee.paid_amount >= fee.amount {
            return Err(FinanceError::FeeAlreadySettled { fee_id: fee.id });
        }
        if req.amount > available {
            return Err(FinanceError::InsufficientPaymentBalance {
                requested: req.amount,
                available,
            });
        }
        let settlement = Settlement::Collected {
            payment_id: payment.id,
            amount: req.amount,
        };
        let fee = apply_settlement(tx, &fee, &settlement, operator, today)?;
        tx.execute(
            "INSERT INTO payment_allocations(payment_id, student_fee_id, amount) VALUES (?1, ?2, ?3)",
            params![payment.id, fee.id, req.amount],
        )?;
        Ok(AllocationOutcome {
            allocation: PaymentAllocation {
                id: tx.last_insert_rowid(),
                payment_id: payment.id,
                student_fee_id: fee.id,
                amount: req.amount,
            },
            fee,
            payment_unallocated: available - req.amount,
        })
    })?;
    tracing::info!(
        allocation_id = outcome.allocation.id,
        payment_id = req.payment_id,
        fee_id = req.student_fee_id,
        amount = req.amount,
        fee_status = %outcome.fee.status,
        "payment allocated"
    );
    Ok(outcome)
}

fn load_allocations(conn: &Connection, column: &str, id: i64) -> Result<Vec<PaymentAllocation>> {
    let sql = format!(
        "SELECT id, payment_id, student_fee_id, amount FROM payment_allocations WHERE {}=?1 ORDER BY id",
        column
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![id], |r| {
        Ok(PaymentAllocation {
            id: r.get(0)?,
            payment_id: r.get(1)?,
            student_fee_id: r.get(2)?,
            amount: r.get(3)?,
        })
    })?;
    let mut data = Vec::new();
    for row in rows {
        data.push(row?);
    }
    Ok(data)
}

pub fn allocations_for_payment(conn: &Connection, payment_id: i64) -> Result<Vec<PaymentAllocation>> {
    load_allocations(conn, "payment_id", payment_id)
}

pub fn allocations_for_fee(conn: &Connection, fee_id: i64) -> Result<Vec<PaymentAllocation>> {
    load_allocations(conn, "student_fee_id", fee_id)
}

fn add(conn: &mut Connection, sub: &clap::ArgMatches, session: &Session) -> anyhow::Result<()> {
    let req = NewAllocation {
        payment_id: parse_id(sub.get_one::<String>("payment").unwrap())?,
        student_fee_id: parse_id(sub.get_one::<String>("fee").unwrap())?,
        amount: parse_amount(sub.get_one::<String>("amount").unwrap())?,
    };
    match allocate(conn, &req, &session.operator, session.today) {
        Ok(out) => {
            println!(
                "Allocated {} from payment #{} to fee #{} (fee now {}, balance {}; payment unallocated {})",
                fmt_cents(out.allocation.amount),
                out.allocation.payment_id,
                out.fee.id,
                out.fee.status,
                fmt_cents(out.fee.balance()),
                fmt_cents(out.payment_unallocated)
            );
            Ok(())
        }
        Err(err) => {
            // Show both balances so the operator can retry with a smaller amount.
            if matches!(
                err,
                FinanceError::InsufficientPaymentBalance { .. }
                    | FinanceError::OverAllocation { .. }
                    | FinanceError::FeeAlreadySettled { .. }
            ) {
                if let (Ok(fee), Ok(p)) = (
                    load_fee(conn, req.student_fee_id),
                    super::payments::payment_balance(conn, req.payment_id),
                ) {
                    eprintln!(
                        "Fee #{} remaining payable: {}; payment #{} allocatable: {}",
                        fee.id,
                        fmt_cents(fee.balance()),
                        p.payment_id,
                        fmt_cents(p.unallocated)
                    );
                }
            }
            Err(err.into())
        }
    }
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let data = if let Some(p) = sub.get_one::<String>("payment") {
        allocations_for_payment(conn, parse_id(p)?)?
    } else if let Some(f) = sub.get_one::<String>("fee") {
        allocations_for_fee(conn, parse_id(f)?)?
    } else {
        anyhow::bail!("Give --payment or --fee");
    };
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
        let rows = data
            .iter()
            .map(|a| {
                vec![
                    a.id.to_string(),
                    a.payment_id.to_string(),
                    a.student_fee_id.to_string(),
                    fmt_cents(a.amount),
                ]
            })
            .collect();
        println!("{}", pretty_table(&["ID", "Payment", "Fee", "Amount"], rows));
    }
    Ok(())
}
