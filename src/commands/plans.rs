// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use super::Session;
use crate::db::with_write_tx;
use crate::error::{FinanceError, Result};
use crate::models::{Installment, InstallmentStatus, PaymentPlan, PlanFrequency, PlanStatus};
use crate::money::{fmt_cents, parse_amount, require_positive};
use crate::utils::{maybe_print_json, parse_date, parse_id, pretty_table};
use chrono::{Months, NaiveDate};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Deserialize;

pub const MAX_INSTALLMENTS: u32 = 12;

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches, _session: &Session) -> anyhow::Result<()> {
    match m.subcommand() {
        Some(("create", sub)) => create(conn, sub)?,
        Some(("show", sub)) => show(conn, sub)?,
        Some(("pay", sub)) => pay(conn, sub)?,
        Some(("cancel", sub)) => cancel(conn, sub)?,
        _ => {}
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct NewPlan {
    pub student_id: i64,
    pub total_amount: i64,
    pub start_date: NaiveDate,
    pub frequency: PlanFrequency,
    pub installments_count: u32,
}

/// Split `total` into `count` dated installments. The first installment
/// absorbs the remainder so the parts always sum back to `total`; when
/// `total < count` the later installments are zero.
pub fn generate_installments(
    total: i64,
    start: NaiveDate,
    frequency: PlanFrequency,
    count: u32,
) -> Result<Vec<Installment>> {
    require_positive("total amount", total)?;
    if !(1..=MAX_INSTALLMENTS).contains(&count) {
        return Err(FinanceError::validation(format!(
            "Installment count {} outside 1..={}",
            count, MAX_INSTALLMENTS
        )));
    }
    let n = i64::from(count);
    let per = total / n;
    let remainder = total % n;
    let mut out = Vec::with_capacity(count as usize);
    for i in 0..count {
        let due_date = start
            .checked_add_months(Months::new(i * frequency.months()))
            .ok_or_else(|| FinanceError::validation("Installment due date out of range"))?;
        let amount = if i == 0 { per + remainder } else { per };
        out.push(Installment {
            sequence: i,
            due_date,
            amount,
            status: InstallmentStatus::Pending,
        });
    }
    let sum: i64 = out.iter().map(|i| i.amount).sum();
    if sum != total {
        return Err(FinanceError::validation(format!(
            "Installments sum to {} instead of {}",
            sum, total
        )));
    }
    Ok(out)
}

pub fn create_plan(conn: &mut Connection, req: &NewPlan) -> Result<PaymentPlan> {
    if req.student_id <= 0 {
        return Err(FinanceError::validation(format!("Invalid student id {}", req.student_id)));
    }
    let installments =
        generate_installments(req.total_amount, req.start_date, req.frequency, req.installments_count)?;
    let end_date = installments
        .last()
        .map(|i| i.due_date)
        .unwrap_or(req.start_date);
    let plan = with_write_tx(conn, "create_plan", |tx| {
        tx.execute(
            "INSERT INTO payment_plans(student_id, total_amount, start_date, end_date, frequency, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                req.student_id,
                req.total_amount,
                req.start_date,
                end_date,
                req.frequency,
                PlanStatus::Active
            ],
        )?;
        let plan_id = tx.last_insert_rowid();
        let mut insert = tx.prepare_cached(
            "INSERT INTO plan_installments(plan_id, sequence, due_date, amount, status) VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for inst in &installments {
            insert.execute(params![plan_id, inst.sequence, inst.due_date, inst.amount, inst.status])?;
        }
        drop(insert);
        load_plan(tx, plan_id)
    })?;
    tracing::info!(
        plan_id = plan.id,
        student_id = plan.student_id,
        total = plan.total_amount,
        installments = plan.installments.len(),
        "payment plan created"
    );
    Ok(plan)
}

pub fn load_plan(conn: &Connection, plan_id: i64) -> Result<PaymentPlan> {
    let plan = conn
        .query_row(
            "SELECT id, student_id, total_amount, start_date, end_date, frequency, status
             FROM payment_plans WHERE id=?1",
            params![plan_id],
            |r| {
                Ok(PaymentPlan {
                    id: r.get(0)?,
                    student_id: r.get(1)?,
                    total_amount: r.get(2)?,
                    start_date: r.get(3)?,
                    end_date: r.get(4)?,
                    frequency: r.get(5)?,
                    status: r.get(6)?,
                    installments: Vec::new(),
                })
            },
        )
        .optional()?;
    let mut plan = plan.ok_or(FinanceError::NotFound {
        entity: "payment plan",
        id: plan_id,
    })?;
    let mut stmt = conn.prepare(
        "SELECT sequence, due_date, amount, status FROM plan_installments WHERE plan_id=?1 ORDER BY sequence",
    )?;
    let rows = stmt.query_map(params![plan_id], |r| {
        Ok(Installment {
            sequence: r.get(0)?,
            due_date: r.get(1)?,
            amount: r.get(2)?,
            status: r.get(3)?,
        })
    })?;
    for row in rows {
        plan.installments.push(row?);
    }
    Ok(plan)
}

/// Mark one installment paid; the plan completes once every installment is.
pub fn mark_installment_paid(conn: &mut Connection, plan_id: i64, sequence: u32) -> Result<PaymentPlan> {
    with_write_tx(conn, "mark_installment_paid", |tx| {
        let plan = load_plan(tx, plan_id)?;
        if plan.status != PlanStatus::Active {
            return Err(FinanceError::InvalidTransition {
                entity: "payment plan",
                id: plan_id,
                from: plan.status.to_string(),
                to: "installment paid".into(),
            });
        }
        let inst = plan
            .installments
            .iter()
            .find(|i| i.sequence == sequence)
            .ok_or_else(|| {
                FinanceError::validation(format!("Plan {} has no installment {}", plan_id, sequence))
            })?;
        if inst.status == InstallmentStatus::Paid {
            return Err(FinanceError::validation(format!(
                "Installment {} of plan {} is already paid",
                sequence, plan_id
            )));
        }
        tx.execute(
            "UPDATE plan_installments SET status=?1 WHERE plan_id=?2 AND sequence=?3",
            params![InstallmentStatus::Paid, plan_id, sequence],
        )?;
        let outstanding: i64 = tx.query_row(
            "SELECT COUNT(*) FROM plan_installments WHERE plan_id=?1 AND status!=?2",
            params![plan_id, InstallmentStatus::Paid],
            |r| r.get(0),
        )?;
        if outstanding == 0 {
            tx.execute(
                "UPDATE payment_plans SET status=?1 WHERE id=?2",
                params![PlanStatus::Completed, plan_id],
            )?;
        }
        load_plan(tx, plan_id)
    })
}

pub fn cancel_plan(conn: &mut Connection, plan_id: i64) -> Result<PaymentPlan> {
    with_write_tx(conn, "cancel_plan", |tx| {
        let plan = load_plan(tx, plan_id)?;
        if plan.status != PlanStatus::Active {
            return Err(FinanceError::InvalidTransition {
                entity: "payment plan",
                id: plan_id,
                from: plan.status.to_string(),
                to: PlanStatus::Cancelled.to_string(),
            });
        }
        tx.execute(
            "UPDATE payment_plans SET status=?1 WHERE id=?2",
            params![PlanStatus::Cancelled, plan_id],
        )?;
        load_plan(tx, plan_id)
    })
}

fn print_plan(plan: &PaymentPlan) {
    println!(
        "Plan #{} student {}: {} {} from {} to {} ({})",
        plan.id,
        plan.student_id,
        fmt_cents(plan.total_amount),
        plan.frequency,
        plan.start_date,
        plan.end_date,
        plan.status
    );
    let rows = plan
        .installments
        .iter()
        .map(|i| {
            vec![
                (i.sequence + 1).to_string(),
                i.due_date.to_string(),
                fmt_cents(i.amount),
                i.status.to_string(),
            ]
        })
        .collect();
    println!("{}", pretty_table(&["#", "Due", "Amount", "Status"], rows));
}

fn create(conn: &mut Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let req = NewPlan {
        student_id: parse_id(sub.get_one::<String>("student").unwrap())?,
        total_amount: parse_amount(sub.get_one::<String>("total").unwrap())?,
        start_date: parse_date(sub.get_one::<String>("start").unwrap())?,
        frequency: sub.get_one::<String>("frequency").unwrap().parse()?,
        installments_count: *sub.get_one::<u32>("count").unwrap(),
    };
    let plan = create_plan(conn, &req)?;
    print_plan(&plan);
    Ok(())
}

fn show(conn: &Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let plan = load_plan(conn, parse_id(sub.get_one::<String>("id").unwrap())?)?;
    if !maybe_print_json(sub.get_flag("json"), false, &plan)? {
        print_plan(&plan);
    }
    Ok(())
}

fn pay(conn: &mut Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let id = parse_id(sub.get_one::<String>("id").unwrap())?;
    let number = *sub.get_one::<u32>("installment").unwrap();
    if number == 0 {
        anyhow::bail!("Installments are numbered from 1");
    }
    let plan = mark_installment_paid(conn, id, number - 1)?;
    print_plan(&plan);
    Ok(())
}

fn cancel(conn: &mut Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let plan = cancel_plan(conn, parse_id(sub.get_one::<String>("id").unwrap())?)?;
    println!("Plan #{} is now {}", plan.id, plan.status);
    Ok(())
}
