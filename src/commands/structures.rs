// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use super::Session;
use super::fees::{FeeRow, insert_fee};
use crate::db::with_write_tx;
use crate::error::{FinanceError, Result};
use crate::models::{FeeStructure, FeeType, StudentFee};
use crate::money::{fmt_cents, parse_amount, require_positive};
use crate::utils::{maybe_print_json, parse_date, parse_id, pretty_table, require_text};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Deserialize;

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches, session: &Session) -> anyhow::Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => add(conn, sub)?,
        Some(("list", sub)) => list(conn, sub)?,
        Some(("assign", sub)) => assign(conn, sub, session)?,
        _ => {}
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct NewFeeStructure {
    #[serde(default)]
    pub class_id: Option<i64>,
    #[serde(default)]
    pub program_id: Option<i64>,
    pub fee_type: FeeType,
    pub amount: i64,
    #[serde(default)]
    pub is_per_credit: bool,
    #[serde(default)]
    pub academic_period_id: Option<i64>,
    pub due_date: NaiveDate,
    pub description: String,
}

pub fn create_structure(conn: &mut Connection, req: &NewFeeStructure) -> Result<FeeStructure> {
    if req.class_id.is_none() && req.program_id.is_none() {
        return Err(FinanceError::validation(
            "A fee structure needs a class id or a program id",
        ));
    }
    if req.fee_type == FeeType::Late {
        return Err(FinanceError::validation(
            "Late fees are created by the penalty calculator, not from templates",
        ));
    }
    require_positive("amount", req.amount)?;
    let description = require_text("description", &req.description)?;
    let structure = with_write_tx(conn, "create_fee_structure", |tx| {
        tx.execute(
            "INSERT INTO fee_structures(class_id, program_id, fee_type, amount, is_per_credit, academic_period_id, due_date, description)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                req.class_id,
                req.program_id,
                req.fee_type,
                req.amount,
                req.is_per_credit,
                req.academic_period_id,
                req.due_date,
                description
            ],
        )?;
        load_structure(tx, tx.last_insert_rowid())
    })?;
    tracing::info!(structure_id = structure.id, fee_type = %structure.fee_type, "fee structure created");
    Ok(structure)
}

pub fn load_structure(conn: &Connection, id: i64) -> Result<FeeStructure> {
    conn.query_row(
        "SELECT id, class_id, program_id, fee_type, amount, is_per_credit, academic_period_id, due_date, description
         FROM fee_structures WHERE id=?1",
        params![id],
        |r| {
            Ok(FeeStructure {
                id: r.get(0)?,
                class_id: r.get(1)?,
                program_id: r.get(2)?,
                fee_type: r.get(3)?,
                amount: r.get(4)?,
                is_per_credit: r.get(5)?,
                academic_period_id: r.get(6)?,
                due_date: r.get(7)?,
                description: r.get(8)?,
            })
        },
    )
    .optional()?
    .ok_or(FinanceError::NotFound {
        entity: "fee structure",
        id,
    })
}

pub fn list_structures(conn: &Connection) -> Result<Vec<FeeStructure>> {
    let mut stmt = conn.prepare("SELECT id FROM fee_structures ORDER BY due_date, id")?;
    let ids = stmt.query_map([], |r| r.get::<_, i64>(0))?;
    let mut data = Vec::new();
    for id in ids {
        data.push(load_structure(conn, id?)?);
    }
    Ok(data)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct AssignStructure {
    pub structure_id: i64,
    pub student_id: i64,
    #[serde(default)]
    pub credits: Option<u32>,
}

/// Bill one student from a template. Per-credit templates charge
/// `amount * credits`.
pub fn assign_structure(conn: &mut Connection, req: &AssignStructure, today: NaiveDate) -> Result<StudentFee> {
    let fee = with_write_tx(conn, "assign_fee_structure", |tx| {
        let s = load_structure(tx, req.structure_id)?;
        let amount = match (s.is_per_credit, req.credits) {
            (true, Some(c)) if c >= 1 => s.amount.checked_mul(i64::from(c)).ok_or_else(|| {
                FinanceError::validation("Per-credit amount overflows")
            })?,
            (true, _) => {
                return Err(FinanceError::validation(format!(
                    "Fee structure {} is billed per credit; give a credit count of at least 1",
                    s.id
                )));
            }
            (false, Some(_)) => {
                return Err(FinanceError::validation(format!(
                    "Fee structure {} is a flat charge; credits do not apply",
                    s.id
                )));
            }
            (false, None) => s.amount,
        };
        insert_fee(
            tx,
            FeeRow {
                student_id: req.student_id,
                fee_structure_id: Some(s.id),
                fee_type: s.fee_type,
                amount,
                due_date: s.due_date,
                description: &s.description,
                notes: None,
                penalty_of: None,
            },
            today,
        )
    })?;
    tracing::info!(
        fee_id = fee.id,
        structure_id = req.structure_id,
        student_id = fee.student_id,
        "fee structure assigned"
    );
    Ok(fee)
}

fn add(conn: &mut Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let req = NewFeeStructure {
        class_id: sub.get_one::<String>("class").map(|s| parse_id(s)).transpose()?,
        program_id: sub.get_one::<String>("program").map(|s| parse_id(s)).transpose()?,
        fee_type: sub.get_one::<String>("type").unwrap().parse()?,
        amount: parse_amount(sub.get_one::<String>("amount").unwrap())?,
        is_per_credit: sub.get_flag("per_credit"),
        academic_period_id: sub.get_one::<String>("period").map(|s| parse_id(s)).transpose()?,
        due_date: parse_date(sub.get_one::<String>("due").unwrap())?,
        description: sub.get_one::<String>("description").unwrap().to_string(),
    };
    let s = create_structure(conn, &req)?;
    println!(
        "Added fee structure #{} ({} {}{})",
        s.id,
        s.fee_type,
        fmt_cents(s.amount),
        if s.is_per_credit { " per credit" } else { "" }
    );
    Ok(())
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let data = list_structures(conn)?;
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
        let rows = data
            .iter()
            .map(|s| {
                vec![
                    s.id.to_string(),
                    s.class_id.map(|v| v.to_string()).unwrap_or_default(),
                    s.program_id.map(|v| v.to_string()).unwrap_or_default(),
                    s.fee_type.to_string(),
                    fmt_cents(s.amount),
                    if s.is_per_credit { "yes".into() } else { "no".into() },
                    s.academic_period_id.map(|v| v.to_string()).unwrap_or_default(),
                    s.due_date.to_string(),
                    s.description.clone(),
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(
                &["ID", "Class", "Program", "Type", "Amount", "Per Credit", "Period", "Due", "Description"],
                rows
            )
        );
    }
    Ok(())
}

fn assign(conn: &mut Connection, sub: &clap::ArgMatches, session: &Session) -> anyhow::Result<()> {
    let req = AssignStructure {
        structure_id: parse_id(sub.get_one::<String>("structure").unwrap())?,
        student_id: parse_id(sub.get_one::<String>("student").unwrap())?,
        credits: sub.get_one::<u32>("credits").copied(),
    };
    let fee = assign_structure(conn, &req, session.today)?;
    println!(
        "Billed student {} fee #{}: {} due {}",
        fee.student_id,
        fee.id,
        fmt_cents(fee.amount),
        fee.due_date
    );
    Ok(())
}
