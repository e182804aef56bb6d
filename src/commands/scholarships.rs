// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Scholarship catalog and awards.
//!
//! An award is a snapshot taken at grant time. It does not rewrite any
//! invoice; reconciling it against fees is a separate bursar step.

use super::Session;
use crate::db::with_write_tx;
use crate::error::{FinanceError, Result};
use crate::models::{
    AmountType, AwardStatus, DisbursementType, ScholarshipType, StudentScholarship,
};
use crate::money::{apply_basis_points, check_basis_points, fmt_bps, fmt_cents, parse_amount, parse_percent};
use crate::utils::{
    id_for_scholarship_code, maybe_print_json, parse_id, pretty_table, require_text, validate_code,
};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Deserialize;

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches, session: &Session) -> anyhow::Result<()> {
    match m.subcommand() {
        Some(("type-add", sub)) => type_add(conn, sub)?,
        Some(("types", sub)) => types(conn, sub)?,
        Some(("award", sub)) => award(conn, sub, session)?,
        Some(("awards", sub)) => awards(conn, sub)?,
        Some(("award-status", sub)) => award_status(conn, sub)?,
        _ => {}
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct NewScholarshipType {
    pub name: String,
    pub code: String,
    pub amount_type: AmountType,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub percentage: Option<i64>,
}

pub fn create_type(conn: &mut Connection, req: &NewScholarshipType) -> Result<ScholarshipType> {
    let name = require_text("name", &req.name)?;
    let code = req.code.trim().to_string();
    validate_code("scholarship", &code)?;
    match (req.amount_type, req.amount, req.percentage) {
        (AmountType::Fixed, Some(a), None) if a > 0 => {}
        (AmountType::Fixed, _, _) => {
            return Err(FinanceError::validation(
                "Fixed scholarships need a positive amount and no percentage",
            ));
        }
        (AmountType::Percentage, None, Some(p)) => check_basis_points(p)?,
        (AmountType::Percentage, _, _) => {
            return Err(FinanceError::validation(
                "Percentage scholarships need a percentage (basis points) and no amount",
            ));
        }
    }
    let t = with_write_tx(conn, "create_scholarship_type", |tx| {
        let exists: Option<i64> = tx
            .query_row(
                "SELECT id FROM scholarship_types WHERE code=?1",
                params![code],
                |r| r.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(FinanceError::DuplicateCode {
                entity: "scholarship",
                code: code.clone(),
            });
        }
        tx.execute(
            "INSERT INTO scholarship_types(name, code, amount_type, amount, percentage) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![name, code, req.amount_type, req.amount, req.percentage],
        )?;
        load_type(tx, tx.last_insert_rowid())
    })?;
    tracing::info!(type_id = t.id, code = %t.code, "scholarship type created");
    Ok(t)
}

pub fn load_type(conn: &Connection, id: i64) -> Result<ScholarshipType> {
    conn.query_row(
        "SELECT id, name, code, amount_type, amount, percentage FROM scholarship_types WHERE id=?1",
        params![id],
        |r| {
            Ok(ScholarshipType {
                id: r.get(0)?,
                name: r.get(1)?,
                code: r.get(2)?,
                amount_type: r.get(3)?,
                amount: r.get(4)?,
                percentage: r.get(5)?,
            })
        },
    )
    .optional()?
    .ok_or(FinanceError::NotFound {
        entity: "scholarship type",
        id,
    })
}

pub fn list_types(conn: &Connection) -> Result<Vec<ScholarshipType>> {
    let mut stmt = conn.prepare("SELECT id FROM scholarship_types ORDER BY code")?;
    let ids = stmt.query_map([], |r| r.get::<_, i64>(0))?;
    let mut data = Vec::new();
    for id in ids {
        data.push(load_type(conn, id?)?);
    }
    Ok(data)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct NewAward {
    pub student_id: i64,
    pub scholarship_type_id: i64,
    /// Operator-entered amount; wins over any pre-fill.
    #[serde(default)]
    pub awarded_amount: Option<i64>,
    /// Base for pre-filling percentage awards.
    #[serde(default)]
    pub reference_amount: Option<i64>,
    pub disbursement_type: DisbursementType,
}

/// Amount an award would carry before any operator override.
pub fn prefill_amount(t: &ScholarshipType, reference_amount: Option<i64>) -> Result<i64> {
    match t.amount_type {
        AmountType::Fixed => t.amount.ok_or_else(|| {
            FinanceError::validation(format!("Scholarship type {} has no fixed amount", t.code))
        }),
        AmountType::Percentage => {
            let bps = t.percentage.ok_or_else(|| {
                FinanceError::validation(format!("Scholarship type {} has no percentage", t.code))
            })?;
            let reference = reference_amount.ok_or_else(|| {
                FinanceError::validation(format!(
                    "Scholarship {} is percentage-based; give a reference amount or an awarded amount",
                    t.code
                ))
            })?;
            if reference < 0 {
                return Err(FinanceError::validation("Reference amount must not be negative"));
            }
            Ok(apply_basis_points(reference, bps))
        }
    }
}

pub fn award_scholarship(conn: &mut Connection, req: &NewAward, today: NaiveDate) -> Result<StudentScholarship> {
    if req.student_id <= 0 {
        return Err(FinanceError::validation(format!("Invalid student id {}", req.student_id)));
    }
    let award = with_write_tx(conn, "award_scholarship", |tx| {
        let t = load_type(tx, req.scholarship_type_id)?;
        let amount = match req.awarded_amount {
            Some(a) if a < 0 => {
                return Err(FinanceError::validation("Awarded amount must not be negative"));
            }
            Some(a) => a,
            None => prefill_amount(&t, req.reference_amount)?,
        };
        tx.execute(
            "INSERT INTO student_scholarships(student_id, scholarship_type_id, awarded_amount, status, disbursement_type, awarded_on)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![req.student_id, t.id, amount, AwardStatus::Active, req.disbursement_type, today],
        )?;
        load_award(tx, tx.last_insert_rowid())
    })?;
    tracing::info!(
        award_id = award.id,
        student_id = award.student_id,
        amount = award.awarded_amount,
        "scholarship awarded"
    );
    Ok(award)
}

pub fn load_award(conn: &Connection, id: i64) -> Result<StudentScholarship> {
    conn.query_row(
        "SELECT id, student_id, scholarship_type_id, awarded_amount, status, disbursement_type, awarded_on
         FROM student_scholarships WHERE id=?1",
        params![id],
        |r| {
            Ok(StudentScholarship {
                id: r.get(0)?,
                student_id: r.get(1)?,
                scholarship_type_id: r.get(2)?,
                awarded_amount: r.get(3)?,
                status: r.get(4)?,
                disbursement_type: r.get(5)?,
                awarded_on: r.get(6)?,
            })
        },
    )
    .optional()?
    .ok_or(FinanceError::NotFound {
        entity: "scholarship award",
        id,
    })
}

pub fn student_awards(conn: &Connection, student_id: i64) -> Result<Vec<StudentScholarship>> {
    let mut stmt =
        conn.prepare("SELECT id FROM student_scholarships WHERE student_id=?1 ORDER BY id")?;
    let ids = stmt.query_map(params![student_id], |r| r.get::<_, i64>(0))?;
    let mut data = Vec::new();
    for id in ids {
        data.push(load_award(conn, id?)?);
    }
    Ok(data)
}

/// Revoked is terminal; active and suspended may swap.
pub fn set_award_status(conn: &mut Connection, award_id: i64, to: AwardStatus) -> Result<StudentScholarship> {
    with_write_tx(conn, "set_award_status", |tx| {
        let award = load_award(tx, award_id)?;
        if award.status == AwardStatus::Revoked || award.status == to {
            return Err(FinanceError::InvalidTransition {
                entity: "scholarship award",
                id: award_id,
                from: award.status.to_string(),
                to: to.to_string(),
            });
        }
        tx.execute(
            "UPDATE student_scholarships SET status=?1 WHERE id=?2",
            params![to, award_id],
        )?;
        load_award(tx, award_id)
    })
}

fn type_add(conn: &mut Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let amount_type: AmountType = sub.get_one::<String>("amount_type").unwrap().parse()?;
    let req = NewScholarshipType {
        name: sub.get_one::<String>("name").unwrap().to_string(),
        code: sub.get_one::<String>("code").unwrap().to_string(),
        amount_type,
        amount: sub.get_one::<String>("amount").map(|s| parse_amount(s)).transpose()?,
        percentage: sub.get_one::<String>("percent").map(|s| parse_percent(s)).transpose()?,
    };
    let t = create_type(conn, &req)?;
    println!("Added scholarship type {} ({})", t.code, t.name);
    Ok(())
}

fn types(conn: &Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let data = list_types(conn)?;
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
        let rows = data
            .iter()
            .map(|t| {
                let value = match t.amount_type {
                    AmountType::Fixed => t.amount.map(fmt_cents).unwrap_or_default(),
                    AmountType::Percentage => t.percentage.map(fmt_bps).unwrap_or_default(),
                };
                vec![t.id.to_string(), t.code.clone(), t.name.clone(), t.amount_type.to_string(), value]
            })
            .collect();
        println!("{}", pretty_table(&["ID", "Code", "Name", "Type", "Value"], rows));
    }
    Ok(())
}

fn award(conn: &mut Connection, sub: &clap::ArgMatches, session: &Session) -> anyhow::Result<()> {
    let type_id = id_for_scholarship_code(conn, sub.get_one::<String>("code").unwrap())?;
    let req = NewAward {
        student_id: parse_id(sub.get_one::<String>("student").unwrap())?,
        scholarship_type_id: type_id,
        awarded_amount: sub.get_one::<String>("amount").map(|s| parse_amount(s)).transpose()?,
        reference_amount: sub.get_one::<String>("reference").map(|s| parse_amount(s)).transpose()?,
        disbursement_type: sub
            .get_one::<String>("disbursement")
            .map(|s| s.parse())
            .transpose()?
            .unwrap_or(DisbursementType::FeeCredit),
    };
    let a = award_scholarship(conn, &req, session.today)?;
    println!(
        "Awarded {} to student {} (award #{}, {})",
        fmt_cents(a.awarded_amount),
        a.student_id,
        a.id,
        a.disbursement_type
    );
    Ok(())
}

fn awards(conn: &Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let student = parse_id(sub.get_one::<String>("student").unwrap())?;
    let data = student_awards(conn, student)?;
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
        let rows = data
            .iter()
            .map(|a| {
                vec![
                    a.id.to_string(),
                    a.scholarship_type_id.to_string(),
                    fmt_cents(a.awarded_amount),
                    a.disbursement_type.to_string(),
                    a.awarded_on.to_string(),
                    a.status.to_string(),
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(&["ID", "Type", "Amount", "Disbursement", "Awarded", "Status"], rows)
        );
    }
    Ok(())
}

fn award_status(conn: &mut Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let id = parse_id(sub.get_one::<String>("id").unwrap())?;
    let to: AwardStatus = sub.get_one::<String>("status").unwrap().parse()?;
    let a = set_award_status(conn, id, to)?;
    println!("Award #{} is now {}", a.id, a.status);
    Ok(())
}
