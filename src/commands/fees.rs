// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use super::Session;
use crate::db::with_write_tx;
use crate::error::{FinanceError, Result};
use crate::models::{AuditAction, FeeAuditEntry, FeeStatus, FeeType, Operator, StudentFee};
use crate::money::{fmt_cents, parse_amount, require_positive};
use crate::utils::{maybe_print_json, parse_date, parse_id, parse_id_list, pretty_table, require_text};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};

pub(crate) const FEE_COLUMNS: &str = "id, student_id, fee_structure_id, fee_type, amount, \
     paid_amount, status, due_date, description, notes, penalty_of";

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches, session: &Session) -> anyhow::Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => add(conn, sub, session)?,
        Some(("list", sub)) => list(conn, sub, session)?,
        Some(("show", sub)) => show(conn, sub, session)?,
        Some(("status", sub)) => status(conn, sub, session)?,
        Some(("bulk", sub)) => bulk(conn, sub, session)?,
        Some(("penalties", sub)) => super::penalties::handle(conn, sub, session)?,
        Some(("statement", sub)) => statement(conn, sub, session)?,
        _ => {}
    }
    Ok(())
}

/// Ad hoc invoice created by finance staff.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct NewFee {
    pub student_id: i64,
    pub amount: i64,
    pub due_date: NaiveDate,
    pub description: String,
    #[serde(default)]
    pub fee_type: Option<FeeType>,
    #[serde(default)]
    pub notes: Option<String>,
}

pub fn create_fee(conn: &mut Connection, req: &NewFee, today: NaiveDate) -> Result<StudentFee> {
    let fee = with_write_tx(conn, "create_fee", |tx| {
        insert_fee(
            tx,
            FeeRow {
                student_id: req.student_id,
                fee_structure_id: None,
                fee_type: req.fee_type.unwrap_or(FeeType::Other),
                amount: req.amount,
                due_date: req.due_date,
                description: &req.description,
                notes: req.notes.as_deref(),
                penalty_of: None,
            },
            today,
        )
    })?;
    tracing::info!(fee_id = fee.id, student_id = fee.student_id, amount = fee.amount, "fee created");
    Ok(fee)
}

pub(crate) struct FeeRow<'a> {
    pub student_id: i64,
    pub fee_structure_id: Option<i64>,
    pub fee_type: FeeType,
    pub amount: i64,
    pub due_date: NaiveDate,
    pub description: &'a str,
    pub notes: Option<&'a str>,
    pub penalty_of: Option<i64>,
}

/// Insert an invoice inside the caller's transaction.
pub(crate) fn insert_fee(conn: &Connection, row: FeeRow<'_>, today: NaiveDate) -> Result<StudentFee> {
    if row.student_id <= 0 {
        return Err(FinanceError::validation(format!("Invalid student id {}", row.student_id)));
    }
    require_positive("amount", row.amount)?;
    let description = require_text("description", row.description)?;
    let notes = row.notes.map(str::trim).filter(|s| !s.is_empty());
    let status = FeeStatus::derive(row.amount, 0, row.due_date, today);
    conn.execute(
        "INSERT INTO student_fees(student_id, fee_structure_id, fee_type, amount, paid_amount, status, due_date, description, notes, penalty_of)
         VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?7, ?8, ?9)",
        params![
            row.student_id,
            row.fee_structure_id,
            row.fee_type,
            row.amount,
            status,
            row.due_date,
            description,
            notes,
            row.penalty_of
        ],
    )?;
    load_fee(conn, conn.last_insert_rowid())
}

pub(crate) fn fee_from_row(r: &Row<'_>) -> rusqlite::Result<StudentFee> {
    Ok(StudentFee {
        id: r.get(0)?,
        student_id: r.get(1)?,
        fee_structure_id: r.get(2)?,
        fee_type: r.get(3)?,
        amount: r.get(4)?,
        paid_amount: r.get(5)?,
        status: r.get(6)?,
        due_date: r.get(7)?,
        description: r.get(8)?,
        notes: r.get(9)?,
        penalty_of: r.get(10)?,
    })
}

pub fn load_fee(conn: &Connection, id: i64) -> Result<StudentFee> {
    let sql = format!("SELECT {} FROM student_fees WHERE id=?1", FEE_COLUMNS);
    conn.query_row(&sql, params![id], fee_from_row)
        .optional()?
        .ok_or(FinanceError::NotFound { entity: "fee", id })
}

#[derive(Debug, Clone, Default)]
pub struct FeeFilter {
    pub student_id: Option<i64>,
    pub status: Option<FeeStatus>,
    pub limit: Option<usize>,
}

/// Invoices with their status recomputed for `today`.
pub fn list_fees(conn: &Connection, filter: &FeeFilter, today: NaiveDate) -> Result<Vec<StudentFee>> {
    let mut sql = format!("SELECT {} FROM student_fees", FEE_COLUMNS);
    let mut args: Vec<i64> = Vec::new();
    if let Some(student) = filter.student_id {
        sql.push_str(" WHERE student_id=?1");
        args.push(student);
    }
    sql.push_str(" ORDER BY due_date, id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), fee_from_row)?;
    let mut data = Vec::new();
    for row in rows {
        let mut fee = row?;
        fee.status = fee.status_on(today);
        if filter.status.is_some_and(|s| s != fee.status) {
            continue;
        }
        data.push(fee);
        if filter.limit.is_some_and(|l| data.len() >= l) {
            break;
        }
    }
    Ok(data)
}

/// How an invoice moves toward `paid`.
///
/// `Collected` is money actually received and allocated; `AdministrativeClear`
/// is an audited override that never creates payment rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Collected { payment_id: i64, amount: i64 },
    AdministrativeClear,
}

/// Apply one settlement to `fee` and persist the new paid amount and status.
/// Must run inside the caller's write transaction.
pub(crate) fn apply_settlement(
    conn: &Connection,
    fee: &StudentFee,
    settlement: &Settlement,
    operator: &Operator,
    today: NaiveDate,
) -> Result<StudentFee> {
    let new_paid = match settlement {
        Settlement::Collected { amount, .. } => {
            if fee.paid_amount >= fee.amount {
                return Err(FinanceError::FeeAlreadySettled { fee_id: fee.id });
            }
            let remaining = fee.balance();
            if *amount > remaining {
                return Err(FinanceError::OverAllocation {
                    requested: *amount,
                    remaining,
                });
            }
            fee.paid_amount + amount
        }
        Settlement::AdministrativeClear => {
            if fee.paid_amount >= fee.amount {
                return Ok(fee.clone());
            }
            write_audit(conn, fee, AuditAction::AdministrativeClear, operator, today)?;
            fee.amount
        }
    };
    let status = FeeStatus::derive(fee.amount, new_paid, fee.due_date, today);
    conn.execute(
        "UPDATE student_fees SET paid_amount=?1, status=?2 WHERE id=?3",
        params![new_paid, status, fee.id],
    )?;
    let mut updated = fee.clone();
    updated.paid_amount = new_paid;
    updated.status = status;
    Ok(updated)
}

fn write_audit(
    conn: &Connection,
    fee: &StudentFee,
    action: AuditAction,
    operator: &Operator,
    today: NaiveDate,
) -> Result<()> {
    conn.execute(
        "INSERT INTO fee_audit(student_fee_id, action, previous_status, previous_paid_amount, operator)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![fee.id, action, fee.status_on(today), fee.paid_amount, operator.name],
    )?;
    tracing::warn!(
        fee_id = fee.id,
        action = action.as_str(),
        operator = %operator.name,
        previous_paid = fee.paid_amount,
        "administrative fee override"
    );
    Ok(())
}

/// Manual status change. Only `paid` can be requested; every other status
/// is derived from the paid amount and due date.
pub fn set_fee_status(
    conn: &mut Connection,
    fee_id: i64,
    status: FeeStatus,
    operator: &Operator,
    today: NaiveDate,
) -> Result<StudentFee> {
    if status != FeeStatus::Paid {
        return Err(FinanceError::validation(format!(
            "Status '{}' is derived from payments and due date; only 'paid' can be set",
            status
        )));
    }
    operator.require_elevated("mark fees paid")?;
    with_write_tx(conn, "set_fee_status", |tx| {
        let fee = load_fee(tx, fee_id)?;
        apply_settlement(tx, &fee, &Settlement::AdministrativeClear, operator, today)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BulkAction {
    #[serde(rename = "paid", alias = "markPaid", alias = "mark_paid")]
    MarkPaid,
    #[serde(rename = "delete")]
    Delete,
}

impl std::str::FromStr for BulkAction {
    type Err = FinanceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paid" | "mark-paid" | "mark_paid" | "markpaid" => Ok(BulkAction::MarkPaid),
            "delete" => Ok(BulkAction::Delete),
            other => Err(FinanceError::validation(format!(
                "Unknown bulk action '{}' (use paid|delete)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkOutcome {
    pub action: BulkAction,
    pub requested: usize,
    pub affected: usize,
}

/// Apply `action` to every fee in `fee_ids` in one transaction; any failure
/// leaves every fee untouched.
pub fn bulk_action(
    conn: &mut Connection,
    action: BulkAction,
    fee_ids: &[i64],
    operator: &Operator,
    today: NaiveDate,
) -> Result<BulkOutcome> {
    if fee_ids.is_empty() {
        return Err(FinanceError::validation("No fee ids given"));
    }
    let mut ids = fee_ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    match action {
        BulkAction::MarkPaid => operator.require_elevated("mark fees paid in bulk")?,
        BulkAction::Delete => operator.require_elevated("delete fees")?,
    }

    let affected = with_write_tx(conn, "bulk_fees", |tx| {
        let fees = ids
            .iter()
            .map(|id| load_fee(tx, *id))
            .collect::<Result<Vec<_>>>()?;
        match action {
            BulkAction::MarkPaid => {
                let mut n = 0;
                for fee in &fees {
                    if fee.paid_amount < fee.amount {
                        apply_settlement(tx, fee, &Settlement::AdministrativeClear, operator, today)?;
                        n += 1;
                    }
                }
                Ok(n)
            }
            BulkAction::Delete => {
                let mut referenced = Vec::new();
                for fee in &fees {
                    if allocated_total(tx, fee.id)? > 0 {
                        referenced.push(fee.id);
                    }
                }
                if !referenced.is_empty() {
                    return Err(FinanceError::FeeHasAllocations { fee_ids: referenced });
                }
                for fee in &fees {
                    if has_penalty_links(tx, fee.id)? {
                        return Err(FinanceError::validation(format!(
                            "Fee {} is linked to late-fee records and cannot be deleted",
                            fee.id
                        )));
                    }
                }
                for fee in &fees {
                    write_audit(tx, fee, AuditAction::Delete, operator, today)?;
                    tx.execute("DELETE FROM student_fees WHERE id=?1", params![fee.id])?;
                }
                Ok(fees.len())
            }
        }
    })?;
    tracing::info!(action = ?action, requested = ids.len(), affected, "bulk fee action");
    Ok(BulkOutcome {
        action,
        requested: ids.len(),
        affected,
    })
}

fn has_penalty_links(conn: &Connection, fee_id: i64) -> Result<bool> {
    let n: i64 = conn.query_row(
        "SELECT (SELECT COUNT(*) FROM student_fees WHERE penalty_of=?1)
              + (SELECT COUNT(*) FROM penalty_applications WHERE student_fee_id=?1 OR penalty_fee_id=?1)",
        params![fee_id],
        |r| r.get(0),
    )?;
    Ok(n > 0)
}

/// Sum of recorded allocations (money actually collected) against one fee.
pub fn allocated_total(conn: &Connection, fee_id: i64) -> Result<i64> {
    let total: i64 = conn.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM payment_allocations WHERE student_fee_id=?1",
        params![fee_id],
        |r| r.get(0),
    )?;
    Ok(total)
}

pub fn audit_log(conn: &Connection, fee_id: i64) -> Result<Vec<FeeAuditEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, student_fee_id, action, previous_status, previous_paid_amount, operator, created_at
         FROM fee_audit WHERE student_fee_id=?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![fee_id], |r| {
        Ok(FeeAuditEntry {
            id: r.get(0)?,
            student_fee_id: r.get(1)?,
            action: r.get(2)?,
            previous_status: r.get(3)?,
            previous_paid_amount: r.get(4)?,
            operator: r.get(5)?,
            created_at: r.get(6)?,
        })
    })?;
    let mut data = Vec::new();
    for row in rows {
        data.push(row?);
    }
    Ok(data)
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentStatement {
    pub student_id: i64,
    pub fees: Vec<StudentFee>,
    pub total_billed: i64,
    pub total_paid: i64,
    pub outstanding: i64,
    pub overdue_balance: i64,
    pub payments_received: i64,
    pub unallocated_credit: i64,
    pub active_awards: i64,
}

pub fn student_statement(conn: &Connection, student_id: i64, today: NaiveDate) -> Result<StudentStatement> {
    let fees = list_fees(
        conn,
        &FeeFilter {
            student_id: Some(student_id),
            ..Default::default()
        },
        today,
    )?;
    let total_billed = fees.iter().map(|f| f.amount).sum();
    let total_paid = fees.iter().map(|f| f.paid_amount).sum();
    let overdue_balance = fees
        .iter()
        .filter(|f| f.status != FeeStatus::Paid && f.due_date < today)
        .map(StudentFee::balance)
        .sum();
    let (payments_received, allocated): (i64, i64) = conn.query_row(
        "SELECT COALESCE(SUM(p.amount), 0),
                COALESCE((SELECT SUM(a.amount) FROM payment_allocations a
                          JOIN payments p2 ON a.payment_id=p2.id
                          WHERE p2.student_id=?1 AND p2.status='completed'), 0)
         FROM payments p WHERE p.student_id=?1 AND p.status='completed'",
        params![student_id],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    let active_awards: i64 = conn.query_row(
        "SELECT COALESCE(SUM(awarded_amount), 0) FROM student_scholarships
         WHERE student_id=?1 AND status='active'",
        params![student_id],
        |r| r.get(0),
    )?;
    Ok(StudentStatement {
        student_id,
        total_billed,
        total_paid,
        outstanding: total_billed - total_paid,
        overdue_balance,
        payments_received,
        unallocated_credit: payments_received - allocated,
        active_awards,
        fees,
    })
}

fn add(conn: &mut Connection, sub: &clap::ArgMatches, session: &Session) -> anyhow::Result<()> {
    let req = NewFee {
        student_id: parse_id(sub.get_one::<String>("student").unwrap())?,
        amount: parse_amount(sub.get_one::<String>("amount").unwrap())?,
        due_date: parse_date(sub.get_one::<String>("due").unwrap())?,
        description: sub.get_one::<String>("description").unwrap().to_string(),
        fee_type: sub
            .get_one::<String>("type")
            .map(|s| s.parse::<FeeType>())
            .transpose()?,
        notes: sub.get_one::<String>("notes").map(|s| s.to_string()),
    };
    let fee = create_fee(conn, &req, session.today)?;
    println!(
        "Created fee #{} for student {}: {} due {} ({})",
        fee.id,
        fee.student_id,
        fmt_cents(fee.amount),
        fee.due_date,
        fee.status
    );
    Ok(())
}

fn fee_rows(fees: &[StudentFee]) -> Vec<Vec<String>> {
    fees.iter()
        .map(|f| {
            vec![
                f.id.to_string(),
                f.student_id.to_string(),
                f.fee_type.to_string(),
                f.description.clone(),
                fmt_cents(f.amount),
                fmt_cents(f.paid_amount),
                fmt_cents(f.balance()),
                f.due_date.to_string(),
                f.status.to_string(),
            ]
        })
        .collect()
}

const FEE_HEADERS: &[&str] = &[
    "ID", "Student", "Type", "Description", "Amount", "Paid", "Balance", "Due", "Status",
];

fn list(conn: &Connection, sub: &clap::ArgMatches, session: &Session) -> anyhow::Result<()> {
    let filter = FeeFilter {
        student_id: sub.get_one::<String>("student").map(|s| parse_id(s)).transpose()?,
        status: sub
            .get_one::<String>("status")
            .map(|s| s.parse::<FeeStatus>())
            .transpose()?,
        limit: sub.get_one::<usize>("limit").copied(),
    };
    let data = list_fees(conn, &filter, session.today)?;
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
        println!("{}", pretty_table(FEE_HEADERS, fee_rows(&data)));
    }
    Ok(())
}

fn show(conn: &Connection, sub: &clap::ArgMatches, session: &Session) -> anyhow::Result<()> {
    let id = parse_id(sub.get_one::<String>("id").unwrap())?;
    let mut fee = load_fee(conn, id)?;
    fee.status = fee.status_on(session.today);
    println!("{}", pretty_table(FEE_HEADERS, fee_rows(std::slice::from_ref(&fee))));
    let allocations = super::allocations::allocations_for_fee(conn, id)?;
    if !allocations.is_empty() {
        let rows = allocations
            .iter()
            .map(|a| vec![a.id.to_string(), a.payment_id.to_string(), fmt_cents(a.amount)])
            .collect();
        println!("{}", pretty_table(&["Allocation", "Payment", "Amount"], rows));
    }
    let audit = audit_log(conn, id)?;
    if !audit.is_empty() {
        let rows = audit
            .iter()
            .map(|e| {
                vec![
                    e.created_at.clone(),
                    e.action.to_string(),
                    e.previous_status.to_string(),
                    fmt_cents(e.previous_paid_amount),
                    e.operator.clone(),
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(&["When", "Override", "Prev Status", "Prev Paid", "Operator"], rows)
        );
    }
    Ok(())
}

fn status(conn: &mut Connection, sub: &clap::ArgMatches, session: &Session) -> anyhow::Result<()> {
    let id = parse_id(sub.get_one::<String>("id").unwrap())?;
    let status = sub.get_one::<String>("status").unwrap().parse::<FeeStatus>()?;
    let fee = set_fee_status(conn, id, status, &session.operator, session.today)?;
    println!("Fee #{} is now {}", fee.id, fee.status);
    Ok(())
}

fn bulk(conn: &mut Connection, sub: &clap::ArgMatches, session: &Session) -> anyhow::Result<()> {
    let action = sub.get_one::<String>("action").unwrap().parse::<BulkAction>()?;
    let ids = parse_id_list(sub.get_one::<String>("ids").unwrap())?;
    let outcome = bulk_action(conn, action, &ids, &session.operator, session.today)?;
    println!(
        "Bulk {:?}: {} of {} fees affected",
        outcome.action, outcome.affected, outcome.requested
    );
    Ok(())
}

fn statement(conn: &Connection, sub: &clap::ArgMatches, session: &Session) -> anyhow::Result<()> {
    let student = parse_id(sub.get_one::<String>("student").unwrap())?;
    let st = student_statement(conn, student, session.today)?;
    if maybe_print_json(sub.get_flag("json"), false, &st)? {
        return Ok(());
    }
    println!("{}", pretty_table(FEE_HEADERS, fee_rows(&st.fees)));
    let ccy = &session.currency;
    println!(
        "{}",
        pretty_table(
            &["Billed", "Paid", "Outstanding", "Overdue", "Received", "Unallocated", "Awards", "CCY"],
            vec![vec![
                fmt_cents(st.total_billed),
                fmt_cents(st.total_paid),
                fmt_cents(st.outstanding),
                fmt_cents(st.overdue_balance),
                fmt_cents(st.payments_received),
                fmt_cents(st.unallocated_credit),
                fmt_cents(st.active_awards),
                ccy.clone(),
            ]],
        )
    );
    Ok(())
}
