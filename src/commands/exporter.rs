// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use super::Session;
use crate::models::FeeStatus;
use crate::money::fmt_cents;
use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::json;

pub fn handle(conn: &Connection, m: &clap::ArgMatches, session: &Session) -> Result<()> {
    match m.subcommand() {
        Some(("fees", sub)) => export_fees(conn, sub, session.today),
        Some(("journal", sub)) => export_journal(conn, sub),
        _ => Ok(()),
    }
}

fn target(sub: &clap::ArgMatches) -> (String, String) {
    (
        sub.get_one::<String>("format").unwrap().to_lowercase(),
        sub.get_one::<String>("out").unwrap().to_string(),
    )
}

pub fn export_fees(conn: &Connection, sub: &clap::ArgMatches, today: NaiveDate) -> Result<()> {
    let (fmt, out) = target(sub);
    write_fees(conn, &fmt, &out, today)?;
    println!("Exported fees to {}", out);
    Ok(())
}

/// Fee rows with status derived against `today`, not the stored column.
pub fn write_fees(conn: &Connection, fmt: &str, out: &str, today: NaiveDate) -> Result<()> {
    let mut stmt = conn.prepare(
        "SELECT id, student_id, fee_type, description, due_date, amount, paid_amount
         FROM student_fees ORDER BY student_id, due_date, id",
    )?;
    let rows = stmt.query_map([], |r| {
        let due: NaiveDate = r.get(4)?;
        let amount: i64 = r.get(5)?;
        let paid: i64 = r.get(6)?;
        Ok((
            r.get::<_, i64>(0)?,
            r.get::<_, i64>(1)?,
            r.get::<_, String>(2)?,
            r.get::<_, String>(3)?,
            due.to_string(),
            amount,
            paid,
            FeeStatus::derive(amount, paid, due, today).to_string(),
        ))
    })?;

    match fmt {
        "csv" => {
            let mut wtr = csv::Writer::from_path(out)?;
            wtr.write_record([
                "id", "student_id", "fee_type", "description", "due_date", "amount", "paid", "status",
            ])?;
            for row in rows {
                let (id, student, ty, desc, due, amount, paid, status) = row?;
                wtr.write_record([
                    id.to_string(),
                    student.to_string(),
                    ty,
                    desc,
                    due,
                    fmt_cents(amount),
                    fmt_cents(paid),
                    status,
                ])?;
            }
            wtr.flush()?;
        }
        "json" => {
            let mut items = Vec::new();
            for row in rows {
                let (id, student, ty, desc, due, amount, paid, status) = row?;
                items.push(json!({
                    "id": id, "studentId": student, "feeType": ty, "description": desc,
                    "dueDate": due, "amount": amount, "paidAmount": paid, "status": status
                }));
            }
            std::fs::write(out, serde_json::to_string_pretty(&items)?)?;
        }
        _ => anyhow::bail!("Unknown format: {} (use csv|json)", fmt),
    }
    Ok(())
}

pub fn export_journal(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let (fmt, out) = target(sub);
    write_journal(conn, &fmt, &out)?;
    println!("Exported journal to {}", out);
    Ok(())
}

/// One row per journal line, flattened with its entry header.
pub fn write_journal(conn: &Connection, fmt: &str, out: &str) -> Result<()> {
    let mut stmt = conn.prepare(
        "SELECT e.id, e.entry_date, e.memo, e.source_ref, a.account_code, l.debit, l.credit
         FROM journal_lines l
         JOIN journal_entries e ON e.id = l.journal_entry_id
         JOIN gl_accounts a ON a.id = l.account_id
         ORDER BY e.entry_date, e.id, l.id",
    )?;
    let rows = stmt.query_map([], |r| {
        Ok((
            r.get::<_, i64>(0)?,
            r.get::<_, String>(1)?,
            r.get::<_, String>(2)?,
            r.get::<_, Option<String>>(3)?,
            r.get::<_, String>(4)?,
            r.get::<_, i64>(5)?,
            r.get::<_, i64>(6)?,
        ))
    })?;

    match fmt {
        "csv" => {
            let mut wtr = csv::Writer::from_path(out)?;
            wtr.write_record(["entry", "date", "memo", "source", "account", "debit", "credit"])?;
            for row in rows {
                let (id, date, memo, source, account, debit, credit) = row?;
                wtr.write_record([
                    id.to_string(),
                    date,
                    memo,
                    source.unwrap_or_default(),
                    account,
                    fmt_cents(debit),
                    fmt_cents(credit),
                ])?;
            }
            wtr.flush()?;
        }
        "json" => {
            let mut items = Vec::new();
            for row in rows {
                let (id, date, memo, source, account, debit, credit) = row?;
                items.push(json!({
                    "entryId": id, "date": date, "memo": memo, "sourceRef": source,
                    "account": account, "debit": debit, "credit": credit
                }));
            }
            std::fs::write(out, serde_json::to_string_pretty(&items)?)?;
        }
        _ => anyhow::bail!("Unknown format: {} (use csv|json)", fmt),
    }
    Ok(())
}
