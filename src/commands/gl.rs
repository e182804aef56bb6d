// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Chart of accounts and double-entry journal.
//!
//! Every write to `journal_entries`/`journal_lines` goes through
//! [`insert_journal_entry`], which refuses anything that does not balance.

use super::Session;
use crate::db::with_write_tx;
use crate::error::{FinanceError, Result};
use crate::models::{AccountType, ChartOfAccount, JournalEntry, JournalLine, NormalBalance};
use crate::money::{fmt_cents, fmt_money, parse_amount};
use crate::utils::{
    id_for_account_code, maybe_print_json, parse_date, parse_id, pretty_table, require_text,
    validate_code,
};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches, session: &Session) -> anyhow::Result<()> {
    match m.subcommand() {
        Some(("account-add", sub)) => account_add(conn, sub)?,
        Some(("accounts", sub)) => accounts(conn, sub)?,
        Some(("account-active", sub)) => account_active(conn, sub)?,
        Some(("post", sub)) => post(conn, sub, session)?,
        Some(("show", sub)) => show(conn, sub)?,
        Some(("journal", sub)) => journal(conn, sub, session)?,
        Some(("trial-balance", sub)) => trial(conn, sub)?,
        _ => {}
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct NewAccount {
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    #[serde(default)]
    pub normal_balance: Option<NormalBalance>,
    #[serde(default)]
    pub allow_contra: bool,
}

pub fn create_account(conn: &mut Connection, req: &NewAccount) -> Result<ChartOfAccount> {
    let code = req.code.trim().to_string();
    validate_code("account", &code)?;
    let name = require_text("account name", &req.name)?;
    let expected = req.account_type.normal_balance();
    let normal = match req.normal_balance {
        Some(nb) if nb != expected => {
            if !req.allow_contra {
                return Err(FinanceError::InconsistentNormalBalance {
                    account_type: req.account_type.to_string(),
                    expected: expected.to_string(),
                    requested: nb.to_string(),
                });
            }
            tracing::warn!(
                code = %code,
                account_type = %req.account_type,
                normal_balance = %nb,
                "contra account created with non-standard normal balance"
            );
            nb
        }
        Some(nb) => nb,
        None => expected,
    };
    let account = with_write_tx(conn, "create_account", |tx| {
        let taken: Option<i64> = tx
            .query_row(
                "SELECT id FROM gl_accounts WHERE account_code=?1",
                params![code],
                |r| r.get(0),
            )
            .optional()?;
        if taken.is_some() {
            return Err(FinanceError::DuplicateCode {
                entity: "account",
                code: code.clone(),
            });
        }
        tx.execute(
            "INSERT INTO gl_accounts(account_code, account_name, account_type, normal_balance, is_active)
             VALUES (?1, ?2, ?3, ?4, 1)",
            params![code, name, req.account_type, normal],
        )?;
        load_account(tx, tx.last_insert_rowid())
    })?;
    tracing::info!(account_id = account.id, code = %account.account_code, "account created");
    Ok(account)
}

fn account_from_row(r: &Row<'_>) -> rusqlite::Result<ChartOfAccount> {
    Ok(ChartOfAccount {
        id: r.get(0)?,
        account_code: r.get(1)?,
        account_name: r.get(2)?,
        account_type: r.get(3)?,
        normal_balance: r.get(4)?,
        is_active: r.get::<_, i64>(5)? != 0,
    })
}

/// Inactive accounts keep their history and trial-balance rows but reject
/// new journal lines.
pub fn set_account_active(conn: &mut Connection, id: i64, active: bool) -> Result<ChartOfAccount> {
    let account = with_write_tx(conn, "set_account_active", |tx| {
        load_account(tx, id)?;
        tx.execute(
            "UPDATE gl_accounts SET is_active=?1 WHERE id=?2",
            params![i64::from(active), id],
        )?;
        load_account(tx, id)
    })?;
    tracing::info!(account_id = id, active, "account activity changed");
    Ok(account)
}

pub fn load_account(conn: &Connection, id: i64) -> Result<ChartOfAccount> {
    conn.query_row(
        "SELECT id, account_code, account_name, account_type, normal_balance, is_active
         FROM gl_accounts WHERE id=?1",
        params![id],
        account_from_row,
    )
    .optional()?
    .ok_or(FinanceError::NotFound {
        entity: "account",
        id,
    })
}

pub fn list_accounts(conn: &Connection) -> Result<Vec<ChartOfAccount>> {
    let mut stmt = conn.prepare(
        "SELECT id, account_code, account_name, account_type, normal_balance, is_active
         FROM gl_accounts ORDER BY account_code",
    )?;
    let rows = stmt.query_map([], account_from_row)?;
    let mut data = Vec::new();
    for row in rows {
        data.push(row?);
    }
    Ok(data)
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct NewJournalLine {
    pub account_id: i64,
    #[serde(default)]
    pub debit: i64,
    #[serde(default)]
    pub credit: i64,
}

impl From<NewJournalLine> for JournalLine {
    fn from(l: NewJournalLine) -> Self {
        JournalLine {
            account_id: l.account_id,
            debit: l.debit,
            credit: l.credit,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct NewJournalEntry {
    pub entry_date: NaiveDate,
    pub memo: String,
    #[serde(default)]
    pub source_ref: Option<String>,
    pub lines: Vec<NewJournalLine>,
}

fn validate_lines(conn: &Connection, lines: &[JournalLine]) -> Result<()> {
    if lines.is_empty() {
        return Err(FinanceError::validation("Journal entry has no lines"));
    }
    let mut debits = 0i64;
    let mut credits = 0i64;
    for (index, line) in lines.iter().enumerate() {
        let bad = |reason: &str| FinanceError::InvalidJournalLine {
            index,
            reason: reason.to_string(),
        };
        if line.debit < 0 || line.credit < 0 {
            return Err(bad("negative amount"));
        }
        match (line.debit > 0, line.credit > 0) {
            (true, true) => return Err(bad("both debit and credit set")),
            (false, false) => return Err(bad("neither debit nor credit set")),
            _ => {}
        }
        let active: Option<i64> = conn
            .query_row(
                "SELECT is_active FROM gl_accounts WHERE id=?1",
                params![line.account_id],
                |r| r.get(0),
            )
            .optional()?;
        match active {
            None => return Err(bad(&format!("unknown account {}", line.account_id))),
            Some(0) => return Err(bad(&format!("account {} is inactive", line.account_id))),
            Some(_) => {}
        }
        debits = debits
            .checked_add(line.debit)
            .ok_or_else(|| bad("debit total overflows"))?;
        credits = credits
            .checked_add(line.credit)
            .ok_or_else(|| bad("credit total overflows"))?;
    }
    if debits != credits {
        return Err(FinanceError::UnbalancedEntry { debits, credits });
    }
    Ok(())
}

/// Validate and write one journal entry on an open transaction.
///
/// Callers that must stamp another row with the entry id (donation posting)
/// use this so both writes share one commit.
pub(crate) fn insert_journal_entry(
    conn: &Connection,
    entry_date: NaiveDate,
    memo: &str,
    source_ref: Option<&str>,
    lines: &[JournalLine],
) -> Result<JournalEntry> {
    let memo = require_text("memo", memo)?;
    validate_lines(conn, lines)?;
    conn.execute(
        "INSERT INTO journal_entries(entry_date, memo, source_ref) VALUES (?1, ?2, ?3)",
        params![entry_date, memo, source_ref],
    )?;
    let entry_id = conn.last_insert_rowid();
    let mut insert = conn.prepare_cached(
        "INSERT INTO journal_lines(journal_entry_id, account_id, debit, credit) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for line in lines {
        insert.execute(params![entry_id, line.account_id, line.debit, line.credit])?;
    }
    Ok(JournalEntry {
        id: entry_id,
        entry_date,
        memo,
        source_ref: source_ref.map(str::to_string),
        lines: lines.to_vec(),
    })
}

pub fn post_journal_entry(conn: &mut Connection, req: &NewJournalEntry) -> Result<JournalEntry> {
    let lines: Vec<JournalLine> = req.lines.iter().copied().map(JournalLine::from).collect();
    let entry = with_write_tx(conn, "post_journal_entry", |tx| {
        insert_journal_entry(tx, req.entry_date, &req.memo, req.source_ref.as_deref(), &lines)
    })?;
    tracing::info!(
        entry_id = entry.id,
        lines = entry.lines.len(),
        total = entry.total_debits(),
        "journal entry posted"
    );
    Ok(entry)
}

pub fn get_journal_entry(conn: &Connection, id: i64) -> Result<JournalEntry> {
    let head = conn
        .query_row(
            "SELECT id, entry_date, memo, source_ref FROM journal_entries WHERE id=?1",
            params![id],
            |r| {
                Ok(JournalEntry {
                    id: r.get(0)?,
                    entry_date: r.get(1)?,
                    memo: r.get(2)?,
                    source_ref: r.get(3)?,
                    lines: Vec::new(),
                })
            },
        )
        .optional()?;
    let mut entry = head.ok_or(FinanceError::NotFound {
        entity: "journal entry",
        id,
    })?;
    let mut stmt = conn.prepare(
        "SELECT account_id, debit, credit FROM journal_lines WHERE journal_entry_id=?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![id], |r| {
        Ok(JournalLine {
            account_id: r.get(0)?,
            debit: r.get(1)?,
            credit: r.get(2)?,
        })
    })?;
    for row in rows {
        entry.lines.push(row?);
    }
    Ok(entry)
}

pub fn list_journal_entries(conn: &Connection) -> Result<Vec<JournalEntry>> {
    let mut stmt = conn.prepare("SELECT id FROM journal_entries ORDER BY entry_date, id")?;
    let ids = stmt.query_map([], |r| r.get::<_, i64>(0))?;
    let mut data = Vec::new();
    for id in ids {
        data.push(get_journal_entry(conn, id?)?);
    }
    Ok(data)
}

#[derive(Debug, Clone, Serialize)]
pub struct TrialBalanceRow {
    pub account_id: i64,
    pub account_code: String,
    pub account_name: String,
    pub normal_balance: NormalBalance,
    pub debits: i64,
    pub credits: i64,
    /// Balance on the account's normal side.
    pub balance: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrialBalance {
    pub rows: Vec<TrialBalanceRow>,
    pub total_debits: i64,
    pub total_credits: i64,
}

pub fn trial_balance(conn: &Connection) -> Result<TrialBalance> {
    let mut stmt = conn.prepare(
        "SELECT a.id, a.account_code, a.account_name, a.normal_balance,
                COALESCE(SUM(l.debit), 0), COALESCE(SUM(l.credit), 0)
         FROM gl_accounts a
         LEFT JOIN journal_lines l ON l.account_id = a.id
         GROUP BY a.id
         ORDER BY a.account_code",
    )?;
    let rows = stmt.query_map([], |r| {
        let normal: NormalBalance = r.get(3)?;
        let debits: i64 = r.get(4)?;
        let credits: i64 = r.get(5)?;
        Ok(TrialBalanceRow {
            account_id: r.get(0)?,
            account_code: r.get(1)?,
            account_name: r.get(2)?,
            normal_balance: normal,
            debits,
            credits,
            balance: match normal {
                NormalBalance::Debit => debits - credits,
                NormalBalance::Credit => credits - debits,
            },
        })
    })?;
    let mut out = TrialBalance {
        rows: Vec::new(),
        total_debits: 0,
        total_credits: 0,
    };
    for row in rows {
        let row = row?;
        out.total_debits += row.debits;
        out.total_credits += row.credits;
        out.rows.push(row);
    }
    Ok(out)
}

/// Parse `CODE:DEBIT:CREDIT` with amounts in currency units; an empty side
/// means zero.
fn parse_line(conn: &Connection, raw: &str) -> anyhow::Result<NewJournalLine> {
    let parts: Vec<&str> = raw.split(':').collect();
    if parts.len() != 3 {
        anyhow::bail!("Invalid line '{}', expected CODE:DEBIT:CREDIT", raw);
    }
    let side = |s: &str| -> anyhow::Result<i64> {
        if s.trim().is_empty() {
            Ok(0)
        } else {
            Ok(parse_amount(s)?)
        }
    };
    Ok(NewJournalLine {
        account_id: id_for_account_code(conn, parts[0])?,
        debit: side(parts[1])?,
        credit: side(parts[2])?,
    })
}

fn account_active(conn: &mut Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let id = id_for_account_code(conn, sub.get_one::<String>("code").unwrap())?;
    let a = set_account_active(conn, id, !sub.get_flag("off"))?;
    println!(
        "Account {} is now {}",
        a.account_code,
        if a.is_active { "active" } else { "inactive" }
    );
    Ok(())
}

fn account_add(conn: &mut Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let req = NewAccount {
        code: sub.get_one::<String>("code").unwrap().to_string(),
        name: sub.get_one::<String>("name").unwrap().to_string(),
        account_type: sub.get_one::<String>("type").unwrap().parse()?,
        normal_balance: sub
            .get_one::<String>("normal")
            .map(|s| s.parse())
            .transpose()?,
        allow_contra: sub.get_flag("contra"),
    };
    let a = create_account(conn, &req)?;
    println!(
        "Added account {} {} ({}, normal {})",
        a.account_code, a.account_name, a.account_type, a.normal_balance
    );
    Ok(())
}

fn accounts(conn: &Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let data = list_accounts(conn)?;
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
        let rows = data
            .iter()
            .map(|a| {
                vec![
                    a.account_code.clone(),
                    a.account_name.clone(),
                    a.account_type.to_string(),
                    a.normal_balance.to_string(),
                    if a.is_active { "yes".into() } else { "no".into() },
                ]
            })
            .collect();
        println!("{}", pretty_table(&["Code", "Name", "Type", "Normal", "Active"], rows));
    }
    Ok(())
}

fn post(conn: &mut Connection, sub: &clap::ArgMatches, session: &Session) -> anyhow::Result<()> {
    let mut lines = Vec::new();
    if let Some(vals) = sub.get_many::<String>("line") {
        for raw in vals {
            lines.push(parse_line(conn, raw)?);
        }
    }
    let entry_date = match sub.get_one::<String>("date") {
        Some(s) => parse_date(s)?,
        None => session.today,
    };
    let req = NewJournalEntry {
        entry_date,
        memo: sub.get_one::<String>("memo").unwrap().to_string(),
        source_ref: sub.get_one::<String>("source").cloned(),
        lines,
    };
    let e = post_journal_entry(conn, &req)?;
    println!(
        "Posted journal entry #{} on {} ({} lines, {})",
        e.id,
        e.entry_date,
        e.lines.len(),
        fmt_cents(e.total_debits())
    );
    Ok(())
}

fn show(conn: &Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let e = get_journal_entry(conn, parse_id(sub.get_one::<String>("id").unwrap())?)?;
    if !maybe_print_json(sub.get_flag("json"), false, &e)? {
        println!("#{} {} {}", e.id, e.entry_date, e.memo);
        let mut rows = Vec::with_capacity(e.lines.len());
        for l in &e.lines {
            let a = load_account(conn, l.account_id)?;
            rows.push(vec![
                a.account_code,
                a.account_name,
                if l.debit > 0 { fmt_cents(l.debit) } else { String::new() },
                if l.credit > 0 { fmt_cents(l.credit) } else { String::new() },
            ]);
        }
        println!("{}", pretty_table(&["Code", "Account", "Debit", "Credit"], rows));
    }
    Ok(())
}

fn journal(conn: &Connection, sub: &clap::ArgMatches, session: &Session) -> anyhow::Result<()> {
    let data = list_journal_entries(conn)?;
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
        let rows = data
            .iter()
            .map(|e| {
                vec![
                    e.id.to_string(),
                    e.entry_date.to_string(),
                    e.memo.clone(),
                    e.source_ref.clone().unwrap_or_default(),
                    e.lines.len().to_string(),
                    fmt_money(e.total_debits(), &session.currency),
                ]
            })
            .collect();
        println!("{}", pretty_table(&["ID", "Date", "Memo", "Source", "Lines", "Total"], rows));
    }
    Ok(())
}

fn trial(conn: &Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let tb = trial_balance(conn)?;
    if !maybe_print_json(sub.get_flag("json"), false, &tb)? {
        let mut rows: Vec<Vec<String>> = tb
            .rows
            .iter()
            .map(|r| {
                vec![
                    r.account_code.clone(),
                    r.account_name.clone(),
                    fmt_cents(r.debits),
                    fmt_cents(r.credits),
                    format!("{} {}", fmt_cents(r.balance), r.normal_balance),
                ]
            })
            .collect();
        rows.push(vec![
            "TOTAL".into(),
            String::new(),
            fmt_cents(tb.total_debits),
            fmt_cents(tb.total_credits),
            String::new(),
        ]);
        println!(
            "{}",
            pretty_table(&["Code", "Account", "Debits", "Credits", "Balance"], rows)
        );
    }
    Ok(())
}
