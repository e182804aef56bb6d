// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use super::Session;
use super::gl::insert_journal_entry;
use crate::config::FinanceConfig;
use crate::db::with_write_tx;
use crate::error::{FinanceError, Result};
use crate::models::{Donation, Donor, DonorType, JournalEntry, JournalLine, PaymentMethod};
use crate::money::{fmt_cents, parse_amount, require_positive};
use crate::utils::{
    id_for_account_code, id_for_donor_code, maybe_print_json, parse_date, parse_id, pretty_table,
    require_text, validate_code,
};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches, session: &Session) -> anyhow::Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => add(conn, sub)?,
        Some(("list", sub)) => list(conn, sub)?,
        Some(("give", sub)) => give(conn, sub, session)?,
        Some(("donations", sub)) => donations(conn, sub)?,
        Some(("post", sub)) => post(conn, sub)?,
        Some(("active", sub)) => active(conn, sub)?,
        _ => {}
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct NewDonor {
    pub donor_code: String,
    pub name: String,
    pub donor_type: DonorType,
}

pub fn create_donor(conn: &mut Connection, req: &NewDonor) -> Result<Donor> {
    let code = req.donor_code.trim().to_string();
    validate_code("donor", &code)?;
    let name = require_text("donor name", &req.name)?;
    let donor = with_write_tx(conn, "create_donor", |tx| {
        let taken: Option<i64> = tx
            .query_row("SELECT id FROM donors WHERE donor_code=?1", params![code], |r| r.get(0))
            .optional()?;
        if taken.is_some() {
            return Err(FinanceError::DuplicateCode {
                entity: "donor",
                code: code.clone(),
            });
        }
        tx.execute(
            "INSERT INTO donors(donor_code, name, donor_type) VALUES (?1, ?2, ?3)",
            params![code, name, req.donor_type],
        )?;
        load_donor(tx, tx.last_insert_rowid())
    })?;
    tracing::info!(donor_id = donor.id, code = %donor.donor_code, "donor created");
    Ok(donor)
}

fn donor_from_row(r: &Row<'_>) -> rusqlite::Result<Donor> {
    Ok(Donor {
        id: r.get(0)?,
        donor_code: r.get(1)?,
        name: r.get(2)?,
        donor_type: r.get(3)?,
        total_donations: r.get(4)?,
        last_donation_date: r.get(5)?,
        is_active: r.get::<_, i64>(6)? != 0,
    })
}

const DONOR_COLUMNS: &str =
    "id, donor_code, name, donor_type, total_donations, last_donation_date, is_active";

pub fn load_donor(conn: &Connection, id: i64) -> Result<Donor> {
    let sql = format!("SELECT {} FROM donors WHERE id=?1", DONOR_COLUMNS);
    conn.query_row(&sql, params![id], donor_from_row)
        .optional()?
        .ok_or(FinanceError::NotFound { entity: "donor", id })
}

pub fn list_donors(conn: &Connection) -> Result<Vec<Donor>> {
    let sql = format!("SELECT {} FROM donors ORDER BY donor_code", DONOR_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], donor_from_row)?;
    let mut data = Vec::new();
    for row in rows {
        data.push(row?);
    }
    Ok(data)
}

/// Retire or restore a donor. Inactive donors keep their history but take no
/// new donations.
pub fn set_donor_active(conn: &mut Connection, id: i64, active: bool) -> Result<Donor> {
    let donor = with_write_tx(conn, "set_donor_active", |tx| {
        load_donor(tx, id)?;
        tx.execute(
            "UPDATE donors SET is_active=?1 WHERE id=?2",
            params![i64::from(active), id],
        )?;
        load_donor(tx, id)
    })?;
    tracing::info!(donor_id = id, active, "donor activity changed");
    Ok(donor)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct NewDonation {
    pub donor_id: i64,
    pub amount: i64,
    pub donation_date: NaiveDate,
    pub purpose: String,
    pub payment_method: PaymentMethod,
}

/// Insert a donation and roll it into the donor's running totals in the
/// same transaction.
pub fn record_donation(conn: &mut Connection, req: &NewDonation) -> Result<Donation> {
    require_positive("donation amount", req.amount)?;
    let purpose = require_text("purpose", &req.purpose)?;
    let donation = with_write_tx(conn, "record_donation", |tx| {
        let donor = load_donor(tx, req.donor_id)?;
        if !donor.is_active {
            return Err(FinanceError::validation(format!(
                "Donor {} is inactive",
                donor.donor_code
            )));
        }
        tx.execute(
            "INSERT INTO donations(donor_id, amount, donation_date, purpose, payment_method)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![donor.id, req.amount, req.donation_date, purpose, req.payment_method],
        )?;
        let donation_id = tx.last_insert_rowid();
        let last = match donor.last_donation_date {
            Some(d) if d > req.donation_date => d,
            _ => req.donation_date,
        };
        let total = donor
            .total_donations
            .checked_add(req.amount)
            .ok_or_else(|| FinanceError::validation("Donor total overflows"))?;
        tx.execute(
            "UPDATE donors SET total_donations=?1, last_donation_date=?2 WHERE id=?3",
            params![total, last, donor.id],
        )?;
        load_donation(tx, donation_id)
    })?;
    tracing::info!(
        donation_id = donation.id,
        donor_id = donation.donor_id,
        amount = donation.amount,
        "donation recorded"
    );
    Ok(donation)
}

fn donation_from_row(r: &Row<'_>) -> rusqlite::Result<Donation> {
    Ok(Donation {
        id: r.get(0)?,
        donor_id: r.get(1)?,
        amount: r.get(2)?,
        donation_date: r.get(3)?,
        purpose: r.get(4)?,
        payment_method: r.get(5)?,
        gl_journal_entry_id: r.get(6)?,
    })
}

const DONATION_COLUMNS: &str =
    "id, donor_id, amount, donation_date, purpose, payment_method, gl_journal_entry_id";

pub fn load_donation(conn: &Connection, id: i64) -> Result<Donation> {
    let sql = format!("SELECT {} FROM donations WHERE id=?1", DONATION_COLUMNS);
    conn.query_row(&sql, params![id], donation_from_row)
        .optional()?
        .ok_or(FinanceError::NotFound {
            entity: "donation",
            id,
        })
}

pub fn list_donations(conn: &Connection, donor_id: Option<i64>) -> Result<Vec<Donation>> {
    let mut sql = format!("SELECT {} FROM donations", DONATION_COLUMNS);
    if donor_id.is_some() {
        sql.push_str(" WHERE donor_id=?1");
    }
    sql.push_str(" ORDER BY donation_date, id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = match donor_id {
        Some(d) => stmt.query_map(params![d], donation_from_row)?,
        None => stmt.query_map([], donation_from_row)?,
    };
    let mut data = Vec::new();
    for row in rows {
        data.push(row?);
    }
    Ok(data)
}

#[derive(Debug, Clone, Serialize)]
pub struct PostedDonation {
    pub donation: Donation,
    pub journal_entry: JournalEntry,
}

/// Post a donation to the GL exactly once: debit cash, credit donation
/// revenue, then stamp the donation with the entry id in the same commit.
pub fn post_to_gl(conn: &mut Connection, donation_id: i64) -> Result<PostedDonation> {
    let cfg = FinanceConfig::load(conn)?;
    let posted = with_write_tx(conn, "post_donation", |tx| {
        let donation = load_donation(tx, donation_id)?;
        if let Some(entry_id) = donation.gl_journal_entry_id {
            return Err(FinanceError::AlreadyPosted {
                donation_id,
                journal_entry_id: entry_id,
            });
        }
        let cash = id_for_account_code(tx, &cfg.cash_account)?;
        let revenue = id_for_account_code(tx, &cfg.donation_revenue_account)?;
        let memo = format!("Donation #{}: {}", donation.id, donation.purpose);
        let source = format!("donation:{}", donation.id);
        let entry = insert_journal_entry(
            tx,
            donation.donation_date,
            &memo,
            Some(&source),
            &[
                JournalLine {
                    account_id: cash,
                    debit: donation.amount,
                    credit: 0,
                },
                JournalLine {
                    account_id: revenue,
                    debit: 0,
                    credit: donation.amount,
                },
            ],
        )?;
        let stamped = tx.execute(
            "UPDATE donations SET gl_journal_entry_id=?1 WHERE id=?2 AND gl_journal_entry_id IS NULL",
            params![entry.id, donation.id],
        )?;
        if stamped != 1 {
            let current = load_donation(tx, donation_id)?;
            return Err(FinanceError::AlreadyPosted {
                donation_id,
                journal_entry_id: current.gl_journal_entry_id.unwrap_or_default(),
            });
        }
        Ok(PostedDonation {
            donation: load_donation(tx, donation_id)?,
            journal_entry: entry,
        })
    })?;
    tracing::info!(
        donation_id,
        entry_id = posted.journal_entry.id,
        amount = posted.donation.amount,
        "donation posted to GL"
    );
    Ok(posted)
}

fn add(conn: &mut Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let req = NewDonor {
        donor_code: sub.get_one::<String>("code").unwrap().to_string(),
        name: sub.get_one::<String>("name").unwrap().to_string(),
        donor_type: sub.get_one::<String>("type").unwrap().parse()?,
    };
    let d = create_donor(conn, &req)?;
    println!("Added donor {} ({}, {})", d.donor_code, d.name, d.donor_type);
    Ok(())
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let data = list_donors(conn)?;
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
        let rows = data
            .iter()
            .map(|d| {
                vec![
                    d.donor_code.clone(),
                    d.name.clone(),
                    d.donor_type.to_string(),
                    fmt_cents(d.total_donations),
                    d.last_donation_date.map(|x| x.to_string()).unwrap_or_default(),
                ]
            })
            .collect();
        println!("{}", pretty_table(&["Code", "Name", "Type", "Total", "Last gift"], rows));
    }
    Ok(())
}

fn give(conn: &mut Connection, sub: &clap::ArgMatches, session: &Session) -> anyhow::Result<()> {
    let donor_id = id_for_donor_code(conn, sub.get_one::<String>("donor").unwrap())?;
    let donation_date = match sub.get_one::<String>("date") {
        Some(s) => parse_date(s)?,
        None => session.today,
    };
    let req = NewDonation {
        donor_id,
        amount: parse_amount(sub.get_one::<String>("amount").unwrap())?,
        donation_date,
        purpose: sub.get_one::<String>("purpose").unwrap().to_string(),
        payment_method: sub.get_one::<String>("method").unwrap().parse()?,
    };
    let d = record_donation(conn, &req)?;
    println!("Recorded donation #{} of {}", d.id, fmt_cents(d.amount));
    Ok(())
}

fn donations(conn: &Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let donor = sub
        .get_one::<String>("donor")
        .map(|c| id_for_donor_code(conn, c))
        .transpose()?;
    let data = list_donations(conn, donor)?;
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
        let rows = data
            .iter()
            .map(|d| {
                vec![
                    d.id.to_string(),
                    d.donor_id.to_string(),
                    d.donation_date.to_string(),
                    fmt_cents(d.amount),
                    d.purpose.clone(),
                    d.gl_journal_entry_id.map(|e| e.to_string()).unwrap_or_else(|| "-".into()),
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(&["ID", "Donor", "Date", "Amount", "Purpose", "GL entry"], rows)
        );
    }
    Ok(())
}

fn active(conn: &mut Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let id = id_for_donor_code(conn, sub.get_one::<String>("code").unwrap())?;
    let d = set_donor_active(conn, id, !sub.get_flag("off"))?;
    println!(
        "Donor {} is now {}",
        d.donor_code,
        if d.is_active { "active" } else { "inactive" }
    );
    Ok(())
}

fn post(conn: &mut Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let id = parse_id(sub.get_one::<String>("id").unwrap())?;
    let p = post_to_gl(conn, id)?;
    println!(
        "Posted donation #{} as journal entry #{}",
        p.donation.id, p.journal_entry.id
    );
    Ok(())
}
