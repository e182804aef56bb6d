// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Endowment funds and the investments that back them.
//!
//! A fund's current value is never stored: it is the sum of its
//! investments' values at read time.

use super::Session;
use crate::db::with_write_tx;
use crate::error::{FinanceError, Result};
use crate::models::{EndowmentFund, Investment};
use crate::money::{
    apply_basis_points_floor, check_basis_points, fmt_bps, fmt_cents, parse_amount, parse_percent,
};
use crate::utils::{
    id_for_fund_code, maybe_print_json, parse_id, pretty_table, require_text, validate_code,
};
use rusqlite::{Connection, OptionalExtension, Row, params};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches, _session: &Session) -> anyhow::Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => add(conn, sub)?,
        Some(("list", sub)) => list(conn, sub)?,
        Some(("invest", sub)) => invest(conn, sub)?,
        Some(("price", sub)) => price(conn, sub)?,
        Some(("summary", sub)) => summary(conn, sub)?,
        Some(("active", sub)) => active(conn, sub)?,
        _ => {}
    }
    Ok(())
}

/// `quantity × price`, rounded half away from zero on the cent.
pub fn market_value(quantity: Decimal, price: i64) -> Result<i64> {
    (quantity * Decimal::from(price))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| FinanceError::validation("Investment value out of range"))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct NewFund {
    pub fund_code: String,
    pub fund_name: String,
    pub principal: i64,
    pub spending_rate: i64,
}

pub fn create_fund(conn: &mut Connection, req: &NewFund) -> Result<EndowmentFund> {
    let code = req.fund_code.trim().to_string();
    validate_code("fund", &code)?;
    let name = require_text("fund name", &req.fund_name)?;
    if req.principal < 0 {
        return Err(FinanceError::validation("Principal must not be negative"));
    }
    check_basis_points(req.spending_rate)?;
    let fund = with_write_tx(conn, "create_fund", |tx| {
        let taken: Option<i64> = tx
            .query_row(
                "SELECT id FROM endowment_funds WHERE fund_code=?1",
                params![code],
                |r| r.get(0),
            )
            .optional()?;
        if taken.is_some() {
            return Err(FinanceError::DuplicateCode {
                entity: "fund",
                code: code.clone(),
            });
        }
        tx.execute(
            "INSERT INTO endowment_funds(fund_code, fund_name, principal, spending_rate) VALUES (?1, ?2, ?3, ?4)",
            params![code, name, req.principal, req.spending_rate],
        )?;
        load_fund(tx, tx.last_insert_rowid())
    })?;
    tracing::info!(fund_id = fund.id, code = %fund.fund_code, "endowment fund created");
    Ok(fund)
}

fn fund_from_row(r: &Row<'_>) -> rusqlite::Result<EndowmentFund> {
    Ok(EndowmentFund {
        id: r.get(0)?,
        fund_code: r.get(1)?,
        fund_name: r.get(2)?,
        principal: r.get(3)?,
        spending_rate: r.get(4)?,
        is_active: r.get::<_, i64>(5)? != 0,
    })
}

/// Close or reopen a fund. Closed funds take no new holdings.
pub fn set_fund_active(conn: &mut Connection, id: i64, active: bool) -> Result<EndowmentFund> {
    let fund = with_write_tx(conn, "set_fund_active", |tx| {
        load_fund(tx, id)?;
        tx.execute(
            "UPDATE endowment_funds SET is_active=?1 WHERE id=?2",
            params![i64::from(active), id],
        )?;
        load_fund(tx, id)
    })?;
    tracing::info!(fund_id = id, active, "fund activity changed");
    Ok(fund)
}

pub fn load_fund(conn: &Connection, id: i64) -> Result<EndowmentFund> {
    conn.query_row(
        "SELECT id, fund_code, fund_name, principal, spending_rate, is_active FROM endowment_funds WHERE id=?1",
        params![id],
        fund_from_row,
    )
    .optional()?
    .ok_or(FinanceError::NotFound {
        entity: "endowment fund",
        id,
    })
}

pub fn list_funds(conn: &Connection) -> Result<Vec<EndowmentFund>> {
    let mut stmt = conn.prepare(
        "SELECT id, fund_code, fund_name, principal, spending_rate, is_active FROM endowment_funds ORDER BY fund_code",
    )?;
    let rows = stmt.query_map([], fund_from_row)?;
    let mut data = Vec::new();
    for row in rows {
        data.push(row?);
    }
    Ok(data)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct NewInvestment {
    pub endowment_fund_id: i64,
    pub name: String,
    pub quantity: Decimal,
    pub cost_basis: i64,
    pub current_price: i64,
}

pub fn add_investment(conn: &mut Connection, req: &NewInvestment) -> Result<Investment> {
    let name = require_text("investment name", &req.name)?;
    if req.quantity <= Decimal::ZERO {
        return Err(FinanceError::validation("Quantity must be positive"));
    }
    if req.cost_basis < 0 || req.current_price < 0 {
        return Err(FinanceError::validation("Cost basis and price must not be negative"));
    }
    let value = market_value(req.quantity, req.current_price)?;
    let inv = with_write_tx(conn, "add_investment", |tx| {
        let fund = load_fund(tx, req.endowment_fund_id)?;
        if !fund.is_active {
            return Err(FinanceError::validation(format!(
                "Fund {} is inactive",
                fund.fund_code
            )));
        }
        tx.execute(
            "INSERT INTO investments(endowment_fund_id, name, quantity, cost_basis, current_price, current_value)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                fund.id,
                name,
                req.quantity.normalize().to_string(),
                req.cost_basis,
                req.current_price,
                value
            ],
        )?;
        load_investment(tx, tx.last_insert_rowid())
    })?;
    tracing::info!(
        investment_id = inv.id,
        fund_id = inv.endowment_fund_id,
        value = inv.current_value,
        "investment added"
    );
    Ok(inv)
}

/// Reprice one holding; its value is recomputed from quantity in the same write.
pub fn update_investment_price(conn: &mut Connection, investment_id: i64, price: i64) -> Result<Investment> {
    if price < 0 {
        return Err(FinanceError::validation("Price must not be negative"));
    }
    let inv = with_write_tx(conn, "update_investment_price", |tx| {
        let inv = load_investment(tx, investment_id)?;
        let value = market_value(inv.quantity, price)?;
        tx.execute(
            "UPDATE investments SET current_price=?1, current_value=?2, updated_at=datetime('now') WHERE id=?3",
            params![price, value, investment_id],
        )?;
        load_investment(tx, investment_id)
    })?;
    tracing::info!(investment_id, price, value = inv.current_value, "investment repriced");
    Ok(inv)
}

fn investment_from_row(r: &Row<'_>) -> rusqlite::Result<Investment> {
    let raw: String = r.get(3)?;
    let quantity = Decimal::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Investment {
        id: r.get(0)?,
        endowment_fund_id: r.get(1)?,
        name: r.get(2)?,
        quantity,
        cost_basis: r.get(4)?,
        current_price: r.get(5)?,
        current_value: r.get(6)?,
    })
}

const INVESTMENT_COLUMNS: &str =
    "id, endowment_fund_id, name, quantity, cost_basis, current_price, current_value";

pub fn load_investment(conn: &Connection, id: i64) -> Result<Investment> {
    let sql = format!("SELECT {} FROM investments WHERE id=?1", INVESTMENT_COLUMNS);
    conn.query_row(&sql, params![id], investment_from_row)
        .optional()?
        .ok_or(FinanceError::NotFound {
            entity: "investment",
            id,
        })
}

pub fn fund_investments(conn: &Connection, fund_id: i64) -> Result<Vec<Investment>> {
    let sql = format!(
        "SELECT {} FROM investments WHERE endowment_fund_id=?1 ORDER BY id",
        INVESTMENT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![fund_id], investment_from_row)?;
    let mut data = Vec::new();
    for row in rows {
        data.push(row?);
    }
    Ok(data)
}

#[derive(Debug, Clone, Serialize)]
pub struct FundSummary {
    pub fund: EndowmentFund,
    pub investments: usize,
    pub current_value: i64,
    /// Floored so the release never exceeds the policy rate.
    pub spendable_amount: i64,
    pub cost_basis: i64,
    pub unrealized_gain: i64,
}

pub fn fund_summary(conn: &Connection, fund_id: i64) -> Result<FundSummary> {
    let fund = load_fund(conn, fund_id)?;
    let holdings = fund_investments(conn, fund_id)?;
    let mut current_value = 0i64;
    let mut cost_basis = 0i64;
    for inv in &holdings {
        current_value = current_value
            .checked_add(market_value(inv.quantity, inv.current_price)?)
            .ok_or_else(|| FinanceError::validation("Fund value overflows"))?;
        cost_basis = cost_basis
            .checked_add(inv.cost_basis)
            .ok_or_else(|| FinanceError::validation("Fund cost basis overflows"))?;
    }
    Ok(FundSummary {
        investments: holdings.len(),
        current_value,
        spendable_amount: apply_basis_points_floor(current_value, fund.spending_rate),
        cost_basis,
        unrealized_gain: current_value - cost_basis,
        fund,
    })
}

fn active(conn: &mut Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let id = id_for_fund_code(conn, sub.get_one::<String>("code").unwrap())?;
    let f = set_fund_active(conn, id, !sub.get_flag("off"))?;
    println!(
        "Fund {} is now {}",
        f.fund_code,
        if f.is_active { "active" } else { "closed" }
    );
    Ok(())
}

fn add(conn: &mut Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let req = NewFund {
        fund_code: sub.get_one::<String>("code").unwrap().to_string(),
        fund_name: sub.get_one::<String>("name").unwrap().to_string(),
        principal: parse_amount(sub.get_one::<String>("principal").unwrap())?,
        spending_rate: parse_percent(sub.get_one::<String>("rate").unwrap())?,
    };
    let f = create_fund(conn, &req)?;
    println!(
        "Added fund {} ({}), principal {}, spending rate {}",
        f.fund_code,
        f.fund_name,
        fmt_cents(f.principal),
        fmt_bps(f.spending_rate)
    );
    Ok(())
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let mut data = Vec::new();
    for f in list_funds(conn)? {
        data.push(fund_summary(conn, f.id)?);
    }
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
        let rows = data
            .iter()
            .map(|s| {
                vec![
                    s.fund.fund_code.clone(),
                    s.fund.fund_name.clone(),
                    fmt_cents(s.fund.principal),
                    fmt_cents(s.current_value),
                    fmt_bps(s.fund.spending_rate),
                    fmt_cents(s.spendable_amount),
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(&["Code", "Name", "Principal", "Value", "Rate", "Spendable"], rows)
        );
    }
    Ok(())
}

fn invest(conn: &mut Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let fund_id = id_for_fund_code(conn, sub.get_one::<String>("fund").unwrap())?;
    let qty_raw = sub.get_one::<String>("quantity").unwrap();
    let quantity = Decimal::from_str(qty_raw.trim())
        .map_err(|_| anyhow::anyhow!("Invalid quantity '{}'", qty_raw))?;
    let req = NewInvestment {
        endowment_fund_id: fund_id,
        name: sub.get_one::<String>("name").unwrap().to_string(),
        quantity,
        cost_basis: parse_amount(sub.get_one::<String>("cost").unwrap())?,
        current_price: parse_amount(sub.get_one::<String>("price").unwrap())?,
    };
    let inv = add_investment(conn, &req)?;
    println!(
        "Added investment #{} {} x {} = {}",
        inv.id,
        inv.quantity,
        fmt_cents(inv.current_price),
        fmt_cents(inv.current_value)
    );
    Ok(())
}

fn price(conn: &mut Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let id = parse_id(sub.get_one::<String>("id").unwrap())?;
    let p = parse_amount(sub.get_one::<String>("price").unwrap())?;
    let inv = update_investment_price(conn, id, p)?;
    println!(
        "Investment #{} now {} ({} per unit)",
        inv.id,
        fmt_cents(inv.current_value),
        fmt_cents(inv.current_price)
    );
    Ok(())
}

fn summary(conn: &Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let fund_id = id_for_fund_code(conn, sub.get_one::<String>("fund").unwrap())?;
    let s = fund_summary(conn, fund_id)?;
    if !maybe_print_json(sub.get_flag("json"), false, &s)? {
        println!(
            "{}",
            pretty_table(
                &["Fund", "Holdings", "Value", "Cost basis", "Unrealized", "Spendable"],
                vec![vec![
                    s.fund.fund_code.clone(),
                    s.investments.to_string(),
                    fmt_cents(s.current_value),
                    fmt_cents(s.cost_basis),
                    fmt_cents(s.unrealized_gain),
                    fmt_cents(s.spendable_amount),
                ]],
            )
        );
    }
    Ok(())
}
