// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::{FinanceError, Result as FinanceResult};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use comfy_table::{Cell, Table, presets::UTF8_FULL};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{Connection, OptionalExtension, params};
use std::sync::Once;

static CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._/-]{0,39}$").expect("static regex"));

static TRACING_INIT: Once = Once::new();

pub const LOG_ENV: &str = "BURSAR_LOG";

/// Install the global tracing subscriber once; logs go to stderr so JSON
/// output on stdout stays machine-readable.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{EnvFilter, fmt};

        let filter = EnvFilter::try_from_env(LOG_ENV)
            .unwrap_or_else(|_| EnvFilter::new("bursar=info"));
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    });
}

pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    let raw = s.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", raw))
}

pub fn parse_id(s: &str) -> Result<i64> {
    let raw = s.trim();
    raw.parse::<i64>()
        .with_context(|| format!("Invalid id '{}'", raw))
}

/// Parse a comma separated id list such as `"3, 4,9"`.
pub fn parse_id_list(s: &str) -> Result<Vec<i64>> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(parse_id)
        .collect()
}

/// Business codes (account, donor, fund, scholarship, payment numbers).
pub fn validate_code(entity: &str, code: &str) -> FinanceResult<()> {
    if CODE_RE.is_match(code) {
        Ok(())
    } else {
        Err(FinanceError::validation(format!(
            "Invalid {} code '{}': use letters, digits, '.', '_', '/', '-' (max 40)",
            entity, code
        )))
    }
}

pub fn require_text(field: &str, value: &str) -> FinanceResult<String> {
    let v = value.trim();
    if v.is_empty() {
        return Err(FinanceError::validation(format!("{} must not be empty", field)));
    }
    Ok(v.to_string())
}

pub fn pretty_table(headers: &[&str], rows: Vec<Vec<String>>) -> Table {
    let mut t = Table::new();
    t.load_preset(UTF8_FULL);
    t.set_header(headers.iter().map(|h| Cell::new(*h)));
    for r in rows {
        t.add_row(r.into_iter().map(Cell::new));
    }
    t
}

pub fn maybe_print_json<T: serde::Serialize>(
    json_flag: bool,
    jsonl_flag: bool,
    v: &T,
) -> Result<bool> {
    if json_flag {
        println!("{}", serde_json::to_string_pretty(v)?);
        return Ok(true);
    }
    if jsonl_flag {
        let val = serde_json::to_value(v)?;
        if let Some(arr) = val.as_array() {
            for item in arr {
                println!("{}", serde_json::to_string(item)?);
            }
        } else {
            println!("{}", serde_json::to_string(&val)?);
        }
        return Ok(true);
    }
    Ok(false)
}

pub fn id_for_account_code(conn: &Connection, code: &str) -> FinanceResult<i64> {
    let id: Option<i64> = conn
        .query_row(
            "SELECT id FROM gl_accounts WHERE account_code=?1",
            params![code.trim()],
            |r| r.get(0),
        )
        .optional()?;
    id.ok_or_else(|| FinanceError::validation(format!("GL account '{}' not found", code.trim())))
}

pub fn id_for_donor_code(conn: &Connection, code: &str) -> FinanceResult<i64> {
    let id: Option<i64> = conn
        .query_row(
            "SELECT id FROM donors WHERE donor_code=?1",
            params![code.trim()],
            |r| r.get(0),
        )
        .optional()?;
    id.ok_or_else(|| FinanceError::validation(format!("Donor '{}' not found", code.trim())))
}

pub fn id_for_fund_code(conn: &Connection, code: &str) -> FinanceResult<i64> {
    let id: Option<i64> = conn
        .query_row(
            "SELECT id FROM endowment_funds WHERE fund_code=?1",
            params![code.trim()],
            |r| r.get(0),
        )
        .optional()?;
    id.ok_or_else(|| FinanceError::validation(format!("Endowment fund '{}' not found", code.trim())))
}

pub fn id_for_scholarship_code(conn: &Connection, code: &str) -> FinanceResult<i64> {
    let id: Option<i64> = conn
        .query_row(
            "SELECT id FROM scholarship_types WHERE code=?1",
            params![code.trim()],
            |r| r.get(0),
        )
        .optional()?;
    id.ok_or_else(|| FinanceError::validation(format!("Scholarship type '{}' not found", code.trim())))
}
