// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use super::endowments::market_value;
use crate::error::Result as FinanceResult;
use crate::utils::{maybe_print_json, pretty_table};
use anyhow::Result;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub kind: &'static str,
    pub detail: String,
}

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    let issues = scan(conn)?;
    if maybe_print_json(m.get_flag("json"), false, &issues)? {
        return Ok(());
    }
    if issues.is_empty() {
        println!("✅ doctor: no issues found");
    } else {
        let rows = issues
            .iter()
            .map(|i| vec![i.kind.to_string(), i.detail.clone()])
            .collect();
        println!("{}", pretty_table(&["Issue", "Detail"], rows));
    }
    Ok(())
}

/// Read-only consistency scan over the ledger tables.
pub fn scan(conn: &Connection) -> FinanceResult<Vec<Issue>> {
    let mut issues = Vec::new();

    // 1) Fee paid amount vs allocations. Administrative clears leave a gap
    //    that is explained by an audit row.
    let mut stmt = conn.prepare(
        "SELECT f.id, f.paid_amount, COALESCE(SUM(a.amount), 0)
         FROM student_fees f
         LEFT JOIN payment_allocations a ON a.student_fee_id = f.id
         GROUP BY f.id
         HAVING f.paid_amount != COALESCE(SUM(a.amount), 0)
            AND NOT EXISTS (
                SELECT 1 FROM fee_audit u
                WHERE u.student_fee_id = f.id AND u.action = 'administrative_clear'
            )",
    )?;
    let mut cur = stmt.query([])?;
    while let Some(r) = cur.next()? {
        let id: i64 = r.get(0)?;
        let paid: i64 = r.get(1)?;
        let allocated: i64 = r.get(2)?;
        issues.push(Issue {
            kind: "fee_paid_mismatch",
            detail: format!("fee {} paid {} but allocations sum to {}", id, paid, allocated),
        });
    }

    // 2) Payments allocated beyond their amount
    let mut stmt = conn.prepare(
        "SELECT p.id, p.amount, SUM(a.amount)
         FROM payments p
         JOIN payment_allocations a ON a.payment_id = p.id
         GROUP BY p.id
         HAVING SUM(a.amount) > p.amount",
    )?;
    let mut cur = stmt.query([])?;
    while let Some(r) = cur.next()? {
        let id: i64 = r.get(0)?;
        let amount: i64 = r.get(1)?;
        let allocated: i64 = r.get(2)?;
        issues.push(Issue {
            kind: "payment_over_allocated",
            detail: format!("payment {} amount {} allocated {}", id, amount, allocated),
        });
    }

    // 3) Journal entries that do not balance, or have no lines at all
    let mut stmt = conn.prepare(
        "SELECT e.id, COALESCE(SUM(l.debit), 0), COALESCE(SUM(l.credit), 0), COUNT(l.id)
         FROM journal_entries e
         LEFT JOIN journal_lines l ON l.journal_entry_id = e.id
         GROUP BY e.id
         HAVING COALESCE(SUM(l.debit), 0) != COALESCE(SUM(l.credit), 0) OR COUNT(l.id) = 0",
    )?;
    let mut cur = stmt.query([])?;
    while let Some(r) = cur.next()? {
        let id: i64 = r.get(0)?;
        let debits: i64 = r.get(1)?;
        let credits: i64 = r.get(2)?;
        issues.push(Issue {
            kind: "unbalanced_journal",
            detail: format!("entry {} debits {} credits {}", id, debits, credits),
        });
    }

    // 4) Donor running totals drifting from their donations
    let mut stmt = conn.prepare(
        "SELECT d.donor_code, d.total_donations, COALESCE(SUM(x.amount), 0)
         FROM donors d
         LEFT JOIN donations x ON x.donor_id = d.id
         GROUP BY d.id
         HAVING d.total_donations != COALESCE(SUM(x.amount), 0)",
    )?;
    let mut cur = stmt.query([])?;
    while let Some(r) = cur.next()? {
        let code: String = r.get(0)?;
        let stored: i64 = r.get(1)?;
        let actual: i64 = r.get(2)?;
        issues.push(Issue {
            kind: "donor_total_drift",
            detail: format!("donor {} total {} but donations sum to {}", code, stored, actual),
        });
    }

    // 5) Investment value vs quantity x price
    let mut stmt =
        conn.prepare("SELECT id, quantity, current_price, current_value FROM investments")?;
    let mut cur = stmt.query([])?;
    while let Some(r) = cur.next()? {
        let id: i64 = r.get(0)?;
        let raw: String = r.get(1)?;
        let price: i64 = r.get(2)?;
        let stored: i64 = r.get(3)?;
        let Ok(qty) = Decimal::from_str(&raw) else {
            issues.push(Issue {
                kind: "investment_bad_quantity",
                detail: format!("investment {} quantity '{}'", id, raw),
            });
            continue;
        };
        let expected = market_value(qty, price)?;
        if expected != stored {
            issues.push(Issue {
                kind: "investment_value_drift",
                detail: format!("investment {} value {} expected {}", id, stored, expected),
            });
        }
    }

    if !issues.is_empty() {
        tracing::warn!(issues = issues.len(), "ledger scan found issues");
    }
    Ok(issues)
}
