// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use super::Session;
use super::fees::{FEE_COLUMNS, FeeRow, fee_from_row, insert_fee};
use crate::config::{FinanceConfig, PenaltyPolicy};
use crate::db::with_write_tx;
use crate::error::Result;
use crate::models::{FeeType, StudentFee};
use crate::utils::maybe_print_json;
use chrono::{Datelike, NaiveDate};
use rusqlite::{Connection, params};
use serde::Serialize;

pub fn handle(conn: &mut Connection, sub: &clap::ArgMatches, session: &Session) -> anyhow::Result<()> {
    let run = calculate_penalties(conn, session.today)?;
    if !maybe_print_json(sub.get_flag("json"), false, &run)? {
        println!(
            "Processed {} overdue fees. Applied {} penalties.",
            run.processed, run.applied
        );
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PenaltyRun {
    pub processed: usize,
    pub applied: usize,
}

/// Dedupe key for one overdue period of one fee.
pub fn cycle_key(policy: PenaltyPolicy, fee: &StudentFee, today: NaiveDate) -> String {
    match policy {
        PenaltyPolicy::Once => format!("due:{}", fee.due_date),
        PenaltyPolicy::Monthly => format!("month:{:04}-{:02}", today.year(), today.month()),
    }
}

/// Scan past-due, unpaid, non-late fees and add one late-fee invoice per
/// fee per cycle. Re-running within a cycle applies nothing.
pub fn calculate_penalties(conn: &mut Connection, today: NaiveDate) -> Result<PenaltyRun> {
    let cfg = FinanceConfig::load(conn)?;
    let run = with_write_tx(conn, "calculate_penalties", |tx| {
        let sql = format!(
            "SELECT {} FROM student_fees
             WHERE paid_amount < amount AND due_date < ?1 AND fee_type != ?2
             ORDER BY due_date, id",
            FEE_COLUMNS
        );
        let candidates = {
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt.query_map(params![today, FeeType::Late], fee_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let mut run = PenaltyRun {
            processed: 0,
            applied: 0,
        };
        for fee in &candidates {
            run.processed += 1;
            let derived = fee.status_on(today);
            if derived != fee.status {
                tx.execute(
                    "UPDATE student_fees SET status=?1 WHERE id=?2",
                    params![derived, fee.id],
                )?;
            }

            let key = cycle_key(cfg.penalty_policy, fee, today);
            let already: i64 = tx.query_row(
                "SELECT COUNT(*) FROM penalty_applications WHERE student_fee_id=?1 AND cycle_key=?2",
                params![fee.id, key],
                |r| r.get(0),
            )?;
            if already > 0 {
                continue;
            }
            let penalty = cfg.late_fee.penalty_for(fee.balance());
            if penalty <= 0 {
                continue;
            }
            let description = format!("Late fee for fee #{} ({})", fee.id, fee.description);
            let late = insert_fee(
                tx,
                FeeRow {
                    student_id: fee.student_id,
                    fee_structure_id: None,
                    fee_type: FeeType::Late,
                    amount: penalty,
                    due_date: today,
                    description: &description,
                    notes: None,
                    penalty_of: Some(fee.id),
                },
                today,
            )?;
            tx.execute(
                "INSERT INTO penalty_applications(student_fee_id, cycle_key, penalty_fee_id) VALUES (?1, ?2, ?3)",
                params![fee.id, key, late.id],
            )?;
            tracing::debug!(fee_id = fee.id, penalty_fee_id = late.id, amount = penalty, cycle = %key, "late fee applied");
            run.applied += 1;
        }
        Ok(run)
    })?;
    tracing::info!(processed = run.processed, applied = run.applied, "penalty run finished");
    Ok(run)
}
