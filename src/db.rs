// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::{FinanceError, Result as FinanceResult};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use once_cell::sync::Lazy;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

static APP: Lazy<(&str, &str, &str)> =
    Lazy::new(|| ("com.alphavelocity", "Bursar", "bursar"));

pub const DB_ENV: &str = "BURSAR_DB";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_WRITE_ATTEMPTS: u32 = 3;

pub fn db_path() -> Result<PathBuf> {
    if let Ok(p) = std::env::var(DB_ENV) {
        if !p.trim().is_empty() {
            return Ok(PathBuf::from(p.trim()));
        }
    }
    let proj = ProjectDirs::from(APP.0, APP.1, APP.2)
        .context("Could not determine platform-specific data dir")?;
    let data_dir = proj.data_dir();
    fs::create_dir_all(data_dir).context("Failed to create data dir")?;
    Ok(data_dir.join("bursar.sqlite"))
}

pub fn open_or_init() -> Result<Connection> {
    let path = db_path()?;
    open_at(&path)
}

pub fn open_at(path: &std::path::Path) -> Result<Connection> {
    let conn =
        Connection::open(path).with_context(|| format!("Open DB at {}", path.display()))?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    init_schema(&conn)?;
    tracing::debug!(path = %path.display(), "database ready");
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Run `op` inside a `BEGIN IMMEDIATE` transaction.
///
/// The write lock is taken before the first read, so every check-then-write
/// sequence inside `op` is serialized against other connections. A busy
/// failure rolls back and is retried with backoff; any other error rolls back
/// and is returned unchanged.
pub fn with_write_tx<T, F>(conn: &mut Connection, label: &str, mut op: F) -> FinanceResult<T>
where
    F: FnMut(&Transaction<'_>) -> FinanceResult<T>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = (|| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let value = op(&tx)?;
            tx.commit()?;
            Ok::<T, FinanceError>(value)
        })();
        match result {
            Err(err) if err.is_busy() && attempt < MAX_WRITE_ATTEMPTS => {
                tracing::warn!(op = label, attempt, "database busy, retrying");
                std::thread::sleep(Duration::from_millis(50 * u64::from(attempt)));
            }
            Err(err) => {
                tracing::debug!(op = label, kind = err.kind(), "transaction rolled back");
                return Err(err);
            }
            Ok(value) => return Ok(value),
        }
    }
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS settings(
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS fee_structures(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        class_id INTEGER,
        program_id INTEGER,
        fee_type TEXT NOT NULL,
        amount INTEGER NOT NULL CHECK(amount > 0),
        is_per_credit INTEGER NOT NULL DEFAULT 0,
        academic_period_id INTEGER,
        due_date TEXT NOT NULL,
        description TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        CHECK(class_id IS NOT NULL OR program_id IS NOT NULL)
    );

    CREATE TABLE IF NOT EXISTS student_fees(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        student_id INTEGER NOT NULL,
        fee_structure_id INTEGER,
        fee_type TEXT NOT NULL,
        amount INTEGER NOT NULL CHECK(amount > 0),
        paid_amount INTEGER NOT NULL DEFAULT 0,
        status TEXT NOT NULL CHECK(status IN ('pending','partial','paid','overdue')),
        due_date TEXT NOT NULL,
        description TEXT NOT NULL,
        notes TEXT,
        penalty_of INTEGER,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        CHECK(paid_amount >= 0 AND paid_amount <= amount),
        FOREIGN KEY(fee_structure_id) REFERENCES fee_structures(id) ON DELETE RESTRICT,
        FOREIGN KEY(penalty_of) REFERENCES student_fees(id) ON DELETE RESTRICT
    );
    CREATE INDEX IF NOT EXISTS idx_student_fees_student ON student_fees(student_id);
    CREATE INDEX IF NOT EXISTS idx_student_fees_due ON student_fees(due_date);

    CREATE TABLE IF NOT EXISTS fee_audit(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        student_fee_id INTEGER NOT NULL,
        action TEXT NOT NULL CHECK(action IN ('administrative_clear','delete')),
        previous_status TEXT NOT NULL,
        previous_paid_amount INTEGER NOT NULL,
        operator TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE IF NOT EXISTS payments(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        student_id INTEGER NOT NULL,
        amount INTEGER NOT NULL CHECK(amount > 0),
        payment_date TEXT NOT NULL,
        payment_method TEXT NOT NULL,
        status TEXT NOT NULL CHECK(status IN ('pending','completed','failed','refunded')),
        payment_number TEXT NOT NULL UNIQUE,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE IF NOT EXISTS payment_allocations(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        payment_id INTEGER NOT NULL,
        student_fee_id INTEGER NOT NULL,
        amount INTEGER NOT NULL CHECK(amount > 0),
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        FOREIGN KEY(payment_id) REFERENCES payments(id) ON DELETE RESTRICT,
        FOREIGN KEY(student_fee_id) REFERENCES student_fees(id) ON DELETE RESTRICT
    );
    CREATE INDEX IF NOT EXISTS idx_allocations_payment ON payment_allocations(payment_id);
    CREATE INDEX IF NOT EXISTS idx_allocations_fee ON payment_allocations(student_fee_id);

    CREATE TABLE IF NOT EXISTS penalty_applications(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        student_fee_id INTEGER NOT NULL,
        cycle_key TEXT NOT NULL,
        penalty_fee_id INTEGER NOT NULL,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        UNIQUE(student_fee_id, cycle_key),
        FOREIGN KEY(student_fee_id) REFERENCES student_fees(id) ON DELETE RESTRICT,
        FOREIGN KEY(penalty_fee_id) REFERENCES student_fees(id) ON DELETE RESTRICT
    );

    CREATE TABLE IF NOT EXISTS payment_plans(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        student_id INTEGER NOT NULL,
        total_amount INTEGER NOT NULL CHECK(total_amount > 0),
        start_date TEXT NOT NULL,
        end_date TEXT NOT NULL,
        frequency TEXT NOT NULL CHECK(frequency IN ('monthly','quarterly')),
        status TEXT NOT NULL DEFAULT 'active',
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE IF NOT EXISTS plan_installments(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        plan_id INTEGER NOT NULL,
        sequence INTEGER NOT NULL,
        due_date TEXT NOT NULL,
        amount INTEGER NOT NULL CHECK(amount >= 0),
        status TEXT NOT NULL DEFAULT 'pending',
        UNIQUE(plan_id, sequence),
        FOREIGN KEY(plan_id) REFERENCES payment_plans(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS scholarship_types(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        code TEXT NOT NULL UNIQUE,
        amount_type TEXT NOT NULL CHECK(amount_type IN ('fixed','percentage')),
        amount INTEGER,
        percentage INTEGER CHECK(percentage IS NULL OR (percentage >= 0 AND percentage <= 10000))
    );

    CREATE TABLE IF NOT EXISTS student_scholarships(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        student_id INTEGER NOT NULL,
        scholarship_type_id INTEGER NOT NULL,
        awarded_amount INTEGER NOT NULL CHECK(awarded_amount >= 0),
        status TEXT NOT NULL DEFAULT 'active',
        disbursement_type TEXT NOT NULL,
        awarded_on TEXT NOT NULL,
        FOREIGN KEY(scholarship_type_id) REFERENCES scholarship_types(id) ON DELETE RESTRICT
    );

    CREATE TABLE IF NOT EXISTS gl_accounts(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        account_code TEXT NOT NULL UNIQUE,
        account_name TEXT NOT NULL,
        account_type TEXT NOT NULL CHECK(account_type IN ('asset','liability','equity','revenue','expense')),
        normal_balance TEXT NOT NULL CHECK(normal_balance IN ('debit','credit')),
        is_active INTEGER NOT NULL DEFAULT 1
    );

    CREATE TABLE IF NOT EXISTS journal_entries(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        entry_date TEXT NOT NULL,
        memo TEXT NOT NULL,
        source_ref TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE IF NOT EXISTS journal_lines(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        journal_entry_id INTEGER NOT NULL,
        account_id INTEGER NOT NULL,
        debit INTEGER NOT NULL DEFAULT 0,
        credit INTEGER NOT NULL DEFAULT 0,
        CHECK((debit > 0 AND credit = 0) OR (credit > 0 AND debit = 0)),
        FOREIGN KEY(journal_entry_id) REFERENCES journal_entries(id) ON DELETE RESTRICT,
        FOREIGN KEY(account_id) REFERENCES gl_accounts(id) ON DELETE RESTRICT
    );
    CREATE INDEX IF NOT EXISTS idx_journal_lines_entry ON journal_lines(journal_entry_id);

    CREATE TABLE IF NOT EXISTS donors(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        donor_code TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        donor_type TEXT NOT NULL,
        total_donations INTEGER NOT NULL DEFAULT 0,
        last_donation_date TEXT,
        is_active INTEGER NOT NULL DEFAULT 1
    );

    CREATE TABLE IF NOT EXISTS donations(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        donor_id INTEGER NOT NULL,
        amount INTEGER NOT NULL CHECK(amount > 0),
        donation_date TEXT NOT NULL,
        purpose TEXT NOT NULL,
        payment_method TEXT NOT NULL,
        gl_journal_entry_id INTEGER UNIQUE,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        FOREIGN KEY(donor_id) REFERENCES donors(id) ON DELETE RESTRICT,
        FOREIGN KEY(gl_journal_entry_id) REFERENCES journal_entries(id) ON DELETE RESTRICT
    );

    CREATE TABLE IF NOT EXISTS endowment_funds(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        fund_code TEXT NOT NULL UNIQUE,
        fund_name TEXT NOT NULL,
        principal INTEGER NOT NULL CHECK(principal >= 0),
        spending_rate INTEGER NOT NULL CHECK(spending_rate >= 0 AND spending_rate <= 10000),
        is_active INTEGER NOT NULL DEFAULT 1
    );

    CREATE TABLE IF NOT EXISTS investments(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        endowment_fund_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        quantity TEXT NOT NULL,
        cost_basis INTEGER NOT NULL CHECK(cost_basis >= 0),
        current_price INTEGER NOT NULL CHECK(current_price >= 0),
        current_value INTEGER NOT NULL,
        updated_at TEXT NOT NULL DEFAULT (datetime('now')),
        FOREIGN KEY(endowment_fund_id) REFERENCES endowment_funds(id) ON DELETE RESTRICT
    );
    "#,
    )?;
    Ok(())
}
