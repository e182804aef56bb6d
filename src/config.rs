// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Finance policy stored in the `settings` table.

use crate::error::{FinanceError, Result};
use crate::money::{apply_basis_points, check_basis_points};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

pub const KEY_CURRENCY: &str = "currency";
pub const KEY_LATE_FEE_MODE: &str = "late_fee.mode";
pub const KEY_LATE_FEE_VALUE: &str = "late_fee.value";
pub const KEY_PENALTY_POLICY: &str = "penalty.policy";
pub const KEY_CASH_ACCOUNT: &str = "gl.cash_account";
pub const KEY_DONATION_REVENUE_ACCOUNT: &str = "gl.donation_revenue_account";

pub const KNOWN_KEYS: &[&str] = &[
    KEY_CURRENCY,
    KEY_LATE_FEE_MODE,
    KEY_LATE_FEE_VALUE,
    KEY_PENALTY_POLICY,
    KEY_CASH_ACCOUNT,
    KEY_DONATION_REVENUE_ACCOUNT,
];

/// How a late fee is priced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum LateFeeRule {
    /// Flat amount in cents.
    Fixed(i64),
    /// Basis points of the unpaid balance.
    Percentage(i64),
}

impl LateFeeRule {
    pub fn penalty_for(self, unpaid_balance: i64) -> i64 {
        match self {
            LateFeeRule::Fixed(cents) => cents,
            LateFeeRule::Percentage(bps) => apply_basis_points(unpaid_balance, bps),
        }
    }
}

/// How often one overdue fee may be penalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PenaltyPolicy {
    /// At most one penalty per overdue fee.
    Once,
    /// One penalty per calendar month the fee stays overdue.
    Monthly,
}

#[derive(Debug, Clone, Serialize)]
pub struct FinanceConfig {
    pub currency: String,
    pub late_fee: LateFeeRule,
    pub penalty_policy: PenaltyPolicy,
    pub cash_account: String,
    pub donation_revenue_account: String,
}

impl Default for FinanceConfig {
    fn default() -> Self {
        Self {
            currency: "USD".into(),
            late_fee: LateFeeRule::Fixed(2_500),
            penalty_policy: PenaltyPolicy::Once,
            cash_account: "1000".into(),
            donation_revenue_account: "4500".into(),
        }
    }
}

impl FinanceConfig {
    pub fn load(conn: &Connection) -> Result<Self> {
        let mut cfg = FinanceConfig::default();
        if let Some(v) = get_setting(conn, KEY_CURRENCY)? {
            cfg.currency = v;
        }
        let mode = get_setting(conn, KEY_LATE_FEE_MODE)?;
        let value = get_setting(conn, KEY_LATE_FEE_VALUE)?;
        if mode.is_some() || value.is_some() {
            cfg.late_fee = parse_late_fee(mode.as_deref().unwrap_or("fixed"), value.as_deref())?;
        }
        if let Some(v) = get_setting(conn, KEY_PENALTY_POLICY)? {
            cfg.penalty_policy = parse_policy(&v)?;
        }
        if let Some(v) = get_setting(conn, KEY_CASH_ACCOUNT)? {
            cfg.cash_account = v;
        }
        if let Some(v) = get_setting(conn, KEY_DONATION_REVENUE_ACCOUNT)? {
            cfg.donation_revenue_account = v;
        }
        Ok(cfg)
    }
}

fn parse_late_fee(mode: &str, value: Option<&str>) -> Result<LateFeeRule> {
    let parse_value = |default: i64| -> Result<i64> {
        match value {
            Some(v) => v.trim().parse::<i64>().map_err(|_| {
                FinanceError::validation(format!("Invalid {} '{}'", KEY_LATE_FEE_VALUE, v))
            }),
            None => Ok(default),
        }
    };
    match mode.trim() {
        "fixed" => {
            let cents = parse_value(2_500)?;
            if cents < 0 {
                return Err(FinanceError::validation("Late fee must not be negative"));
            }
            Ok(LateFeeRule::Fixed(cents))
        }
        "percentage" => {
            let bps = parse_value(500)?;
            check_basis_points(bps)?;
            Ok(LateFeeRule::Percentage(bps))
        }
        other => Err(FinanceError::validation(format!(
            "Unknown late fee mode '{}' (use fixed|percentage)",
            other
        ))),
    }
}

fn parse_policy(s: &str) -> Result<PenaltyPolicy> {
    match s.trim() {
        "once" => Ok(PenaltyPolicy::Once),
        "monthly" => Ok(PenaltyPolicy::Monthly),
        other => Err(FinanceError::validation(format!(
            "Unknown penalty policy '{}' (use once|monthly)",
            other
        ))),
    }
}

pub fn get_setting(conn: &Connection, key: &str) -> Result<Option<String>> {
    let v: Option<String> = conn
        .query_row("SELECT value FROM settings WHERE key=?1", params![key], |r| {
            r.get(0)
        })
        .optional()?;
    Ok(v)
}

/// Validate and store one setting. Unknown keys are rejected.
pub fn set_setting(conn: &Connection, key: &str, value: &str) -> Result<()> {
    let key = key.trim();
    let value = value.trim();
    match key {
        KEY_CURRENCY => {
            if value.is_empty() {
                return Err(FinanceError::validation("Currency label must not be empty"));
            }
        }
        KEY_LATE_FEE_MODE => {
            parse_late_fee(value, get_setting(conn, KEY_LATE_FEE_VALUE)?.as_deref())?;
        }
        KEY_LATE_FEE_VALUE => {
            let mode = get_setting(conn, KEY_LATE_FEE_MODE)?;
            parse_late_fee(mode.as_deref().unwrap_or("fixed"), Some(value))?;
        }
        KEY_PENALTY_POLICY => {
            parse_policy(value)?;
        }
        KEY_CASH_ACCOUNT | KEY_DONATION_REVENUE_ACCOUNT => {
            crate::utils::validate_code("account", value)?;
        }
        other => {
            return Err(FinanceError::validation(format!(
                "Unknown setting '{}' (known: {})",
                other,
                KNOWN_KEYS.join(", ")
            )));
        }
    }
    let stored = if key == KEY_CURRENCY {
        value.to_uppercase()
    } else {
        value.to_string()
    };
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        params![key, stored],
    )?;
    tracing::info!(key, value = %stored, "setting updated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_rule_uses_unpaid_balance() {
        let rule = LateFeeRule::Percentage(500);
        assert_eq!(rule.penalty_for(20_000), 1_000);
        assert_eq!(LateFeeRule::Fixed(2_500).penalty_for(1), 2_500);
    }

    #[test]
    fn defaults_apply_without_settings() {
        let conn = crate::db::open_in_memory().unwrap();
        let cfg = FinanceConfig::load(&conn).unwrap();
        assert_eq!(cfg.currency, "USD");
        assert_eq!(cfg.penalty_policy, PenaltyPolicy::Once);
        assert_eq!(cfg.late_fee, LateFeeRule::Fixed(2_500));
    }

    #[test]
    fn rejects_unknown_keys_and_bad_values() {
        let conn = crate::db::open_in_memory().unwrap();
        assert!(set_setting(&conn, "fx.base", "EUR").is_err());
        assert!(set_setting(&conn, KEY_PENALTY_POLICY, "weekly").is_err());
        set_setting(&conn, KEY_LATE_FEE_MODE, "percentage").unwrap();
        set_setting(&conn, KEY_LATE_FEE_VALUE, "750").unwrap();
        let cfg = FinanceConfig::load(&conn).unwrap();
        assert_eq!(cfg.late_fee, LateFeeRule::Percentage(750));
    }
}
