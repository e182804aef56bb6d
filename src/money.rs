// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Minor-unit money helpers.
//!
//! Every stored amount is an `i64` count of cents. Decimal parsing only
//! happens at the human boundary, and always rounds half away from zero so
//! "19.999" bills 2000 cents rather than truncating to 1999.

use crate::error::{FinanceError, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

pub const BASIS_POINTS_SCALE: i64 = 10_000;

/// Convert a human amount such as `"125.50"` into cents.
pub fn parse_amount(s: &str) -> Result<i64> {
    let raw = s.trim();
    let d = raw
        .parse::<Decimal>()
        .map_err(|_| FinanceError::validation(format!("Invalid amount '{}'", raw)))?;
    decimal_to_cents(d).ok_or_else(|| FinanceError::validation(format!("Amount '{}' out of range", raw)))
}

pub fn decimal_to_cents(d: Decimal) -> Option<i64> {
    (d * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// Convert a percentage such as `"12.5"` into basis points (1250).
pub fn parse_percent(s: &str) -> Result<i64> {
    let raw = s.trim().trim_end_matches('%');
    let d = raw
        .parse::<Decimal>()
        .map_err(|_| FinanceError::validation(format!("Invalid percentage '{}'", raw)))?;
    let bps = decimal_to_cents(d)
        .ok_or_else(|| FinanceError::validation(format!("Percentage '{}' out of range", raw)))?;
    check_basis_points(bps)?;
    Ok(bps)
}

pub fn check_basis_points(bps: i64) -> Result<()> {
    if !(0..=BASIS_POINTS_SCALE).contains(&bps) {
        return Err(FinanceError::validation(format!(
            "Rate {} bp outside 0..=10000",
            bps
        )));
    }
    Ok(())
}

/// `amount * bps / 10000`, rounded half up on the cent.
pub fn apply_basis_points(amount: i64, bps: i64) -> i64 {
    let scaled = i128::from(amount) * i128::from(bps);
    let half = i128::from(BASIS_POINTS_SCALE / 2);
    ((scaled + half) / i128::from(BASIS_POINTS_SCALE)) as i64
}

/// `amount * bps / 10000`, floored: used where a policy releases at most the rate.
pub fn apply_basis_points_floor(amount: i64, bps: i64) -> i64 {
    (i128::from(amount) * i128::from(bps) / i128::from(BASIS_POINTS_SCALE)) as i64
}

pub fn require_positive(field: &str, amount: i64) -> Result<()> {
    if amount <= 0 {
        return Err(FinanceError::validation(format!(
            "{} must be positive, got {}",
            field, amount
        )));
    }
    Ok(())
}

pub fn fmt_cents(cents: i64) -> String {
    format!("{:.2}", Decimal::new(cents, 2))
}

pub fn fmt_money(cents: i64, ccy: &str) -> String {
    format!("{} {}", ccy, fmt_cents(cents))
}

pub fn fmt_bps(bps: i64) -> String {
    format!("{:.2}%", Decimal::new(bps, 2))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_amount_rounds_instead_of_truncating() {
        assert_eq!(parse_amount("19.999").unwrap(), 2000);
        assert_eq!(parse_amount(" 0.285 ").unwrap(), 29);
        assert_eq!(parse_amount("125").unwrap(), 12500);
        assert!(parse_amount("abc").is_err());
    }

    #[test]
    fn basis_points_round_half_up() {
        assert_eq!(apply_basis_points(1000, 1250), 125);
        assert_eq!(apply_basis_points(333, 5000), 167);
        assert_eq!(apply_basis_points_floor(333, 5000), 166);
    }

    #[test]
    fn percent_bounds() {
        assert_eq!(parse_percent("12.5%").unwrap(), 1250);
        assert!(parse_percent("100.01").is_err());
    }

    #[test]
    fn formats_cents() {
        assert_eq!(fmt_cents(12345), "123.45");
        assert_eq!(fmt_cents(-5), "-0.05");
        assert_eq!(fmt_money(100, "USD"), "USD 1.00");
    }
}
