// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::config::{FinanceConfig, LateFeeRule, PenaltyPolicy, get_setting, set_setting};
use crate::money::{fmt_bps, fmt_cents};
use crate::utils::{maybe_print_json, pretty_table};
use anyhow::Result;
use rusqlite::Connection;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("show", sub)) => show(conn, sub)?,
        Some(("get", sub)) => {
            let key = sub.get_one::<String>("key").unwrap();
            match get_setting(conn, key)? {
                Some(v) => println!("{}", v),
                None => println!("{} is not set (default applies)", key),
            }
        }
        Some(("set", sub)) => {
            let key = sub.get_one::<String>("key").unwrap();
            let value = sub.get_one::<String>("value").unwrap();
            set_setting(conn, key, value)?;
            println!("Set {}", key);
        }
        _ => {}
    }
    Ok(())
}

fn show(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let cfg = FinanceConfig::load(conn)?;
    if maybe_print_json(sub.get_flag("json"), false, &cfg)? {
        return Ok(());
    }
    let late_fee = match cfg.late_fee {
        LateFeeRule::Fixed(c) => format!("fixed {}", fmt_cents(c)),
        LateFeeRule::Percentage(bps) => format!("{} of unpaid balance", fmt_bps(bps)),
    };
    let policy = match cfg.penalty_policy {
        PenaltyPolicy::Once => "once per overdue fee",
        PenaltyPolicy::Monthly => "once per month overdue",
    };
    let rows = vec![
        vec!["currency".into(), cfg.currency.clone()],
        vec!["late fee".into(), late_fee],
        vec!["penalty policy".into(), policy.into()],
        vec!["cash account".into(), cfg.cash_account.clone()],
        vec!["donation revenue account".into(), cfg.donation_revenue_account.clone()],
    ];
    println!("{}", pretty_table(&["Setting", "Value"], rows));
    Ok(())
}
