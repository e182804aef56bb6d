// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;

use bursar::commands::{self, Session};
use bursar::config::FinanceConfig;
use bursar::models::Operator;
use bursar::{cli, db, utils};

fn main() -> Result<()> {
    utils::init_tracing();
    let cli = cli::build_cli();
    let matches = cli.get_matches();

    let mut conn = db::open_or_init()?;

    let operator = Operator {
        name: matches.get_one::<String>("operator").unwrap().trim().to_string(),
        elevated: matches.get_flag("elevated"),
    };
    let today = match matches.get_one::<String>("as_of") {
        Some(s) => utils::parse_date(s)?,
        None => utils::today(),
    };
    let session = Session {
        currency: FinanceConfig::load(&conn)?.currency,
        ..Session::new(operator, today)
    };

    match matches.subcommand() {
        Some(("init", _)) => {
            println!("Database initialized at {}", db::db_path()?.display());
        }
        Some(("structure", sub)) => commands::structures::handle(&mut conn, sub, &session)?,
        Some(("fee", sub)) => commands::fees::handle(&mut conn, sub, &session)?,
        Some(("payment", sub)) => commands::payments::handle(&mut conn, sub, &session)?,
        Some(("allocate", sub)) => commands::allocations::handle(&mut conn, sub, &session)?,
        Some(("plan", sub)) => commands::plans::handle(&mut conn, sub, &session)?,
        Some(("scholarship", sub)) => commands::scholarships::handle(&mut conn, sub, &session)?,
        Some(("donor", sub)) => commands::donors::handle(&mut conn, sub, &session)?,
        Some(("endowment", sub)) => commands::endowments::handle(&mut conn, sub, &session)?,
        Some(("gl", sub)) => commands::gl::handle(&mut conn, sub, &session)?,
        Some(("exec", sub)) => commands::api::handle(&mut conn, sub, &session)?,
        Some(("export", sub)) => commands::exporter::handle(&conn, sub, &session)?,
        Some(("doctor", sub)) => commands::doctor::handle(&conn, sub)?,
        Some(("config", sub)) => commands::settings::handle(&conn, sub)?,
        _ => {
            cli::build_cli().print_help()?;
            println!();
        }
    }
    Ok(())
}
