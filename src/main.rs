// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use ledgerflow::{cli, commands, db};

fn main() -> Result<()> {
    let matches = cli::build_cli().get_matches();
    let mut conn = db::open_or_init()?;

    match matches.subcommand() {
        Some(("init", _)) => {
            println!("Database ready at {}", db::db_path()?.display());
        }
        Some(("balance", sub)) => commands::balance::handle(&mut conn, sub)?,
        Some(("tx", sub)) => commands::ledger::handle(&conn, sub)?,
        Some(("fixed", sub)) => commands::obligations::handle(&conn, sub)?,
        Some(("subscription", sub)) => commands::subscriptions::handle(&conn, sub)?,
        Some(("loan", sub)) => commands::loans::handle(&mut conn, sub)?,
        Some(("installment", sub)) => commands::installments::handle(&mut conn, sub)?,
        Some(("aggregate", sub)) => commands::forecast::handle_aggregate(&conn, sub)?,
        Some(("forecast", sub)) => commands::forecast::handle(&conn, sub)?,
        Some(("scenario", sub)) => commands::forecast::handle_scenario(&conn, sub)?,
        Some(("alerts", sub)) => commands::alerts::handle(&conn, sub)?,
        Some(("automation", sub)) => commands::automation::handle(&mut conn, sub)?,
        Some(("fx", sub)) => commands::fxrates::handle(&conn, sub)?,
        Some(("doctor", sub)) => commands::doctor::handle(&conn, sub)?,
        _ => {
            cli::build_cli().print_help()?;
            println!();
        }
    }
    Ok(())
}
