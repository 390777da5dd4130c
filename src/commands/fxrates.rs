// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::errors::CoreError;
use crate::utils::{fx_rate, parse_date, parse_decimal, pretty_table, set_base_currency};
use anyhow::Result;
use rusqlite::{params, Connection};
use rust_decimal::Decimal;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("set-base", sub)) => {
            let ccy = sub.get_one::<String>("currency").unwrap().to_uppercase();
            set_base_currency(conn, &ccy)?;
            println!("Base currency set to {}", ccy);
        }
        Some(("set", sub)) => set(conn, sub)?,
        Some(("list", _)) => list(conn)?,
        Some(("convert", sub)) => convert(conn, sub)?,
        _ => {}
    }
    Ok(())
}

fn set(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let date = parse_date(sub.get_one::<String>("date").unwrap())?;
    let base = sub.get_one::<String>("base").unwrap().to_uppercase();
    let quote = sub.get_one::<String>("quote").unwrap().to_uppercase();
    let rate = parse_decimal(sub.get_one::<String>("rate").unwrap())?;
    if rate <= Decimal::ZERO {
        return Err(CoreError::Validation("rate must be positive".into()).into());
    }
    conn.execute(
        "INSERT INTO fx_rates(date, base, quote, rate) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(date, base, quote) DO UPDATE SET rate=excluded.rate",
        params![date.to_string(), base, quote, rate.to_string()],
    )?;
    println!("Stored {}/{} = {} for {}", base, quote, rate, date);
    Ok(())
}

fn list(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare(
        "SELECT date, base, quote, rate FROM fx_rates ORDER BY date DESC, base, quote",
    )?;
    let mut rows_iter = stmt.query([])?;
    let mut rows: Vec<Vec<String>> = Vec::new();
    while let Some(r) = rows_iter.next()? {
        rows.push(vec![r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?]);
    }
    println!("{}", pretty_table(&["Date", "Base", "Quote", "Rate"], rows));
    Ok(())
}

fn convert(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let date = parse_date(sub.get_one::<String>("date").unwrap())?;
    let amount = parse_decimal(sub.get_one::<String>("amount").unwrap())?;
    let from = sub.get_one::<String>("from").unwrap().to_uppercase();
    let to = sub.get_one::<String>("to").unwrap().to_uppercase();
    match fx_rate(conn, date, &from, &to)? {
        Some(rate) => {
            let converted = crate::utils::round_money(amount * rate);
            println!("{} {} = {} {} (rate {})", amount, from, converted, to, rate);
        }
        None => {
            return Err(CoreError::NotFound(format!(
                "no exchange rate for {}/{} on or before {}",
                from, to, date
            ))
            .into());
        }
    }
    Ok(())
}
