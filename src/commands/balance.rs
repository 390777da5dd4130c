// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use super::{owner_of, today};
use crate::db::exclusive_tx;
use crate::utils::{
    get_base_currency, maybe_print_json, parse_date, parse_decimal, pretty_table,
};
use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use serde::Serialize;

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("set", sub)) => set(conn, sub)?,
        Some(("show", sub)) => show(conn, sub)?,
        Some(("history", sub)) => history(conn, sub)?,
        _ => {}
    }
    Ok(())
}

/// Replace the owner's current opening balance. The demotion of the
/// previous current row and the insert happen in one locked
/// transaction, keeping the one-current-row-per-owner invariant even
/// under concurrent writers.
pub fn set_current(
    conn: &mut Connection,
    owner: &str,
    amount: Decimal,
    currency: &str,
    as_of: NaiveDate,
    note: Option<&str>,
) -> Result<()> {
    let tx = exclusive_tx(conn)?;
    tx.execute(
        "UPDATE opening_balances SET is_current=0 WHERE owner=?1 AND is_current=1",
        params![owner],
    )?;
    tx.execute(
        "INSERT INTO opening_balances(owner, amount, currency, as_of, is_current, note)
         VALUES (?1, ?2, ?3, ?4, 1, ?5)",
        params![owner, amount.to_string(), currency, as_of.to_string(), note],
    )?;
    tx.commit()?;
    Ok(())
}

fn set(conn: &mut Connection, sub: &clap::ArgMatches) -> Result<()> {
    let owner = owner_of(sub);
    let amount = parse_decimal(sub.get_one::<String>("amount").unwrap())?;
    let currency = match sub.get_one::<String>("currency") {
        Some(c) => c.to_uppercase(),
        None => get_base_currency(conn)?,
    };
    let as_of = match sub.get_one::<String>("date") {
        Some(s) => parse_date(s)?,
        None => today(),
    };
    let note = sub.get_one::<String>("note").map(|s| s.as_str());
    set_current(conn, &owner, amount, &currency, as_of, note)?;
    println!("Opening balance set to {} {} as of {}", amount, currency, as_of);
    Ok(())
}

#[derive(Serialize)]
struct BalanceRow {
    amount: String,
    currency: String,
    as_of: String,
    is_current: bool,
    note: String,
}

fn query_rows(conn: &Connection, owner: &str, current_only: bool) -> Result<Vec<BalanceRow>> {
    let sql = if current_only {
        "SELECT amount, currency, as_of, is_current, note FROM opening_balances
         WHERE owner=?1 AND is_current=1"
    } else {
        "SELECT amount, currency, as_of, is_current, note FROM opening_balances
         WHERE owner=?1 ORDER BY as_of DESC, id DESC"
    };
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params![owner])?;
    let mut out = Vec::new();
    while let Some(r) = rows.next()? {
        out.push(BalanceRow {
            amount: r.get(0)?,
            currency: r.get(1)?,
            as_of: r.get(2)?,
            is_current: r.get::<_, i64>(3)? != 0,
            note: r.get::<_, Option<String>>(4)?.unwrap_or_default(),
        });
    }
    Ok(out)
}

fn show(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let owner = owner_of(sub);
    let data = query_rows(conn, &owner, true)?;
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
        match data.first() {
            Some(b) => println!("Current balance: {} {} (as of {})", b.amount, b.currency, b.as_of),
            None => println!("No opening balance set for '{}'", owner),
        }
    }
    Ok(())
}

fn history(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let owner = owner_of(sub);
    let data = query_rows(conn, &owner, false)?;
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
        let rows: Vec<Vec<String>> = data
            .iter()
            .map(|b| {
                vec![
                    b.as_of.clone(),
                    b.amount.clone(),
                    b.currency.clone(),
                    if b.is_current { "current".into() } else { String::new() },
                    b.note.clone(),
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(&["As of", "Amount", "CCY", "", "Note"], rows)
        );
    }
    Ok(())
}
