// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use super::owner_of;
use crate::errors::CoreError;
use crate::models::BillingCycle;
use crate::utils::{maybe_print_json, parse_date, parse_decimal, pretty_table};
use anyhow::Result;
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use std::str::FromStr;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => add(conn, sub)?,
        Some(("list", sub)) => list(conn, sub)?,
        Some(("pause", sub)) => set_active(conn, sub, false)?,
        Some(("resume", sub)) => set_active(conn, sub, true)?,
        _ => {}
    }
    Ok(())
}

fn add(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let owner = owner_of(sub);
    let name = sub.get_one::<String>("name").unwrap();
    let amount = parse_decimal(sub.get_one::<String>("amount").unwrap())?;
    if amount <= Decimal::ZERO {
        return Err(CoreError::Validation("amount must be positive".into()).into());
    }
    let cycle = BillingCycle::from_str(sub.get_one::<String>("cycle").unwrap())?;
    let next = parse_date(sub.get_one::<String>("next").unwrap())?;

    conn.execute(
        "INSERT INTO subscriptions(owner, name, amount, billing_cycle, next_renewal)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![owner, name, amount.to_string(), cycle.as_str(), next.to_string()],
    )?;
    println!(
        "Added {} subscription '{}' of {}, next renewal {}",
        cycle.as_str(),
        name,
        amount,
        next
    );
    Ok(())
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let owner = owner_of(sub);
    let data = crate::engine::aggregator::load_subscriptions(conn, &owner)?;
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
        let rows: Vec<Vec<String>> = data
            .iter()
            .map(|s| {
                vec![
                    s.id.to_string(),
                    s.name.clone(),
                    format!("{:.2}", s.amount),
                    s.billing_cycle.as_str().into(),
                    s.next_renewal.to_string(),
                    s.renewals_made.to_string(),
                    if s.is_active { "active".into() } else { "paused".into() },
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(
                &["Id", "Name", "Amount", "Cycle", "Next renewal", "Renewals", "State"],
                rows,
            )
        );
    }
    Ok(())
}

fn set_active(conn: &Connection, sub: &clap::ArgMatches, active: bool) -> Result<()> {
    let owner = owner_of(sub);
    let id = *sub.get_one::<i64>("id").unwrap();
    let sql = if active {
        "UPDATE subscriptions SET is_active=1, resumed_at=datetime('now') WHERE owner=?1 AND id=?2"
    } else {
        "UPDATE subscriptions SET is_active=0, paused_at=datetime('now') WHERE owner=?1 AND id=?2"
    };
    let n = conn.execute(sql, params![owner, id])?;
    if n == 0 {
        return Err(CoreError::NotFound(format!("subscription {}", id)).into());
    }
    println!(
        "Subscription {} {}",
        id,
        if active { "resumed" } else { "paused" }
    );
    Ok(())
}
