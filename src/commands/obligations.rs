// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use super::owner_of;
use crate::errors::CoreError;
use crate::models::Direction;
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
    let direction = Direction::from_str(sub.get_one::<String>("direction").unwrap())?;
    let day = *sub.get_one::<u32>("day").unwrap();
    if !(1..=31).contains(&day) {
        return Err(CoreError::Validation("day must be between 1 and 31".into()).into());
    }
    let start = parse_date(sub.get_one::<String>("start").unwrap())?;
    let end = sub
        .get_one::<String>("end")
        .map(|s| parse_date(s))
        .transpose()?;
    if let Some(end) = end {
        if end < start {
            return Err(CoreError::Validation("end date before start date".into()).into());
        }
    }

    conn.execute(
        "INSERT INTO recurring_obligations(owner, name, amount, direction, day_of_month, start_date, end_date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            owner,
            name,
            amount.to_string(),
            direction.as_str(),
            day,
            start.to_string(),
            end.map(|d| d.to_string())
        ],
    )?;
    println!("Added fixed {} '{}' of {} on day {}", direction.as_str(), name, amount, day);
    Ok(())
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let owner = owner_of(sub);
    let data = crate::engine::aggregator::load_recurring(conn, &owner)?;
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
        let rows: Vec<Vec<String>> = data
            .iter()
            .map(|o| {
                vec![
                    o.id.to_string(),
                    o.name.clone(),
                    o.direction.as_str().into(),
                    format!("{:.2}", o.amount),
                    o.day_of_month.to_string(),
                    o.start_date.to_string(),
                    o.end_date.map(|d| d.to_string()).unwrap_or_default(),
                    if o.is_active { "active".into() } else { "paused".into() },
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(
                &["Id", "Name", "Direction", "Amount", "Day", "Start", "End", "State"],
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
        "UPDATE recurring_obligations SET is_active=1, resumed_at=datetime('now')
         WHERE owner=?1 AND id=?2"
    } else {
        "UPDATE recurring_obligations SET is_active=0, paused_at=datetime('now')
         WHERE owner=?1 AND id=?2"
    };
    let n = conn.execute(sql, params![owner, id])?;
    if n == 0 {
        return Err(CoreError::NotFound(format!("fixed entry {}", id)).into());
    }
    println!(
        "Fixed entry {} {}",
        id,
        if active { "resumed" } else { "paused" }
    );
    Ok(())
}
