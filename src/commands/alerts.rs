// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use super::{owner_of, today};
use crate::engine::alerts::{self, AlertThresholds};
use crate::models::Alert;
use crate::utils::{maybe_print_json, parse_date, pretty_table};
use anyhow::Result;
use rusqlite::Connection;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("generate", sub)) => generate(conn, sub)?,
        Some(("list", sub)) => list(conn, sub)?,
        Some(("read", sub)) => {
            let owner = owner_of(sub);
            let key = sub.get_one::<String>("key").unwrap();
            alerts::mark_read(conn, &owner, key, today())?;
            println!("Marked '{}' read", key);
        }
        Some(("dismiss", sub)) => {
            let owner = owner_of(sub);
            let key = sub.get_one::<String>("key").unwrap();
            alerts::dismiss(conn, &owner, key)?;
            println!("Dismissed '{}'", key);
        }
        Some(("snooze", sub)) => {
            let owner = owner_of(sub);
            let key = sub.get_one::<String>("key").unwrap();
            let until = parse_date(sub.get_one::<String>("until").unwrap())?;
            alerts::snooze(conn, &owner, key, until)?;
            println!("Snoozed '{}' until {}", key, until);
        }
        _ => {}
    }
    Ok(())
}

fn print_alerts(data: &[Alert]) {
    let rows: Vec<Vec<String>> = data
        .iter()
        .map(|a| {
            let mut state = Vec::new();
            if a.is_read {
                state.push("read");
            }
            if a.is_dismissed {
                state.push("dismissed");
            }
            if a.snoozed_until.is_some() {
                state.push("snoozed");
            }
            vec![
                a.severity.as_str().into(),
                a.key.clone(),
                a.title.clone(),
                state.join(","),
            ]
        })
        .collect();
    println!("{}", pretty_table(&["Severity", "Key", "Title", "State"], rows));
}

fn generate(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let owner = owner_of(sub);
    let date = match sub.get_one::<String>("date") {
        Some(s) => parse_date(s)?,
        None => today(),
    };
    let thresholds = AlertThresholds::load(conn, &owner)?;
    let data = alerts::generate(conn, &owner, date, &thresholds)?;
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
        println!("{} alerts after regeneration", data.len());
        print_alerts(&data);
    }
    Ok(())
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let owner = owner_of(sub);
    let data = if sub.get_flag("all") {
        alerts::list_all(conn, &owner)?
    } else {
        alerts::list_active(conn, &owner, today())?
    };
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
        if data.is_empty() {
            println!("No alerts");
        } else {
            print_alerts(&data);
        }
    }
    Ok(())
}
