// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use super::{owner_of, today};
use crate::engine::automation;
use crate::utils::{maybe_print_json, parse_date, pretty_table};
use anyhow::Result;
use rusqlite::Connection;
use std::sync::mpsc;

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches) -> Result<()> {
    let owner = owner_of(m);
    let reference_date = match m.get_one::<String>("date") {
        Some(s) => parse_date(s)?,
        None => today(),
    };
    let preview = m.get_flag("preview");

    let (sink, events) = mpsc::channel();
    let report = automation::run(conn, &owner, reference_date, preview, Some(&sink))?;
    drop(sink);

    if !maybe_print_json(m.get_flag("json"), m.get_flag("jsonl"), &report)? {
        if preview {
            println!("Preview for {} (nothing committed):", reference_date);
        } else {
            println!("Automation run for {}:", reference_date);
        }
        if !report.materialized.is_empty() {
            let rows: Vec<Vec<String>> = report
                .materialized
                .iter()
                .map(|c| {
                    vec![
                        c.kind.as_str().into(),
                        c.name.clone(),
                        format!("{:.2}", c.amount),
                        c.occurrence.to_string(),
                        if c.completed_obligation { "final".into() } else { String::new() },
                    ]
                })
                .collect();
            println!(
                "{}",
                pretty_table(&["Kind", "Name", "Amount", "Occurrence", ""], rows)
            );
        }
        for item in &report.failed {
            println!("Failed {} '{}': {}", item.kind.as_str(), item.name, item.reason);
        }
        println!("{}", report.summary());
    }

    for event in events.try_iter() {
        eprintln!("[audit] {} {} {}", event.date, event.action, event.detail);
    }
    Ok(())
}
