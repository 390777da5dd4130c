// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use super::{owner_of, today};
use crate::engine::aggregator;
use crate::engine::forecast::{
    self, ForecastResult, Granularity, OneTimeAdjustment, WhatIf,
};
use crate::errors::CoreError;
use crate::utils::{maybe_print_json, parse_decimal, pretty_table};
use anyhow::Result;
use rusqlite::Connection;

fn horizon_of(sub: &clap::ArgMatches) -> (usize, Granularity) {
    if let Some(weeks) = sub.get_one::<usize>("weeks") {
        (*weeks, Granularity::Weekly)
    } else {
        let months = sub.get_one::<usize>("months").copied().unwrap_or(6);
        (months, Granularity::Monthly)
    }
}

fn what_if_of(sub: &clap::ArgMatches) -> Result<WhatIf> {
    let mut what_if = WhatIf::default();
    if let Some(s) = sub.get_one::<String>("adjust-balance") {
        what_if.balance_adjustment = Some(parse_decimal(s)?);
    }
    if let Some(s) = sub.get_one::<String>("add-income") {
        what_if.recurring_income = Some(parse_decimal(s)?);
    }
    if let Some(s) = sub.get_one::<String>("add-expense") {
        what_if.recurring_expense = Some(parse_decimal(s)?);
    }
    if let Some(values) = sub.get_many::<String>("one-time") {
        for v in values {
            let (period, amount) = v.split_once(':').ok_or_else(|| {
                CoreError::Validation(format!(
                    "invalid one-time adjustment '{}', expected PERIOD:AMOUNT",
                    v
                ))
            })?;
            let period: usize = period.parse().map_err(|_| {
                CoreError::Validation(format!("invalid period number '{}'", period))
            })?;
            if period == 0 {
                return Err(
                    CoreError::Validation("one-time period numbers start at 1".into()).into(),
                );
            }
            what_if.one_time.push(OneTimeAdjustment {
                period,
                amount: parse_decimal(amount)?,
            });
        }
    }
    Ok(what_if)
}

fn print_forecast(result: &ForecastResult) {
    let rows: Vec<Vec<String>> = result
        .periods
        .iter()
        .map(|p| {
            vec![
                p.label.clone(),
                format!("{:.2}", p.opening),
                format!("{:.2}", p.income),
                format!("{:.2}", p.expense),
                format!("{:.2}", p.closing),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(&["Period", "Opening", "Income", "Expense", "Closing"], rows)
    );
    if let Some(label) = &result.first_negative_period {
        println!("Warning: balance goes negative in {}", label);
    }
    for label in &result.excluded {
        println!("Note: period {} could not be computed and was skipped", label);
    }
}

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    let owner = owner_of(m);
    let (horizon, granularity) = horizon_of(m);
    let what_if = what_if_of(m)?;
    let result = forecast::compute_forecast(conn, &owner, today(), horizon, granularity, &what_if)?;
    if !maybe_print_json(m.get_flag("json"), m.get_flag("jsonl"), &result)? {
        print_forecast(&result);
    }
    Ok(())
}

pub fn handle_aggregate(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    let owner = owner_of(m);
    let from = crate::utils::parse_date(m.get_one::<String>("from").unwrap())?;
    let to = crate::utils::parse_date(m.get_one::<String>("to").unwrap())?;
    if to < from {
        return Err(CoreError::Validation("range end before range start".into()).into());
    }
    let events = aggregator::aggregate(conn, &owner, from, to)?;
    if !maybe_print_json(m.get_flag("json"), m.get_flag("jsonl"), &events)? {
        let rows: Vec<Vec<String>> = events
            .iter()
            .map(|e| {
                vec![
                    e.date.to_string(),
                    e.direction.as_str().into(),
                    format!("{:.2}", e.amount),
                    match e.source {
                        aggregator::EventSource::Actual => "actual".into(),
                        aggregator::EventSource::Projected => "projected".into(),
                    },
                    e.description.clone(),
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(&["Date", "Direction", "Amount", "Source", "Description"], rows)
        );
        let totals = aggregator::period_totals(&events);
        println!(
            "Income {:.2}, expenses {:.2}, net {:.2}",
            totals.income,
            totals.expense,
            totals.income - totals.expense
        );
    }
    Ok(())
}

pub fn handle_scenario(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("save", sub)) => {
            let owner = owner_of(sub);
            let name = sub.get_one::<String>("name").unwrap();
            let what_if = what_if_of(sub)?;
            forecast::save_scenario(conn, &owner, name, &what_if)?;
            println!("Saved scenario '{}'", name);
        }
        Some(("list", sub)) => {
            let owner = owner_of(sub);
            let data = forecast::list_scenarios(conn, &owner)?;
            let json: Vec<serde_json::Value> = data
                .iter()
                .map(|(name, w)| {
                    serde_json::json!({ "name": name, "params": w })
                })
                .collect();
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &json)? {
                let rows: Vec<Vec<String>> = data
                    .iter()
                    .map(|(name, w)| {
                        vec![
                            name.clone(),
                            w.balance_adjustment
                                .map(|d| d.to_string())
                                .unwrap_or_default(),
                            w.recurring_income.map(|d| d.to_string()).unwrap_or_default(),
                            w.recurring_expense
                                .map(|d| d.to_string())
                                .unwrap_or_default(),
                            w.one_time
                                .iter()
                                .map(|a| format!("{}:{}", a.period, a.amount))
                                .collect::<Vec<_>>()
                                .join(", "),
                        ]
                    })
                    .collect();
                println!(
                    "{}",
                    pretty_table(
                        &["Name", "Balance adj", "Add income", "Add expense", "One-time"],
                        rows,
                    )
                );
            }
        }
        Some(("delete", sub)) => {
            let owner = owner_of(sub);
            let name = sub.get_one::<String>("name").unwrap();
            forecast::delete_scenario(conn, &owner, name)?;
            println!("Deleted scenario '{}'", name);
        }
        Some(("run", sub)) => {
            let owner = owner_of(sub);
            let name = sub.get_one::<String>("name").unwrap();
            let (horizon, granularity) = horizon_of(sub);
            let result =
                forecast::compute_scenario(conn, &owner, today(), name, horizon, granularity)?;
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &result)? {
                println!("Scenario '{}':", name);
                print_forecast(&result);
            }
        }
        Some(("compare", sub)) => {
            let owner = owner_of(sub);
            let name = sub.get_one::<String>("name").unwrap();
            let (horizon, granularity) = horizon_of(sub);
            let comparison =
                forecast::compare_scenario(conn, &owner, today(), name, horizon, granularity)?;
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &comparison)? {
                let rows: Vec<Vec<String>> = comparison
                    .deltas
                    .iter()
                    .map(|d| {
                        vec![
                            d.label.clone(),
                            format!("{:.2}", d.baseline_closing),
                            format!("{:.2}", d.scenario_closing),
                            format!("{:+.2}", d.delta),
                        ]
                    })
                    .collect();
                println!(
                    "{}",
                    pretty_table(&["Period", "Baseline", "Scenario", "Delta"], rows)
                );
                println!("Final-period delta: {:+.2}", comparison.total_delta);
            }
        }
        _ => {}
    }
    Ok(())
}
