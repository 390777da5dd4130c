// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use super::{owner_of, today};
use crate::errors::CoreError;
use crate::models::Direction;
use crate::utils::{
    fx_convert, get_base_currency, maybe_print_json, parse_date, parse_decimal, parse_month,
    pretty_table,
};
use anyhow::Result;
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => add(conn, sub)?,
        Some(("list", sub)) => list(conn, sub)?,
        Some(("delete", sub)) => delete(conn, sub)?,
        _ => {}
    }
    Ok(())
}

fn add(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let owner = owner_of(sub);
    let date = match sub.get_one::<String>("date") {
        Some(s) => parse_date(s)?,
        None => today(),
    };
    let amount = parse_decimal(sub.get_one::<String>("amount").unwrap())?;
    if amount <= Decimal::ZERO {
        return Err(CoreError::Validation("amount must be positive".into()).into());
    }
    let direction = Direction::from_str(sub.get_one::<String>("direction").unwrap())?;
    let category = sub.get_one::<String>("category").map(|s| s.to_string());
    let note = sub.get_one::<String>("note").map(|s| s.to_string());

    let base = get_base_currency(conn)?;
    let original_ccy = sub
        .get_one::<String>("currency")
        .map(|s| s.to_uppercase())
        .unwrap_or_else(|| base.clone());
    let (converted, rate) = fx_convert(conn, date, amount, &original_ccy, &base)?;

    conn.execute(
        "INSERT INTO ledger_entries(owner, date, amount, direction, currency,
                original_amount, original_currency, exchange_rate, category, note)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            owner,
            date.to_string(),
            converted.to_string(),
            direction.as_str(),
            base,
            amount.to_string(),
            original_ccy,
            rate.to_string(),
            category,
            note
        ],
    )?;
    println!(
        "Recorded {} {} {} on {}",
        direction.as_str(),
        converted,
        base,
        date
    );
    Ok(())
}

#[derive(Serialize)]
pub struct LedgerRow {
    pub id: i64,
    pub date: String,
    pub direction: String,
    pub amount: String,
    pub currency: String,
    pub category: String,
    pub source: String,
    pub note: String,
}

pub fn query_rows(conn: &Connection, sub: &clap::ArgMatches) -> Result<Vec<LedgerRow>> {
    let owner = owner_of(sub);
    let mut sql = String::from(
        "SELECT id, date, direction, amount, currency, category, source_kind, source_id, note
         FROM ledger_entries WHERE owner=?",
    );
    let mut params_vec: Vec<String> = vec![owner];
    if let Some(month) = sub.get_one::<String>("month") {
        sql.push_str(" AND substr(date,1,7)=?");
        params_vec.push(parse_month(month)?);
    }
    sql.push_str(" ORDER BY date DESC, id DESC");
    if let Some(limit) = sub.get_one::<usize>("limit") {
        sql.push_str(" LIMIT ?");
        params_vec.push(limit.to_string());
    }

    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn rusqlite::ToSql> = params_vec
        .iter()
        .map(|s| s as &dyn rusqlite::ToSql)
        .collect();
    let mut rows = stmt.query(rusqlite::params_from_iter(params))?;

    let mut data = Vec::new();
    while let Some(r) = rows.next()? {
        let source_kind: Option<String> = r.get(6)?;
        let source_id: Option<i64> = r.get(7)?;
        let source = match (source_kind, source_id) {
            (Some(k), Some(id)) => format!("{}#{}", k, id),
            _ => String::new(),
        };
        data.push(LedgerRow {
            id: r.get(0)?,
            date: r.get(1)?,
            direction: r.get(2)?,
            amount: r.get(3)?,
            currency: r.get(4)?,
            category: r.get::<_, Option<String>>(5)?.unwrap_or_default(),
            source,
            note: r.get::<_, Option<String>>(8)?.unwrap_or_default(),
        });
    }
    Ok(data)
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let json_flag = sub.get_flag("json");
    let jsonl_flag = sub.get_flag("jsonl");
    let data = query_rows(conn, sub)?;
    if !maybe_print_json(json_flag, jsonl_flag, &data)? {
        let rows: Vec<Vec<String>> = data
            .iter()
            .map(|r| {
                vec![
                    r.id.to_string(),
                    r.date.clone(),
                    r.direction.clone(),
                    r.amount.clone(),
                    r.currency.clone(),
                    r.category.clone(),
                    r.source.clone(),
                    r.note.clone(),
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(
                &["Id", "Date", "Direction", "Amount", "CCY", "Category", "Source", "Note"],
                rows,
            )
        );
    }
    Ok(())
}

fn delete(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let owner = owner_of(sub);
    let id = *sub.get_one::<i64>("id").unwrap();
    let n = conn.execute(
        "DELETE FROM ledger_entries WHERE owner=?1 AND id=?2",
        params![owner, id],
    )?;
    if n == 0 {
        return Err(CoreError::NotFound(format!("ledger entry {}", id)).into());
    }
    println!("Deleted ledger entry {}", id);
    Ok(())
}
