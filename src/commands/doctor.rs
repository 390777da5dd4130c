// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Integrity checks over stored state. Each check prints its findings;
//! a clean run ends with a single OK line.

use crate::utils::parse_decimal;
use anyhow::Result;
use rusqlite::{params, Connection};
use rust_decimal::Decimal;

pub fn handle(conn: &Connection, _m: &clap::ArgMatches) -> Result<()> {
    let mut issues = 0usize;
    issues += check_duplicate_materializations(conn)?;
    issues += check_multiple_current_balances(conn)?;
    issues += check_counter_overflow(conn)?;
    issues += check_status_mismatch(conn)?;
    issues += check_non_amortizing_loans(conn)?;
    issues += check_unconverted_entries(conn)?;
    issues += check_orphan_source_links(conn)?;
    if issues == 0 {
        println!("OK: no integrity issues found");
    } else {
        println!("{} issue(s) found", issues);
    }
    Ok(())
}

// The unique source-link index prevents these going forward; databases
// created before it may still carry duplicates.
fn check_duplicate_materializations(conn: &Connection) -> Result<usize> {
    let mut stmt = conn.prepare(
        "SELECT owner, source_kind, source_id, occurrence_number, COUNT(*)
         FROM ledger_entries WHERE source_kind IS NOT NULL
         GROUP BY owner, source_kind, source_id, occurrence_number
         HAVING COUNT(*) > 1",
    )?;
    let mut rows = stmt.query([])?;
    let mut n = 0;
    while let Some(r) = rows.next()? {
        let owner: String = r.get(0)?;
        let kind: String = r.get(1)?;
        let id: i64 = r.get(2)?;
        let occurrence: i64 = r.get(3)?;
        let count: i64 = r.get(4)?;
        println!(
            "{} {} occurrence {} (owner '{}') was materialized {} times",
            kind, id, occurrence, owner, count
        );
        n += 1;
    }
    Ok(n)
}

fn check_multiple_current_balances(conn: &Connection) -> Result<usize> {
    let mut stmt = conn.prepare(
        "SELECT owner, COUNT(*) FROM opening_balances WHERE is_current=1
         GROUP BY owner HAVING COUNT(*) > 1",
    )?;
    let mut rows = stmt.query([])?;
    let mut n = 0;
    while let Some(r) = rows.next()? {
        let owner: String = r.get(0)?;
        let count: i64 = r.get(1)?;
        println!("Owner '{}' has {} current opening balances", owner, count);
        n += 1;
    }
    Ok(n)
}

fn check_counter_overflow(conn: &Connection) -> Result<usize> {
    let mut n = 0;
    let mut stmt = conn.prepare(
        "SELECT owner, id, name, periods_completed, period_count FROM installment_plans
         WHERE periods_completed > period_count",
    )?;
    let mut rows = stmt.query([])?;
    while let Some(r) = rows.next()? {
        let owner: String = r.get(0)?;
        let id: i64 = r.get(1)?;
        let name: String = r.get(2)?;
        let done: i64 = r.get(3)?;
        let count: i64 = r.get(4)?;
        println!(
            "Installment plan {} '{}' (owner '{}') has {} completed periods out of {}",
            id, name, owner, done, count
        );
        n += 1;
    }
    let mut stmt = conn.prepare(
        "SELECT owner, id, name, periods_made, total_periods FROM loans
         WHERE periods_made > total_periods",
    )?;
    let mut rows = stmt.query([])?;
    while let Some(r) = rows.next()? {
        let owner: String = r.get(0)?;
        let id: i64 = r.get(1)?;
        let name: String = r.get(2)?;
        let made: i64 = r.get(3)?;
        let total: i64 = r.get(4)?;
        println!(
            "Loan {} '{}' (owner '{}') has {} payments out of {}",
            id, name, owner, made, total
        );
        n += 1;
    }
    Ok(n)
}

fn check_status_mismatch(conn: &Connection) -> Result<usize> {
    let mut n = 0;
    let mut stmt = conn.prepare(
        "SELECT id, name, status, periods_completed, period_count FROM installment_plans
         WHERE (status='completed' AND periods_completed < period_count)
            OR (status='active' AND periods_completed >= period_count)",
    )?;
    let mut rows = stmt.query([])?;
    while let Some(r) = rows.next()? {
        let id: i64 = r.get(0)?;
        let name: String = r.get(1)?;
        let status: String = r.get(2)?;
        println!("Installment plan {} '{}' status '{}' disagrees with its counters", id, name, status);
        n += 1;
    }
    let mut stmt = conn.prepare(
        "SELECT id, name, status, periods_made, total_periods FROM loans
         WHERE (status='completed' AND periods_made < total_periods)
            OR (status='active' AND periods_made >= total_periods)",
    )?;
    let mut rows = stmt.query([])?;
    while let Some(r) = rows.next()? {
        let id: i64 = r.get(0)?;
        let name: String = r.get(1)?;
        let status: String = r.get(2)?;
        println!("Loan {} '{}' status '{}' disagrees with its counters", id, name, status);
        n += 1;
    }
    Ok(n)
}

fn check_non_amortizing_loans(conn: &Connection) -> Result<usize> {
    let mut stmt = conn.prepare(
        "SELECT id, name, monthly_payment, annual_rate, remaining_balance FROM loans
         WHERE status='active'",
    )?;
    let mut rows = stmt.query([])?;
    let mut n = 0;
    while let Some(r) = rows.next()? {
        let id: i64 = r.get(0)?;
        let name: String = r.get(1)?;
        let payment = parse_decimal(&r.get::<_, String>(2)?)?;
        let rate = parse_decimal(&r.get::<_, String>(3)?)?;
        let remaining = parse_decimal(&r.get::<_, String>(4)?)?;
        let interest = crate::utils::round_money(remaining * rate / Decimal::from(12));
        if payment <= interest && remaining > Decimal::ZERO {
            println!(
                "Loan {} '{}': payment {} does not cover monthly interest {}, it will never amortize",
                id, name, payment, interest
            );
            n += 1;
        }
    }
    Ok(n)
}

fn check_unconverted_entries(conn: &Connection) -> Result<usize> {
    let mut stmt = conn.prepare(
        "SELECT COUNT(*) FROM ledger_entries
         WHERE original_currency <> currency AND exchange_rate='1'",
    )?;
    let count: i64 = stmt.query_row([], |r| r.get(0))?;
    if count > 0 {
        println!(
            "{} ledger entries were recorded cross-currency at rate 1; store the missing fx rates and re-enter them",
            count
        );
        return Ok(1);
    }
    Ok(0)
}

fn check_orphan_source_links(conn: &Connection) -> Result<usize> {
    let mut n = 0;
    for (kind, table) in [
        ("recurring", "recurring_obligations"),
        ("installment", "installment_plans"),
        ("loan", "loans"),
        ("subscription", "subscriptions"),
    ] {
        let sql = format!(
            "SELECT COUNT(*) FROM ledger_entries e
             WHERE e.source_kind=?1 AND NOT EXISTS (SELECT 1 FROM {} s WHERE s.id=e.source_id)",
            table
        );
        let count: i64 = conn.query_row(&sql, params![kind], |r| r.get(0))?;
        if count > 0 {
            println!(
                "{} ledger entries reference {} rows that no longer exist",
                count, kind
            );
            n += 1;
        }
    }
    Ok(n)
}
