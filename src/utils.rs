// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::errors::CoreError;
use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use comfy_table::{presets::UTF8_FULL, Cell, Table};
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::{Decimal, RoundingStrategy};

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", s))
}

pub fn parse_month(s: &str) -> Result<String> {
    chrono::NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d")
        .with_context(|| format!("Invalid month '{}', expected YYYY-MM", s))?;
    Ok(s.to_string())
}

pub fn parse_decimal(s: &str) -> Result<Decimal> {
    s.parse::<Decimal>()
        .with_context(|| format!("Invalid decimal '{}'", s))
}

/// Round to 2 fraction digits, away from zero on the midpoint.
pub fn round_money(d: Decimal) -> Decimal {
    d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn pretty_table(headers: &[&str], rows: Vec<Vec<String>>) -> Table {
    let mut t = Table::new();
    t.load_preset(UTF8_FULL);
    t.set_header(headers.iter().map(|h| Cell::new(*h)));
    for r in rows {
        t.add_row(r.into_iter().map(Cell::new));
    }
    t
}

pub fn maybe_print_json<T: serde::Serialize>(
    json_flag: bool,
    jsonl_flag: bool,
    v: &T,
) -> Result<bool> {
    if json_flag {
        println!("{}", serde_json::to_string_pretty(v)?);
        return Ok(true);
    }
    if jsonl_flag {
        // If v is an array, stream each element; else stream single line
        let val = serde_json::to_value(v)?;
        if let Some(arr) = val.as_array() {
            for item in arr {
                println!("{}", serde_json::to_string(item)?);
            }
        } else {
            println!("{}", serde_json::to_string(&val)?);
        }
        return Ok(true);
    }
    Ok(false)
}

// Base currency settings
pub fn get_base_currency(conn: &Connection) -> Result<String> {
    let v: Option<String> = conn
        .query_row(
            "SELECT value FROM settings WHERE key='base_currency'",
            [],
            |r| r.get(0),
        )
        .optional()?;
    Ok(v.unwrap_or_else(|| "USD".to_string()))
}

pub fn set_base_currency(conn: &Connection, ccy: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value) VALUES('base_currency', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        params![ccy],
    )?;
    Ok(())
}

fn find_rate(
    conn: &Connection,
    date: NaiveDate,
    base: &str,
    quote: &str,
) -> Result<Option<Decimal>> {
    let mut stmt = conn.prepare(
        "SELECT rate FROM fx_rates WHERE base=?1 AND quote=?2 AND date<=?3 ORDER BY date DESC LIMIT 1"
    )?;
    let r: Option<String> = stmt
        .query_row(params![base, quote, date.to_string()], |r| r.get(0))
        .optional()?;
    if let Some(s) = r {
        let d = s
            .parse::<Decimal>()
            .with_context(|| format!("Invalid rate '{}' for {}/{}", s, base, quote))?;
        Ok(Some(d))
    } else {
        Ok(None)
    }
}

/// Effective 'from'->'to' rate using the closest on-or-before stored rate.
/// We store base->quote rates; pairs not found directly go via the base
/// currency hub, then the reciprocal is tried last.
pub fn fx_rate(
    conn: &Connection,
    date: NaiveDate,
    from_ccy: &str,
    to_ccy: &str,
) -> Result<Option<Decimal>> {
    if from_ccy == to_ccy {
        return Ok(Some(Decimal::ONE));
    }
    let hub = get_base_currency(conn)?;

    if to_ccy == hub {
        if let Some(r) = find_rate(conn, date, &hub, from_ccy)? {
            if !r.is_zero() {
                return Ok(Some(Decimal::ONE / r));
            }
        }
    } else if from_ccy == hub {
        if let Some(r) = find_rate(conn, date, &hub, to_ccy)? {
            return Ok(Some(r));
        }
    } else if let (Some(a), Some(b)) = (
        fx_rate(conn, date, from_ccy, &hub)?,
        fx_rate(conn, date, &hub, to_ccy)?,
    ) {
        return Ok(Some(a * b));
    }

    if let Some(r) = find_rate(conn, date, to_ccy, from_ccy)? {
        if !r.is_zero() {
            return Ok(Some(Decimal::ONE / r));
        }
    }
    Ok(None)
}

/// Convert an amount from 'from_ccy' to 'to_ccy', returning the converted
/// amount and the rate used. Unknown pairs pass through at rate 1 so a
/// missing rate never blocks recording an entry; `doctor` flags the gap.
pub fn fx_convert(
    conn: &Connection,
    date: NaiveDate,
    amount: Decimal,
    from_ccy: &str,
    to_ccy: &str,
) -> Result<(Decimal, Decimal)> {
    match fx_rate(conn, date, from_ccy, to_ccy)? {
        Some(rate) => Ok((round_money(amount * rate), rate)),
        None => Ok((amount, Decimal::ONE)),
    }
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if NaiveDate::from_ymd_opt(year, 2, 29).is_some() {
                29
            } else {
                28
            }
        }
        _ => 30,
    }
}

/// Step (year, month) forward by `offset` months.
pub fn month_add(year: i32, month: u32, offset: i64) -> (i32, u32) {
    let total = year as i64 * 12 + (month as i64 - 1) + offset;
    (
        total.div_euclid(12) as i32,
        (total.rem_euclid(12) + 1) as u32,
    )
}

/// Resolve a day-of-month within a month, clamping to the month's last
/// day. Day 31 in a 30-day month lands on the 30th, never in the next
/// month.
pub fn clamp_day(year: i32, month: u32, day: u32) -> NaiveDate {
    let d = day.min(days_in_month(year, month));
    // d is always in 1..=days_in_month at this point
    NaiveDate::from_ymd_opt(year, month, d.max(1)).unwrap_or_default()
}

/// Due date of the 1-based occurrence `number` of a monthly schedule
/// anchored at `start` with the given day-of-month.
pub fn occurrence_date(start: NaiveDate, day_of_month: u32, number: i64) -> NaiveDate {
    let (y, m) = month_add(start.year(), start.month(), number - 1);
    clamp_day(y, m, day_of_month)
}

/// Whole months from the month of `start` to the month of `date`
/// (0 when both fall in the same month, negative when `date` is earlier).
pub fn months_between(start: NaiveDate, date: NaiveDate) -> i64 {
    (date.year() as i64 * 12 + date.month() as i64)
        - (start.year() as i64 * 12 + start.month() as i64)
}

/// Split `total` into `n` equal 2-dp parts, pushing the rounding residual
/// into the last part so the parts always sum back to `total` exactly.
/// Shared by installment enrichment and any other equal-split allocation.
pub fn split_even(total: Decimal, n: i64) -> Result<(Decimal, Decimal), CoreError> {
    if n <= 0 {
        return Err(CoreError::Computation(format!(
            "cannot split {} into {} parts",
            total, n
        )));
    }
    let parts = Decimal::from(n);
    let per = round_money(total / parts);
    let last = total - per * (parts - Decimal::ONE);
    Ok((per, last))
}
