// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use super::{owner_of, today};
use crate::db::exclusive_tx;
use crate::engine::amortization::{self, LoanTerms};
use crate::errors::CoreError;
use crate::models::{Direction, Loan, SourceKind};
use crate::utils::{
    get_base_currency, maybe_print_json, parse_date, parse_decimal, pretty_table, round_money,
};
use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => add(conn, sub)?,
        Some(("list", sub)) => list(conn, sub)?,
        Some(("schedule", sub)) => schedule(conn, sub)?,
        Some(("pay", sub)) => pay(conn, sub)?,
        Some(("reverse", sub)) => reverse(conn, sub)?,
        _ => {}
    }
    Ok(())
}

fn find_loan(conn: &Connection, owner: &str, id: i64) -> Result<Loan> {
    crate::engine::aggregator::load_loans(conn, owner)?
        .into_iter()
        .find(|l| l.id == id)
        .ok_or_else(|| CoreError::NotFound(format!("loan {}", id)).into())
}

fn add(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let owner = owner_of(sub);
    let name = sub.get_one::<String>("name").unwrap();
    let principal = parse_decimal(sub.get_one::<String>("principal").unwrap())?;
    let rate = parse_decimal(sub.get_one::<String>("rate").unwrap())?;
    let periods = *sub.get_one::<i64>("periods").unwrap();
    let payment = parse_decimal(sub.get_one::<String>("payment").unwrap())?;
    let start = parse_date(sub.get_one::<String>("start").unwrap())?;
    let day = sub
        .get_one::<u32>("day")
        .copied()
        .unwrap_or_else(|| chrono::Datelike::day(&start));
    if !(1..=31).contains(&day) {
        return Err(CoreError::Validation("day must be between 1 and 31".into()).into());
    }

    let terms = LoanTerms {
        principal,
        annual_rate: rate,
        total_periods: periods,
        monthly_payment: payment,
        periods_made: 0,
        start_date: start,
        day_of_month: day,
    };
    amortization::validate_terms(&terms)?;

    conn.execute(
        "INSERT INTO loans(owner, name, principal, monthly_payment, annual_rate, total_periods,
                remaining_balance, day_of_month, start_date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?3, ?7, ?8)",
        params![
            owner,
            name,
            principal.to_string(),
            payment.to_string(),
            rate.to_string(),
            periods,
            day,
            start.to_string()
        ],
    )?;
    println!(
        "Added loan '{}': {} over {} periods at rate {}, first payment {}",
        name, principal, periods, rate, start
    );
    Ok(())
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let owner = owner_of(sub);
    let data = crate::engine::aggregator::load_loans(conn, &owner)?;
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
        let rows: Vec<Vec<String>> = data
            .iter()
            .map(|l| {
                vec![
                    l.id.to_string(),
                    l.name.clone(),
                    format!("{:.2}", l.principal),
                    format!("{:.2}", l.monthly_payment),
                    l.annual_rate.to_string(),
                    format!("{}/{}", l.periods_made, l.total_periods),
                    format!("{:.2}", l.remaining_balance),
                    if l.completed { "completed".into() } else { "active".into() },
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(
                &["Id", "Name", "Principal", "Payment", "Rate", "Paid", "Remaining", "State"],
                rows,
            )
        );
    }
    Ok(())
}

fn schedule(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let owner = owner_of(sub);
    let id = *sub.get_one::<i64>("id").unwrap();
    let loan = find_loan(conn, &owner, id)?;
    let data = amortization::build_schedule(&LoanTerms::from(&loan), today())?;
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
        let rows: Vec<Vec<String>> = data
            .iter()
            .map(|e| {
                vec![
                    e.period_number.to_string(),
                    e.due_date.to_string(),
                    format!("{:.2}", e.payment),
                    format!("{:.2}", e.interest_portion),
                    format!("{:.2}", e.principal_portion),
                    format!("{:.2}", e.remaining_after),
                    format!("{:?}", e.tag).to_lowercase(),
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(
                &["#", "Due", "Payment", "Interest", "Principal", "Remaining", "Tag"],
                rows,
            )
        );
    }
    Ok(())
}

/// Record one loan payment dated `date`, splitting it into interest and
/// principal against the live remaining balance. The counters are read
/// inside the same locked transaction that writes them back, so two
/// concurrent payments serialize onto consecutive occurrences.
pub fn pay_loan(conn: &mut Connection, owner: &str, id: i64, date: NaiveDate) -> Result<Decimal> {
    let tx = exclusive_tx(conn)?;
    let row = tx
        .query_row(
            "SELECT name, monthly_payment, annual_rate, total_periods, periods_made,
                    remaining_balance, status
             FROM loans WHERE owner=?1 AND id=?2",
            params![owner, id],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, i64>(3)?,
                    r.get::<_, i64>(4)?,
                    r.get::<_, String>(5)?,
                    r.get::<_, String>(6)?,
                ))
            },
        )
        .optional()?;
    let Some((name, payment, rate, total, made, remaining, status)) = row else {
        return Err(CoreError::NotFound(format!("loan {}", id)).into());
    };
    if status == "completed" || made >= total {
        return Err(CoreError::Validation(format!("loan {} is already paid off", id)).into());
    }

    let payment = parse_decimal(&payment)?;
    let rate = parse_decimal(&rate)?;
    let remaining = parse_decimal(&remaining)?;
    let number = made + 1;
    let interest = round_money(remaining * rate / Decimal::from(12));
    let raw_principal = payment - interest;
    let is_final = number == total || raw_principal >= remaining;
    let (amount, principal) = if is_final {
        (remaining + interest, remaining)
    } else {
        if raw_principal <= Decimal::ZERO {
            return Err(CoreError::Computation(format!(
                "payment {} does not cover interest {}",
                payment, interest
            ))
            .into());
        }
        (payment, raw_principal)
    };
    let new_remaining = (remaining - principal).max(Decimal::ZERO);

    let currency = get_base_currency(&tx)?;
    tx.execute(
        "INSERT INTO ledger_entries(owner, date, amount, direction, currency,
                original_amount, original_currency, exchange_rate, note,
                source_kind, source_id, occurrence_number)
         VALUES (?1, ?2, ?3, ?4, ?5, ?3, ?5, '1', ?6, ?7, ?8, ?9)",
        params![
            owner,
            date.to_string(),
            amount.to_string(),
            Direction::Expense.as_str(),
            currency,
            name,
            SourceKind::Loan.as_str(),
            id,
            number
        ],
    )?;
    tx.execute(
        "UPDATE loans SET periods_made=?1, remaining_balance=?2,
                status=CASE WHEN ?3 THEN 'completed' ELSE 'active' END
         WHERE owner=?4 AND id=?5",
        params![number, new_remaining.to_string(), is_final, owner, id],
    )?;
    tx.commit()?;
    Ok(amount)
}

fn pay(conn: &mut Connection, sub: &clap::ArgMatches) -> Result<()> {
    let owner = owner_of(sub);
    let id = *sub.get_one::<i64>("id").unwrap();
    let date = match sub.get_one::<String>("date") {
        Some(s) => parse_date(s)?,
        None => today(),
    };
    let amount = pay_loan(conn, &owner, id, date)?;
    println!("Recorded loan payment of {} on {}", amount, date);
    Ok(())
}

/// Undo the most recent payment: delete its ledger entry, roll the
/// counters back one period and recompute the balance from the schedule.
/// The counters are read under the same lock that rewrites them, so
/// concurrent reverses peel off distinct occurrences.
pub fn reverse_payment(conn: &mut Connection, owner: &str, id: i64) -> Result<()> {
    let tx = exclusive_tx(conn)?;
    let row = tx
        .query_row(
            "SELECT principal, monthly_payment, annual_rate, total_periods, periods_made,
                    day_of_month, start_date
             FROM loans WHERE owner=?1 AND id=?2",
            params![owner, id],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, i64>(3)?,
                    r.get::<_, i64>(4)?,
                    r.get::<_, i64>(5)?,
                    r.get::<_, String>(6)?,
                ))
            },
        )
        .optional()?;
    let Some((principal, payment, rate, total, made, day, start)) = row else {
        return Err(CoreError::NotFound(format!("loan {}", id)).into());
    };
    if made == 0 {
        return Err(CoreError::Validation(format!("loan {} has no payments to reverse", id)).into());
    }

    let terms = LoanTerms {
        principal: parse_decimal(&principal)?,
        annual_rate: parse_decimal(&rate)?,
        total_periods: total,
        monthly_payment: parse_decimal(&payment)?,
        periods_made: made,
        start_date: crate::utils::parse_date(&start)?,
        day_of_month: day as u32,
    };
    let number = made;
    let restored = amortization::balance_before_period(&terms, number, today())?;

    tx.execute(
        "DELETE FROM ledger_entries
         WHERE owner=?1 AND source_kind=?2 AND source_id=?3 AND occurrence_number=?4",
        params![owner, SourceKind::Loan.as_str(), id, number],
    )?;
    tx.execute(
        "UPDATE loans SET periods_made=?1, remaining_balance=?2, status='active'
         WHERE owner=?3 AND id=?4",
        params![number - 1, restored.to_string(), owner, id],
    )?;
    tx.commit()?;
    Ok(())
}

fn reverse(conn: &mut Connection, sub: &clap::ArgMatches) -> Result<()> {
    let owner = owner_of(sub);
    let id = *sub.get_one::<i64>("id").unwrap();
    reverse_payment(conn, &owner, id)?;
    println!("Reversed the most recent payment on loan {}", id);
    Ok(())
}
