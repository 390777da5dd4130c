// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use super::{owner_of, today};
use crate::db::exclusive_tx;
use crate::engine::enrichment;
use crate::errors::CoreError;
use crate::models::{Direction, InstallmentPlan, SourceKind};
use crate::utils::{
    get_base_currency, maybe_print_json, parse_date, parse_decimal, pretty_table,
};
use anyhow::Result;
use chrono::{Datelike, NaiveDate};
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => add(conn, sub)?,
        Some(("list", sub)) => list(conn, sub)?,
        Some(("status", sub)) => status(conn, sub)?,
        Some(("pay", sub)) => pay(conn, sub)?,
        Some(("reverse", sub)) => reverse(conn, sub)?,
        _ => {}
    }
    Ok(())
}

fn find_plan(conn: &Connection, owner: &str, id: i64) -> Result<InstallmentPlan> {
    crate::engine::aggregator::load_installments(conn, owner)?
        .into_iter()
        .find(|p| p.id == id)
        .ok_or_else(|| CoreError::NotFound(format!("installment plan {}", id)).into())
}

fn add(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let owner = owner_of(sub);
    let name = sub.get_one::<String>("name").unwrap();
    let total = parse_decimal(sub.get_one::<String>("total").unwrap())?;
    if total <= Decimal::ZERO {
        return Err(CoreError::Validation("total amount must be positive".into()).into());
    }
    let periods = *sub.get_one::<i64>("periods").unwrap();
    if periods <= 0 {
        return Err(CoreError::Validation("period count must be positive".into()).into());
    }
    let start = parse_date(sub.get_one::<String>("start").unwrap())?;
    let day = sub.get_one::<u32>("day").copied().unwrap_or_else(|| start.day());
    if !(1..=31).contains(&day) {
        return Err(CoreError::Validation("day must be between 1 and 31".into()).into());
    }
    let direction = Direction::from_str(sub.get_one::<String>("direction").unwrap())?;

    conn.execute(
        "INSERT INTO installment_plans(owner, name, total_amount, period_count, day_of_month,
                start_date, direction)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            owner,
            name,
            total.to_string(),
            periods,
            day,
            start.to_string(),
            direction.as_str()
        ],
    )?;
    println!(
        "Added installment plan '{}': {} over {} periods starting {}",
        name, total, periods, start
    );
    Ok(())
}

#[derive(Serialize)]
struct PlanRow<'a> {
    #[serde(flatten)]
    plan: &'a InstallmentPlan,
    #[serde(flatten)]
    enriched: enrichment::EnrichedInstallment,
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let owner = owner_of(sub);
    let plans = crate::engine::aggregator::load_installments(conn, &owner)?;
    let reference = today();
    let data: Vec<PlanRow<'_>> = plans
        .iter()
        .map(|p| {
            Ok(PlanRow {
                plan: p,
                enriched: enrichment::enrich(p, reference)?,
            })
        })
        .collect::<Result<_>>()?;
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
        let rows: Vec<Vec<String>> = data
            .iter()
            .map(|r| {
                vec![
                    r.plan.id.to_string(),
                    r.plan.name.clone(),
                    format!("{:.2}", r.plan.total_amount),
                    format!("{}/{}", r.plan.periods_completed, r.plan.period_count),
                    format!("{:.2}", r.enriched.monthly_amount),
                    r.enriched.status.as_str().into(),
                    r.enriched
                        .next_due_date
                        .map(|d| d.to_string())
                        .unwrap_or_default(),
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(
                &["Id", "Name", "Total", "Paid", "Monthly", "Status", "Next due"],
                rows,
            )
        );
    }
    Ok(())
}

fn status(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let owner = owner_of(sub);
    let id = *sub.get_one::<i64>("id").unwrap();
    let plan = find_plan(conn, &owner, id)?;
    let enriched = enrichment::enrich(&plan, today())?;
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &enriched)? {
        println!("Plan:       {}", plan.name);
        println!("Status:     {}", enriched.status.as_str());
        println!(
            "Progress:   {}/{} periods ({}%)",
            plan.periods_completed, plan.period_count, enriched.progress_percentage
        );
        println!("Paid:       {:.2}", enriched.paid_amount);
        println!("Remaining:  {:.2}", enriched.remaining_amount);
        println!(
            "On track:   {}",
            if enriched.is_on_track { "yes" } else { "no" }
        );
        if let Some(next) = enriched.next_due_date {
            println!("Next due:   {}", next);
        }
    }
    Ok(())
}

fn plan_in_tx(
    tx: &rusqlite::Transaction<'_>,
    owner: &str,
    id: i64,
) -> Result<Option<InstallmentPlan>> {
    let row = tx
        .query_row(
            "SELECT name, total_amount, period_count, periods_completed, day_of_month,
                    start_date, direction, status
             FROM installment_plans WHERE owner=?1 AND id=?2",
            params![owner, id],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, i64>(2)?,
                    r.get::<_, i64>(3)?,
                    r.get::<_, i64>(4)?,
                    r.get::<_, String>(5)?,
                    r.get::<_, String>(6)?,
                    r.get::<_, String>(7)?,
                ))
            },
        )
        .optional()?;
    let Some((name, total, count, completed, day, start, direction, status)) = row else {
        return Ok(None);
    };
    Ok(Some(InstallmentPlan {
        id,
        owner: owner.to_string(),
        name,
        total_amount: parse_decimal(&total)?,
        period_count: count,
        periods_completed: completed,
        day_of_month: day as u32,
        start_date: parse_date(&start)?,
        direction: Direction::from_str(&direction)?,
        completed: status == "completed",
    }))
}

/// Record one installment dated `date`. The amount is the plan's even
/// split, with the final occurrence absorbing the rounding residual.
/// The counter is read inside the same locked transaction that advances
/// it, so concurrent payments land on consecutive occurrences.
pub fn pay_installment(
    conn: &mut Connection,
    owner: &str,
    id: i64,
    date: NaiveDate,
) -> Result<Decimal> {
    let tx = exclusive_tx(conn)?;
    let Some(plan) = plan_in_tx(&tx, owner, id)? else {
        return Err(CoreError::NotFound(format!("installment plan {}", id)).into());
    };
    if plan.completed || plan.periods_completed >= plan.period_count {
        return Err(
            CoreError::Validation(format!("installment plan {} is already completed", id)).into(),
        );
    }

    let number = plan.periods_completed + 1;
    let amount = enrichment::occurrence_amount(&plan, number)?;

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
            plan.direction.as_str(),
            currency,
            plan.name,
            SourceKind::Installment.as_str(),
            id,
            number
        ],
    )?;
    tx.execute(
        "UPDATE installment_plans SET periods_completed=?1,
                status=CASE WHEN ?1 >= period_count THEN 'completed' ELSE 'active' END
         WHERE owner=?2 AND id=?3",
        params![number, owner, id],
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
    let amount = pay_installment(conn, &owner, id, date)?;
    println!("Recorded installment of {} on {}", amount, date);
    Ok(())
}

/// Undo the most recent installment: delete its ledger entry and roll
/// the counter back one period. The counter is read under the same lock
/// that rewrites it, so concurrent reverses peel off distinct occurrences.
pub fn reverse_installment(conn: &mut Connection, owner: &str, id: i64) -> Result<()> {
    let tx = exclusive_tx(conn)?;
    let Some(plan) = plan_in_tx(&tx, owner, id)? else {
        return Err(CoreError::NotFound(format!("installment plan {}", id)).into());
    };
    if plan.periods_completed == 0 {
        return Err(CoreError::Validation(format!(
            "installment plan {} has no periods to reverse",
            id
        ))
        .into());
    }

    let number = plan.periods_completed;
    tx.execute(
        "DELETE FROM ledger_entries
         WHERE owner=?1 AND source_kind=?2 AND source_id=?3 AND occurrence_number=?4",
        params![owner, SourceKind::Installment.as_str(), id, number],
    )?;
    tx.execute(
        "UPDATE installment_plans SET periods_completed=?1, status='active'
         WHERE owner=?2 AND id=?3",
        params![number - 1, owner, id],
    )?;
    tx.commit()?;
    Ok(())
}

fn reverse(conn: &mut Connection, sub: &clap::ArgMatches) -> Result<()> {
    let owner = owner_of(sub);
    let id = *sub.get_one::<i64>("id").unwrap();
    reverse_installment(conn, &owner, id)?;
    println!("Reversed the most recent installment on plan {}", id);
    Ok(())
}
