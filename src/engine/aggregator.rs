// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Merges actual ledger entries with projected occurrences of
//! not-yet-materialized obligations. This is the single source of truth
//! for "don't count it twice": an occurrence whose (source kind, source
//! id, year, month) already exists in the ledger is never projected
//! again. Both the forecast engine and dashboard-style consumers go
//! through here.

use crate::engine::amortization::{self, LoanTerms};
use crate::engine::enrichment;
use crate::models::{
    BillingCycle, Direction, InstallmentPlan, LedgerEntry, Loan, RecurringObligation, SourceKind,
    SourceLink, Subscription,
};
use crate::utils::{clamp_day, month_add, months_between, occurrence_date, parse_decimal};
use anyhow::Result;
use chrono::{Datelike, NaiveDate};
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashSet;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    Actual,
    Projected,
}

/// One cash movement in a date range, real or projected.
#[derive(Debug, Clone, Serialize)]
pub struct CashFlowEvent {
    pub date: NaiveDate,
    pub direction: Direction,
    pub amount: Decimal,
    pub source: EventSource,
    pub kind: Option<SourceKind>,
    pub source_id: Option<i64>,
    pub occurrence: Option<i64>,
    pub description: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PeriodTotals {
    pub income: Decimal,
    pub expense: Decimal,
}

pub fn period_totals(events: &[CashFlowEvent]) -> PeriodTotals {
    let mut t = PeriodTotals::default();
    for e in events {
        match e.direction {
            Direction::Income => t.income += e.amount,
            Direction::Expense => t.expense += e.amount,
        }
    }
    t
}

pub fn load_entries(
    conn: &Connection,
    owner: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<LedgerEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, date, amount, direction, currency, original_amount, original_currency,
                exchange_rate, category, note, source_kind, source_id, occurrence_number
         FROM ledger_entries WHERE owner=?1 AND date>=?2 AND date<=?3
         ORDER BY date, id",
    )?;
    let mut rows = stmt.query(params![owner, from.to_string(), to.to_string()])?;
    let mut out = Vec::new();
    while let Some(r) = rows.next()? {
        let date: String = r.get(1)?;
        let amount: String = r.get(2)?;
        let direction: String = r.get(3)?;
        let original_amount: String = r.get(5)?;
        let exchange_rate: String = r.get(7)?;
        let source_kind: Option<String> = r.get(10)?;
        let source = match source_kind {
            Some(k) => Some(SourceLink {
                kind: SourceKind::from_str(&k)?,
                id: r.get(11)?,
                occurrence: r.get(12)?,
            }),
            None => None,
        };
        out.push(LedgerEntry {
            id: r.get(0)?,
            owner: owner.to_string(),
            date: crate::utils::parse_date(&date)?,
            amount: parse_decimal(&amount)?,
            direction: Direction::from_str(&direction)?,
            currency: r.get(4)?,
            original_amount: parse_decimal(&original_amount)?,
            original_currency: r.get(6)?,
            exchange_rate: parse_decimal(&exchange_rate)?,
            category: r.get(8)?,
            note: r.get(9)?,
            source,
        });
    }
    Ok(out)
}

pub fn load_recurring(conn: &Connection, owner: &str) -> Result<Vec<RecurringObligation>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, amount, direction, day_of_month, start_date, end_date, is_active
         FROM recurring_obligations WHERE owner=?1 ORDER BY id",
    )?;
    let mut rows = stmt.query(params![owner])?;
    let mut out = Vec::new();
    while let Some(r) = rows.next()? {
        let amount: String = r.get(2)?;
        let direction: String = r.get(3)?;
        let start: String = r.get(5)?;
        let end: Option<String> = r.get(6)?;
        out.push(RecurringObligation {
            id: r.get(0)?,
            owner: owner.to_string(),
            name: r.get(1)?,
            amount: parse_decimal(&amount)?,
            direction: Direction::from_str(&direction)?,
            day_of_month: r.get::<_, i64>(4)? as u32,
            start_date: crate::utils::parse_date(&start)?,
            end_date: end.map(|s| crate::utils::parse_date(&s)).transpose()?,
            is_active: r.get::<_, i64>(7)? != 0,
        });
    }
    Ok(out)
}

pub fn load_installments(conn: &Connection, owner: &str) -> Result<Vec<InstallmentPlan>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, total_amount, period_count, periods_completed, day_of_month,
                start_date, direction, status
         FROM installment_plans WHERE owner=?1 ORDER BY id",
    )?;
    let mut rows = stmt.query(params![owner])?;
    let mut out = Vec::new();
    while let Some(r) = rows.next()? {
        let total: String = r.get(2)?;
        let start: String = r.get(6)?;
        let direction: String = r.get(7)?;
        let status: String = r.get(8)?;
        out.push(InstallmentPlan {
            id: r.get(0)?,
            owner: owner.to_string(),
            name: r.get(1)?,
            total_amount: parse_decimal(&total)?,
            period_count: r.get(3)?,
            periods_completed: r.get(4)?,
            day_of_month: r.get::<_, i64>(5)? as u32,
            start_date: crate::utils::parse_date(&start)?,
            direction: Direction::from_str(&direction)?,
            completed: status == "completed",
        });
    }
    Ok(out)
}

pub fn load_loans(conn: &Connection, owner: &str) -> Result<Vec<Loan>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, principal, monthly_payment, annual_rate, total_periods, periods_made,
                remaining_balance, day_of_month, start_date, status
         FROM loans WHERE owner=?1 ORDER BY id",
    )?;
    let mut rows = stmt.query(params![owner])?;
    let mut out = Vec::new();
    while let Some(r) = rows.next()? {
        let principal: String = r.get(2)?;
        let payment: String = r.get(3)?;
        let rate: String = r.get(4)?;
        let remaining: String = r.get(7)?;
        let start: String = r.get(9)?;
        let status: String = r.get(10)?;
        out.push(Loan {
            id: r.get(0)?,
            owner: owner.to_string(),
            name: r.get(1)?,
            principal: parse_decimal(&principal)?,
            monthly_payment: parse_decimal(&payment)?,
            annual_rate: parse_decimal(&rate)?,
            total_periods: r.get(5)?,
            periods_made: r.get(6)?,
            remaining_balance: parse_decimal(&remaining)?,
            day_of_month: r.get::<_, i64>(8)? as u32,
            start_date: crate::utils::parse_date(&start)?,
            completed: status == "completed",
        });
    }
    Ok(out)
}

pub fn load_subscriptions(conn: &Connection, owner: &str) -> Result<Vec<Subscription>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, amount, billing_cycle, next_renewal, renewals_made, is_active
         FROM subscriptions WHERE owner=?1 ORDER BY id",
    )?;
    let mut rows = stmt.query(params![owner])?;
    let mut out = Vec::new();
    while let Some(r) = rows.next()? {
        let amount: String = r.get(2)?;
        let cycle: String = r.get(3)?;
        let renewal: String = r.get(4)?;
        out.push(Subscription {
            id: r.get(0)?,
            owner: owner.to_string(),
            name: r.get(1)?,
            amount: parse_decimal(&amount)?,
            billing_cycle: BillingCycle::from_str(&cycle)?,
            next_renewal: crate::utils::parse_date(&renewal)?,
            renewals_made: r.get(5)?,
            is_active: r.get::<_, i64>(6)? != 0,
        });
    }
    Ok(out)
}

type MaterializedKey = (SourceKind, i64, i32, u32);

fn materialized_set(entries: &[LedgerEntry]) -> HashSet<MaterializedKey> {
    entries
        .iter()
        .filter_map(|e| {
            e.source
                .map(|s| (s.kind, s.id, e.date.year(), e.date.month()))
        })
        .collect()
}

/// Actual entries plus deduplicated projections for `[from, to]`,
/// sorted by date.
pub fn aggregate(
    conn: &Connection,
    owner: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<CashFlowEvent>> {
    let entries = load_entries(conn, owner, from, to)?;
    let materialized = materialized_set(&entries);

    let mut events: Vec<CashFlowEvent> = entries
        .iter()
        .map(|e| CashFlowEvent {
            date: e.date,
            direction: e.direction,
            amount: e.amount,
            source: EventSource::Actual,
            kind: e.source.map(|s| s.kind),
            source_id: e.source.map(|s| s.id),
            occurrence: e.source.map(|s| s.occurrence),
            description: e
                .note
                .clone()
                .or_else(|| e.category.clone())
                .unwrap_or_else(|| "ledger entry".into()),
        })
        .collect();

    project_recurring(conn, owner, from, to, &materialized, &mut events)?;
    project_installments(conn, owner, from, to, &materialized, &mut events)?;
    project_loans(conn, owner, from, to, &materialized, &mut events)?;
    project_subscriptions(conn, owner, from, to, &materialized, &mut events)?;

    events.sort_by(|a, b| a.date.cmp(&b.date).then(a.description.cmp(&b.description)));
    Ok(events)
}

fn project_recurring(
    conn: &Connection,
    owner: &str,
    from: NaiveDate,
    to: NaiveDate,
    materialized: &HashSet<MaterializedKey>,
    events: &mut Vec<CashFlowEvent>,
) -> Result<()> {
    for ob in load_recurring(conn, owner)? {
        if !ob.is_active {
            continue;
        }
        let span = months_between(from, to);
        for offset in 0..=span {
            let (y, m) = month_add(from.year(), from.month(), offset);
            let date = clamp_day(y, m, ob.day_of_month);
            if date < from || date > to || date < ob.start_date {
                continue;
            }
            if ob.end_date.is_some_and(|end| date > end) {
                continue;
            }
            if materialized.contains(&(SourceKind::Recurring, ob.id, y, m)) {
                continue;
            }
            events.push(CashFlowEvent {
                date,
                direction: ob.direction,
                amount: ob.amount,
                source: EventSource::Projected,
                kind: Some(SourceKind::Recurring),
                source_id: Some(ob.id),
                occurrence: Some(months_between(ob.start_date, date) + 1),
                description: ob.name.clone(),
            });
        }
    }
    Ok(())
}

fn project_installments(
    conn: &Connection,
    owner: &str,
    from: NaiveDate,
    to: NaiveDate,
    materialized: &HashSet<MaterializedKey>,
    events: &mut Vec<CashFlowEvent>,
) -> Result<()> {
    for plan in load_installments(conn, owner)? {
        if plan.completed || plan.periods_completed >= plan.period_count {
            continue;
        }
        for number in plan.periods_completed + 1..=plan.period_count {
            let date = occurrence_date(plan.start_date, plan.day_of_month, number);
            if date > to {
                break;
            }
            if date < from {
                continue;
            }
            if materialized.contains(&(SourceKind::Installment, plan.id, date.year(), date.month()))
            {
                continue;
            }
            events.push(CashFlowEvent {
                date,
                direction: plan.direction,
                amount: enrichment::occurrence_amount(&plan, number)?,
                source: EventSource::Projected,
                kind: Some(SourceKind::Installment),
                source_id: Some(plan.id),
                occurrence: Some(number),
                description: plan.name.clone(),
            });
        }
    }
    Ok(())
}

fn project_loans(
    conn: &Connection,
    owner: &str,
    from: NaiveDate,
    to: NaiveDate,
    materialized: &HashSet<MaterializedKey>,
    events: &mut Vec<CashFlowEvent>,
) -> Result<()> {
    for loan in load_loans(conn, owner)? {
        if loan.completed || loan.periods_made >= loan.total_periods {
            continue;
        }
        let schedule = amortization::build_schedule(&LoanTerms::from(&loan), from)?;
        for entry in schedule.iter().filter(|e| e.period_number > loan.periods_made) {
            if entry.due_date > to {
                break;
            }
            if entry.due_date < from {
                continue;
            }
            let key = (
                SourceKind::Loan,
                loan.id,
                entry.due_date.year(),
                entry.due_date.month(),
            );
            if materialized.contains(&key) {
                continue;
            }
            events.push(CashFlowEvent {
                date: entry.due_date,
                direction: Direction::Expense,
                amount: entry.payment,
                source: EventSource::Projected,
                kind: Some(SourceKind::Loan),
                source_id: Some(loan.id),
                occurrence: Some(entry.period_number),
                description: loan.name.clone(),
            });
        }
    }
    Ok(())
}

fn project_subscriptions(
    conn: &Connection,
    owner: &str,
    from: NaiveDate,
    to: NaiveDate,
    materialized: &HashSet<MaterializedKey>,
    events: &mut Vec<CashFlowEvent>,
) -> Result<()> {
    for sub in load_subscriptions(conn, owner)? {
        if !sub.is_active {
            continue;
        }
        let anchor_day = sub.next_renewal.day();
        let mut date = sub.next_renewal;
        let mut number = sub.renewals_made + 1;
        while date <= to {
            if date >= from
                && !materialized.contains(&(
                    SourceKind::Subscription,
                    sub.id,
                    date.year(),
                    date.month(),
                ))
            {
                events.push(CashFlowEvent {
                    date,
                    direction: Direction::Expense,
                    amount: sub.amount,
                    source: EventSource::Projected,
                    kind: Some(SourceKind::Subscription),
                    source_id: Some(sub.id),
                    occurrence: Some(number),
                    description: sub.name.clone(),
                });
            }
            let (y, m) = month_add(date.year(), date.month(), sub.billing_cycle.months() as i64);
            date = clamp_day(y, m, anchor_day);
            number += 1;
        }
    }
    Ok(())
}
