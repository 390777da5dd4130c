// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Converts obligations due on a reference date into ledger entries,
//! exactly once. Each obligation is its own atomic unit: it is checked
//! and written inside one IMMEDIATE transaction, a failure never rolls
//! back or blocks the others, and re-running the whole thing is safe
//! because the source-link unique index plus an explicit existence
//! check make materialization idempotent.

use crate::db::exclusive_tx;
use crate::engine::audit::{self, AuditEvent, AuditSink};
use crate::engine::enrichment;
use crate::models::{Direction, SourceKind};
use crate::utils::{
    clamp_day, get_base_currency, months_between, occurrence_date, parse_decimal, round_money,
};
use anyhow::Result;
use chrono::{Datelike, NaiveDate};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize)]
pub struct MaterializedCharge {
    pub kind: SourceKind,
    pub source_id: i64,
    pub name: String,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub direction: Direction,
    pub occurrence: i64,
    /// True when this was the obligation's final occurrence.
    pub completed_obligation: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportItem {
    pub kind: SourceKind,
    pub source_id: i64,
    pub name: String,
    pub reason: String,
}

/// User-visible outcome of one automation run. Failures carry reasons,
/// never raw internals.
#[derive(Debug, Clone, Serialize)]
pub struct MaterializationReport {
    pub reference_date: NaiveDate,
    pub preview: bool,
    pub materialized: Vec<MaterializedCharge>,
    pub skipped: Vec<ReportItem>,
    pub failed: Vec<ReportItem>,
}

impl MaterializationReport {
    pub fn summary(&self) -> String {
        format!(
            "{} materialized, {} skipped, {} failed",
            self.materialized.len(),
            self.skipped.len(),
            self.failed.len()
        )
    }
}

enum Outcome {
    Done(MaterializedCharge),
    Skip(String),
}

fn entry_exists(
    tx: &Transaction<'_>,
    owner: &str,
    kind: SourceKind,
    source_id: i64,
    occurrence: i64,
) -> Result<bool> {
    let hit: Option<i64> = tx
        .query_row(
            "SELECT 1 FROM ledger_entries
             WHERE owner=?1 AND source_kind=?2 AND source_id=?3 AND occurrence_number=?4",
            params![owner, kind.as_str(), source_id, occurrence],
            |r| r.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}

#[allow(clippy::too_many_arguments)]
fn insert_entry(
    tx: &Transaction<'_>,
    owner: &str,
    date: NaiveDate,
    amount: Decimal,
    direction: Direction,
    kind: SourceKind,
    source_id: i64,
    occurrence: i64,
    note: &str,
) -> Result<()> {
    let currency = get_base_currency(tx)?;
    tx.execute(
        "INSERT INTO ledger_entries(owner, date, amount, direction, currency,
                original_amount, original_currency, exchange_rate, note,
                source_kind, source_id, occurrence_number)
         VALUES (?1, ?2, ?3, ?4, ?5, ?3, ?5, '1', ?6, ?7, ?8, ?9)",
        params![
            owner,
            date.to_string(),
            amount.to_string(),
            direction.as_str(),
            currency,
            note,
            kind.as_str(),
            source_id,
            occurrence
        ],
    )?;
    Ok(())
}

fn materialize_recurring(
    conn: &mut Connection,
    owner: &str,
    id: i64,
    reference_date: NaiveDate,
    preview: bool,
) -> Result<Outcome> {
    let tx = exclusive_tx(conn)?;
    let row = tx
        .query_row(
            "SELECT name, amount, direction, day_of_month, start_date, end_date, is_active
             FROM recurring_obligations WHERE owner=?1 AND id=?2",
            params![owner, id],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, i64>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, Option<String>>(5)?,
                    r.get::<_, i64>(6)?,
                ))
            },
        )
        .optional()?;
    let Some((name, amount, direction, day, start, end, is_active)) = row else {
        return Ok(Outcome::Skip("obligation no longer exists".into()));
    };
    if is_active == 0 {
        return Ok(Outcome::Skip("paused".into()));
    }
    let start = crate::utils::parse_date(&start)?;
    if reference_date < start {
        return Ok(Outcome::Skip("not started yet".into()));
    }
    if let Some(end) = end {
        if reference_date > crate::utils::parse_date(&end)? {
            return Ok(Outcome::Skip("end date passed".into()));
        }
    }
    let due = clamp_day(reference_date.year(), reference_date.month(), day as u32);
    if due != reference_date {
        return Ok(Outcome::Skip(format!("not due, charges on day {}", day)));
    }
    let occurrence = months_between(start, reference_date) + 1;
    if entry_exists(&tx, owner, SourceKind::Recurring, id, occurrence)? {
        return Ok(Outcome::Skip("already materialized".into()));
    }

    let amount = parse_decimal(&amount)?;
    let direction = Direction::from_str(&direction)?;
    let charge = MaterializedCharge {
        kind: SourceKind::Recurring,
        source_id: id,
        name: name.clone(),
        date: reference_date,
        amount,
        direction,
        occurrence,
        completed_obligation: false,
    };
    if preview {
        return Ok(Outcome::Done(charge));
    }
    insert_entry(
        &tx,
        owner,
        reference_date,
        amount,
        direction,
        SourceKind::Recurring,
        id,
        occurrence,
        &name,
    )?;
    tx.commit()?;
    Ok(Outcome::Done(charge))
}

fn materialize_installment(
    conn: &mut Connection,
    owner: &str,
    id: i64,
    reference_date: NaiveDate,
    preview: bool,
) -> Result<Outcome> {
    let tx = exclusive_tx(conn)?;
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
        return Ok(Outcome::Skip("plan no longer exists".into()));
    };
    if status == "completed" || completed >= count {
        return Ok(Outcome::Skip("completed".into()));
    }
    let start = crate::utils::parse_date(&start)?;
    let number = completed + 1;
    let due = occurrence_date(start, day as u32, number);
    if due != reference_date {
        return Ok(Outcome::Skip(format!("next period due {}", due)));
    }
    if entry_exists(&tx, owner, SourceKind::Installment, id, number)? {
        return Ok(Outcome::Skip("already materialized".into()));
    }

    let plan = crate::models::InstallmentPlan {
        id,
        owner: owner.to_string(),
        name: name.clone(),
        total_amount: parse_decimal(&total)?,
        period_count: count,
        periods_completed: completed,
        day_of_month: day as u32,
        start_date: start,
        direction: Direction::from_str(&direction)?,
        completed: false,
    };
    let amount = enrichment::occurrence_amount(&plan, number)?;
    let is_final = number == count;
    let charge = MaterializedCharge {
        kind: SourceKind::Installment,
        source_id: id,
        name: name.clone(),
        date: reference_date,
        amount,
        direction: plan.direction,
        occurrence: number,
        completed_obligation: is_final,
    };
    if preview {
        return Ok(Outcome::Done(charge));
    }
    insert_entry(
        &tx,
        owner,
        reference_date,
        amount,
        plan.direction,
        SourceKind::Installment,
        id,
        number,
        &name,
    )?;
    tx.execute(
        "UPDATE installment_plans SET periods_completed=?1,
                status=CASE WHEN ?1 >= period_count THEN 'completed' ELSE 'active' END
         WHERE id=?2",
        params![number, id],
    )?;
    tx.commit()?;
    Ok(Outcome::Done(charge))
}

fn materialize_loan(
    conn: &mut Connection,
    owner: &str,
    id: i64,
    reference_date: NaiveDate,
    preview: bool,
) -> Result<Outcome> {
    let tx = exclusive_tx(conn)?;
    let row = tx
        .query_row(
            "SELECT name, monthly_payment, annual_rate, total_periods, periods_made,
                    remaining_balance, day_of_month, start_date, status
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
                    r.get::<_, i64>(6)?,
                    r.get::<_, String>(7)?,
                    r.get::<_, String>(8)?,
                ))
            },
        )
        .optional()?;
    let Some((name, payment, rate, total, made, remaining, day, start, status)) = row else {
        return Ok(Outcome::Skip("loan no longer exists".into()));
    };
    if status == "completed" || made >= total {
        return Ok(Outcome::Skip("completed".into()));
    }
    let start = crate::utils::parse_date(&start)?;
    let number = made + 1;
    let due = occurrence_date(start, day as u32, number);
    if due != reference_date {
        return Ok(Outcome::Skip(format!("next payment due {}", due)));
    }
    if entry_exists(&tx, owner, SourceKind::Loan, id, number)? {
        return Ok(Outcome::Skip("already materialized".into()));
    }

    let payment = parse_decimal(&payment)?;
    let rate = parse_decimal(&rate)?;
    let remaining = parse_decimal(&remaining)?;
    let interest = round_money(remaining * rate / Decimal::from(12));
    let raw_principal = payment - interest;
    let is_final = number == total || raw_principal >= remaining;
    let (amount, principal) = if is_final {
        (remaining + interest, remaining)
    } else {
        (payment, raw_principal)
    };
    let new_remaining = (remaining - principal).max(Decimal::ZERO);

    let charge = MaterializedCharge {
        kind: SourceKind::Loan,
        source_id: id,
        name: name.clone(),
        date: reference_date,
        amount,
        direction: Direction::Expense,
        occurrence: number,
        completed_obligation: is_final,
    };
    if preview {
        return Ok(Outcome::Done(charge));
    }
    insert_entry(
        &tx,
        owner,
        reference_date,
        amount,
        Direction::Expense,
        SourceKind::Loan,
        id,
        number,
        &name,
    )?;
    tx.execute(
        "UPDATE loans SET periods_made=?1, remaining_balance=?2,
                status=CASE WHEN ?3 THEN 'completed' ELSE 'active' END
         WHERE id=?4",
        params![number, new_remaining.to_string(), is_final, id],
    )?;
    tx.commit()?;
    Ok(Outcome::Done(charge))
}

fn materialize_subscription(
    conn: &mut Connection,
    owner: &str,
    id: i64,
    reference_date: NaiveDate,
    preview: bool,
) -> Result<Outcome> {
    let tx = exclusive_tx(conn)?;
    let row = tx
        .query_row(
            "SELECT name, amount, billing_cycle, next_renewal, renewals_made, is_active
             FROM subscriptions WHERE owner=?1 AND id=?2",
            params![owner, id],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, i64>(4)?,
                    r.get::<_, i64>(5)?,
                ))
            },
        )
        .optional()?;
    let Some((name, amount, cycle, renewal, made, is_active)) = row else {
        return Ok(Outcome::Skip("subscription no longer exists".into()));
    };
    if is_active == 0 {
        return Ok(Outcome::Skip("paused".into()));
    }
    let renewal = crate::utils::parse_date(&renewal)?;
    if renewal != reference_date {
        return Ok(Outcome::Skip(format!("renews on {}", renewal)));
    }
    let occurrence = made + 1;
    if entry_exists(&tx, owner, SourceKind::Subscription, id, occurrence)? {
        return Ok(Outcome::Skip("already materialized".into()));
    }

    let cycle = crate::models::BillingCycle::from_str(&cycle)?;
    let amount = parse_decimal(&amount)?;
    let charge = MaterializedCharge {
        kind: SourceKind::Subscription,
        source_id: id,
        name: name.clone(),
        date: reference_date,
        amount,
        direction: Direction::Expense,
        occurrence,
        completed_obligation: false,
    };
    if preview {
        return Ok(Outcome::Done(charge));
    }
    insert_entry(
        &tx,
        owner,
        reference_date,
        amount,
        Direction::Expense,
        SourceKind::Subscription,
        id,
        occurrence,
        &name,
    )?;
    let (y, m) = crate::utils::month_add(
        renewal.year(),
        renewal.month(),
        cycle.months() as i64,
    );
    let next = clamp_day(y, m, renewal.day());
    tx.execute(
        "UPDATE subscriptions SET renewals_made=?1, next_renewal=?2 WHERE id=?3",
        params![occurrence, next.to_string(), id],
    )?;
    tx.commit()?;
    Ok(Outcome::Done(charge))
}

fn candidates(conn: &Connection, owner: &str, table: &str) -> Result<Vec<(i64, String)>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, name FROM {} WHERE owner=?1 ORDER BY id",
        table
    ))?;
    let mut rows = stmt.query(params![owner])?;
    let mut out = Vec::new();
    while let Some(r) = rows.next()? {
        out.push((r.get(0)?, r.get(1)?));
    }
    Ok(out)
}

/// Materialize everything due on `reference_date` for one owner.
///
/// Preview mode runs the identical per-obligation logic but commits
/// nothing, returning what would be materialized.
pub fn run(
    conn: &mut Connection,
    owner: &str,
    reference_date: NaiveDate,
    preview: bool,
    sink: Option<&AuditSink>,
) -> Result<MaterializationReport> {
    let mut report = MaterializationReport {
        reference_date,
        preview,
        materialized: Vec::new(),
        skipped: Vec::new(),
        failed: Vec::new(),
    };

    let batches: Vec<(SourceKind, Vec<(i64, String)>)> = vec![
        (
            SourceKind::Recurring,
            candidates(conn, owner, "recurring_obligations")?,
        ),
        (
            SourceKind::Installment,
            candidates(conn, owner, "installment_plans")?,
        ),
        (SourceKind::Loan, candidates(conn, owner, "loans")?),
        (
            SourceKind::Subscription,
            candidates(conn, owner, "subscriptions")?,
        ),
    ];

    for (kind, items) in batches {
        for (id, name) in items {
            let outcome = match kind {
                SourceKind::Recurring => {
                    materialize_recurring(conn, owner, id, reference_date, preview)
                }
                SourceKind::Installment => {
                    materialize_installment(conn, owner, id, reference_date, preview)
                }
                SourceKind::Loan => materialize_loan(conn, owner, id, reference_date, preview),
                SourceKind::Subscription => {
                    materialize_subscription(conn, owner, id, reference_date, preview)
                }
            };
            match outcome {
                Ok(Outcome::Done(charge)) => {
                    audit::emit(
                        sink,
                        AuditEvent {
                            owner: owner.to_string(),
                            action: if charge.completed_obligation {
                                "materialized_final".into()
                            } else {
                                "materialized".into()
                            },
                            detail: format!(
                                "{} {} occurrence {} amount {:.2}",
                                kind.as_str(),
                                name,
                                charge.occurrence,
                                charge.amount
                            ),
                            date: reference_date,
                        },
                    );
                    report.materialized.push(charge);
                }
                Ok(Outcome::Skip(reason)) => {
                    report.skipped.push(ReportItem {
                        kind,
                        source_id: id,
                        name,
                        reason,
                    });
                }
                // One bad obligation never aborts the run.
                Err(e) => {
                    audit::emit(
                        sink,
                        AuditEvent {
                            owner: owner.to_string(),
                            action: "failed".into(),
                            detail: format!("{} {}: {}", kind.as_str(), name, e),
                            date: reference_date,
                        },
                    );
                    report.failed.push(ReportItem {
                        kind,
                        source_id: id,
                        name,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    Ok(report)
}
