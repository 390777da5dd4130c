// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Derives a deduplicated notification set from forecast output and
//! direct obligation inspection. Every rule produces a deterministic
//! key; regeneration updates matching rows in place so read/dismiss/
//! snooze state survives recomputation.

use crate::engine::aggregator::{self, EventSource};
use crate::engine::forecast::{self, Granularity, WhatIf};
use crate::models::{Alert, AlertSeverity, Direction};
use crate::utils::{clamp_day, days_in_month, month_add, parse_decimal};
use anyhow::Result;
use chrono::{Datelike, Duration, NaiveDate};
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

/// Explicit threshold configuration. Compiled defaults, overridable
/// through `settings` globally (`alert.<name>`) and per owner
/// (`alert.<owner>.<name>`); the most specific value wins.
#[derive(Debug, Clone)]
pub struct AlertThresholds {
    /// Closing balances below zero but above this stay `warning`;
    /// below it they escalate to `critical`.
    pub critical_balance: Decimal,
    /// Positive closing balances under this raise `approaching_negative`.
    pub warning_balance: Decimal,
    /// Period expense above this multiple of average income raises
    /// `high_expenses`.
    pub high_expense_multiple: Decimal,
    /// Absolute amount a single expense entry must exceed.
    pub high_single_expense: Decimal,
    /// Income entry factor over the trailing 3-month average.
    pub high_income_factor: Decimal,
    /// Remaining occurrences at or under this raise `*_ending_soon`.
    pub ending_soon_periods: i64,
    /// Days ahead for `upcoming_payment`.
    pub upcoming_days: i64,
    /// How far ahead the generator forecasts, in months.
    pub horizon_months: usize,
    /// How far back unmaterialized occurrences count as overdue, in days.
    pub overdue_lookback_days: i64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        AlertThresholds {
            critical_balance: Decimal::from(-1000),
            warning_balance: Decimal::from(500),
            high_expense_multiple: Decimal::new(15, 1),
            high_single_expense: Decimal::from(1000),
            high_income_factor: Decimal::new(15, 1),
            ending_soon_periods: 3,
            upcoming_days: 3,
            horizon_months: 6,
            overdue_lookback_days: 60,
        }
    }
}

impl AlertThresholds {
    pub fn load(conn: &Connection, owner: &str) -> Result<Self> {
        let mut t = AlertThresholds::default();
        let lookup = |name: &str| -> Result<Option<String>> {
            let per_owner: Option<String> = conn
                .query_row(
                    "SELECT value FROM settings WHERE key=?1",
                    params![format!("alert.{}.{}", owner, name)],
                    |r| r.get(0),
                )
                .optional()?;
            if per_owner.is_some() {
                return Ok(per_owner);
            }
            let global: Option<String> = conn
                .query_row(
                    "SELECT value FROM settings WHERE key=?1",
                    params![format!("alert.{}", name)],
                    |r| r.get(0),
                )
                .optional()?;
            Ok(global)
        };
        if let Some(v) = lookup("critical_balance")? {
            t.critical_balance = parse_decimal(&v)?;
        }
        if let Some(v) = lookup("warning_balance")? {
            t.warning_balance = parse_decimal(&v)?;
        }
        if let Some(v) = lookup("high_expense_multiple")? {
            t.high_expense_multiple = parse_decimal(&v)?;
        }
        if let Some(v) = lookup("high_single_expense")? {
            t.high_single_expense = parse_decimal(&v)?;
        }
        if let Some(v) = lookup("high_income_factor")? {
            t.high_income_factor = parse_decimal(&v)?;
        }
        if let Some(v) = lookup("ending_soon_periods")? {
            t.ending_soon_periods = v.parse()?;
        }
        if let Some(v) = lookup("upcoming_days")? {
            t.upcoming_days = v.parse()?;
        }
        if let Some(v) = lookup("horizon_months")? {
            t.horizon_months = v.parse()?;
        }
        Ok(t)
    }
}

struct DerivedAlert {
    key: String,
    alert_type: String,
    severity: AlertSeverity,
    title: String,
    message: String,
    expires_at: Option<NaiveDate>,
}

fn derive(
    conn: &Connection,
    owner: &str,
    today: NaiveDate,
    thresholds: &AlertThresholds,
) -> Result<Vec<DerivedAlert>> {
    let mut out: Vec<DerivedAlert> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut push = |out: &mut Vec<DerivedAlert>, a: DerivedAlert| {
        if seen.insert(a.key.clone()) {
            out.push(a);
        }
    };

    // Forecast-driven rules.
    let result = forecast::compute_forecast(
        conn,
        owner,
        today,
        thresholds.horizon_months,
        Granularity::Monthly,
        &WhatIf::default(),
    )?;
    let income_periods = result
        .periods
        .iter()
        .filter(|p| p.income > Decimal::ZERO)
        .count();
    let avg_income = if income_periods > 0 {
        result
            .periods
            .iter()
            .map(|p| p.income)
            .sum::<Decimal>()
            / Decimal::from(income_periods as i64)
    } else {
        Decimal::ZERO
    };

    for p in &result.periods {
        if p.closing < Decimal::ZERO {
            let severity = if p.closing < thresholds.critical_balance {
                AlertSeverity::Critical
            } else {
                AlertSeverity::Warning
            };
            push(
                &mut out,
                DerivedAlert {
                    key: format!("negative_cashflow:{}", p.label),
                    alert_type: "negative_cashflow".into(),
                    severity,
                    title: format!("Negative balance projected for {}", p.label),
                    message: format!(
                        "Projected closing balance for {} is {:.2}",
                        p.label, p.closing
                    ),
                    expires_at: None,
                },
            );
        } else if p.closing < thresholds.warning_balance {
            push(
                &mut out,
                DerivedAlert {
                    key: format!("approaching_negative:{}", p.label),
                    alert_type: "approaching_negative".into(),
                    severity: AlertSeverity::Warning,
                    title: format!("Balance running low in {}", p.label),
                    message: format!(
                        "Projected closing balance for {} is {:.2}, under the {:.2} warning threshold",
                        p.label, p.closing, thresholds.warning_balance
                    ),
                    expires_at: None,
                },
            );
        }
        if avg_income > Decimal::ZERO && p.expense > avg_income * thresholds.high_expense_multiple {
            push(
                &mut out,
                DerivedAlert {
                    key: format!("high_expenses:{}", p.label),
                    alert_type: "high_expenses".into(),
                    severity: AlertSeverity::Warning,
                    title: format!("Unusually high outflow in {}", p.label),
                    message: format!(
                        "Expenses of {:.2} in {} exceed {}x the average income of {:.2}",
                        p.expense, p.label, thresholds.high_expense_multiple, avg_income
                    ),
                    expires_at: None,
                },
            );
        }
    }

    // Single-entry rules over the current month's actuals.
    let month_start = clamp_day(today.year(), today.month(), 1);
    let entries = aggregator::load_entries(conn, owner, month_start, today)?;

    let mut trailing_income = Decimal::ZERO;
    for back in 1..=3 {
        let (y, m) = month_add(today.year(), today.month(), -back);
        let from = clamp_day(y, m, 1);
        let to = clamp_day(y, m, days_in_month(y, m));
        for e in aggregator::load_entries(conn, owner, from, to)? {
            if e.direction == Direction::Income {
                trailing_income += e.amount;
            }
        }
    }
    let trailing_avg = trailing_income / Decimal::from(3);

    for e in &entries {
        match e.direction {
            Direction::Expense if e.amount > thresholds.high_single_expense => {
                push(
                    &mut out,
                    DerivedAlert {
                        key: format!("high_single_expense:{}", e.id),
                        alert_type: "high_single_expense".into(),
                        severity: AlertSeverity::Warning,
                        title: "Large single expense".into(),
                        message: format!(
                            "Expense of {:.2} {} on {} exceeds the {:.2} threshold",
                            e.amount, e.currency, e.date, thresholds.high_single_expense
                        ),
                        expires_at: None,
                    },
                );
            }
            Direction::Income
                if trailing_avg > Decimal::ZERO
                    && e.amount > trailing_avg * thresholds.high_income_factor =>
            {
                push(
                    &mut out,
                    DerivedAlert {
                        key: format!("high_income:{}", e.id),
                        alert_type: "high_income".into(),
                        severity: AlertSeverity::Info,
                        title: "Unusually high income".into(),
                        message: format!(
                            "Income of {:.2} {} on {} is above {}x the trailing 3-month average of {:.2}",
                            e.amount,
                            e.currency,
                            e.date,
                            thresholds.high_income_factor,
                            trailing_avg
                        ),
                        expires_at: None,
                    },
                );
            }
            _ => {}
        }
    }

    // Overdue: projected occurrences dated in the past are exactly the
    // obligations the automation never materialized.
    let lookback = today - Duration::days(thresholds.overdue_lookback_days);
    let yesterday = today - Duration::days(1);
    if yesterday >= lookback {
        for ev in aggregator::aggregate(conn, owner, lookback, yesterday)? {
            if ev.source != EventSource::Projected {
                continue;
            }
            let (kind, id) = match (ev.kind, ev.source_id) {
                (Some(k), Some(id)) => (k, id),
                _ => continue,
            };
            push(
                &mut out,
                DerivedAlert {
                    key: format!("payment_overdue:{}:{}", kind.as_str(), id),
                    alert_type: "payment_overdue".into(),
                    severity: AlertSeverity::Warning,
                    title: format!("Payment overdue: {}", ev.description),
                    message: format!(
                        "{} of {:.2} was due on {} and has not been recorded",
                        ev.description, ev.amount, ev.date
                    ),
                    expires_at: None,
                },
            );
        }
    }

    // Upcoming: projected occurrences due within the next few days.
    let horizon = today + Duration::days(thresholds.upcoming_days);
    for ev in aggregator::aggregate(conn, owner, today, horizon)? {
        if ev.source != EventSource::Projected {
            continue;
        }
        let (kind, id) = match (ev.kind, ev.source_id) {
            (Some(k), Some(id)) => (k, id),
            _ => continue,
        };
        push(
            &mut out,
            DerivedAlert {
                key: format!("upcoming_payment:{}:{}", kind.as_str(), id),
                alert_type: "upcoming_payment".into(),
                severity: AlertSeverity::Info,
                title: format!("Upcoming payment: {}", ev.description),
                message: format!("{} of {:.2} is due on {}", ev.description, ev.amount, ev.date),
                expires_at: Some(ev.date),
            },
        );
    }

    // Obligations close to their final occurrence.
    for loan in aggregator::load_loans(conn, owner)? {
        let left = loan.total_periods - loan.periods_made;
        if !loan.completed && left > 0 && left <= thresholds.ending_soon_periods {
            push(
                &mut out,
                DerivedAlert {
                    key: format!("loan_ending_soon:{}", loan.id),
                    alert_type: "loan_ending_soon".into(),
                    severity: AlertSeverity::Info,
                    title: format!("Loan '{}' ending soon", loan.name),
                    message: format!(
                        "{} payments left; remaining balance {:.2}",
                        left, loan.remaining_balance
                    ),
                    expires_at: None,
                },
            );
        }
    }
    for plan in aggregator::load_installments(conn, owner)? {
        let left = plan.period_count - plan.periods_completed;
        if !plan.completed && left > 0 && left <= thresholds.ending_soon_periods {
            push(
                &mut out,
                DerivedAlert {
                    key: format!("installment_ending_soon:{}", plan.id),
                    alert_type: "installment_ending_soon".into(),
                    severity: AlertSeverity::Info,
                    title: format!("Installment plan '{}' ending soon", plan.name),
                    message: format!("{} of {} periods left", left, plan.period_count),
                    expires_at: None,
                },
            );
        }
    }

    Ok(out)
}

/// Regenerate the owner's alert set: update regenerated keys in place
/// (preserving read/dismiss/snooze state), insert new keys unread, and
/// delete rows whose key was not regenerated this run.
pub fn generate(
    conn: &Connection,
    owner: &str,
    today: NaiveDate,
    thresholds: &AlertThresholds,
) -> Result<Vec<Alert>> {
    let derived = derive(conn, owner, today, thresholds)?;

    let mut existing: HashMap<String, i64> = HashMap::new();
    {
        let mut stmt = conn.prepare("SELECT key, id FROM alerts WHERE owner=?1")?;
        let mut rows = stmt.query(params![owner])?;
        while let Some(r) = rows.next()? {
            existing.insert(r.get(0)?, r.get(1)?);
        }
    }

    let mut regenerated: HashSet<String> = HashSet::new();
    for d in derived {
        if let Some(id) = existing.get(&d.key) {
            conn.execute(
                "UPDATE alerts SET alert_type=?1, severity=?2, title=?3, message=?4,
                        expires_at=?5, updated_at=datetime('now')
                 WHERE id=?6",
                params![
                    d.alert_type,
                    d.severity.as_str(),
                    d.title,
                    d.message,
                    d.expires_at.map(|e| e.to_string()),
                    id
                ],
            )?;
        } else {
            conn.execute(
                "INSERT INTO alerts(owner, key, alert_type, severity, title, message, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    owner,
                    d.key,
                    d.alert_type,
                    d.severity.as_str(),
                    d.title,
                    d.message,
                    d.expires_at.map(|e| e.to_string())
                ],
            )?;
        }
        regenerated.insert(d.key);
    }

    for (key, id) in &existing {
        if !regenerated.contains(key) {
            conn.execute("DELETE FROM alerts WHERE id=?1", params![id])?;
        }
    }

    list_all(conn, owner)
}

fn row_to_alert(owner: &str, r: &rusqlite::Row<'_>) -> Result<Alert> {
    let severity: String = r.get(3)?;
    let snoozed: Option<String> = r.get(8)?;
    let expires: Option<String> = r.get(9)?;
    Ok(Alert {
        id: r.get(0)?,
        owner: owner.to_string(),
        key: r.get(1)?,
        alert_type: r.get(2)?,
        severity: AlertSeverity::from_str(&severity)?,
        title: r.get(4)?,
        message: r.get(5)?,
        is_read: r.get::<_, i64>(6)? != 0,
        is_dismissed: r.get::<_, i64>(7)? != 0,
        snoozed_until: snoozed.map(|s| crate::utils::parse_date(&s)).transpose()?,
        expires_at: expires.map(|s| crate::utils::parse_date(&s)).transpose()?,
    })
}

const ALERT_COLUMNS: &str =
    "id, key, alert_type, severity, title, message, is_read, is_dismissed, snoozed_until, expires_at";

pub fn list_all(conn: &Connection, owner: &str) -> Result<Vec<Alert>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM alerts WHERE owner=?1
         ORDER BY CASE severity WHEN 'critical' THEN 0 WHEN 'warning' THEN 1 ELSE 2 END, key",
        ALERT_COLUMNS
    ))?;
    let mut rows = stmt.query(params![owner])?;
    let mut out = Vec::new();
    while let Some(r) = rows.next()? {
        out.push(row_to_alert(owner, r)?);
    }
    Ok(out)
}

/// Alerts the owner should see right now: not dismissed, not snoozed
/// into the future. Expired alerts are auto-dismissed first.
pub fn list_active(conn: &Connection, owner: &str, today: NaiveDate) -> Result<Vec<Alert>> {
    conn.execute(
        "UPDATE alerts SET is_dismissed=1, updated_at=datetime('now')
         WHERE owner=?1 AND expires_at IS NOT NULL AND expires_at < ?2 AND is_dismissed=0",
        params![owner, today.to_string()],
    )?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM alerts WHERE owner=?1 AND is_dismissed=0
           AND (snoozed_until IS NULL OR snoozed_until <= ?2)
         ORDER BY CASE severity WHEN 'critical' THEN 0 WHEN 'warning' THEN 1 ELSE 2 END, key",
        ALERT_COLUMNS
    ))?;
    let mut rows = stmt.query(params![owner, today.to_string()])?;
    let mut out = Vec::new();
    while let Some(r) = rows.next()? {
        out.push(row_to_alert(owner, r)?);
    }
    Ok(out)
}

/// Mark an alert read. Reading an already-expired alert dismisses it.
pub fn mark_read(conn: &Connection, owner: &str, key: &str, today: NaiveDate) -> Result<()> {
    let n = conn.execute(
        "UPDATE alerts SET is_read=1,
                is_dismissed=CASE WHEN expires_at IS NOT NULL AND expires_at < ?3 THEN 1 ELSE is_dismissed END,
                updated_at=datetime('now')
         WHERE owner=?1 AND key=?2",
        params![owner, key, today.to_string()],
    )?;
    if n == 0 {
        return Err(crate::errors::CoreError::NotFound(format!("alert '{}'", key)).into());
    }
    Ok(())
}

pub fn dismiss(conn: &Connection, owner: &str, key: &str) -> Result<()> {
    let n = conn.execute(
        "UPDATE alerts SET is_dismissed=1, updated_at=datetime('now') WHERE owner=?1 AND key=?2",
        params![owner, key],
    )?;
    if n == 0 {
        return Err(crate::errors::CoreError::NotFound(format!("alert '{}'", key)).into());
    }
    Ok(())
}

pub fn snooze(conn: &Connection, owner: &str, key: &str, until: NaiveDate) -> Result<()> {
    let n = conn.execute(
        "UPDATE alerts SET snoozed_until=?3, updated_at=datetime('now') WHERE owner=?1 AND key=?2",
        params![owner, key, until.to_string()],
    )?;
    if n == 0 {
        return Err(crate::errors::CoreError::NotFound(format!("alert '{}'", key)).into());
    }
    Ok(())
}
