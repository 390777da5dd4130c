// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::engine::aggregator;
use crate::errors::CoreError;
use crate::utils::{clamp_day, days_in_month, month_add, parse_decimal};
use anyhow::{Context, Result};
use chrono::{Datelike, Duration, NaiveDate};
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Monthly,
    Weekly,
}

impl FromStr for Granularity {
    type Err = CoreError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(Granularity::Monthly),
            "weekly" => Ok(Granularity::Weekly),
            other => Err(CoreError::Validation(format!(
                "invalid granularity '{}', expected monthly|weekly",
                other
            ))),
        }
    }
}

/// What-if deltas layered on top of live data without mutating it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WhatIf {
    /// Added to the opening balance before the first period.
    #[serde(default)]
    pub balance_adjustment: Option<Decimal>,
    /// Extra income applied to every period.
    #[serde(default)]
    pub recurring_income: Option<Decimal>,
    /// Extra expense applied to every period.
    #[serde(default)]
    pub recurring_expense: Option<Decimal>,
    /// One-time adjustments, keyed by 1-based period number; positive
    /// values add income, negative add expense.
    #[serde(default)]
    pub one_time: Vec<OneTimeAdjustment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneTimeAdjustment {
    pub period: usize,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct PeriodProjection {
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub opening: Decimal,
    pub income: Decimal,
    pub expense: Decimal,
    pub closing: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForecastResult {
    pub opening_balance: Decimal,
    pub periods: Vec<PeriodProjection>,
    pub has_negative_periods: bool,
    pub first_negative_period: Option<String>,
    /// Periods excluded because their aggregation failed; never aborts
    /// the rest of the forecast.
    pub excluded: Vec<String>,
}

// The first period starts at `today` rather than the calendar boundary:
// the opening balance snapshot already reflects entries dated on or
// before today, so re-counting the earlier part of the month would
// deduct them twice. Later periods align to calendar months.
fn period_bounds(
    today: NaiveDate,
    granularity: Granularity,
    index: usize,
) -> (NaiveDate, NaiveDate, String) {
    match granularity {
        Granularity::Monthly => {
            let (y, m) = month_add(today.year(), today.month(), index as i64);
            let start = if index == 0 { today } else { clamp_day(y, m, 1) };
            let end = clamp_day(y, m, days_in_month(y, m));
            (start, end, format!("{:04}-{:02}", y, m))
        }
        Granularity::Weekly => {
            let start = today + Duration::days(7 * index as i64);
            let end = start + Duration::days(6);
            (start, end, start.to_string())
        }
    }
}

/// Current opening balance for the owner, zero when none is set.
pub fn current_opening_balance(conn: &Connection, owner: &str) -> Result<Decimal> {
    let v: Option<String> = conn
        .query_row(
            "SELECT amount FROM opening_balances WHERE owner=?1 AND is_current=1",
            params![owner],
            |r| r.get(0),
        )
        .optional()?;
    match v {
        Some(s) => parse_decimal(&s),
        None => Ok(Decimal::ZERO),
    }
}

/// Period-by-period projection: each closing balance feeds the next
/// period's opening. Horizon is 1-24 months or 1-52 weeks.
pub fn compute_forecast(
    conn: &Connection,
    owner: &str,
    today: NaiveDate,
    horizon: usize,
    granularity: Granularity,
    what_if: &WhatIf,
) -> Result<ForecastResult> {
    let max = match granularity {
        Granularity::Monthly => 24,
        Granularity::Weekly => 52,
    };
    if horizon < 1 || horizon > max {
        return Err(CoreError::Validation(format!(
            "horizon {} out of range 1-{} for {:?} granularity",
            horizon, max, granularity
        ))
        .into());
    }

    let mut opening = current_opening_balance(conn, owner)?;
    if let Some(adj) = what_if.balance_adjustment {
        opening += adj;
    }
    let opening_balance = opening;

    let mut periods = Vec::with_capacity(horizon);
    let mut excluded = Vec::new();
    let mut has_negative = false;
    let mut first_negative = None;

    for index in 0..horizon {
        let (start, end, label) = period_bounds(today, granularity, index);

        let (mut income, mut expense) = match aggregator::aggregate(conn, owner, start, end) {
            Ok(events) => {
                let totals = aggregator::period_totals(&events);
                (totals.income, totals.expense)
            }
            Err(_) => {
                // Flag and carry the balance through unchanged.
                excluded.push(label.clone());
                (Decimal::ZERO, Decimal::ZERO)
            }
        };

        if let Some(extra) = what_if.recurring_income {
            income += extra;
        }
        if let Some(extra) = what_if.recurring_expense {
            expense += extra;
        }
        for adj in &what_if.one_time {
            if adj.period == index + 1 {
                if adj.amount >= Decimal::ZERO {
                    income += adj.amount;
                } else {
                    expense += -adj.amount;
                }
            }
        }

        let closing = opening + income - expense;
        if closing < Decimal::ZERO {
            has_negative = true;
            if first_negative.is_none() {
                first_negative = Some(label.clone());
            }
        }
        periods.push(PeriodProjection {
            label,
            start,
            end,
            opening,
            income,
            expense,
            closing,
        });
        opening = closing;
    }

    Ok(ForecastResult {
        opening_balance,
        periods,
        has_negative_periods: has_negative,
        first_negative_period: first_negative,
        excluded,
    })
}

pub fn save_scenario(conn: &Connection, owner: &str, name: &str, what_if: &WhatIf) -> Result<()> {
    if name.trim().is_empty() {
        return Err(CoreError::Validation("scenario name must not be empty".into()).into());
    }
    let params_json = serde_json::to_string(what_if)?;
    conn.execute(
        "INSERT INTO forecast_scenarios(owner, name, params) VALUES (?1, ?2, ?3)
         ON CONFLICT(owner, name) DO UPDATE SET params=excluded.params",
        params![owner, name, params_json],
    )?;
    Ok(())
}

pub fn load_scenario(conn: &Connection, owner: &str, name: &str) -> Result<WhatIf> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT params FROM forecast_scenarios WHERE owner=?1 AND name=?2",
            params![owner, name],
            |r| r.get(0),
        )
        .optional()?;
    let raw = raw.ok_or_else(|| CoreError::NotFound(format!("scenario '{}'", name)))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid scenario params for '{}'", name))
}

pub fn list_scenarios(conn: &Connection, owner: &str) -> Result<Vec<(String, WhatIf)>> {
    let mut stmt = conn.prepare(
        "SELECT name, params FROM forecast_scenarios WHERE owner=?1 ORDER BY name",
    )?;
    let mut rows = stmt.query(params![owner])?;
    let mut out = Vec::new();
    while let Some(r) = rows.next()? {
        let name: String = r.get(0)?;
        let raw: String = r.get(1)?;
        let what_if = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid scenario params for '{}'", name))?;
        out.push((name, what_if));
    }
    Ok(out)
}

pub fn delete_scenario(conn: &Connection, owner: &str, name: &str) -> Result<()> {
    let n = conn.execute(
        "DELETE FROM forecast_scenarios WHERE owner=?1 AND name=?2",
        params![owner, name],
    )?;
    if n == 0 {
        return Err(CoreError::NotFound(format!("scenario '{}'", name)).into());
    }
    Ok(())
}

/// Re-run the forecast with a persisted scenario's parameters
/// substituted for live what-if input. Persisted data is never touched.
pub fn compute_scenario(
    conn: &Connection,
    owner: &str,
    today: NaiveDate,
    name: &str,
    horizon: usize,
    granularity: Granularity,
) -> Result<ForecastResult> {
    let what_if = load_scenario(conn, owner, name)?;
    compute_forecast(conn, owner, today, horizon, granularity, &what_if)
}

#[derive(Debug, Clone, Serialize)]
pub struct PeriodDelta {
    pub label: String,
    pub baseline_closing: Decimal,
    pub scenario_closing: Decimal,
    pub delta: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioComparison {
    pub scenario: String,
    pub baseline: ForecastResult,
    pub candidate: ForecastResult,
    pub deltas: Vec<PeriodDelta>,
    /// Final-period closing difference, scenario minus baseline.
    pub total_delta: Decimal,
}

pub fn compare_scenario(
    conn: &Connection,
    owner: &str,
    today: NaiveDate,
    name: &str,
    horizon: usize,
    granularity: Granularity,
) -> Result<ScenarioComparison> {
    let baseline = compute_forecast(conn, owner, today, horizon, granularity, &WhatIf::default())?;
    let candidate = compute_scenario(conn, owner, today, name, horizon, granularity)?;

    let deltas: Vec<PeriodDelta> = baseline
        .periods
        .iter()
        .zip(candidate.periods.iter())
        .map(|(b, c)| PeriodDelta {
            label: b.label.clone(),
            baseline_closing: b.closing,
            scenario_closing: c.closing,
            delta: c.closing - b.closing,
        })
        .collect();
    let total_delta = deltas.last().map(|d| d.delta).unwrap_or(Decimal::ZERO);

    Ok(ScenarioComparison {
        scenario: name.to_string(),
        baseline,
        candidate,
        deltas,
        total_delta,
    })
}
