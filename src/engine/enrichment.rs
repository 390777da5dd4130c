// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::errors::CoreError;
use crate::models::InstallmentPlan;
use crate::utils::{occurrence_date, round_money, split_even};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallmentStatus {
    Completed,
    Pending,
    Overdue,
    Due,
    Active,
}

impl InstallmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallmentStatus::Completed => "completed",
            InstallmentStatus::Pending => "pending",
            InstallmentStatus::Overdue => "overdue",
            InstallmentStatus::Due => "due",
            InstallmentStatus::Active => "active",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrichedInstallment {
    pub status: InstallmentStatus,
    pub monthly_amount: Decimal,
    pub final_amount: Decimal,
    pub expected_periods_by_now: i64,
    pub is_on_track: bool,
    pub paid_amount: Decimal,
    pub remaining_amount: Decimal,
    pub progress_percentage: Decimal,
    pub next_due_date: Option<NaiveDate>,
}

/// Amount of the 1-based occurrence `number`. Every occurrence pays the
/// even split except the last, which absorbs the residual so the
/// occurrence amounts sum to the plan total exactly.
pub fn occurrence_amount(plan: &InstallmentPlan, number: i64) -> Result<Decimal, CoreError> {
    let (per, last) = split_even(plan.total_amount, plan.period_count)?;
    if number == plan.period_count {
        Ok(last)
    } else {
        Ok(per)
    }
}

pub fn enrich(plan: &InstallmentPlan, today: NaiveDate) -> Result<EnrichedInstallment, CoreError> {
    if plan.periods_completed > plan.period_count {
        return Err(CoreError::Validation(format!(
            "installment '{}' has {} completed periods out of {}",
            plan.name, plan.periods_completed, plan.period_count
        )));
    }
    let (monthly_amount, final_amount) = split_even(plan.total_amount, plan.period_count)?;

    // Occurrences whose due date has already passed. Today's own
    // occurrence is not yet "expected", it is merely due.
    let mut expected = 0i64;
    for number in 1..=plan.period_count {
        if occurrence_date(plan.start_date, plan.day_of_month, number) < today {
            expected += 1;
        }
    }

    let done = plan.periods_completed >= plan.period_count;
    let next_due = if done {
        None
    } else {
        Some(occurrence_date(
            plan.start_date,
            plan.day_of_month,
            plan.periods_completed + 1,
        ))
    };

    let status = if done {
        InstallmentStatus::Completed
    } else if plan.start_date > today {
        InstallmentStatus::Pending
    } else if plan.periods_completed < expected {
        InstallmentStatus::Overdue
    } else if next_due == Some(today) {
        InstallmentStatus::Due
    } else {
        InstallmentStatus::Active
    };

    let paid_amount = if done {
        plan.total_amount
    } else {
        monthly_amount * Decimal::from(plan.periods_completed)
    };
    let remaining_amount = plan.total_amount - paid_amount;
    let progress_percentage = round_money(
        Decimal::from(plan.periods_completed * 100) / Decimal::from(plan.period_count),
    );

    Ok(EnrichedInstallment {
        status,
        monthly_amount,
        final_amount,
        expected_periods_by_now: expected,
        is_on_track: plan.periods_completed >= expected,
        paid_amount,
        remaining_amount,
        progress_percentage,
        next_due_date: next_due,
    })
}
