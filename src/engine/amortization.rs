// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::errors::CoreError;
use crate::models::Loan;
use crate::utils::{occurrence_date, round_money};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

/// Inputs for a declining-balance (Spitzer) schedule.
#[derive(Debug, Clone)]
pub struct LoanTerms {
    pub principal: Decimal,
    pub annual_rate: Decimal,
    pub total_periods: i64,
    pub monthly_payment: Decimal,
    pub periods_made: i64,
    pub start_date: NaiveDate,
    pub day_of_month: u32,
}

impl From<&Loan> for LoanTerms {
    fn from(l: &Loan) -> Self {
        LoanTerms {
            principal: l.principal,
            annual_rate: l.annual_rate,
            total_periods: l.total_periods,
            monthly_payment: l.monthly_payment,
            periods_made: l.periods_made,
            start_date: l.start_date,
            day_of_month: l.day_of_month,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodTag {
    Paid,
    Due,
    Overdue,
    Future,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleEntry {
    pub period_number: i64,
    pub due_date: NaiveDate,
    pub payment: Decimal,
    pub interest_portion: Decimal,
    pub principal_portion: Decimal,
    pub remaining_after: Decimal,
    pub tag: PeriodTag,
}

/// Reject terms where the payment can never amortize the principal.
pub fn validate_terms(terms: &LoanTerms) -> Result<(), CoreError> {
    if terms.principal <= Decimal::ZERO {
        return Err(CoreError::Validation("principal must be positive".into()));
    }
    if terms.total_periods <= 0 {
        return Err(CoreError::Validation(
            "total periods must be positive".into(),
        ));
    }
    if terms.annual_rate < Decimal::ZERO {
        return Err(CoreError::Validation(
            "annual rate must not be negative".into(),
        ));
    }
    let first_interest = round_money(terms.principal * terms.annual_rate / Decimal::from(12));
    if terms.monthly_payment <= first_interest {
        return Err(CoreError::Validation(format!(
            "monthly payment {} does not cover first-month interest {}; the loan can never amortize",
            terms.monthly_payment, first_interest
        )));
    }
    Ok(())
}

/// Build the full per-period schedule.
///
/// For period i: interest = balance * rate/12 (2 dp), principal =
/// payment - interest. The final period absorbs rounding drift: its
/// principal portion is the remaining balance exactly and the payment is
/// remaining + interest, so principal portions always sum back to the
/// original principal and the closing balance is exactly zero.
pub fn build_schedule(terms: &LoanTerms, today: NaiveDate) -> Result<Vec<ScheduleEntry>, CoreError> {
    validate_terms(terms)?;

    let monthly_rate = terms.annual_rate / Decimal::from(12);
    let mut remaining = terms.principal;
    let mut schedule = Vec::with_capacity(terms.total_periods as usize);

    for i in 1..=terms.total_periods {
        let due_date = occurrence_date(terms.start_date, terms.day_of_month, i);
        let interest = round_money(remaining * monthly_rate);
        let raw_principal = terms.monthly_payment - interest;
        let is_final = i == terms.total_periods;

        let (payment, principal) = if is_final || raw_principal >= remaining {
            // Absorb the residual: pay off whatever is left.
            (remaining + interest, remaining)
        } else {
            if raw_principal <= Decimal::ZERO {
                return Err(CoreError::Computation(format!(
                    "payment {} does not cover interest {} in period {}",
                    terms.monthly_payment, interest, i
                )));
            }
            (terms.monthly_payment, raw_principal)
        };

        remaining = (remaining - principal).max(Decimal::ZERO);

        let tag = if i <= terms.periods_made {
            PeriodTag::Paid
        } else if due_date < today {
            PeriodTag::Overdue
        } else if due_date == today && i == terms.periods_made + 1 {
            PeriodTag::Due
        } else {
            PeriodTag::Future
        };

        schedule.push(ScheduleEntry {
            period_number: i,
            due_date,
            payment,
            interest_portion: interest,
            principal_portion: principal,
            remaining_after: remaining,
            tag,
        });
    }

    Ok(schedule)
}

/// Balance still owed before the 1-based period `number` is paid.
pub fn balance_before_period(
    terms: &LoanTerms,
    number: i64,
    today: NaiveDate,
) -> Result<Decimal, CoreError> {
    if number <= 1 {
        return Ok(terms.principal);
    }
    let schedule = build_schedule(terms, today)?;
    schedule
        .get(number as usize - 2)
        .map(|e| e.remaining_after)
        .ok_or_else(|| CoreError::Computation(format!("period {} out of range", number)))
}
