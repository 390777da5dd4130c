// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::NaiveDate;
use ledgerflow::engine::amortization::{build_schedule, validate_terms, LoanTerms, PeriodTag};
use rust_decimal::Decimal;

fn d(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn ymd(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn sample_terms() -> LoanTerms {
    LoanTerms {
        principal: d("120000"),
        annual_rate: d("0.05"),
        total_periods: 12,
        monthly_payment: d("10275.05"),
        periods_made: 0,
        start_date: ymd(2026, 1, 15),
        day_of_month: 15,
    }
}

#[test]
fn first_period_splits_interest_and_principal() {
    let schedule = build_schedule(&sample_terms(), ymd(2026, 1, 1)).unwrap();
    assert_eq!(schedule.len(), 12);
    assert_eq!(schedule[0].interest_portion, d("500.00"));
    assert_eq!(schedule[0].principal_portion, d("9775.05"));
    assert_eq!(schedule[0].due_date, ymd(2026, 1, 15));
}

#[test]
fn schedule_closes_to_exactly_zero() {
    let schedule = build_schedule(&sample_terms(), ymd(2026, 1, 1)).unwrap();
    let last = schedule.last().unwrap();
    assert_eq!(last.remaining_after, Decimal::ZERO);

    // Principal portions always reconstitute the original principal.
    let total_principal: Decimal = schedule.iter().map(|e| e.principal_portion).sum();
    assert_eq!(total_principal, d("120000"));

    // The final payment differs from the nominal one only by the
    // rounding drift accumulated over the schedule.
    let drift = (last.payment - d("10275.05")).abs();
    assert!(drift < d("1"), "final payment drifted by {}", drift);
}

#[test]
fn interest_declines_every_period() {
    let schedule = build_schedule(&sample_terms(), ymd(2026, 1, 1)).unwrap();
    for pair in schedule.windows(2) {
        assert!(pair[1].interest_portion < pair[0].interest_portion);
    }
}

#[test]
fn tags_follow_payment_progress() {
    let mut terms = sample_terms();
    terms.periods_made = 3;
    // Reference date right on the fourth due date.
    let schedule = build_schedule(&terms, ymd(2026, 4, 15)).unwrap();
    assert_eq!(schedule[0].tag, PeriodTag::Paid);
    assert_eq!(schedule[2].tag, PeriodTag::Paid);
    assert_eq!(schedule[3].tag, PeriodTag::Due);
    assert_eq!(schedule[4].tag, PeriodTag::Future);
}

#[test]
fn missed_payment_shows_overdue() {
    let mut terms = sample_terms();
    terms.periods_made = 1;
    let schedule = build_schedule(&terms, ymd(2026, 4, 1)).unwrap();
    // Periods 2 and 3 were due in February and March.
    assert_eq!(schedule[1].tag, PeriodTag::Overdue);
    assert_eq!(schedule[2].tag, PeriodTag::Overdue);
    assert_eq!(schedule[3].tag, PeriodTag::Future);
}

#[test]
fn overpayment_ends_schedule_early_at_zero() {
    let terms = LoanTerms {
        principal: d("1000"),
        annual_rate: d("0"),
        total_periods: 12,
        monthly_payment: d("400"),
        periods_made: 0,
        start_date: ymd(2026, 1, 1),
        day_of_month: 1,
    };
    let schedule = build_schedule(&terms, ymd(2026, 1, 1)).unwrap();
    // 400 + 400 + 200, then zero-balance periods.
    assert_eq!(schedule[2].payment, d("200"));
    assert_eq!(schedule[2].remaining_after, Decimal::ZERO);
}

#[test]
fn day_31_loan_clamps_in_short_months() {
    let terms = LoanTerms {
        principal: d("1200"),
        annual_rate: d("0"),
        total_periods: 4,
        monthly_payment: d("300"),
        periods_made: 0,
        start_date: ymd(2026, 1, 31),
        day_of_month: 31,
    };
    let schedule = build_schedule(&terms, ymd(2026, 1, 1)).unwrap();
    assert_eq!(schedule[0].due_date, ymd(2026, 1, 31));
    assert_eq!(schedule[1].due_date, ymd(2026, 2, 28));
    assert_eq!(schedule[2].due_date, ymd(2026, 3, 31));
    assert_eq!(schedule[3].due_date, ymd(2026, 4, 30));
}

#[test]
fn negative_rate_is_rejected() {
    let mut terms = sample_terms();
    terms.annual_rate = d("-0.01");
    assert!(validate_terms(&terms).is_err());
}
