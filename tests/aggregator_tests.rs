// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::NaiveDate;
use ledgerflow::db::init_schema;
use ledgerflow::engine::aggregator::{aggregate, period_totals, EventSource};
use ledgerflow::models::SourceKind;
use rusqlite::{params, Connection};
use rust_decimal::Decimal;

fn d(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn ymd(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn setup() -> Connection {
    let mut conn = Connection::open_in_memory().unwrap();
    init_schema(&mut conn).unwrap();
    conn
}

fn add_entry(conn: &Connection, date: &str, amount: &str, direction: &str) {
    conn.execute(
        "INSERT INTO ledger_entries(owner, date, amount, direction, currency,
                original_amount, original_currency)
         VALUES ('default', ?1, ?2, ?3, 'USD', ?2, 'USD')",
        params![date, amount, direction],
    )
    .unwrap();
}

fn add_linked_entry(
    conn: &Connection,
    date: &str,
    amount: &str,
    kind: SourceKind,
    source_id: i64,
    occurrence: i64,
) {
    conn.execute(
        "INSERT INTO ledger_entries(owner, date, amount, direction, currency,
                original_amount, original_currency, source_kind, source_id, occurrence_number)
         VALUES ('default', ?1, ?2, 'expense', 'USD', ?2, 'USD', ?3, ?4, ?5)",
        params![date, amount, kind.as_str(), source_id, occurrence],
    )
    .unwrap();
}

#[test]
fn actual_and_projected_merge_sorted() {
    let conn = setup();
    add_entry(&conn, "2026-03-05", "42", "expense");
    conn.execute(
        "INSERT INTO recurring_obligations(owner, name, amount, direction, day_of_month, start_date)
         VALUES ('default', 'rent', '1500', 'expense', 10, '2026-01-01')",
        params![],
    )
    .unwrap();

    let events = aggregate(&conn, "default", ymd(2026, 3, 1), ymd(2026, 3, 31)).unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].source, EventSource::Actual);
    assert_eq!(events[1].source, EventSource::Projected);
    assert_eq!(events[1].date, ymd(2026, 3, 10));
    assert!(events[0].date <= events[1].date);
}

#[test]
fn materialized_occurrence_is_not_projected_again() {
    let conn = setup();
    conn.execute(
        "INSERT INTO recurring_obligations(owner, name, amount, direction, day_of_month, start_date)
         VALUES ('default', 'rent', '1500', 'expense', 10, '2026-01-01')",
        params![],
    )
    .unwrap();
    // March already materialized by automation.
    add_linked_entry(&conn, "2026-03-10", "1500", SourceKind::Recurring, 1, 3);

    let events = aggregate(&conn, "default", ymd(2026, 3, 1), ymd(2026, 4, 30)).unwrap();
    let totals = period_totals(&events);
    // One actual for March plus one projection for April, never three.
    assert_eq!(events.len(), 2);
    assert_eq!(totals.expense, d("3000"));
}

#[test]
fn paused_and_ended_obligations_are_skipped() {
    let conn = setup();
    conn.execute(
        "INSERT INTO recurring_obligations(owner, name, amount, direction, day_of_month, start_date, is_active)
         VALUES ('default', 'gym', '50', 'expense', 5, '2026-01-01', 0)",
        params![],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO recurring_obligations(owner, name, amount, direction, day_of_month, start_date, end_date)
         VALUES ('default', 'lease', '900', 'expense', 5, '2025-01-01', '2026-02-28')",
        params![],
    )
    .unwrap();

    let events = aggregate(&conn, "default", ymd(2026, 3, 1), ymd(2026, 3, 31)).unwrap();
    assert!(events.is_empty());
}

#[test]
fn day_31_projects_on_the_last_day_of_short_months() {
    let conn = setup();
    conn.execute(
        "INSERT INTO recurring_obligations(owner, name, amount, direction, day_of_month, start_date)
         VALUES ('default', 'payday', '5000', 'income', 31, '2026-01-01')",
        params![],
    )
    .unwrap();

    let events = aggregate(&conn, "default", ymd(2026, 2, 1), ymd(2026, 4, 30)).unwrap();
    let dates: Vec<NaiveDate> = events.iter().map(|e| e.date).collect();
    assert_eq!(
        dates,
        vec![ymd(2026, 2, 28), ymd(2026, 3, 31), ymd(2026, 4, 30)]
    );
}

#[test]
fn installment_projections_use_the_residual_split() {
    let conn = setup();
    conn.execute(
        "INSERT INTO installment_plans(owner, name, total_amount, period_count, day_of_month, start_date, direction)
         VALUES ('default', 'tv', '1000', 3, 10, '2026-03-10', 'expense')",
        params![],
    )
    .unwrap();

    let events = aggregate(&conn, "default", ymd(2026, 3, 1), ymd(2026, 5, 31)).unwrap();
    let amounts: Vec<Decimal> = events.iter().map(|e| e.amount).collect();
    assert_eq!(amounts, vec![d("333.33"), d("333.33"), d("333.34")]);
    assert_eq!(period_totals(&events).expense, d("1000"));
}

#[test]
fn loan_projections_follow_the_schedule() {
    let conn = setup();
    conn.execute(
        "INSERT INTO loans(owner, name, principal, monthly_payment, annual_rate, total_periods,
                remaining_balance, day_of_month, start_date)
         VALUES ('default', 'car', '120000', '10275.05', '0.05', 12, '120000', 15, '2026-01-15')",
        params![],
    )
    .unwrap();

    let events = aggregate(&conn, "default", ymd(2026, 1, 1), ymd(2026, 2, 28)).unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].amount, d("10275.05"));
    assert_eq!(events[0].kind, Some(SourceKind::Loan));
    assert_eq!(events[0].occurrence, Some(1));
}

#[test]
fn quarterly_subscription_steps_by_three_months() {
    let conn = setup();
    conn.execute(
        "INSERT INTO subscriptions(owner, name, amount, billing_cycle, next_renewal)
         VALUES ('default', 'cloud backup', '30', 'quarterly', '2026-01-31')",
        params![],
    )
    .unwrap();

    let events = aggregate(&conn, "default", ymd(2026, 1, 1), ymd(2026, 7, 31)).unwrap();
    let dates: Vec<NaiveDate> = events.iter().map(|e| e.date).collect();
    // Renewal day anchors on the 31st and clamps in April.
    assert_eq!(dates, vec![ymd(2026, 1, 31), ymd(2026, 4, 30), ymd(2026, 7, 31)]);
}

#[test]
fn unrelated_owners_see_nothing() {
    let conn = setup();
    add_entry(&conn, "2026-03-05", "42", "expense");
    let events = aggregate(&conn, "someone-else", ymd(2026, 3, 1), ymd(2026, 3, 31)).unwrap();
    assert!(events.is_empty());
}
