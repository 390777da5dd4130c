// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::NaiveDate;
use ledgerflow::db::init_schema;
use ledgerflow::engine::alerts::{
    dismiss, generate, list_active, list_all, mark_read, snooze, AlertThresholds,
};
use ledgerflow::models::AlertSeverity;
use rusqlite::{params, Connection};

fn ymd(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn setup() -> Connection {
    let mut conn = Connection::open_in_memory().unwrap();
    init_schema(&mut conn).unwrap();
    conn
}

fn set_balance(conn: &Connection, amount: &str) {
    conn.execute(
        "INSERT INTO opening_balances(owner, amount, currency, as_of, is_current)
         VALUES ('default', ?1, 'USD', '2026-03-01', 1)",
        params![amount],
    )
    .unwrap();
}

fn add_expense(conn: &Connection, name: &str, amount: &str, day: u32) {
    conn.execute(
        "INSERT INTO recurring_obligations(owner, name, amount, direction, day_of_month, start_date)
         VALUES ('default', ?1, ?2, 'expense', ?3, '2026-01-01')",
        params![name, amount, day],
    )
    .unwrap();
}

#[test]
fn projected_negative_balance_raises_an_alert() {
    let conn = setup();
    set_balance(&conn, "1000");
    add_expense(&conn, "rent", "2000", 10);

    let alerts = generate(&conn, "default", ymd(2026, 3, 1), &AlertThresholds::default()).unwrap();
    let negative: Vec<_> = alerts
        .iter()
        .filter(|a| a.alert_type == "negative_cashflow")
        .collect();
    assert!(!negative.is_empty());
    // Closing -1000 is exactly the critical threshold, so March stays a
    // warning; the deeper months escalate.
    let march = negative.iter().find(|a| a.key.ends_with("2026-03")).unwrap();
    assert_eq!(march.severity, AlertSeverity::Warning);
    let may = negative.iter().find(|a| a.key.ends_with("2026-05")).unwrap();
    assert_eq!(may.severity, AlertSeverity::Critical);
}

#[test]
fn healthy_balance_generates_nothing() {
    let conn = setup();
    set_balance(&conn, "100000");
    let alerts = generate(&conn, "default", ymd(2026, 3, 1), &AlertThresholds::default()).unwrap();
    assert!(alerts.is_empty());
}

#[test]
fn regeneration_preserves_read_and_dismissed_state() {
    let conn = setup();
    set_balance(&conn, "1000");
    add_expense(&conn, "rent", "2000", 10);
    let thresholds = AlertThresholds::default();

    let first = generate(&conn, "default", ymd(2026, 3, 1), &thresholds).unwrap();
    let key = &first[0].key;
    mark_read(&conn, "default", key, ymd(2026, 3, 1)).unwrap();

    let second = generate(&conn, "default", ymd(2026, 3, 1), &thresholds).unwrap();
    let same = second.iter().find(|a| &a.key == key).unwrap();
    assert!(same.is_read);

    dismiss(&conn, "default", key).unwrap();
    let third = generate(&conn, "default", ymd(2026, 3, 1), &thresholds).unwrap();
    assert!(third.iter().find(|a| &a.key == key).unwrap().is_dismissed);
}

#[test]
fn stale_alerts_are_deleted_on_regeneration() {
    let conn = setup();
    set_balance(&conn, "1000");
    add_expense(&conn, "rent", "2000", 10);
    let thresholds = AlertThresholds::default();

    let first = generate(&conn, "default", ymd(2026, 3, 1), &thresholds).unwrap();
    assert!(!first.is_empty());

    // The condition resolves: plenty of money now.
    conn.execute(
        "UPDATE opening_balances SET amount='100000' WHERE owner='default'",
        [],
    )
    .unwrap();
    let second = generate(&conn, "default", ymd(2026, 3, 1), &thresholds).unwrap();
    assert!(second.is_empty());
    assert!(list_all(&conn, "default").unwrap().is_empty());
}

#[test]
fn snoozed_alerts_hide_until_their_date() {
    let conn = setup();
    set_balance(&conn, "1000");
    add_expense(&conn, "rent", "2000", 10);
    let thresholds = AlertThresholds::default();

    let alerts = generate(&conn, "default", ymd(2026, 3, 1), &thresholds).unwrap();
    let key = alerts[0].key.clone();
    snooze(&conn, "default", &key, ymd(2026, 3, 15)).unwrap();

    let hidden = list_active(&conn, "default", ymd(2026, 3, 1)).unwrap();
    assert!(hidden.iter().all(|a| a.key != key));

    let visible = list_active(&conn, "default", ymd(2026, 3, 15)).unwrap();
    assert!(visible.iter().any(|a| a.key == key));
}

#[test]
fn upcoming_payment_expires_after_its_due_date() {
    let conn = setup();
    set_balance(&conn, "100000");
    add_expense(&conn, "rent", "100", 3);
    let thresholds = AlertThresholds::default();

    let alerts = generate(&conn, "default", ymd(2026, 3, 1), &thresholds).unwrap();
    let upcoming = alerts
        .iter()
        .find(|a| a.alert_type == "upcoming_payment")
        .expect("rent due on the 3rd is within the upcoming window");
    assert_eq!(upcoming.expires_at, Some(ymd(2026, 3, 3)));

    // Past the due date it drops out of the active list.
    let later = list_active(&conn, "default", ymd(2026, 3, 5)).unwrap();
    assert!(later.iter().all(|a| a.alert_type != "upcoming_payment"));
}

#[test]
fn unmaterialized_past_occurrences_are_overdue() {
    let conn = setup();
    set_balance(&conn, "100000");
    // Due on the 10th, never materialized, evaluated on the 20th.
    add_expense(&conn, "rent", "100", 10);

    let alerts = generate(&conn, "default", ymd(2026, 3, 20), &AlertThresholds::default()).unwrap();
    let overdue = alerts
        .iter()
        .find(|a| a.alert_type == "payment_overdue")
        .expect("missed rent should be overdue");
    assert_eq!(overdue.key, "payment_overdue:recurring:1");
    assert_eq!(overdue.severity, AlertSeverity::Warning);
}

#[test]
fn materialized_occurrences_are_not_overdue() {
    let conn = setup();
    set_balance(&conn, "100000");
    conn.execute(
        "INSERT INTO recurring_obligations(owner, name, amount, direction, day_of_month, start_date)
         VALUES ('default', 'rent', '100', 'expense', 10, '2026-03-01')",
        [],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO ledger_entries(owner, date, amount, direction, currency,
                original_amount, original_currency, source_kind, source_id, occurrence_number)
         VALUES ('default', '2026-03-10', '100', 'expense', 'USD', '100', 'USD', 'recurring', 1, 1)",
        [],
    )
    .unwrap();

    let alerts = generate(&conn, "default", ymd(2026, 3, 20), &AlertThresholds::default()).unwrap();
    assert!(alerts.iter().all(|a| a.alert_type != "payment_overdue"));
}

#[test]
fn ending_soon_fires_for_loans_and_installments() {
    let conn = setup();
    set_balance(&conn, "1000000");
    conn.execute(
        "INSERT INTO loans(owner, name, principal, monthly_payment, annual_rate, total_periods,
                periods_made, remaining_balance, day_of_month, start_date)
         VALUES ('default', 'car', '12000', '1000', '0', 12, 10, '2000', 15, '2025-06-15')",
        [],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO installment_plans(owner, name, total_amount, period_count, periods_completed,
                day_of_month, start_date, direction)
         VALUES ('default', 'tv', '1200', 6, 5, 15, '2025-11-15', 'expense')",
        [],
    )
    .unwrap();

    let alerts = generate(&conn, "default", ymd(2026, 4, 1), &AlertThresholds::default()).unwrap();
    assert!(alerts.iter().any(|a| a.key == "loan_ending_soon:1"));
    assert!(alerts.iter().any(|a| a.key == "installment_ending_soon:1"));
}

#[test]
fn threshold_overrides_come_from_settings() {
    let conn = setup();
    conn.execute(
        "INSERT INTO settings(key, value) VALUES ('alert.warning_balance', '2000')",
        [],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO settings(key, value) VALUES ('alert.default.upcoming_days', '7')",
        [],
    )
    .unwrap();

    let t = AlertThresholds::load(&conn, "default").unwrap();
    assert_eq!(t.warning_balance, "2000".parse().unwrap());
    assert_eq!(t.upcoming_days, 7);
    // Untouched fields keep their defaults.
    assert_eq!(t.ending_soon_periods, 3);
}

#[test]
fn acting_on_a_missing_key_is_not_found() {
    let conn = setup();
    assert!(mark_read(&conn, "default", "nope", ymd(2026, 3, 1)).is_err());
    assert!(dismiss(&conn, "default", "nope").is_err());
    assert!(snooze(&conn, "default", "nope", ymd(2026, 3, 1)).is_err());
}
