// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::NaiveDate;
use ledgerflow::db::init_schema;
use ledgerflow::engine::forecast::{
    compare_scenario, compute_forecast, compute_scenario, delete_scenario, list_scenarios,
    save_scenario, Granularity, OneTimeAdjustment, WhatIf,
};
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

fn set_balance(conn: &Connection, owner: &str, amount: &str, as_of: NaiveDate) {
    conn.execute(
        "INSERT INTO opening_balances(owner, amount, currency, as_of, is_current)
         VALUES (?1, ?2, 'USD', ?3, 1)",
        params![owner, amount, as_of.to_string()],
    )
    .unwrap();
}

fn add_fixed(conn: &Connection, owner: &str, name: &str, amount: &str, direction: &str, day: u32) {
    conn.execute(
        "INSERT INTO recurring_obligations(owner, name, amount, direction, day_of_month, start_date)
         VALUES (?1, ?2, ?3, ?4, ?5, '2026-01-01')",
        params![owner, name, amount, direction, day],
    )
    .unwrap();
}

fn add_actual(conn: &Connection, owner: &str, date: NaiveDate, amount: &str, direction: &str) {
    conn.execute(
        "INSERT INTO ledger_entries(owner, date, amount, direction, currency,
                original_amount, original_currency, exchange_rate)
         VALUES (?1, ?2, ?3, ?4, 'USD', ?3, 'USD', '1')",
        params![owner, date.to_string(), amount, direction],
    )
    .unwrap();
}

#[test]
fn balance_chains_through_periods() {
    let conn = setup();
    set_balance(&conn, "default", "10000", ymd(2026, 3, 1));
    add_fixed(&conn, "default", "salary", "5000", "income", 15);
    add_fixed(&conn, "default", "rent", "7000", "expense", 20);

    let result = compute_forecast(
        &conn,
        "default",
        ymd(2026, 3, 1),
        3,
        Granularity::Monthly,
        &WhatIf::default(),
    )
    .unwrap();

    assert_eq!(result.opening_balance, d("10000"));
    let closings: Vec<Decimal> = result.periods.iter().map(|p| p.closing).collect();
    assert_eq!(closings, vec![d("8000"), d("6000"), d("4000")]);
    assert_eq!(result.periods[1].opening, d("8000"));
    assert!(!result.has_negative_periods);
    assert!(result.excluded.is_empty());
}

#[test]
fn first_negative_period_is_reported() {
    let conn = setup();
    set_balance(&conn, "default", "3000", ymd(2026, 3, 1));
    add_fixed(&conn, "default", "rent", "2000", "expense", 10);

    let result = compute_forecast(
        &conn,
        "default",
        ymd(2026, 3, 1),
        4,
        Granularity::Monthly,
        &WhatIf::default(),
    )
    .unwrap();

    assert!(result.has_negative_periods);
    assert_eq!(result.first_negative_period.as_deref(), Some("2026-04"));
    assert_eq!(result.periods[1].closing, d("-1000"));
}

#[test]
fn entries_already_in_the_balance_snapshot_are_not_deducted_again() {
    let conn = setup();
    // The expense predates the snapshot, so the 1000 already reflects it.
    add_actual(&conn, "default", ymd(2026, 3, 5), "100", "expense");
    set_balance(&conn, "default", "1000", ymd(2026, 3, 15));

    let result = compute_forecast(
        &conn,
        "default",
        ymd(2026, 3, 15),
        2,
        Granularity::Monthly,
        &WhatIf::default(),
    )
    .unwrap();

    assert_eq!(result.periods[0].start, ymd(2026, 3, 15));
    assert_eq!(result.periods[0].expense, Decimal::ZERO);
    assert_eq!(result.periods[0].closing, d("1000"));
    // Later periods stay on calendar boundaries.
    assert_eq!(result.periods[1].start, ymd(2026, 4, 1));
    assert_eq!(result.periods[1].end, ymd(2026, 4, 30));
}

#[test]
fn entries_after_the_reference_date_still_count() {
    let conn = setup();
    set_balance(&conn, "default", "1000", ymd(2026, 3, 15));
    add_actual(&conn, "default", ymd(2026, 3, 5), "100", "expense");
    add_actual(&conn, "default", ymd(2026, 3, 20), "40", "expense");

    let result = compute_forecast(
        &conn,
        "default",
        ymd(2026, 3, 15),
        1,
        Granularity::Monthly,
        &WhatIf::default(),
    )
    .unwrap();

    assert_eq!(result.periods[0].expense, d("40"));
    assert_eq!(result.periods[0].closing, d("960"));
}

#[test]
fn missing_balance_defaults_to_zero() {
    let conn = setup();
    let result = compute_forecast(
        &conn,
        "default",
        ymd(2026, 3, 1),
        1,
        Granularity::Monthly,
        &WhatIf::default(),
    )
    .unwrap();
    assert_eq!(result.opening_balance, Decimal::ZERO);
}

#[test]
fn horizon_bounds_are_enforced() {
    let conn = setup();
    for (horizon, granularity) in [
        (0, Granularity::Monthly),
        (25, Granularity::Monthly),
        (0, Granularity::Weekly),
        (53, Granularity::Weekly),
    ] {
        assert!(compute_forecast(
            &conn,
            "default",
            ymd(2026, 3, 1),
            horizon,
            granularity,
            &WhatIf::default(),
        )
        .is_err());
    }
}

#[test]
fn weekly_periods_span_seven_days() {
    let conn = setup();
    set_balance(&conn, "default", "1000", ymd(2026, 3, 2));
    let result = compute_forecast(
        &conn,
        "default",
        ymd(2026, 3, 2),
        2,
        Granularity::Weekly,
        &WhatIf::default(),
    )
    .unwrap();
    assert_eq!(result.periods[0].start, ymd(2026, 3, 2));
    assert_eq!(result.periods[0].end, ymd(2026, 3, 8));
    assert_eq!(result.periods[1].start, ymd(2026, 3, 9));
}

#[test]
fn what_if_layers_do_not_touch_stored_data() {
    let conn = setup();
    set_balance(&conn, "default", "1000", ymd(2026, 3, 1));

    let what_if = WhatIf {
        balance_adjustment: Some(d("500")),
        recurring_income: Some(d("100")),
        recurring_expense: Some(d("50")),
        one_time: vec![OneTimeAdjustment {
            period: 2,
            amount: d("-200"),
        }],
    };
    let result = compute_forecast(
        &conn,
        "default",
        ymd(2026, 3, 1),
        2,
        Granularity::Monthly,
        &what_if,
    )
    .unwrap();

    assert_eq!(result.opening_balance, d("1500"));
    assert_eq!(result.periods[0].closing, d("1550"));
    // Period 2 carries the one-time -200 as expense.
    assert_eq!(result.periods[1].expense, d("250"));
    assert_eq!(result.periods[1].closing, d("1400"));

    // Stored balance is untouched.
    let stored: String = conn
        .query_row(
            "SELECT amount FROM opening_balances WHERE owner='default' AND is_current=1",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(stored, "1000");
}

#[test]
fn scenarios_round_trip_and_run() {
    let conn = setup();
    set_balance(&conn, "default", "1000", ymd(2026, 3, 1));

    let what_if = WhatIf {
        balance_adjustment: Some(d("-300")),
        ..WhatIf::default()
    };
    save_scenario(&conn, "default", "job-loss", &what_if).unwrap();

    let listed = list_scenarios(&conn, "default").unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].0, "job-loss");

    let result = compute_scenario(
        &conn,
        "default",
        ymd(2026, 3, 1),
        "job-loss",
        1,
        Granularity::Monthly,
    )
    .unwrap();
    assert_eq!(result.opening_balance, d("700"));

    // Saving again overwrites in place.
    let revised = WhatIf {
        balance_adjustment: Some(d("-500")),
        ..WhatIf::default()
    };
    save_scenario(&conn, "default", "job-loss", &revised).unwrap();
    assert_eq!(list_scenarios(&conn, "default").unwrap().len(), 1);

    delete_scenario(&conn, "default", "job-loss").unwrap();
    assert!(delete_scenario(&conn, "default", "job-loss").is_err());
}

#[test]
fn comparison_deltas_track_the_scenario() {
    let conn = setup();
    set_balance(&conn, "default", "1000", ymd(2026, 3, 1));
    save_scenario(
        &conn,
        "default",
        "raise",
        &WhatIf {
            recurring_income: Some(d("250")),
            ..WhatIf::default()
        },
    )
    .unwrap();

    let cmp = compare_scenario(
        &conn,
        "default",
        ymd(2026, 3, 1),
        "raise",
        3,
        Granularity::Monthly,
    )
    .unwrap();
    assert_eq!(cmp.deltas[0].delta, d("250"));
    assert_eq!(cmp.deltas[2].delta, d("750"));
    assert_eq!(cmp.total_delta, d("750"));
}

#[test]
fn owners_are_isolated() {
    let conn = setup();
    set_balance(&conn, "alice", "9000", ymd(2026, 3, 1));
    add_fixed(&conn, "alice", "salary", "100", "income", 5);

    let other = compute_forecast(
        &conn,
        "bob",
        ymd(2026, 3, 1),
        1,
        Granularity::Monthly,
        &WhatIf::default(),
    )
    .unwrap();
    assert_eq!(other.opening_balance, Decimal::ZERO);
    assert_eq!(other.periods[0].income, Decimal::ZERO);
}
