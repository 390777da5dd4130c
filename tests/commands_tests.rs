// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::NaiveDate;
use ledgerflow::commands::{balance, installments, loans};
use ledgerflow::db::init_schema;
use ledgerflow::errors::CoreError;
use ledgerflow::utils::{fx_convert, fx_rate};
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

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

#[test]
fn only_one_current_balance_survives_resets() {
    let mut conn = setup();
    balance::set_current(&mut conn, "default", d("1000"), "USD", ymd(2026, 3, 1), None).unwrap();
    balance::set_current(
        &mut conn,
        "default",
        d("2500"),
        "USD",
        ymd(2026, 4, 1),
        Some("after bonus"),
    )
    .unwrap();

    let current: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM opening_balances WHERE owner='default' AND is_current=1",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(current, 1);

    let total: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM opening_balances WHERE owner='default'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(total, 2);

    let amount: String = conn
        .query_row(
            "SELECT amount FROM opening_balances WHERE owner='default' AND is_current=1",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(amount, "2500");
}

#[test]
fn loan_pay_and_reverse_round_trip() {
    let mut conn = setup();
    conn.execute(
        "INSERT INTO loans(owner, name, principal, monthly_payment, annual_rate, total_periods,
                remaining_balance, day_of_month, start_date)
         VALUES ('default', 'car', '120000', '10275.05', '0.05', 12, '120000', 15, '2026-01-15')",
        [],
    )
    .unwrap();

    let paid = loans::pay_loan(&mut conn, "default", 1, ymd(2026, 1, 15)).unwrap();
    assert_eq!(paid, d("10275.05"));
    let remaining: String = conn
        .query_row("SELECT remaining_balance FROM loans", [], |r| r.get(0))
        .unwrap();
    assert_eq!(remaining, "110224.95");

    loans::reverse_payment(&mut conn, "default", 1).unwrap();
    let (made, remaining): (i64, String) = conn
        .query_row(
            "SELECT periods_made, remaining_balance FROM loans",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .unwrap();
    assert_eq!(made, 0);
    assert_eq!(remaining, "120000");

    let entries: i64 = conn
        .query_row("SELECT COUNT(*) FROM ledger_entries", [], |r| r.get(0))
        .unwrap();
    assert_eq!(entries, 0);

    // Nothing left to reverse.
    assert!(loans::reverse_payment(&mut conn, "default", 1).is_err());
}

#[test]
fn final_loan_payment_completes_and_reopens_on_reverse() {
    let mut conn = setup();
    conn.execute(
        "INSERT INTO loans(owner, name, principal, monthly_payment, annual_rate, total_periods,
                periods_made, remaining_balance, day_of_month, start_date)
         VALUES ('default', 'tiny', '300', '100', '0', 3, 2, '100', 1, '2026-01-01')",
        [],
    )
    .unwrap();

    let paid = loans::pay_loan(&mut conn, "default", 1, ymd(2026, 3, 1)).unwrap();
    assert_eq!(paid, d("100"));
    let status: String = conn
        .query_row("SELECT status FROM loans", [], |r| r.get(0))
        .unwrap();
    assert_eq!(status, "completed");
    assert!(loans::pay_loan(&mut conn, "default", 1, ymd(2026, 4, 1)).is_err());

    loans::reverse_payment(&mut conn, "default", 1).unwrap();
    let (status, remaining): (String, String) = conn
        .query_row("SELECT status, remaining_balance FROM loans", [], |r| {
            Ok((r.get(0)?, r.get(1)?))
        })
        .unwrap();
    assert_eq!(status, "active");
    assert_eq!(remaining, "100");
}

#[test]
fn installment_pay_and_reverse_round_trip() {
    let mut conn = setup();
    conn.execute(
        "INSERT INTO installment_plans(owner, name, total_amount, period_count, day_of_month,
                start_date, direction)
         VALUES ('default', 'tv', '1000', 3, 10, '2026-01-10', 'expense')",
        [],
    )
    .unwrap();

    assert_eq!(
        installments::pay_installment(&mut conn, "default", 1, ymd(2026, 1, 10)).unwrap(),
        d("333.33")
    );
    assert_eq!(
        installments::pay_installment(&mut conn, "default", 1, ymd(2026, 2, 10)).unwrap(),
        d("333.33")
    );
    assert_eq!(
        installments::pay_installment(&mut conn, "default", 1, ymd(2026, 3, 10)).unwrap(),
        d("333.34")
    );

    let status: String = conn
        .query_row("SELECT status FROM installment_plans", [], |r| r.get(0))
        .unwrap();
    assert_eq!(status, "completed");
    assert!(installments::pay_installment(&mut conn, "default", 1, ymd(2026, 4, 10)).is_err());

    installments::reverse_installment(&mut conn, "default", 1).unwrap();
    let (status, completed): (String, i64) = conn
        .query_row(
            "SELECT status, periods_completed FROM installment_plans",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .unwrap();
    assert_eq!(status, "active");
    assert_eq!(completed, 2);

    let entries: i64 = conn
        .query_row("SELECT COUNT(*) FROM ledger_entries", [], |r| r.get(0))
        .unwrap();
    assert_eq!(entries, 2);
}

fn open_with_timeout(path: &Path) -> Connection {
    let conn = Connection::open(path).unwrap();
    conn.busy_timeout(Duration::from_secs(5)).unwrap();
    conn
}

#[test]
fn concurrent_loan_payments_land_on_consecutive_occurrences() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");
    {
        let mut conn = Connection::open(&path).unwrap();
        init_schema(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO loans(owner, name, principal, monthly_payment, annual_rate, total_periods,
                    remaining_balance, day_of_month, start_date)
             VALUES ('default', 'car', '120000', '10275.05', '0.05', 12, '120000', 15, '2026-01-15')",
            [],
        )
        .unwrap();
    }

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let path = path.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut conn = open_with_timeout(&path);
                barrier.wait();
                loans::pay_loan(&mut conn, "default", 1, ymd(2026, 1, 15))
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap().unwrap();
    }

    let conn = Connection::open(&path).unwrap();
    let (made, remaining): (i64, String) = conn
        .query_row(
            "SELECT periods_made, remaining_balance FROM loans",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .unwrap();
    assert_eq!(made, 2);
    // Second payment split against the post-first-payment balance.
    assert_eq!(remaining, "100409.17");

    let mut stmt = conn
        .prepare(
            "SELECT occurrence_number FROM ledger_entries
             WHERE source_kind='loan' ORDER BY occurrence_number",
        )
        .unwrap();
    let occurrences: Vec<i64> = stmt
        .query_map([], |r| r.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(occurrences, vec![1, 2]);
}

#[test]
fn concurrent_installment_payments_advance_distinct_periods() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");
    {
        let mut conn = Connection::open(&path).unwrap();
        init_schema(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO installment_plans(owner, name, total_amount, period_count, day_of_month,
                    start_date, direction)
             VALUES ('default', 'tv', '1000', 3, 10, '2026-01-10', 'expense')",
            [],
        )
        .unwrap();
    }

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let path = path.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut conn = open_with_timeout(&path);
                barrier.wait();
                installments::pay_installment(&mut conn, "default", 1, ymd(2026, 1, 10))
            })
        })
        .collect();
    for h in handles {
        assert_eq!(h.join().unwrap().unwrap(), d("333.33"));
    }

    let conn = Connection::open(&path).unwrap();
    let completed: i64 = conn
        .query_row("SELECT periods_completed FROM installment_plans", [], |r| r.get(0))
        .unwrap();
    assert_eq!(completed, 2);
    let entries: i64 = conn
        .query_row("SELECT COUNT(*) FROM ledger_entries", [], |r| r.get(0))
        .unwrap();
    assert_eq!(entries, 2);
}

#[test]
fn concurrent_reverses_peel_off_distinct_occurrences() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");
    {
        let mut conn = Connection::open(&path).unwrap();
        init_schema(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO loans(owner, name, principal, monthly_payment, annual_rate, total_periods,
                    periods_made, remaining_balance, day_of_month, start_date)
             VALUES ('default', 'tiny', '300', '100', '0', 3, 2, '100', 1, '2026-01-01')",
            [],
        )
        .unwrap();
        for occurrence in [1, 2] {
            conn.execute(
                "INSERT INTO ledger_entries(owner, date, amount, direction, currency,
                        original_amount, original_currency, exchange_rate, note,
                        source_kind, source_id, occurrence_number)
                 VALUES ('default', '2026-01-01', '100', 'expense', 'USD', '100', 'USD', '1',
                        'tiny', 'loan', 1, ?1)",
                params![occurrence],
            )
            .unwrap();
        }
    }

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let path = path.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut conn = open_with_timeout(&path);
                barrier.wait();
                loans::reverse_payment(&mut conn, "default", 1)
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap().unwrap();
    }

    let conn = Connection::open(&path).unwrap();
    let (made, remaining): (i64, String) = conn
        .query_row(
            "SELECT periods_made, remaining_balance FROM loans",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .unwrap();
    assert_eq!(made, 0);
    assert_eq!(remaining, "300");
    let entries: i64 = conn
        .query_row("SELECT COUNT(*) FROM ledger_entries", [], |r| r.get(0))
        .unwrap();
    assert_eq!(entries, 0);
}

#[test]
fn held_write_lock_maps_to_a_retryable_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");
    let mut conn = Connection::open(&path).unwrap();
    init_schema(&mut conn).unwrap();
    conn.execute(
        "INSERT INTO loans(owner, name, principal, monthly_payment, annual_rate, total_periods,
                remaining_balance, day_of_month, start_date)
         VALUES ('default', 'car', '120000', '10275.05', '0.05', 12, '120000', 15, '2026-01-15')",
        [],
    )
    .unwrap();

    let blocker = Connection::open(&path).unwrap();
    blocker.execute_batch("BEGIN IMMEDIATE").unwrap();

    let err = loans::pay_loan(&mut conn, "default", 1, ymd(2026, 1, 15)).unwrap_err();
    let core = err.downcast_ref::<CoreError>().unwrap();
    assert!(matches!(core, CoreError::Conflict(_)));
    assert!(core.is_retryable());

    blocker.execute_batch("COMMIT").unwrap();
    loans::pay_loan(&mut conn, "default", 1, ymd(2026, 1, 15)).unwrap();
}

#[test]
fn unknown_ids_are_not_found() {
    let mut conn = setup();
    assert!(loans::pay_loan(&mut conn, "default", 99, ymd(2026, 1, 1)).is_err());
    assert!(installments::pay_installment(&mut conn, "default", 99, ymd(2026, 1, 1)).is_err());
}

#[test]
fn fx_rates_resolve_through_the_hub_and_reciprocal() {
    let conn = setup();
    // Base defaults to USD; store USD->EUR.
    conn.execute(
        "INSERT INTO fx_rates(date, base, quote, rate) VALUES ('2026-03-01', 'USD', 'EUR', '0.9')",
        [],
    )
    .unwrap();

    let date = ymd(2026, 3, 15);
    assert_eq!(fx_rate(&conn, date, "USD", "EUR").unwrap(), Some(d("0.9")));
    // Reverse direction uses the reciprocal of the stored rate.
    let back = fx_rate(&conn, date, "EUR", "USD").unwrap().unwrap();
    assert!((back - Decimal::ONE / d("0.9")).abs() < d("0.000001"));
    assert_eq!(fx_rate(&conn, date, "USD", "USD").unwrap(), Some(Decimal::ONE));
}

#[test]
fn missing_fx_pair_passes_through_at_rate_one() {
    let conn = setup();
    let (converted, rate) = fx_convert(&conn, ymd(2026, 3, 1), d("100"), "GBP", "USD").unwrap();
    assert_eq!(converted, d("100"));
    assert_eq!(rate, Decimal::ONE);
}

#[test]
fn fx_uses_the_latest_rate_on_or_before_the_date() {
    let conn = setup();
    for (day, rate) in [("2026-03-01", "0.90"), ("2026-03-10", "0.95")] {
        conn.execute(
            "INSERT INTO fx_rates(date, base, quote, rate) VALUES (?1, 'USD', 'EUR', ?2)",
            params![day, rate],
        )
        .unwrap();
    }
    assert_eq!(
        fx_rate(&conn, ymd(2026, 3, 5), "USD", "EUR").unwrap(),
        Some(d("0.90"))
    );
    assert_eq!(
        fx_rate(&conn, ymd(2026, 3, 20), "USD", "EUR").unwrap(),
        Some(d("0.95"))
    );
}
