// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::errors::CoreError;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use once_cell::sync::Lazy;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::fs;
use std::path::PathBuf;

static APP: Lazy<(&str, &str, &str)> =
    Lazy::new(|| ("com.alphavelocity", "Ledgerflow", "ledgerflow"));

pub fn db_path() -> Result<PathBuf> {
    let proj = ProjectDirs::from(APP.0, APP.1, APP.2)
        .context("Could not determine platform-specific data dir")?;
    let data_dir = proj.data_dir();
    fs::create_dir_all(data_dir).context("Failed to create data dir")?;
    Ok(data_dir.join("ledgerflow.sqlite"))
}

pub fn open_or_init() -> Result<Connection> {
    let path = db_path()?;
    let mut conn =
        Connection::open(&path).with_context(|| format!("Open DB at {}", path.display()))?;
    init_schema(&mut conn)?;
    Ok(conn)
}

/// Begin an IMMEDIATE transaction, taking the write lock up front.
///
/// This is the row-lock primitive behind every check-and-write: the
/// caller reads counters inside the returned transaction and commits
/// the update before anyone else can read the same pre-update state.
/// Busy/locked maps to `CoreError::Conflict` so callers can retry the
/// single operation.
pub fn exclusive_tx(conn: &mut Connection) -> Result<Transaction<'_>, CoreError> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| match &e {
            rusqlite::Error::SqliteFailure(f, _)
                if f.code == rusqlite::ErrorCode::DatabaseBusy
                    || f.code == rusqlite::ErrorCode::DatabaseLocked =>
            {
                CoreError::Conflict("database is locked by another writer".into())
            }
            _ => CoreError::Computation(e.to_string()),
        })
}

pub fn init_schema(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        r#"
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS settings(
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS ledger_entries(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner TEXT NOT NULL,
        date TEXT NOT NULL,
        amount TEXT NOT NULL,
        direction TEXT NOT NULL CHECK(direction IN ('income','expense')),
        currency TEXT NOT NULL,
        original_amount TEXT NOT NULL,
        original_currency TEXT NOT NULL,
        exchange_rate TEXT NOT NULL DEFAULT '1',
        category TEXT,
        note TEXT,
        source_kind TEXT,
        source_id INTEGER,
        occurrence_number INTEGER,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );
    CREATE INDEX IF NOT EXISTS idx_ledger_owner_date ON ledger_entries(owner, date);
    -- One materialized entry per obligation occurrence; backs automation idempotency.
    CREATE UNIQUE INDEX IF NOT EXISTS idx_ledger_source
        ON ledger_entries(owner, source_kind, source_id, occurrence_number)
        WHERE source_kind IS NOT NULL;

    CREATE TABLE IF NOT EXISTS recurring_obligations(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner TEXT NOT NULL,
        name TEXT NOT NULL,
        amount TEXT NOT NULL,
        direction TEXT NOT NULL CHECK(direction IN ('income','expense')),
        day_of_month INTEGER NOT NULL CHECK(day_of_month BETWEEN 1 AND 31),
        start_date TEXT NOT NULL,
        end_date TEXT,
        is_active INTEGER NOT NULL DEFAULT 1,
        paused_at TEXT,
        resumed_at TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE IF NOT EXISTS installment_plans(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner TEXT NOT NULL,
        name TEXT NOT NULL,
        total_amount TEXT NOT NULL,
        period_count INTEGER NOT NULL CHECK(period_count > 0),
        periods_completed INTEGER NOT NULL DEFAULT 0,
        day_of_month INTEGER NOT NULL CHECK(day_of_month BETWEEN 1 AND 31),
        start_date TEXT NOT NULL,
        direction TEXT NOT NULL DEFAULT 'expense',
        status TEXT NOT NULL DEFAULT 'active' CHECK(status IN ('active','completed')),
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE IF NOT EXISTS loans(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner TEXT NOT NULL,
        name TEXT NOT NULL,
        principal TEXT NOT NULL,
        monthly_payment TEXT NOT NULL,
        annual_rate TEXT NOT NULL,
        total_periods INTEGER NOT NULL CHECK(total_periods > 0),
        periods_made INTEGER NOT NULL DEFAULT 0,
        remaining_balance TEXT NOT NULL,
        day_of_month INTEGER NOT NULL CHECK(day_of_month BETWEEN 1 AND 31),
        start_date TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'active' CHECK(status IN ('active','completed')),
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE IF NOT EXISTS subscriptions(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner TEXT NOT NULL,
        name TEXT NOT NULL,
        amount TEXT NOT NULL,
        billing_cycle TEXT NOT NULL CHECK(billing_cycle IN ('monthly','quarterly','semiannual','annual')),
        next_renewal TEXT NOT NULL,
        renewals_made INTEGER NOT NULL DEFAULT 0,
        is_active INTEGER NOT NULL DEFAULT 1,
        paused_at TEXT,
        resumed_at TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE IF NOT EXISTS opening_balances(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner TEXT NOT NULL,
        amount TEXT NOT NULL,
        currency TEXT NOT NULL,
        as_of TEXT NOT NULL,
        is_current INTEGER NOT NULL DEFAULT 0,
        note TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );
    CREATE INDEX IF NOT EXISTS idx_balance_owner ON opening_balances(owner, is_current);

    CREATE TABLE IF NOT EXISTS alerts(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner TEXT NOT NULL,
        key TEXT NOT NULL,
        alert_type TEXT NOT NULL,
        severity TEXT NOT NULL CHECK(severity IN ('info','warning','critical')),
        title TEXT NOT NULL,
        message TEXT NOT NULL,
        is_read INTEGER NOT NULL DEFAULT 0,
        is_dismissed INTEGER NOT NULL DEFAULT 0,
        snoozed_until TEXT,
        expires_at TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now')),
        UNIQUE(owner, key)
    );

    CREATE TABLE IF NOT EXISTS forecast_scenarios(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner TEXT NOT NULL,
        name TEXT NOT NULL,
        params TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        UNIQUE(owner, name)
    );

    -- FX rates: store base->quote rate (1 base = rate quote) per day
    CREATE TABLE IF NOT EXISTS fx_rates(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        date TEXT NOT NULL,
        base TEXT NOT NULL,
        quote TEXT NOT NULL,
        rate TEXT NOT NULL,
        UNIQUE(date, base, quote)
    );
    "#,
    )?;
    Ok(())
}
