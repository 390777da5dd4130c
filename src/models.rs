// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::errors::CoreError;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Income,
    Expense,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Income => "income",
            Direction::Expense => "expense",
        }
    }
}

impl FromStr for Direction {
    type Err = CoreError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(Direction::Income),
            "expense" => Ok(Direction::Expense),
            other => Err(CoreError::Validation(format!(
                "invalid direction '{}', expected income|expense",
                other
            ))),
        }
    }
}

/// Which obligation table a ledger entry was materialized from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Recurring,
    Installment,
    Loan,
    Subscription,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Recurring => "recurring",
            SourceKind::Installment => "installment",
            SourceKind::Loan => "loan",
            SourceKind::Subscription => "subscription",
        }
    }
}

impl FromStr for SourceKind {
    type Err = CoreError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recurring" => Ok(SourceKind::Recurring),
            "installment" => Ok(SourceKind::Installment),
            "loan" => Ok(SourceKind::Loan),
            "subscription" => Ok(SourceKind::Subscription),
            other => Err(CoreError::Validation(format!(
                "invalid source kind '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingCycle {
    Monthly,
    Quarterly,
    Semiannual,
    Annual,
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "monthly",
            BillingCycle::Quarterly => "quarterly",
            BillingCycle::Semiannual => "semiannual",
            BillingCycle::Annual => "annual",
        }
    }

    pub fn months(&self) -> u32 {
        match self {
            BillingCycle::Monthly => 1,
            BillingCycle::Quarterly => 3,
            BillingCycle::Semiannual => 6,
            BillingCycle::Annual => 12,
        }
    }
}

impl FromStr for BillingCycle {
    type Err = CoreError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(BillingCycle::Monthly),
            "quarterly" => Ok(BillingCycle::Quarterly),
            "semiannual" => Ok(BillingCycle::Semiannual),
            "annual" => Ok(BillingCycle::Annual),
            other => Err(CoreError::Validation(format!(
                "invalid billing cycle '{}', expected monthly|quarterly|semiannual|annual",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
        }
    }
}

impl FromStr for AlertSeverity {
    type Err = CoreError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(AlertSeverity::Info),
            "warning" => Ok(AlertSeverity::Warning),
            "critical" => Ok(AlertSeverity::Critical),
            other => Err(CoreError::Validation(format!(
                "invalid severity '{}'",
                other
            ))),
        }
    }
}

/// Link from a ledger entry back to the obligation occurrence that
/// produced it. The triple is unique per owner and backs the
/// materialization idempotency check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLink {
    pub kind: SourceKind,
    pub id: i64,
    pub occurrence: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub owner: String,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub direction: Direction,
    pub currency: String,
    pub original_amount: Decimal,
    pub original_currency: String,
    pub exchange_rate: Decimal,
    pub category: Option<String>,
    pub note: Option<String>,
    pub source: Option<SourceLink>,
}

/// Fixed entry: same amount on the same day every month.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringObligation {
    pub id: i64,
    pub owner: String,
    pub name: String,
    pub amount: Decimal,
    pub direction: Direction,
    pub day_of_month: u32,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallmentPlan {
    pub id: i64,
    pub owner: String,
    pub name: String,
    pub total_amount: Decimal,
    pub period_count: i64,
    pub periods_completed: i64,
    pub day_of_month: u32,
    pub start_date: NaiveDate,
    pub direction: Direction,
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loan {
    pub id: i64,
    pub owner: String,
    pub name: String,
    pub principal: Decimal,
    pub monthly_payment: Decimal,
    pub annual_rate: Decimal,
    pub total_periods: i64,
    pub periods_made: i64,
    pub remaining_balance: Decimal,
    pub day_of_month: u32,
    pub start_date: NaiveDate,
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: i64,
    pub owner: String,
    pub name: String,
    pub amount: Decimal,
    pub billing_cycle: BillingCycle,
    pub next_renewal: NaiveDate,
    pub renewals_made: i64,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpeningBalance {
    pub id: i64,
    pub owner: String,
    pub amount: Decimal,
    pub currency: String,
    pub as_of: NaiveDate,
    pub is_current: bool,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    pub owner: String,
    pub key: String,
    pub alert_type: String,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub is_dismissed: bool,
    pub snoozed_until: Option<NaiveDate>,
    pub expires_at: Option<NaiveDate>,
}
