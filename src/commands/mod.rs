// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

pub mod alerts;
pub mod automation;
pub mod balance;
pub mod doctor;
pub mod forecast;
pub mod fxrates;
pub mod installments;
pub mod ledger;
pub mod loans;
pub mod obligations;
pub mod subscriptions;

pub(crate) fn owner_of(m: &clap::ArgMatches) -> String {
    m.get_one::<String>("owner")
        .cloned()
        .unwrap_or_else(|| "default".into())
}

pub(crate) fn today() -> chrono::NaiveDate {
    chrono::Utc::now().date_naive()
}
