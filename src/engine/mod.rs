// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

pub mod aggregator;
pub mod alerts;
pub mod amortization;
pub mod audit;
pub mod automation;
pub mod enrichment;
pub mod forecast;
