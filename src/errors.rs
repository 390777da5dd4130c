// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use thiserror::Error;

/// Failure categories the core distinguishes for its callers.
///
/// `Validation` is rejected before persistence and never retried.
/// `Conflict` means lock contention; the caller retries the single
/// operation, not the whole batch. `NotFound` items are skipped and
/// reported. `Computation` flags a numeric edge case that excludes the
/// affected item from output without aborting the run.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("computation error: {0}")]
    Computation(String),
}

impl CoreError {
    /// True when the error came from lock contention and the caller
    /// should retry just this operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Conflict(_))
    }
}
