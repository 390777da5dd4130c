// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Fire-and-forget audit trail. Events go over an mpsc channel so the
//! sink can lag, drop, or disappear without ever failing the operation
//! that emitted them.

use chrono::NaiveDate;
use serde::Serialize;
use std::sync::mpsc::Sender;

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub owner: String,
    pub action: String,
    pub detail: String,
    pub date: NaiveDate,
}

pub type AuditSink = Sender<AuditEvent>;

/// Send an event if a sink is attached. A closed channel is ignored.
pub fn emit(sink: Option<&AuditSink>, event: AuditEvent) {
    if let Some(s) = sink {
        let _ = s.send(event);
    }
}
