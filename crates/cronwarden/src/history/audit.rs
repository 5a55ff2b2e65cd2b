/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Structured log events for the history recorder.
//!
//! Every recorded lifecycle event and every audit-write failure is mirrored
//! to `tracing` with an `event_type` field so log pipelines can pick them up
//! without reading the history table.

use crate::error::PersistError;
use crate::history::event::EventKind;
use crate::models::HistoryRecord;

/// Event types emitted by the recorder.
pub mod events {
    /// A history record was written.
    pub const HISTORY_RECORDED: &str = "history.recorded";
    /// Writing a history record failed.
    pub const HISTORY_WRITE_FAILED: &str = "history.audit_write_failed";
}

/// Log a history record that was written.
pub fn log_recorded(kind: EventKind, record: &HistoryRecord, durability: &str) {
    tracing::info!(
        event_type = events::HISTORY_RECORDED,
        kind = %kind,
        job_id = record.job_id,
        history_id = record.history_id,
        durability = %durability,
        "History event recorded"
    );
}

/// Log a failed history write.
///
/// This is an operational failure of the audit trail, not of the job.
pub fn log_write_failed(kind: EventKind, job_id: i64, durability: &str, error: &PersistError) {
    tracing::error!(
        event_type = events::HISTORY_WRITE_FAILED,
        kind = %kind,
        job_id,
        durability = %durability,
        error = %error,
        "Failed to write job history"
    );
}
