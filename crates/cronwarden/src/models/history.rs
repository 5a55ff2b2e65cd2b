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

//! History Record Model
//!
//! History records are append-only audit entries, one per lifecycle event of
//! a job. They are never updated or deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::InvalidEventError;
use crate::history::event::EventPayload;

/// A persisted history record (domain type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Globally unique, increasing identifier
    pub history_id: i64,
    /// The job this event belongs to; the job need not still exist
    pub job_id: i64,
    /// Structured event payload
    pub message: serde_json::Value,
    /// Store-assigned time, taken together with `history_id`
    pub created_at: DateTime<Utc>,
}

impl HistoryRecord {
    /// Parses the stored message back into a typed payload.
    pub fn payload(&self) -> Result<EventPayload, InvalidEventError> {
        EventPayload::from_json(&self.message)
    }
}

/// Structure for inserting a history record.
///
/// `created_at` is the time the store handed out `history_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewHistoryRecord {
    pub history_id: i64,
    pub job_id: i64,
    pub message: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
