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

//! Job lifecycle recording.
//!
//! [`HistoryRecorder`] is the entry point used by the catalog and by job
//! executors. Catalog changes (`scheduled`, `unscheduled`) are recorded in
//! the caller's transaction so they commit or abort with the change itself.
//! Execution outcomes (`started`, `completed`, `failed`) are recorded in
//! their own transaction so they survive a rollback of the job's work.
//!
//! The recorder also exposes read-only queries over the history table;
//! nothing here updates or deletes a record.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::audit;
use super::event::JobEvent;
use super::identity::IdentityAllocator;
use super::writer::{Durability, HistoryWriter};
use crate::config::CronwardenConfig;
use crate::error::{PersistError, StoreError};
use crate::models::HistoryRecord;
use crate::store::{CronStore, StoreSession};

/// Records job lifecycle events and reads them back.
#[derive(Debug)]
pub struct HistoryRecorder {
    store: Arc<dyn CronStore>,
    writer: HistoryWriter,
}

impl HistoryRecorder {
    /// Creates a recorder drawing history ids from the configured sequence.
    pub fn new(
        store: Arc<dyn CronStore>,
        allocator: Arc<IdentityAllocator>,
        config: &CronwardenConfig,
    ) -> Self {
        let writer = HistoryWriter::new(Arc::clone(&store), allocator, config.history_sequence());
        Self { store, writer }
    }

    /// Records a new schedule for a recurring job inside `session`.
    pub fn record_scheduled(
        &self,
        session: &mut dyn StoreSession,
        job_id: i64,
        command: &str,
        schedule: &str,
    ) -> Result<HistoryRecord, PersistError> {
        self.record(
            job_id,
            &JobEvent::Scheduled {
                command: command.to_string(),
                schedule: schedule.to_string(),
            },
            Durability::Inherit(session),
        )
    }

    /// Records a new one-shot job inside `session`.
    pub fn record_scheduled_at(
        &self,
        session: &mut dyn StoreSession,
        job_id: i64,
        command: &str,
        at: DateTime<Utc>,
    ) -> Result<HistoryRecord, PersistError> {
        self.record(
            job_id,
            &JobEvent::ScheduledAt {
                command: command.to_string(),
                at,
            },
            Durability::Inherit(session),
        )
    }

    /// Records the removal of a job inside `session`.
    pub fn record_unscheduled(
        &self,
        session: &mut dyn StoreSession,
        job_id: i64,
        command: &str,
    ) -> Result<HistoryRecord, PersistError> {
        self.record(
            job_id,
            &JobEvent::Unscheduled {
                command: command.to_string(),
            },
            Durability::Inherit(session),
        )
    }

    /// Records that a job began executing. Committed immediately.
    pub fn record_started(&self, job_id: i64, command: &str) -> Result<HistoryRecord, PersistError> {
        self.record(
            job_id,
            &JobEvent::Started {
                command: command.to_string(),
            },
            Durability::Independent,
        )
    }

    /// Records a successful run and the number of tuples it affected.
    pub fn record_completed(
        &self,
        job_id: i64,
        command: &str,
        tuple_count: u64,
    ) -> Result<HistoryRecord, PersistError> {
        self.record(
            job_id,
            &JobEvent::Completed {
                command: command.to_string(),
                tuple_count,
            },
            Durability::Independent,
        )
    }

    /// Records a successful run along with the command status tag.
    pub fn record_completed_with_status(
        &self,
        job_id: i64,
        command: &str,
        command_status: &str,
        tuple_count: u64,
    ) -> Result<HistoryRecord, PersistError> {
        self.record(
            job_id,
            &JobEvent::CompletedWithStatus {
                command: command.to_string(),
                command_status: command_status.to_string(),
                tuple_count,
            },
            Durability::Independent,
        )
    }

    /// Records a failed run.
    pub fn record_failed(&self, job_id: i64, command: &str) -> Result<HistoryRecord, PersistError> {
        self.record(
            job_id,
            &JobEvent::Failed {
                command: command.to_string(),
            },
            Durability::Independent,
        )
    }

    /// Records a failed run with its error message.
    pub fn record_failed_with_message(
        &self,
        job_id: i64,
        command: &str,
        message: &str,
    ) -> Result<HistoryRecord, PersistError> {
        self.record(
            job_id,
            &JobEvent::FailedWithMessage {
                command: command.to_string(),
                message: message.to_string(),
            },
            Durability::Independent,
        )
    }

    /// Records an arbitrary event with explicit durability.
    pub fn record(
        &self,
        job_id: i64,
        event: &JobEvent,
        durability: Durability<'_>,
    ) -> Result<HistoryRecord, PersistError> {
        let kind = event.kind();
        let mode = durability.label();

        match self.writer.record(job_id, &event.to_payload(), durability) {
            Ok(record) => {
                audit::log_recorded(kind, &record, mode);
                Ok(record)
            }
            Err(e) => {
                audit::log_write_failed(kind, job_id, mode, &e);
                Err(e)
            }
        }
    }

    /// Returns every record of `job_id`, oldest first.
    pub fn history_for_job(&self, job_id: i64) -> Result<Vec<HistoryRecord>, StoreError> {
        let mut session = self.store.begin()?;
        let records = session.history_for_job(job_id)?;
        session.commit()?;
        Ok(records)
    }

    /// Returns up to `limit` records, newest first.
    pub fn recent(&self, limit: i64) -> Result<Vec<HistoryRecord>, StoreError> {
        let mut session = self.store.begin()?;
        let records = session.recent_history(limit)?;
        session.commit()?;
        Ok(records)
    }

    /// Counts records created before `cutoff`.
    pub fn count_before(&self, cutoff: DateTime<Utc>) -> Result<i64, StoreError> {
        let mut session = self.store.begin()?;
        let count = session.count_history_before(cutoff)?;
        session.commit()?;
        Ok(count)
    }
}
