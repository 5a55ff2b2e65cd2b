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

//! History Writer
//!
//! Appends one history record per call. The caller chooses how the record
//! relates to its own unit of work through [`Durability`]:
//!
//! - [`Durability::Inherit`] writes through the caller's open session; the
//!   record exists only if that session commits
//! - [`Durability::Independent`] writes through a session of its own and
//!   commits it before returning, so the record survives whatever happens to
//!   the caller's work
//!
//! Id allocation and the insert always happen in the same session, and the
//! record carries the time its id was allocated.

use std::sync::Arc;

use tracing::{debug, warn};

use super::event::EventPayload;
use super::identity::IdentityAllocator;
use crate::error::PersistError;
use crate::models::{HistoryRecord, NewHistoryRecord};
use crate::store::{CronStore, StoreSession};

/// How a history record relates to the caller's transaction.
pub enum Durability<'a> {
    /// Write inside the caller's session; abort discards the record.
    Inherit(&'a mut dyn StoreSession),
    /// Write and commit in a separate session.
    ///
    /// The separate session needs a second connection while the caller may
    /// still hold one, so pooled stores need room for both.
    Independent,
}

impl Durability<'_> {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            Durability::Inherit(_) => "inherit",
            Durability::Independent => "independent",
        }
    }
}

impl std::fmt::Debug for Durability<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Persists history records.
pub struct HistoryWriter {
    store: Arc<dyn CronStore>,
    allocator: Arc<IdentityAllocator>,
    sequence: String,
}

impl HistoryWriter {
    /// Creates a writer drawing ids from `sequence`.
    pub fn new(
        store: Arc<dyn CronStore>,
        allocator: Arc<IdentityAllocator>,
        sequence: impl Into<String>,
    ) -> Self {
        Self {
            store,
            allocator,
            sequence: sequence.into(),
        }
    }

    /// Appends `payload` to the history of `job_id`.
    pub fn record(
        &self,
        job_id: i64,
        payload: &EventPayload,
        durability: Durability<'_>,
    ) -> Result<HistoryRecord, PersistError> {
        debug!(
            job_id,
            kind = %payload.kind(),
            durability = durability.label(),
            "Recording history event"
        );

        match durability {
            Durability::Inherit(session) => self.append(session, job_id, payload),
            Durability::Independent => self.record_independent(job_id, payload),
        }
    }

    fn record_independent(
        &self,
        job_id: i64,
        payload: &EventPayload,
    ) -> Result<HistoryRecord, PersistError> {
        let mut session = self.store.begin().map_err(PersistError::Begin)?;

        match self.append(session.as_mut(), job_id, payload) {
            Ok(record) => {
                session.commit().map_err(PersistError::Commit)?;
                Ok(record)
            }
            Err(e) => {
                if let Err(rollback_err) = session.rollback() {
                    warn!(
                        job_id,
                        error = %rollback_err,
                        "Failed to roll back audit history transaction"
                    );
                }
                Err(e)
            }
        }
    }

    fn append(
        &self,
        session: &mut dyn StoreSession,
        job_id: i64,
        payload: &EventPayload,
    ) -> Result<HistoryRecord, PersistError> {
        let allocation = self.allocator.allocate(session, &self.sequence)?;
        let record = NewHistoryRecord {
            history_id: allocation.value,
            job_id,
            message: payload.to_value(),
            created_at: allocation.allocated_at,
        };
        session.insert_history(&record).map_err(PersistError::Insert)
    }
}

impl std::fmt::Debug for HistoryWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryWriter")
            .field("allocator", &self.allocator)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}
