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

//! Typed store interface with pluggable backends.
//!
//! The cache and the history recorder never build SQL themselves; they talk
//! to a [`CronStore`], which hands out [`StoreSession`]s. A session is one
//! open transaction on one connection:
//!
//! - reads see committed data plus the session's own writes
//! - writes become visible to other sessions only on [`StoreSession::commit`]
//! - sequence increments take effect immediately and survive rollback
//! - a sequence value and its timestamp are taken together, so value order
//!   and time order agree across sessions
//! - dropping a session without committing rolls it back
//!
//! Backends:
//! - [`postgres::PostgresStore`]: diesel over an r2d2 pool (feature `postgres`)
//! - [`memory::MemoryStore`]: in-process tables, used for embedding and tests

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::models::{AtJob, CronJobRow, HistoryRecord, NewAtJob, NewCronJob, NewHistoryRecord};

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

/// A source of transactional sessions.
///
/// Implementations must be shareable between threads; each session they hand
/// out is independent of every other session.
pub trait CronStore: Send + Sync {
    /// Opens a new session with its own transaction.
    fn begin(&self) -> Result<Box<dyn StoreSession>, StoreError>;
}

/// Whose privileges a session uses when it advances a sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Privilege {
    /// The role the session is logged in as.
    Caller,
    /// The owner of the installation, regardless of the login role.
    Owner(String),
}

/// A sequence value together with the time it was handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub value: i64,
    pub allocated_at: DateTime<Utc>,
}

impl std::fmt::Debug for dyn CronStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CronStore")
    }
}

/// One open transaction against the store.
pub trait StoreSession: Send {
    /// Returns the role the session is logged in as.
    fn current_role(&mut self) -> Result<String, StoreError>;

    /// Returns the privilege sequence access currently runs under.
    fn privilege(&self) -> Privilege;

    /// Changes the privilege sequence access runs under.
    ///
    /// Taking [`Privilege::Owner`] fails with
    /// [`StoreError::PermissionDenied`] unless the named role owns the
    /// installation. The login role never changes.
    fn set_privilege(&mut self, privilege: Privilege) -> Result<(), StoreError>;

    /// Returns the role owning the named extension, if it is installed.
    fn extension_owner(&mut self, extension: &str) -> Result<Option<String>, StoreError>;

    /// Advances the named sequence under the current privilege and returns
    /// the new value with its allocation time.
    ///
    /// The increment is not undone by rollback.
    fn next_value(&mut self, sequence: &str) -> Result<Allocation, StoreError>;

    /// Appends a history record stamped with the time its id was allocated.
    fn insert_history(&mut self, record: &NewHistoryRecord) -> Result<HistoryRecord, StoreError>;

    /// Returns the history of one job ordered by history id.
    fn history_for_job(&mut self, job_id: i64) -> Result<Vec<HistoryRecord>, StoreError>;

    /// Returns the most recent history records, newest first.
    fn recent_history(&mut self, limit: i64) -> Result<Vec<HistoryRecord>, StoreError>;

    /// Counts history records created before `cutoff`.
    fn count_history_before(&mut self, cutoff: DateTime<Utc>) -> Result<i64, StoreError>;

    /// Reads every recurring job, ordered by id.
    fn cron_jobs(&mut self) -> Result<Vec<CronJobRow>, StoreError>;

    /// Reads every one-shot job, ordered by id.
    fn at_jobs(&mut self) -> Result<Vec<AtJob>, StoreError>;

    /// Inserts a recurring job row under the given id.
    fn insert_cron_job(&mut self, id: i64, job: &NewCronJob) -> Result<CronJobRow, StoreError>;

    /// Inserts a one-shot job row under the given id.
    fn insert_at_job(&mut self, id: i64, job: &NewAtJob) -> Result<AtJob, StoreError>;

    /// Deletes a recurring job row. Returns the deleted row, if there was one.
    fn delete_cron_job(&mut self, id: i64) -> Result<Option<CronJobRow>, StoreError>;

    /// Deletes a one-shot job row. Returns the deleted row, if there was one.
    fn delete_at_job(&mut self, id: i64) -> Result<Option<AtJob>, StoreError>;

    /// Commits the transaction.
    fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Rolls the transaction back.
    fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
