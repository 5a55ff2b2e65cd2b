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

//! In-process store backend.
//!
//! Keeps the catalog, the history table and the sequences in memory behind a
//! single mutex. Sessions buffer their writes and apply them atomically on
//! commit, so an aborted session leaves no trace. Sequences behave like
//! database sequences: increments are immediate, checked against the acting
//! role's grants, and never rolled back. Each increment is stamped from a
//! store clock that never runs backwards, under the same lock.
//!
//! A session's login role is fixed. Only the owner of an installed extension
//! can be borrowed as [`Privilege::Owner`].
//!
//! The store can be switched offline or told to reject history inserts to
//! exercise failure paths.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use super::{Allocation, CronStore, Privilege, StoreSession};
use crate::config::CronwardenConfig;
use crate::error::StoreError;
use crate::models::{AtJob, CronJobRow, HistoryRecord, NewAtJob, NewCronJob, NewHistoryRecord};

#[derive(Debug)]
struct Sequence {
    value: i64,
    owner: String,
    grants: HashSet<String>,
}

#[derive(Debug, Default)]
struct Tables {
    offline: bool,
    reject_history_inserts: bool,
    extensions: HashMap<String, String>,
    sequences: HashMap<String, Sequence>,
    cron_jobs: BTreeMap<i64, CronJobRow>,
    at_jobs: BTreeMap<i64, AtJob>,
    history: BTreeMap<i64, HistoryRecord>,
    clock: Option<DateTime<Utc>>,
}

impl Tables {
    fn tick(&mut self) -> DateTime<Utc> {
        let now = match self.clock {
            Some(last) => Utc::now().max(last),
            None => Utc::now(),
        };
        self.clock = Some(now);
        now
    }
}

/// In-memory implementation of [`CronStore`].
///
/// Cloning the store shares the same tables.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    login_role: String,
}

impl MemoryStore {
    /// Creates an empty store whose sessions start as `login_role`.
    pub fn new(login_role: &str) -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            login_role: login_role.to_string(),
        }
    }

    /// Creates a store with the extension and its sequences already installed
    /// and owned by `owner`.
    pub fn installed(config: &CronwardenConfig, owner: &str, login_role: &str) -> Self {
        let store = Self::new(login_role);
        store.install_extension(config.extension_name(), owner);
        store.create_sequence(config.history_sequence(), owner);
        store.create_sequence(config.job_id_sequence(), owner);
        store.create_sequence(config.at_job_id_sequence(), owner);
        store
    }

    /// Returns a handle to the same tables whose sessions start as `role`.
    pub fn connect_as(&self, role: &str) -> Self {
        Self {
            tables: Arc::clone(&self.tables),
            login_role: role.to_string(),
        }
    }

    /// Registers an extension and its owning role.
    pub fn install_extension(&self, name: &str, owner: &str) {
        self.tables
            .lock()
            .extensions
            .insert(name.to_string(), owner.to_string());
    }

    /// Creates a sequence starting at 1, usable by `owner`.
    pub fn create_sequence(&self, name: &str, owner: &str) {
        self.tables.lock().sequences.insert(
            name.to_string(),
            Sequence {
                value: 0,
                owner: owner.to_string(),
                grants: HashSet::new(),
            },
        );
    }

    /// Grants `role` usage on a sequence.
    pub fn grant_sequence_usage(&self, sequence: &str, role: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        let seq = tables
            .sequences
            .get_mut(sequence)
            .ok_or_else(|| StoreError::UndefinedObject(sequence.to_string()))?;
        seq.grants.insert(role.to_string());
        Ok(())
    }

    /// Makes every new session fail to open while `offline` is set.
    pub fn set_offline(&self, offline: bool) {
        self.tables.lock().offline = offline;
    }

    /// Makes every history insert fail while `reject` is set.
    pub fn reject_history_inserts(&self, reject: bool) {
        self.tables.lock().reject_history_inserts = reject;
    }

    /// Returns the committed history, ordered by history id.
    pub fn committed_history(&self) -> Vec<HistoryRecord> {
        self.tables.lock().history.values().cloned().collect()
    }

    /// Returns the last value handed out by a sequence.
    pub fn sequence_value(&self, name: &str) -> Option<i64> {
        self.tables.lock().sequences.get(name).map(|s| s.value)
    }
}

impl CronStore for MemoryStore {
    fn begin(&self) -> Result<Box<dyn StoreSession>, StoreError> {
        if self.tables.lock().offline {
            return Err(StoreError::Connection("memory store is offline".to_string()));
        }

        Ok(Box::new(MemorySession {
            tables: Arc::clone(&self.tables),
            role: self.login_role.clone(),
            privilege: Privilege::Caller,
            pending: Vec::new(),
        }))
    }
}

#[derive(Debug, Clone)]
enum PendingWrite {
    InsertHistory(HistoryRecord),
    InsertCronJob(CronJobRow),
    InsertAtJob(AtJob),
    DeleteCronJob(i64),
    DeleteAtJob(i64),
}

/// A session against a [`MemoryStore`].
#[derive(Debug)]
pub struct MemorySession {
    tables: Arc<Mutex<Tables>>,
    role: String,
    privilege: Privilege,
    pending: Vec<PendingWrite>,
}

impl MemorySession {
    fn visible_cron_jobs(&self) -> BTreeMap<i64, CronJobRow> {
        let mut jobs = self.tables.lock().cron_jobs.clone();
        for write in &self.pending {
            match write {
                PendingWrite::InsertCronJob(row) => {
                    jobs.insert(row.id, row.clone());
                }
                PendingWrite::DeleteCronJob(id) => {
                    jobs.remove(id);
                }
                _ => {}
            }
        }
        jobs
    }

    fn visible_at_jobs(&self) -> BTreeMap<i64, AtJob> {
        let mut jobs = self.tables.lock().at_jobs.clone();
        for write in &self.pending {
            match write {
                PendingWrite::InsertAtJob(job) => {
                    jobs.insert(job.id, job.clone());
                }
                PendingWrite::DeleteAtJob(id) => {
                    jobs.remove(id);
                }
                _ => {}
            }
        }
        jobs
    }

    fn visible_history(&self) -> BTreeMap<i64, HistoryRecord> {
        let mut history = self.tables.lock().history.clone();
        for write in &self.pending {
            match write {
                PendingWrite::InsertHistory(record) => {
                    history.insert(record.history_id, record.clone());
                }
                _ => {}
            }
        }
        history
    }
}

impl StoreSession for MemorySession {
    fn current_role(&mut self) -> Result<String, StoreError> {
        Ok(self.role.clone())
    }

    fn privilege(&self) -> Privilege {
        self.privilege.clone()
    }

    fn set_privilege(&mut self, privilege: Privilege) -> Result<(), StoreError> {
        if let Privilege::Owner(owner) = &privilege {
            let owns_installation = self
                .tables
                .lock()
                .extensions
                .values()
                .any(|installed_by| installed_by == owner);
            if !owns_installation {
                return Err(StoreError::PermissionDenied {
                    role: self.role.clone(),
                    object: format!("privilege of {}", owner),
                });
            }
        }
        self.privilege = privilege;
        Ok(())
    }

    fn extension_owner(&mut self, extension: &str) -> Result<Option<String>, StoreError> {
        Ok(self.tables.lock().extensions.get(extension).cloned())
    }

    fn next_value(&mut self, sequence: &str) -> Result<Allocation, StoreError> {
        let acting = match &self.privilege {
            Privilege::Caller => self.role.as_str(),
            Privilege::Owner(owner) => owner.as_str(),
        };

        let mut tables = self.tables.lock();
        let seq = tables
            .sequences
            .get_mut(sequence)
            .ok_or_else(|| StoreError::UndefinedObject(sequence.to_string()))?;

        if seq.owner != acting && !seq.grants.contains(acting) {
            return Err(StoreError::PermissionDenied {
                role: acting.to_string(),
                object: sequence.to_string(),
            });
        }

        seq.value += 1;
        let value = seq.value;
        Ok(Allocation {
            value,
            allocated_at: tables.tick(),
        })
    }

    fn insert_history(&mut self, record: &NewHistoryRecord) -> Result<HistoryRecord, StoreError> {
        if self.tables.lock().reject_history_inserts {
            return Err(StoreError::Constraint(
                "history insert rejected by store".to_string(),
            ));
        }
        if self.visible_history().contains_key(&record.history_id) {
            return Err(StoreError::Constraint(format!(
                "duplicate history id {}",
                record.history_id
            )));
        }

        let stored = HistoryRecord {
            history_id: record.history_id,
            job_id: record.job_id,
            message: record.message.clone(),
            created_at: record.created_at,
        };
        self.pending.push(PendingWrite::InsertHistory(stored.clone()));
        Ok(stored)
    }

    fn history_for_job(&mut self, job_id: i64) -> Result<Vec<HistoryRecord>, StoreError> {
        Ok(self
            .visible_history()
            .into_values()
            .filter(|record| record.job_id == job_id)
            .collect())
    }

    fn recent_history(&mut self, limit: i64) -> Result<Vec<HistoryRecord>, StoreError> {
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(self
            .visible_history()
            .into_values()
            .rev()
            .take(limit)
            .collect())
    }

    fn count_history_before(&mut self, cutoff: DateTime<Utc>) -> Result<i64, StoreError> {
        let count = self
            .visible_history()
            .values()
            .filter(|record| record.created_at < cutoff)
            .count();
        Ok(count as i64)
    }

    fn cron_jobs(&mut self) -> Result<Vec<CronJobRow>, StoreError> {
        Ok(self.visible_cron_jobs().into_values().collect())
    }

    fn at_jobs(&mut self) -> Result<Vec<AtJob>, StoreError> {
        Ok(self.visible_at_jobs().into_values().collect())
    }

    fn insert_cron_job(&mut self, id: i64, job: &NewCronJob) -> Result<CronJobRow, StoreError> {
        if self.visible_cron_jobs().contains_key(&id) {
            return Err(StoreError::Constraint(format!("duplicate cron job id {}", id)));
        }
        let row = job.clone().into_row(id);
        self.pending.push(PendingWrite::InsertCronJob(row.clone()));
        Ok(row)
    }

    fn insert_at_job(&mut self, id: i64, job: &NewAtJob) -> Result<AtJob, StoreError> {
        if self.visible_at_jobs().contains_key(&id) {
            return Err(StoreError::Constraint(format!("duplicate at job id {}", id)));
        }
        let row = job.clone().into_job(id);
        self.pending.push(PendingWrite::InsertAtJob(row.clone()));
        Ok(row)
    }

    fn delete_cron_job(&mut self, id: i64) -> Result<Option<CronJobRow>, StoreError> {
        let existing = self.visible_cron_jobs().remove(&id);
        if existing.is_some() {
            self.pending.push(PendingWrite::DeleteCronJob(id));
        }
        Ok(existing)
    }

    fn delete_at_job(&mut self, id: i64) -> Result<Option<AtJob>, StoreError> {
        let existing = self.visible_at_jobs().remove(&id);
        if existing.is_some() {
            self.pending.push(PendingWrite::DeleteAtJob(id));
        }
        Ok(existing)
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();

        // Validate against writes committed by other sessions before applying anything.
        for write in &self.pending {
            let conflict = match write {
                PendingWrite::InsertHistory(record) => {
                    tables.history.contains_key(&record.history_id)
                }
                PendingWrite::InsertCronJob(row) => tables.cron_jobs.contains_key(&row.id),
                PendingWrite::InsertAtJob(job) => tables.at_jobs.contains_key(&job.id),
                _ => false,
            };
            if conflict {
                return Err(StoreError::Constraint(
                    "concurrent insert with the same key".to_string(),
                ));
            }
        }

        let applied = self.pending.len();
        for write in self.pending.iter().cloned() {
            match write {
                PendingWrite::InsertHistory(record) => {
                    tables.history.insert(record.history_id, record);
                }
                PendingWrite::InsertCronJob(row) => {
                    tables.cron_jobs.insert(row.id, row);
                }
                PendingWrite::InsertAtJob(job) => {
                    tables.at_jobs.insert(job.id, job);
                }
                PendingWrite::DeleteCronJob(id) => {
                    tables.cron_jobs.remove(&id);
                }
                PendingWrite::DeleteAtJob(id) => {
                    tables.at_jobs.remove(&id);
                }
            }
        }

        debug!(writes = applied, "Memory store session committed");
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        debug!(
            discarded = self.pending.len(),
            "Memory store session rolled back"
        );
        Ok(())
    }
}
