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

//! Job metadata facade.
//!
//! [`JobMetadata`] owns the two job caches and the history recorder and is
//! the object a scheduler holds on to. It also provides the catalog writes
//! that pair a job row with its `scheduled` or `unscheduled` history record
//! in one transaction.

use std::sync::Arc;

use tracing::info;

use crate::cache::JobCache;
use crate::config::CronwardenConfig;
use crate::error::{CacheError, CatalogError, LoadError};
use crate::history::{HistoryRecorder, IdentityAllocator};
use crate::models::{AtJob, CronJob, JobKind, NewAtJob, NewCronJob};
use crate::store::{CronStore, StoreSession};

/// Job caches, history recording and catalog writes over one store.
#[derive(Debug)]
pub struct JobMetadata {
    store: Arc<dyn CronStore>,
    config: CronwardenConfig,
    allocator: Arc<IdentityAllocator>,
    cron_jobs: JobCache<CronJob>,
    at_jobs: JobCache<AtJob>,
    recorder: HistoryRecorder,
}

impl JobMetadata {
    /// Creates the facade. Both caches start empty and invalid.
    pub fn new(store: Arc<dyn CronStore>, config: CronwardenConfig) -> Self {
        let allocator = Arc::new(IdentityAllocator::new(config.extension_name()));
        let recorder = HistoryRecorder::new(Arc::clone(&store), Arc::clone(&allocator), &config);

        Self {
            cron_jobs: JobCache::new(Arc::clone(&store)),
            at_jobs: JobCache::new(Arc::clone(&store)),
            store,
            config,
            allocator,
            recorder,
        }
    }

    /// Connects to PostgreSQL using `config`.
    #[cfg(feature = "postgres")]
    pub fn connect(config: CronwardenConfig) -> Result<Self, crate::error::StoreError> {
        let store = crate::store::PostgresStore::from_config(&config)?;
        Ok(Self::new(Arc::new(store), config))
    }

    pub fn config(&self) -> &CronwardenConfig {
        &self.config
    }

    pub fn recorder(&self) -> &HistoryRecorder {
        &self.recorder
    }

    pub fn cron_cache(&self) -> &JobCache<CronJob> {
        &self.cron_jobs
    }

    pub fn at_cache(&self) -> &JobCache<AtJob> {
        &self.at_jobs
    }

    /// Prepares the recurring job cache; the first lookup loads it.
    pub fn initialize_cron_job_metadata_cache(&self) {
        self.cron_jobs.invalidate();
    }

    /// Prepares the one-shot job cache; the first lookup loads it.
    pub fn initialize_at_job_metadata_cache(&self) {
        self.at_jobs.invalidate();
    }

    /// Empties the recurring job cache and marks it stale.
    pub fn reset_cron_job_metadata_cache(&self) {
        self.cron_jobs.reset();
    }

    /// Empties the one-shot job cache and marks it stale.
    pub fn reset_at_job_metadata_cache(&self) {
        self.at_jobs.reset();
    }

    /// Reloads recurring jobs from the catalog and returns them.
    pub fn load_cron_job_list(&self) -> Result<Vec<CronJob>, LoadError> {
        self.cron_jobs.load()?;
        self.cron_jobs.list()
    }

    /// Reloads one-shot jobs from the catalog and returns them.
    pub fn load_at_job_list(&self) -> Result<Vec<AtJob>, LoadError> {
        self.at_jobs.load()?;
        self.at_jobs.list()
    }

    pub fn get_cron_job(&self, id: i64) -> Result<CronJob, CacheError> {
        self.cron_jobs.get(id)
    }

    pub fn get_at_job(&self, id: i64) -> Result<AtJob, CacheError> {
        self.at_jobs.get(id)
    }

    /// Deletes a one-shot job. Absent ids are not an error.
    pub fn remove_at_job(&self, id: i64) -> Result<bool, CacheError> {
        self.at_jobs.remove(id)
    }

    /// Marks the cache for `kind` stale after an outside catalog change.
    pub fn on_catalog_change(&self, kind: JobKind) {
        match kind {
            JobKind::Cron => self.cron_jobs.invalidate(),
            JobKind::At => self.at_jobs.invalidate(),
        }
    }

    /// Creates a recurring job and its `scheduled` record atomically.
    pub fn schedule_cron_job(&self, job: &NewCronJob) -> Result<CronJob, CatalogError> {
        let mut session = self.store.begin()?;

        let id = self
            .allocator
            .next_id(session.as_mut(), self.config.job_id_sequence())?;
        let row = session.insert_cron_job(id, job)?;
        self.recorder
            .record_scheduled(session.as_mut(), id, &row.command, &row.schedule)?;
        session.commit()?;

        self.cron_jobs.invalidate();
        info!(job_id = id, schedule = %row.schedule, "Scheduled cron job");
        Ok(CronJob::from(row))
    }

    /// Creates a one-shot job and its `scheduled` record atomically.
    pub fn schedule_at_job(&self, job: &NewAtJob) -> Result<AtJob, CatalogError> {
        let mut session = self.store.begin()?;

        let id = self
            .allocator
            .next_id(session.as_mut(), self.config.at_job_id_sequence())?;
        let created = session.insert_at_job(id, job)?;
        self.recorder
            .record_scheduled_at(session.as_mut(), id, &created.command, created.fire_at)?;
        session.commit()?;

        self.at_jobs.invalidate();
        info!(job_id = id, fire_at = %created.fire_at, "Scheduled at job");
        Ok(created)
    }

    /// Deletes a recurring job and records `unscheduled` atomically.
    pub fn unschedule_cron_job(&self, id: i64) -> Result<CronJob, CatalogError> {
        let mut session = self.store.begin()?;

        let row = session
            .delete_cron_job(id)?
            .ok_or(CatalogError::NotFound {
                kind: JobKind::Cron,
                id,
            })?;
        self.recorder
            .record_unscheduled(session.as_mut(), id, &row.command)?;
        session.commit()?;

        self.cron_jobs.invalidate();
        info!(job_id = id, "Unscheduled cron job");
        Ok(CronJob::from(row))
    }

    /// Opens a session on the underlying store for callers that need to
    /// combine their own writes with inherited history records.
    pub fn begin(&self) -> Result<Box<dyn StoreSession>, crate::error::StoreError> {
        self.store.begin()
    }
}
