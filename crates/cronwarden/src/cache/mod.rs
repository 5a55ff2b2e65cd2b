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

//! Job Metadata Cache
//!
//! An in-memory projection of one job collection from the catalog, with a
//! validity flag. Lookups on an invalid cache reload it first; catalog
//! changes only mark it invalid.
//!
//! # Consistency
//!
//! - entries are replaced as a whole by swapping one `Arc`, so readers see
//!   either the old or the new collection, never a mix
//! - the lock is never held while reading the catalog
//! - each invalidation bumps a generation counter; a load that started
//!   before the latest invalidation installs nothing and leaves the cache
//!   invalid, so a late reader can never replace fresher entries
//!
//! # Example
//!
//! ```rust,ignore
//! let cache: JobCache<CronJob> = JobCache::new(store);
//! let jobs = cache.list()?;
//! cache.invalidate();
//! let job = cache.get(jobs[0].id)?; // reloads once
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{CacheError, LoadError, StoreError};
use crate::models::{AtJob, CronJob, JobKind};
use crate::store::{CronStore, StoreSession};

/// A job type that can be held in a [`JobCache`].
pub trait CachedJob: Clone + Send + Sync + 'static {
    /// The collection this job type belongs to.
    const KIND: JobKind;

    /// Unique job identifier.
    fn id(&self) -> i64;

    /// Reads the full collection through `session`, ordered by id.
    fn load_all(session: &mut dyn StoreSession) -> Result<Vec<Self>, StoreError>;
}

impl CachedJob for CronJob {
    const KIND: JobKind = JobKind::Cron;

    fn id(&self) -> i64 {
        self.id
    }

    fn load_all(session: &mut dyn StoreSession) -> Result<Vec<Self>, StoreError> {
        Ok(session.cron_jobs()?.into_iter().map(CronJob::from).collect())
    }
}

impl CachedJob for AtJob {
    const KIND: JobKind = JobKind::At;

    fn id(&self) -> i64 {
        self.id
    }

    fn load_all(session: &mut dyn StoreSession) -> Result<Vec<Self>, StoreError> {
        session.at_jobs()
    }
}

#[derive(Debug)]
struct CacheEntries<J> {
    jobs: Vec<J>,
    index: HashMap<i64, usize>,
}

impl<J: CachedJob> CacheEntries<J> {
    fn empty() -> Self {
        Self {
            jobs: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Builds the entry set, keeping the first job seen for each id.
    fn build(loaded: Vec<J>) -> Self {
        let mut jobs = Vec::with_capacity(loaded.len());
        let mut index = HashMap::with_capacity(loaded.len());

        for job in loaded {
            let id = job.id();
            if index.contains_key(&id) {
                warn!(kind = %J::KIND, job_id = id, "Catalog returned a duplicate job id; ignoring it");
                continue;
            }
            index.insert(id, jobs.len());
            jobs.push(job);
        }

        Self { jobs, index }
    }

    fn get(&self, id: i64) -> Option<&J> {
        self.index.get(&id).map(|&pos| &self.jobs[pos])
    }
}

struct CacheState<J> {
    valid: bool,
    generation: u64,
    entries: Arc<CacheEntries<J>>,
}

/// Validity-flagged cache of one job collection.
pub struct JobCache<J> {
    store: Arc<dyn CronStore>,
    state: Mutex<CacheState<J>>,
    loads: AtomicU64,
}

impl<J: CachedJob> JobCache<J> {
    /// Creates an empty, invalid cache over `store`.
    pub fn new(store: Arc<dyn CronStore>) -> Self {
        Self {
            store,
            state: Mutex::new(CacheState {
                valid: false,
                generation: 0,
                entries: Arc::new(CacheEntries::empty()),
            }),
            loads: AtomicU64::new(0),
        }
    }

    pub fn kind(&self) -> JobKind {
        J::KIND
    }

    /// Reads the whole collection from the catalog and replaces the entries.
    ///
    /// On failure the cache is left invalid so the next access retries.
    pub fn load(&self) -> Result<(), LoadError> {
        self.load_entries().map(|_| ())
    }

    /// Loads and returns the entries just read, whether or not they could be
    /// installed.
    fn load_entries(&self) -> Result<Arc<CacheEntries<J>>, LoadError> {
        let generation = self.state.lock().generation;

        let jobs = match self.read_catalog() {
            Ok(jobs) => jobs,
            Err(source) => {
                self.state.lock().valid = false;
                warn!(kind = %J::KIND, error = %source, "Failed to load job cache");
                return Err(LoadError::Store {
                    kind: J::KIND,
                    source,
                });
            }
        };

        let entries = Arc::new(CacheEntries::build(jobs));
        self.loads.fetch_add(1, Ordering::Relaxed);
        if self.install(generation, Arc::clone(&entries)) {
            debug!(kind = %J::KIND, jobs = entries.jobs.len(), "Loaded job cache");
        } else {
            debug!(kind = %J::KIND, "Job cache invalidated during load; discarding read");
        }
        Ok(entries)
    }

    /// Swaps in freshly read entries and marks the cache valid, unless an
    /// invalidation happened since `generation` was observed.
    fn install(&self, generation: u64, entries: Arc<CacheEntries<J>>) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation {
            return false;
        }
        state.entries = entries;
        state.valid = true;
        true
    }

    fn read_catalog(&self) -> Result<Vec<J>, StoreError> {
        let mut session = self.store.begin()?;
        let jobs = J::load_all(session.as_mut())?;
        session.commit()?;
        Ok(jobs)
    }

    /// Marks the cache stale without reloading it.
    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        state.valid = false;
        state.generation = state.generation.wrapping_add(1);
        debug!(kind = %J::KIND, generation = state.generation, "Invalidated job cache");
    }

    /// Drops every entry and marks the cache stale.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.valid = false;
        state.generation = state.generation.wrapping_add(1);
        state.entries = Arc::new(CacheEntries::empty());
        debug!(kind = %J::KIND, "Reset job cache");
    }

    fn snapshot(&self) -> Result<Arc<CacheEntries<J>>, LoadError> {
        {
            let state = self.state.lock();
            if state.valid {
                return Ok(Arc::clone(&state.entries));
            }
        }
        self.load_entries()
    }

    /// Looks up one job, reloading first if the cache is stale.
    pub fn get(&self, id: i64) -> Result<J, CacheError> {
        let entries = self.snapshot()?;
        entries
            .get(id)
            .cloned()
            .ok_or(CacheError::NotFound { kind: J::KIND, id })
    }

    /// Returns a copy of every job, ordered by id, reloading first if stale.
    pub fn list(&self) -> Result<Vec<J>, LoadError> {
        Ok(self.snapshot()?.jobs.clone())
    }

    pub fn is_valid(&self) -> bool {
        self.state.lock().valid
    }

    /// Number of successful catalog reads so far.
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }
}

impl JobCache<AtJob> {
    /// Deletes a one-shot job from the catalog and invalidates the cache.
    ///
    /// Returns whether a row was removed. Removing an absent id changes
    /// nothing.
    pub fn remove(&self, id: i64) -> Result<bool, CacheError> {
        let remove_err = |source: StoreError| CacheError::Remove {
            kind: JobKind::At,
            id,
            source,
        };

        let mut session = self.store.begin().map_err(remove_err)?;
        let removed = session.delete_at_job(id).map_err(remove_err)?;
        session.commit().map_err(remove_err)?;

        match removed {
            Some(job) => {
                self.invalidate();
                info!(job_id = id, fire_at = %job.fire_at, "Removed at job");
                Ok(true)
            }
            None => {
                debug!(job_id = id, "At job already absent");
                Ok(false)
            }
        }
    }
}

impl<J: CachedJob> std::fmt::Debug for JobCache<J> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("JobCache")
            .field("kind", &J::KIND)
            .field("valid", &state.valid)
            .field("generation", &state.generation)
            .field("entries", &state.entries.jobs.len())
            .field("loads", &self.load_count())
            .finish()
    }
}
