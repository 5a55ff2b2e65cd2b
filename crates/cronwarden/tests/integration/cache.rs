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

//! Job metadata cache behaviour against the memory store.

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{Duration, Utc};

use cronwarden::{
    CacheError, CronStore, CronJob, JobCache, JobKind, LoadError, MemoryStore, NewAtJob,
    NewCronJob, StoreSession,
};

use crate::fixtures::memory_fixture;

fn seed_cron_jobs(store: &MemoryStore, ids: &[i64]) {
    let mut session = store.begin().unwrap();
    for &id in ids {
        session
            .insert_cron_job(
                id,
                &NewCronJob::local("*/10 * * * *", &format!("SELECT {}", id), "postgres", "alice"),
            )
            .unwrap();
    }
    session.commit().unwrap();
}

fn seed_at_job(store: &MemoryStore, id: i64) {
    let mut session = store.begin().unwrap();
    session
        .insert_at_job(
            id,
            &NewAtJob::local(Utc::now() + Duration::minutes(5), "VACUUM", "postgres", "alice"),
        )
        .unwrap();
    session.commit().unwrap();
}

#[test]
fn test_load_then_list_returns_exact_catalog() {
    let fixture = memory_fixture();
    seed_cron_jobs(&fixture.store, &[3, 1, 2]);

    let jobs = fixture.metadata.load_cron_job_list().unwrap();
    let ids: Vec<i64> = jobs.iter().map(|j| j.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(jobs[0].command, "SELECT 1");
    assert!(jobs.iter().all(|j| j.schedule.is_some()));
}

#[test]
fn test_invalidate_triggers_exactly_one_reload() {
    let fixture = memory_fixture();
    seed_cron_jobs(&fixture.store, &[1, 2]);
    let cache = fixture.metadata.cron_cache();

    cache.load().unwrap();
    assert_eq!(cache.load_count(), 1);

    seed_cron_jobs(&fixture.store, &[3]);
    // Still answering from the old entries.
    assert!(matches!(
        fixture.metadata.get_cron_job(3),
        Err(CacheError::NotFound { kind: JobKind::Cron, id: 3 })
    ));

    fixture.metadata.on_catalog_change(JobKind::Cron);
    assert!(!cache.is_valid());

    assert_eq!(fixture.metadata.get_cron_job(3).unwrap().id, 3);
    assert_eq!(cache.load_count(), 2);
    fixture.metadata.get_cron_job(1).unwrap();
    cache.list().unwrap();
    assert_eq!(cache.load_count(), 2);
}

#[test]
fn test_caches_are_independent_per_kind() {
    let fixture = memory_fixture();
    seed_cron_jobs(&fixture.store, &[1]);
    seed_at_job(&fixture.store, 1);

    fixture.metadata.load_cron_job_list().unwrap();
    fixture.metadata.load_at_job_list().unwrap();
    fixture.metadata.on_catalog_change(JobKind::At);

    assert!(fixture.metadata.cron_cache().is_valid());
    assert!(!fixture.metadata.at_cache().is_valid());
}

#[test]
fn test_remove_at_job_is_idempotent() {
    let fixture = memory_fixture();
    seed_at_job(&fixture.store, 8);
    assert_eq!(fixture.metadata.get_at_job(8).unwrap().command, "VACUUM");

    assert!(fixture.metadata.remove_at_job(8).unwrap());
    assert!(matches!(
        fixture.metadata.get_at_job(8),
        Err(CacheError::NotFound { kind: JobKind::At, id: 8 })
    ));

    let history_before = fixture.store.committed_history().len();
    let loads_before = fixture.metadata.at_cache().load_count();
    assert!(!fixture.metadata.remove_at_job(8).unwrap());
    assert!(!fixture.metadata.remove_at_job(999).unwrap());

    assert_eq!(fixture.store.committed_history().len(), history_before);
    assert!(fixture.metadata.at_cache().is_valid());
    assert_eq!(fixture.metadata.at_cache().load_count(), loads_before);
}

#[test]
fn test_load_failure_keeps_cache_invalid() {
    let fixture = memory_fixture();
    seed_cron_jobs(&fixture.store, &[1]);

    fixture.store.set_offline(true);
    let err = fixture.metadata.get_cron_job(1).unwrap_err();
    assert!(matches!(
        err,
        CacheError::Load(LoadError::Store { kind: JobKind::Cron, .. })
    ));
    assert!(!fixture.metadata.cron_cache().is_valid());
    assert_eq!(fixture.metadata.cron_cache().load_count(), 0);

    fixture.store.set_offline(false);
    assert_eq!(fixture.metadata.get_cron_job(1).unwrap().id, 1);
    assert!(fixture.metadata.cron_cache().is_valid());
}

#[test]
fn test_list_returns_defensive_snapshot() {
    let fixture = memory_fixture();
    seed_cron_jobs(&fixture.store, &[1, 2]);

    let mut jobs = fixture.metadata.cron_cache().list().unwrap();
    jobs[0].command = "DROP TABLE t".to_string();
    jobs.clear();

    let again = fixture.metadata.cron_cache().list().unwrap();
    assert_eq!(again.len(), 2);
    assert_eq!(again[0].command, "SELECT 1");
}

#[test]
fn test_reset_drops_entries_until_next_access() {
    let fixture = memory_fixture();
    seed_cron_jobs(&fixture.store, &[1]);
    fixture.metadata.load_cron_job_list().unwrap();

    fixture.metadata.reset_cron_job_metadata_cache();
    assert!(!fixture.metadata.cron_cache().is_valid());
    assert_eq!(fixture.metadata.cron_cache().list().unwrap().len(), 1);
}

#[test]
fn test_initialize_makes_first_access_load() {
    let fixture = memory_fixture();
    seed_at_job(&fixture.store, 4);

    fixture.metadata.initialize_at_job_metadata_cache();
    assert_eq!(fixture.metadata.at_cache().load_count(), 0);
    assert_eq!(fixture.metadata.get_at_job(4).unwrap().id, 4);
    assert_eq!(fixture.metadata.at_cache().load_count(), 1);
}

#[test]
fn test_concurrent_loads_never_tear() {
    let fixture = memory_fixture();
    seed_cron_jobs(&fixture.store, &[1, 2, 3, 4, 5]);
    let cache: Arc<JobCache<CronJob>> = Arc::new(JobCache::new(Arc::new(fixture.store.clone())));
    let barrier = Arc::new(Barrier::new(6));

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..25 {
                    if i % 2 == 0 {
                        cache.load().unwrap();
                    } else {
                        cache.invalidate();
                    }
                    let jobs = cache.list().unwrap();
                    let ids: HashSet<i64> = jobs.iter().map(|j| j.id).collect();
                    assert_eq!(jobs.len(), 5);
                    assert_eq!(ids.len(), 5);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}
