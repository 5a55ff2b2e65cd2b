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

//! PostgreSQL backend tests.
//!
//! Run with `CRONWARDEN_DATABASE_URL` pointing at a disposable database and
//! `cargo test -- --ignored`.

use std::sync::Barrier;
use std::thread;

use chrono::{Duration, Utc};
use serde_json::json;
use serial_test::serial;

use cronwarden::{
    CacheError, CronStore, EventKind, NewAtJob, NewCronJob, Privilege, StoreError, StoreSession,
};

use crate::fixtures::{get_or_init_postgres_fixture, PG_CALLER_ROLE};

#[test]
#[ignore] // Requires PostgreSQL database
#[serial]
fn test_postgres_inherit_abort_leaves_no_rows() {
    let fixture = get_or_init_postgres_fixture();
    let mut guard = fixture.lock().unwrap_or_else(|e| e.into_inner());
    guard.reset_database();
    let metadata = guard.metadata();

    let mut session = metadata.begin().unwrap();
    metadata
        .recorder()
        .record_scheduled(session.as_mut(), 1, "VACUUM", "0 3 * * *")
        .unwrap();
    session.rollback().unwrap();

    assert!(metadata.recorder().history_for_job(1).unwrap().is_empty());
}

#[test]
#[ignore] // Requires PostgreSQL database
#[serial]
fn test_postgres_independent_survives_rollback() {
    let fixture = get_or_init_postgres_fixture();
    let mut guard = fixture.lock().unwrap_or_else(|e| e.into_inner());
    guard.reset_database();
    let metadata = guard.metadata();

    let mut job_tx = metadata.begin().unwrap();
    job_tx
        .insert_cron_job(5, &NewCronJob::local("* * * * *", "SELECT 1", "postgres", "postgres"))
        .unwrap();
    let started = metadata.recorder().record_started(5, "SELECT 1").unwrap();
    drop(job_tx);

    let history = metadata.recorder().history_for_job(5).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].history_id, started.history_id);
    assert_eq!(
        history[0].message,
        json!({"event": "started", "command": "SELECT 1"})
    );
    assert!(metadata.load_cron_job_list().unwrap().is_empty());
}

#[test]
#[ignore] // Requires PostgreSQL database
#[serial]
fn test_postgres_unprivileged_login_records_in_both_modes() {
    let fixture = get_or_init_postgres_fixture();
    let mut guard = fixture.lock().unwrap_or_else(|e| e.into_inner());
    guard.reset_database();
    let metadata = guard.caller_metadata();

    // On its own privilege the login cannot advance the sequence.
    let mut session = metadata.begin().unwrap();
    assert_eq!(session.current_role().unwrap(), PG_CALLER_ROLE);
    assert!(matches!(
        session.next_value("cron.histid_seq"),
        Err(StoreError::PermissionDenied { ref role, .. }) if role == PG_CALLER_ROLE
    ));
    drop(session);

    let mut session = metadata.begin().unwrap();
    let unscheduled = metadata
        .recorder()
        .record_unscheduled(session.as_mut(), 9, "SELECT 1")
        .unwrap();
    assert_eq!(session.current_role().unwrap(), PG_CALLER_ROLE);
    assert_eq!(session.privilege(), Privilege::Caller);
    session.commit().unwrap();

    let started = metadata.recorder().record_started(9, "SELECT 1").unwrap();
    assert!(started.history_id > unscheduled.history_id);

    let kinds: Vec<EventKind> = metadata
        .recorder()
        .history_for_job(9)
        .unwrap()
        .iter()
        .map(|r| r.payload().unwrap().kind())
        .collect();
    assert_eq!(kinds, vec![EventKind::Unscheduled, EventKind::Started]);
}

#[test]
#[ignore] // Requires PostgreSQL database
#[serial]
fn test_postgres_unprivileged_login_cannot_borrow_other_roles() {
    let fixture = get_or_init_postgres_fixture();
    let mut guard = fixture.lock().unwrap_or_else(|e| e.into_inner());
    guard.reset_database();
    let metadata = guard.caller_metadata();

    let mut session = metadata.begin().unwrap();
    assert!(matches!(
        session.set_privilege(Privilege::Owner(PG_CALLER_ROLE.to_string())),
        Err(StoreError::PermissionDenied { .. })
    ));
    assert_eq!(session.privilege(), Privilege::Caller);
}

#[test]
#[ignore] // Requires PostgreSQL database
#[serial]
fn test_postgres_cache_and_at_job_removal() {
    let fixture = get_or_init_postgres_fixture();
    let mut guard = fixture.lock().unwrap_or_else(|e| e.into_inner());
    guard.reset_database();
    let metadata = guard.metadata();

    let cron = metadata
        .schedule_cron_job(&NewCronJob::local("*/15 * * * *", "ANALYZE", "postgres", "postgres"))
        .unwrap();
    let at = metadata
        .schedule_at_job(&NewAtJob::local(
            Utc::now() + Duration::hours(1),
            "VACUUM",
            "postgres",
            "postgres",
        ))
        .unwrap();

    assert_eq!(metadata.get_cron_job(cron.id).unwrap().command, "ANALYZE");
    assert_eq!(metadata.get_at_job(at.id).unwrap().command, "VACUUM");

    assert!(metadata.remove_at_job(at.id).unwrap());
    assert!(!metadata.remove_at_job(at.id).unwrap());
    assert!(matches!(
        metadata.get_at_job(at.id),
        Err(CacheError::NotFound { .. })
    ));
}

#[test]
#[ignore] // Requires PostgreSQL database
#[serial]
fn test_postgres_concurrent_writers_keep_id_and_time_order_aligned() {
    const WRITERS: usize = 4;
    const RECORDS_PER_WRITER: usize = 25;

    let fixture = get_or_init_postgres_fixture();
    let mut guard = fixture.lock().unwrap_or_else(|e| e.into_inner());
    guard.reset_database();
    let store = guard.store();
    let metadata = guard.caller_metadata();
    let recorder = metadata.recorder();
    let barrier = Barrier::new(WRITERS);

    thread::scope(|scope| {
        for writer in 0..WRITERS {
            let barrier = &barrier;
            scope.spawn(move || {
                barrier.wait();
                for _ in 0..RECORDS_PER_WRITER {
                    recorder.record_started(writer as i64, "SELECT 1").unwrap();
                }
            });
        }
    });

    let mut session = store.begin().unwrap();
    let mut history = session
        .recent_history((WRITERS * RECORDS_PER_WRITER) as i64)
        .unwrap();
    history.reverse();
    assert_eq!(history.len(), WRITERS * RECORDS_PER_WRITER);
    for pair in history.windows(2) {
        assert!(pair[0].created_at <= pair[1].created_at);
    }
    assert_eq!(
        metadata
            .recorder()
            .count_before(Utc::now() + Duration::minutes(1))
            .unwrap(),
        (WRITERS * RECORDS_PER_WRITER) as i64
    );
}
