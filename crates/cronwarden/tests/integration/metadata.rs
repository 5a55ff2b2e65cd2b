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

//! Catalog writes paired with their history records.

use chrono::{Duration, Utc};
use serde_json::json;

use cronwarden::{CatalogError, EventKind, JobKind, NewAtJob, NewCronJob, PersistError};

use crate::fixtures::memory_fixture;

#[test]
fn test_schedule_cron_job_writes_row_and_record() {
    let fixture = memory_fixture();
    let metadata = &fixture.metadata;
    metadata.load_cron_job_list().unwrap();

    let job = metadata
        .schedule_cron_job(&NewCronJob::local("30 2 * * *", "VACUUM", "postgres", "alice"))
        .unwrap();
    assert_eq!(job.id, 1);
    assert!(!metadata.cron_cache().is_valid());
    assert_eq!(metadata.get_cron_job(job.id).unwrap().schedule_text, "30 2 * * *");

    let history = metadata.recorder().history_for_job(job.id).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(
        history[0].message,
        json!({"event": "scheduled", "command": "VACUUM", "schedule": "30 2 * * *"})
    );
}

#[test]
fn test_schedule_ids_come_from_separate_sequences() {
    let fixture = memory_fixture();
    let metadata = &fixture.metadata;

    let cron = metadata
        .schedule_cron_job(&NewCronJob::local("* * * * *", "SELECT 1", "postgres", "alice"))
        .unwrap();
    let at = metadata
        .schedule_at_job(&NewAtJob::local(
            Utc::now() + Duration::hours(2),
            "SELECT 2",
            "postgres",
            "alice",
        ))
        .unwrap();

    assert_eq!(cron.id, 1);
    assert_eq!(at.id, 1);
    assert_eq!(
        fixture
            .store
            .sequence_value(fixture.config.history_sequence()),
        Some(2)
    );

    let record = &metadata.recorder().recent(1).unwrap()[0];
    assert_eq!(record.payload().unwrap().kind(), EventKind::ScheduledAt);
}

#[test]
fn test_schedule_rolls_back_row_when_history_fails() {
    let fixture = memory_fixture();
    fixture.store.reject_history_inserts(true);

    let err = fixture
        .metadata
        .schedule_cron_job(&NewCronJob::local("* * * * *", "SELECT 1", "postgres", "alice"))
        .unwrap_err();
    assert!(matches!(err, CatalogError::Persist(PersistError::Insert(_))));

    fixture.store.reject_history_inserts(false);
    assert!(fixture.metadata.load_cron_job_list().unwrap().is_empty());
}

#[test]
fn test_unschedule_cron_job() {
    let fixture = memory_fixture();
    let metadata = &fixture.metadata;
    let job = metadata
        .schedule_cron_job(&NewCronJob::local("0 * * * *", "ANALYZE", "postgres", "alice"))
        .unwrap();

    let removed = metadata.unschedule_cron_job(job.id).unwrap();
    assert_eq!(removed.command, "ANALYZE");
    assert!(matches!(
        metadata.get_cron_job(job.id),
        Err(cronwarden::CacheError::NotFound { .. })
    ));

    let kinds: Vec<EventKind> = metadata
        .recorder()
        .history_for_job(job.id)
        .unwrap()
        .iter()
        .map(|r| r.payload().unwrap().kind())
        .collect();
    assert_eq!(kinds, vec![EventKind::Scheduled, EventKind::Unscheduled]);

    assert!(matches!(
        metadata.unschedule_cron_job(job.id),
        Err(CatalogError::NotFound { kind: JobKind::Cron, .. })
    ));
}

#[test]
fn test_job_lifecycle_history() {
    let fixture = memory_fixture();
    let metadata = &fixture.metadata;
    let job = metadata
        .schedule_cron_job(&NewCronJob::local("*/5 * * * *", "SELECT 1", "postgres", "alice"))
        .unwrap();

    let recorder = metadata.recorder();
    recorder.record_started(job.id, &job.command).unwrap();
    recorder
        .record_completed_with_status(job.id, &job.command, "SELECT 1", 1)
        .unwrap();
    recorder.record_started(job.id, &job.command).unwrap();
    recorder
        .record_failed_with_message(job.id, &job.command, "canceling statement due to statement timeout")
        .unwrap();

    let history = recorder.history_for_job(job.id).unwrap();
    let ids: Vec<i64> = history.iter().map(|r| r.history_id).collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(ids, sorted);
    assert_eq!(history.len(), 5);
}
