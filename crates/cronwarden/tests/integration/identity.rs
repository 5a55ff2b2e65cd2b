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

//! Identity allocation across sessions and threads.

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

use cronwarden::{
    AllocationError, CronStore, IdentityAllocator, MemoryStore, Privilege, StoreError,
    StoreSession,
};

use crate::fixtures::{memory_fixture, CALLER_ROLE, OWNER_ROLE};

const THREADS: usize = 8;
const IDS_PER_THREAD: usize = 50;

#[test]
fn test_concurrent_next_id_never_repeats() {
    let fixture = memory_fixture();
    let store = fixture.store.clone();
    let allocator = Arc::new(IdentityAllocator::new(fixture.config.extension_name()));
    let sequence = fixture.config.history_sequence().to_string();
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let store = store.clone();
            let allocator = Arc::clone(&allocator);
            let sequence = sequence.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut ids = Vec::with_capacity(IDS_PER_THREAD);
                for _ in 0..IDS_PER_THREAD {
                    // Each allocation in its own session, committed or not.
                    let mut session = store.begin().unwrap();
                    ids.push(allocator.next_id(session.as_mut(), &sequence).unwrap());
                    session.rollback().unwrap();
                }
                ids
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        for id in handle.join().unwrap() {
            assert!(seen.insert(id), "id {} allocated twice", id);
        }
    }

    let total = (THREADS * IDS_PER_THREAD) as i64;
    assert_eq!(seen.len() as i64, total);
    assert_eq!(
        store.sequence_value(fixture.config.history_sequence()),
        Some(total)
    );
}

#[test]
fn test_allocation_restores_caller_privilege() {
    let fixture = memory_fixture();
    let allocator = IdentityAllocator::new(fixture.config.extension_name());
    let mut session = fixture.store.begin().unwrap();

    allocator
        .next_id(session.as_mut(), fixture.config.job_id_sequence())
        .unwrap();
    assert_eq!(session.current_role().unwrap(), CALLER_ROLE);
    assert_eq!(session.privilege(), Privilege::Caller);

    // The caller itself cannot touch the sequence.
    assert!(matches!(
        session.next_value(fixture.config.job_id_sequence()),
        Err(StoreError::PermissionDenied { ref role, .. }) if role == CALLER_ROLE
    ));
}

#[test]
fn test_caller_cannot_borrow_an_arbitrary_role() {
    let fixture = memory_fixture();
    let mut session = fixture.store.begin().unwrap();

    assert!(session
        .set_privilege(Privilege::Owner("postgres".to_string()))
        .is_err());
    assert!(session
        .set_privilege(Privilege::Owner(OWNER_ROLE.to_string()))
        .is_ok());
    assert_eq!(session.current_role().unwrap(), CALLER_ROLE);
}

#[test]
fn test_allocation_failure_restores_caller_role() {
    let fixture = memory_fixture();
    let allocator = IdentityAllocator::new(fixture.config.extension_name());
    let mut session = fixture.store.begin().unwrap();

    let err = allocator
        .next_id(session.as_mut(), "cron.no_such_seq")
        .unwrap_err();
    assert!(matches!(err, AllocationError::SequenceNotFound(_)));
    assert_eq!(session.privilege(), Privilege::Caller);
}

#[test]
fn test_missing_extension_is_reported() {
    let store = MemoryStore::new(CALLER_ROLE);
    store.create_sequence("cron.histid_seq", OWNER_ROLE);
    let allocator = IdentityAllocator::new("pg_cron");
    let mut session = store.begin().unwrap();

    let err = allocator
        .next_id(session.as_mut(), "cron.histid_seq")
        .unwrap_err();
    assert!(matches!(err, AllocationError::ExtensionNotInstalled(ref name) if name == "pg_cron"));
    assert_eq!(store.sequence_value("cron.histid_seq"), Some(0));
}

#[test]
fn test_ids_are_not_reused_after_rollback() {
    let fixture = memory_fixture();
    let allocator = IdentityAllocator::new(fixture.config.extension_name());

    let mut first = fixture.store.begin().unwrap();
    let a = allocator
        .next_id(first.as_mut(), fixture.config.history_sequence())
        .unwrap();
    first.rollback().unwrap();

    let mut second = fixture.store.begin().unwrap();
    let b = allocator
        .next_id(second.as_mut(), fixture.config.history_sequence())
        .unwrap();
    assert!(b > a);
}
