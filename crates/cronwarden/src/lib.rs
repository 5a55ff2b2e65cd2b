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

//! # cronwarden
//!
//! Job metadata caching and execution history for a database-integrated cron
//! scheduler.
//!
//! The crate provides the pieces a scheduler needs besides deciding when a
//! job is due:
//!
//! - **Job metadata cache** ([`cache`]): validity-flagged in-memory copies of
//!   the recurring and one-shot job catalogs, reloaded lazily after a change
//! - **History recorder** ([`history`]): an append-only audit trail of job
//!   lifecycle events, written either inside the caller's transaction or in a
//!   transaction of its own
//! - **Identity allocation** ([`history::identity`]): ids drawn from
//!   sequences as the installation owner, for callers without sequence grants
//! - **Event formatting** ([`history::event`]): the JSON payload of each event
//!
//! Storage goes through the [`store::CronStore`] trait, with a PostgreSQL
//! backend (feature `postgres`) and an in-memory backend.
//!
//! ## Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use cronwarden::{CronwardenConfig, JobMetadata, MemoryStore, NewCronJob};
//!
//! let config = CronwardenConfig::default();
//! let store = MemoryStore::installed(&config, "postgres", "alice");
//! let metadata = JobMetadata::new(Arc::new(store), config);
//!
//! let job = metadata
//!     .schedule_cron_job(&NewCronJob::local("*/5 * * * *", "VACUUM", "postgres", "alice"))
//!     .unwrap();
//! metadata.recorder().record_started(job.id, &job.command).unwrap();
//! metadata.recorder().record_completed(job.id, &job.command, 0).unwrap();
//!
//! assert_eq!(metadata.get_cron_job(job.id).unwrap().command, "VACUUM");
//! assert_eq!(metadata.recorder().history_for_job(job.id).unwrap().len(), 3);
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod history;
pub mod logging;
pub mod metadata;
pub mod models;
pub mod store;

pub use cache::{CachedJob, JobCache};
pub use config::{CronwardenConfig, CronwardenConfigBuilder};
pub use error::{
    AllocationError, CacheError, CatalogError, ConfigError, InvalidEventError, LoadError,
    PersistError, StoreError,
};
pub use history::{
    Durability, ElevatedPrivilege, EventKind, EventPayload, HistoryRecorder, HistoryWriter,
    IdentityAllocator, JobEvent,
};
pub use logging::{init_logging, init_test_logging};
pub use metadata::JobMetadata;
pub use models::{
    AtJob, CronJob, CronJobRow, HistoryRecord, JobKind, NewAtJob, NewCronJob, NewHistoryRecord,
    Schedule,
};
pub use store::{Allocation, CronStore, MemoryStore, Privilege, StoreSession};

#[cfg(feature = "postgres")]
pub use store::PostgresStore;
