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

//! Error types for the job metadata cache and the history recorder.
//!
//! Each layer has its own error enum so callers can tell an audit-write
//! failure ([`PersistError`]) apart from a catalog read failure
//! ([`LoadError`]) or a malformed event request ([`InvalidEventError`]).
//! None of these errors are retried internally.

use thiserror::Error;

use crate::history::event::EventKind;
use crate::models::job::JobKind;

/// Errors raised by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or a connection could not be checked out.
    #[error("Store connection error: {0}")]
    Connection(String),

    /// A query failed inside the database driver.
    #[error("Store query error: {0}")]
    Query(#[from] diesel::result::Error),

    /// The active role lacks a privilege on the named object.
    #[error("Permission denied for role '{role}' on '{object}'")]
    PermissionDenied { role: String, object: String },

    /// A named relation, sequence or role does not exist.
    #[error("Undefined object: {0}")]
    UndefinedObject(String),

    /// A uniqueness or integrity constraint rejected a write.
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// The store was configured with unusable settings.
    #[error("Store configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised while allocating an identifier from a sequence.
#[derive(Debug, Error)]
pub enum AllocationError {
    /// The installation's extension is not registered, so no owner can be resolved.
    #[error("Extension '{0}' is not installed")]
    ExtensionNotInstalled(String),

    /// The requested sequence does not exist.
    #[error("Sequence '{0}' does not exist")]
    SequenceNotFound(String),

    /// Assuming or releasing the installation owner's privilege failed.
    #[error("Failed to assume installation owner privilege: {0}")]
    Elevation(#[source] StoreError),

    /// The store rejected the increment.
    #[error("Sequence allocation failed: {0}")]
    Store(#[source] StoreError),
}

/// Errors raised while persisting a history record.
///
/// In independent mode only the writer's own transaction is affected; the
/// caller's transaction is left as it was.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Audit history id allocation failed: {0}")]
    Allocation(#[from] AllocationError),

    #[error("Audit history insert failed: {0}")]
    Insert(#[source] StoreError),

    #[error("Failed to open audit history transaction: {0}")]
    Begin(#[source] StoreError),

    #[error("Failed to commit audit history transaction: {0}")]
    Commit(#[source] StoreError),
}

/// Errors raised while reading a job collection from the catalog.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to load {kind} jobs from the catalog: {source}")]
    Store {
        kind: JobKind,
        #[source]
        source: StoreError,
    },
}

/// Errors raised when an event payload is requested with missing or unknown fields.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidEventError {
    #[error("Event '{kind}' requires field '{field}'")]
    MissingField { kind: EventKind, field: &'static str },

    #[error("Unknown event '{0}'")]
    UnknownEvent(String),

    #[error("Event payload must be a JSON object")]
    NotAnObject,
}

/// Errors raised by job metadata cache lookups.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("{kind} job {id} not found")]
    NotFound { kind: JobKind, id: i64 },

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("Failed to remove {kind} job {id}: {source}")]
    Remove {
        kind: JobKind,
        id: i64,
        #[source]
        source: StoreError,
    },
}

/// Errors raised by catalog-mutating operations that also write history.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("{kind} job {id} not found")]
    NotFound { kind: JobKind, id: i64 },
}

/// Errors raised while building configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Missing required setting {0}")]
    Missing(&'static str),
}
