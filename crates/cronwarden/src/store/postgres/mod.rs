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

//! PostgreSQL store backend.
//!
//! Each [`PostgresSession`] checks a connection out of an r2d2 pool and opens
//! a transaction on it. Every value reaching the server is bound as a
//! parameter.
//!
//! # Owner privilege
//!
//! A login without membership in the installation owner's role cannot
//! `SET ROLE` to it. Sequence access under [`Privilege::Owner`] therefore
//! goes through [`ELEVATED_NEXTVAL_FUNCTION`], a `SECURITY DEFINER` function
//! owned by the installation owner that only advances sequences in the
//! `cron` schema. It takes the value and `clock_timestamp()` under a
//! per-sequence advisory lock, so value order and time order agree across
//! sessions. [`PostgresStore::install_elevated_nextval`] creates it.

use chrono::{DateTime, Utc};
use diesel::connection::{AnsiTransactionManager, SimpleConnection, TransactionManager};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::{BigInt, Jsonb, Text, Timestamptz};
use tracing::{debug, info, warn};

use super::{Allocation, CronStore, Privilege, StoreSession};
use crate::config::{CronwardenConfig, ENV_POOL_SIZE, MIN_POOL_SIZE};
use crate::error::{ConfigError, StoreError};
use crate::models::{AtJob, CronJobRow, HistoryRecord, NewAtJob, NewCronJob, NewHistoryRecord};

pub mod models;
pub mod schema;

use models::{
    Exists, NewPgAtJob, NewPgCronJob, PgAtJob, PgCronJob, PgHistoryRecord, RoleName,
    SequenceAllocation,
};
use schema::{history, job, job_at};

type PgPool = Pool<ConnectionManager<PgConnection>>;
type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

/// Function advancing a `cron` sequence with its owner's privileges.
pub const ELEVATED_NEXTVAL_FUNCTION: &str = "cron.elevated_nextval";

/// Creates [`ELEVATED_NEXTVAL_FUNCTION`], owned by the role running it.
pub const ELEVATED_NEXTVAL_DDL: &str = r#"
CREATE OR REPLACE FUNCTION cron.elevated_nextval(
    seq regclass,
    OUT value bigint,
    OUT allocated_at timestamptz
)
LANGUAGE plpgsql
SECURITY DEFINER
SET search_path = pg_catalog, pg_temp
AS $fn$
BEGIN
    IF NOT EXISTS (
        SELECT 1
        FROM pg_class c
        JOIN pg_namespace n ON n.oid = c.relnamespace
        WHERE c.oid = seq AND c.relkind = 'S' AND n.nspname = 'cron'
    ) THEN
        RAISE EXCEPTION 'permission denied for sequence %', seq
            USING ERRCODE = 'insufficient_privilege';
    END IF;

    PERFORM pg_advisory_lock(seq::oid::bigint);
    BEGIN
        value := nextval(seq);
        allocated_at := clock_timestamp();
    EXCEPTION WHEN OTHERS THEN
        PERFORM pg_advisory_unlock(seq::oid::bigint);
        RAISE;
    END;
    PERFORM pg_advisory_unlock(seq::oid::bigint);
END
$fn$;
"#;

/// Maps driver errors onto store errors, keeping constraint violations apart.
fn query_error(error: DieselError) -> StoreError {
    match error {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
            StoreError::Constraint(info.message().to_string())
        }
        other => StoreError::Query(other),
    }
}

/// Like [`query_error`], reporting "permission denied" as `PermissionDenied`.
fn access_error(error: DieselError, role: &str, object: &str) -> StoreError {
    match error {
        DieselError::DatabaseError(_, ref info) if info.message().contains("permission denied") => {
            StoreError::PermissionDenied {
                role: role.to_string(),
                object: object.to_string(),
            }
        }
        other => query_error(other),
    }
}

/// Store backed by a PostgreSQL database with the extension schema installed.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connects to `database_url` with a pool of at most `pool_size` connections.
    pub fn new(database_url: &str, pool_size: u32) -> Result<Self, StoreError> {
        if pool_size < MIN_POOL_SIZE {
            return Err(ConfigError::InvalidValue {
                key: ENV_POOL_SIZE,
                value: pool_size.to_string(),
            }
            .into());
        }

        let manager = ConnectionManager::<PgConnection>::new(database_url);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e| StoreError::Connection(format!("Failed to create connection pool: {}", e)))?;

        info!(pool_size, "PostgreSQL store connected");
        Ok(Self { pool })
    }

    /// Connects using the URL and pool size from `config`.
    pub fn from_config(config: &CronwardenConfig) -> Result<Self, StoreError> {
        Self::new(config.require_database_url()?, config.pool_size())
    }

    /// Creates or replaces [`ELEVATED_NEXTVAL_FUNCTION`].
    ///
    /// The function is owned by the login role of this store, which must be
    /// the installation owner for elevation to be accepted.
    pub fn install_elevated_nextval(&self) -> Result<(), StoreError> {
        let mut conn = self
            .pool
            .get()
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        conn.batch_execute(ELEVATED_NEXTVAL_DDL).map_err(query_error)?;
        info!(function = ELEVATED_NEXTVAL_FUNCTION, "Installed elevated sequence function");
        Ok(())
    }
}

impl std::fmt::Debug for PostgresStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.pool.state();
        f.debug_struct("PostgresStore")
            .field("connections", &state.connections)
            .field("idle_connections", &state.idle_connections)
            .finish()
    }
}

impl CronStore for PostgresStore {
    fn begin(&self) -> Result<Box<dyn StoreSession>, StoreError> {
        let mut conn = self
            .pool
            .get()
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        <AnsiTransactionManager as TransactionManager<PgConnection>>::begin_transaction(&mut *conn)
            .map_err(query_error)?;

        Ok(Box::new(PostgresSession {
            conn,
            finished: false,
            privilege: Privilege::Caller,
            verified_owner: None,
        }))
    }
}

/// One transaction on a pooled connection.
///
/// Dropping an unfinished session rolls its transaction back before the
/// connection returns to the pool.
pub struct PostgresSession {
    conn: PgPooledConnection,
    finished: bool,
    privilege: Privilege,
    verified_owner: Option<String>,
}

impl PostgresSession {
    fn conn(&mut self) -> &mut PgConnection {
        &mut self.conn
    }

    fn finish(&mut self, commit: bool) -> Result<(), StoreError> {
        self.finished = true;
        let conn: &mut PgConnection = &mut self.conn;
        let result = if commit {
            <AnsiTransactionManager as TransactionManager<PgConnection>>::commit_transaction(conn)
        } else {
            <AnsiTransactionManager as TransactionManager<PgConnection>>::rollback_transaction(conn)
        };
        result.map_err(query_error)
    }
}

impl StoreSession for PostgresSession {
    fn current_role(&mut self) -> Result<String, StoreError> {
        let row = diesel::sql_query("SELECT current_user::text AS role")
            .get_result::<RoleName>(self.conn())
            .map_err(query_error)?;
        Ok(row.role)
    }

    fn privilege(&self) -> Privilege {
        self.privilege.clone()
    }

    fn set_privilege(&mut self, privilege: Privilege) -> Result<(), StoreError> {
        if let Privilege::Owner(owner) = &privilege {
            if self.verified_owner.as_deref() != Some(owner.as_str()) {
                let owned = diesel::sql_query(
                    "SELECT EXISTS ( \
                         SELECT 1 \
                         FROM pg_catalog.pg_proc p \
                         JOIN pg_catalog.pg_namespace n ON n.oid = p.pronamespace \
                         JOIN pg_catalog.pg_roles r ON r.oid = p.proowner \
                         WHERE n.nspname = 'cron' \
                           AND p.proname = 'elevated_nextval' \
                           AND p.prosecdef \
                           AND r.rolname = $1 \
                     ) AS present",
                )
                .bind::<Text, _>(owner.as_str())
                .get_result::<Exists>(self.conn())
                .map_err(query_error)?;

                if !owned.present {
                    return Err(StoreError::PermissionDenied {
                        role: self.current_role()?,
                        object: format!("{} owned by {}", ELEVATED_NEXTVAL_FUNCTION, owner),
                    });
                }
                self.verified_owner = Some(owner.clone());
            }
        }
        self.privilege = privilege;
        Ok(())
    }

    fn extension_owner(&mut self, extension: &str) -> Result<Option<String>, StoreError> {
        let row = diesel::sql_query(
            "SELECT r.rolname::text AS role \
             FROM pg_catalog.pg_extension e \
             JOIN pg_catalog.pg_roles r ON r.oid = e.extowner \
             WHERE e.extname = $1",
        )
        .bind::<Text, _>(extension)
        .get_result::<RoleName>(self.conn())
        .optional()
        .map_err(query_error)?;
        Ok(row.map(|r| r.role))
    }

    fn next_value(&mut self, sequence: &str) -> Result<Allocation, StoreError> {
        let exists = diesel::sql_query("SELECT to_regclass($1) IS NOT NULL AS present")
            .bind::<Text, _>(sequence)
            .get_result::<Exists>(self.conn())
            .map_err(query_error)?;
        if !exists.present {
            return Err(StoreError::UndefinedObject(sequence.to_string()));
        }

        let (acting, query) = match self.privilege.clone() {
            Privilege::Caller => (
                self.current_role()?,
                "SELECT nextval($1::regclass) AS value, clock_timestamp() AS allocated_at",
            ),
            Privilege::Owner(owner) => (
                owner,
                "SELECT value, allocated_at FROM cron.elevated_nextval($1::regclass)",
            ),
        };

        let row = diesel::sql_query(query)
            .bind::<Text, _>(sequence)
            .get_result::<SequenceAllocation>(self.conn())
            .map_err(|e| access_error(e, &acting, sequence))?;
        Ok(Allocation {
            value: row.value,
            allocated_at: row.allocated_at,
        })
    }

    fn insert_history(&mut self, record: &NewHistoryRecord) -> Result<HistoryRecord, StoreError> {
        let row = diesel::sql_query(
            "INSERT INTO cron.history (histid, jobid, message, created_at) \
             VALUES ($1, $2, $3, $4) \
             RETURNING histid, jobid, message, created_at",
        )
        .bind::<BigInt, _>(record.history_id)
        .bind::<BigInt, _>(record.job_id)
        .bind::<Jsonb, _>(record.message.clone())
        .bind::<Timestamptz, _>(record.created_at)
        .get_result::<PgHistoryRecord>(self.conn())
        .map_err(query_error)?;

        debug!(history_id = row.histid, job_id = row.jobid, "Inserted history row");
        Ok(row.into())
    }

    fn history_for_job(&mut self, job_id: i64) -> Result<Vec<HistoryRecord>, StoreError> {
        let rows = history::table
            .filter(history::jobid.eq(job_id))
            .order(history::histid.asc())
            .select(PgHistoryRecord::as_select())
            .load(self.conn())
            .map_err(query_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    fn recent_history(&mut self, limit: i64) -> Result<Vec<HistoryRecord>, StoreError> {
        let rows = history::table
            .order(history::histid.desc())
            .limit(limit.max(0))
            .select(PgHistoryRecord::as_select())
            .load(self.conn())
            .map_err(query_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    fn count_history_before(&mut self, cutoff: DateTime<Utc>) -> Result<i64, StoreError> {
        history::table
            .filter(history::created_at.lt(cutoff))
            .count()
            .get_result(self.conn())
            .map_err(query_error)
    }

    fn cron_jobs(&mut self) -> Result<Vec<CronJobRow>, StoreError> {
        let rows = job::table
            .order(job::jobid.asc())
            .select(PgCronJob::as_select())
            .load(self.conn())
            .map_err(query_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    fn at_jobs(&mut self) -> Result<Vec<AtJob>, StoreError> {
        let rows = job_at::table
            .order(job_at::jobid.asc())
            .select(PgAtJob::as_select())
            .load(self.conn())
            .map_err(query_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    fn insert_cron_job(&mut self, id: i64, new_job: &NewCronJob) -> Result<CronJobRow, StoreError> {
        let row = diesel::insert_into(job::table)
            .values(&NewPgCronJob::new(id, new_job))
            .returning(PgCronJob::as_returning())
            .get_result(self.conn())
            .map_err(query_error)?;
        Ok(row.into())
    }

    fn insert_at_job(&mut self, id: i64, new_job: &NewAtJob) -> Result<AtJob, StoreError> {
        let row = diesel::insert_into(job_at::table)
            .values(&NewPgAtJob::new(id, new_job))
            .returning(PgAtJob::as_returning())
            .get_result(self.conn())
            .map_err(query_error)?;
        Ok(row.into())
    }

    fn delete_cron_job(&mut self, id: i64) -> Result<Option<CronJobRow>, StoreError> {
        let row = diesel::delete(job::table.find(id))
            .returning(PgCronJob::as_returning())
            .get_result(self.conn())
            .optional()
            .map_err(query_error)?;
        Ok(row.map(Into::into))
    }

    fn delete_at_job(&mut self, id: i64) -> Result<Option<AtJob>, StoreError> {
        let row = diesel::delete(job_at::table.find(id))
            .returning(PgAtJob::as_returning())
            .get_result(self.conn())
            .optional()
            .map_err(query_error)?;
        Ok(row.map(Into::into))
    }

    fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.finish(true)
    }

    fn rollback(mut self: Box<Self>) -> Result<(), StoreError> {
        self.finish(false)
    }
}

impl Drop for PostgresSession {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.finish(false) {
            warn!(error = %e, "Failed to roll back abandoned store session");
        }
    }
}
