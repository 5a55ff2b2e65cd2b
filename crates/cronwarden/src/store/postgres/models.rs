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

//! Row types for the Postgres backend and their conversions to domain types.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Bool, Text, Timestamptz};

use super::schema::{history, job, job_at};
use crate::models::{AtJob, CronJobRow, HistoryRecord, NewAtJob, NewCronJob};

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = job)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PgCronJob {
    pub jobid: i64,
    pub schedule: String,
    pub command: String,
    pub nodename: String,
    pub nodeport: i32,
    pub database: String,
    pub username: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = job)]
pub struct NewPgCronJob<'a> {
    pub jobid: i64,
    pub schedule: &'a str,
    pub command: &'a str,
    pub nodename: &'a str,
    pub nodeport: i32,
    pub database: &'a str,
    pub username: &'a str,
}

impl<'a> NewPgCronJob<'a> {
    pub fn new(id: i64, job: &'a NewCronJob) -> Self {
        Self {
            jobid: id,
            schedule: &job.schedule,
            command: &job.command,
            nodename: &job.node_name,
            nodeport: job.node_port,
            database: &job.database,
            username: &job.user_name,
        }
    }
}

impl From<PgCronJob> for CronJobRow {
    fn from(row: PgCronJob) -> Self {
        CronJobRow {
            id: row.jobid,
            schedule: row.schedule,
            command: row.command,
            node_name: row.nodename,
            node_port: row.nodeport,
            database: row.database,
            user_name: row.username,
        }
    }
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = job_at)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PgAtJob {
    pub jobid: i64,
    pub fire_at: DateTime<Utc>,
    pub command: String,
    pub nodename: String,
    pub nodeport: i32,
    pub database: String,
    pub username: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = job_at)]
pub struct NewPgAtJob<'a> {
    pub jobid: i64,
    pub fire_at: DateTime<Utc>,
    pub command: &'a str,
    pub nodename: &'a str,
    pub nodeport: i32,
    pub database: &'a str,
    pub username: &'a str,
}

impl<'a> NewPgAtJob<'a> {
    pub fn new(id: i64, job: &'a NewAtJob) -> Self {
        Self {
            jobid: id,
            fire_at: job.fire_at,
            command: &job.command,
            nodename: &job.node_name,
            nodeport: job.node_port,
            database: &job.database,
            username: &job.user_name,
        }
    }
}

impl From<PgAtJob> for AtJob {
    fn from(row: PgAtJob) -> Self {
        AtJob {
            id: row.jobid,
            fire_at: row.fire_at,
            command: row.command,
            node_name: row.nodename,
            node_port: row.nodeport,
            database: row.database,
            user_name: row.username,
        }
    }
}

#[derive(Debug, Queryable, QueryableByName, Selectable)]
#[diesel(table_name = history)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PgHistoryRecord {
    pub histid: i64,
    pub jobid: i64,
    pub message: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<PgHistoryRecord> for HistoryRecord {
    fn from(row: PgHistoryRecord) -> Self {
        HistoryRecord {
            history_id: row.histid,
            job_id: row.jobid,
            message: row.message,
            created_at: row.created_at,
        }
    }
}

/// Single text column result of a raw query.
#[derive(Debug, QueryableByName)]
pub struct RoleName {
    #[diesel(sql_type = Text)]
    pub role: String,
}

/// A sequence value and the time it was taken.
#[derive(Debug, QueryableByName)]
pub struct SequenceAllocation {
    #[diesel(sql_type = BigInt)]
    pub value: i64,
    #[diesel(sql_type = Timestamptz)]
    pub allocated_at: DateTime<Utc>,
}

/// Single boolean column result of a raw query.
#[derive(Debug, QueryableByName)]
pub struct Exists {
    #[diesel(sql_type = Bool)]
    pub present: bool,
}
