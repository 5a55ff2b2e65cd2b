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

//! Job Model
//!
//! Domain structures for the two job collections held in the catalog:
//! recurring (cron-style) jobs and one-shot (at-style) jobs.
//!
//! These are API-level types; the store backends map their rows onto them.

use chrono::{DateTime, Utc};
use croner::Cron;
use serde::{Deserialize, Serialize};

/// The two job collections tracked by the metadata cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobKind {
    /// Recurring jobs driven by a cron expression
    Cron,
    /// One-shot jobs fired at a single timestamp
    At,
}

impl JobKind {
    /// Returns the string representation of the job kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Cron => "cron",
            JobKind::At => "at",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An opaque parsed schedule expression.
///
/// Next-run computation belongs to the scheduler; this type only carries the
/// parsed form alongside the text it was parsed from.
#[derive(Debug, Clone)]
pub struct Schedule {
    text: String,
    cron: Cron,
}

impl Schedule {
    /// Parses a cron expression, accepting an optional seconds field.
    ///
    /// Returns `None` if the expression is not understood.
    pub fn parse(text: &str) -> Option<Self> {
        let cron = Cron::new(text).with_seconds_optional().parse().ok()?;
        Some(Self {
            text: text.to_string(),
            cron,
        })
    }

    /// The schedule text this expression was parsed from.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The parsed cron expression.
    pub fn cron(&self) -> &Cron {
        &self.cron
    }
}

impl PartialEq for Schedule {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

/// Catalog row for a recurring job, before its schedule is parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronJobRow {
    pub id: i64,
    pub schedule: String,
    pub command: String,
    pub node_name: String,
    pub node_port: i32,
    pub database: String,
    pub user_name: String,
}

/// A recurring job as held by the metadata cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CronJob {
    /// Unique, stable job identifier
    pub id: i64,
    /// The schedule exactly as stored in the catalog
    pub schedule_text: String,
    /// Parsed schedule, `None` when the text could not be parsed
    pub schedule: Option<Schedule>,
    /// Command executed when the job fires
    pub command: String,
    /// Host the command runs against
    pub node_name: String,
    /// Port the command runs against
    pub node_port: i32,
    /// Database the command runs in
    pub database: String,
    /// Role the command runs as
    pub user_name: String,
}

impl From<CronJobRow> for CronJob {
    fn from(row: CronJobRow) -> Self {
        let schedule = Schedule::parse(&row.schedule);
        if schedule.is_none() {
            tracing::warn!(
                job_id = row.id,
                schedule = %row.schedule,
                "Cron job has an unparseable schedule"
            );
        }

        Self {
            id: row.id,
            schedule_text: row.schedule,
            schedule,
            command: row.command,
            node_name: row.node_name,
            node_port: row.node_port,
            database: row.database,
            user_name: row.user_name,
        }
    }
}

/// A one-shot job. It exists until it fires or is cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtJob {
    pub id: i64,
    pub fire_at: DateTime<Utc>,
    pub command: String,
    pub node_name: String,
    pub node_port: i32,
    pub database: String,
    pub user_name: String,
}

/// Structure for creating a new recurring job row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCronJob {
    pub schedule: String,
    pub command: String,
    pub node_name: String,
    pub node_port: i32,
    pub database: String,
    pub user_name: String,
}

impl NewCronJob {
    /// Creates a job that runs `command` locally as `user_name`.
    pub fn local(schedule: &str, command: &str, database: &str, user_name: &str) -> Self {
        Self {
            schedule: schedule.to_string(),
            command: command.to_string(),
            node_name: "localhost".to_string(),
            node_port: 5432,
            database: database.to_string(),
            user_name: user_name.to_string(),
        }
    }

    pub(crate) fn into_row(self, id: i64) -> CronJobRow {
        CronJobRow {
            id,
            schedule: self.schedule,
            command: self.command,
            node_name: self.node_name,
            node_port: self.node_port,
            database: self.database,
            user_name: self.user_name,
        }
    }
}

/// Structure for creating a new one-shot job row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAtJob {
    pub fire_at: DateTime<Utc>,
    pub command: String,
    pub node_name: String,
    pub node_port: i32,
    pub database: String,
    pub user_name: String,
}

impl NewAtJob {
    /// Creates a job that runs `command` locally as `user_name` at `fire_at`.
    pub fn local(fire_at: DateTime<Utc>, command: &str, database: &str, user_name: &str) -> Self {
        Self {
            fire_at,
            command: command.to_string(),
            node_name: "localhost".to_string(),
            node_port: 5432,
            database: database.to_string(),
            user_name: user_name.to_string(),
        }
    }

    pub(crate) fn into_job(self, id: i64) -> AtJob {
        AtJob {
            id,
            fire_at: self.fire_at,
            command: self.command,
            node_name: self.node_name,
            node_port: self.node_port,
            database: self.database,
            user_name: self.user_name,
        }
    }
}
