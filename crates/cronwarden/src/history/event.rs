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

//! Event payload formatting.
//!
//! Every lifecycle transition maps to a JSON object with an `event` key and a
//! fixed set of string fields per kind:
//!
//! | kind                    | fields                                   |
//! |-------------------------|------------------------------------------|
//! | `scheduled`             | `command`, `schedule`                    |
//! | `scheduled` (at)        | `command`, `at`                          |
//! | `unscheduled`           | `command`                                |
//! | `started`               | `command`                                |
//! | `completed`             | `command`, `tuple_count`                 |
//! | `completed` (status)    | `command`, `command_status`, `tuple_count` |
//! | `failed`                | `command`                                |
//! | `failed` (message)      | `command`, `message`                     |
//!
//! Counts are embedded as decimal strings so every field is a string.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::InvalidEventError;

/// Key holding the event name in every payload.
pub const EVENT_KEY: &str = "event";

/// Enumeration of history event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Scheduled,
    ScheduledAt,
    Unscheduled,
    Started,
    Completed,
    CompletedWithStatus,
    Failed,
    FailedWithMessage,
}

impl EventKind {
    /// Returns the identifier of the kind, used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Scheduled => "scheduled",
            EventKind::ScheduledAt => "scheduled_at",
            EventKind::Unscheduled => "unscheduled",
            EventKind::Started => "started",
            EventKind::Completed => "completed",
            EventKind::CompletedWithStatus => "completed_with_status",
            EventKind::Failed => "failed",
            EventKind::FailedWithMessage => "failed_with_message",
        }
    }

    /// Returns the value stored under the `event` key.
    pub fn event_name(&self) -> &'static str {
        match self {
            EventKind::Scheduled | EventKind::ScheduledAt => "scheduled",
            EventKind::Unscheduled => "unscheduled",
            EventKind::Started => "started",
            EventKind::Completed | EventKind::CompletedWithStatus => "completed",
            EventKind::Failed | EventKind::FailedWithMessage => "failed",
        }
    }

    /// Returns the fields a payload of this kind carries, in schema order.
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            EventKind::Scheduled => &["command", "schedule"],
            EventKind::ScheduledAt => &["command", "at"],
            EventKind::Unscheduled => &["command"],
            EventKind::Started => &["command"],
            EventKind::Completed => &["command", "tuple_count"],
            EventKind::CompletedWithStatus => &["command", "command_status", "tuple_count"],
            EventKind::Failed => &["command"],
            EventKind::FailedWithMessage => &["command", "message"],
        }
    }

    /// Resolves the kind from an event name and the fields present.
    ///
    /// Kinds sharing an event name are told apart by their distinguishing field.
    fn resolve(event: &str, body: &Map<String, Value>) -> Result<Self, InvalidEventError> {
        let kind = match event {
            "scheduled" if body.contains_key("at") => EventKind::ScheduledAt,
            "scheduled" => EventKind::Scheduled,
            "unscheduled" => EventKind::Unscheduled,
            "started" => EventKind::Started,
            "completed" if body.contains_key("command_status") => EventKind::CompletedWithStatus,
            "completed" => EventKind::Completed,
            "failed" if body.contains_key("message") => EventKind::FailedWithMessage,
            "failed" => EventKind::Failed,
            other => return Err(InvalidEventError::UnknownEvent(other.to_string())),
        };
        Ok(kind)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A formatted event payload.
#[derive(Debug, Clone, PartialEq)]
pub struct EventPayload {
    kind: EventKind,
    body: Map<String, Value>,
}

impl EventPayload {
    /// Formats a payload of `kind` from loosely supplied fields.
    ///
    /// Only the fields in the kind's schema are kept. Fails if any of them is
    /// missing.
    pub fn format(
        kind: EventKind,
        fields: &BTreeMap<&str, String>,
    ) -> Result<Self, InvalidEventError> {
        let mut values = Vec::with_capacity(kind.fields().len());
        for &field in kind.fields() {
            let value = fields
                .get(field)
                .ok_or(InvalidEventError::MissingField { kind, field })?;
            values.push((field, value.clone()));
        }
        Ok(Self::from_parts(kind, values))
    }

    fn from_parts(kind: EventKind, fields: Vec<(&'static str, String)>) -> Self {
        let mut body = Map::new();
        body.insert(EVENT_KEY.to_string(), Value::String(kind.event_name().to_string()));
        for (field, value) in fields {
            body.insert(field.to_string(), Value::String(value));
        }
        Self { kind, body }
    }

    /// Reads a payload back from its stored JSON form.
    pub fn from_json(value: &Value) -> Result<Self, InvalidEventError> {
        let body = value.as_object().ok_or(InvalidEventError::NotAnObject)?;
        let event = body
            .get(EVENT_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| InvalidEventError::UnknownEvent(String::new()))?;
        let kind = EventKind::resolve(event, body)?;

        let mut fields = BTreeMap::new();
        for (key, value) in body {
            if let Some(text) = value.as_str() {
                fields.insert(key.as_str(), text.to_string());
            }
        }
        Self::format(kind, &fields)
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Returns the string value of `field`, if present.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.body.get(field).and_then(Value::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.body
    }

    /// Returns the payload as a JSON value for storage.
    pub fn to_value(&self) -> Value {
        Value::Object(self.body.clone())
    }
}

impl std::fmt::Display for EventPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", Value::Object(self.body.clone()))
    }
}

/// A lifecycle transition of one job, with the data its payload needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    Scheduled { command: String, schedule: String },
    ScheduledAt { command: String, at: DateTime<Utc> },
    Unscheduled { command: String },
    Started { command: String },
    Completed { command: String, tuple_count: u64 },
    CompletedWithStatus {
        command: String,
        command_status: String,
        tuple_count: u64,
    },
    Failed { command: String },
    FailedWithMessage { command: String, message: String },
}

impl JobEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            JobEvent::Scheduled { .. } => EventKind::Scheduled,
            JobEvent::ScheduledAt { .. } => EventKind::ScheduledAt,
            JobEvent::Unscheduled { .. } => EventKind::Unscheduled,
            JobEvent::Started { .. } => EventKind::Started,
            JobEvent::Completed { .. } => EventKind::Completed,
            JobEvent::CompletedWithStatus { .. } => EventKind::CompletedWithStatus,
            JobEvent::Failed { .. } => EventKind::Failed,
            JobEvent::FailedWithMessage { .. } => EventKind::FailedWithMessage,
        }
    }

    /// Builds the payload for this event. Typed events always carry every field.
    pub fn to_payload(&self) -> EventPayload {
        let fields = match self {
            JobEvent::Scheduled { command, schedule } => {
                vec![("command", command.clone()), ("schedule", schedule.clone())]
            }
            JobEvent::ScheduledAt { command, at } => vec![
                ("command", command.clone()),
                ("at", at.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            ],
            JobEvent::Unscheduled { command }
            | JobEvent::Started { command }
            | JobEvent::Failed { command } => vec![("command", command.clone())],
            JobEvent::Completed {
                command,
                tuple_count,
            } => vec![
                ("command", command.clone()),
                ("tuple_count", tuple_count.to_string()),
            ],
            JobEvent::CompletedWithStatus {
                command,
                command_status,
                tuple_count,
            } => vec![
                ("command", command.clone()),
                ("command_status", command_status.clone()),
                ("tuple_count", tuple_count.to_string()),
            ],
            JobEvent::FailedWithMessage { command, message } => {
                vec![("command", command.clone()), ("message", message.clone())]
            }
        };
        EventPayload::from_parts(self.kind(), fields)
    }
}
