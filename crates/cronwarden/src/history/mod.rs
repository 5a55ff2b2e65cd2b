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

//! Job execution history.
//!
//! - [`event`]: payload formatting for each lifecycle event
//! - [`identity`]: history and job id allocation as the installation owner
//! - [`writer`]: single-record appends with inherited or independent durability
//! - [`recorder`]: the lifecycle entry points, queries and retention
//! - [`audit`]: structured log events mirroring each write

pub mod audit;
pub mod event;
pub mod identity;
pub mod recorder;
pub mod writer;

pub use event::{EventKind, EventPayload, JobEvent};
pub use identity::{ElevatedPrivilege, IdentityAllocator};
pub use recorder::HistoryRecorder;
pub use writer::{Durability, HistoryWriter};
