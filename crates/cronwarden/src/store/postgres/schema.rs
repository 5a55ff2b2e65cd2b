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

//! Catalog tables in the `cron` schema.

diesel::table! {
    cron.job (jobid) {
        jobid -> BigInt,
        schedule -> Text,
        command -> Text,
        nodename -> Text,
        nodeport -> Integer,
        database -> Text,
        username -> Text,
    }
}

diesel::table! {
    cron.job_at (jobid) {
        jobid -> BigInt,
        fire_at -> Timestamptz,
        command -> Text,
        nodename -> Text,
        nodeport -> Integer,
        database -> Text,
        username -> Text,
    }
}

diesel::table! {
    cron.history (histid) {
        histid -> BigInt,
        jobid -> BigInt,
        message -> Jsonb,
        created_at -> Timestamptz,
    }
}
