// Copyright 2025 monofn Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Dashboard snapshot types.
//!
//! A [`DashboardSnapshot`] is what viewers see: derived totals, the most recent
//! results and the status of the last poll. The poller builds a complete new
//! snapshot after every tick and swaps it into the [`SharedSnapshot`]; readers
//! clone it under a short read lock.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use monofn_common::InvocationResult;
use serde::{Deserialize, Serialize};

/// Aggregates over every result merged so far.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total: u64,
    pub ok: u64,
    pub error: u64,
    pub timeout: u64,
    pub total_duration_ms: u64,
    pub mean_duration_ms: f64,
    /// Fraction of results that were `error` or `timeout`, 0.0 when empty
    pub error_rate: f64,
}

/// Outcome of the most recent poll ticks.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PollStatus {
    pub polls: u64,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u64,
    pub store_reachable: bool,
}

impl PollStatus {
    /// True when the last poll did not produce fresh data.
    pub fn is_degraded(&self) -> bool {
        self.consecutive_failures > 0
    }
}

/// The value most recently read from the store, as read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RawRead {
    String { value: String },
    List { values: Vec<String> },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub key: String,
    pub summary: Summary,
    /// Most recent results, oldest first
    pub recent: Vec<InvocationResult>,
    pub latest: Option<InvocationResult>,
    pub poll: PollStatus,
    pub raw: Option<RawRead>,
}

impl DashboardSnapshot {
    pub fn empty(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }
}

/// Snapshot shared between the poller (single writer) and the renderer.
#[derive(Debug, Clone)]
pub struct SharedSnapshot {
    inner: Arc<RwLock<DashboardSnapshot>>,
}

impl SharedSnapshot {
    pub fn new(initial: DashboardSnapshot) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    /// Clones the last published snapshot.
    pub fn load(&self) -> DashboardSnapshot {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the published snapshot.
    pub fn publish(&self, snapshot: DashboardSnapshot) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }
}
