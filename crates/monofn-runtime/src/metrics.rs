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

//! Runtime metrics.
//!
//! Lock-free counters updated on every invocation and exposed through the
//! `_metrics` JSON-RPC method. All operations use `Ordering::Relaxed`: counters
//! are independent and snapshots are eventually consistent.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use monofn_common::InvocationStatus;
use serde::{Deserialize, Serialize};

/// Type of monofn server
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServerType {
    Runtime,
    Dashboard,
}

/// Server information returned by `_info`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub server_type: ServerType,
    pub version: String,
    pub uptime_ms: u64,
}

impl ServerInfo {
    pub fn new(server_type: ServerType, uptime_ms: u64) -> Self {
        Self {
            server_type,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_ms,
        }
    }
}

/// Runtime-specific details appended to [`ServerInfo`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeInfo {
    #[serde(flatten)]
    pub server: ServerInfo,
    pub function_path: String,
    pub arity: usize,
    pub output_key: String,
    pub output_mode: String,
}

/// Point-in-time copy of [`RuntimeMetrics`]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub ok_count: u64,
    pub error_count: u64,
    pub timeout_count: u64,
    pub store_failures: u64,
    pub in_flight: u64,
    pub total_latency_ms: u64,
    pub avg_latency_ms: u64,
    pub uptime_ms: u64,
}

#[derive(Debug)]
pub struct RuntimeMetrics {
    total_requests: AtomicU64,
    ok_count: AtomicU64,
    error_count: AtomicU64,
    timeout_count: AtomicU64,
    store_failures: AtomicU64,
    in_flight: AtomicU64,
    total_latency_ms: AtomicU64,
    start_time: Instant,
}

impl Default for RuntimeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeMetrics {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            ok_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            timeout_count: AtomicU64::new(0),
            store_failures: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
            total_latency_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Marks an invocation as started.
    pub fn begin(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    /// Marks an invocation as finished with `status` after `duration_ms`.
    pub fn finish(&self, status: InvocationStatus, duration_ms: u64, stored: bool) {
        let counter = match status {
            InvocationStatus::Ok => &self.ok_count,
            InvocationStatus::Error => &self.error_count,
            InvocationStatus::Timeout => &self.timeout_count,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        if !stored {
            self.store_failures.fetch_add(1, Ordering::Relaxed);
        }
        self.total_latency_ms.fetch_add(duration_ms, Ordering::Relaxed);
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn uptime_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let ok_count = self.ok_count.load(Ordering::Relaxed);
        let error_count = self.error_count.load(Ordering::Relaxed);
        let timeout_count = self.timeout_count.load(Ordering::Relaxed);
        let total_latency_ms = self.total_latency_ms.load(Ordering::Relaxed);
        let completed = ok_count + error_count + timeout_count;

        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            ok_count,
            error_count,
            timeout_count,
            store_failures: self.store_failures.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            total_latency_ms,
            avg_latency_ms: if completed == 0 { 0 } else { total_latency_ms / completed },
            uptime_ms: self.uptime_ms(),
        }
    }
}
