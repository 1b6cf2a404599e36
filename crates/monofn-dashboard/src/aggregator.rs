//! Merging results into dashboard aggregates.

use std::collections::{HashSet, VecDeque};

use monofn_common::{InvocationResult, InvocationStatus};

use crate::snapshot::Summary;

pub const DEFAULT_HISTORY_LIMIT: usize = 500;
pub const DEFAULT_SEEN_CAPACITY: usize = 10_000;

/// Accumulates results across poll ticks.
///
/// Merging is idempotent with respect to `requestId`, which matters because the
/// same record is read on every tick until the runtime overwrites it. Seen ids
/// are remembered in a bounded FIFO set; an id evicted from it would be counted
/// again if it reappeared, so `seen_capacity` should exceed the number of
/// records one read can return.
#[derive(Debug)]
pub struct Aggregator {
    seen: HashSet<String>,
    seen_order: VecDeque<String>,
    seen_capacity: usize,
    recent: VecDeque<InvocationResult>,
    history_limit: usize,
    summary: Summary,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT, DEFAULT_SEEN_CAPACITY)
    }
}

impl Aggregator {
    pub fn new(history_limit: usize, seen_capacity: usize) -> Self {
        let history_limit = history_limit.max(1);
        Self {
            seen: HashSet::new(),
            seen_order: VecDeque::new(),
            seen_capacity: seen_capacity.max(history_limit),
            recent: VecDeque::with_capacity(history_limit),
            history_limit,
            summary: Summary::default(),
        }
    }

    /// Adds `result` unless its `requestId` was already merged. Returns whether it
    /// was new.
    pub fn merge(&mut self, result: InvocationResult) -> bool {
        if self.seen.contains(&result.request_id) {
            return false;
        }

        self.remember(result.request_id.clone());

        let summary = &mut self.summary;
        summary.total += 1;
        match result.status() {
            InvocationStatus::Ok => summary.ok += 1,
            InvocationStatus::Error => summary.error += 1,
            InvocationStatus::Timeout => summary.timeout += 1,
        }
        summary.total_duration_ms += result.duration_ms;
        summary.mean_duration_ms = summary.total_duration_ms as f64 / summary.total as f64;
        summary.error_rate = (summary.error + summary.timeout) as f64 / summary.total as f64;

        if self.recent.len() == self.history_limit {
            self.recent.pop_front();
        }
        self.recent.push_back(result);
        true
    }

    fn remember(&mut self, id: String) {
        if self.seen_order.len() == self.seen_capacity {
            if let Some(evicted) = self.seen_order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        self.seen.insert(id.clone());
        self.seen_order.push_back(id);
    }

    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    /// Most recent results, oldest first.
    pub fn recent(&self) -> impl Iterator<Item = &InvocationResult> {
        self.recent.iter()
    }

    pub fn latest(&self) -> Option<&InvocationResult> {
        self.recent.back()
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }
}
