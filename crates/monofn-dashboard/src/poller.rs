//! Store poller.
//!
//! One poller runs per dashboard. Every tick reads the configured key, merges any
//! results it has not seen before and publishes a fresh [`DashboardSnapshot`].
//! A failed tick leaves the aggregates untouched and only updates the poll status,
//! so viewers keep seeing the last good data.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use monofn_common::store::{ResultStore, StoreValue};
use monofn_common::InvocationResult;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::aggregator::Aggregator;
use crate::config::DashboardConfig;
use crate::snapshot::{DashboardSnapshot, PollStatus, RawRead, SharedSnapshot};

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The read succeeded; `merged` results were new and `skipped` were unparsable.
    Merged { merged: usize, skipped: usize },
    /// The key does not exist yet.
    Absent,
    /// The read failed.
    Failed(String),
}

pub struct Poller {
    store: Arc<dyn ResultStore>,
    key: String,
    interval: Duration,
    aggregator: Aggregator,
    poll: PollStatus,
    raw: Option<RawRead>,
    shared: SharedSnapshot,
}

impl Poller {
    pub fn new(store: Arc<dyn ResultStore>, config: &DashboardConfig, shared: SharedSnapshot) -> Self {
        Self {
            store,
            key: config.key.clone(),
            interval: config.refresh,
            aggregator: Aggregator::new(config.history_limit, config.seen_capacity),
            poll: PollStatus::default(),
            raw: None,
            shared,
        }
    }

    pub fn shared(&self) -> SharedSnapshot {
        self.shared.clone()
    }

    /// Polls until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            key = %self.key,
            interval_ms = self.interval.as_millis() as u64,
            "Dashboard poller started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let started = Instant::now();
                    self.tick().await;
                    let elapsed = started.elapsed();
                    if elapsed > self.interval {
                        warn!(
                            key = %self.key,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "Poll took longer than the refresh interval"
                        );
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(key = %self.key, "Dashboard poller stopped");
    }

    /// One poll cycle. Publishes the resulting snapshot before returning.
    pub async fn tick(&mut self) -> TickOutcome {
        let now = Utc::now();
        self.poll.polls += 1;
        self.poll.last_poll_at = Some(now);

        let outcome = match self.store.read(&self.key).await {
            Ok(Some(value)) => {
                let (merged, skipped) = self.merge_value(value);
                self.poll.last_success_at = Some(now);
                self.poll.last_error = None;
                self.poll.consecutive_failures = 0;
                self.poll.store_reachable = true;
                if merged > 0 {
                    debug!(key = %self.key, merged, "Merged new results");
                }
                TickOutcome::Merged { merged, skipped }
            }
            Ok(None) => {
                debug!(key = %self.key, "Result key not set yet");
                self.record_failure(format!("key '{}' does not exist", self.key), true);
                TickOutcome::Absent
            }
            Err(e) => {
                warn!(key = %self.key, "Failed to read results: {}", e);
                let message = e.to_string();
                self.record_failure(message.clone(), false);
                TickOutcome::Failed(message)
            }
        };

        self.publish();
        outcome
    }

    fn record_failure(&mut self, message: String, reachable: bool) {
        self.poll.last_error = Some(message);
        self.poll.consecutive_failures += 1;
        self.poll.store_reachable = reachable;
    }

    fn merge_value(&mut self, value: StoreValue) -> (usize, usize) {
        let mut merged = 0;
        let mut skipped = 0;

        let entries = match &value {
            StoreValue::Single(raw) => vec![raw.as_str()],
            StoreValue::List(items) => items.iter().map(String::as_str).collect(),
        };

        for raw in entries {
            for parsed in parse_results(raw) {
                match parsed {
                    Ok(result) => {
                        if self.aggregator.merge(result) {
                            merged += 1;
                        }
                    }
                    Err(e) => {
                        warn!(key = %self.key, "Skipping unparsable result: {}", e);
                        skipped += 1;
                    }
                }
            }
        }

        self.raw = Some(match value {
            StoreValue::Single(value) => RawRead::String { value },
            StoreValue::List(values) => RawRead::List { values },
        });
        (merged, skipped)
    }

    fn publish(&self) {
        let snapshot = DashboardSnapshot {
            key: self.key.clone(),
            summary: self.aggregator.summary().clone(),
            recent: self.aggregator.recent().cloned().collect(),
            latest: self.aggregator.latest().cloned(),
            poll: self.poll.clone(),
            raw: self.raw.clone(),
        };
        self.shared.publish(snapshot);
    }
}

/// Parses one stored value: a single result record or a JSON array of them.
fn parse_results(raw: &str) -> Vec<Result<InvocationResult, serde_json::Error>> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => items.into_iter().map(serde_json::from_value).collect(),
        Ok(value) => vec![serde_json::from_value(value)],
        Err(e) => vec![Err(e)],
    }
}
