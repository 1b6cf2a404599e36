//! Input watcher.
//!
//! Polls an input key in the store and invokes the handler whenever the raw value
//! changes. This lets an upstream producer drive the function by writing to the
//! store instead of calling the HTTP endpoint.

use std::sync::Arc;
use std::time::Duration;

use monofn_common::store::{ResultStore, StoreValue};
use monofn_common::{InvocationAck, InvocationRequest};
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::InputWatchConfig;
use crate::worker::Worker;

pub struct InputWatcher {
    worker: Arc<Worker>,
    store: Arc<dyn ResultStore>,
    key: String,
    interval: Duration,
    last_raw: Option<String>,
}

impl InputWatcher {
    pub fn new(worker: Arc<Worker>, config: InputWatchConfig) -> Self {
        Self {
            store: worker.store(),
            worker,
            key: config.key,
            interval: config.interval,
            last_raw: None,
        }
    }

    /// Polls until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(key = %self.key, interval_ms = self.interval.as_millis() as u64, "Input watcher started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(key = %self.key, "Input watcher stopped");
    }

    /// One poll cycle. Returns the acknowledgment if the handler was invoked.
    pub async fn tick(&mut self) -> Option<InvocationAck> {
        let raw = match self.store.read(&self.key).await {
            Ok(Some(StoreValue::Single(raw))) => raw,
            Ok(Some(StoreValue::List(items))) => items.into_iter().last()?,
            Ok(None) => {
                debug!(key = %self.key, "Input key not set");
                return None;
            }
            Err(e) => {
                warn!(key = %self.key, "Failed to read input: {}", e);
                return None;
            }
        };

        if self.last_raw.as_deref() == Some(raw.as_str()) {
            return None;
        }
        self.last_raw = Some(raw.clone());

        let input: Value = match serde_json::from_str(&raw) {
            Ok(input) => input,
            Err(e) => {
                warn!(key = %self.key, "Skipping unparsable input: {}", e);
                return None;
            }
        };

        let mut request = InvocationRequest::new(input);
        request
            .context
            .extra
            .insert("inputKey".into(), json!(self.key));
        let ack = self.worker.invoke(request).await;
        info!(
            request_id = %ack.request_id,
            status = %ack.result.status(),
            stored = ack.stored,
            "Invoked from input key"
        );
        Some(ack)
    }
}
