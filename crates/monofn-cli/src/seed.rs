//! Mock results for trying the dashboard without a runtime.

use chrono::{Duration, Utc};
use monofn_common::store::{OutputMode, OutputTarget, ResultStore, StoreError};
use monofn_common::{InvocationResult, Outcome};
use serde_json::json;

/// Builds `count` results, oldest first, one second apart. Every fifth one failed
/// and every seventh timed out so all three statuses show up.
pub fn mock_results(count: usize) -> Vec<InvocationResult> {
    let now = Utc::now();
    (0..count)
        .map(|i| {
            let started_at = now - Duration::seconds((count - i) as i64);
            let outcome = if i % 7 == 6 {
                Outcome::timeout(1000)
            } else if i % 5 == 4 {
                Outcome::error("TypeError", "missing key 'b'")
            } else {
                Outcome::Ok {
                    output: json!({
                        "percent-network-egress": 100.0,
                        "percent-memory-cache": 100.0,
                        "avg-util-cpu0-60sec": 25.45 + i as f64 % 10.0,
                        "avg-util-cpu1-60sec": 25.89,
                    }),
                }
            };
            let duration_ms = match outcome {
                Outcome::Timeout { .. } => 1000,
                _ => 2 + (i as u64 * 13) % 40,
            };
            InvocationResult::new(uuid::Uuid::new_v4().to_string(), outcome, started_at, duration_ms)
        })
        .collect()
}

/// Writes `results` to `key`.
///
/// In `latest` mode the whole batch is stored as one JSON array under the key;
/// in `list` mode each result is appended.
pub async fn seed(
    store: &dyn ResultStore,
    key: &str,
    mode: OutputMode,
    results: &[InvocationResult],
) -> Result<(), StoreError> {
    match mode {
        OutputMode::Latest => {
            let body = serde_json::to_string(results)
                .map_err(|e| StoreError::Protocol(format!("failed to encode results: {}", e)))?;
            store.write(key, &body).await
        }
        OutputMode::List => {
            let target = OutputTarget::list(key, results.len().max(OutputTarget::DEFAULT_MAX_LEN));
            for result in results {
                let body = serde_json::to_string(result)
                    .map_err(|e| StoreError::Protocol(format!("failed to encode result: {}", e)))?;
                target.store(store, &body).await?;
            }
            Ok(())
        }
    }
}
