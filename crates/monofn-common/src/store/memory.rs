//! In-process store used by tests and single-binary setups.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::{ResultStore, StoreError, StoreValue};

/// A [`ResultStore`] backed by a `HashMap`, with fault injection.
///
/// ```
/// use monofn_common::store::{MemoryStore, ResultStore, StoreValue};
///
/// # tokio_test();
/// # fn tokio_test() {
/// # let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
/// # rt.block_on(async {
/// let store = MemoryStore::new();
/// store.write("k", "v").await.unwrap();
/// assert_eq!(store.read("k").await.unwrap(), Some(StoreValue::Single("v".into())));
///
/// store.fail_next_reads(1);
/// assert!(store.read("k").await.is_err());
/// assert!(store.read("k").await.is_ok());
/// # });
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, StoreValue>>,
    failing_reads: AtomicUsize,
    failing_writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` reads (and pings) fail with a connection error.
    pub fn fail_next_reads(&self, n: usize) {
        self.failing_reads.store(n, Ordering::SeqCst);
    }

    /// Makes the next `n` writes or appends fail with a connection error.
    pub fn fail_next_writes(&self, n: usize) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    /// Removes `key`.
    pub fn remove(&self, key: &str) {
        self.entries().remove(key);
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, StoreValue>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn injected_failure(counter: &AtomicUsize) -> Result<(), StoreError> {
        let took = counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if took {
            Err(StoreError::Connection {
                addr: "memory".into(),
                reason: "injected failure".into(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        Self::injected_failure(&self.failing_writes)?;
        self.entries()
            .insert(key.to_string(), StoreValue::Single(value.to_string()));
        Ok(())
    }

    async fn append(&self, key: &str, value: &str, max_len: usize) -> Result<(), StoreError> {
        Self::injected_failure(&self.failing_writes)?;
        let mut entries = self.entries();
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| StoreValue::List(Vec::new()));
        match entry {
            StoreValue::List(items) => {
                items.push(value.to_string());
                let max_len = max_len.max(1);
                if items.len() > max_len {
                    let excess = items.len() - max_len;
                    items.drain(..excess);
                }
                Ok(())
            }
            StoreValue::Single(_) => Err(StoreError::Server(
                "WRONGTYPE Operation against a key holding the wrong kind of value".into(),
            )),
        }
    }

    async fn read(&self, key: &str) -> Result<Option<StoreValue>, StoreError> {
        Self::injected_failure(&self.failing_reads)?;
        Ok(self.entries().get(key).cloned())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Self::injected_failure(&self.failing_reads)
    }
}
