// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! In-memory counter store and the increment work run against it.
//!
//! Increments are a plain get, add one, put sequence with no transaction,
//! so concurrent runs lose updates.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use paced_executor::{from_async, Work};
use tokio::sync::mpsc;
use tracing::warn;

/// Key of the single counter seeded by the demo.
pub const SINGLE_COUNTER_KEY: &str = "single_counter_key";

/// A stored counter value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counter {
    pub count: u64,
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{count: {}}}", self.count)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("No counter stored under key '{key}'")]
    NotFound { key: String },
}

/// Keyed counters behind a lock. Each call locks on its own, callers get no
/// atomicity across calls.
#[derive(Debug, Default)]
pub struct CounterStore {
    counters: Mutex<HashMap<String, Counter>>,
}

impl CounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the counter stored under `key`.
    pub fn get(&self, key: &str) -> Result<Counter, StoreError> {
        self.lock()
            .get(key)
            .copied()
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_owned(),
            })
    }

    /// Stores `counter` under `key`, replacing any previous value.
    pub fn put(&self, key: &str, counter: Counter) {
        let _ = self.lock().insert(key.to_owned(), counter);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Counter>> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Reads the counter, yields, then writes it back incremented.
async fn increment(store: &CounterStore, key: &str) -> Result<(), StoreError> {
    let mut counter = store.get(key)?;
    // Give other invocations a chance to interleave between read and write
    tokio::task::yield_now().await;
    counter.count += 1;
    store.put(key, counter);
    Ok(())
}

/// Work incrementing the counter at `key` and reporting every invocation,
/// successful or not, on `finished`.
pub fn increment_work(
    store: Arc<CounterStore>,
    key: &'static str,
    finished: mpsc::Sender<()>,
) -> impl Work {
    from_async(move || {
        let store = Arc::clone(&store);
        let finished = finished.clone();
        async move {
            if let Err(e) = increment(&store, key).await {
                warn!(error = %e, "Failed to increment counter");
            }
            if finished.try_send(()).is_err() {
                warn!("Completion channel closed or full");
            }
        }
    })
}
