//! Retrieval memoization with per-key single flight.
//!
//! Each key owns an `Arc<OnceCell>`. The map shard lock is held only long
//! enough to fetch or insert the cell; the computation itself runs under the
//! cell, so concurrent callers for one key await the same computation while
//! other keys proceed independently. A failed computation leaves the cell
//! empty and the next caller retries.
//!
//! Entries are never evicted.

use dashmap::DashMap;
use mathtutor_core::error::RetrievalError;
use mathtutor_core::retrieval::Passage;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::OnceCell;
use tracing::debug;

const DELIMITER: char = '\u{1f}';

/// Normalized `(topic, utterance)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    topic: String,
    utterance: String,
}

fn normalize(field: &str) -> String {
    field
        .trim()
        .to_lowercase()
        .chars()
        .filter(|&c| c != DELIMITER)
        .collect()
}

impl CacheKey {
    pub fn new(topic: &str, utterance: &str) -> Self {
        Self {
            topic: normalize(topic),
            utterance: normalize(utterance),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn utterance(&self) -> &str {
        &self.utterance
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.topic, DELIMITER, self.utterance)
    }
}

/// Hit/miss counters.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub failures: AtomicU64,
}

/// Memoized retrieval results keyed by [`CacheKey`].
#[derive(Default)]
pub struct RetrievalCache {
    entries: DashMap<CacheKey, Arc<OnceCell<Vec<Passage>>>>,
    stats: CacheStats,
}

impl RetrievalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached passages for `key`, running `compute` on a miss.
    ///
    /// At most one `compute` per key runs at a time. A failed `compute` is
    /// returned only to the caller that ran it and is not stored; callers
    /// queued on the same key then take turns running their own `compute`
    /// until one succeeds.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: CacheKey,
        compute: F,
    ) -> Result<Vec<Passage>, RetrievalError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Passage>, RetrievalError>>,
    {
        let cell = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        if let Some(passages) = cell.get() {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Retrieval cache hit");
            return Ok(passages.clone());
        }

        let mut computed = false;
        let result = cell
            .get_or_try_init(|| {
                computed = true;
                compute()
            })
            .await;

        match result {
            Ok(passages) => {
                let counter = if computed { &self.stats.misses } else { &self.stats.hits };
                counter.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, passages = passages.len(), computed, "Retrieval cache lookup");
                Ok(passages.clone())
            }
            Err(e) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Previously computed passages, without computing.
    pub fn get(&self, key: &CacheKey) -> Option<Vec<Passage>> {
        self.entries.get(key).and_then(|cell| cell.get().cloned())
    }

    /// Number of keys holding a computed entry.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.value().initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}
