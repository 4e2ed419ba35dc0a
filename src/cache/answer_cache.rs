//! Bounded in-memory answer cache.
//!
//! Keys are the verbatim question strings, compared for exact equality — no
//! normalization. Entries never expire on their own; the only way out is
//! capacity-driven LRU eviction or replacement by a newer answer for the
//! same question.

use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};

use lru::LruCache;
use tracing::debug;

use crate::error::{ParakeetError, Result};

/// Callback invoked synchronously with `(key, value)` for each evicted entry.
///
/// Runs inside `set()`, so it must not block.
pub type EvictionHook = Box<dyn Fn(&str, &str) + Send + Sync>;

/// Fixed-capacity question→answer store with least-recently-used eviction.
///
/// All operations are serialized behind a single mutex; none of them block,
/// so the critical sections stay short.
pub struct AnswerCache {
    entries: Mutex<LruCache<String, String>>,
    on_evict: Option<EvictionHook>,
}

impl AnswerCache {
    /// Create a cache holding at most `capacity` entries.
    ///
    /// Fails with a configuration error when `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        Self::build(capacity, None)
    }

    /// Create a cache that invokes `hook` once per evicted entry.
    pub fn with_eviction_hook(capacity: usize, hook: EvictionHook) -> Result<Self> {
        Self::build(capacity, Some(hook))
    }

    fn build(capacity: usize, on_evict: Option<EvictionHook>) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| ParakeetError::Config("cache capacity must be at least 1".into()))?;
        Ok(Self {
            entries: Mutex::new(LruCache::new(capacity)),
            on_evict,
        })
    }

    /// Look up an answer. Marks the entry most-recently-used on hit.
    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    /// Insert or replace an answer, marking it most-recently-used.
    ///
    /// When the insert pushes the cache over capacity, the least-recently-used
    /// entry is evicted and the eviction hook fires with its `(key, value)`
    /// before `set` returns. Replacing an existing key refreshes recency but
    /// is not an eviction.
    pub fn set(&self, key: &str, value: String) {
        let evicted = {
            let mut entries = self.lock();
            entries
                .push(key.to_string(), value)
                // push() also returns the old pair on same-key replacement
                .filter(|(old_key, _)| old_key != key)
        };
        if let Some((old_key, old_value)) = evicted {
            debug!(key = %old_key, "evicting least-recently-used answer");
            if let Some(hook) = &self.on_evict {
                hook(&old_key, &old_value);
            }
        }
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// `true` when no entries are resident.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, String>> {
        // A poisoned lock only means another thread panicked mid-operation;
        // the LRU structure itself is still valid.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
