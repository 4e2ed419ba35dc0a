//! In-flight request registry.
//!
//! Maps each cache key to the single pending upstream fetch for that key, so
//! a burst of identical questions turns into one upstream call with every
//! caller attached to the same tee. The map's entry API makes the "is a
//! fetch pending, create one if not" decision atomic; a check-then-act race
//! here would mean duplicate upstream calls.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::StreamExt;
use tracing::{debug, warn};

use crate::error::ParakeetError;
use crate::metrics::UsageMetrics;
use crate::providers::FragmentStream;

use super::tee::{StreamTee, Subscription};

/// Deferred construction of an upstream fragment stream.
///
/// Invoked only when a new fetch is actually created; joiners never touch
/// the upstream.
pub type ProducerFuture = Pin<Box<dyn Future<Output = crate::error::Result<FragmentStream>> + Send>>;

/// Registry of pending fetches, keyed by the verbatim question.
pub struct InflightRegistry {
    pending: Arc<DashMap<String, Arc<StreamTee>>>,
    idle_timeout: Option<Duration>,
    metrics: Arc<UsageMetrics>,
}

impl InflightRegistry {
    pub fn new(idle_timeout: Option<Duration>, metrics: Arc<UsageMetrics>) -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            idle_timeout,
            metrics,
        }
    }

    /// Attach to the pending fetch for `key`, creating it if none exists.
    ///
    /// When a fetch is created, a driver task pulls fragments from the
    /// producer into the tee until the stream ends. On a clean end the
    /// driver hands the accumulated text to `on_complete` (exactly once per
    /// fetch), retires the registry entry, and then delivers `Completed` to
    /// consumers — so anything observing the terminal event also observes
    /// the completed side effects. On failure the entry is retired first and
    /// every consumer gets `Failed`; `on_complete` never runs.
    pub fn join_or_create<F, C>(&self, key: &str, factory: F, on_complete: C) -> Subscription
    where
        F: FnOnce() -> ProducerFuture,
        C: FnOnce(String) + Send + 'static,
    {
        match self.pending.entry(key.to_string()) {
            Entry::Occupied(entry) => {
                debug!(key, "joining in-flight upstream fetch");
                self.metrics.record_coalesced_join();
                entry.get().subscribe()
            }
            Entry::Vacant(slot) => {
                let tee = Arc::new(StreamTee::new());
                let subscription = tee.subscribe();
                slot.insert(Arc::clone(&tee));
                self.metrics.record_upstream_call();
                let producer = factory();
                tokio::spawn(drive(
                    Arc::clone(&self.pending),
                    key.to_string(),
                    tee,
                    producer,
                    self.idle_timeout,
                    Arc::clone(&self.metrics),
                    on_complete,
                ));
                subscription
            }
        }
    }

    /// Number of fetches currently pending.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// Pull the upstream stream to its end on behalf of all consumers.
///
/// Runs to completion even if every consumer detaches, so the fetch still
/// fills the cache.
async fn drive<C>(
    pending: Arc<DashMap<String, Arc<StreamTee>>>,
    key: String,
    tee: Arc<StreamTee>,
    producer: ProducerFuture,
    idle_timeout: Option<Duration>,
    metrics: Arc<UsageMetrics>,
    on_complete: C,
) where
    C: FnOnce(String) + Send,
{
    let mut stream = match producer.await {
        Ok(stream) => stream,
        Err(error) => {
            abort(&pending, &key, &tee, &metrics, error);
            return;
        }
    };

    loop {
        let next = match idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, stream.next()).await {
                Ok(next) => next,
                Err(_) => {
                    abort(
                        &pending,
                        &key,
                        &tee,
                        &metrics,
                        ParakeetError::UpstreamTimeout(limit.as_secs()),
                    );
                    return;
                }
            },
            None => stream.next().await,
        };

        match next {
            Some(Ok(fragment)) => tee.publish(fragment),
            Some(Err(error)) => {
                abort(&pending, &key, &tee, &metrics, error);
                return;
            }
            None => {
                let full = tee.accumulated_text();
                on_complete(full);
                pending.remove(&key);
                tee.complete();
                debug!(key, "upstream fetch completed");
                return;
            }
        }
    }
}

fn abort(
    pending: &DashMap<String, Arc<StreamTee>>,
    key: &str,
    tee: &StreamTee,
    metrics: &UsageMetrics,
    error: ParakeetError,
) {
    warn!(key, %error, "upstream fetch failed");
    metrics.record_upstream_failure();
    pending.remove(key);
    tee.fail(error);
}
