//! Cache-aside streaming relay.
//!
//! The relay answers a question from the bounded cache when it can, and
//! otherwise attaches the caller to the (possibly shared) in-flight upstream
//! fetch for that question. Completed fetches fill the cache; failed ones
//! never do.

pub mod inflight;
pub mod tee;

pub use inflight::InflightRegistry;
pub use tee::{StreamTee, Subscription, TeeEvent};

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::cache::AnswerCache;
use crate::metrics::UsageMetrics;
use crate::providers::CompletionProvider;

/// How a question gets answered.
pub enum Answer {
    /// Served from the cache; the entry's recency was refreshed.
    Cached(String),
    /// A live stream from the in-flight fetch (created or joined).
    Stream(Subscription),
}

/// The request-handling core: bounded cache + in-flight registry + upstream.
pub struct RelayService {
    cache: Arc<AnswerCache>,
    registry: InflightRegistry,
    provider: Arc<dyn CompletionProvider>,
    metrics: Arc<UsageMetrics>,
}

impl RelayService {
    pub fn new(
        cache: Arc<AnswerCache>,
        provider: Arc<dyn CompletionProvider>,
        metrics: Arc<UsageMetrics>,
        idle_timeout: Option<Duration>,
    ) -> Self {
        Self {
            cache,
            registry: InflightRegistry::new(idle_timeout, Arc::clone(&metrics)),
            provider,
            metrics,
        }
    }

    /// Answer `question` from the cache or by (joining a) streaming fetch.
    ///
    /// The question string is the cache key, verbatim. The upstream is only
    /// contacted when the key is neither cached nor already being fetched.
    pub fn answer(&self, question: &str) -> Answer {
        self.metrics.record_request();

        if let Some(text) = self.cache.get(question) {
            debug!(question, "cache hit");
            self.metrics.record_cache_hit();
            return Answer::Cached(text);
        }
        debug!(question, "cache miss");
        self.metrics.record_cache_miss();

        let provider = Arc::clone(&self.provider);
        let prompt = question.to_string();
        let cache = Arc::clone(&self.cache);
        let key = question.to_string();
        let subscription = self.registry.join_or_create(
            question,
            move || Box::pin(async move { provider.completion_stream(&prompt).await }),
            move |full| cache.set(&key, full),
        );
        Answer::Stream(subscription)
    }

    /// Number of answers currently cached.
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Number of upstream fetches currently pending.
    pub fn pending_fetches(&self) -> usize {
        self.registry.pending_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ParakeetError, Result};
    use crate::providers::FragmentStream;
    use async_trait::async_trait;
    use futures::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider that replays a fixed script and counts invocations.
    struct ScriptedProvider {
        script: Vec<Result<String>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Result<String>>) -> Self {
            Self {
                script,
                calls: AtomicUsize::new(0),
            }
        }

        fn ok(fragments: &[&str]) -> Self {
            Self::new(fragments.iter().map(|f| Ok(f.to_string())).collect())
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedProvider {
        async fn completion_stream(&self, _question: &str) -> Result<FragmentStream> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Box::pin(stream::iter(self.script.clone())))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn service(provider: Arc<ScriptedProvider>, capacity: usize) -> RelayService {
        RelayService::new(
            Arc::new(AnswerCache::new(capacity).unwrap()),
            provider,
            Arc::new(UsageMetrics::default()),
            None,
        )
    }

    async fn expect_streamed(service: &RelayService, question: &str) -> Result<String> {
        match service.answer(question) {
            Answer::Stream(sub) => sub.collect_text().await,
            Answer::Cached(_) => panic!("expected a streamed answer"),
        }
    }

    #[tokio::test]
    async fn test_miss_streams_and_fills_cache() {
        let provider = Arc::new(ScriptedProvider::ok(&["p", "o", "n", "g"]));
        let service = service(Arc::clone(&provider), 8);

        let text = expect_streamed(&service, "ping").await.unwrap();
        assert_eq!(text, "pong");
        assert_eq!(service.cache_len(), 1);

        // Identical question now hits the cache without touching upstream.
        match service.answer("ping") {
            Answer::Cached(text) => assert_eq!(text, "pong"),
            Answer::Stream(_) => panic!("expected a cache hit"),
        }
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_identical_questions_coalesce() {
        let provider = Arc::new(ScriptedProvider::ok(&["po", "ng"]));
        let service = service(Arc::clone(&provider), 8);

        let subs: Vec<_> = (0..4)
            .map(|_| match service.answer("ping") {
                Answer::Stream(sub) => sub,
                Answer::Cached(_) => panic!("nothing cached yet"),
            })
            .collect();

        for sub in subs {
            assert_eq!(sub.collect_text().await.unwrap(), "pong");
        }
        assert_eq!(provider.call_count(), 1);
        assert_eq!(service.pending_fetches(), 0);
    }

    #[tokio::test]
    async fn test_distinct_questions_fetch_separately() {
        let provider = Arc::new(ScriptedProvider::ok(&["same"]));
        let service = service(Arc::clone(&provider), 8);

        assert_eq!(expect_streamed(&service, "one").await.unwrap(), "same");
        assert_eq!(expect_streamed(&service, "two").await.unwrap(), "same");
        assert_eq!(provider.call_count(), 2);
        assert_eq!(service.cache_len(), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_never_cached() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok("partial".into()),
            Err(ParakeetError::Provider("reset mid-stream".into())),
        ]));
        let service = service(Arc::clone(&provider), 8);

        let result = expect_streamed(&service, "fail-case").await;
        assert!(result.is_err());
        assert_eq!(service.cache_len(), 0);

        // The next identical question is a fresh miss and retries upstream.
        let result = expect_streamed(&service, "fail-case").await;
        assert!(result.is_err());
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_fetch_outlives_detached_caller_and_fills_cache() {
        let provider = Arc::new(ScriptedProvider::ok(&["kept"]));
        let service = service(Arc::clone(&provider), 8);

        match service.answer("orphan") {
            Answer::Stream(sub) => drop(sub),
            Answer::Cached(_) => panic!("nothing cached yet"),
        }

        for _ in 0..100 {
            if service.cache_len() == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        match service.answer("orphan") {
            Answer::Cached(text) => assert_eq!(text, "kept"),
            Answer::Stream(_) => panic!("cache should have been filled"),
        }
    }

    #[tokio::test]
    async fn test_keys_are_verbatim() {
        let provider = Arc::new(ScriptedProvider::ok(&["x"]));
        let service = service(Arc::clone(&provider), 8);

        expect_streamed(&service, "Ping").await.unwrap();
        // Different case is a different key.
        expect_streamed(&service, "ping").await.unwrap();
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_metrics_track_hits_misses_and_joins() {
        let provider = Arc::new(ScriptedProvider::ok(&["v"]));
        let metrics = Arc::new(UsageMetrics::default());
        let service = RelayService::new(
            Arc::new(AnswerCache::new(4).unwrap()),
            provider,
            Arc::clone(&metrics),
            None,
        );

        let first = match service.answer("q") {
            Answer::Stream(sub) => sub,
            Answer::Cached(_) => panic!(),
        };
        let second = match service.answer("q") {
            Answer::Stream(sub) => sub,
            Answer::Cached(_) => panic!(),
        };
        first.collect_text().await.unwrap();
        second.collect_text().await.unwrap();
        let _ = service.answer("q");

        let snap = metrics.snapshot();
        assert_eq!(snap.requests, 3);
        assert_eq!(snap.cache_misses, 2);
        assert_eq!(snap.coalesced_joins, 1);
        assert_eq!(snap.upstream_calls, 1);
        assert_eq!(snap.cache_hits, 1);
    }
}
