//! parakeet entry point: config → wiring → serve.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use parakeet::api::server::{start_server, AppState};
use parakeet::cache::AnswerCache;
use parakeet::config::Config;
use parakeet::metrics::UsageMetrics;
use parakeet::providers::{CompletionProvider, OpenAiProvider};
use parakeet::relay::RelayService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A .env file is optional; real environment variables win.
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::load().context("invalid configuration")?;

    let metrics = Arc::new(UsageMetrics::default());
    let hook_metrics = Arc::clone(&metrics);
    let cache = Arc::new(AnswerCache::with_eviction_hook(
        config.cache.capacity,
        Box::new(move |key, value| {
            hook_metrics.record_eviction();
            info!(key, value_len = value.len(), "evicted cache entry");
        }),
    )?);
    let provider = Arc::new(OpenAiProvider::from_config(&config.upstream)?);
    info!(
        provider = provider.name(),
        model = %config.upstream.model,
        cache_capacity = config.cache.capacity,
        "starting parakeet"
    );

    let relay = Arc::new(RelayService::new(
        cache,
        provider,
        Arc::clone(&metrics),
        config.relay.idle_timeout(),
    ));

    start_server(&config.server, AppState::new(relay, metrics))
        .await
        .map_err(|e| anyhow::anyhow!("server error: {e}"))
}
