//! Upstream completion providers.
//!
//! A provider turns a question into a lazy, ordered stream of text
//! fragments. The stream is finite, not restartable, and may fail at
//! construction time or at any point while being driven.

pub mod openai;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::Result;

pub use openai::OpenAiProvider;

/// Ordered stream of answer fragments from the upstream API.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Capability to fetch a streamed completion for a prompt.
///
/// Constructed once at process start and injected into the relay; no module
/// holds ambient global client state.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Start a completion for `question`.
    ///
    /// Errors returned here (as opposed to mid-stream) mean the upstream
    /// request could not be established at all.
    async fn completion_stream(&self, question: &str) -> Result<FragmentStream>;

    /// Provider name for logs.
    fn name(&self) -> &str;
}
