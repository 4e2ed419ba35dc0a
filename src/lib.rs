//! parakeet — a streaming cache-aside reverse proxy for text completions.
//!
//! A question posted to `/question` is answered from a bounded in-memory LRU
//! cache when possible. On a miss the upstream completion API is streamed to
//! the caller fragment by fragment while the full answer is accumulated and,
//! on success, written back to the cache. Concurrent identical questions
//! share a single upstream fetch, each caller getting its own ordered live
//! stream.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod metrics;
pub mod providers;
pub mod relay;
