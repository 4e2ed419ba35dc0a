//! Bounded answer caching with LRU eviction.

pub mod answer_cache;

pub use answer_cache::{AnswerCache, EvictionHook};
