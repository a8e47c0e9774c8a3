//! Caching subsystem.
//!
//! [`ResponseCache`] is an opt-in LRU + TTL cache for routed generations,
//! activated via [`SwitchboardBuilder::response_cache()`](crate::SwitchboardBuilder::response_cache).
//! Without it no cache is allocated.

pub mod response;

pub use response::{CacheConfig, ResponseCache, cache_key};
