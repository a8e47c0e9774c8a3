//! Opt-in response cache for routed generations.
//!
//! [`ResponseCache`] sits in [`Switchboard`](crate::Switchboard) in front of
//! routing. A hit skips routing, dispatch and performance recording
//! entirely; only cache hit/miss metrics are emitted. Streaming requests
//! are never cached.
//!
//! Keys are a content hash of everything that can change the answer: task,
//! policy, allow/deny lists, messages, tools and sampling options.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use moka::future::Cache;
use serde::{Deserialize, Serialize};

use crate::gateway::RoutedResponse;
use crate::telemetry;

/// Configuration for the response cache.
///
/// ```rust
/// # use switchboard::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .max_entries(500)
///     .ttl(Duration::from_secs(600));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of cached responses. Default: 1,000.
    pub max_entries: u64,
    /// Time-to-live for cached responses. Default: 1 hour.
    #[serde(with = "secs")]
    pub ttl: Duration,
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_entries(mut self, n: u64) -> Self {
        self.max_entries = n;
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// In-memory LRU + TTL cache of routed responses.
pub struct ResponseCache {
    cache: Cache<u64, RoutedResponse>,
}

impl ResponseCache {
    pub fn new(config: &CacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_live(config.ttl)
            .build();
        Self { cache }
    }

    /// Look up a response. Emits cache hit/miss metrics.
    pub async fn get(&self, key: u64) -> Option<RoutedResponse> {
        match self.cache.get(&key).await {
            Some(hit) => {
                metrics::counter!(telemetry::CACHE_HITS_TOTAL, "operation" => "generate")
                    .increment(1);
                Some(hit)
            }
            None => {
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "operation" => "generate")
                    .increment(1);
                None
            }
        }
    }

    pub async fn insert(&self, key: u64, response: RoutedResponse) {
        self.cache.insert(key, response).await;
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}

/// Hash any serializable request description into a cache key.
///
/// Returns `None` if the value cannot be serialized, which disables
/// caching for that request.
pub fn cache_key<T: Serialize + ?Sized>(value: &T) -> Option<u64> {
    let encoded = serde_json::to_vec(value).ok()?;
    let mut hasher = DefaultHasher::new();
    encoded.hash(&mut hasher);
    Some(hasher.finish())
}
