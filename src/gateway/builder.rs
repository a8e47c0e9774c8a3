//! Builder for configuring a [`Switchboard`].

use std::sync::Arc;

use tracing::info;

use super::dispatch::FallbackConfig;
use super::switchboard::Switchboard;
use crate::cache::{CacheConfig, ResponseCache};
use crate::performance::{DEFAULT_HISTORY_WINDOW, DEFAULT_QUARANTINE_THRESHOLD, PerformanceTracker};
use crate::providers::{DEFAULT_STREAM_BUFFER, ProviderAdapter, ProviderOptions, ProviderRegistry};
use crate::routing::{
    Router, RoutingConfig, RoutingPolicy, ScoringWeights, TaskCategory, TaskProfile, TaskProfiles,
    TaskSelector,
};
use crate::{Result, SwitchboardError};

/// Builder for configuring a [`Switchboard`].
///
/// Registration errors (duplicate names) are deferred to [`build`](Self::build)
/// so the chain stays fluent.
pub struct SwitchboardBuilder {
    registry: ProviderRegistry,
    registration_error: Option<SwitchboardError>,
    tracker: Option<Arc<PerformanceTracker>>,
    history_window: usize,
    quarantine_threshold: u32,
    weights: ScoringWeights,
    profiles: TaskProfiles,
    fallback: FallbackConfig,
    defaults: RoutingConfig,
    cache: Option<CacheConfig>,
    stream_buffer: usize,
}

impl SwitchboardBuilder {
    pub fn new() -> Self {
        Self {
            registry: ProviderRegistry::new(),
            registration_error: None,
            tracker: None,
            history_window: DEFAULT_HISTORY_WINDOW,
            quarantine_threshold: DEFAULT_QUARANTINE_THRESHOLD,
            weights: ScoringWeights::default(),
            profiles: TaskProfiles::default(),
            fallback: FallbackConfig::default(),
            defaults: RoutingConfig::default(),
            cache: None,
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }

    /// Register a provider.
    pub fn provider(mut self, adapter: impl ProviderAdapter + 'static, options: ProviderOptions) -> Self {
        self.register(Arc::new(adapter), options);
        self
    }

    /// Register an already shared adapter.
    pub fn provider_arc(mut self, adapter: Arc<dyn ProviderAdapter>, options: ProviderOptions) -> Self {
        self.register(adapter, options);
        self
    }

    fn register(&mut self, adapter: Arc<dyn ProviderAdapter>, options: ProviderOptions) {
        if let Err(e) = self.registry.register(adapter, options)
            && self.registration_error.is_none()
        {
            self.registration_error = Some(e);
        }
    }

    /// Share an existing tracker, e.g. across several gateways. Overrides
    /// `history_window` and `quarantine_threshold`.
    pub fn tracker(mut self, tracker: Arc<PerformanceTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Latency samples kept per provider (default: 10).
    pub fn history_window(mut self, samples: usize) -> Self {
        self.history_window = samples;
        self
    }

    /// Consecutive failures before a provider is quarantined (default: 3).
    pub fn quarantine_threshold(mut self, failures: u32) -> Self {
        self.quarantine_threshold = failures;
        self
    }

    pub fn scoring_weights(mut self, weights: ScoringWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn task_profiles(mut self, profiles: TaskProfiles) -> Self {
        self.profiles = profiles;
        self
    }

    /// Replace the profile for one task category.
    pub fn task_profile(mut self, category: TaskCategory, profile: TaskProfile) -> Self {
        self.profiles.set(category, profile);
        self
    }

    pub fn fallback(mut self, config: FallbackConfig) -> Self {
        self.fallback = config;
        self
    }

    pub fn default_policy(mut self, policy: RoutingPolicy) -> Self {
        self.defaults.policy = policy;
        self
    }

    /// Defaults every request starts from.
    pub fn routing_defaults(mut self, defaults: RoutingConfig) -> Self {
        self.defaults = defaults;
        self
    }

    /// Enable the response cache.
    pub fn response_cache(mut self, config: CacheConfig) -> Self {
        self.cache = Some(config);
        self
    }

    /// Events buffered between a provider stream and the caller
    /// (default: 64).
    pub fn stream_buffer(mut self, events: usize) -> Self {
        self.stream_buffer = events;
        self
    }

    /// Build the gateway.
    pub fn build(self) -> Result<Switchboard> {
        if let Some(e) = self.registration_error {
            return Err(e);
        }
        if self.registry.is_empty() {
            return Err(SwitchboardError::Configuration(
                "no providers registered".into(),
            ));
        }

        let tracker = self.tracker.unwrap_or_else(|| {
            Arc::new(PerformanceTracker::new(
                self.history_window,
                self.quarantine_threshold,
            ))
        });
        let cache = self.cache.as_ref().map(ResponseCache::new);

        info!(
            providers = ?self.registry.names(),
            policy = %self.defaults.policy,
            fallback = self.fallback.enabled,
            max_attempts = self.fallback.max_attempts,
            cache = cache.is_some(),
            "switchboard ready"
        );

        Ok(Switchboard {
            registry: self.registry,
            tracker,
            router: Router::new(self.weights, TaskSelector::new(self.profiles)),
            fallback: self.fallback,
            defaults: self.defaults,
            cache,
            stream_buffer: self.stream_buffer.max(1),
        })
    }
}

impl Default for SwitchboardBuilder {
    fn default() -> Self {
        Self::new()
    }
}
