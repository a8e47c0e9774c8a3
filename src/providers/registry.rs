//! Provider registry.
//!
//! Holds every configured adapter together with its registration-time
//! attributes: priority (lower is preferred on score ties), enabled flag,
//! capabilities, pricing and placement. Capabilities are read from the
//! adapter once at registration and never re-queried.
//!
//! The enabled flag is the only mutable state. It is an `AtomicBool` per
//! provider, so `set_enabled` can run concurrently with routing passes: a
//! provider disabled mid-decision drops out of the next candidate set
//! without any registry-wide lock.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};

use super::traits::ProviderAdapter;
use crate::types::{CostClass, Deployment, Pricing, ProviderCapabilities, QualityTier};
use crate::{Result, SwitchboardError};

/// Output tokens assumed for cost estimates when the request sets no limit.
pub const DEFAULT_EXPECTED_OUTPUT_TOKENS: usize = 512;

/// Registration options that override what the adapter reports.
#[derive(Debug, Clone, Default)]
pub struct ProviderOptions {
    /// Tie-break order; lower is preferred. Default 100.
    pub priority: Option<u32>,
    /// Register disabled (e.g. missing credential).
    pub disabled: bool,
    pub capabilities: Option<ProviderCapabilities>,
    pub pricing: Option<Pricing>,
    pub deployment: Option<Deployment>,
    pub quality: Option<QualityTier>,
}

impl ProviderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority(mut self, priority: u32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.disabled = !enabled;
        self
    }

    pub fn capabilities(mut self, capabilities: ProviderCapabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    pub fn pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = Some(pricing);
        self
    }

    pub fn deployment(mut self, deployment: Deployment) -> Self {
        self.deployment = Some(deployment);
        self
    }

    pub fn quality(mut self, quality: QualityTier) -> Self {
        self.quality = Some(quality);
        self
    }
}

const DEFAULT_PRIORITY: u32 = 100;

/// One registered backend.
pub struct Provider {
    name: String,
    model: String,
    priority: u32,
    enabled: AtomicBool,
    capabilities: ProviderCapabilities,
    pricing: Pricing,
    deployment: Deployment,
    quality: QualityTier,
    adapter: Arc<dyn ProviderAdapter>,
}

impl Provider {
    fn new(adapter: Arc<dyn ProviderAdapter>, options: ProviderOptions) -> Self {
        let metadata = adapter.metadata();
        Self {
            name: adapter.name().to_string(),
            model: metadata.model,
            priority: options.priority.unwrap_or(DEFAULT_PRIORITY),
            enabled: AtomicBool::new(!options.disabled),
            capabilities: options.capabilities.unwrap_or(metadata.capabilities),
            pricing: options.pricing.unwrap_or(metadata.pricing),
            deployment: options.deployment.unwrap_or(metadata.deployment),
            quality: options.quality.unwrap_or(metadata.quality),
            adapter,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    pub fn pricing(&self) -> &Pricing {
        &self.pricing
    }

    pub fn deployment(&self) -> Deployment {
        self.deployment
    }

    pub fn quality(&self) -> QualityTier {
        self.quality
    }

    pub fn cost_class(&self) -> CostClass {
        CostClass::classify(self.deployment, &self.pricing)
    }

    /// Estimated USD cost of one request. Local providers cost nothing.
    pub fn estimate_cost(&self, prompt_tokens: usize, output_tokens: usize) -> f64 {
        if self.deployment.is_local() {
            0.0
        } else {
            self.pricing.estimate(prompt_tokens, output_tokens)
        }
    }

    pub fn adapter(&self) -> &Arc<dyn ProviderAdapter> {
        &self.adapter
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("priority", &self.priority)
            .field("enabled", &self.is_enabled())
            .field("deployment", &self.deployment)
            .field("quality", &self.quality)
            .finish_non_exhaustive()
    }
}

/// Registry of configured providers, keyed by unique name.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter. Names must be unique.
    pub fn register(
        &mut self,
        adapter: Arc<dyn ProviderAdapter>,
        options: ProviderOptions,
    ) -> Result<()> {
        let provider = Provider::new(adapter, options);
        if self.providers.contains_key(provider.name()) {
            return Err(SwitchboardError::Configuration(format!(
                "provider '{}' registered twice",
                provider.name()
            )));
        }
        info!(
            provider = provider.name(),
            model = provider.model(),
            priority = provider.priority(),
            enabled = provider.is_enabled(),
            deployment = ?provider.deployment(),
            "registered provider"
        );
        self.providers
            .insert(provider.name().to_string(), Arc::new(provider));
        Ok(())
    }

    /// Look up a provider by name.
    pub fn get(&self, name: &str) -> Result<Arc<Provider>> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| SwitchboardError::ProviderNotFound(name.to_string()))
    }

    /// Enable or disable a provider. Safe to call while requests are routed.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        let provider = self
            .providers
            .get(name)
            .ok_or_else(|| SwitchboardError::ProviderNotFound(name.to_string()))?;
        let was = provider.enabled.swap(enabled, Ordering::AcqRel);
        if was != enabled {
            debug!(provider = name, enabled, "provider enabled flag changed");
        }
        Ok(())
    }

    /// Whether the provider exists and is enabled.
    pub fn is_usable(&self, name: &str) -> bool {
        self.providers.get(name).is_some_and(|p| p.is_enabled())
    }

    /// Enabled providers ordered by priority, then name.
    pub fn list_enabled(&self) -> Vec<Arc<Provider>> {
        let mut enabled: Vec<_> = self
            .providers
            .values()
            .filter(|p| p.is_enabled())
            .cloned()
            .collect();
        enabled.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
        enabled
    }

    /// Every registered provider, enabled or not, ordered by name.
    pub fn list_all(&self) -> Vec<Arc<Provider>> {
        self.providers.values().cloned().collect()
    }

    /// Registered provider names in alphabetical order.
    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}
