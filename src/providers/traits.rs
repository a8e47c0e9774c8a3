//! The adapter contract every backend implements.
//!
//! An adapter wraps exactly one backend model (a local Ollama model, a
//! hosted chat-completions endpoint, ...). It reports its capabilities once
//! through [`ProviderAdapter::metadata`], which the registry reads at
//! registration time and never again.
//!
//! # Failure contract
//!
//! Adapters do not retry. A failed call returns a [`SwitchboardError`]
//! whose [`is_transient()`](SwitchboardError::is_transient) classification
//! tells the dispatcher whether the failure was a transient outage (timeout,
//! rate limit, 5xx) or a permanent fault (bad credentials, unknown model).
//! Either way the dispatcher moves on to the next candidate; the
//! classification is kept in the attempt trail.
//!
//! [`SwitchboardError`]: crate::SwitchboardError

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::Result;
use crate::types::{
    Deployment, GenerateEvent, GenerateRequest, GenerateResponse, Pricing, ProviderCapabilities,
    QualityTier,
};

/// Stream of generation events produced by an adapter.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<GenerateEvent>> + Send>>;

/// Static description of one adapter, read once at registration.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderMetadata {
    /// Model identifier sent to the backend.
    pub model: String,
    pub capabilities: ProviderCapabilities,
    pub pricing: Pricing,
    pub deployment: Deployment,
    pub quality: QualityTier,
}

impl ProviderMetadata {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            capabilities: ProviderCapabilities::default(),
            pricing: Pricing::default(),
            deployment: Deployment::default(),
            quality: QualityTier::default(),
        }
    }

    pub fn capabilities(mut self, capabilities: ProviderCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn deployment(mut self, deployment: Deployment) -> Self {
        self.deployment = deployment;
        self
    }

    pub fn quality(mut self, quality: QualityTier) -> Self {
        self.quality = quality;
        self
    }
}

/// Uniform wrapper around one backend language model.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Unique provider name used for routing, logging and metrics.
    fn name(&self) -> &str;

    /// Capabilities, pricing and placement of the wrapped model.
    fn metadata(&self) -> ProviderMetadata;

    /// Non-streaming generation.
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse>;

    /// Streaming generation. Errors returned here (before the stream
    /// yields) count as a failed attempt; mid-stream errors are passed
    /// through to the consumer.
    async fn generate_stream(&self, request: &GenerateRequest) -> Result<EventStream>;
}
