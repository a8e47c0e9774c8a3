//! Shared mock adapter for integration tests.

#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;

use switchboard::providers::{EventStream, ProviderAdapter, ProviderMetadata};
use switchboard::types::{
    Deployment, FinishReason, GenerateEvent, GenerateRequest, GenerateResponse, Pricing,
    ProviderCapabilities, QualityTier, Usage,
};
use switchboard::{Result, SwitchboardError};

/// What the next call to a [`MockAdapter`] does.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Behavior {
    Succeed,
    /// Return after a delay.
    Slow(Duration),
    /// 503 from upstream.
    Transient,
    /// Bad credentials.
    Permanent,
    /// Never returns.
    Hang,
}

pub struct MockAdapter {
    name: String,
    metadata: ProviderMetadata,
    behavior: Mutex<Behavior>,
    calls: AtomicUsize,
}

impl MockAdapter {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            metadata: ProviderMetadata::new(format!("{name}-model")),
            behavior: Mutex::new(Behavior::Succeed),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn behavior(self, behavior: Behavior) -> Self {
        self.set_behavior(behavior);
        self
    }

    pub fn capabilities(mut self, capabilities: ProviderCapabilities) -> Self {
        self.metadata = self.metadata.capabilities(capabilities);
        self
    }

    pub fn pricing(mut self, pricing: Pricing) -> Self {
        self.metadata = self.metadata.pricing(pricing);
        self
    }

    pub fn deployment(mut self, deployment: Deployment) -> Self {
        self.metadata = self.metadata.deployment(deployment);
        self
    }

    pub fn quality(mut self, quality: QualityTier) -> Self {
        self.metadata = self.metadata.quality(quality);
        self
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn act(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = *self.behavior.lock().unwrap();
        match behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            Behavior::Transient => Err(SwitchboardError::Api {
                status: 503,
                message: "overloaded".into(),
            }),
            Behavior::Permanent => Err(SwitchboardError::AuthenticationFailed),
            Behavior::Hang => std::future::pending().await,
        }
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> ProviderMetadata {
        self.metadata.clone()
    }

    async fn generate(&self, _request: &GenerateRequest) -> Result<GenerateResponse> {
        self.act().await?;
        Ok(GenerateResponse {
            content: format!("hello from {}", self.name),
            model: self.metadata.model.clone(),
            tool_calls: Vec::new(),
            usage: Some(Usage::new(10, 5)),
            finish_reason: FinishReason::Stop,
        })
    }

    async fn generate_stream(&self, _request: &GenerateRequest) -> Result<EventStream> {
        self.act().await?;
        let events = vec![
            Ok(GenerateEvent::Text("hello ".into())),
            Ok(GenerateEvent::Text(format!("from {}", self.name))),
            Ok(GenerateEvent::Usage(Usage::new(10, 5))),
            Ok(GenerateEvent::Done),
        ];
        Ok(Box::pin(stream::iter(events)))
    }
}

/// Capabilities that satisfy every built-in task profile.
pub fn full_caps() -> ProviderCapabilities {
    ProviderCapabilities::default()
        .max_context_tokens(128_000)
        .tools(true)
        .vision(true)
        .json_mode(true)
}
