//! Routed results and their provenance.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use serde::Serialize;

use crate::error::AttemptFailure;
use crate::performance::PerformanceSnapshot;
use crate::providers::{EventStream, Provider};
use crate::routing::{RoutingPolicy, TaskCategory};
use crate::types::{CostClass, Deployment, GenerateEvent, GenerateResponse, LatencyClass, Usage};
use crate::Result;

/// Where a routed response came from.
#[derive(Debug, Clone, Serialize)]
pub struct Provenance {
    /// Provider that served the request.
    pub provider: String,
    /// Model that produced the output.
    pub model: String,
    /// Duration of the serving attempt. For streams, time until the
    /// stream opened.
    pub latency_ms: u64,
    /// USD estimate; from reported usage when available.
    pub estimated_cost: f64,
    pub usage: Option<Usage>,
    /// Providers tried, in order, the serving one last.
    pub fallback_path: Vec<String>,
    /// Attempts that failed before the serving one.
    pub failed_attempts: Vec<AttemptFailure>,
    pub policy: RoutingPolicy,
    pub task: TaskCategory,
    /// Served from the response cache.
    pub cached: bool,
}

impl Provenance {
    /// Whether any fallback was taken.
    pub fn fell_back(&self) -> bool {
        !self.failed_attempts.is_empty()
    }
}

/// A generation plus its provenance.
#[derive(Debug, Clone, Serialize)]
pub struct RoutedResponse {
    #[serde(flatten)]
    pub response: GenerateResponse,
    pub provenance: Provenance,
}

impl RoutedResponse {
    pub fn content(&self) -> &str {
        &self.response.content
    }

    pub fn provider(&self) -> &str {
        &self.provenance.provider
    }
}

/// A routed event stream.
///
/// Fallback happens only while opening; once events flow, a mid-stream
/// error is yielded to the caller as-is. `provenance.usage` is `None`
/// here; usage arrives as a [`GenerateEvent::Usage`] event.
pub struct RoutedStream {
    pub provenance: Provenance,
    events: EventStream,
}

impl RoutedStream {
    pub(crate) fn new(provenance: Provenance, events: EventStream) -> Self {
        Self { provenance, events }
    }

    pub fn into_inner(self) -> (Provenance, EventStream) {
        (self.provenance, self.events)
    }
}

impl Stream for RoutedStream {
    type Item = Result<GenerateEvent>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().events.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for RoutedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutedStream")
            .field("provenance", &self.provenance)
            .finish_non_exhaustive()
    }
}

/// Per-provider view for dashboards and the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStats {
    pub provider: String,
    pub model: String,
    pub enabled: bool,
    pub priority: u32,
    pub deployment: Deployment,
    pub cost_class: CostClass,
    pub latency_class: LatencyClass,
    pub performance: PerformanceSnapshot,
}

impl ProviderStats {
    pub(crate) fn new(provider: &Provider, performance: PerformanceSnapshot) -> Self {
        Self {
            provider: provider.name().to_string(),
            model: provider.model().to_string(),
            enabled: provider.is_enabled(),
            priority: provider.priority(),
            deployment: provider.deployment(),
            cost_class: provider.cost_class(),
            latency_class: performance.latency_class(),
            performance,
        }
    }
}
