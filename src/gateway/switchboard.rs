//! The routing gateway: route, dispatch with fallback, record, report.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::builder::SwitchboardBuilder;
use super::dispatch::{Dispatched, Dispatcher, FallbackConfig};
use super::request::RouteRequest;
use super::response::{Provenance, ProviderStats, RoutedResponse, RoutedStream};
use crate::cache::{ResponseCache, cache_key};
use crate::performance::PerformanceTracker;
use crate::providers::{Provider, ProviderRegistry, bounded_stream};
use crate::routing::{
    Router, RoutingConfig, RoutingContext, RoutingDecision, RoutingPolicy, TaskCategory,
};
use crate::telemetry;
use crate::types::{GenerateRequest, Usage};
use crate::Result;

/// LLM routing gateway.
///
/// Owns the provider registry, shares the performance tracker, and routes
/// each request to the best candidate with fallback. All methods take
/// `&self`; a `Switchboard` is typically held in an `Arc` and shared
/// across tasks.
///
/// ```rust,no_run
/// # use switchboard::{Switchboard, RouteRequest, TaskCategory};
/// # use switchboard::providers::{OllamaAdapter, ProviderOptions, DEFAULT_OLLAMA_URL};
/// # async fn example() -> switchboard::Result<()> {
/// let board = Switchboard::builder()
///     .provider(
///         OllamaAdapter::new("ollama", DEFAULT_OLLAMA_URL, "llama3.2")?,
///         ProviderOptions::new(),
///     )
///     .build()?;
///
/// let routed = board
///     .generate(&RouteRequest::prompt("Plan a refactor").task(TaskCategory::Planning))
///     .await?;
/// println!("{} via {}", routed.content(), routed.provider());
/// # Ok(())
/// # }
/// ```
pub struct Switchboard {
    pub(crate) registry: ProviderRegistry,
    pub(crate) tracker: Arc<PerformanceTracker>,
    pub(crate) router: Router,
    pub(crate) fallback: FallbackConfig,
    pub(crate) defaults: RoutingConfig,
    pub(crate) cache: Option<ResponseCache>,
    pub(crate) stream_buffer: usize,
}

/// Everything that determines a cacheable answer.
#[derive(Serialize)]
struct CacheIdentity<'a> {
    task: TaskCategory,
    policy: RoutingPolicy,
    allow: &'a [String],
    deny: &'a [String],
    request: &'a RouteRequest,
}

impl Switchboard {
    pub fn builder() -> SwitchboardBuilder {
        SwitchboardBuilder::new()
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn tracker(&self) -> &Arc<PerformanceTracker> {
        &self.tracker
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn fallback_config(&self) -> &FallbackConfig {
        &self.fallback
    }

    /// Gateway-wide routing defaults that requests override.
    pub fn defaults(&self) -> &RoutingConfig {
        &self.defaults
    }

    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_ref()
    }

    /// Enable or disable a provider at runtime.
    pub fn set_enabled(&self, provider: &str, enabled: bool) -> Result<()> {
        self.registry.set_enabled(provider, enabled)?;
        info!(provider, enabled, "provider availability changed");
        Ok(())
    }

    /// Rank candidates without dispatching anything.
    pub fn route(&self, request: &RouteRequest) -> Result<RoutingDecision> {
        let context = request.routing_context(&self.defaults, false);
        self.router.route(&self.registry, &self.tracker, &context)
    }

    /// Route and generate.
    pub async fn generate(&self, request: &RouteRequest) -> Result<RoutedResponse> {
        self.generate_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Route and generate; `cancel` aborts dispatch without recording
    /// the in-flight attempt.
    #[instrument(
        name = "switchboard.generate",
        skip(self, request, cancel),
        fields(operation = "generate", task = %request.task_or_default())
    )]
    pub async fn generate_with_cancel(
        &self,
        request: &RouteRequest,
        cancel: &CancellationToken,
    ) -> Result<RoutedResponse> {
        let start = Instant::now();
        let context = request.routing_context(&self.defaults, false);

        let key = self.cache_key(request, &context);
        if let Some(cache) = &self.cache
            && let Some(key) = key
            && let Some(mut hit) = cache.get(key).await
        {
            debug!(provider = %hit.provenance.provider, "served from cache");
            hit.provenance.cached = true;
            return Ok(hit);
        }

        let result = self
            .dispatch(&context, request, "generate", cancel, |provider, req| async move {
                provider.adapter().generate(&req).await
            })
            .await;

        let routed = match result {
            Ok(dispatched) => {
                let usage = dispatched.value.usage;
                let model = if dispatched.value.model.is_empty() {
                    dispatched.candidate.model.clone()
                } else {
                    dispatched.value.model.clone()
                };
                let estimated_cost = match usage {
                    Some(u) => dispatched.candidate.handle().estimate_cost(
                        u.prompt_tokens as usize,
                        u.completion_tokens as usize,
                    ),
                    None => dispatched.candidate.estimated_cost,
                };
                if let Some(usage) = usage {
                    record_tokens(&dispatched.candidate.provider, &usage);
                }
                let provenance = provenance(&context, &dispatched, model, estimated_cost, usage);
                RoutedResponse {
                    response: dispatched.value,
                    provenance,
                }
            }
            Err(e) => {
                record_request("generate", "none", start, false);
                return Err(e);
            }
        };
        record_request("generate", &routed.provenance.provider, start, true);

        if let Some(cache) = &self.cache
            && let Some(key) = key
        {
            cache.insert(key, routed.clone()).await;
        }
        Ok(routed)
    }

    /// Route and open a stream.
    pub async fn generate_stream(&self, request: &RouteRequest) -> Result<RoutedStream> {
        self.generate_stream_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Route and open a stream. Fallback covers opening only; `cancel`
    /// also stops event forwarding once the stream is running.
    #[instrument(
        name = "switchboard.generate_stream",
        skip(self, request, cancel),
        fields(operation = "generate_stream", task = %request.task_or_default())
    )]
    pub async fn generate_stream_with_cancel(
        &self,
        request: &RouteRequest,
        cancel: CancellationToken,
    ) -> Result<RoutedStream> {
        let start = Instant::now();
        let context = request.routing_context(&self.defaults, true);

        let result = self
            .dispatch(&context, request, "generate_stream", &cancel, |provider, req| async move {
                provider.adapter().generate_stream(&req).await
            })
            .await;

        match result {
            Ok(dispatched) => {
                record_request("generate_stream", &dispatched.candidate.provider, start, true);
                let model = dispatched.candidate.model.clone();
                let cost = dispatched.candidate.estimated_cost;
                let provenance = provenance(&context, &dispatched, model, cost, None);
                let events = bounded_stream(dispatched.value, self.stream_buffer, Some(cancel));
                Ok(RoutedStream::new(provenance, events))
            }
            Err(e) => {
                record_request("generate_stream", "none", start, false);
                Err(e)
            }
        }
    }

    /// Current performance view of every registered provider.
    pub fn performance_stats(&self) -> Vec<ProviderStats> {
        self.registry
            .list_all()
            .iter()
            .map(|p| ProviderStats::new(p, self.tracker.snapshot(p.name())))
            .collect()
    }

    async fn dispatch<T, F, Fut>(
        &self,
        context: &RoutingContext,
        request: &RouteRequest,
        operation: &'static str,
        cancel: &CancellationToken,
        call: F,
    ) -> Result<Dispatched<T>>
    where
        F: Fn(Arc<Provider>, Arc<GenerateRequest>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let deadline = request
            .deadline
            .map(|budget| tokio::time::Instant::now() + budget);
        let decision = self.router.route(&self.registry, &self.tracker, context)?;
        let generate_request = Arc::new(request.to_generate_request());

        Dispatcher::new(&self.tracker, &self.fallback, operation)
            .run(&decision, &context.config, cancel, deadline, |provider| {
                call(provider, Arc::clone(&generate_request))
            })
            .await
    }

    fn cache_key(&self, request: &RouteRequest, context: &RoutingContext) -> Option<u64> {
        if self.cache.is_none() || request.bypass_cache {
            return None;
        }
        cache_key(&CacheIdentity {
            task: context.task,
            policy: context.config.policy,
            allow: &context.config.allow,
            deny: &context.config.deny,
            request,
        })
    }
}

impl std::fmt::Debug for Switchboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Switchboard")
            .field("providers", &self.registry.names())
            .field("defaults", &self.defaults)
            .field("fallback", &self.fallback)
            .field("cache", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

fn provenance<T>(
    context: &RoutingContext,
    dispatched: &Dispatched<T>,
    model: String,
    estimated_cost: f64,
    usage: Option<Usage>,
) -> Provenance {
    Provenance {
        provider: dispatched.candidate.provider.clone(),
        model,
        latency_ms: dispatched.latency.as_millis() as u64,
        estimated_cost,
        usage,
        fallback_path: dispatched.path.clone(),
        failed_attempts: dispatched.failures.clone(),
        policy: context.config.policy,
        task: context.task,
        cached: false,
    }
}

fn record_request(operation: &'static str, provider: &str, start: Instant, ok: bool) {
    metrics::counter!(telemetry::REQUESTS_TOTAL,
        "provider" => provider.to_owned(),
        "operation" => operation,
        "status" => if ok { "ok" } else { "error" },
    )
    .increment(1);
    metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS, "operation" => operation)
        .record(start.elapsed().as_secs_f64());
}

fn record_tokens(provider: &str, usage: &Usage) {
    metrics::counter!(telemetry::TOKENS_TOTAL,
        "provider" => provider.to_owned(),
        "direction" => "prompt",
    )
    .increment(u64::from(usage.prompt_tokens));
    metrics::counter!(telemetry::TOKENS_TOTAL,
        "provider" => provider.to_owned(),
        "direction" => "completion",
    )
    .increment(u64::from(usage.completion_tokens));
}
