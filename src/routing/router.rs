//! One routing pass: hard filters, task profile, scoring, ordering.
//!
//! Routing is synchronous and CPU-only. It reads provider enabled flags
//! and tracker snapshots, so any number of passes can run concurrently
//! with each other and with in-flight dispatches.

use std::cmp::Ordering;

use tracing::{debug, info};

use super::decision::{RankedCandidate, RoutingDecision};
use super::policy::{RoutingConfig, RoutingPolicy};
use super::score::{ScoreContext, ScoringWeights, score};
use super::task::{Eligible, TaskCategory, TaskSelector};
use crate::error::Exclusion;
use crate::performance::{PerformanceSnapshot, PerformanceTracker};
use crate::providers::{DEFAULT_EXPECTED_OUTPUT_TOKENS, Provider, ProviderRegistry};
use crate::telemetry;
use crate::{Result, SwitchboardError};

/// What a routing pass needs to know about one request.
#[derive(Debug, Clone, Default)]
pub struct RoutingContext {
    pub task: TaskCategory,
    pub config: RoutingConfig,
    /// Estimated prompt size in tokens.
    pub estimated_tokens: usize,
    /// Expected completion size, for cost estimates.
    pub expected_output_tokens: Option<usize>,
}

impl RoutingContext {
    pub fn new(task: TaskCategory, config: RoutingConfig) -> Self {
        Self {
            task,
            config,
            ..Self::default()
        }
    }

    pub fn estimated_tokens(mut self, tokens: usize) -> Self {
        self.estimated_tokens = tokens;
        self
    }

    fn output_tokens(&self) -> usize {
        self.expected_output_tokens
            .unwrap_or(DEFAULT_EXPECTED_OUTPUT_TOKENS)
    }
}

/// Ranks providers for a request.
#[derive(Debug, Clone, Default)]
pub struct Router {
    weights: ScoringWeights,
    selector: TaskSelector,
}

impl Router {
    pub fn new(weights: ScoringWeights, selector: TaskSelector) -> Self {
        Self { weights, selector }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    pub fn selector(&self) -> &TaskSelector {
        &self.selector
    }

    /// Rank every usable provider for `context`.
    ///
    /// Returns `NoSuitableProvider` when no provider passes the hard
    /// filters and the task's capability requirements. The profile's
    /// latency ceiling and context minimum are relaxed before that happens.
    pub fn route(
        &self,
        registry: &ProviderRegistry,
        tracker: &PerformanceTracker,
        context: &RoutingContext,
    ) -> Result<RoutingDecision> {
        let mut exclusions = Vec::new();
        let mut eligible = Vec::new();
        for provider in registry.list_all() {
            let snapshot = tracker.snapshot(provider.name());
            match self.hard_filter(&provider, &snapshot, context) {
                Some(reason) => exclusions.push(Exclusion::new(provider.name(), reason)),
                None => eligible.push(Eligible { provider, snapshot }),
            }
        }

        let selection = self.selector.candidates(context.task, eligible);
        exclusions.extend(selection.exclusions);

        if selection.candidates.is_empty() {
            metrics::counter!(telemetry::NO_SUITABLE_PROVIDER_TOTAL, "task" => context.task.as_str())
                .increment(1);
            debug!(task = %context.task, ?exclusions, "no suitable provider");
            return Err(SwitchboardError::NoSuitableProvider {
                task: context.task,
                exclusions,
            });
        }

        let profile = self.selector.profile(context.task);
        let policy = context.config.policy;
        let mut candidates: Vec<RankedCandidate> = selection
            .candidates
            .into_iter()
            .map(|Eligible { provider, snapshot }| {
                let score_context = ScoreContext {
                    estimated_tokens: context.estimated_tokens,
                    preferred: profile.prefers(provider.name()),
                    quarantine_threshold: tracker.quarantine_threshold(),
                };
                let scored = score(policy, &provider, &snapshot, &score_context, &self.weights);
                RankedCandidate {
                    provider: provider.name().to_string(),
                    model: provider.model().to_string(),
                    score: scored.value,
                    reasoning: scored.reasoning,
                    priority: provider.priority(),
                    estimated_cost: provider
                        .estimate_cost(context.estimated_tokens, context.output_tokens()),
                    performance: snapshot,
                    handle: provider,
                }
            })
            .collect();
        candidates.sort_by(rank_order);

        let decision = RoutingDecision {
            task: context.task,
            policy,
            estimated_tokens: context.estimated_tokens,
            candidates,
            exclusions,
            relaxations: selection.relaxations,
        };
        if let Some(top) = decision.selected() {
            info!(
                task = %decision.task,
                policy = %policy,
                provider = %top.provider,
                score = top.score,
                reasoning = %top.reasoning,
                fallbacks = decision.candidates.len() - 1,
                "routing decision"
            );
        }
        Ok(decision)
    }

    /// Why `provider` may not serve this request at all, if it may not.
    fn hard_filter(
        &self,
        provider: &Provider,
        snapshot: &PerformanceSnapshot,
        context: &RoutingContext,
    ) -> Option<String> {
        let config = &context.config;
        let name = provider.name();

        if !provider.is_enabled() {
            return Some("disabled".into());
        }
        if config.deny.iter().any(|d| d == name) {
            return Some("denied by request".into());
        }
        if !config.allow.is_empty() && !config.allow.iter().any(|a| a == name) {
            return Some("not in allow list".into());
        }
        if config.policy == RoutingPolicy::OfflineOnly && !provider.deployment().is_local() {
            return Some("not local (offline only)".into());
        }
        if let Some(missing) = config.required.missing_from(provider.capabilities()) {
            return Some(format!("does not support {missing}"));
        }
        let window = provider.capabilities().max_context_tokens;
        if context.estimated_tokens > window {
            return Some(format!(
                "prompt (~{} tokens) exceeds context window {window}",
                context.estimated_tokens
            ));
        }
        if let Some(limit) = config.max_cost_per_request {
            let cost = provider.estimate_cost(context.estimated_tokens, context.output_tokens());
            if cost > limit {
                return Some(format!("estimated cost ${cost:.4} exceeds ${limit:.4}"));
            }
        }
        if let Some(limit) = config.max_latency_ms
            && snapshot.has_samples()
            && snapshot.avg_latency_ms > limit as f64
        {
            return Some(format!(
                "average latency {:.0}ms exceeds {limit}ms",
                snapshot.avg_latency_ms
            ));
        }
        None
    }
}

/// Score descending, then priority ascending, then name ascending.
fn rank_order(a: &RankedCandidate, b: &RankedCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.priority.cmp(&b.priority))
        .then_with(|| a.provider.cmp(&b.provider))
}
