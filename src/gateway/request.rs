//! Caller-facing request type.

use std::time::Duration;

use serde::Serialize;

use crate::routing::{RoutingConfig, RoutingContext, RoutingPolicy, TaskCategory};
use crate::types::{
    GenerateOptions, GenerateRequest, Message, RequiredCapabilities, ToolDefinition,
    estimate_tokens,
};

/// A request to route and generate.
///
/// Unset fields fall back to the [`Switchboard`](crate::Switchboard)
/// defaults. Capabilities implied by the request itself (tools attached,
/// image content, JSON mode, streaming) are always required, on top of
/// anything set with [`require`](Self::require).
///
/// ```rust
/// # use switchboard::{RouteRequest, RoutingPolicy, TaskCategory};
/// # use switchboard::types::Message;
/// let request = RouteRequest::new(vec![Message::user("Refactor this function")])
///     .task(TaskCategory::Coding)
///     .policy(RoutingPolicy::QualityOptimized)
///     .max_cost(0.05);
/// ```
#[derive(Debug, Clone, Default, Serialize)]
pub struct RouteRequest {
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    pub options: GenerateOptions,
    /// Task category; `General` when unset.
    pub task: Option<TaskCategory>,
    pub policy: Option<RoutingPolicy>,
    pub max_cost_per_request: Option<f64>,
    pub max_latency_ms: Option<u64>,
    pub required: RequiredCapabilities,
    pub allow: Vec<String>,
    pub deny: Vec<String>,
    /// Per-request fallback switch; the gateway setting applies when unset.
    pub fallback_enabled: Option<bool>,
    /// Overrides the character-based prompt size estimate.
    pub estimated_tokens: Option<usize>,
    /// Overall time budget, measured from the start of dispatch.
    #[serde(skip)]
    pub deadline: Option<Duration>,
    /// Skip the response cache for this request.
    #[serde(skip)]
    pub bypass_cache: bool,
}

impl RouteRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    /// Single user message.
    pub fn prompt(text: impl Into<String>) -> Self {
        Self::new(vec![Message::user(text)])
    }

    pub fn task(mut self, task: TaskCategory) -> Self {
        self.task = Some(task);
        self
    }

    pub fn policy(mut self, policy: RoutingPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }

    /// Upper bound on the estimated cost in USD.
    pub fn max_cost(mut self, usd: f64) -> Self {
        self.max_cost_per_request = Some(usd);
        self
    }

    /// Latency ceiling. Excludes providers whose tracked average exceeds
    /// it, and bounds each attempt.
    pub fn max_latency_ms(mut self, ms: u64) -> Self {
        self.max_latency_ms = Some(ms);
        self
    }

    pub fn require(mut self, required: RequiredCapabilities) -> Self {
        self.required = required;
        self
    }

    pub fn allow(mut self, provider: impl Into<String>) -> Self {
        self.allow.push(provider.into());
        self
    }

    pub fn deny(mut self, provider: impl Into<String>) -> Self {
        self.deny.push(provider.into());
        self
    }

    pub fn fallback(mut self, enabled: bool) -> Self {
        self.fallback_enabled = Some(enabled);
        self
    }

    pub fn estimated_tokens(mut self, tokens: usize) -> Self {
        self.estimated_tokens = Some(tokens);
        self
    }

    pub fn deadline(mut self, budget: Duration) -> Self {
        self.deadline = Some(budget);
        self
    }

    pub fn bypass_cache(mut self) -> Self {
        self.bypass_cache = true;
        self
    }

    pub fn task_or_default(&self) -> TaskCategory {
        self.task.unwrap_or_default()
    }

    /// Explicit requirements plus whatever the request content implies.
    pub fn required_capabilities(&self, streaming: bool) -> RequiredCapabilities {
        RequiredCapabilities {
            tools: self.required.tools || !self.tools.is_empty(),
            vision: self.required.vision || self.messages.iter().any(|m| m.content.has_images()),
            streaming: self.required.streaming || streaming,
            json_mode: self.required.json_mode || self.options.json_mode,
        }
    }

    /// Merge this request over the gateway defaults.
    pub(crate) fn routing_context(&self, defaults: &RoutingConfig, streaming: bool) -> RoutingContext {
        // A request allow list narrows the default one; deny lists add up.
        let allow = if self.allow.is_empty() {
            defaults.allow.clone()
        } else {
            self.allow.clone()
        };
        let mut deny = defaults.deny.clone();
        deny.extend(self.deny.iter().cloned());

        let config = RoutingConfig {
            policy: self.policy.unwrap_or(defaults.policy),
            max_cost_per_request: self.max_cost_per_request.or(defaults.max_cost_per_request),
            max_latency_ms: self.max_latency_ms.or(defaults.max_latency_ms),
            required: self.required_capabilities(streaming),
            allow,
            deny,
            fallback_enabled: self.fallback_enabled.unwrap_or(defaults.fallback_enabled),
        };

        RoutingContext {
            task: self.task_or_default(),
            config,
            estimated_tokens: self
                .estimated_tokens
                .unwrap_or_else(|| estimate_tokens(&self.messages)),
            expected_output_tokens: self.options.max_tokens,
        }
    }

    /// What each adapter receives.
    pub(crate) fn to_generate_request(&self) -> GenerateRequest {
        GenerateRequest {
            messages: self.messages.clone(),
            tools: self.tools.clone(),
            options: self.options.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    #[test]
    fn content_implies_capabilities() {
        let request = RouteRequest::new(vec![Message::user_with_image(
            "what is this",
            "https://example.com/cat.png",
        )])
        .tools(vec![ToolDefinition::new(
            "lookup",
            "look something up",
            serde_json::json!({"type": "object"}),
        )])
        .options(GenerateOptions::new().json_mode(true));

        let required = request.required_capabilities(true);
        assert!(required.tools);
        assert!(required.vision);
        assert!(required.streaming);
        assert!(required.json_mode);

        let plain = RouteRequest::prompt("hi").required_capabilities(false);
        assert_eq!(plain, RequiredCapabilities::default());
    }

    #[test]
    fn request_overrides_defaults() {
        let defaults = RoutingConfig::new(RoutingPolicy::CostOptimized)
            .max_cost_per_request(1.0)
            .deny("flaky");
        let context = RouteRequest::prompt("hi")
            .policy(RoutingPolicy::SpeedOptimized)
            .deny("slow")
            .fallback(false)
            .estimated_tokens(42)
            .routing_context(&defaults, false);

        assert_eq!(context.task, TaskCategory::General);
        assert_eq!(context.config.policy, RoutingPolicy::SpeedOptimized);
        assert_eq!(context.config.max_cost_per_request, Some(1.0));
        assert_eq!(context.config.deny, vec!["flaky", "slow"]);
        assert!(!context.config.fallback_enabled);
        assert_eq!(context.estimated_tokens, 42);
    }

    #[test]
    fn request_allow_list_replaces_default() {
        let defaults = RoutingConfig::default().allow("a").allow("b");
        let inherited = RouteRequest::prompt("hi").routing_context(&defaults, false);
        assert_eq!(inherited.config.allow, vec!["a", "b"]);

        let narrowed = RouteRequest::prompt("hi")
            .allow("b")
            .routing_context(&defaults, false);
        assert_eq!(narrowed.config.allow, vec!["b"]);
    }
}
