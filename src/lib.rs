//! Switchboard - routing and dispatch core for LLM providers
//!
//! Given a request tagged with a task category and a routing policy,
//! Switchboard ranks the registered providers (cost, latency, quality,
//! locality, capability fit, tracked health), calls the best one, and falls
//! back down the ranking on failure. Every attempt feeds a bounded
//! per-provider performance history that shapes later decisions.
//!
//! # Example
//!
//! ```rust,no_run
//! use switchboard::{RouteRequest, RoutingPolicy, Switchboard, TaskCategory};
//! use switchboard::providers::{OllamaAdapter, OpenAiCompatibleAdapter, ProviderOptions};
//! use switchboard::types::{Pricing, ProviderCapabilities};
//!
//! #[tokio::main]
//! async fn main() -> switchboard::Result<()> {
//!     let board = Switchboard::builder()
//!         .provider(
//!             OpenAiCompatibleAdapter::new(
//!                 "groq",
//!                 "https://api.groq.com/openai/v1",
//!                 "llama-3.3-70b-versatile",
//!             )?
//!             .api_key("gsk-your-key"),
//!             ProviderOptions::new()
//!                 .capabilities(ProviderCapabilities::default().max_context_tokens(131_072).tools(true))
//!                 .pricing(Pricing::new(0.00059, 0.00079)),
//!         )
//!         .provider(
//!             OllamaAdapter::new("ollama", "http://localhost:11434", "llama3.2")?,
//!             ProviderOptions::new(),
//!         )
//!         .default_policy(RoutingPolicy::Balanced)
//!         .build()?;
//!
//!     let routed = board
//!         .generate(&RouteRequest::prompt("Outline the migration").task(TaskCategory::Planning))
//!         .await?;
//!
//!     println!(
//!         "{} (via {}, {}ms)",
//!         routed.content(),
//!         routed.provenance.provider,
//!         routed.provenance.latency_ms
//!     );
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod performance;
pub mod providers;
pub mod routing;
pub mod telemetry;
pub mod types;

// Re-export main types at crate root
pub use cache::{CacheConfig, ResponseCache};
pub use config::{Config, Secrets};
pub use error::{AttemptFailure, Exclusion, FailureKind, Result, SwitchboardError};
pub use gateway::{
    FallbackConfig, Provenance, ProviderStats, RouteRequest, RoutedResponse, RoutedStream,
    Switchboard, SwitchboardBuilder,
};
pub use performance::{PerformanceSnapshot, PerformanceTracker};
pub use providers::{Provider, ProviderAdapter, ProviderOptions, ProviderRegistry};
pub use routing::{
    RankedCandidate, Relaxation, RoutingConfig, RoutingDecision, RoutingPolicy, ScoringWeights,
    TaskCategory, TaskProfile, TaskProfiles,
};
