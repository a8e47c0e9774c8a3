//! Telemetry metric name constants.
//!
//! Centralised metric names for switchboard operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `switchboard_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `provider`: provider name (e.g. "groq", "ollama")
//! - `operation`: "generate" or "generate_stream"
//! - `status`: outcome: "ok" or "error"
//! - `kind`: attempt failure class: "transient" or "permanent"
//! - `direction`: token direction: "prompt" or "completion"

/// Routed requests, one per call to `generate`/`generate_stream`.
///
/// Labels: `provider` (serving provider, or "none"), `operation`, `status`.
pub const REQUESTS_TOTAL: &str = "switchboard_requests_total";

/// End-to-end routed request duration in seconds, fallbacks included.
///
/// Labels: `operation`.
pub const REQUEST_DURATION_SECONDS: &str = "switchboard_request_duration_seconds";

/// Individual dispatch attempts against one provider.
///
/// Labels: `provider`, `operation`, `status`.
pub const ATTEMPTS_TOTAL: &str = "switchboard_attempts_total";

/// Duration of a single dispatch attempt in seconds.
///
/// Labels: `provider`, `operation`.
pub const ATTEMPT_DURATION_SECONDS: &str = "switchboard_attempt_duration_seconds";

/// Fallbacks taken after a failed attempt.
///
/// Labels: `from` (failed provider), `kind`.
pub const FALLBACKS_TOTAL: &str = "switchboard_fallbacks_total";

/// Providers crossing into quarantine.
///
/// Labels: `provider`.
pub const QUARANTINED_TOTAL: &str = "switchboard_quarantined_total";

/// Routing passes that found no eligible provider.
///
/// Labels: `task`.
pub const NO_SUITABLE_PROVIDER_TOTAL: &str = "switchboard_no_suitable_provider_total";

/// Total tokens consumed.
///
/// Labels: `provider`, `direction` ("prompt" | "completion").
pub const TOKENS_TOTAL: &str = "switchboard_tokens_total";

/// Response cache hits.
///
/// Labels: `operation`.
pub const CACHE_HITS_TOTAL: &str = "switchboard_cache_hits_total";

/// Response cache misses.
///
/// Labels: `operation`.
pub const CACHE_MISSES_TOTAL: &str = "switchboard_cache_misses_total";
