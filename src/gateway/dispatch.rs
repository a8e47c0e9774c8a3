//! Fallback dispatch over a ranked candidate list.
//!
//! The dispatcher walks a [`RoutingDecision`] best-first, bounding each
//! attempt by a timeout and the caller's deadline. Every attempt outcome
//! is recorded in the [`PerformanceTracker`] except when the caller
//! cancels or its deadline expires, which end dispatch with
//! [`SwitchboardError::Cancelled`] and record nothing.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{AttemptFailure, FailureKind};
use crate::performance::PerformanceTracker;
use crate::providers::Provider;
use crate::routing::{RankedCandidate, RoutingConfig, RoutingDecision};
use crate::telemetry;
use crate::{Result, SwitchboardError};

/// How failed attempts move on to the next candidate.
///
/// ```rust
/// # use switchboard::FallbackConfig;
/// # use std::time::Duration;
/// let config = FallbackConfig::new()
///     .max_attempts(2)
///     .attempt_timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackConfig {
    /// Try further candidates after a failure. Default: true.
    pub enabled: bool,
    /// Maximum attempts per request, the first one included. Default: 3.
    pub max_attempts: u32,
    /// Per-attempt timeout when the request sets no latency ceiling.
    /// Default: 30s.
    pub attempt_timeout: Duration,
    /// Pause before the first fallback, doubled for each later one.
    /// Default: zero (fall through immediately).
    pub backoff: Duration,
    /// Cap on the doubled backoff. Default: 5s.
    pub max_backoff: Duration,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(30),
            backoff: Duration::ZERO,
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl FallbackConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single attempt, no fallback.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.backoff = initial;
        self.max_backoff = max;
        self
    }

    /// Pause before fallback number `fallback` (0-indexed).
    ///
    /// `backoff * 2^fallback`, capped at `max_backoff`. A `retry_after`
    /// hint from a rate-limited provider is ignored here, since the next
    /// attempt goes to a different provider.
    pub fn delay_for_attempt(&self, fallback: u32) -> Duration {
        self.backoff
            .saturating_mul(2u32.saturating_pow(fallback))
            .min(self.max_backoff)
    }

    /// Attempt budget for one request.
    pub(crate) fn attempt_budget(&self, routing: &RoutingConfig) -> usize {
        if self.enabled && routing.fallback_enabled {
            self.max_attempts.max(1) as usize
        } else {
            1
        }
    }
}

/// A successful dispatch and the path that led to it.
pub(crate) struct Dispatched<T> {
    pub value: T,
    pub candidate: RankedCandidate,
    pub latency: Duration,
    /// Providers tried, in order, the serving one last.
    pub path: Vec<String>,
    pub failures: Vec<AttemptFailure>,
}

pub(crate) struct Dispatcher<'a> {
    tracker: &'a PerformanceTracker,
    config: &'a FallbackConfig,
    operation: &'static str,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        tracker: &'a PerformanceTracker,
        config: &'a FallbackConfig,
        operation: &'static str,
    ) -> Self {
        Self {
            tracker,
            config,
            operation,
        }
    }

    /// Run `call` against candidates until one succeeds or the budget
    /// is spent.
    pub async fn run<T, F, Fut>(
        &self,
        decision: &RoutingDecision,
        routing: &RoutingConfig,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
        call: F,
    ) -> Result<Dispatched<T>>
    where
        F: Fn(Arc<Provider>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let budget = self.config.attempt_budget(routing);
        let ceiling = routing
            .max_latency_ms
            .map(Duration::from_millis)
            .unwrap_or(self.config.attempt_timeout);
        let attempts: Vec<&RankedCandidate> = decision.candidates.iter().take(budget).collect();

        let mut path = Vec::with_capacity(attempts.len());
        let mut failures = Vec::new();

        for (index, candidate) in attempts.iter().enumerate() {
            if index > 0 {
                let delay = self.config.delay_for_attempt(index as u32 - 1);
                if !delay.is_zero() {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(SwitchboardError::Cancelled),
                        _ = sleep_within(delay, deadline) => {}
                    }
                }
            }
            if cancel.is_cancelled() {
                return Err(SwitchboardError::Cancelled);
            }

            let started = Instant::now();
            let timeout = match deadline {
                Some(deadline) if started >= deadline => return Err(SwitchboardError::Cancelled),
                Some(deadline) => ceiling.min(deadline - started),
                None => ceiling,
            };

            path.push(candidate.provider.clone());
            debug!(
                provider = %candidate.provider,
                attempt = index + 1,
                budget = attempts.len(),
                timeout_ms = timeout.as_millis() as u64,
                "dispatching"
            );

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SwitchboardError::Cancelled),
                result = tokio::time::timeout(timeout, call(Arc::clone(candidate.handle()))) => result,
            };
            let elapsed = started.elapsed();

            let error = match outcome {
                Ok(Ok(value)) => {
                    self.tracker
                        .record_success(&candidate.provider, elapsed.as_secs_f64() * 1000.0);
                    self.record_attempt(&candidate.provider, "ok", elapsed);
                    return Ok(Dispatched {
                        value,
                        candidate: (*candidate).clone(),
                        latency: elapsed,
                        path,
                        failures,
                    });
                }
                Ok(Err(e)) => e,
                Err(_) if deadline.is_some_and(|d| Instant::now() >= d) => {
                    return Err(SwitchboardError::Cancelled);
                }
                Err(_) => SwitchboardError::Timeout(timeout),
            };

            self.tracker.record_failure(&candidate.provider);
            self.record_attempt(&candidate.provider, "error", elapsed);
            let failure =
                AttemptFailure::new(&candidate.provider, &candidate.model, &error, elapsed);

            if index + 1 < attempts.len() {
                metrics::counter!(telemetry::FALLBACKS_TOTAL,
                    "from" => candidate.provider.clone(),
                    "kind" => kind_label(&failure),
                )
                .increment(1);
                warn!(
                    provider = %candidate.provider,
                    attempt = index + 1,
                    error = %error,
                    next = %attempts[index + 1].provider,
                    "attempt failed, falling back"
                );
            } else {
                warn!(
                    provider = %candidate.provider,
                    attempt = index + 1,
                    error = %error,
                    "attempt failed, no fallback left"
                );
            }
            failures.push(failure);
        }

        Err(SwitchboardError::Exhausted { attempts: failures })
    }

    fn record_attempt(&self, provider: &str, status: &'static str, elapsed: Duration) {
        metrics::counter!(telemetry::ATTEMPTS_TOTAL,
            "provider" => provider.to_owned(),
            "operation" => self.operation,
            "status" => status,
        )
        .increment(1);
        metrics::histogram!(telemetry::ATTEMPT_DURATION_SECONDS,
            "provider" => provider.to_owned(),
            "operation" => self.operation,
        )
        .record(elapsed.as_secs_f64());
    }
}

fn kind_label(failure: &AttemptFailure) -> &'static str {
    match failure.kind {
        FailureKind::Transient => "transient",
        FailureKind::Permanent => "permanent",
    }
}

async fn sleep_within(delay: Duration, deadline: Option<Instant>) {
    let wake = Instant::now() + delay;
    let wake = deadline.map_or(wake, |d| wake.min(d));
    tokio::time::sleep_until(wake).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let config =
            FallbackConfig::new().backoff(Duration::from_millis(100), Duration::from_millis(300));
        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(300));
        assert_eq!(config.delay_for_attempt(30), Duration::from_millis(300));
    }

    #[test]
    fn default_backoff_is_immediate() {
        assert!(FallbackConfig::default().delay_for_attempt(3).is_zero());
    }

    #[test]
    fn budget_respects_both_switches() {
        let config = FallbackConfig::new().max_attempts(4);
        assert_eq!(config.attempt_budget(&RoutingConfig::default()), 4);
        assert_eq!(
            config.attempt_budget(&RoutingConfig::default().fallback_enabled(false)),
            1
        );
        assert_eq!(
            FallbackConfig::disabled().attempt_budget(&RoutingConfig::default()),
            1
        );
        assert_eq!(
            FallbackConfig::new()
                .max_attempts(0)
                .attempt_budget(&RoutingConfig::default()),
            1
        );
    }
}
