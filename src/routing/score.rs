//! Additive provider scoring.
//!
//! A score is the sum of independent terms, each recorded in the reasoning
//! string so a ranking can be audited:
//!
//! | term | value |
//! |---|---|
//! | availability | `+base` unless quarantined |
//! | policy alignment | depends on the policy, see [`ScoringWeights`] |
//! | comfort | `+comfort_bonus` when the tracked average beats the policy threshold |
//! | quarantine | `-(flat + per_failure × (failures − threshold + 1))` |
//! | capacity | `-near_limit` at ≥90% of the window, `+headroom` above 2× the estimate |
//! | task preference | `+task_preference_bonus` |
//!
//! The total never drops below `score_floor`. Hard filters are applied
//! before scoring and are not part of this module.

use std::fmt::Write;

use serde::{Deserialize, Serialize};

use super::policy::RoutingPolicy;
use crate::performance::PerformanceSnapshot;
use crate::providers::Provider;
use crate::types::{CostClass, Deployment, LatencyClass, QualityTier};

/// Every tunable number used by [`score`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Availability bonus for non-quarantined providers.
    pub base: f64,
    /// Policy term values for the best..worst tier
    /// (COST, SPEED, QUALITY use the first three or four entries).
    pub tiers: [f64; 4],
    /// Maximum contribution of each BALANCED component.
    pub balanced_component: f64,
    /// OFFLINE_ONLY / PRIVACY_FIRST bonus for local providers.
    pub local_bonus: f64,
    /// PRIVACY_FIRST bonus for privacy-designated cloud providers.
    pub private_cloud_bonus: f64,
    pub comfort_bonus: f64,
    pub quarantine_flat: f64,
    pub quarantine_per_failure: f64,
    /// Fraction of the context window at which a request is "near the limit".
    pub near_limit_ratio: f64,
    pub near_limit_penalty: f64,
    /// Window larger than this multiple of the estimate earns the headroom bonus.
    pub headroom_factor: f64,
    pub headroom_bonus: f64,
    pub task_preference_bonus: f64,
    pub score_floor: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            base: 10.0,
            tiers: [20.0, 10.0, 5.0, 0.0],
            balanced_component: 10.0,
            local_bonus: 20.0,
            private_cloud_bonus: 10.0,
            comfort_bonus: 5.0,
            quarantine_flat: 30.0,
            quarantine_per_failure: 10.0,
            near_limit_ratio: 0.9,
            near_limit_penalty: 20.0,
            headroom_factor: 2.0,
            headroom_bonus: 5.0,
            task_preference_bonus: 3.0,
            score_floor: -100.0,
        }
    }
}

impl ScoringWeights {
    /// Average latency (ms) below which the comfort bonus applies.
    pub fn comfort_threshold_ms(&self, policy: RoutingPolicy) -> f64 {
        match policy {
            RoutingPolicy::Balanced => 1000.0,
            RoutingPolicy::SpeedOptimized => 500.0,
            _ => 2000.0,
        }
    }
}

/// Request-dependent inputs to [`score`].
#[derive(Debug, Clone, Copy)]
pub struct ScoreContext {
    /// Estimated prompt size in tokens.
    pub estimated_tokens: usize,
    /// Whether the task profile names this provider as preferred.
    pub preferred: bool,
    /// Consecutive failures at which quarantine starts.
    pub quarantine_threshold: u32,
}

/// A computed score with its audit trail.
#[derive(Debug, Clone, PartialEq)]
pub struct Score {
    pub value: f64,
    pub reasoning: String,
}

struct Tally {
    value: f64,
    reasoning: String,
}

impl Tally {
    fn add(&mut self, points: f64, label: &str) {
        if points == 0.0 {
            return;
        }
        self.value += points;
        if !self.reasoning.is_empty() {
            self.reasoning.push_str(", ");
        }
        let _ = write!(self.reasoning, "{label} {points:+.1}");
    }
}

fn cost_rank(class: CostClass) -> usize {
    match class {
        CostClass::Free => 0,
        CostClass::Low => 1,
        CostClass::Moderate => 2,
        CostClass::High => 3,
    }
}

fn latency_rank(class: LatencyClass) -> usize {
    match class {
        LatencyClass::VeryFast => 0,
        LatencyClass::Fast => 1,
        LatencyClass::Moderate => 2,
        LatencyClass::Slow => 3,
    }
}

fn quality_rank(tier: QualityTier) -> usize {
    match tier {
        QualityTier::Flagship => 0,
        QualityTier::Standard => 1,
        QualityTier::Compact => 2,
    }
}

/// Linear share of `max` for rank 0 (best) .. 3 (worst).
fn balanced_share(max: f64, rank: usize) -> f64 {
    max * (3 - rank.min(3)) as f64 / 3.0
}

/// Score one provider under `policy`.
pub fn score(
    policy: RoutingPolicy,
    provider: &Provider,
    snapshot: &PerformanceSnapshot,
    context: &ScoreContext,
    weights: &ScoringWeights,
) -> Score {
    let mut tally = Tally {
        value: 0.0,
        reasoning: String::new(),
    };

    let quarantined = snapshot.consecutive_failures >= context.quarantine_threshold;
    if !quarantined {
        tally.add(weights.base, "available");
    }

    let latency_class = snapshot.latency_class();
    match policy {
        RoutingPolicy::Balanced => {
            let max = weights.balanced_component;
            tally.add(
                balanced_share(max, cost_rank(provider.cost_class())),
                &format!("cost {:?}", provider.cost_class()),
            );
            tally.add(
                balanced_share(max, latency_rank(latency_class)),
                &format!("latency {latency_class:?}"),
            );
            tally.add(
                balanced_share(max, quality_rank(provider.quality())),
                &format!("quality {:?}", provider.quality()),
            );
        }
        RoutingPolicy::CostOptimized => {
            let class = provider.cost_class();
            tally.add(weights.tiers[cost_rank(class)], &format!("cost {class:?}"));
        }
        RoutingPolicy::SpeedOptimized => {
            tally.add(
                weights.tiers[latency_rank(latency_class)],
                &format!("latency {latency_class:?}"),
            );
        }
        RoutingPolicy::QualityOptimized => {
            let tier = provider.quality();
            tally.add(weights.tiers[quality_rank(tier)], &format!("quality {tier:?}"));
        }
        RoutingPolicy::OfflineOnly => {
            if provider.deployment().is_local() {
                tally.add(weights.local_bonus, "local");
            }
        }
        RoutingPolicy::PrivacyFirst => match provider.deployment() {
            Deployment::Local => tally.add(weights.local_bonus, "local"),
            Deployment::PrivateCloud => tally.add(weights.private_cloud_bonus, "private cloud"),
            Deployment::Cloud => {}
        },
    }

    if snapshot.has_samples() && snapshot.avg_latency_ms < weights.comfort_threshold_ms(policy) {
        tally.add(weights.comfort_bonus, "fast history");
    }

    if quarantined {
        let beyond = snapshot.consecutive_failures - context.quarantine_threshold + 1;
        let penalty = weights.quarantine_flat + weights.quarantine_per_failure * f64::from(beyond);
        tally.add(
            -penalty,
            &format!("quarantined ({} failures)", snapshot.consecutive_failures),
        );
    }

    let window = provider.capabilities().max_context_tokens as f64;
    let estimate = context.estimated_tokens as f64;
    if estimate >= window * weights.near_limit_ratio {
        tally.add(-weights.near_limit_penalty, "near context limit");
    } else if window > estimate * weights.headroom_factor {
        tally.add(weights.headroom_bonus, "context headroom");
    }

    if context.preferred {
        tally.add(weights.task_preference_bonus, "task preferred");
    }

    let mut value = tally.value;
    if value < weights.score_floor {
        value = weights.score_floor;
        tally.reasoning.push_str(", clamped to floor");
    }

    Score {
        value,
        reasoning: tally.reasoning,
    }
}
