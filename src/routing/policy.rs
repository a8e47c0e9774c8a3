//! Routing policies and the per-request constraints that travel with them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::SwitchboardError;
use crate::types::RequiredCapabilities;

/// How candidate providers are scored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingPolicy {
    /// Blend of cost, latency and quality.
    #[default]
    Balanced,
    CostOptimized,
    SpeedOptimized,
    QualityOptimized,
    /// Local providers only.
    OfflineOnly,
    /// Local first, then privacy-designated cloud.
    PrivacyFirst,
}

impl RoutingPolicy {
    pub const ALL: [RoutingPolicy; 6] = [
        RoutingPolicy::Balanced,
        RoutingPolicy::CostOptimized,
        RoutingPolicy::SpeedOptimized,
        RoutingPolicy::QualityOptimized,
        RoutingPolicy::OfflineOnly,
        RoutingPolicy::PrivacyFirst,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RoutingPolicy::Balanced => "balanced",
            RoutingPolicy::CostOptimized => "cost_optimized",
            RoutingPolicy::SpeedOptimized => "speed_optimized",
            RoutingPolicy::QualityOptimized => "quality_optimized",
            RoutingPolicy::OfflineOnly => "offline_only",
            RoutingPolicy::PrivacyFirst => "privacy_first",
        }
    }
}

impl fmt::Display for RoutingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoutingPolicy {
    type Err = SwitchboardError;

    /// Accepts the snake_case names plus short forms (`cost`, `speed`,
    /// `quality`, `offline`, `privacy`), case-insensitively, with `-` or `_`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        let policy = match normalized.as_str() {
            "balanced" => RoutingPolicy::Balanced,
            "cost_optimized" | "cost" => RoutingPolicy::CostOptimized,
            "speed_optimized" | "speed" => RoutingPolicy::SpeedOptimized,
            "quality_optimized" | "quality" => RoutingPolicy::QualityOptimized,
            "offline_only" | "offline" => RoutingPolicy::OfflineOnly,
            "privacy_first" | "privacy" => RoutingPolicy::PrivacyFirst,
            _ => {
                return Err(SwitchboardError::InvalidInput(format!(
                    "unknown routing policy '{s}'"
                )));
            }
        };
        Ok(policy)
    }
}

/// Policy plus the hard constraints a routing pass must honour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default)]
    pub policy: RoutingPolicy,
    /// Providers whose estimated request cost exceeds this (USD) are excluded.
    #[serde(default)]
    pub max_cost_per_request: Option<f64>,
    /// Providers whose tracked average exceeds this are excluded (once they
    /// have samples); also bounds each dispatch attempt.
    #[serde(default)]
    pub max_latency_ms: Option<u64>,
    /// Capabilities that are never relaxed.
    #[serde(default)]
    pub required: RequiredCapabilities,
    /// When non-empty, only these providers are considered.
    #[serde(default)]
    pub allow: Vec<String>,
    /// Never considered.
    #[serde(default)]
    pub deny: Vec<String>,
    /// `false` makes the first failure terminal.
    #[serde(default = "default_true")]
    pub fallback_enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            policy: RoutingPolicy::default(),
            max_cost_per_request: None,
            max_latency_ms: None,
            required: RequiredCapabilities::default(),
            allow: Vec::new(),
            deny: Vec::new(),
            fallback_enabled: true,
        }
    }
}

impl RoutingConfig {
    pub fn new(policy: RoutingPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn max_cost_per_request(mut self, usd: f64) -> Self {
        self.max_cost_per_request = Some(usd);
        self
    }

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

    pub fn fallback_enabled(mut self, enabled: bool) -> Self {
        self.fallback_enabled = enabled;
        self
    }
}
