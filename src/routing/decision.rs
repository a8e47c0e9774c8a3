//! The output of one routing pass.

use std::sync::Arc;

use serde::Serialize;

use super::policy::RoutingPolicy;
use super::task::TaskCategory;
use crate::error::Exclusion;
use crate::performance::PerformanceSnapshot;
use crate::providers::Provider;

/// A task-profile requirement dropped because it excluded every provider
/// that could otherwise serve the task.
///
/// Tool and vision requirements never appear here: a task that needs them
/// fails with `NoSuitableProvider` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Relaxation {
    LatencyCeiling,
    MinContext,
}

/// One scored candidate.
#[derive(Debug, Clone, Serialize)]
pub struct RankedCandidate {
    pub provider: String,
    pub model: String,
    pub score: f64,
    /// Human-readable breakdown of every scoring term applied.
    pub reasoning: String,
    pub priority: u32,
    pub estimated_cost: f64,
    pub performance: PerformanceSnapshot,
    #[serde(skip)]
    pub(crate) handle: Arc<Provider>,
}

impl RankedCandidate {
    pub fn handle(&self) -> &Arc<Provider> {
        &self.handle
    }
}

/// Ranked candidates for one request, best first.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingDecision {
    pub task: TaskCategory,
    pub policy: RoutingPolicy,
    pub estimated_tokens: usize,
    pub candidates: Vec<RankedCandidate>,
    /// Providers removed by hard filters or the task profile.
    pub exclusions: Vec<Exclusion>,
    pub relaxations: Vec<Relaxation>,
}

impl RoutingDecision {
    /// The top-ranked candidate.
    pub fn selected(&self) -> Option<&RankedCandidate> {
        self.candidates.first()
    }

    /// Provider names in the order they would be attempted.
    pub fn fallback_order(&self) -> Vec<&str> {
        self.candidates.iter().map(|c| c.provider.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}
