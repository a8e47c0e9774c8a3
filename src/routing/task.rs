//! Task categories, their profiles, and the selector that applies them.
//!
//! A profile narrows the eligible set before scoring (tool/vision support,
//! latency ceiling, minimum context) and names preferred providers that get
//! a small score bonus. Tool and vision requirements are never relaxed.
//! When no capable provider survives, the latency ceiling and then the
//! context minimum are dropped; see [`Relaxation`].

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::decision::Relaxation;
use crate::SwitchboardError;
use crate::error::Exclusion;
use crate::performance::PerformanceSnapshot;
use crate::providers::Provider;

/// Semantic label for the kind of work a request represents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    Planning,
    Execution,
    Reflection,
    Vision,
    Conversation,
    Reasoning,
    Coding,
    /// No hard requirements, no preferences.
    #[default]
    General,
}

impl TaskCategory {
    pub const ALL: [TaskCategory; 8] = [
        TaskCategory::Planning,
        TaskCategory::Execution,
        TaskCategory::Reflection,
        TaskCategory::Vision,
        TaskCategory::Conversation,
        TaskCategory::Reasoning,
        TaskCategory::Coding,
        TaskCategory::General,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskCategory::Planning => "planning",
            TaskCategory::Execution => "execution",
            TaskCategory::Reflection => "reflection",
            TaskCategory::Vision => "vision",
            TaskCategory::Conversation => "conversation",
            TaskCategory::Reasoning => "reasoning",
            TaskCategory::Coding => "coding",
            TaskCategory::General => "general",
        }
    }

    /// Parse a category name, mapping anything unrecognised to `General`.
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or(TaskCategory::General)
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskCategory {
    type Err = SwitchboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        TaskCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == lower)
            .ok_or_else(|| SwitchboardError::InvalidInput(format!("unknown task category '{s}'")))
    }
}

/// Preferences and hard requirements for one task category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProfile {
    /// Providers that receive the task-preference bonus.
    #[serde(default)]
    pub preferred: Vec<String>,
    /// Ceiling on tracked average latency (only once samples exist).
    #[serde(default)]
    pub max_latency_ms: Option<u64>,
    #[serde(default)]
    pub requires_tools: bool,
    #[serde(default)]
    pub requires_vision: bool,
    #[serde(default)]
    pub min_context_tokens: usize,
}

impl TaskProfile {
    fn new(preferred: &[&str]) -> Self {
        Self {
            preferred: preferred.iter().map(|p| p.to_string()).collect(),
            ..Self::default()
        }
    }

    fn latency(mut self, ms: u64) -> Self {
        self.max_latency_ms = Some(ms);
        self
    }

    fn tools(mut self) -> Self {
        self.requires_tools = true;
        self
    }

    fn vision(mut self) -> Self {
        self.requires_vision = true;
        self
    }

    fn min_context(mut self, tokens: usize) -> Self {
        self.min_context_tokens = tokens;
        self
    }

    pub fn prefers(&self, provider: &str) -> bool {
        self.preferred.iter().any(|p| p == provider)
    }
}

/// The task profile table. Read-only once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskProfiles {
    profiles: HashMap<TaskCategory, TaskProfile>,
    generic: TaskProfile,
}

impl Default for TaskProfiles {
    fn default() -> Self {
        use TaskCategory::*;
        let profiles = HashMap::from([
            (
                Planning,
                TaskProfile::new(&["groq", "ollama", "anthropic"])
                    .latency(1_000)
                    .tools(),
            ),
            (
                Execution,
                TaskProfile::new(&["groq", "anthropic", "gemini"])
                    .latency(2_000)
                    .tools(),
            ),
            (
                Reflection,
                TaskProfile::new(&["anthropic", "deepseek", "qwen"]).latency(5_000),
            ),
            (
                Vision,
                TaskProfile::new(&["gemini", "anthropic", "ollama"]).vision(),
            ),
            (
                Conversation,
                TaskProfile::new(&["ollama", "groq", "anthropic"]).latency(1_500),
            ),
            (
                Reasoning,
                TaskProfile::new(&["deepseek", "anthropic", "qwen"])
                    .latency(10_000)
                    .min_context(32_000),
            ),
            (
                Coding,
                TaskProfile::new(&["anthropic", "deepseek", "qwen"])
                    .latency(5_000)
                    .tools()
                    .min_context(16_000),
            ),
        ]);
        Self {
            profiles,
            generic: TaskProfile::default(),
        }
    }
}

impl TaskProfiles {
    /// A table with no profiles; every category uses the generic profile.
    pub fn empty() -> Self {
        Self {
            profiles: HashMap::new(),
            generic: TaskProfile::default(),
        }
    }

    /// Profile for `category`, or the generic one if none is defined.
    pub fn get(&self, category: TaskCategory) -> &TaskProfile {
        self.profiles.get(&category).unwrap_or(&self.generic)
    }

    /// Replace the profile for one category.
    pub fn set(&mut self, category: TaskCategory, profile: TaskProfile) {
        if category == TaskCategory::General {
            self.generic = profile;
        } else {
            self.profiles.insert(category, profile);
        }
    }

    pub fn with(mut self, category: TaskCategory, profile: TaskProfile) -> Self {
        self.set(category, profile);
        self
    }
}

/// A provider that passed the hard filters, with the snapshot it was judged on.
#[derive(Debug, Clone)]
pub struct Eligible {
    pub provider: Arc<Provider>,
    pub snapshot: PerformanceSnapshot,
}

/// Outcome of applying a task profile.
#[derive(Debug)]
pub struct Selection {
    pub candidates: Vec<Eligible>,
    pub relaxations: Vec<Relaxation>,
    /// Providers the final (possibly relaxed) profile dropped.
    pub exclusions: Vec<Exclusion>,
}

/// Narrows an eligible set by task profile, relaxing when nothing fits.
#[derive(Debug, Clone, Default)]
pub struct TaskSelector {
    profiles: TaskProfiles,
}

#[derive(Debug, Clone, Copy)]
struct Requirements {
    latency: bool,
    context: bool,
}

impl TaskSelector {
    pub fn new(profiles: TaskProfiles) -> Self {
        Self { profiles }
    }

    pub fn profiles(&self) -> &TaskProfiles {
        &self.profiles
    }

    pub fn profile(&self, category: TaskCategory) -> &TaskProfile {
        self.profiles.get(category)
    }

    /// Filter `eligible` by the profile for `category`.
    ///
    /// `eligible` must already satisfy every request-level requirement.
    /// The profile's tool and vision flags are applied as hard filters;
    /// only the latency ceiling and context minimum are relaxed, and only
    /// when they actually excluded a capable provider.
    pub fn candidates(&self, category: TaskCategory, eligible: Vec<Eligible>) -> Selection {
        let profile = self.profiles.get(category);
        let mut active = Requirements {
            latency: true,
            context: true,
        };
        let mut relaxations = Vec::new();

        loop {
            let (kept, dropped): (Vec<_>, Vec<_>) = eligible
                .iter()
                .map(|e| (e, profile_gap(profile, active, e)))
                .partition(|(_, gap)| gap.is_none());

            let capable: Vec<&Eligible> = eligible
                .iter()
                .filter(|e| capability_gap(profile, e).is_none())
                .collect();
            let step = if !kept.is_empty() || capable.is_empty() {
                None
            } else if active.latency && capable.iter().any(|e| latency_gap(profile, e).is_some()) {
                active.latency = false;
                Some(Relaxation::LatencyCeiling)
            } else if active.context && capable.iter().any(|e| context_gap(profile, e).is_some()) {
                active.context = false;
                Some(Relaxation::MinContext)
            } else {
                None
            };

            let Some(step) = step else {
                let exclusions = dropped
                    .into_iter()
                    .filter_map(|(e, gap)| gap.map(|g| Exclusion::new(e.provider.name(), g)))
                    .collect();
                let candidates = kept.into_iter().map(|(e, _)| e.clone()).collect();
                return Selection {
                    candidates,
                    relaxations,
                    exclusions,
                };
            };
            debug!(task = %category, relaxation = ?step, "relaxing task profile");
            relaxations.push(step);
        }
    }
}

/// First profile requirement `e` fails under `active`, if any.
fn profile_gap(profile: &TaskProfile, active: Requirements, e: &Eligible) -> Option<String> {
    capability_gap(profile, e)
        .or_else(|| active.latency.then(|| latency_gap(profile, e)).flatten())
        .or_else(|| active.context.then(|| context_gap(profile, e)).flatten())
}

fn capability_gap(profile: &TaskProfile, e: &Eligible) -> Option<String> {
    let caps = e.provider.capabilities();
    if profile.requires_tools && !caps.supports_tools {
        return Some("task profile requires tool calling".into());
    }
    if profile.requires_vision && !caps.supports_vision {
        return Some("task profile requires vision".into());
    }
    None
}

fn latency_gap(profile: &TaskProfile, e: &Eligible) -> Option<String> {
    let ceiling = profile.max_latency_ms?;
    (e.snapshot.has_samples() && e.snapshot.avg_latency_ms > ceiling as f64).then(|| {
        format!(
            "average latency {:.0}ms above task ceiling {ceiling}ms",
            e.snapshot.avg_latency_ms
        )
    })
}

fn context_gap(profile: &TaskProfile, e: &Eligible) -> Option<String> {
    let window = e.provider.capabilities().max_context_tokens;
    (window < profile.min_context_tokens).then(|| {
        format!(
            "context window {window} below task minimum {}",
            profile.min_context_tokens
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parsing() {
        assert_eq!("CODING".parse::<TaskCategory>().unwrap(), TaskCategory::Coding);
        assert!("poetry".parse::<TaskCategory>().is_err());
        assert_eq!(TaskCategory::parse_lenient("poetry"), TaskCategory::General);
        assert_eq!(TaskCategory::Vision.to_string(), "vision");
    }

    #[test]
    fn default_table_matches_expectations() {
        let profiles = TaskProfiles::default();
        let coding = profiles.get(TaskCategory::Coding);
        assert!(coding.requires_tools);
        assert_eq!(coding.min_context_tokens, 16_000);
        assert_eq!(coding.max_latency_ms, Some(5_000));

        let vision = profiles.get(TaskCategory::Vision);
        assert!(vision.requires_vision);
        assert_eq!(vision.max_latency_ms, None);

        assert_eq!(profiles.get(TaskCategory::Reasoning).min_context_tokens, 32_000);
        assert!(profiles.get(TaskCategory::Planning).prefers("groq"));
        assert_eq!(profiles.get(TaskCategory::General), &TaskProfile::default());
    }

    #[test]
    fn empty_table_falls_back_to_generic() {
        let profiles = TaskProfiles::empty();
        assert_eq!(profiles.get(TaskCategory::Coding), &TaskProfile::default());
    }
}
