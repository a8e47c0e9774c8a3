//! Provider selection.
//!
//! ```text
//! registry + tracker
//!        │
//!        ▼
//!   hard filters ──► exclusions (disabled, allow/deny, capabilities,
//!        │                         context, cost, latency)
//!        ▼
//!   task profile  ──► relaxations when nothing fits
//!        │
//!        ▼
//!   score + sort  ──► RoutingDecision (best first)
//! ```

mod decision;
mod policy;
mod router;
mod score;
mod task;

pub use decision::{RankedCandidate, Relaxation, RoutingDecision};
pub use policy::{RoutingConfig, RoutingPolicy};
pub use router::{Router, RoutingContext};
pub use score::{Score, ScoreContext, ScoringWeights, score};
pub use task::{Eligible, Selection, TaskCategory, TaskProfile, TaskProfiles, TaskSelector};
