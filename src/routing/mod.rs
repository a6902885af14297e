// ABOUTME: Routing reconciler: turns fleet state and the traffic split into listener rules.
// ABOUTME: Exports the rule types, the pure renderer, and the owned routing state.

mod render;
mod rules;
mod state;

pub use render::{RenderInput, render};
pub use rules::{FixedResponse, Redirect, RoutingRule, RoutingRules, RuleAction, WeightedTarget};
pub use state::{Drift, ReconcileOutcome, RoutingState};
