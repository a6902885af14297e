// ABOUTME: Rollout stage marker types for the type state pattern.
// ABOUTME: Each stage only exposes the steps that are legal from it.

use crate::types::Color;

use super::state::DeploymentState;

/// Nothing requested yet.
/// Available actions: `introduce_standby()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Initialized;

/// Standby capacity requested; readiness not yet confirmed.
/// Available actions: `await_ready()`, `rollback()`
#[derive(Debug, Clone, Copy)]
pub struct StandbyScaling {
    pub target: Color,
}

/// Standby passed readiness.
/// Available actions: `shift_canary()`, `run_canary()`, `flip()`, `rollback()`
#[derive(Debug, Clone, Copy)]
pub struct StandbyReady {
    pub target: Color,
}

/// Traffic moved to the new color; the old one is draining.
/// Available actions: `retire()`, `rollback()`
#[derive(Debug, Clone, Copy)]
pub struct Flipped {
    pub previous: Color,
}

/// Old color retired.
/// Available actions: `finish()`
#[derive(Debug, Clone)]
pub struct Completed {
    pub state: DeploymentState,
}
