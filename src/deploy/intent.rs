// ABOUTME: Operator intents accepted by the orchestrator.
// ABOUTME: Each intent maps to one guarded transition of the deployment state.

use std::fmt;
use std::time::Duration;

use crate::fleet::Capacity;
use crate::traffic::TrafficSplit;
use crate::types::Color;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Scale up `target` so it can take traffic.
    IntroduceStandby {
        target: Color,
        /// Defaults to the configured standby capacity.
        capacity: Option<Capacity>,
        /// Allow resizing the active color in place.
        override_active: bool,
        /// Label recorded against `target` (image tag, commit, ...).
        release: Option<String>,
    },
    /// Split default traffic between the colors.
    ShiftCanary { split: TrafficSplit },
    /// Make the standby color active.
    Flip,
    /// Scale the inactive color to zero once draining is over.
    Retire {
        /// Overrides the configured drain wait.
        drain: Option<Duration>,
    },
    Rollback,
}

impl Intent {
    pub fn introduce(target: Color) -> Self {
        Intent::IntroduceStandby {
            target,
            capacity: None,
            override_active: false,
            release: None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Intent::IntroduceStandby { .. } => "introduce-standby",
            Intent::ShiftCanary { .. } => "shift-canary",
            Intent::Flip => "flip",
            Intent::Retire { .. } => "retire",
            Intent::Rollback => "rollback",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::IntroduceStandby { target, .. } => write!(f, "introduce standby {target}"),
            Intent::ShiftCanary { split } => write!(f, "shift canary {split}"),
            Intent::Flip => f.write_str("flip"),
            Intent::Retire { .. } => f.write_str("retire"),
            Intent::Rollback => f.write_str("rollback"),
        }
    }
}
