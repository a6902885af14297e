// ABOUTME: Persisted deployment state: active color, traffic split, and phase bookkeeping.
// ABOUTME: Mutated only by the orchestrator; never reconstructed from observation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::traffic::TrafficSplit;
use crate::types::{Color, PerColor};

/// Where the deployment is in the blue/green cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// One color serves everything; nothing in flight.
    Stable(Color),
    /// Standby capacity requested, waiting on the fleet manager.
    StandbyScaling,
    /// Standby has capacity; it may or may not be ready yet.
    AwaitingReadiness,
    /// Default traffic split between colors; the value is the standby weight.
    Canary(u32),
    /// Traffic cut over; the old color drains at zero weight.
    Flipping,
    /// Old color being scaled to zero.
    Retiring,
    RolledBack,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Stable(color) => write!(f, "stable ({color})"),
            Phase::StandbyScaling => f.write_str("standby scaling"),
            Phase::AwaitingReadiness => f.write_str("awaiting readiness"),
            Phase::Canary(weight) => write!(f, "canary ({weight}%)"),
            Phase::Flipping => f.write_str("flipped, draining"),
            Phase::Retiring => f.write_str("retiring"),
            Phase::RolledBack => f.write_str("rolled back"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentState {
    pub active_color: Color,

    /// Empty means all default traffic to `active_color`.
    #[serde(default)]
    pub traffic_split: TrafficSplit,

    /// Protect colors carrying traffic from scale-in.
    pub instance_protection_enabled: bool,

    pub phase: Phase,

    /// Color to return to on rollback; set by a flip.
    #[serde(default)]
    pub previous_active: Option<Color>,

    /// Start of the drain wait for `previous_active`.
    #[serde(default)]
    pub flipped_at: Option<DateTime<Utc>>,

    /// Release label deployed on each color, if one was given.
    #[serde(default)]
    pub releases: PerColor<Option<String>>,

    /// Bumped on every applied transition.
    pub version: u64,

    pub updated_at: DateTime<Utc>,
}

impl DeploymentState {
    /// State before any transition: `active` takes all traffic.
    pub fn initial(active: Color, instance_protection_enabled: bool) -> Self {
        Self {
            active_color: active,
            traffic_split: TrafficSplit::empty(),
            instance_protection_enabled,
            phase: Phase::Stable(active),
            previous_active: None,
            flipped_at: None,
            releases: PerColor::default(),
            version: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn standby_color(&self) -> Color {
        self.active_color.other()
    }

    /// Effective share of default traffic for `color`.
    pub fn weight_of(&self, color: Color) -> u32 {
        self.traffic_split.weight_of(color, self.active_color)
    }

    /// Color kept routable at zero weight until it is retired.
    pub fn draining_color(&self) -> Option<Color> {
        match self.phase {
            Phase::Flipping | Phase::RolledBack => self
                .previous_active
                .filter(|c| *c != self.active_color && self.flipped_at.is_some()),
            _ => None,
        }
    }

    /// Whether `color` should currently be protected from scale-in.
    pub fn wants_protection(&self, color: Color) -> bool {
        self.instance_protection_enabled && self.weight_of(color) > 0
    }

    pub fn active_release(&self) -> Option<&str> {
        self.releases.get(self.active_color).as_deref()
    }
}
