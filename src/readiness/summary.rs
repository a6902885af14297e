// ABOUTME: Operator-facing health summaries per target group and per color.
// ABOUTME: Classifies registered target states the way the status view reports them.

use serde::Serialize;
use std::fmt;

use super::{FleetSnapshot, Readiness};
use crate::fleet::{Capacity, Instance, LifecycleState, TargetGroupKey, TargetHealth, TargetHealthState};
use crate::types::Color;

/// Aggregate state of one target group's targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthSummary {
    /// Every target healthy and routed.
    ReceivingTraffic,
    /// Every target healthy but the group gets no traffic.
    Standby,
    /// Some targets still running their first checks.
    Initializing,
    /// Some targets failing checks.
    Failing,
    NoTargets,
    Mixed,
}

impl HealthSummary {
    /// Classify a target listing. Failing wins over initializing.
    pub fn classify(targets: &[TargetHealth]) -> Self {
        if targets.is_empty() {
            return HealthSummary::NoTargets;
        }
        let all = |state: TargetHealthState| targets.iter().all(|t| t.state == state);
        let any = |state: TargetHealthState| targets.iter().any(|t| t.state == state);

        if all(TargetHealthState::Healthy) {
            HealthSummary::ReceivingTraffic
        } else if all(TargetHealthState::Unused) {
            HealthSummary::Standby
        } else if any(TargetHealthState::Unhealthy) {
            HealthSummary::Failing
        } else if any(TargetHealthState::Initial) {
            HealthSummary::Initializing
        } else {
            HealthSummary::Mixed
        }
    }
}

impl fmt::Display for HealthSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            HealthSummary::ReceivingTraffic => "healthy, receiving traffic",
            HealthSummary::Standby => "healthy, not receiving traffic",
            HealthSummary::Initializing => "initializing",
            HealthSummary::Failing => "failing health checks",
            HealthSummary::NoTargets => "no targets",
            HealthSummary::Mixed => "mixed",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetGroupStatus {
    pub target_group: TargetGroupKey,
    pub summary: HealthSummary,
    pub healthy: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InstanceCounts {
    pub pending: usize,
    pub in_service: usize,
    pub terminating: usize,
}

impl InstanceCounts {
    pub fn tally(instances: &[Instance]) -> Self {
        let mut counts = InstanceCounts::default();
        for instance in instances {
            match instance.lifecycle_state {
                LifecycleState::Pending => counts.pending += 1,
                LifecycleState::InService => counts.in_service += 1,
                LifecycleState::Terminating => counts.terminating += 1,
            }
        }
        counts
    }
}

/// Everything `status` shows for one color.
#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentStatus {
    pub color: Color,
    pub active: bool,
    pub weight: u32,
    pub capacity: Capacity,
    pub instances: InstanceCounts,
    pub readiness: Readiness,
    pub target_groups: Vec<TargetGroupStatus>,
    #[serde(skip)]
    pub members: Vec<Instance>,
}

impl EnvironmentStatus {
    pub fn from_snapshot(snapshot: FleetSnapshot, active: bool, weight: u32) -> Self {
        let readiness = snapshot.readiness();
        let target_groups = snapshot
            .target_groups
            .iter()
            .map(|group| TargetGroupStatus {
                target_group: group.key.clone(),
                summary: HealthSummary::classify(&group.targets),
                healthy: group
                    .targets
                    .iter()
                    .filter(|t| {
                        matches!(
                            t.state,
                            TargetHealthState::Healthy | TargetHealthState::Unused
                        )
                    })
                    .count(),
                total: group.targets.len(),
            })
            .collect();

        Self {
            color: snapshot.color,
            active,
            weight,
            capacity: snapshot.capacity,
            instances: InstanceCounts::tally(&snapshot.instances),
            readiness,
            target_groups,
            members: snapshot.instances,
        }
    }
}
