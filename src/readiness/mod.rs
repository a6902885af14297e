// ABOUTME: Readiness evaluator: decides from fresh observations whether a fleet can take traffic.
// ABOUTME: The decision itself is a pure function; observation goes through FleetOps.

mod summary;

pub use summary::{EnvironmentStatus, HealthSummary, InstanceCounts, TargetGroupStatus};

use futures::future::{try_join, try_join_all};
use serde::Serialize;
use std::fmt;

use crate::backend::{BackendError, FleetOps};
use crate::fleet::{
    Capacity, HealthStatus, Instance, LifecycleState, TargetGroup, TargetGroupSpec,
    TargetHealthState,
};
use crate::types::{Color, InstanceId, ResourceName};

/// Why a fleet is not ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum NotReadyReason {
    ZeroDesired,
    NoInstances,
    InstanceNotInService { instance: InstanceId },
    BelowDesired { have: usize, want: u32 },
    InstanceUnhealthy { instance: InstanceId },
    NotRegistered { instance: InstanceId, role: ResourceName },
    TargetUnhealthy { instance: InstanceId, role: ResourceName },
}

impl fmt::Display for NotReadyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotReadyReason::ZeroDesired => f.write_str("desired capacity is zero"),
            NotReadyReason::NoInstances => f.write_str("no instances"),
            NotReadyReason::InstanceNotInService { instance } => {
                write!(f, "instance {instance} is not in service")
            }
            NotReadyReason::BelowDesired { have, want } => {
                write!(f, "{have} of {want} desired instances in service")
            }
            NotReadyReason::InstanceUnhealthy { instance } => {
                write!(f, "instance {instance} is not healthy")
            }
            NotReadyReason::NotRegistered { instance, role } => {
                write!(f, "instance {instance} is not registered with {role}")
            }
            NotReadyReason::TargetUnhealthy { instance, role } => {
                write!(f, "instance {instance} is failing {role} health checks")
            }
        }
    }
}

/// Outcome of one readiness evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Readiness {
    pub color: Color,
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<NotReadyReason>,
}

impl Readiness {
    fn ready(color: Color) -> Self {
        Self {
            color,
            ready: true,
            reason: None,
        }
    }

    fn not_ready(color: Color, reason: NotReadyReason) -> Self {
        Self {
            color,
            ready: false,
            reason: Some(reason),
        }
    }
}

/// Everything readiness depends on, observed at one moment.
#[derive(Debug, Clone)]
pub struct FleetSnapshot {
    pub color: Color,
    pub capacity: Capacity,
    pub instances: Vec<Instance>,
    pub target_groups: Vec<TargetGroup>,
}

/// Decide whether a fleet is ready to receive traffic.
///
/// Ready means: desired capacity above zero, at least `desired` live
/// instances, and every live instance in service, healthy, and registered
/// (and not failing) in every target group of its color. Terminating
/// instances are ignored; a pending one blocks readiness.
pub fn evaluate(
    color: Color,
    capacity: Capacity,
    instances: &[Instance],
    target_groups: &[TargetGroup],
) -> Readiness {
    if capacity.desired == 0 {
        return Readiness::not_ready(color, NotReadyReason::ZeroDesired);
    }

    let live: Vec<&Instance> = instances
        .iter()
        .filter(|i| i.color == color && !i.is_terminating())
        .collect();

    if live.is_empty() {
        return Readiness::not_ready(color, NotReadyReason::NoInstances);
    }

    if let Some(pending) = live
        .iter()
        .find(|i| i.lifecycle_state != LifecycleState::InService)
    {
        return Readiness::not_ready(
            color,
            NotReadyReason::InstanceNotInService {
                instance: pending.id.clone(),
            },
        );
    }

    if live.len() < capacity.desired as usize {
        return Readiness::not_ready(
            color,
            NotReadyReason::BelowDesired {
                have: live.len(),
                want: capacity.desired,
            },
        );
    }

    if let Some(sick) = live.iter().find(|i| i.health != HealthStatus::Healthy) {
        return Readiness::not_ready(
            color,
            NotReadyReason::InstanceUnhealthy {
                instance: sick.id.clone(),
            },
        );
    }

    for group in target_groups.iter().filter(|g| g.key.color == color) {
        for instance in &live {
            if !group.is_registered(&instance.id) {
                return Readiness::not_ready(
                    color,
                    NotReadyReason::NotRegistered {
                        instance: instance.id.clone(),
                        role: group.key.role.clone(),
                    },
                );
            }
            let failing = group.targets.iter().any(|t| {
                t.instance == instance.id
                    && matches!(
                        t.state,
                        TargetHealthState::Unhealthy | TargetHealthState::Unavailable
                    )
            });
            if failing {
                return Readiness::not_ready(
                    color,
                    NotReadyReason::TargetUnhealthy {
                        instance: instance.id.clone(),
                        role: group.key.role.clone(),
                    },
                );
            }
        }
    }

    Readiness::ready(color)
}

impl FleetSnapshot {
    pub fn readiness(&self) -> Readiness {
        evaluate(
            self.color,
            self.capacity,
            &self.instances,
            &self.target_groups,
        )
    }
}

/// Observe one fleet: capacity, members, and every target group of its color.
pub async fn observe<F: FleetOps + ?Sized>(
    ops: &F,
    color: Color,
    specs: &[TargetGroupSpec],
) -> Result<FleetSnapshot, BackendError> {
    let (capacity, instances) = try_join(ops.capacity_of(color), ops.list_instances(color)).await?;

    let target_groups = try_join_all(specs.iter().map(|spec| async move {
        let targets = ops.target_group_health(&spec.role, color).await?;
        Ok::<_, BackendError>(TargetGroup::observed(spec, color, targets))
    }))
    .await?;

    Ok(FleetSnapshot {
        color,
        capacity,
        instances,
        target_groups,
    })
}

/// Fresh readiness for one color. Never cached.
pub async fn is_ready<F: FleetOps + ?Sized>(
    ops: &F,
    color: Color,
    specs: &[TargetGroupSpec],
) -> Result<Readiness, BackendError> {
    let snapshot = observe(ops, color, specs).await?;
    let readiness = snapshot.readiness();
    tracing::debug!(
        %color,
        ready = readiness.ready,
        reason = ?readiness.reason,
        "readiness evaluated"
    );
    Ok(readiness)
}
