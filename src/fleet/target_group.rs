// ABOUTME: Target groups: one per (logical role x color).
// ABOUTME: Default groups take catch-all traffic; scoped groups match on path or host.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::config::HealthCheckSpec;
use crate::types::{Color, InstanceId, ResourceName};

/// Path/host conditions that restrict which requests reach a role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteMatch {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,
}

impl RouteMatch {
    /// No conditions: the role receives whatever no other rule matched.
    pub fn is_catch_all(&self) -> bool {
        self.paths.is_empty() && self.hosts.is_empty()
    }
}

/// Static description of a logical role, shared by both colors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetGroupSpec {
    pub role: ResourceName,
    pub route: RouteMatch,
    /// Rule priority for scoped roles (lower is evaluated first).
    pub priority: Option<u32>,
    pub health_check: HealthCheckSpec,
}

impl TargetGroupSpec {
    /// Scoped roles have path/host restrictions and are never canaried.
    pub fn is_scoped(&self) -> bool {
        !self.route.is_catch_all()
    }

    pub fn key(&self, color: Color) -> TargetGroupKey {
        TargetGroupKey {
            role: self.role.clone(),
            color,
        }
    }
}

/// Identity of a concrete target group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetGroupKey {
    pub role: ResourceName,
    pub color: Color,
}

impl fmt::Display for TargetGroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.role, self.color)
    }
}

/// Load balancer view of a single registered target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetHealthState {
    /// Registered, first health checks still running.
    Initial,
    Healthy,
    Unhealthy,
    /// Healthy but the group receives no traffic.
    Unused,
    /// Being deregistered.
    Draining,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetHealth {
    pub instance: InstanceId,
    pub state: TargetHealthState,
}

/// A target group as observed at one moment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetGroup {
    pub key: TargetGroupKey,
    pub health_check: HealthCheckSpec,
    pub registered: BTreeSet<InstanceId>,
    pub targets: Vec<TargetHealth>,
}

impl TargetGroup {
    /// Build an observation from the load balancer's target health listing.
    /// Draining targets no longer count as registered.
    pub fn observed(spec: &TargetGroupSpec, color: Color, targets: Vec<TargetHealth>) -> Self {
        let registered = targets
            .iter()
            .filter(|t| t.state != TargetHealthState::Draining)
            .map(|t| t.instance.clone())
            .collect();
        Self {
            key: spec.key(color),
            health_check: spec.health_check.clone(),
            registered,
            targets,
        }
    }

    pub fn is_registered(&self, instance: &InstanceId) -> bool {
        self.registered.contains(instance)
    }
}
