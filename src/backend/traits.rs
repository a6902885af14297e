// ABOUTME: Capability traits for the external fleet manager and routing layer.
// ABOUTME: The orchestrator only ever talks to infrastructure through these.

use async_trait::async_trait;

use super::error::BackendError;
use super::sealed::Sealed;
use crate::fleet::{Capacity, Instance, TargetHealth};
use crate::lifecycle::LifecycleResult;
use crate::routing::RoutingRules;
use crate::types::{Color, InstanceId, LifecycleToken, ResourceName};

/// Operations on the fleet manager (auto-scaling groups and their hooks).
#[async_trait]
pub trait FleetOps: Sealed + Send + Sync {
    /// Submit capacity bounds. Idempotent; returns before convergence.
    async fn set_capacity(&self, color: Color, capacity: Capacity) -> Result<(), BackendError>;

    /// Currently configured bounds.
    async fn capacity_of(&self, color: Color) -> Result<Capacity, BackendError>;

    /// Members of a fleet, including pending and terminating ones.
    async fn list_instances(&self, color: Color) -> Result<Vec<Instance>, BackendError>;

    /// Protect (or unprotect) a fleet's instances from scale-in.
    async fn set_scale_in_protection(
        &self,
        color: Color,
        protected: bool,
    ) -> Result<(), BackendError>;

    /// Release or abandon an instance held at launch.
    async fn complete_lifecycle_action(
        &self,
        instance: &InstanceId,
        token: &LifecycleToken,
        result: LifecycleResult,
    ) -> Result<(), BackendError>;

    /// Per-target health for one target group.
    async fn target_group_health(
        &self,
        role: &ResourceName,
        color: Color,
    ) -> Result<Vec<TargetHealth>, BackendError>;
}

/// Operations on the routing layer (listener rules).
#[async_trait]
pub trait RoutingOps: Sealed + Send + Sync {
    /// Replace the listener's rules and default action in one operation.
    async fn apply_routing_rules(&self, rules: &RoutingRules) -> Result<(), BackendError>;

    /// Rules currently in effect, `None` if nothing was ever applied.
    async fn current_routing_rules(&self) -> Result<Option<RoutingRules>, BackendError>;
}

/// Everything the orchestrator needs from infrastructure.
pub trait Backend: FleetOps + RoutingOps {}

impl<T: FleetOps + RoutingOps> Backend for T {}
