// ABOUTME: In-process fleet manager and routing layer for dry runs and tests.
// ABOUTME: Simulates scaling, launch holds, target health, and listener rules.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};

use super::error::{BackendError, ExternalSystem};
use super::sealed::Sealed;
use super::traits::{FleetOps, RoutingOps};
use crate::config::Config;
use crate::fleet::{
    Capacity, HealthStatus, Instance, LifecycleState, TargetGroupKey, TargetHealth,
    TargetHealthState,
};
use crate::lifecycle::LifecycleResult;
use crate::routing::RoutingRules;
use crate::types::{Color, InstanceId, LifecycleToken, PerColor, ResourceName};

/// How the simulated fleet manager reacts to capacity changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LaunchMode {
    /// New instances come up in service and healthy.
    #[default]
    Immediate,
    /// New instances are held pending until a lifecycle action completes.
    Held,
    /// Capacity is recorded but membership only changes through the helpers.
    Manual,
}

/// A recorded lifecycle completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleCompletion {
    pub instance: InstanceId,
    pub token: LifecycleToken,
    pub result: LifecycleResult,
}

#[derive(Debug)]
struct MemoryState {
    launch_mode: LaunchMode,
    capacity: PerColor<Capacity>,
    protection: PerColor<bool>,
    instances: PerColor<BTreeMap<u64, Instance>>,
    next_seq: u64,
    roles: Vec<ResourceName>,
    deregistered: HashSet<(ResourceName, InstanceId)>,
    rules: Option<RoutingRules>,
    routing_applies: usize,
    capacity_requests: Vec<(Color, Capacity)>,
    completions: Vec<LifecycleCompletion>,
    fleet_down: bool,
    routing_down: bool,
    protection_rejected: bool,
}

impl MemoryState {
    fn launch(&mut self, color: Color, state: LifecycleState) -> InstanceId {
        let seq = self.next_seq;
        self.next_seq += 1;
        let id = InstanceId::new(format!("i-{color}-{seq:04}"));
        let health = match state {
            LifecycleState::InService => HealthStatus::Healthy,
            _ => HealthStatus::Unknown,
        };
        let instance = Instance {
            id: id.clone(),
            color,
            lifecycle_state: state,
            health,
            lifecycle_token: None,
            launched_at: Some(Utc::now()),
        };
        self.instances.get_mut(color).insert(seq, instance);
        id
    }

    fn converge(&mut self, color: Color) {
        let launch_state = match self.launch_mode {
            LaunchMode::Manual => return,
            LaunchMode::Immediate => LifecycleState::InService,
            LaunchMode::Held => LifecycleState::Pending,
        };
        let desired = self.capacity.get(color).desired as usize;
        let live = self
            .instances
            .get(color)
            .values()
            .filter(|i| !i.is_terminating())
            .count();

        for _ in live..desired {
            self.launch(color, launch_state);
        }

        if live > desired && !*self.protection.get(color) {
            // Scale in newest first.
            let excess = live - desired;
            let victims: Vec<u64> = self
                .instances
                .get(color)
                .iter()
                .rev()
                .filter(|(_, i)| !i.is_terminating())
                .take(excess)
                .map(|(seq, _)| *seq)
                .collect();
            let fleet = self.instances.get_mut(color);
            for seq in victims {
                fleet.remove(&seq);
            }
        }
    }

    fn find_key(&self, id: &InstanceId) -> Option<(Color, u64)> {
        Color::ALL.into_iter().find_map(|color| {
            self.instances
                .get(color)
                .iter()
                .find(|(_, i)| &i.id == id)
                .map(|(seq, _)| (color, *seq))
        })
    }

    fn find_mut(&mut self, id: &InstanceId) -> Option<&mut Instance> {
        let (color, seq) = self.find_key(id)?;
        self.instances.get_mut(color).get_mut(&seq)
    }

    fn check_fleet(&self) -> Result<(), BackendError> {
        if self.fleet_down {
            return Err(BackendError::unreachable(
                ExternalSystem::FleetManager,
                "simulated outage",
            ));
        }
        Ok(())
    }

    fn check_routing(&self) -> Result<(), BackendError> {
        if self.routing_down {
            return Err(BackendError::unreachable(
                ExternalSystem::RoutingLayer,
                "simulated outage",
            ));
        }
        Ok(())
    }
}

/// Simulated fleet manager and routing layer.
#[derive(Debug)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    /// Fleets start at `capacities` with serving instances; no rules are applied.
    pub fn new(capacities: PerColor<Capacity>, roles: Vec<ResourceName>) -> Self {
        let mut state = MemoryState {
            launch_mode: LaunchMode::Immediate,
            capacity: capacities,
            protection: PerColor::default(),
            instances: PerColor::default(),
            next_seq: 1,
            roles,
            deregistered: HashSet::new(),
            rules: None,
            routing_applies: 0,
            capacity_requests: Vec::new(),
            completions: Vec::new(),
            fleet_down: false,
            routing_down: false,
            protection_rejected: false,
        };
        for color in Color::ALL {
            state.converge(color);
        }
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let roles = config.target_groups.iter().map(|g| g.role.clone()).collect();
        Self::new(config.fleets, roles)
    }

    pub fn with_launch_mode(self, mode: LaunchMode) -> Self {
        self.state.lock().launch_mode = mode;
        self
    }

    pub fn set_launch_mode(&self, mode: LaunchMode) {
        self.state.lock().launch_mode = mode;
    }

    /// Snapshot of a fleet's members in launch order.
    pub fn instances(&self, color: Color) -> Vec<Instance> {
        self.state.lock().instances.get(color).values().cloned().collect()
    }

    /// Add a member directly, bypassing capacity.
    pub fn add_instance(&self, instance: Instance) {
        let mut state = self.state.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.instances.get_mut(instance.color).insert(seq, instance);
    }

    /// Launch a held instance in `color`, as a scale-out would.
    pub fn launch_pending(&self, color: Color) -> InstanceId {
        self.state.lock().launch(color, LifecycleState::Pending)
    }

    pub fn remove_instance(&self, id: &InstanceId) {
        let mut state = self.state.lock();
        for color in Color::ALL {
            state.instances.get_mut(color).retain(|_, i| &i.id != id);
        }
    }

    pub fn set_instance_health(&self, id: &InstanceId, health: HealthStatus) {
        if let Some(instance) = self.state.lock().find_mut(id) {
            instance.health = health;
        }
    }

    pub fn set_instance_state(&self, id: &InstanceId, lifecycle_state: LifecycleState) {
        if let Some(instance) = self.state.lock().find_mut(id) {
            instance.lifecycle_state = lifecycle_state;
        }
    }

    /// Drop an instance from one role's target group.
    pub fn deregister(&self, role: &ResourceName, id: &InstanceId) {
        self.state
            .lock()
            .deregistered
            .insert((role.clone(), id.clone()));
    }

    pub fn set_fleet_reachable(&self, reachable: bool) {
        self.state.lock().fleet_down = !reachable;
    }

    /// Make scale-in protection requests fail while the rest keeps working.
    pub fn reject_protection_changes(&self, rejected: bool) {
        self.state.lock().protection_rejected = rejected;
    }

    pub fn set_routing_reachable(&self, reachable: bool) {
        self.state.lock().routing_down = !reachable;
    }

    /// Change the rules behind the orchestrator's back.
    pub fn overwrite_routing_rules(&self, rules: Option<RoutingRules>) {
        self.state.lock().rules = rules;
    }

    pub fn routing_rules(&self) -> Option<RoutingRules> {
        self.state.lock().rules.clone()
    }

    /// How many times rules were submitted.
    pub fn routing_apply_count(&self) -> usize {
        self.state.lock().routing_applies
    }

    pub fn capacity_requests(&self) -> Vec<(Color, Capacity)> {
        self.state.lock().capacity_requests.clone()
    }

    pub fn protection(&self, color: Color) -> bool {
        *self.state.lock().protection.get(color)
    }

    pub fn lifecycle_completions(&self) -> Vec<LifecycleCompletion> {
        self.state.lock().completions.clone()
    }
}

impl Sealed for MemoryBackend {}

#[async_trait]
impl FleetOps for MemoryBackend {
    async fn set_capacity(&self, color: Color, capacity: Capacity) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.check_fleet()?;
        if let Err(e) = capacity.validate() {
            return Err(BackendError::Rejected {
                system: ExternalSystem::FleetManager,
                status: 400,
                message: e.to_string(),
            });
        }
        *state.capacity.get_mut(color) = capacity;
        state.capacity_requests.push((color, capacity));
        state.converge(color);
        Ok(())
    }

    async fn capacity_of(&self, color: Color) -> Result<Capacity, BackendError> {
        let state = self.state.lock();
        state.check_fleet()?;
        Ok(*state.capacity.get(color))
    }

    async fn list_instances(&self, color: Color) -> Result<Vec<Instance>, BackendError> {
        let state = self.state.lock();
        state.check_fleet()?;
        Ok(state.instances.get(color).values().cloned().collect())
    }

    async fn set_scale_in_protection(
        &self,
        color: Color,
        protected: bool,
    ) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.check_fleet()?;
        if state.protection_rejected {
            return Err(BackendError::Rejected {
                system: ExternalSystem::FleetManager,
                status: 403,
                message: format!("not allowed to change scale-in protection of {color}"),
            });
        }
        *state.protection.get_mut(color) = protected;
        if !protected {
            state.converge(color);
        }
        Ok(())
    }

    async fn complete_lifecycle_action(
        &self,
        instance: &InstanceId,
        token: &LifecycleToken,
        result: LifecycleResult,
    ) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.check_fleet()?;
        let (color, seq) = state
            .find_key(instance)
            .ok_or_else(|| BackendError::Rejected {
                system: ExternalSystem::FleetManager,
                status: 404,
                message: format!("no such instance: {instance}"),
            })?;
        let fleet = state.instances.get_mut(color);
        let Some(member) = fleet.get_mut(&seq) else {
            return Err(BackendError::Protocol {
                system: ExternalSystem::FleetManager,
                message: format!("instance {instance} vanished"),
            });
        };
        if member.lifecycle_state != LifecycleState::Pending {
            return Err(BackendError::Rejected {
                system: ExternalSystem::FleetManager,
                status: 409,
                message: format!("instance {instance} is not held at launch"),
            });
        }
        match result {
            LifecycleResult::Continue => {
                member.lifecycle_state = LifecycleState::InService;
                member.health = HealthStatus::Healthy;
                member.lifecycle_token = None;
            }
            // Terminated instances leave the fleet.
            LifecycleResult::Abandon => {
                fleet.remove(&seq);
            }
        }
        state.completions.push(LifecycleCompletion {
            instance: instance.clone(),
            token: token.clone(),
            result,
        });
        Ok(())
    }

    async fn target_group_health(
        &self,
        role: &ResourceName,
        color: Color,
    ) -> Result<Vec<TargetHealth>, BackendError> {
        let state = self.state.lock();
        state.check_fleet()?;
        if !state.roles.contains(role) {
            return Err(BackendError::Rejected {
                system: ExternalSystem::FleetManager,
                status: 404,
                message: format!("no target group for role {role}"),
            });
        }

        let key = TargetGroupKey {
            role: role.clone(),
            color,
        };
        let receiving = state
            .rules
            .as_ref()
            .is_some_and(|rules| rules.receives_traffic(&key));

        let targets = state
            .instances
            .get(color)
            .values()
            .filter(|i| i.lifecycle_state == LifecycleState::InService)
            .filter(|i| !state.deregistered.contains(&(role.clone(), i.id.clone())))
            .map(|i| TargetHealth {
                instance: i.id.clone(),
                state: match i.health {
                    HealthStatus::Healthy if receiving => TargetHealthState::Healthy,
                    HealthStatus::Healthy => TargetHealthState::Unused,
                    HealthStatus::Unhealthy => TargetHealthState::Unhealthy,
                    HealthStatus::Unknown => TargetHealthState::Initial,
                },
            })
            .collect();
        Ok(targets)
    }
}

#[async_trait]
impl RoutingOps for MemoryBackend {
    async fn apply_routing_rules(&self, rules: &RoutingRules) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.check_routing()?;
        state.rules = Some(rules.clone());
        state.routing_applies += 1;
        Ok(())
    }

    async fn current_routing_rules(&self) -> Result<Option<RoutingRules>, BackendError> {
        let state = self.state.lock();
        state.check_routing()?;
        Ok(state.rules.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> MemoryBackend {
        MemoryBackend::new(
            PerColor::new(Capacity::new(2, 1, 4).unwrap(), Capacity::ZERO),
            vec![ResourceName::new("web").unwrap()],
        )
    }

    #[tokio::test]
    async fn seeds_serving_instances() {
        let backend = backend();
        assert_eq!(backend.instances(Color::Blue).len(), 2);
        assert!(backend.instances(Color::Green).is_empty());
        assert!(backend.instances(Color::Blue).iter().all(Instance::is_serving));
    }

    #[tokio::test]
    async fn protected_fleets_do_not_scale_in() {
        let backend = backend();
        backend
            .set_scale_in_protection(Color::Blue, true)
            .await
            .unwrap();
        backend
            .set_capacity(Color::Blue, Capacity::ZERO)
            .await
            .unwrap();
        assert_eq!(backend.instances(Color::Blue).len(), 2);

        backend
            .set_scale_in_protection(Color::Blue, false)
            .await
            .unwrap();
        assert!(backend.instances(Color::Blue).is_empty());
    }

    #[tokio::test]
    async fn held_launches_wait_for_lifecycle_completion() {
        let backend = backend().with_launch_mode(LaunchMode::Held);
        backend
            .set_capacity(Color::Green, Capacity::new(1, 1, 1).unwrap())
            .await
            .unwrap();
        let pending = backend.instances(Color::Green);
        assert_eq!(pending[0].lifecycle_state, LifecycleState::Pending);

        backend
            .complete_lifecycle_action(
                &pending[0].id,
                &LifecycleToken::new("t-1"),
                LifecycleResult::Continue,
            )
            .await
            .unwrap();
        assert!(backend.instances(Color::Green)[0].is_serving());
    }

    #[tokio::test]
    async fn abandoned_launches_leave_the_fleet() {
        let backend = backend().with_launch_mode(LaunchMode::Held);
        let capacity = Capacity::new(1, 1, 1).unwrap();
        for round in 1..=3 {
            backend.set_capacity(Color::Green, capacity).await.unwrap();
            let pending = backend.instances(Color::Green);
            assert_eq!(pending.len(), 1, "round {round}");
            backend
                .complete_lifecycle_action(
                    &pending[0].id,
                    &LifecycleToken::new(format!("t-{round}")),
                    LifecycleResult::Abandon,
                )
                .await
                .unwrap();
            assert!(backend.instances(Color::Green).is_empty());
        }
        assert_eq!(backend.lifecycle_completions().len(), 3);
    }

    #[tokio::test]
    async fn outage_surfaces_as_unreachable() {
        let backend = backend();
        backend.set_fleet_reachable(false);
        let err = backend.capacity_of(Color::Blue).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
