// ABOUTME: The deployment orchestrator: single serialized entry point for every state change.
// ABOUTME: Sequences capacity, readiness, routing, persistence and scale-in protection.

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::backend::{Backend, BackendError, FleetOps};
use crate::config::Config;
use crate::fleet::{Capacity, FleetModel, TargetGroupSpec};
use crate::readiness::{self, EnvironmentStatus, Readiness};
use crate::routing::{self, Drift, ReconcileOutcome, RenderInput, RoutingRules, RoutingState};
use crate::traffic::TrafficSplit;
use crate::types::{Color, PerColor};

use super::error::TransitionError;
use super::history::HistoryEntry;
use super::intent::Intent;
use super::machine;
use super::poll::{CancellationSignal, PollError, Progress, poll_until};
use super::state::{DeploymentState, Phase};
use super::store::{StateStore, StoreError};

/// Resources only touched while the transition lock is held.
struct Inner {
    fleet: FleetModel,
    routing: RoutingState,
}

/// Owns the deployment state and applies operator intents one at a time.
pub struct Orchestrator<B: Backend + ?Sized> {
    backend: Arc<B>,
    config: Config,
    specs: Vec<TargetGroupSpec>,
    store: StateStore,
    state: RwLock<DeploymentState>,
    inner: tokio::sync::Mutex<Inner>,
    cancel: CancellationSignal,
    warnings: Mutex<Vec<String>>,
}

impl<B: Backend + ?Sized> Orchestrator<B> {
    /// Load saved state, or start from `initial_active` when none exists.
    pub fn new(config: Config, backend: Arc<B>, store: StateStore) -> Result<Self, StoreError> {
        let mut state = match store.load()? {
            Some(state) => state,
            None => {
                tracing::debug!(active = %config.initial_active, "no saved state, starting fresh");
                DeploymentState::initial(config.initial_active, config.instance_protection)
            }
        };
        state.instance_protection_enabled = config.instance_protection;

        Ok(Self {
            specs: config.target_group_specs(),
            inner: tokio::sync::Mutex::new(Inner {
                fleet: FleetModel::new(config.fleets),
                routing: RoutingState::new(),
            }),
            backend,
            config,
            store,
            state: RwLock::new(state),
            cancel: CancellationSignal::new(),
            warnings: Mutex::new(Vec::new()),
        })
    }

    pub fn current_state(&self) -> DeploymentState {
        self.state.read().clone()
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Non-fatal problems seen since the last call.
    pub fn take_warnings(&self) -> Vec<String> {
        std::mem::take(&mut *self.warnings.lock())
    }

    fn warn(&self, message: String) {
        tracing::warn!("{}", message);
        self.warnings.lock().push(message);
    }

    /// Fresh readiness for both colors, observed concurrently.
    pub async fn readiness_snapshot(&self) -> Result<PerColor<Readiness>, BackendError> {
        let backend = &*self.backend;
        let (blue, green) = futures::join!(
            readiness::is_ready(backend, Color::Blue, &self.specs),
            readiness::is_ready(backend, Color::Green, &self.specs),
        );
        Ok(PerColor::new(blue?, green?))
    }

    /// Whether the standby color is ready right now, i.e. whether a flip
    /// would pass its readiness check.
    pub async fn is_ready_to_flip(&self) -> bool {
        let state = self.current_state();
        match readiness::is_ready(&*self.backend, state.standby_color(), &self.specs).await {
            Ok(readiness) => readiness.ready,
            Err(e) => {
                tracing::warn!(error = %e, "readiness check failed");
                false
            }
        }
    }

    /// Per-color status for operators.
    pub async fn environment_status(&self) -> Result<PerColor<EnvironmentStatus>, BackendError> {
        let state = self.current_state();
        let backend = &*self.backend;
        let (blue, green) = futures::join!(
            readiness::observe(backend, Color::Blue, &self.specs),
            readiness::observe(backend, Color::Green, &self.specs),
        );
        let (blue, green) = (blue?, green?);
        Ok(PerColor::new(blue, green).map(|color, snapshot| {
            EnvironmentStatus::from_snapshot(
                snapshot,
                color == state.active_color,
                state.weight_of(color),
            )
        }))
    }

    /// Rules the routing layer should have for the current state.
    pub fn desired_rules(&self) -> Result<RoutingRules, TransitionError> {
        self.render(&self.current_state())
    }

    fn render(&self, state: &DeploymentState) -> Result<RoutingRules, TransitionError> {
        let rules = routing::render(&RenderInput {
            active: state.active_color,
            split: &state.traffic_split,
            draining: state.draining_color(),
            target_groups: &self.specs,
            listener_override: self.config.listener_override.as_ref(),
        })?;
        Ok(rules)
    }

    /// Compare the routing layer against the rules the current state implies.
    pub async fn detect_drift(&self) -> Result<Option<Drift>, TransitionError> {
        let expected = self.desired_rules()?;
        let inner = self.inner.try_lock().map_err(|_| TransitionError::Busy)?;
        Ok(inner.routing.detect_drift(&*self.backend, &expected).await?)
    }

    /// Re-apply the rules for the current state if they differ.
    pub async fn reconcile_routing(&self) -> Result<ReconcileOutcome, TransitionError> {
        let expected = self.desired_rules()?;
        let mut inner = self.inner.try_lock().map_err(|_| TransitionError::Busy)?;
        Ok(inner.routing.reconcile(&*self.backend, &expected).await?)
    }

    /// Apply one operator intent.
    ///
    /// Only one transition runs at a time; others are rejected with `Busy`.
    /// Rollback is the exception: it cancels any readiness wait in progress
    /// and then waits for its turn.
    pub async fn request_intent(&self, intent: Intent) -> Result<DeploymentState, TransitionError> {
        let mut cancel = self.cancel.subscribe();

        let mut inner = match intent {
            Intent::Rollback => {
                self.cancel.cancel();
                self.inner.lock().await
            }
            _ => self
                .inner
                .try_lock()
                .map_err(|_| TransitionError::Busy)?,
        };

        tracing::info!(%intent, "transition requested");

        let result = match &intent {
            Intent::IntroduceStandby {
                target,
                capacity,
                override_active,
                release,
            } => {
                self.introduce_standby(
                    &mut inner,
                    &intent,
                    *target,
                    *capacity,
                    *override_active,
                    release.clone(),
                    &mut cancel,
                )
                .await
            }
            Intent::ShiftCanary { split } => self.shift_canary(&mut inner, &intent, split).await,
            Intent::Flip => self.flip(&mut inner, &intent).await,
            Intent::Retire { drain } => self.retire(&mut inner, &intent, *drain, &mut cancel).await,
            Intent::Rollback => self.rollback(&mut inner, &intent).await,
        };

        if let Err(ref e) = result {
            tracing::warn!(%intent, error = %e, "transition not applied");
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn introduce_standby(
        &self,
        inner: &mut Inner,
        intent: &Intent,
        target: Color,
        capacity: Option<Capacity>,
        override_active: bool,
        release: Option<String>,
        cancel: &mut watch::Receiver<u64>,
    ) -> Result<DeploymentState, TransitionError> {
        let current = self.current_state();
        machine::check_introduce(&current, intent, target, override_active)?;

        let capacity = match capacity {
            Some(capacity) => capacity,
            None => {
                inner.fleet.refresh(&*self.backend).await?;
                let active = inner.fleet.capacity_of(current.active_color);
                self.config.standby_capacity_for(target, active)
            }
        };
        capacity
            .validate_standby()
            .map_err(|e| TransitionError::Configuration(format!("{target}: {e}")))?;

        inner
            .fleet
            .set_capacity(&*self.backend, target, capacity)
            .await?;

        let scaling = self
            .commit(
                inner,
                &current,
                machine::standby_scaling(&current, target, release),
                intent,
            )
            .await?;

        match self.wait_until_ready(target, cancel).await {
            Err(e @ TransitionError::Cancelled { .. }) => Err(e),
            outcome => {
                let settled = self
                    .commit(
                        inner,
                        &scaling,
                        machine::standby_settled(&scaling, target),
                        intent,
                    )
                    .await?;
                outcome.map(|()| settled)
            }
        }
    }

    async fn shift_canary(
        &self,
        inner: &mut Inner,
        intent: &Intent,
        split: &TrafficSplit,
    ) -> Result<DeploymentState, TransitionError> {
        let current = self.current_state();
        let split = machine::check_canary(&current, split)?;
        self.require_ready(current.standby_color()).await?;
        self.commit(inner, &current, machine::canary(&current, split), intent)
            .await
    }

    async fn flip(&self, inner: &mut Inner, intent: &Intent) -> Result<DeploymentState, TransitionError> {
        let current = self.current_state();
        self.require_ready(current.standby_color()).await?;
        self.commit(inner, &current, machine::flipped(&current, Utc::now()), intent)
            .await
    }

    async fn retire(
        &self,
        inner: &mut Inner,
        intent: &Intent,
        drain: Option<Duration>,
        cancel: &mut watch::Receiver<u64>,
    ) -> Result<DeploymentState, TransitionError> {
        let current = self.current_state();
        let drain = drain.unwrap_or(self.config.drain.wait);
        machine::check_retire(&current, intent, Utc::now(), drain)?;

        let active = current.active_color;
        let inactive = current.standby_color();

        // Read-only: the active fleet's bounds are never changed here.
        inner.fleet.refresh(&*self.backend).await?;
        let active_capacity = inner.fleet.capacity_of(active);
        if active_capacity.desired == 0 {
            return Err(TransitionError::Configuration(format!(
                "refusing to retire {inactive}: active fleet {active} has zero desired capacity"
            )));
        }

        let retiring = if current.phase == Phase::Retiring {
            current
        } else {
            self.commit(inner, &current, machine::retiring(&current), intent)
                .await?
        };

        inner
            .fleet
            .set_capacity(&*self.backend, inactive, Capacity::ZERO)
            .await?;
        tracing::info!(%inactive, %active, active_desired = active_capacity.desired, "retiring inactive fleet");

        self.wait_until_drained(inactive, cancel).await?;

        self.commit(inner, &retiring, machine::retired(&retiring), intent)
            .await
    }

    async fn rollback(&self, inner: &mut Inner, intent: &Intent) -> Result<DeploymentState, TransitionError> {
        let current = self.current_state();
        if current.phase == Phase::RolledBack {
            tracing::info!(active = %current.active_color, "already rolled back");
            return Ok(current);
        }
        self.commit(
            inner,
            &current,
            machine::rolled_back(&current, Utc::now()),
            intent,
        )
        .await
    }

    /// Fresh readiness check that rejects with `StandbyNotReady`.
    async fn require_ready(&self, color: Color) -> Result<(), TransitionError> {
        let readiness = readiness::is_ready(&*self.backend, color, &self.specs).await?;
        if readiness.ready {
            return Ok(());
        }
        Err(TransitionError::StandbyNotReady {
            color,
            reason: readiness
                .reason
                .map(|r| r.to_string())
                .unwrap_or_else(|| "not ready".to_string()),
        })
    }

    /// Poll until `color` is ready, without touching state. Cancelled by rollback.
    pub async fn await_ready(&self, color: Color) -> Result<(), TransitionError> {
        let mut cancel = self.cancel.subscribe();
        self.wait_until_ready(color, &mut cancel).await
    }

    async fn wait_until_ready(
        &self,
        color: Color,
        cancel: &mut watch::Receiver<u64>,
    ) -> Result<(), TransitionError> {
        let backend = &*self.backend;
        let specs = self.specs.as_slice();
        let convergence = self.config.convergence;

        let result = poll_until(
            convergence.poll_interval,
            convergence.timeout,
            cancel,
            move || async move {
                let readiness = readiness::is_ready(backend, color, specs).await?;
                Ok::<_, BackendError>(match readiness.reason {
                    None => Progress::Done(()),
                    Some(reason) => Progress::Waiting(reason.to_string()),
                })
            },
        )
        .await;

        self.map_poll(color, convergence.timeout, result)
    }

    async fn wait_until_drained(
        &self,
        color: Color,
        cancel: &mut watch::Receiver<u64>,
    ) -> Result<(), TransitionError> {
        let backend = &*self.backend;
        let convergence = self.config.convergence;

        let result = poll_until(
            convergence.poll_interval,
            convergence.timeout,
            cancel,
            move || async move {
                let remaining = backend
                    .list_instances(color)
                    .await?
                    .iter()
                    .filter(|i| !i.is_terminating())
                    .count();
                Ok::<_, BackendError>(if remaining == 0 {
                    Progress::Done(())
                } else {
                    Progress::Waiting(format!("{remaining} instances still running"))
                })
            },
        )
        .await;

        self.map_poll(color, convergence.timeout, result)
    }

    fn map_poll(
        &self,
        color: Color,
        timeout: Duration,
        result: Result<(), PollError<BackendError>>,
    ) -> Result<(), TransitionError> {
        match result {
            Ok(()) => Ok(()),
            Err(PollError::TimedOut { last }) => Err(TransitionError::ConvergenceTimeout {
                color,
                timeout,
                last,
            }),
            Err(PollError::Cancelled) => Err(TransitionError::Cancelled { color }),
            Err(PollError::Failed(e)) => Err(TransitionError::External(e)),
        }
    }

    /// Apply `next`: routing first, then persistence, then publish.
    ///
    /// The saved state must still be `from`. Colors that gain traffic are
    /// protected from scale-in before any rule sends them requests. If
    /// persisting fails the previous rules are restored and the state stays
    /// at `from`.
    async fn commit(
        &self,
        inner: &mut Inner,
        from: &DeploymentState,
        mut next: DeploymentState,
        intent: &Intent,
    ) -> Result<DeploymentState, TransitionError> {
        self.ensure_current(from)?;

        next.version = from.version + 1;
        next.updated_at = Utc::now();

        let rules = self.render(&next)?;
        self.protect_new_traffic(inner, from, &next, intent).await?;
        inner.routing.reconcile(&*self.backend, &rules).await?;

        if let Err(e) = self.store.save(&next) {
            tracing::error!(error = %e, "failed to persist state, restoring previous routing");
            let previous = self.render(from)?;
            if let Err(undo) = inner.routing.reconcile(&*self.backend, &previous).await {
                self.warn(format!(
                    "routing could not be restored after a persistence failure: {undo}"
                ));
            }
            return Err(TransitionError::Persistence(e));
        }

        if let Err(e) = self
            .store
            .append_history(HistoryEntry::record(intent.name(), from, &next))
        {
            self.warn(format!("failed to record deployment history: {e}"));
        }

        *self.state.write() = next.clone();
        tracing::info!(
            intent = intent.name(),
            version = next.version,
            active = %next.active_color,
            phase = %next.phase,
            split = %next.traffic_split,
            "transition applied"
        );

        self.release_protection(inner, &next).await;
        Ok(next)
    }

    /// Reject when another orchestrator saved a newer state since `from`.
    ///
    /// The newer state is adopted so the next request starts from it.
    fn ensure_current(&self, from: &DeploymentState) -> Result<(), TransitionError> {
        let saved = self.store.load().map_err(TransitionError::Persistence)?;
        let found = saved.as_ref().map_or(0, |s| s.version);
        if found == from.version {
            return Ok(());
        }

        tracing::warn!(expected = from.version, found, "saved deployment state changed elsewhere");
        if let Some(mut saved) = saved
            && saved.version > from.version
        {
            saved.instance_protection_enabled = self.config.instance_protection;
            *self.state.write() = saved;
        }
        Err(TransitionError::Conflict {
            expected: from.version,
            found,
        })
    }

    /// Protect every color that carries traffic under `next` but did not
    /// under `from`.
    ///
    /// A failure rejects the transition before routing changes. Rollback
    /// returns traffic to a color that served moments ago and is never held
    /// back by this; its failures only warn.
    async fn protect_new_traffic(
        &self,
        inner: &mut Inner,
        from: &DeploymentState,
        next: &DeploymentState,
        intent: &Intent,
    ) -> Result<(), TransitionError> {
        for color in Color::ALL {
            if !next.wants_protection(color) || from.wants_protection(color) {
                continue;
            }
            match inner.fleet.set_protection(&*self.backend, color, true).await {
                Ok(()) => {}
                Err(e) if matches!(intent, Intent::Rollback) => {
                    self.warn(format!("failed to protect {color} from scale-in: {e}"));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Bring protection in line with `state` after a commit: drop it from
    /// colors without traffic and re-assert it where wanted. Failures only warn.
    async fn release_protection(&self, inner: &mut Inner, state: &DeploymentState) {
        for color in Color::ALL {
            let protected = state.wants_protection(color);
            if let Err(e) = inner
                .fleet
                .set_protection(&*self.backend, color, protected)
                .await
            {
                self.warn(format!(
                    "failed to set scale-in protection for {color} to {protected}: {e}"
                ));
            }
        }
    }
}
